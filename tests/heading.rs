use approx::assert_abs_diff_eq;
use nalgebra::{UnitQuaternion, Vector3};
use rod_pose::{quaternion::euler_angles, RodTracker, Sample, TrackerParameters};

/// Hold the probe level at `yaw_degrees` in a field with a 30 degree dip and
/// return the mean estimated yaw over the second half of the run, in degrees.
fn settled_yaw(yaw_degrees: f64) -> f64 {
    let field = Vector3::new(30_f64.to_radians().cos(), 0.0, -30_f64.to_radians().sin()) * 45.0;
    let truth = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), yaw_degrees.to_radians());
    let mag = truth.inverse() * field;

    let mut tracker = RodTracker::new(TrackerParameters::new(0.13)).unwrap();
    let outputs = tracker.track((0..200).map(|i| {
        Sample::new(f64::from(i) * 0.1, [0.0; 3], [0.0, 0.0, 1.0], mag.into())
    }));

    let settled = &outputs[100..];
    let sum: f64 = settled
        .iter()
        .map(|output| euler_angles(&output.orientation).z)
        .sum();

    (sum / settled.len() as f64).to_degrees()
}

#[test]
fn static_heading_north() {
    assert_abs_diff_eq!(settled_yaw(0.0), 0.0, epsilon = 5.0);
}

#[test]
fn static_heading_20_degrees() {
    assert_abs_diff_eq!(settled_yaw(20.0), 20.0, epsilon = 5.0);
}

#[test]
fn static_heading_40_degrees() {
    assert_abs_diff_eq!(settled_yaw(40.0), 40.0, epsilon = 5.0);
}

#[test]
fn static_heading_60_degrees() {
    assert_abs_diff_eq!(settled_yaw(60.0), 60.0, epsilon = 5.0);
}

#[test]
fn static_heading_east() {
    assert_abs_diff_eq!(settled_yaw(90.0), 90.0, epsilon = 5.0);
}

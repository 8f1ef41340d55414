use approx::{assert_abs_diff_eq, assert_relative_eq};
use nalgebra::{UnitQuaternion, Vector3, Vector4};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rod_pose::{
    Estimator, FilterKind, MadgwickParameters, MotionState, OrientationFilter, RodTracker, Sample,
    TrackerParameters,
};

const ROD_OFFSET: f64 = 0.13;

fn filter_kinds() -> [FilterKind; 2] {
    [
        FilterKind::default(),
        FilterKind::Madgwick(MadgwickParameters::default()),
    ]
}

fn tracker(filter: FilterKind) -> RodTracker {
    let mut parameters = TrackerParameters::new(ROD_OFFSET);
    parameters.filter = filter;
    RodTracker::new(parameters).unwrap()
}

fn random_vector(rng: &mut StdRng, scale: f64) -> Vector3<f64> {
    Vector3::new(
        rng.gen_range(-scale..scale),
        rng.gen_range(-scale..scale),
        rng.gen_range(-scale..scale),
    )
}

#[test]
fn orientation_stays_unit_norm() {
    let mut rng = StdRng::seed_from_u64(42);

    for kind in filter_kinds() {
        let mut filter = Estimator::new(&kind);

        for i in 0..500 {
            let gyro = random_vector(&mut rng, 2.0);
            let dt = rng.gen_range(0.0..0.05);
            filter.predict(&gyro, dt);
            assert_abs_diff_eq!(filter.orientation().norm(), 1.0, epsilon = 1e-9);

            // every tenth sample is degenerate
            let accel = if i % 10 == 0 {
                Vector3::zeros()
            } else {
                Vector3::z() + random_vector(&mut rng, 0.5)
            };
            let mag = random_vector(&mut rng, 50.0);
            let q = filter.update(&accel, &mag);
            assert_abs_diff_eq!(q.norm(), 1.0, epsilon = 1e-9);
        }
    }
}

#[test]
fn stationary_probe_does_not_drift() {
    for kind in filter_kinds() {
        let mut tracker = tracker(kind);

        for i in 0..100 {
            let t = f64::from(i) * 0.1;
            let output = tracker.update(&Sample::new(t, [0.0; 3], [0.0, 0.0, 1.0], [0.3, -0.2, 0.5]));

            assert_eq!(output.motion, MotionState::Stationary);
            assert_eq!(output.axial_velocity, 0.0);
            assert_abs_diff_eq!(output.axial_displacement, 0.0, epsilon = 1e-6);
        }
    }
}

#[test]
fn constant_axial_acceleration_matches_closed_form() {
    for kind in filter_kinds() {
        let mut tracker = tracker(kind);

        // rotating about the rod axis keeps the probe moving, the body z
        // acceleration stays 1 m/s^2
        let outputs = tracker.track((0..=10).map(|i| {
            Sample::new(f64::from(i) * 0.1, [0.0, 0.0, 0.5], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0])
        }));

        assert!(outputs.iter().all(|output| output.motion == MotionState::Moving));

        let last = outputs.last().unwrap();
        assert_relative_eq!(last.axial_displacement, 0.5, epsilon = 1e-9);
        assert_relative_eq!(last.axial_velocity, 1.0, epsilon = 1e-9);
    }
}

#[test]
fn zero_acceleration_is_survivable() {
    for kind in filter_kinds() {
        let mut tracker = tracker(kind);

        for i in 0..20 {
            let t = f64::from(i) * 0.1;
            let output = tracker.update(&Sample::new(t, [0.01, 0.0, 0.0], [0.0; 3], [0.4, 0.1, -0.3]));

            assert!(output.degenerate_measurement);
            assert!(output.orientation.coords.iter().all(|c| c.is_finite()));
            assert!(output.tip_position.iter().all(|c| c.is_finite()));
            assert_abs_diff_eq!(output.orientation.norm(), 1.0, epsilon = 1e-9);
        }
    }
}

#[test]
fn level_probe_keeps_identity_pose() {
    for kind in filter_kinds() {
        let mut tracker = tracker(kind);

        for i in 0..5 {
            let t = f64::from(i) * 0.1;
            let output = tracker.update(&Sample::new(t, [0.0; 3], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0]));

            assert_abs_diff_eq!(
                Vector4::from(output.orientation_wxyz()),
                Vector4::new(1.0, 0.0, 0.0, 0.0),
                epsilon = 1e-9
            );
            assert_abs_diff_eq!(output.tip_position, Vector3::new(0.0, 0.0, ROD_OFFSET), epsilon = 1e-9);
        }
    }
}

#[test]
fn tip_follows_orientation() {
    // held still but pitched by 30 degrees about the navigation y axis, so
    // the rest detector never fires and gravity has to be removed from the
    // axial acceleration
    let truth = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 30_f64.to_radians());
    let accel = truth.inverse() * Vector3::z();
    let mag = truth.inverse() * Vector3::x();

    let mut parameters = TrackerParameters::new(ROD_OFFSET);
    parameters.gravity = Some(1.0);
    let mut tracker = RodTracker::new(parameters).unwrap();

    let outputs = tracker.track((0..100).map(|i| {
        Sample::new(f64::from(i) * 0.1, [0.0; 3], accel.into(), mag.into())
    }));

    for output in &outputs {
        let axis = output.orientation * Vector3::new(0.0, 0.0, ROD_OFFSET + output.axial_displacement);
        assert_abs_diff_eq!(output.tip_position, axis, epsilon = 1e-12);
    }

    let last = outputs.last().unwrap();
    let expected = truth * Vector3::new(0.0, 0.0, ROD_OFFSET);
    assert_abs_diff_eq!(last.orientation.angle_to(&truth), 0.0, epsilon = 1e-3);
    assert_abs_diff_eq!(last.axial_displacement, 0.0, epsilon = 1e-3);
    assert_abs_diff_eq!(last.tip_position, expected, epsilon = 1e-3);
}

#[test]
fn independent_trackers_are_isolated() {
    let samples: Vec<_> = (0..50)
        .map(|i| {
            let t = f64::from(i) * 0.02;
            Sample::new(t, [0.1, -0.2, 0.05], [0.1, 0.0, 1.0], [0.5, 0.1, -0.4])
        })
        .collect();

    let expected = tracker(FilterKind::default()).track(samples.iter().copied());

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| tracker(FilterKind::default()).track(samples.iter().copied())))
            .collect();

        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    for outputs in results {
        assert_eq!(outputs, expected);
    }
}

//! Tilt-compensated heading measurement.
//!
//! The magnetometer reading is rotated into the navigation frame with the
//! current orientation estimate, which removes the effect of tilt, and the
//! heading is the angle of its horizontal part. Fusing this scalar on its own
//! keeps magnetic disturbances from leaking into roll and pitch.

use nalgebra::{SMatrix, UnitQuaternion, Vector3, Vector4};

use crate::quaternion::{from_wxyz, to_rotation_matrix, wrap_angle};

/// A linearized heading measurement at the current orientation estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadingMeasurement {
    /// Heading of the magnetometer reading in the navigation frame, in
    /// radians.
    pub heading: f64,
    /// Wrapped difference between the reference heading and [`Self::heading`].
    pub innovation: f64,
    /// Sensitivity of the heading to the `(w, x, y, z)` quaternion
    /// components.
    pub jacobian: SMatrix<f64, 1, 4>,
}

/// Scalar yaw measurement model with a numerically differentiated Jacobian.
///
/// The corrector holds only constants, every measurement is a function of
/// `(mag, q)` alone.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HeadingCorrector {
    /// Heading of the reference magnetic field in the navigation frame.
    reference_heading: f64,
    /// Central difference step.
    eps: f64,
}

impl HeadingCorrector {
    /// Horizontal field components below this magnitude (relative to the full
    /// reading) leave the heading undefined.
    const MIN_HORIZONTAL_RATIO: f64 = 1e-6;

    /// Creates a corrector that drives the field heading towards that of
    /// `magnetic_reference`.
    #[must_use]
    pub fn new(magnetic_reference: &Vector3<f64>, eps: f64) -> Self {
        Self {
            reference_heading: magnetic_reference.y.atan2(magnetic_reference.x),
            eps,
        }
    }

    /// The heading the corrector steers towards, in radians.
    #[must_use]
    pub fn reference_heading(&self) -> f64 {
        self.reference_heading
    }

    /// Tilt-compensated heading `atan2(east, north)` of `mag` seen through
    /// the orientation `q`.
    #[must_use]
    pub fn heading(mag: &Vector3<f64>, q: &UnitQuaternion<f64>) -> f64 {
        let mag_nav = to_rotation_matrix(q) * mag;
        mag_nav.y.atan2(mag_nav.x)
    }

    /// Linearizes the heading measurement around `q`.
    ///
    /// Returns [`None`] when the rotated field has no usable horizontal
    /// component, e.g. a zero reading or a field pointing straight down.
    #[must_use]
    pub fn measure(&self, mag: &Vector3<f64>, q: &Vector4<f64>) -> Option<HeadingMeasurement> {
        let orientation = UnitQuaternion::from_quaternion(from_wxyz(q));
        let mag_nav = to_rotation_matrix(&orientation) * mag;

        let horizontal = mag_nav.xy().norm();
        if horizontal <= Self::MIN_HORIZONTAL_RATIO * mag.norm() {
            return None;
        }

        let heading = mag_nav.y.atan2(mag_nav.x);
        Some(HeadingMeasurement {
            heading,
            innovation: wrap_angle(self.reference_heading - heading),
            jacobian: self.jacobian(mag, q),
        })
    }

    /// Central difference Jacobian of the heading. Differences are wrapped so
    /// the `atan2` branch cut does not produce spurious `2 pi` jumps.
    fn jacobian(&self, mag: &Vector3<f64>, q: &Vector4<f64>) -> SMatrix<f64, 1, 4> {
        let mut jacobian = SMatrix::<f64, 1, 4>::zeros();

        for i in 0..4 {
            let mut dq = Vector4::zeros();
            dq[i] = self.eps;

            let plus = UnitQuaternion::from_quaternion(from_wxyz(&(q + dq)));
            let minus = UnitQuaternion::from_quaternion(from_wxyz(&(q - dq)));

            jacobian[i] = wrap_angle(Self::heading(mag, &plus) - Self::heading(mag, &minus))
                / (2.0 * self.eps);
        }

        jacobian
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn yawed(angle: f64) -> UnitQuaternion<f64> {
        UnitQuaternion::from_axis_angle(&Vector3::z_axis(), angle)
    }

    fn wxyz(q: &UnitQuaternion<f64>) -> Vector4<f64> {
        Vector4::new(q.w, q.i, q.j, q.k)
    }

    #[test]
    fn heading_is_removed_by_matching_orientation() {
        let field = Vector3::new(0.4, 0.0, -0.8);
        let q = yawed(0.6);
        let mag_body = q.inverse() * field;

        assert_relative_eq!(HeadingCorrector::heading(&mag_body, &q), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn heading_ignores_tilt() {
        let field = Vector3::new(0.5, 0.0, -0.7);
        let q = UnitQuaternion::from_euler_angles(0.3, -0.2, 0.0);
        let mag_body = q.inverse() * field;

        assert_relative_eq!(HeadingCorrector::heading(&mag_body, &q), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn innovation_points_towards_reference() {
        let corrector = HeadingCorrector::new(&Vector3::x(), 1e-6);
        let truth = yawed(0.5);
        let mag_body = truth.inverse() * Vector3::x();

        // estimate lags the true yaw, so the heading is negative
        let measurement = corrector.measure(&mag_body, &wxyz(&yawed(0.2))).unwrap();

        assert_relative_eq!(measurement.heading, -0.3, epsilon = 1e-9);
        assert_relative_eq!(measurement.innovation, 0.3, epsilon = 1e-9);
    }

    #[test]
    fn jacobian_is_continuous_across_branch_cut() {
        let corrector = HeadingCorrector::new(&Vector3::x(), 1e-6);
        let mag_body = Vector3::new(-1.0, 1e-9, 0.0);

        let measurement = corrector.measure(&mag_body, &wxyz(&yawed(0.0))).unwrap();

        // d(yaw)/dz = 2 at the identity
        assert_relative_eq!(measurement.jacobian[3], 2.0, epsilon = 1e-5);
        assert_relative_eq!(measurement.innovation.abs(), PI, epsilon = 1e-6);
    }

    #[test]
    fn vertical_field_has_no_heading() {
        let corrector = HeadingCorrector::new(&Vector3::x(), 1e-6);
        let q = Vector4::new(1.0, 0.0, 0.0, 0.0);

        assert!(corrector.measure(&Vector3::new(0.0, 0.0, -1.0), &q).is_none());
        assert!(corrector.measure(&Vector3::zeros(), &q).is_none());
    }
}

//! Gradient-descent orientation filter (Madgwick, 2010).
//!
//! An alternative to the [`OrientationEkf`](crate::OrientationEkf) behind the
//! same [`OrientationFilter`] interface. The gyroscope rate is integrated in
//! [`Madgwick::predict`]; [`Madgwick::update`] then takes one normalized
//! gradient step of size `beta * dt` on the gravity and magnetic field
//! alignment error.
//!
//! # References
//!
//! - [Madgwick's internal report](http://x-io.co.uk/res/doc/madgwick_internal_report.pdf)

use nalgebra::{Quaternion, SMatrix, UnitQuaternion, Vector3, Vector4};

use crate::{
    filter::OrientationFilter,
    quaternion::{from_wxyz, to_rotation_matrix, to_wxyz},
};

/// Parameters for the [`Madgwick`] filter.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MadgwickParameters {
    /// Filter gain $\beta$, in rad/s. Larger values trust the accelerometer
    /// and magnetometer more. See section 3.6 of the report.
    pub beta: f64,
}

impl Default for MadgwickParameters {
    fn default() -> Self {
        Self { beta: 0.1 }
    }
}

/// MARG orientation filter.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Madgwick {
    /// The parameters of the filter.
    parameters: MadgwickParameters,
    /// Body-to-navigation orientation estimate.
    q: UnitQuaternion<f64>,
    /// Time step of the last prediction, used to scale the gradient step.
    dt: f64,
}

impl Madgwick {
    /// Create a new filter at the identity orientation.
    #[must_use]
    pub fn new(parameters: MadgwickParameters) -> Self {
        Self {
            parameters,
            q: UnitQuaternion::identity(),
            dt: 0.0,
        }
    }

    /// The parameters of the filter.
    #[must_use]
    pub fn parameters(&self) -> &MadgwickParameters {
        &self.parameters
    }

    /// Integrate the gyroscope rate (rad/s) over `dt` seconds.
    pub fn predict(&mut self, gyro: &Vector3<f64>, dt: f64) {
        // rate of change of quaternion from gyroscope (eq. 11)
        let q_dot = self.q.quaternion() * Quaternion::from_imag(*gyro) * 0.5;

        self.q = UnitQuaternion::from_quaternion(self.q.into_inner() + q_dot * dt);
        self.dt = dt;
    }

    /// Take one gradient step towards the measured gravity and magnetic field
    /// directions and return the new orientation.
    ///
    /// A zero accelerometer reading skips the correction entirely, a zero
    /// magnetometer reading falls back to the gravity-only objective.
    pub fn update(&mut self, accel: &Vector3<f64>, mag: &Vector3<f64>) -> UnitQuaternion<f64> {
        let Some(a) = accel.try_normalize(0.0) else {
            return self.q;
        };

        let q = to_wxyz(&self.q);
        let r_t = to_rotation_matrix(&self.q).transpose();

        // objective function and Jacobian for gravity (eq. 25 & 26)
        let f_g = r_t * Vector3::z() - a;
        let mut gradient = gravity_jacobian(&q).transpose() * f_g;

        if let Some(m) = mag.try_normalize(0.0) {
            // direction of the earth's magnetic field (eq. 45 & 46)
            let h = self.q * m;
            let b = Vector3::new(h.xy().norm(), 0.0, h.z);

            // eq. 29 & 30
            let f_b = r_t * b - m;
            gradient += field_jacobian(&q, &b).transpose() * f_b;
        }

        if let Some(step) = gradient.try_normalize(0.0) {
            // eq. 43
            let corrected = q - step * (self.parameters.beta * self.dt);
            self.q = UnitQuaternion::from_quaternion(from_wxyz(&corrected));
        }

        self.q
    }

    /// Returns the current orientation estimate.
    #[must_use]
    pub fn orientation(&self) -> UnitQuaternion<f64> {
        self.q
    }

    /// Reset to the identity orientation.
    pub fn reset(&mut self) {
        self.q = UnitQuaternion::identity();
        self.dt = 0.0;
    }
}

impl Default for Madgwick {
    fn default() -> Self {
        Self::new(MadgwickParameters::default())
    }
}

impl OrientationFilter for Madgwick {
    fn predict(&mut self, gyro: &Vector3<f64>, dt: f64) {
        Madgwick::predict(self, gyro, dt);
    }

    fn update(&mut self, accel: &Vector3<f64>, mag: &Vector3<f64>) -> UnitQuaternion<f64> {
        Madgwick::update(self, accel, mag)
    }

    fn orientation(&self) -> UnitQuaternion<f64> {
        Madgwick::orientation(self)
    }

    fn reset(&mut self) {
        Madgwick::reset(self);
    }
}

/// $J_g$, the Jacobian of $R(q)^T e_z$ with respect to `(w, x, y, z)`.
#[rustfmt::skip]
fn gravity_jacobian(q: &Vector4<f64>) -> SMatrix<f64, 3, 4> {
    let (q1, q2, q3, q4) = (q[0], q[1], q[2], q[3]);

    SMatrix::<f64, 3, 4>::new(
        -2.0 * q3, 2.0 * q4, -2.0 * q1, 2.0 * q2,
         2.0 * q2, 2.0 * q1,  2.0 * q4, 2.0 * q3,
         0.0,     -4.0 * q2, -4.0 * q3, 0.0,
    )
}

/// $J_b$, the Jacobian of $R(q)^T b$ with respect to `(w, x, y, z)` for a
/// field `b = (b_x, 0, b_z)`.
#[rustfmt::skip]
fn field_jacobian(q: &Vector4<f64>, b: &Vector3<f64>) -> SMatrix<f64, 3, 4> {
    let (q1, q2, q3, q4) = (q[0], q[1], q[2], q[3]);
    let (bx, bz) = (b.x, b.z);

    SMatrix::<f64, 3, 4>::new(
        -2.0 * bz * q3,
        2.0 * bz * q4,
        -4.0 * bx * q3 - 2.0 * bz * q1,
        -4.0 * bx * q4 + 2.0 * bz * q2,

        -2.0 * bx * q4 + 2.0 * bz * q2,
        2.0 * bx * q3 + 2.0 * bz * q1,
        2.0 * bx * q2 + 2.0 * bz * q4,
        -2.0 * bx * q1 + 2.0 * bz * q3,

        2.0 * bx * q3,
        2.0 * bx * q4 - 4.0 * bz * q2,
        2.0 * bx * q1 - 4.0 * bz * q3,
        2.0 * bx * q2,
    )
}

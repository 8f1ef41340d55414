//! Extended Kalman filter over orientation and gyroscope bias.
//!
//! The state is the 7-vector $x = [q_0, q_1, q_2, q_3, b_x, b_y, b_z]^T$: the
//! body-to-navigation quaternion in `(w, x, y, z)` order followed by the
//! gyroscope bias in rad/s.
//!
//! Every sample runs one [`OrientationEkf::predict`] followed by one
//! [`OrientationEkf::update`]. The update corrects the state twice, first
//! with a fit of the normalized gravity and magnetic field directions and then
//! with a scalar tilt-compensated heading (see [`HeadingCorrector`]).

use log::{debug, warn};
use nalgebra::{Matrix4, SMatrix, SVector, UnitQuaternion, Vector3, Vector4, Vector6};

use crate::{
    filter::OrientationFilter,
    heading::HeadingCorrector,
    quaternion::{central_difference, from_wxyz, normalize, to_rotation_matrix, to_wxyz},
};

/// The dimension of the filter state.
pub const STATE_DIM: usize = 7;

/// Magnitude of the placeholder that replaces a zero-norm direction
/// measurement.
pub const DEGENERATE_PLACEHOLDER: f64 = 1e-6;

/// State vector of an [`OrientationEkf`].
pub type StateVector = SVector<f64, STATE_DIM>;

/// State covariance of an [`OrientationEkf`].
pub type StateCovariance = SMatrix<f64, STATE_DIM, STATE_DIM>;

/// Parameters for the [`OrientationEkf`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EkfParameters {
    /// Covariance $P_0$ of the initial state.
    pub initial_covariance: StateCovariance,
    /// Process noise $Q$ added on every prediction.
    ///
    /// The bias block models the slow drift of the gyroscope bias.
    pub process_noise: StateCovariance,
    /// Measurement noise $R_{accmag}$ of the gravity and magnetic field
    /// direction fit, accelerometer axes first.
    pub accmag_noise: SMatrix<f64, 6, 6>,
    /// Measurement noise $R_{yaw}$ of the tilt-compensated heading, in
    /// rad^2.
    pub yaw_noise: f64,
    /// Direction of the specific force measured at rest, in the navigation
    /// frame.
    pub gravity_reference: Vector3<f64>,
    /// Direction of the magnetic field in the navigation frame.
    ///
    /// Only its direction is used, and the heading correction steers towards
    /// the heading of its horizontal part.
    pub magnetic_reference: Vector3<f64>,
    /// Step $\epsilon$ of the central difference Jacobians.
    pub jacobian_step: f64,
}

impl Default for EkfParameters {
    fn default() -> Self {
        let mut process_noise = StateCovariance::identity() * 1e-5;
        for i in 4..STATE_DIM {
            process_noise[(i, i)] *= 1e-4;
        }

        Self {
            initial_covariance: StateCovariance::identity() * 0.01,
            process_noise,
            accmag_noise: SMatrix::from_diagonal(&Vector6::new(
                1e-4, 1e-4, 1e-4, 1e-2, 1e-2, 1e-2,
            )),
            yaw_noise: 1e-3,
            gravity_reference: Vector3::z(),
            magnetic_reference: Vector3::x(),
            jacobian_step: 1e-6,
        }
    }
}

/// Mean and covariance of the filter.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EkfState {
    /// State estimate.
    pub x: StateVector,
    /// State covariance.
    pub p: StateCovariance,
}

impl EkfState {
    /// Identity orientation, zero bias, and the given covariance.
    #[must_use]
    pub fn new(initial_covariance: StateCovariance) -> Self {
        Self {
            x: StateVector::from_column_slice(&[1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
            p: initial_covariance,
        }
    }

    /// The quaternion part of the state, `(w, x, y, z)`.
    #[must_use]
    pub fn quaternion(&self) -> Vector4<f64> {
        self.x.fixed_rows::<4>(0).into_owned()
    }

    /// The gyroscope bias part of the state, in rad/s.
    #[must_use]
    pub fn bias(&self) -> Vector3<f64> {
        self.x.fixed_rows::<3>(4).into_owned()
    }
}

/// Quaternion EKF with gyroscope bias states.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OrientationEkf {
    /// The parameters of the filter.
    parameters: EkfParameters,
    /// The state of the filter.
    pub state: EkfState,
    /// Yaw-only measurement model.
    heading: HeadingCorrector,
    /// Normalized [`EkfParameters::gravity_reference`].
    gravity_direction: Vector3<f64>,
    /// Normalized [`EkfParameters::magnetic_reference`].
    magnetic_direction: Vector3<f64>,
}

impl OrientationEkf {
    /// Create a new filter at the identity orientation.
    #[must_use]
    pub fn new(parameters: EkfParameters) -> Self {
        let gravity_direction = parameters
            .gravity_reference
            .try_normalize(0.0)
            .unwrap_or_else(Vector3::z);
        let magnetic_direction = parameters
            .magnetic_reference
            .try_normalize(0.0)
            .unwrap_or_else(Vector3::x);

        Self {
            heading: HeadingCorrector::new(&magnetic_direction, parameters.jacobian_step),
            state: EkfState::new(parameters.initial_covariance),
            gravity_direction,
            magnetic_direction,
            parameters,
        }
    }

    /// The parameters of the filter.
    #[must_use]
    pub fn parameters(&self) -> &EkfParameters {
        &self.parameters
    }

    /// The current gyroscope bias estimate, in rad/s.
    #[must_use]
    pub fn bias(&self) -> Vector3<f64> {
        self.state.bias()
    }

    /// Quaternion kinematic matrix $\Omega(\omega)$, so that
    /// $\dot q = \frac{1}{2} \Omega(\omega) q$.
    #[must_use]
    #[rustfmt::skip]
    pub fn omega(w: &Vector3<f64>) -> Matrix4<f64> {
        Matrix4::new(
            0.0, -w.x, -w.y, -w.z,
            w.x,  0.0,  w.z, -w.y,
            w.y, -w.z,  0.0,  w.x,
            w.z,  w.y, -w.x,  0.0,
        )
    }

    /// Linearized transition $F = I_7 + \frac{dt}{2} \begin{bmatrix} \Omega & 0
    /// \\\\ 0 & 0 \end{bmatrix}$ for the bias-corrected rate `w`.
    #[must_use]
    pub fn transition(w: &Vector3<f64>, dt: f64) -> StateCovariance {
        let mut f = StateCovariance::identity();
        f.fixed_view_mut::<4, 4>(0, 0)
            .zip_apply(&(Self::omega(w) * (0.5 * dt)), |a, b| *a += b);
        f
    }

    /// Propagate the state with the raw gyroscope reading `gyro` (rad/s) over
    /// `dt` seconds.
    ///
    /// A `dt` of zero leaves the mean unchanged and only adds process noise.
    pub fn predict(&mut self, gyro: &Vector3<f64>, dt: f64) {
        let w = gyro - self.state.bias();
        let f = Self::transition(&w, dt);

        self.state.x = f * self.state.x;
        self.state.p = f * self.state.p * f.transpose() + self.parameters.process_noise;

        self.renormalize();
    }

    /// Correct the state with an accelerometer reading and a magnetometer
    /// reading, in any consistent units, and return the new orientation.
    ///
    /// Zero-norm readings are replaced with a tiny placeholder vector so the
    /// filter stays finite; the heading stage is skipped without a usable
    /// magnetometer reading.
    pub fn update(&mut self, accel: &Vector3<f64>, mag: &Vector3<f64>) -> UnitQuaternion<f64> {
        let accel_direction = direction_or_placeholder(accel);
        let mag_direction = direction_or_placeholder(mag);

        self.vector_fit(&accel_direction, &mag_direction);
        self.renormalize();

        match self.heading.measure(mag, &self.state.quaternion()) {
            Some(measurement) => {
                let mut h = SMatrix::<f64, 1, STATE_DIM>::zeros();
                h.fixed_view_mut::<1, 4>(0, 0).copy_from(&measurement.jacobian);

                let r = SMatrix::<f64, 1, 1>::new(self.parameters.yaw_noise);
                self.correct(&SVector::<f64, 1>::new(measurement.innovation), &h, &r);
                self.renormalize();
            }
            None => debug!("heading undefined for magnetometer reading {mag:?}, skipping yaw stage"),
        }

        self.orientation()
    }

    /// Predicted body frame gravity and magnetic field directions,
    /// $h(q) = [R^T g_{ref}; R^T m_{ref}]$.
    #[must_use]
    pub fn predicted_directions(&self, q: &UnitQuaternion<f64>) -> Vector6<f64> {
        let r_t = to_rotation_matrix(q).transpose();
        let mut h = Vector6::zeros();
        h.fixed_rows_mut::<3>(0).copy_from(&(r_t * self.gravity_direction));
        h.fixed_rows_mut::<3>(3).copy_from(&(r_t * self.magnetic_direction));
        h
    }

    /// Central difference Jacobian of [`Self::predicted_directions`] with
    /// respect to the full state. The bias columns are zero.
    #[must_use]
    pub fn directions_jacobian(&self, q: &Vector4<f64>) -> SMatrix<f64, 6, STATE_DIM> {
        let mut h = SMatrix::<f64, 6, STATE_DIM>::zeros();
        h.fixed_view_mut::<6, 4>(0, 0).copy_from(&central_difference(
            q,
            self.parameters.jacobian_step,
            |q| self.predicted_directions(q),
        ));
        h
    }

    /// First correction stage: fit the predicted gravity and field directions
    /// to the measured ones.
    fn vector_fit(&mut self, accel_direction: &Vector3<f64>, mag_direction: &Vector3<f64>) {
        let mut z = Vector6::zeros();
        z.fixed_rows_mut::<3>(0).copy_from(accel_direction);
        z.fixed_rows_mut::<3>(3).copy_from(mag_direction);

        let q = self.state.quaternion();
        let predicted = self.predicted_directions(&UnitQuaternion::from_quaternion(from_wxyz(&q)));
        let h = self.directions_jacobian(&q);
        let r = self.parameters.accmag_noise;

        self.correct(&(z - predicted), &h, &r);
    }

    /// Standard EKF correction with innovation `y`, Jacobian `h` and
    /// measurement noise `r`. Uses the Joseph form for the covariance.
    fn correct<const M: usize>(
        &mut self,
        y: &SVector<f64, M>,
        h: &SMatrix<f64, M, STATE_DIM>,
        r: &SMatrix<f64, M, M>,
    ) {
        let p = self.state.p;

        let s = h * p * h.transpose() + r;
        let Some(s_inv) = s.try_inverse() else {
            debug!("singular innovation covariance, skipping correction");
            return;
        };
        let k = p * h.transpose() * s_inv;

        self.state.x += k * y;

        let i_kh = StateCovariance::identity() - k * h;
        let p = i_kh * p * i_kh.transpose() + k * r * k.transpose();
        self.state.p = (p + p.transpose()) * 0.5;
    }

    /// Restore the unit norm of the quaternion part of the state.
    fn renormalize(&mut self) {
        match normalize(&from_wxyz(&self.state.quaternion())) {
            Ok(q) => self.state.x.fixed_rows_mut::<4>(0).copy_from(&to_wxyz(&q)),
            Err(error) => {
                warn!("{error}, resetting orientation to identity");
                self.state.x.fixed_rows_mut::<4>(0).copy_from(&Vector4::new(1.0, 0.0, 0.0, 0.0));
                self.state.p = self.parameters.initial_covariance;
            }
        }
    }

    /// Returns the current orientation estimate.
    #[must_use]
    pub fn orientation(&self) -> UnitQuaternion<f64> {
        UnitQuaternion::new_unchecked(from_wxyz(&self.state.quaternion()))
    }

    /// Reset to the identity orientation, zero bias and the initial
    /// covariance.
    pub fn reset(&mut self) {
        self.state = EkfState::new(self.parameters.initial_covariance);
    }
}

impl Default for OrientationEkf {
    fn default() -> Self {
        Self::new(EkfParameters::default())
    }
}

impl OrientationFilter for OrientationEkf {
    fn predict(&mut self, gyro: &Vector3<f64>, dt: f64) {
        OrientationEkf::predict(self, gyro, dt);
    }

    fn update(&mut self, accel: &Vector3<f64>, mag: &Vector3<f64>) -> UnitQuaternion<f64> {
        OrientationEkf::update(self, accel, mag)
    }

    fn orientation(&self) -> UnitQuaternion<f64> {
        OrientationEkf::orientation(self)
    }

    fn reset(&mut self) {
        OrientationEkf::reset(self);
    }
}

/// Normalizes `v`, substituting a placeholder for a zero-norm reading.
fn direction_or_placeholder(v: &Vector3<f64>) -> Vector3<f64> {
    let v = if v.norm() == 0.0 {
        Vector3::repeat(DEGENERATE_PLACEHOLDER)
    } else {
        *v
    };
    v.normalize()
}

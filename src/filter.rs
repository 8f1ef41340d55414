//! The orientation filter capability shared by the EKF and the gradient-descent
//! filter, and the configuration that selects between them.

use nalgebra::{UnitQuaternion, Vector3};

use crate::{
    ekf::{EkfParameters, OrientationEkf},
    madgwick::{Madgwick, MadgwickParameters},
};

/// An orientation estimator driven by a gyroscope prediction and an
/// accelerometer/magnetometer correction per sample.
///
/// Implementations must keep the orientation a unit quaternion after every
/// call.
pub trait OrientationFilter {
    /// Propagate the orientation with the gyroscope reading (rad/s) over `dt`
    /// seconds. A `dt` of zero must not move the orientation.
    fn predict(&mut self, gyro: &Vector3<f64>, dt: f64);

    /// Correct the orientation with an accelerometer and a magnetometer
    /// reading and return the new estimate.
    fn update(&mut self, accel: &Vector3<f64>, mag: &Vector3<f64>) -> UnitQuaternion<f64>;

    /// The current body-to-navigation orientation.
    fn orientation(&self) -> UnitQuaternion<f64>;

    /// Return to the initial state.
    fn reset(&mut self);
}

/// Which orientation filter a [`RodTracker`](crate::RodTracker) runs.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FilterKind {
    /// The quaternion EKF with gyroscope bias states.
    Ekf(EkfParameters),
    /// The gradient-descent filter.
    Madgwick(MadgwickParameters),
}

impl Default for FilterKind {
    fn default() -> Self {
        Self::Ekf(EkfParameters::default())
    }
}

/// A configuration-selected [`OrientationFilter`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Estimator {
    /// See [`OrientationEkf`].
    Ekf(OrientationEkf),
    /// See [`Madgwick`].
    Madgwick(Madgwick),
}

impl Estimator {
    /// Builds the filter described by `kind`.
    #[must_use]
    pub fn new(kind: &FilterKind) -> Self {
        match kind {
            FilterKind::Ekf(parameters) => Self::Ekf(OrientationEkf::new(parameters.clone())),
            FilterKind::Madgwick(parameters) => Self::Madgwick(Madgwick::new(parameters.clone())),
        }
    }

    fn inner(&self) -> &dyn OrientationFilter {
        match self {
            Self::Ekf(filter) => filter,
            Self::Madgwick(filter) => filter,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn OrientationFilter {
        match self {
            Self::Ekf(filter) => filter,
            Self::Madgwick(filter) => filter,
        }
    }
}

impl OrientationFilter for Estimator {
    fn predict(&mut self, gyro: &Vector3<f64>, dt: f64) {
        self.inner_mut().predict(gyro, dt);
    }

    fn update(&mut self, accel: &Vector3<f64>, mag: &Vector3<f64>) -> UnitQuaternion<f64> {
        self.inner_mut().update(accel, mag)
    }

    fn orientation(&self) -> UnitQuaternion<f64> {
        self.inner().orientation()
    }

    fn reset(&mut self) {
        self.inner_mut().reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_kind_is_ekf() {
        assert!(matches!(
            Estimator::new(&FilterKind::default()),
            Estimator::Ekf(_)
        ));
    }

    #[test]
    fn reset_returns_to_identity() {
        for kind in [
            FilterKind::default(),
            FilterKind::Madgwick(MadgwickParameters::default()),
        ] {
            let mut estimator = Estimator::new(&kind);
            estimator.predict(&Vector3::new(0.4, 0.0, 0.2), 0.5);
            assert_ne!(estimator.orientation(), UnitQuaternion::identity());

            estimator.reset();
            assert_eq!(estimator.orientation(), UnitQuaternion::identity());
        }
    }
}

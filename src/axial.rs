//! Zero-velocity-gated dead reckoning along the rod axis.
//!
//! The rod is treated as moving only along its own long (body z) axis. Each
//! sample first decides whether the probe is at rest; at rest the axial
//! velocity is clamped to zero, otherwise the axial acceleration is integrated
//! into velocity and displacement.

use std::time::Duration;

use log::debug;
use nalgebra::Vector3;

/// Whether the probe is considered to be at rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MotionState {
    /// Acceleration is integrated.
    #[default]
    Moving,
    /// Velocity is clamped to zero.
    Stationary,
}

/// Parameters for the zero-velocity update.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ZuptParameters {
    /// Maximum distance between the normalized accelerometer reading and the
    /// body z axis for a rest sample.
    pub accel_tolerance: f64,
    /// Maximum gyroscope magnitude for a rest sample, in rad/s.
    pub gyro_tolerance: f64,
    /// How long consecutive rest samples must last before the probe is
    /// declared stationary.
    ///
    /// The default of zero evaluates every sample on its own, without
    /// hysteresis.
    pub min_rest_duration: Duration,
}

impl Default for ZuptParameters {
    fn default() -> Self {
        Self {
            accel_tolerance: 0.03,
            gyro_tolerance: 0.01,
            min_rest_duration: Duration::ZERO,
        }
    }
}

/// Integrated axial motion.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AxialState {
    /// Displacement along the rod axis since the start, in m.
    pub displacement: f64,
    /// Velocity along the rod axis, in m/s.
    pub velocity: f64,
    /// The current motion state.
    pub motion: MotionState,
    /// How long the rest condition has held.
    ///
    /// [`None`] if the last sample did not satisfy it.
    rest: Option<Duration>,
}

/// ZUPT-gated axial integrator.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AxialIntegrator {
    /// The parameters of the zero-velocity update.
    parameters: ZuptParameters,
    /// The integrated motion.
    pub state: AxialState,
}

impl AxialIntegrator {
    /// Create an integrator at rest at zero displacement.
    #[must_use]
    pub fn new(parameters: ZuptParameters) -> Self {
        Self {
            parameters,
            state: AxialState::default(),
        }
    }

    /// The parameters of the zero-velocity update.
    #[must_use]
    pub fn parameters(&self) -> &ZuptParameters {
        &self.parameters
    }

    /// Returns `true` if a single sample satisfies the rest condition:
    /// $\lVert \hat a - e_z \rVert < \tau_a$ and $\lVert \omega \rVert <
    /// \tau_\omega$.
    ///
    /// A zero accelerometer reading is never at rest.
    #[must_use]
    pub fn is_rest_sample(&self, gyro: &Vector3<f64>, accel: &Vector3<f64>) -> bool {
        accel.try_normalize(0.0).is_some_and(|direction| {
            (direction - Vector3::z()).norm() < self.parameters.accel_tolerance
                && gyro.norm() < self.parameters.gyro_tolerance
        })
    }

    /// Update the motion state with a new sample, `dt` seconds after the
    /// previous one.
    pub fn detect(&mut self, gyro: &Vector3<f64>, accel: &Vector3<f64>, dt: f64) -> MotionState {
        self.state.rest = if self.is_rest_sample(gyro, accel) {
            let dt = Duration::try_from_secs_f64(dt).unwrap_or_default();
            Some(self.state.rest.unwrap_or_default() + dt)
        } else {
            None
        };

        let motion = if self
            .state
            .rest
            .is_some_and(|rest| rest >= self.parameters.min_rest_duration)
        {
            MotionState::Stationary
        } else {
            MotionState::Moving
        };

        if motion != self.state.motion {
            debug!("axial motion state {:?} -> {motion:?}", self.state.motion);
        }
        self.state.motion = motion;
        motion
    }

    /// Integrate the axial acceleration `a_axial` (m/s^2) over `dt` seconds
    /// in the given motion state.
    ///
    /// While moving, the displacement advances with constant acceleration from
    /// the previous velocity, $s \mathrel{+}= v\,dt + \frac{1}{2} a\,dt^2$,
    /// followed by $v \mathrel{+}= a\,dt$. While stationary the velocity is
    /// zero and the displacement holds.
    pub fn integrate(&mut self, a_axial: f64, dt: f64, motion: MotionState) {
        match motion {
            MotionState::Moving => {
                self.state.displacement += self.state.velocity * dt + 0.5 * a_axial * dt * dt;
                self.state.velocity += a_axial * dt;
            }
            MotionState::Stationary => self.state.velocity = 0.0,
        }
    }

    /// [`Self::detect`] followed by [`Self::integrate`].
    pub fn update(
        &mut self,
        gyro: &Vector3<f64>,
        accel: &Vector3<f64>,
        a_axial: f64,
        dt: f64,
    ) -> MotionState {
        let motion = self.detect(gyro, accel, dt);
        self.integrate(a_axial, dt, motion);
        motion
    }

    /// Displacement along the rod axis since the start, in m.
    #[must_use]
    pub fn displacement(&self) -> f64 {
        self.state.displacement
    }

    /// Velocity along the rod axis, in m/s.
    #[must_use]
    pub fn velocity(&self) -> f64 {
        self.state.velocity
    }

    /// Return to zero displacement and velocity.
    pub fn reset(&mut self) {
        self.state = AxialState::default();
    }
}

//! Per-sample orchestration of orientation filtering and axial dead reckoning
//! into the pose of the rod tip.

use log::{trace, warn};
use nalgebra::{UnitQuaternion, Vector3};

use crate::{
    axial::{AxialIntegrator, MotionState, ZuptParameters},
    error::{Sensor, TrackerError},
    filter::{Estimator, FilterKind, OrientationFilter},
    quaternion::to_rotation_matrix,
    sample::{Sample, SampleSlot},
};

/// Parameters for the [`RodTracker`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackerParameters {
    /// Fixed offset $L$ from the IMU to the rod base along the rod axis, in m.
    pub rod_offset: f64,
    /// The orientation filter to run.
    pub filter: FilterKind,
    /// Zero-velocity update thresholds.
    pub zupt: ZuptParameters,
    /// Gravity compensation of the axial acceleration.
    ///
    /// [`None`] integrates the raw body z component of the accelerometer.
    /// `Some(g)` first subtracts the projection of a gravity vector of
    /// magnitude `g` (in the accelerometer's units) onto the rod axis, using
    /// the estimated orientation.
    pub gravity: Option<f64>,
}

impl TrackerParameters {
    /// Default parameters for a rod with the given IMU offset, in m.
    #[must_use]
    pub fn new(rod_offset: f64) -> Self {
        Self {
            rod_offset,
            filter: FilterKind::default(),
            zupt: ZuptParameters::default(),
            gravity: None,
        }
    }

    /// Check that the parameters are in range.
    ///
    /// # Errors
    ///
    /// [`TrackerError::InvalidParameter`] for a negative or non-finite rod
    /// offset, negative ZUPT tolerances, or a non-finite gravity magnitude.
    pub fn validate(&self) -> Result<(), TrackerError> {
        if !self.rod_offset.is_finite() || self.rod_offset < 0.0 {
            return Err(TrackerError::InvalidParameter {
                name: "rod_offset",
                reason: format!("{} is not a finite length >= 0", self.rod_offset),
            });
        }

        for (name, value) in [
            ("zupt.accel_tolerance", self.zupt.accel_tolerance),
            ("zupt.gyro_tolerance", self.zupt.gyro_tolerance),
        ] {
            if value.is_nan() || value < 0.0 {
                return Err(TrackerError::InvalidParameter {
                    name,
                    reason: format!("{value} is not >= 0"),
                });
            }
        }

        if let Some(g) = self.gravity {
            if !g.is_finite() {
                return Err(TrackerError::InvalidParameter {
                    name: "gravity",
                    reason: format!("{g} is not finite"),
                });
            }
        }

        Ok(())
    }
}

/// The pose of the rod after a sample.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackerOutput {
    /// Position of the rod tip in the navigation frame, in m.
    pub tip_position: Vector3<f64>,
    /// Body-to-navigation orientation.
    pub orientation: UnitQuaternion<f64>,
    /// Displacement along the rod axis since the start, in m.
    pub axial_displacement: f64,
    /// Velocity along the rod axis, in m/s.
    pub axial_velocity: f64,
    /// The zero-velocity detector's verdict for this sample.
    pub motion: MotionState,
    /// Whether a zero-norm accelerometer or magnetometer reading was replaced
    /// by a placeholder.
    pub degenerate_measurement: bool,
}

impl TrackerOutput {
    /// The output of a tracker that has not moved.
    fn at_rest(rod_offset: f64) -> Self {
        Self {
            tip_position: Vector3::new(0.0, 0.0, rod_offset),
            orientation: UnitQuaternion::identity(),
            axial_displacement: 0.0,
            axial_velocity: 0.0,
            motion: MotionState::default(),
            degenerate_measurement: false,
        }
    }

    /// Returns `true` if every field of the pose is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.tip_position.iter().all(|x| x.is_finite())
            && self.orientation.coords.iter().all(|x| x.is_finite())
            && self.axial_displacement.is_finite()
            && self.axial_velocity.is_finite()
    }

    /// The orientation as `[w, x, y, z]`.
    #[must_use]
    pub fn orientation_wxyz(&self) -> [f64; 4] {
        let q = self.orientation;
        [q.w, q.i, q.j, q.k]
    }
}

/// Tracks the tip of a rod from a stream of IMU samples.
///
/// A tracker owns all of its state. Independent trackers can run on separate
/// threads, but a single tracker must be fed sequentially.
#[derive(Debug, Clone)]
pub struct RodTracker {
    /// The parameters of the tracker.
    parameters: TrackerParameters,
    /// The orientation filter.
    filter: Estimator,
    /// Axial dead reckoning.
    axial: AxialIntegrator,
    /// Timestamp of the last accepted sample.
    previous_timestamp: Option<f64>,
    /// Output of the last accepted sample.
    last_output: TrackerOutput,
}

impl RodTracker {
    /// Create a tracker at the identity orientation with zero displacement.
    ///
    /// # Errors
    ///
    /// See [`TrackerParameters::validate`].
    pub fn new(parameters: TrackerParameters) -> Result<Self, TrackerError> {
        parameters.validate()?;

        Ok(Self {
            filter: Estimator::new(&parameters.filter),
            axial: AxialIntegrator::new(parameters.zupt.clone()),
            previous_timestamp: None,
            last_output: TrackerOutput::at_rest(parameters.rod_offset),
            parameters,
        })
    }

    /// The parameters of the tracker.
    #[must_use]
    pub fn parameters(&self) -> &TrackerParameters {
        &self.parameters
    }

    /// The orientation filter.
    #[must_use]
    pub fn filter(&self) -> &Estimator {
        &self.filter
    }

    /// The output of the last accepted sample.
    #[must_use]
    pub fn last_output(&self) -> &TrackerOutput {
        &self.last_output
    }

    /// Process one sample, reporting faults to the caller.
    ///
    /// A rejected sample leaves the tracker untouched.
    ///
    /// # Errors
    ///
    /// - [`TrackerError::MalformedSample`] if the sample holds non-finite
    ///   values.
    /// - [`TrackerError::NonMonotonicTimestamp`] if the sample is not newer
    ///   than the previously accepted one.
    /// - [`TrackerError::NonFiniteOutput`] if finite but extreme readings
    ///   overflow the pose.
    pub fn try_update(&mut self, sample: &Sample) -> Result<TrackerOutput, TrackerError> {
        sample.validate()?;

        let dt = match self.previous_timestamp {
            Some(previous) if sample.timestamp <= previous => {
                return Err(TrackerError::NonMonotonicTimestamp {
                    previous,
                    current: sample.timestamp,
                });
            }
            Some(previous) => sample.timestamp - previous,
            None => 0.0,
        };

        let degenerate_measurement = self.check_degenerate(sample);

        // step copies so a non-finite result leaves the tracker untouched
        let mut filter = self.filter.clone();
        let mut axial = self.axial.clone();

        filter.predict(&sample.gyro, dt);
        let orientation = filter.update(&sample.accel, &sample.mag);
        let rotation = to_rotation_matrix(&orientation);

        // the rod axis is the body z axis, so the axial component of the body
        // frame acceleration is its z component
        let a_axial = match self.parameters.gravity {
            Some(g) => sample.accel.z - g * rotation[(2, 2)],
            None => sample.accel.z,
        };

        let motion = axial.update(&sample.gyro, &sample.accel, a_axial, dt);
        let axial_displacement = axial.displacement();

        let output = TrackerOutput {
            tip_position: rotation
                * Vector3::new(0.0, 0.0, self.parameters.rod_offset + axial_displacement),
            orientation,
            axial_displacement,
            axial_velocity: axial.velocity(),
            motion,
            degenerate_measurement,
        };
        trace!("t = {} s: {output:?}", sample.timestamp);

        if !output.is_finite() {
            return Err(TrackerError::NonFiniteOutput {
                timestamp: sample.timestamp,
            });
        }

        self.filter = filter;
        self.axial = axial;
        self.previous_timestamp = Some(sample.timestamp);
        self.last_output = output;
        Ok(output)
    }

    /// Process one sample.
    ///
    /// Faulty samples are logged and dropped, and the previous output is
    /// returned unchanged.
    pub fn update(&mut self, sample: &Sample) -> TrackerOutput {
        match self.try_update(sample) {
            Ok(output) => output,
            Err(error) => {
                warn!("dropping sample at t = {} s: {error}", sample.timestamp);
                self.last_output
            }
        }
    }

    /// Process the sample waiting in `slot`, if any, removing it from the
    /// slot.
    pub fn poll(&mut self, slot: &SampleSlot) -> Option<TrackerOutput> {
        slot.take().map(|sample| self.update(&sample))
    }

    /// Process a recorded stream, returning one output per sample.
    pub fn track<I>(&mut self, samples: I) -> Vec<TrackerOutput>
    where
        I: IntoIterator<Item = Sample>,
    {
        samples
            .into_iter()
            .map(|sample| self.update(&sample))
            .collect()
    }

    /// Return to the identity orientation with zero displacement and forget
    /// the previous timestamp.
    pub fn reset(&mut self) {
        self.filter.reset();
        self.axial.reset();
        self.previous_timestamp = None;
        self.last_output = TrackerOutput::at_rest(self.parameters.rod_offset);
    }

    fn check_degenerate(&self, sample: &Sample) -> bool {
        let mut degenerate = false;

        for (sensor, v) in [
            (Sensor::Accelerometer, &sample.accel),
            (Sensor::Magnetometer, &sample.mag),
        ] {
            if v.norm() == 0.0 {
                let fault = TrackerError::DegenerateMeasurement { sensor };
                warn!("{fault} at t = {} s, substituting a placeholder", sample.timestamp);
                degenerate = true;
            }
        }

        degenerate
    }
}

//! Fault taxonomy for the estimator.
//!
//! None of these are fatal: [`RodTracker::update`](crate::RodTracker::update)
//! degrades every fault to "reuse the last good state", while
//! [`RodTracker::try_update`](crate::RodTracker::try_update) reports them to
//! the caller.

use thiserror::Error;

/// The sensor a degenerate measurement came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Sensor {
    /// The accelerometer.
    Accelerometer,
    /// The magnetometer.
    Magnetometer,
}

impl core::fmt::Display for Sensor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Sensor::Accelerometer => f.write_str("accelerometer"),
            Sensor::Magnetometer => f.write_str("magnetometer"),
        }
    }
}

/// Errors produced while processing a sample.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackerError {
    /// A quaternion with zero norm cannot be normalized.
    #[error("cannot normalize a zero-norm quaternion")]
    DegenerateQuaternion,

    /// A direction measurement had zero norm and was replaced by a placeholder.
    #[error("zero-norm {sensor} measurement")]
    DegenerateMeasurement {
        /// The offending sensor.
        sensor: Sensor,
    },

    /// The sample is not newer than the previously processed one.
    #[error("non-monotonic timestamp: {current} s does not follow {previous} s")]
    NonMonotonicTimestamp {
        /// Timestamp of the last processed sample, in seconds.
        previous: f64,
        /// Timestamp of the rejected sample, in seconds.
        current: f64,
    },

    /// Processing the sample overflowed the pose to non-finite values.
    #[error("sample at {timestamp} s produced a non-finite pose")]
    NonFiniteOutput {
        /// Timestamp of the rejected sample, in seconds.
        timestamp: f64,
    },

    /// The sample contains non-finite values or has the wrong shape.
    #[error("malformed sample: {reason}")]
    MalformedSample {
        /// What was wrong with the sample.
        reason: String,
    },

    /// A configuration value is out of range.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        /// The parameter name.
        name: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

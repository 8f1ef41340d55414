//! Raw IMU samples and the single-slot container that hands them from a
//! reader thread to a tracker.

use nalgebra::Vector3;
use parking_lot::Mutex;

use crate::error::TrackerError;

/// One timestamped 9-DoF reading.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sample {
    /// Sample time in seconds, strictly increasing over a stream.
    pub timestamp: f64,
    /// Angular rate in rad/s.
    pub gyro: Vector3<f64>,
    /// Specific force, in g or m/s^2.
    pub accel: Vector3<f64>,
    /// Magnetic field, in any consistent unit.
    pub mag: Vector3<f64>,
}

impl Sample {
    /// Create a sample from plain arrays.
    #[must_use]
    pub fn new(timestamp: f64, gyro: [f64; 3], accel: [f64; 3], mag: [f64; 3]) -> Self {
        Self {
            timestamp,
            gyro: gyro.into(),
            accel: accel.into(),
            mag: mag.into(),
        }
    }

    /// Create a sample from slices, as produced by a decoder that does not
    /// know the vector length statically.
    ///
    /// # Errors
    ///
    /// [`TrackerError::MalformedSample`] if a slice does not hold exactly
    /// three values or any value is not finite.
    pub fn from_slices(
        timestamp: f64,
        gyro: &[f64],
        accel: &[f64],
        mag: &[f64],
    ) -> Result<Self, TrackerError> {
        let sample = Self {
            timestamp,
            gyro: vector("gyro", gyro)?,
            accel: vector("accel", accel)?,
            mag: vector("mag", mag)?,
        };
        sample.validate()?;
        Ok(sample)
    }

    /// Check that every value of the sample is finite.
    ///
    /// # Errors
    ///
    /// [`TrackerError::MalformedSample`] naming the first offending field.
    pub fn validate(&self) -> Result<(), TrackerError> {
        if !self.timestamp.is_finite() {
            return Err(malformed(format!("timestamp {} is not finite", self.timestamp)));
        }

        for (name, v) in [("gyro", &self.gyro), ("accel", &self.accel), ("mag", &self.mag)] {
            if v.iter().any(|x| !x.is_finite()) {
                return Err(malformed(format!("{name} {:?} is not finite", v.as_slice())));
            }
        }

        Ok(())
    }
}

fn malformed(reason: String) -> TrackerError {
    TrackerError::MalformedSample { reason }
}

fn vector(name: &str, values: &[f64]) -> Result<Vector3<f64>, TrackerError> {
    match values {
        [x, y, z] => Ok(Vector3::new(*x, *y, *z)),
        _ => Err(malformed(format!(
            "{name} has {} components, expected 3",
            values.len()
        ))),
    }
}

/// A thread-safe slot holding the most recent sample.
///
/// A sensor reader publishes into the slot from its own thread while a
/// tracker reads from it. Every read observes one whole sample, never a mix
/// of fields from two different samples.
#[derive(Debug, Default)]
pub struct SampleSlot {
    latest: Mutex<Option<Sample>>,
}

impl SampleSlot {
    /// Create an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored sample with `sample`.
    pub fn publish(&self, sample: Sample) {
        *self.latest.lock() = Some(sample);
    }

    /// A snapshot of the stored sample, leaving it in place.
    #[must_use]
    pub fn latest(&self) -> Option<Sample> {
        *self.latest.lock()
    }

    /// Remove and return the stored sample.
    #[must_use]
    pub fn take(&self) -> Option<Sample> {
        self.latest.lock().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread};

    #[test]
    fn from_slices_rejects_wrong_length() {
        let result = Sample::from_slices(0.0, &[0.0, 0.0], &[0.0, 0.0, 1.0], &[1.0, 0.0, 0.0]);
        assert!(matches!(result, Err(TrackerError::MalformedSample { .. })));
    }

    #[test]
    fn from_slices_rejects_nan() {
        let result = Sample::from_slices(0.0, &[0.0; 3], &[0.0, f64::NAN, 1.0], &[1.0, 0.0, 0.0]);
        assert!(matches!(result, Err(TrackerError::MalformedSample { .. })));
    }

    #[test]
    fn validate_rejects_infinite_timestamp() {
        let sample = Sample::new(f64::INFINITY, [0.0; 3], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0]);
        assert!(sample.validate().is_err());
    }

    #[test]
    fn from_slices_accepts_valid_sample() {
        let sample = Sample::from_slices(1.5, &[0.1, 0.2, 0.3], &[0.0, 0.0, 1.0], &[1.0, 0.0, 0.0]).unwrap();
        assert_eq!(sample, Sample::new(1.5, [0.1, 0.2, 0.3], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0]));
    }

    #[test]
    fn take_empties_the_slot() {
        let slot = SampleSlot::new();
        assert_eq!(slot.latest(), None);

        let sample = Sample::new(0.0, [0.0; 3], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0]);
        slot.publish(sample);

        assert_eq!(slot.latest(), Some(sample));
        assert_eq!(slot.take(), Some(sample));
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn concurrent_reads_see_whole_samples() {
        let slot = Arc::new(SampleSlot::new());

        let writer = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || {
                for i in 0..10_000 {
                    let v = f64::from(i);
                    slot.publish(Sample::new(v, [v; 3], [v; 3], [v; 3]));
                }
            })
        };

        for _ in 0..10_000 {
            if let Some(sample) = slot.latest() {
                let t = sample.timestamp;
                assert!(sample.gyro.iter().chain(&sample.accel).chain(&sample.mag).all(|&x| x == t));
            }
        }

        writer.join().unwrap();
    }
}

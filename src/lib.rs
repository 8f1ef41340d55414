//! Pose estimation for a rod-shaped probe carrying a 9-DoF IMU.
//!
//! Each timestamped sample of gyroscope, accelerometer and magnetometer
//! readings flows through a [`RodTracker`]:
//!
//! 1. an [`OrientationFilter`] (by default the [`OrientationEkf`]) predicts
//!    with the gyroscope and corrects with gravity and magnetic field
//!    directions, then with a tilt-compensated heading,
//! 2. the [`AxialIntegrator`] integrates the acceleration along the rod axis,
//!    clamping the velocity to zero whenever the probe is at rest (ZUPT),
//! 3. the tip position is the rod axis `[0, 0, L + s]` rotated into the
//!    navigation frame.
//!
//! ```rust
//! use rod_pose::{RodTracker, Sample, TrackerParameters};
//!
//! let mut tracker = RodTracker::new(TrackerParameters::new(0.13)).unwrap();
//!
//! for i in 0..5 {
//!     let t = f64::from(i) * 0.1;
//!     let output = tracker.update(&Sample::new(t, [0.0; 3], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0]));
//!     assert!((output.tip_position.z - 0.13).abs() < 1e-9);
//! }
//! ```

pub mod axial;
pub mod ekf;
pub mod error;
pub mod filter;
pub mod heading;
pub mod madgwick;
pub mod quaternion;
pub mod sample;
pub mod tracker;

pub use axial::{AxialIntegrator, AxialState, MotionState, ZuptParameters};
pub use ekf::{EkfParameters, EkfState, OrientationEkf};
pub use error::{Sensor, TrackerError};
pub use filter::{Estimator, FilterKind, OrientationFilter};
pub use heading::{HeadingCorrector, HeadingMeasurement};
pub use madgwick::{Madgwick, MadgwickParameters};
pub use sample::{Sample, SampleSlot};
pub use tracker::{RodTracker, TrackerOutput, TrackerParameters};

//! Core dispatch engine for multi-axis inertial sensor hubs
//!
//! Ingests a single interleaved, self-framing byte stream from an inertial
//! measurement device and republishes it as independently-rated,
//! independently-enabled logical sensor streams.
//!
//! The hard problems live here:
//! - Decoding a tag-prefixed record stream that may be split arbitrarily
//!   across read boundaries (`framer`)
//! - Reconciling many logical sensors that share a few physical measurement
//!   engines into one minimal hardware configuration (`arbitrator`)
//! - Decimating a shared high-rate stream into several lower output rates,
//!   with batch/queue delivery and per-sensor flush arbitration (`gate`,
//!   `batch`)
//!
//! Calibration and fusion math is deliberately *not* here: it sits behind
//! the opaque [`CalibrationProvider`] trait.
//!
//! ```no_run
//! use motionhub_core::{HubBuilder, SensorKind, UnitCalibration, NoopBatchPort};
//! use core::time::Duration;
//!
//! let mut hub = HubBuilder::new().build(UnitCalibration::new(), NoopBatchPort);
//!
//! hub.enable(SensorKind::Gyroscope, true).unwrap();
//! hub.set_interval(SensorKind::Gyroscope, Duration::from_millis(20)).unwrap();
//!
//! // let chunk = device.read(...);
//! // hub.poll_chunk(&chunk).unwrap();
//! // while let Some(event) = hub.pop_event() { /* deliver */ }
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]

#[cfg(not(feature = "std"))]
extern crate alloc;

// Macros for optional logging
#[cfg(feature = "log")]
macro_rules! log_warn {
    ($($arg:tt)*) => { log::warn!($($arg)*) };
}

#[cfg(not(feature = "log"))]
macro_rules! log_warn {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "log")]
macro_rules! log_debug {
    ($($arg:tt)*) => { log::debug!($($arg)*) };
}

#[cfg(not(feature = "log"))]
macro_rules! log_debug {
    ($($arg:tt)*) => {};
}

pub mod arbitrator;
pub mod batch;
pub mod calibration;
pub mod engines;
pub mod errors;
pub mod events;
pub mod framer;
pub mod gate;
pub mod hub;
pub mod records;
pub mod router;
pub mod sensors;
pub mod time;

// Public API
pub use calibration::{CalibrationProvider, Calibrated, FusedQuat, RawSample, UnitCalibration};
pub use engines::{CalibrationMode, Engine, EngineId, EngineSet, NoopEngine};
pub use errors::{ControlError, DecodeError, HubError, HubResult};
pub use events::{HubEvent, SampleValue};
pub use hub::{Hub, HubBuilder};
pub use batch::{BatchPort, NoopBatchPort};
pub use records::{Record, RecordBody, RecordKind};
pub use sensors::{Accuracy, DeliveryMode, SensorKind};
pub use time::Timestamp;

/// Crate version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

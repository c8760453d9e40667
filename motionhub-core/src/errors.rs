//! Error types for decode, control, and caller-input failures
//!
//! ## Design
//!
//! Errors here follow the taxonomy of the hub's failure model:
//!
//! 1. **Decode errors** ([`DecodeError`]): the byte stream is corrupt. The
//!    framer drops its accumulated buffer and the stream resynchronizes on
//!    the next read. Never fatal. A *truncated* record is not an error at
//!    all — the framer retains the partial bytes and reports
//!    `nb::Error::WouldBlock`.
//!
//! 2. **Control failures** ([`ControlError`]): a write to a device control
//!    path failed. The arbitrator logs it and leaves its cached
//!    configuration at the pre-call value, so the next reconciliation
//!    retries instead of silently diverging from real hardware state.
//!
//! 3. **Caller errors** ([`HubError`]): invalid input on the configuration
//!    surface (unknown sensor, zero interval, flush on a disabled sensor).
//!    Rejected synchronously, no state mutated.
//!
//! Nothing in this crate escalates to a panic or process termination; every
//! variant is `Copy` and small enough to return from hot paths.

use thiserror_no_std::Error;

/// Result type for configuration-surface operations
pub type HubResult<T> = Result<T, HubError>;

/// Stream decode errors
///
/// Truncation is intentionally absent: a partial trailing record is normal
/// framing state, surfaced as `nb::Error::WouldBlock` by the framer.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// A 2-byte tag at the buffer head matched no known record kind.
    ///
    /// The entire accumulated buffer is dropped: resyncing byte-by-byte
    /// risks locking onto a false header inside a payload.
    #[error("unknown record tag {tag:#06x}, buffer dropped")]
    UnknownTag {
        /// The unrecognized tag value
        tag: u16,
    },

    /// The carry-over arena cannot hold the accumulated partial record
    /// plus the new chunk. The buffer is dropped and framing restarts.
    #[error("framer arena overflow, {dropped} buffered bytes dropped")]
    Overflow {
        /// Bytes discarded from the arena
        dropped: usize,
    },
}

/// Device control-path write failures
///
/// Produced by [`Engine`](crate::engines::Engine) and
/// [`BatchPort`](crate::batch::BatchPort) implementations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlError {
    /// The device rejected the written value
    #[error("device rejected control write")]
    Rejected,

    /// The control path could not be reached
    #[error("control path unavailable")]
    Unavailable,
}

/// Invalid caller input on the configuration surface
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubError {
    /// No logical sensor has this id
    #[error("unknown logical sensor id {id}")]
    UnknownSensor {
        /// The rejected id
        id: u8,
    },

    /// Sample intervals must be non-zero
    #[error("sample interval must be non-zero")]
    ZeroInterval,

    /// Flush requested for a sensor that is not enabled
    #[error("sensor {id} is not enabled")]
    SensorDisabled {
        /// Id of the disabled sensor
        id: u8,
    },

    /// The pending-flush queue is full
    #[error("too many pending flush requests")]
    FlushBacklog,
}

#[cfg(feature = "defmt")]
impl defmt::Format for DecodeError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::UnknownTag { tag } => defmt::write!(fmt, "unknown tag {=u16:#x}", tag),
            Self::Overflow { dropped } => defmt::write!(fmt, "arena overflow, {} dropped", dropped),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ControlError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::Rejected => defmt::write!(fmt, "control write rejected"),
            Self::Unavailable => defmt::write!(fmt, "control path unavailable"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for HubError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::UnknownSensor { id } => defmt::write!(fmt, "unknown sensor {}", id),
            Self::ZeroInterval => defmt::write!(fmt, "zero interval"),
            Self::SensorDisabled { id } => defmt::write!(fmt, "sensor {} disabled", id),
            Self::FlushBacklog => defmt::write!(fmt, "flush backlog full"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_are_small() {
        // Returned from hot paths; keep them register-sized.
        assert!(core::mem::size_of::<DecodeError>() <= 16);
        assert!(core::mem::size_of::<HubError>() <= 4);
    }
}

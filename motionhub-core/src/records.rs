//! Record kinds and fixed wire layouts for the device sample stream
//!
//! ## Wire format
//!
//! Every record starts with a 2-byte little-endian kind tag. The tag alone
//! determines the total record size; there is no length field. Three layouts
//! exist:
//!
//! ```text
//! 8-byte (status, markers, gesture pulses — no timestamp):
//! ┌────────┬──────────────┬──────────┐
//! │ tag    │ value (i32)  │ reserved │
//! │ 2 B    │ 4 B          │ 2 B      │
//! └────────┴──────────────┴──────────┘
//!
//! 16-byte (raw three-axis and timestamped scalars):
//! ┌────────┬─────────────────────┬─────────────────┐
//! │ tag    │ x, y, z (3 × i16)   │ timestamp (u64) │
//! │ 2 B    │ 6 B                 │ 8 B             │
//! └────────┴─────────────────────┴─────────────────┘
//!
//! 24-byte (calibrated three-axis, quaternions, step count):
//! ┌────────┬──────────┬─────────────────────┬─────────────────┐
//! │ tag    │ reserved │ w0, w1, w2 (3 × i32)│ timestamp (u64) │
//! │ 2 B    │ 2 B      │ 12 B                │ 8 B             │
//! └────────┴──────────┴─────────────────────┴─────────────────┘
//! ```
//!
//! Quaternion records carry three elements without the real part, which the
//! calibration provider reconstructs. The step-count record packs a `u64`
//! running count into its first two words.

use crate::time::Timestamp;

/// Length of the kind tag prefix
pub const TAG_LEN: usize = 2;

/// Largest record size on the wire
pub const MAX_RECORD_LEN: usize = 24;

/// Record kind, identified by the 2-byte wire tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u16)]
pub enum RecordKind {
    /// Raw accelerometer sample
    Accel = 1,
    /// Raw gyroscope sample
    GyroRaw = 2,
    /// Raw magnetometer sample
    CompassRaw = 3,
    /// Ambient light (x) and proximity (y) sample
    Light = 4,
    /// Six-axis (gyro+accel) quaternion from the DSP
    SixAxisQuat = 5,
    /// Nine-axis quaternion from the DSP
    NineAxisQuat = 6,
    /// Low-power pedometer quaternion from the DSP
    PedQuat = 7,
    /// Geomagnetic (accel+compass) quaternion from the DSP
    GeomagQuat = 8,
    /// Barometric pressure sample (x axis)
    Pressure = 9,
    /// Pre-calibrated gyroscope sample
    Gyro = 10,
    /// Pre-calibrated magnetometer sample
    Compass = 11,
    /// Running pedometer step count
    StepCount = 12,
    /// Standalone step event with its own timestamp
    StepStandalone = 13,
    /// Step-detector pulse
    Step = 14,
    /// Activity classifier status change
    Activity = 15,
    /// Pickup gesture pulse
    Pickup = 16,
    /// Batch drain produced no data for the window
    EmptyMarker = 17,
    /// Device-side flush completion marker
    FlushMarker = 18,
    /// Compass calibration accuracy grade (value = grade)
    CompassAccuracy = 19,
    /// Accel calibration accuracy grade (value = grade)
    AccelAccuracy = 20,
    /// Gyro calibration accuracy grade (value = grade)
    GyroAccuracy = 21,
    /// Tilt gesture pulse
    Tilt = 22,
}

impl RecordKind {
    /// Look up a kind from its wire tag
    pub fn from_tag(tag: u16) -> Option<Self> {
        Some(match tag {
            1 => Self::Accel,
            2 => Self::GyroRaw,
            3 => Self::CompassRaw,
            4 => Self::Light,
            5 => Self::SixAxisQuat,
            6 => Self::NineAxisQuat,
            7 => Self::PedQuat,
            8 => Self::GeomagQuat,
            9 => Self::Pressure,
            10 => Self::Gyro,
            11 => Self::Compass,
            12 => Self::StepCount,
            13 => Self::StepStandalone,
            14 => Self::Step,
            15 => Self::Activity,
            16 => Self::Pickup,
            17 => Self::EmptyMarker,
            18 => Self::FlushMarker,
            19 => Self::CompassAccuracy,
            20 => Self::AccelAccuracy,
            21 => Self::GyroAccuracy,
            22 => Self::Tilt,
            _ => return None,
        })
    }

    /// Wire tag for this kind
    pub const fn tag(self) -> u16 {
        self as u16
    }

    /// Total record size on the wire, including the tag
    pub const fn size(self) -> usize {
        match self {
            Self::Step
            | Self::Activity
            | Self::Pickup
            | Self::EmptyMarker
            | Self::FlushMarker
            | Self::CompassAccuracy
            | Self::AccelAccuracy
            | Self::GyroAccuracy
            | Self::Tilt => 8,
            Self::Accel
            | Self::GyroRaw
            | Self::CompassRaw
            | Self::Light
            | Self::Pressure
            | Self::StepStandalone => 16,
            Self::SixAxisQuat
            | Self::NineAxisQuat
            | Self::PedQuat
            | Self::GeomagQuat
            | Self::Gyro
            | Self::Compass
            | Self::StepCount => 24,
        }
    }

    /// Whether the wire layout carries a timestamp
    pub const fn has_timestamp(self) -> bool {
        self.size() != 8
    }

    /// All kinds, in tag order
    pub const ALL: [RecordKind; 22] = [
        Self::Accel,
        Self::GyroRaw,
        Self::CompassRaw,
        Self::Light,
        Self::SixAxisQuat,
        Self::NineAxisQuat,
        Self::PedQuat,
        Self::GeomagQuat,
        Self::Pressure,
        Self::Gyro,
        Self::Compass,
        Self::StepCount,
        Self::StepStandalone,
        Self::Step,
        Self::Activity,
        Self::Pickup,
        Self::EmptyMarker,
        Self::FlushMarker,
        Self::CompassAccuracy,
        Self::AccelAccuracy,
        Self::GyroAccuracy,
        Self::Tilt,
    ];
}

/// Decoded record payload, one variant per wire layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordBody {
    /// 8-byte layout value
    Scalar(i32),
    /// 16-byte layout axes
    Axes([i16; 3]),
    /// 24-byte layout words
    Words([i32; 3]),
}

/// A fully-buffered decoded record
///
/// Ephemeral: produced by the framer, consumed immediately by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    /// Record kind from the wire tag
    pub kind: RecordKind,
    /// Device timestamp in nanoseconds; zero for 8-byte kinds
    pub timestamp: Timestamp,
    /// Decoded payload
    pub body: RecordBody,
}

impl Record {
    /// Build an 8-byte record
    pub fn scalar(kind: RecordKind, value: i32) -> Self {
        debug_assert_eq!(kind.size(), 8);
        Self { kind, timestamp: 0, body: RecordBody::Scalar(value) }
    }

    /// Build a 16-byte record
    pub fn axes(kind: RecordKind, axes: [i16; 3], timestamp: Timestamp) -> Self {
        debug_assert_eq!(kind.size(), 16);
        Self { kind, timestamp, body: RecordBody::Axes(axes) }
    }

    /// Build a 24-byte record
    pub fn words(kind: RecordKind, words: [i32; 3], timestamp: Timestamp) -> Self {
        debug_assert_eq!(kind.size(), 24);
        Self { kind, timestamp, body: RecordBody::Words(words) }
    }

    /// Build a step-count record with the count packed into the words
    pub fn step_count(count: u64, timestamp: Timestamp) -> Self {
        let low = count as u32 as i32;
        let high = (count >> 32) as u32 as i32;
        Self::words(RecordKind::StepCount, [low, high, 0], timestamp)
    }

    /// Unpack a step count from a `StepCount` record
    pub fn count(&self) -> u64 {
        match self.body {
            RecordBody::Words([low, high, _]) => {
                (low as u32 as u64) | ((high as u32 as u64) << 32)
            }
            RecordBody::Scalar(v) => v as u32 as u64,
            RecordBody::Axes(_) => 0,
        }
    }

    /// Decode a record from an exact-size wire slice
    ///
    /// The caller (the framer) guarantees `bytes.len() == kind.size()` and
    /// that the tag has already been validated.
    pub(crate) fn decode(kind: RecordKind, bytes: &[u8]) -> Self {
        debug_assert_eq!(bytes.len(), kind.size());
        match kind.size() {
            8 => {
                let value = i32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
                Self { kind, timestamp: 0, body: RecordBody::Scalar(value) }
            }
            16 => {
                let mut axes = [0i16; 3];
                for (i, axis) in axes.iter_mut().enumerate() {
                    let at = TAG_LEN + i * 2;
                    *axis = i16::from_le_bytes([bytes[at], bytes[at + 1]]);
                }
                let timestamp = read_u64(&bytes[8..16]);
                Self { kind, timestamp, body: RecordBody::Axes(axes) }
            }
            _ => {
                let mut words = [0i32; 3];
                for (i, word) in words.iter_mut().enumerate() {
                    let at = 4 + i * 4;
                    *word = i32::from_le_bytes([
                        bytes[at],
                        bytes[at + 1],
                        bytes[at + 2],
                        bytes[at + 3],
                    ]);
                }
                let timestamp = read_u64(&bytes[16..24]);
                Self { kind, timestamp, body: RecordBody::Words(words) }
            }
        }
    }

    /// Encode this record into `out`, returning the encoded length
    ///
    /// `out` must hold at least [`MAX_RECORD_LEN`] bytes. Used by device
    /// simulators and round-trip tests; the hub itself only decodes.
    pub fn encode(&self, out: &mut [u8]) -> usize {
        let size = self.kind.size();
        out[..size].fill(0);
        out[..TAG_LEN].copy_from_slice(&self.kind.tag().to_le_bytes());
        match (size, self.body) {
            (8, RecordBody::Scalar(value)) => {
                out[2..6].copy_from_slice(&value.to_le_bytes());
            }
            (16, RecordBody::Axes(axes)) => {
                for (i, axis) in axes.iter().enumerate() {
                    let at = TAG_LEN + i * 2;
                    out[at..at + 2].copy_from_slice(&axis.to_le_bytes());
                }
                out[8..16].copy_from_slice(&self.timestamp.to_le_bytes());
            }
            (24, RecordBody::Words(words)) => {
                for (i, word) in words.iter().enumerate() {
                    let at = 4 + i * 4;
                    out[at..at + 4].copy_from_slice(&word.to_le_bytes());
                }
                out[16..24].copy_from_slice(&self.timestamp.to_le_bytes());
            }
            // Body does not match the kind's layout; encode zeros so the
            // wire stays well-formed.
            _ => {}
        }
        size
    }
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    u64::from_le_bytes(raw)
}

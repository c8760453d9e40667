//! Logical sensor identities, per-sensor state, and delivery modes
//!
//! A *logical sensor* is one independently enable/rate-controllable output
//! stream presented to the consumer. Several logical sensors usually share
//! one physical engine (the accelerometer triad feeds the accel stream, the
//! gravity stream, the step detector, ...), which is exactly why the
//! arbitrator exists.
//!
//! All sensors are created once at startup and live for the process
//! lifetime; enable/disable only flips state, it never destroys.

use core::time::Duration;

use crate::errors::HubError;
use crate::time::Timestamp;

/// Number of logical sensors
pub const SENSOR_COUNT: usize = 18;

/// Logical sensor identity
///
/// Ids are stable small integers; the discriminant is the consumer-visible
/// id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
#[allow(missing_docs)]
pub enum SensorKind {
    Gyroscope = 0,
    GyroscopeRaw = 1,
    Accelerometer = 2,
    Magnetometer = 3,
    MagnetometerRaw = 4,
    Orientation = 5,
    RotationVector = 6,
    GameRotationVector = 7,
    LinearAcceleration = 8,
    Gravity = 9,
    GeomagneticRotationVector = 10,
    StepDetector = 11,
    StepCounter = 12,
    Tilt = 13,
    Pickup = 14,
    Pressure = 15,
    Light = 16,
    Proximity = 17,
}

impl SensorKind {
    /// All logical sensors, in id order
    pub const ALL: [SensorKind; SENSOR_COUNT] = [
        Self::Gyroscope,
        Self::GyroscopeRaw,
        Self::Accelerometer,
        Self::Magnetometer,
        Self::MagnetometerRaw,
        Self::Orientation,
        Self::RotationVector,
        Self::GameRotationVector,
        Self::LinearAcceleration,
        Self::Gravity,
        Self::GeomagneticRotationVector,
        Self::StepDetector,
        Self::StepCounter,
        Self::Tilt,
        Self::Pickup,
        Self::Pressure,
        Self::Light,
        Self::Proximity,
    ];

    /// Stable consumer-visible id
    pub const fn id(self) -> u8 {
        self as u8
    }

    /// Look up a sensor from its id
    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    /// Human-readable name
    pub const fn name(self) -> &'static str {
        match self {
            Self::Gyroscope => "gyroscope",
            Self::GyroscopeRaw => "gyroscope-raw",
            Self::Accelerometer => "accelerometer",
            Self::Magnetometer => "magnetometer",
            Self::MagnetometerRaw => "magnetometer-raw",
            Self::Orientation => "orientation",
            Self::RotationVector => "rotation-vector",
            Self::GameRotationVector => "game-rotation-vector",
            Self::LinearAcceleration => "linear-acceleration",
            Self::Gravity => "gravity",
            Self::GeomagneticRotationVector => "geomagnetic-rotation-vector",
            Self::StepDetector => "step-detector",
            Self::StepCounter => "step-counter",
            Self::Tilt => "tilt",
            Self::Pickup => "pickup",
            Self::Pressure => "pressure",
            Self::Light => "light",
            Self::Proximity => "proximity",
        }
    }

    /// Edge-triggered sensors emit on occurrence, not on a rate
    pub const fn is_edge_triggered(self) -> bool {
        matches!(self, Self::StepDetector | Self::Tilt | Self::Pickup)
    }
}

/// Calibration accuracy grade, worst to best
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Accuracy {
    /// Calibration has not converged
    Unreliable = 0,
    /// Low confidence
    Low = 1,
    /// Medium confidence
    Medium = 2,
    /// Fully calibrated
    High = 3,
}

impl Accuracy {
    /// Clamp a raw device grade into the enum range
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            i32::MIN..=0 => Self::Unreliable,
            1 => Self::Low,
            2 => Self::Medium,
            _ => Self::High,
        }
    }
}

/// Delivery mode of a logical sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Not emitting
    Disabled,
    /// Samples delivered as produced, decimated to the requested rate
    Continuous,
    /// Samples accumulate device-side and drain on the batch timeout
    Batched,
}

/// Per-sensor mutable state
///
/// Mutated on every enable/disable/interval/batch call and on every routed
/// sample; owned exclusively by the hub.
#[derive(Debug, Clone, Copy)]
pub struct LogicalSensor {
    /// Which sensor this is
    pub kind: SensorKind,
    /// Consumer-requested enablement
    pub enabled: bool,
    /// Requested sample interval
    pub interval: Duration,
    /// Requested batch timeout; zero means no batching
    pub batch_timeout: Duration,
    /// Timestamp of the last emitted event, zero before the first
    pub last_emitted: Timestamp,
    /// Last emitted step count, for duplicate suppression
    pub last_count: u64,
    /// Current calibration grade for this sensor's domain
    pub accuracy: Accuracy,
}

/// Default interval before the host requests one (5 Hz)
const DEFAULT_INTERVAL: Duration = Duration::from_millis(200);

impl LogicalSensor {
    fn new(kind: SensorKind) -> Self {
        Self {
            kind,
            enabled: false,
            interval: DEFAULT_INTERVAL,
            batch_timeout: Duration::ZERO,
            last_emitted: 0,
            last_count: 0,
            accuracy: Accuracy::Unreliable,
        }
    }

    /// Current delivery mode
    pub fn mode(&self) -> DeliveryMode {
        if !self.enabled {
            DeliveryMode::Disabled
        } else if self.batch_timeout.is_zero() {
            DeliveryMode::Continuous
        } else {
            DeliveryMode::Batched
        }
    }

    /// Enabled and batched
    pub fn is_batched(&self) -> bool {
        self.mode() == DeliveryMode::Batched
    }

    /// Clear emission state, called on enable/disable transitions so a
    /// re-enabled sensor starts a fresh decimation window
    pub fn reset_emission(&mut self) {
        self.last_emitted = 0;
    }
}

/// The full logical sensor table, indexed by [`SensorKind`]
#[derive(Debug, Clone)]
pub struct SensorTable {
    sensors: [LogicalSensor; SENSOR_COUNT],
}

impl SensorTable {
    /// Build the startup table: everything disabled at the default rate
    pub fn new() -> Self {
        let mut sensors = [LogicalSensor::new(SensorKind::Gyroscope); SENSOR_COUNT];
        for kind in SensorKind::ALL {
            sensors[kind.id() as usize] = LogicalSensor::new(kind);
        }
        Self { sensors }
    }

    /// Shared access by kind
    pub fn get(&self, kind: SensorKind) -> &LogicalSensor {
        &self.sensors[kind.id() as usize]
    }

    /// Mutable access by kind
    pub fn get_mut(&mut self, kind: SensorKind) -> &mut LogicalSensor {
        &mut self.sensors[kind.id() as usize]
    }

    /// Resolve a consumer-supplied id
    pub fn lookup(&self, id: u8) -> Result<SensorKind, HubError> {
        SensorKind::from_id(id).ok_or(HubError::UnknownSensor { id })
    }

    /// Iterate all sensors
    pub fn iter(&self) -> impl Iterator<Item = &LogicalSensor> {
        self.sensors.iter()
    }
}

impl Default for SensorTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Bitmask over logical sensor ids
///
/// The arbitrator tracks per-engine dependent sets with these; the
/// batch-eligibility rule is a pure function over them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SensorSet(u32);

impl SensorSet {
    /// The empty set
    pub const EMPTY: SensorSet = SensorSet(0);

    /// Insert a sensor
    pub fn insert(&mut self, kind: SensorKind) {
        self.0 |= 1 << kind.id();
    }

    /// Remove a sensor
    pub fn remove(&mut self, kind: SensorKind) {
        self.0 &= !(1 << kind.id());
    }

    /// Membership test
    pub const fn contains(&self, kind: SensorKind) -> bool {
        self.0 & (1 << kind.id()) != 0
    }

    /// True when no sensor is in the set
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Iterate members in id order
    pub fn iter(&self) -> impl Iterator<Item = SensorKind> + '_ {
        SensorKind::ALL.into_iter().filter(|kind| self.contains(*kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_stable_and_dense() {
        for (i, kind) in SensorKind::ALL.iter().enumerate() {
            assert_eq!(kind.id() as usize, i);
            assert_eq!(SensorKind::from_id(kind.id()), Some(*kind));
        }
        assert_eq!(SensorKind::from_id(SENSOR_COUNT as u8), None);
    }

    #[test]
    fn mode_follows_enable_and_batch() {
        let mut table = SensorTable::new();
        let s = table.get_mut(SensorKind::Accelerometer);
        assert_eq!(s.mode(), DeliveryMode::Disabled);

        s.enabled = true;
        assert_eq!(s.mode(), DeliveryMode::Continuous);

        s.batch_timeout = Duration::from_millis(500);
        assert_eq!(s.mode(), DeliveryMode::Batched);

        s.batch_timeout = Duration::ZERO;
        assert_eq!(s.mode(), DeliveryMode::Continuous);
    }

    #[test]
    fn sensor_set_operations() {
        let mut set = SensorSet::EMPTY;
        assert!(set.is_empty());

        set.insert(SensorKind::Gyroscope);
        set.insert(SensorKind::Gravity);
        assert!(set.contains(SensorKind::Gyroscope));
        assert!(!set.contains(SensorKind::Accelerometer));

        let members: std::vec::Vec<_> = set.iter().collect();
        assert_eq!(members, [SensorKind::Gyroscope, SensorKind::Gravity]);

        set.remove(SensorKind::Gyroscope);
        set.remove(SensorKind::Gravity);
        assert!(set.is_empty());
    }

    #[test]
    fn accuracy_clamps() {
        assert_eq!(Accuracy::from_raw(-1), Accuracy::Unreliable);
        assert_eq!(Accuracy::from_raw(2), Accuracy::Medium);
        assert_eq!(Accuracy::from_raw(9), Accuracy::High);
    }

    #[test]
    fn unknown_id_is_rejected() {
        let table = SensorTable::new();
        assert_eq!(table.lookup(200), Err(HubError::UnknownSensor { id: 200 }));
    }
}

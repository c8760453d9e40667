//! Physical engines and the sensor-to-engine registry
//!
//! ## Overview
//!
//! A *physical engine* is one underlying measurement channel with exactly
//! one enable switch and one rate setting: the three hardware triads
//! (gyro, accel, compass), the auxiliary channels (pressure, light), and
//! the DSP-side fusion engines (six-axis, nine-axis, geomagnetic,
//! gesture).
//!
//! The registry answers two questions, and is immutable after startup:
//!
//! 1. `engines_for(sensor)` — which engines must run for a logical sensor.
//!    The answer depends on the calibration mode selected once at
//!    construction: with device-side fusion a rotation vector depends on
//!    the DSP nine-axis engine; with host-side fusion it depends on the raw
//!    gyro/accel/compass triads and the provider does the math.
//! 2. `minimum_interval(engine)` — the floor below which the engine cannot
//!    be driven outside batch mode.
//!
//! Each engine's enable/rate control pair is stored as a `Box<dyn Engine>`
//! trait object, keeping the original table-driven dispatch shape without
//! raw function pointers.

#[cfg(not(feature = "std"))]
use alloc::boxed::Box;

use core::time::Duration;

use crate::errors::ControlError;
use crate::sensors::SensorKind;
use crate::time::interval_hz;

/// Number of physical engines
pub const ENGINE_COUNT: usize = 9;

/// Physical engine identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
#[allow(missing_docs)]
pub enum EngineId {
    Gyro = 0,
    Accel = 1,
    Compass = 2,
    Pressure = 3,
    Light = 4,
    SixAxis = 5,
    NineAxis = 6,
    Geomag = 7,
    Gesture = 8,
}

impl EngineId {
    /// All engines, in index order
    pub const ALL: [EngineId; ENGINE_COUNT] = [
        Self::Gyro,
        Self::Accel,
        Self::Compass,
        Self::Pressure,
        Self::Light,
        Self::SixAxis,
        Self::NineAxis,
        Self::Geomag,
        Self::Gesture,
    ];

    /// Table index
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Control-path name, also used in logs
    pub const fn name(self) -> &'static str {
        match self {
            Self::Gyro => "gyro",
            Self::Accel => "accel",
            Self::Compass => "compass",
            Self::Pressure => "pressure",
            Self::Light => "light",
            Self::SixAxis => "six_axis_q",
            Self::NineAxis => "nine_axis_q",
            Self::Geomag => "geomag_q",
            Self::Gesture => "gesture",
        }
    }
}

/// Bitmask over physical engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineSet(u16);

impl EngineSet {
    /// The empty set
    pub const EMPTY: EngineSet = EngineSet(0);

    /// Set from a list of engines
    pub fn of(engines: &[EngineId]) -> Self {
        let mut set = Self::EMPTY;
        for engine in engines {
            set.insert(*engine);
        }
        set
    }

    /// Insert an engine
    pub fn insert(&mut self, engine: EngineId) {
        self.0 |= 1 << engine.index();
    }

    /// Membership test
    pub const fn contains(&self, engine: EngineId) -> bool {
        self.0 & (1 << engine.index()) != 0
    }

    /// True when no engine is in the set
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Union of two sets
    pub const fn union(self, other: EngineSet) -> EngineSet {
        EngineSet(self.0 | other.0)
    }

    /// Iterate members in index order
    pub fn iter(&self) -> impl Iterator<Item = EngineId> + '_ {
        EngineId::ALL.into_iter().filter(|engine| self.contains(*engine))
    }
}

/// Control capability of one physical engine
///
/// One implementation per engine, typically wrapping the device's enable
/// and rate control attributes. Writes may block briefly; they are only
/// issued from the single dispatch thread.
pub trait Engine {
    /// Switch the engine on or off
    fn enable(&mut self, on: bool) -> Result<(), ControlError>;

    /// Set the engine sampling interval
    fn set_rate(&mut self, interval: Duration) -> Result<(), ControlError>;
}

/// Engine port that accepts and discards every write
///
/// Placeholder for engines a given device does not expose, and the builder
/// default before real ports are bound.
pub struct NoopEngine;

impl Engine for NoopEngine {
    fn enable(&mut self, _on: bool) -> Result<(), ControlError> {
        Ok(())
    }

    fn set_rate(&mut self, _interval: Duration) -> Result<(), ControlError> {
        Ok(())
    }
}

/// Which calibration provider is active, fixed at startup
///
/// Decides where fused quaternions come from, and therefore which engines
/// a fusion-derived sensor depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationMode {
    /// The DSP produces fused quaternions; quaternion sensors depend on
    /// the dedicated fusion engines
    DeviceFused,
    /// The host provider fuses from raw triads; quaternion sensors depend
    /// on the hardware engines directly
    HostFused,
}

/// Static sensor→engine binding plus the engine control table
pub struct EngineRegistry {
    mode: CalibrationMode,
    ports: [Box<dyn Engine>; ENGINE_COUNT],
}

impl EngineRegistry {
    /// Build the registry for one calibration mode with one control port
    /// per engine, indexed by [`EngineId`]
    pub fn new(mode: CalibrationMode, ports: [Box<dyn Engine>; ENGINE_COUNT]) -> Self {
        Self { mode, ports }
    }

    /// Selected calibration mode
    pub fn mode(&self) -> CalibrationMode {
        self.mode
    }

    /// Engines a logical sensor requires in the selected mode
    pub fn engines_for(&self, sensor: SensorKind) -> EngineSet {
        use EngineId::*;
        use SensorKind as S;
        match (sensor, self.mode) {
            (S::Gyroscope | S::GyroscopeRaw, _) => EngineSet::of(&[Gyro]),
            (S::Accelerometer, _) => EngineSet::of(&[Accel]),
            (S::Magnetometer | S::MagnetometerRaw, _) => EngineSet::of(&[Compass]),

            (S::GameRotationVector | S::LinearAcceleration | S::Gravity, CalibrationMode::DeviceFused) => {
                EngineSet::of(&[SixAxis])
            }
            (S::GameRotationVector | S::LinearAcceleration | S::Gravity, CalibrationMode::HostFused) => {
                EngineSet::of(&[Gyro, Accel])
            }

            (S::RotationVector | S::Orientation, CalibrationMode::DeviceFused) => {
                EngineSet::of(&[NineAxis])
            }
            (S::RotationVector | S::Orientation, CalibrationMode::HostFused) => {
                EngineSet::of(&[Gyro, Accel, Compass])
            }

            (S::GeomagneticRotationVector, CalibrationMode::DeviceFused) => EngineSet::of(&[Geomag]),
            (S::GeomagneticRotationVector, CalibrationMode::HostFused) => {
                EngineSet::of(&[Accel, Compass])
            }

            (S::StepDetector | S::StepCounter | S::Tilt | S::Pickup, _) => EngineSet::of(&[Gesture]),
            (S::Pressure, _) => EngineSet::of(&[Pressure]),
            (S::Light | S::Proximity, _) => EngineSet::of(&[Light]),
        }
    }

    /// The engine whose record stream times a sensor's samples
    ///
    /// Multi-engine sensors are timed by the fastest constituent: fusion
    /// results are rebuilt on every gyro sample (host mode) or arrive on
    /// the fusion engine's own stream (device mode), so the first engine
    /// in the dependency set is always the driver.
    pub fn driving_engine(&self, sensor: SensorKind) -> EngineId {
        // Dependency sets are never empty, one entry per sensor above.
        self.engines_for(sensor)
            .iter()
            .next()
            .unwrap_or(EngineId::Accel)
    }

    /// Fastest interval the engine supports outside batch mode
    pub fn minimum_interval(&self, engine: EngineId) -> Duration {
        match engine {
            EngineId::Gyro | EngineId::Accel => Duration::from_millis(5),
            EngineId::Compass => Duration::from_millis(10),
            EngineId::Pressure => Duration::from_millis(40),
            EngineId::Light => Duration::from_millis(100),
            EngineId::SixAxis | EngineId::NineAxis | EngineId::Geomag => Duration::from_millis(5),
            EngineId::Gesture => Duration::from_millis(20),
        }
    }

    /// Snap a requested interval onto the device-supported rate ladder
    ///
    /// The device cannot run at arbitrary rates; requests near a supported
    /// rate are quantized to the interval the hardware will actually
    /// produce, so rate comparisons and decimation math see the real
    /// spacing.
    pub fn effective_interval(&self, requested: Duration) -> Duration {
        let micros = match interval_hz(requested) {
            5 => 200_000,
            15 => 66_666,
            55 => 18_181,
            70 => 13_333,
            110 => 9_090,
            220 => 4_545,
            _ => return requested,
        };
        Duration::from_micros(micros)
    }

    /// Mutable access to one engine's control port
    pub fn port_mut(&mut self, engine: EngineId) -> &mut dyn Engine {
        self.ports[engine.index()].as_mut()
    }
}

//! Engine arbitration: many logical sensors, one minimal hardware config
//!
//! ## Overview
//!
//! Every enable/disable/interval/batch call lands here. The arbitrator
//! keeps, per physical engine:
//!
//! - the set of logical sensors currently depending on it, and
//! - the last configuration actually applied to the device.
//!
//! From those it derives the minimal consistent hardware state: an engine
//! is enabled iff its dependent set is non-empty, and runs at the fastest
//! interval any dependent requests, floored at the engine's minimum.
//!
//! ## Write discipline
//!
//! Device control writes are issued **only on change**. Redundant writes
//! are not merely wasteful — they reset hardware-side decimation state and
//! glitch in-flight FIFOs.
//!
//! A failed write is logged and the cached configuration is left at the
//! pre-call value, i.e. the arbitrator assumes the call had no effect. The
//! next reconciliation then sees the same delta and retries, instead of
//! silently diverging from real hardware state.

use core::time::Duration;

use crate::engines::{EngineId, EngineRegistry, ENGINE_COUNT};
use crate::sensors::{SensorKind, SensorSet, SensorTable};

/// Last configuration applied to one engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct EngineConfig {
    enabled: bool,
    /// Last rate written; `None` until the first successful write
    interval: Option<Duration>,
}

/// Per-engine dependency and configuration state
pub struct Arbitrator {
    deps: [SensorSet; ENGINE_COUNT],
    config: [EngineConfig; ENGINE_COUNT],
}

impl Arbitrator {
    /// Startup state: no dependents, nothing configured
    pub fn new() -> Self {
        Self {
            deps: [SensorSet::EMPTY; ENGINE_COUNT],
            config: [EngineConfig::default(); ENGINE_COUNT],
        }
    }

    /// Dependents of one engine
    pub fn dependents(&self, engine: EngineId) -> SensorSet {
        self.deps[engine.index()]
    }

    /// The interval the engine is currently configured at, if enabled
    ///
    /// This is the *configured* rate — possibly faster than any one
    /// dependent requested — which is what the output gate must decimate
    /// against.
    pub fn engine_interval(&self, engine: EngineId) -> Option<Duration> {
        let config = self.config[engine.index()];
        if config.enabled {
            config.interval
        } else {
            None
        }
    }

    /// Reconcile hardware state after one sensor's request changed
    ///
    /// `changed` must already hold its new state in `sensors`. Touches only
    /// engines whose dependent set or desired rate can have changed.
    pub fn on_sensor_changed(
        &mut self,
        changed: SensorKind,
        sensors: &SensorTable,
        registry: &mut EngineRegistry,
    ) {
        let wanted = registry.engines_for(changed);
        let enabled = sensors.get(changed).enabled;

        for engine in EngineId::ALL {
            let member = wanted.contains(engine) && enabled;
            let was_member = self.deps[engine.index()].contains(changed);
            if member {
                self.deps[engine.index()].insert(changed);
            } else {
                self.deps[engine.index()].remove(changed);
            }
            // An interval change with unchanged membership still moves the
            // engine's desired rate.
            if member || was_member {
                self.reconcile(engine, sensors, registry);
            }
        }
    }

    /// Desired interval for an engine: fastest dependent, floored at the
    /// engine minimum, snapped onto the supported rate ladder
    fn desired_interval(
        &self,
        engine: EngineId,
        sensors: &SensorTable,
        registry: &EngineRegistry,
    ) -> Option<Duration> {
        let fastest = self.deps[engine.index()]
            .iter()
            .map(|kind| registry.effective_interval(sensors.get(kind).interval))
            .min()?;
        Some(fastest.max(registry.minimum_interval(engine)))
    }

    fn reconcile(&mut self, engine: EngineId, sensors: &SensorTable, registry: &mut EngineRegistry) {
        let desired_enabled = !self.deps[engine.index()].is_empty();
        let current = self.config[engine.index()];

        if !desired_enabled {
            if current.enabled {
                match registry.port_mut(engine).enable(false) {
                    Ok(()) => {
                        self.config[engine.index()].enabled = false;
                        log_debug!("engine {} disabled", engine.name());
                    }
                    Err(err) => {
                        log_warn!("engine {} disable failed: {:?}", engine.name(), err);
                    }
                }
            }
            return;
        }

        // Rate first so the engine comes up at the right speed.
        if let Some(interval) = self.desired_interval(engine, sensors, registry) {
            if current.interval != Some(interval) {
                match registry.port_mut(engine).set_rate(interval) {
                    Ok(()) => {
                        self.config[engine.index()].interval = Some(interval);
                        log_debug!("engine {} rate {}us", engine.name(), interval.as_micros() as u64);
                    }
                    Err(err) => {
                        log_warn!("engine {} rate write failed: {:?}", engine.name(), err);
                    }
                }
            }
        }

        if !current.enabled {
            match registry.port_mut(engine).enable(true) {
                Ok(()) => {
                    self.config[engine.index()].enabled = true;
                    log_debug!("engine {} enabled", engine.name());
                }
                Err(err) => {
                    log_warn!("engine {} enable failed: {:?}", engine.name(), err);
                }
            }
        }
    }

    /// Whether batch mode may engage for the device as a whole
    ///
    /// Checks every engine's dependent set via [`batch_eligible`]: a single
    /// continuously-sampled consumer anywhere keeps the shared FIFO in
    /// immediate-delivery mode.
    pub fn batch_mode_allowed(&self, sensors: &SensorTable) -> bool {
        EngineId::ALL
            .into_iter()
            .all(|engine| batch_eligible(self.deps[engine.index()], sensors))
    }
}

impl Default for Arbitrator {
    fn default() -> Self {
        Self::new()
    }
}

/// Batch constraint for one engine's dependent set
///
/// Batch mode is all-or-nothing per engine: partial batching on a shared
/// physical engine cannot be expressed in the device model. The set is
/// eligible when every *enabled* dependent is batched (vacuously true for
/// an empty set).
pub fn batch_eligible(dependents: SensorSet, sensors: &SensorTable) -> bool {
    dependents
        .iter()
        .filter(|kind| sensors.get(*kind).enabled)
        .all(|kind| sensors.get(kind).is_batched())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::{CalibrationMode, Engine};
    use crate::errors::ControlError;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::vec::Vec;

    #[derive(Debug, Clone, PartialEq)]
    enum Write {
        Enable(EngineId, bool),
        Rate(EngineId, Duration),
    }

    struct ScriptedPort {
        id: EngineId,
        writes: Rc<RefCell<Vec<Write>>>,
        fail: Rc<RefCell<bool>>,
    }

    impl Engine for ScriptedPort {
        fn enable(&mut self, on: bool) -> Result<(), ControlError> {
            if *self.fail.borrow() {
                return Err(ControlError::Rejected);
            }
            self.writes.borrow_mut().push(Write::Enable(self.id, on));
            Ok(())
        }

        fn set_rate(&mut self, interval: Duration) -> Result<(), ControlError> {
            if *self.fail.borrow() {
                return Err(ControlError::Rejected);
            }
            self.writes.borrow_mut().push(Write::Rate(self.id, interval));
            Ok(())
        }
    }

    struct Fixture {
        registry: EngineRegistry,
        sensors: SensorTable,
        arbitrator: Arbitrator,
        writes: Rc<RefCell<Vec<Write>>>,
        fail: Rc<RefCell<bool>>,
    }

    impl Fixture {
        fn new(mode: CalibrationMode) -> Self {
            let writes = Rc::new(RefCell::new(Vec::new()));
            let fail = Rc::new(RefCell::new(false));
            let ports: [Box<dyn Engine>; ENGINE_COUNT] = EngineId::ALL.map(|id| {
                Box::new(ScriptedPort { id, writes: writes.clone(), fail: fail.clone() })
                    as Box<dyn Engine>
            });
            Self {
                registry: EngineRegistry::new(mode, ports),
                sensors: SensorTable::new(),
                arbitrator: Arbitrator::new(),
                writes,
                fail,
            }
        }

        fn apply(&mut self, kind: SensorKind, enabled: bool, interval: Duration) {
            let sensor = self.sensors.get_mut(kind);
            sensor.enabled = enabled;
            sensor.interval = interval;
            self.arbitrator.on_sensor_changed(kind, &self.sensors, &mut self.registry);
        }

        fn take_writes(&self) -> Vec<Write> {
            self.writes.borrow_mut().drain(..).collect()
        }
    }

    #[test]
    fn enable_configures_rate_then_switch() {
        let mut fx = Fixture::new(CalibrationMode::DeviceFused);
        fx.apply(SensorKind::Gyroscope, true, Duration::from_millis(20));

        assert_eq!(
            fx.take_writes(),
            [
                Write::Rate(EngineId::Gyro, Duration::from_millis(20)),
                Write::Enable(EngineId::Gyro, true),
            ]
        );
        assert_eq!(
            fx.arbitrator.engine_interval(EngineId::Gyro),
            Some(Duration::from_millis(20))
        );
    }

    #[test]
    fn engine_enabled_iff_dependents() {
        let mut fx = Fixture::new(CalibrationMode::HostFused);
        // Game RV pulls in both gyro and accel.
        fx.apply(SensorKind::GameRotationVector, true, Duration::from_millis(10));
        assert!(!fx.arbitrator.dependents(EngineId::Gyro).is_empty());
        assert!(!fx.arbitrator.dependents(EngineId::Accel).is_empty());

        fx.apply(SensorKind::Accelerometer, true, Duration::from_millis(50));
        fx.take_writes();

        // Dropping Game RV leaves accel alive (Accelerometer still depends
        // on it) but kills gyro.
        fx.apply(SensorKind::GameRotationVector, false, Duration::from_millis(10));
        let writes = fx.take_writes();
        assert!(writes.contains(&Write::Enable(EngineId::Gyro, false)));
        assert!(!writes.contains(&Write::Enable(EngineId::Accel, false)));
        assert_eq!(fx.arbitrator.engine_interval(EngineId::Gyro), None);
    }

    #[test]
    fn shared_engine_runs_at_fastest_request() {
        let mut fx = Fixture::new(CalibrationMode::DeviceFused);
        fx.apply(SensorKind::Accelerometer, true, Duration::from_millis(50));
        fx.take_writes();

        fx.apply(SensorKind::LinearAcceleration, true, Duration::from_millis(50));
        fx.take_writes();

        // A 10 ms consumer on the accel engine speeds it up; the six-axis
        // engine keeps its own rate.
        fx.apply(SensorKind::Accelerometer, true, Duration::from_millis(10));
        assert_eq!(
            fx.arbitrator.engine_interval(EngineId::Accel),
            Some(Duration::from_millis(10))
        );
        assert_eq!(
            fx.arbitrator.engine_interval(EngineId::SixAxis),
            Some(Duration::from_millis(50))
        );
    }

    #[test]
    fn rate_floors_at_engine_minimum() {
        let mut fx = Fixture::new(CalibrationMode::DeviceFused);
        fx.apply(SensorKind::Gyroscope, true, Duration::from_millis(1));
        assert_eq!(
            fx.arbitrator.engine_interval(EngineId::Gyro),
            Some(Duration::from_millis(5))
        );
    }

    #[test]
    fn redundant_changes_produce_no_writes() {
        let mut fx = Fixture::new(CalibrationMode::DeviceFused);
        fx.apply(SensorKind::Gyroscope, true, Duration::from_millis(20));
        fx.take_writes();

        // Same state again: nothing to reconcile.
        fx.apply(SensorKind::Gyroscope, true, Duration::from_millis(20));
        assert!(fx.take_writes().is_empty());
    }

    #[test]
    fn failed_write_keeps_cache_and_retries() {
        let mut fx = Fixture::new(CalibrationMode::DeviceFused);
        *fx.fail.borrow_mut() = true;
        fx.apply(SensorKind::Gyroscope, true, Duration::from_millis(20));

        // Nothing applied, nothing cached.
        assert!(fx.take_writes().is_empty());
        assert_eq!(fx.arbitrator.engine_interval(EngineId::Gyro), None);

        // Device recovers: the same delta is retried on the next change.
        *fx.fail.borrow_mut() = false;
        fx.apply(SensorKind::Gyroscope, true, Duration::from_millis(10));
        assert_eq!(
            fx.take_writes(),
            [
                Write::Rate(EngineId::Gyro, Duration::from_millis(10)),
                Write::Enable(EngineId::Gyro, true),
            ]
        );
    }

    #[test]
    fn batch_eligibility_is_all_or_nothing() {
        let mut fx = Fixture::new(CalibrationMode::DeviceFused);
        fx.apply(SensorKind::Accelerometer, true, Duration::from_millis(10));
        fx.apply(SensorKind::LinearAcceleration, true, Duration::from_millis(10));

        fx.sensors.get_mut(SensorKind::Accelerometer).batch_timeout =
            Duration::from_millis(1000);
        assert!(!fx.arbitrator.batch_mode_allowed(&fx.sensors));

        fx.sensors.get_mut(SensorKind::LinearAcceleration).batch_timeout =
            Duration::from_millis(500);
        assert!(fx.arbitrator.batch_mode_allowed(&fx.sensors));
    }

    #[test]
    fn effective_rate_snaps_before_write() {
        let mut fx = Fixture::new(CalibrationMode::DeviceFused);
        // 15 Hz request: the hardware actually produces 66.666 ms spacing.
        fx.apply(SensorKind::Accelerometer, true, Duration::from_micros(66_666));
        assert_eq!(
            fx.arbitrator.engine_interval(EngineId::Accel),
            Some(Duration::from_micros(66_666))
        );
    }

    // Pure-function check, independent of any I/O.
    #[test]
    fn batch_eligible_ignores_disabled_dependents() {
        let mut sensors = SensorTable::new();
        let mut deps = SensorSet::EMPTY;
        deps.insert(SensorKind::Accelerometer);
        deps.insert(SensorKind::Gravity);

        // Disabled sensors do not veto batching.
        sensors.get_mut(SensorKind::Accelerometer).enabled = true;
        sensors.get_mut(SensorKind::Accelerometer).batch_timeout = Duration::from_millis(100);
        assert!(batch_eligible(deps, &sensors));

        // An enabled continuous sensor does.
        sensors.get_mut(SensorKind::Gravity).enabled = true;
        assert!(!batch_eligible(deps, &sensors));
    }
}

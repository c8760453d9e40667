//! The sensor hub: configuration surface, poll cycle, and event delivery
//!
//! ## Poll cycle
//!
//! An external collaborator owns the blocking wait on the device sample
//! channel. Each time bytes arrive it calls [`Hub::poll_chunk`], which runs
//! the framer, router, gate, and flush coordinator synchronously, in that
//! order, on the calling thread:
//!
//! ```text
//! bytes → framer → router (+ calibration provider) → gate → event queue
//! ```
//!
//! Records decoded from one chunk are routed and emitted in decode order;
//! the only reordering is deferring flush-completion markers until the
//! buffer has drained.
//!
//! ## Configuration surface
//!
//! Four calls drive the hub: [`enable`](Hub::enable),
//! [`set_interval`](Hub::set_interval), [`set_batch`](Hub::set_batch), and
//! [`flush`](Hub::flush). Each lands in the arbitrator, which reconciles
//! physical engine state, then in the batch coordinator, which re-derives
//! the device timeout. Invalid input is rejected synchronously with no
//! state mutated.
//!
//! ## Threading
//!
//! None. The hub owns all state and performs no locking; a multi-threaded
//! host must serialize every entry point. Device-control writes issued
//! during configuration calls may block briefly.

use core::time::Duration;

use crate::arbitrator::Arbitrator;
use crate::batch::{BatchCoordinator, BatchPort};
use crate::calibration::CalibrationProvider;
use crate::engines::{CalibrationMode, Engine, EngineId, EngineRegistry, NoopEngine, ENGINE_COUNT};
use crate::errors::{DecodeError, HubError, HubResult};
use crate::events::{EventQueue, HubEvent, QueueStats};
use crate::framer::FrameDecoder;
use crate::gate;
use crate::records::{Record, RecordKind};
use crate::router::Router;
use crate::sensors::{LogicalSensor, SensorKind, SensorTable};
use crate::time::interval_ns;

#[cfg(not(feature = "std"))]
use alloc::boxed::Box;

/// The dispatch core
///
/// Generic over the calibration provider and the batch-timeout port; the
/// per-engine control ports live as trait objects in the registry.
pub struct Hub<C: CalibrationProvider, B: BatchPort> {
    sensors: SensorTable,
    registry: EngineRegistry,
    arbitrator: Arbitrator,
    framer: FrameDecoder,
    router: Router,
    coordinator: BatchCoordinator<B>,
    events: EventQueue,
    calibration: C,
}

impl<C: CalibrationProvider, B: BatchPort> Hub<C, B> {
    /// Assemble a hub from its collaborators
    pub fn new(registry: EngineRegistry, calibration: C, batch_port: B) -> Self {
        Self {
            sensors: SensorTable::new(),
            registry,
            arbitrator: Arbitrator::new(),
            framer: FrameDecoder::new(),
            router: Router::new(),
            coordinator: BatchCoordinator::new(batch_port),
            events: EventQueue::new(),
            calibration,
        }
    }

    /// Enable or disable a logical sensor
    ///
    /// Idempotent: repeating the current state performs no device writes.
    /// Disabling is immediate; in-flight records for the sensor are simply
    /// no longer due at the gate.
    pub fn enable(&mut self, kind: SensorKind, on: bool) -> HubResult<()> {
        if self.sensors.get(kind).enabled == on {
            return Ok(());
        }
        {
            let sensor = self.sensors.get_mut(kind);
            sensor.enabled = on;
            sensor.reset_emission();
        }
        log_debug!("sensor {} {}", kind.name(), if on { "enabled" } else { "disabled" });
        self.sync(kind);
        Ok(())
    }

    /// Set a sensor's requested sample interval
    pub fn set_interval(&mut self, kind: SensorKind, interval: Duration) -> HubResult<()> {
        if interval.is_zero() {
            return Err(HubError::ZeroInterval);
        }
        self.sensors.get_mut(kind).interval = interval;
        self.sync(kind);
        Ok(())
    }

    /// Set a sensor's batch timeout; zero leaves batch mode
    pub fn set_batch(&mut self, kind: SensorKind, timeout: Duration) -> HubResult<()> {
        self.sensors.get_mut(kind).batch_timeout = timeout;
        self.sync(kind);
        Ok(())
    }

    /// Request a flush-completion marker for a sensor
    ///
    /// The marker is queued behind every sample already read or buffered
    /// and is released at the end of the next poll cycle, once the record
    /// buffer has fully drained. A host with nothing to read can pump an
    /// empty chunk to collect it.
    pub fn flush(&mut self, kind: SensorKind) -> HubResult<()> {
        if !self.sensors.get(kind).enabled {
            return Err(HubError::SensorDisabled { id: kind.id() });
        }
        self.coordinator.queue_flush(kind)
    }

    /// Resolve a consumer-supplied sensor id
    pub fn lookup(&self, id: u8) -> HubResult<SensorKind> {
        self.sensors.lookup(id)
    }

    /// Feed one chunk read from the device sample channel
    ///
    /// Decodes and dispatches every complete record, retains any trailing
    /// partial record, then releases pending flush markers. Returns the
    /// number of consumer events emitted.
    ///
    /// Decode errors are non-fatal: the framer has already dropped its
    /// buffer and the next chunk starts clean. Events emitted before the
    /// corruption point stay queued.
    pub fn poll_chunk(&mut self, chunk: &[u8]) -> Result<usize, DecodeError> {
        if let Err(err) = self.framer.extend(chunk) {
            self.complete_flushes();
            return Err(err);
        }
        let mut emitted = 0;
        let result = loop {
            match self.framer.next_record() {
                Ok(record) => emitted += self.dispatch(&record),
                Err(nb::Error::WouldBlock) => break Ok(emitted),
                Err(nb::Error::Other(err)) => break Err(err),
            }
        };
        self.complete_flushes();
        result
    }

    /// Take the oldest consumer event
    pub fn pop_event(&mut self) -> Option<HubEvent> {
        self.events.pop()
    }

    /// Event queue health counters
    pub fn queue_stats(&self) -> QueueStats {
        self.events.stats()
    }

    /// Introspect one sensor's state
    pub fn sensor(&self, kind: SensorKind) -> &LogicalSensor {
        self.sensors.get(kind)
    }

    /// Interval an engine is currently configured at, if enabled
    pub fn engine_interval(&self, engine: EngineId) -> Option<Duration> {
        self.arbitrator.engine_interval(engine)
    }

    /// Timeout currently applied to the device batch path
    pub fn batch_timeout(&self) -> Option<Duration> {
        self.coordinator.applied_timeout()
    }

    /// Reconcile engines and the batch timeout after one sensor changed
    fn sync(&mut self, kind: SensorKind) {
        self.arbitrator
            .on_sensor_changed(kind, &self.sensors, &mut self.registry);
        let allowed = self.arbitrator.batch_mode_allowed(&self.sensors);
        self.coordinator.recompute(&self.sensors, allowed);
    }

    /// Route one record and gate its fan-out into the event queue
    fn dispatch(&mut self, record: &Record) -> usize {
        if record.kind == RecordKind::FlushMarker {
            // The device's marker sits behind the records it accounts for,
            // so completing the oldest pending flush here keeps order.
            if let Some(sensor) = self.coordinator.take_pending() {
                self.events.push(HubEvent::FlushComplete { sensor });
                return 1;
            }
            return 0;
        }

        let mode = self.registry.mode();
        let fanout =
            self.router
                .route(record, &mut self.sensors, &mut self.calibration, mode);

        let mut emitted = 0;
        for routed in fanout {
            let driving = self.registry.driving_engine(routed.sensor);
            let engine_ns = self.arbitrator.engine_interval(driving).map(interval_ns);
            let requested_ns = interval_ns(
                self.registry
                    .effective_interval(self.sensors.get(routed.sensor).interval),
            );
            let sensor = self.sensors.get_mut(routed.sensor);
            if gate::maybe_emit(sensor, engine_ns, requested_ns, routed.timestamp) {
                self.events.push(HubEvent::Sample {
                    sensor: routed.sensor,
                    timestamp: routed.timestamp,
                    value: routed.value,
                    accuracy: routed.accuracy,
                });
                emitted += 1;
            }
        }
        emitted
    }

    /// Release pending flush markers; called once the buffer has drained
    fn complete_flushes(&mut self) {
        while let Some(sensor) = self.coordinator.take_pending() {
            self.events.push(HubEvent::FlushComplete { sensor });
        }
    }
}

/// Builder for a [`Hub`]
///
/// Engine ports default to [`NoopEngine`] so a device can bind only the
/// engines it exposes.
pub struct HubBuilder {
    mode: CalibrationMode,
    ports: [Option<Box<dyn Engine>>; ENGINE_COUNT],
}

impl HubBuilder {
    /// Start with device-side fusion and no-op ports
    pub fn new() -> Self {
        Self {
            mode: CalibrationMode::DeviceFused,
            ports: core::array::from_fn(|_| None),
        }
    }

    /// Select the calibration mode (fixed for the hub's lifetime)
    pub fn calibration_mode(mut self, mode: CalibrationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Bind one engine's control port
    pub fn engine_port(mut self, engine: EngineId, port: Box<dyn Engine>) -> Self {
        self.ports[engine.index()] = Some(port);
        self
    }

    /// Build the hub
    pub fn build<C: CalibrationProvider, B: BatchPort>(
        self,
        calibration: C,
        batch_port: B,
    ) -> Hub<C, B> {
        let ports = self
            .ports
            .map(|port| port.unwrap_or_else(|| Box::new(NoopEngine) as Box<dyn Engine>));
        Hub::new(EngineRegistry::new(self.mode, ports), calibration, batch_port)
    }
}

impl Default for HubBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::NoopBatchPort;
    use crate::calibration::UnitCalibration;
    use crate::events::SampleValue;
    use crate::records::MAX_RECORD_LEN;
    use crate::time::NS_PER_MS;

    fn hub() -> Hub<UnitCalibration, NoopBatchPort> {
        HubBuilder::new().build(UnitCalibration::new(), NoopBatchPort)
    }

    fn chunk(records: &[Record]) -> std::vec::Vec<u8> {
        let mut bytes = std::vec::Vec::new();
        let mut scratch = [0u8; MAX_RECORD_LEN];
        for rec in records {
            let len = rec.encode(&mut scratch);
            bytes.extend_from_slice(&scratch[..len]);
        }
        bytes
    }

    #[test]
    fn end_to_end_single_sample() {
        let mut hub = hub();
        hub.enable(SensorKind::Accelerometer, true).unwrap();
        hub.set_interval(SensorKind::Accelerometer, Duration::from_millis(20))
            .unwrap();

        let bytes = chunk(&[Record::axes(RecordKind::Accel, [0, 0, 1000], 20 * NS_PER_MS)]);
        assert_eq!(hub.poll_chunk(&bytes).unwrap(), 1);

        match hub.pop_event().unwrap() {
            HubEvent::Sample { sensor, timestamp, value, .. } => {
                assert_eq!(sensor, SensorKind::Accelerometer);
                assert_eq!(timestamp, 20 * NS_PER_MS);
                assert_eq!(value, SampleValue::Vec3([0.0, 0.0, 1000.0]));
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(hub.pop_event().is_none());
    }

    #[test]
    fn zero_interval_is_rejected_without_mutation() {
        let mut hub = hub();
        let before = hub.sensor(SensorKind::Gyroscope).interval;
        assert_eq!(
            hub.set_interval(SensorKind::Gyroscope, Duration::ZERO),
            Err(HubError::ZeroInterval)
        );
        assert_eq!(hub.sensor(SensorKind::Gyroscope).interval, before);
    }

    #[test]
    fn flush_on_disabled_sensor_is_rejected() {
        let mut hub = hub();
        assert_eq!(
            hub.flush(SensorKind::Accelerometer),
            Err(HubError::SensorDisabled { id: SensorKind::Accelerometer.id() })
        );
    }

    #[test]
    fn flush_completes_on_the_next_poll_cycle() {
        let mut hub = hub();
        hub.enable(SensorKind::Accelerometer, true).unwrap();
        hub.flush(SensorKind::Accelerometer).unwrap();
        // Not yet: the marker waits for a drained poll cycle.
        assert!(hub.pop_event().is_none());

        assert_eq!(hub.poll_chunk(&[]).unwrap(), 0);
        assert_eq!(
            hub.pop_event(),
            Some(HubEvent::FlushComplete { sensor: SensorKind::Accelerometer })
        );
    }

    #[test]
    fn lookup_maps_ids() {
        let hub = hub();
        assert_eq!(hub.lookup(0), Ok(SensorKind::Gyroscope));
        assert!(hub.lookup(99).is_err());
    }
}

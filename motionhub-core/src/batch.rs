//! Batch timeout arbitration and flush-completion ordering
//!
//! ## Timeout arbitration
//!
//! The device has a single batch-timeout control path shared by every
//! sensor. The coordinator derives one effective value: the minimum
//! requested timeout across all sensors that are enabled *and* batched, or
//! the "off" sentinel when that set is empty (or when a continuous
//! consumer disqualifies batching entirely).
//!
//! The effective value is re-derived synchronously on every state change
//! and written only when it differs from the last value written — a
//! redundant timeout write resets the device's in-flight batch window.
//!
//! ## Flush ordering
//!
//! `flush(sensor)` promises the consumer a completion marker *after* every
//! sample that was already queued for that sensor. Pending flushes are
//! therefore held here and released by the hub only once the current
//! record buffer has fully drained (or when the device's own flush marker
//! arrives, which by stream order makes the same guarantee).

use core::time::Duration;

use heapless::Deque;

use crate::errors::{ControlError, HubError};
use crate::sensors::{SensorKind, SensorTable};

/// Most flush requests that may be outstanding at once
pub const MAX_PENDING_FLUSHES: usize = 8;

/// The device's global batch-timeout control path
///
/// `None` writes the "batching off" sentinel.
pub trait BatchPort {
    /// Write the effective timeout, or disable batching
    fn set_timeout(&mut self, timeout: Option<Duration>) -> Result<(), ControlError>;
}

/// Batch port that accepts and discards every write
pub struct NoopBatchPort;

impl BatchPort for NoopBatchPort {
    fn set_timeout(&mut self, _timeout: Option<Duration>) -> Result<(), ControlError> {
        Ok(())
    }
}

/// Effective device timeout for the current sensor state
///
/// Pure: min requested timeout over enabled-and-batched sensors, `None`
/// when no sensor is batching.
pub fn effective_timeout(sensors: &SensorTable) -> Option<Duration> {
    sensors
        .iter()
        .filter(|s| s.is_batched())
        .map(|s| s.batch_timeout)
        .min()
}

/// Timeout cache and pending-flush queue
pub struct BatchCoordinator<B: BatchPort> {
    port: B,
    /// Last timeout successfully written; devices power up with batching off
    applied: Option<Duration>,
    pending: Deque<SensorKind, MAX_PENDING_FLUSHES>,
}

impl<B: BatchPort> BatchCoordinator<B> {
    /// Wrap the device timeout path
    pub fn new(port: B) -> Self {
        Self { port, applied: None, pending: Deque::new() }
    }

    /// Timeout currently applied to the device
    pub fn applied_timeout(&self) -> Option<Duration> {
        self.applied
    }

    /// Re-derive and apply the effective timeout
    ///
    /// `allowed` is the arbitrator's all-or-nothing verdict: when false the
    /// sentinel is written regardless of requested timeouts. A failed write
    /// leaves the cached value untouched, so the next recompute retries.
    pub fn recompute(&mut self, sensors: &SensorTable, allowed: bool) {
        let desired = if allowed { effective_timeout(sensors) } else { None };
        if desired == self.applied {
            return;
        }
        match self.port.set_timeout(desired) {
            Ok(()) => {
                log_debug!(
                    "batch timeout {}ms",
                    desired.map(|d| d.as_millis() as u64).unwrap_or(0)
                );
                self.applied = desired;
            }
            Err(err) => {
                log_warn!("batch timeout write failed: {:?}", err);
            }
        }
    }

    /// Record a flush request for later completion
    pub fn queue_flush(&mut self, sensor: SensorKind) -> Result<(), HubError> {
        self.pending
            .push_back(sensor)
            .map_err(|_| HubError::FlushBacklog)
    }

    /// Complete the oldest pending flush, if any
    pub fn take_pending(&mut self) -> Option<SensorKind> {
        self.pending.pop_front()
    }

    /// Whether flush completions are owed
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::vec::Vec;

    struct ScriptedBatchPort {
        writes: Rc<RefCell<Vec<Option<Duration>>>>,
        fail: Rc<RefCell<bool>>,
    }

    impl BatchPort for ScriptedBatchPort {
        fn set_timeout(&mut self, timeout: Option<Duration>) -> Result<(), ControlError> {
            if *self.fail.borrow() {
                return Err(ControlError::Rejected);
            }
            self.writes.borrow_mut().push(timeout);
            Ok(())
        }
    }

    fn fixture() -> (
        BatchCoordinator<ScriptedBatchPort>,
        Rc<RefCell<Vec<Option<Duration>>>>,
        Rc<RefCell<bool>>,
    ) {
        let writes = Rc::new(RefCell::new(Vec::new()));
        let fail = Rc::new(RefCell::new(false));
        let port = ScriptedBatchPort { writes: writes.clone(), fail: fail.clone() };
        (BatchCoordinator::new(port), writes, fail)
    }

    fn batched(sensors: &mut SensorTable, kind: SensorKind, timeout_ms: u64) {
        let s = sensors.get_mut(kind);
        s.enabled = true;
        s.batch_timeout = Duration::from_millis(timeout_ms);
    }

    #[test]
    fn minimum_timeout_wins() {
        let (mut coord, writes, _) = fixture();
        let mut sensors = SensorTable::new();
        batched(&mut sensors, SensorKind::Accelerometer, 2000);
        batched(&mut sensors, SensorKind::Gyroscope, 500);

        coord.recompute(&sensors, true);
        assert_eq!(*writes.borrow(), [Some(Duration::from_millis(500))]);

        // The 500 ms requester goes away: rearbitrate upward.
        sensors.get_mut(SensorKind::Gyroscope).enabled = false;
        coord.recompute(&sensors, true);
        assert_eq!(
            writes.borrow().last().copied(),
            Some(Some(Duration::from_millis(2000)))
        );
    }

    #[test]
    fn redundant_recomputes_write_nothing() {
        let (mut coord, writes, _) = fixture();
        let mut sensors = SensorTable::new();
        batched(&mut sensors, SensorKind::Accelerometer, 1000);

        coord.recompute(&sensors, true);
        coord.recompute(&sensors, true);
        assert_eq!(writes.borrow().len(), 1);
    }

    #[test]
    fn empty_set_writes_off_sentinel_once() {
        let (mut coord, writes, _) = fixture();
        let mut sensors = SensorTable::new();

        // Off at power-up, off desired: no write at all.
        coord.recompute(&sensors, true);
        assert!(writes.borrow().is_empty());

        batched(&mut sensors, SensorKind::Accelerometer, 1000);
        coord.recompute(&sensors, true);
        sensors.get_mut(SensorKind::Accelerometer).batch_timeout = Duration::ZERO;
        coord.recompute(&sensors, true);
        assert_eq!(*writes.borrow(), [Some(Duration::from_millis(1000)), None]);
    }

    #[test]
    fn disallowed_batching_forces_sentinel() {
        let (mut coord, writes, _) = fixture();
        let mut sensors = SensorTable::new();
        batched(&mut sensors, SensorKind::Accelerometer, 1000);

        coord.recompute(&sensors, true);
        // A continuous consumer appears somewhere on a shared engine.
        coord.recompute(&sensors, false);
        assert_eq!(*writes.borrow(), [Some(Duration::from_millis(1000)), None]);
    }

    #[test]
    fn failed_write_is_retried() {
        let (mut coord, writes, fail) = fixture();
        let mut sensors = SensorTable::new();
        batched(&mut sensors, SensorKind::Accelerometer, 1000);

        *fail.borrow_mut() = true;
        coord.recompute(&sensors, true);
        assert!(writes.borrow().is_empty());
        assert_eq!(coord.applied_timeout(), None);

        *fail.borrow_mut() = false;
        coord.recompute(&sensors, true);
        assert_eq!(*writes.borrow(), [Some(Duration::from_millis(1000))]);
    }

    #[test]
    fn flush_queue_is_fifo_and_bounded() {
        let (mut coord, _, _) = fixture();
        coord.queue_flush(SensorKind::Accelerometer).unwrap();
        coord.queue_flush(SensorKind::Gyroscope).unwrap();
        assert_eq!(coord.take_pending(), Some(SensorKind::Accelerometer));
        assert_eq!(coord.take_pending(), Some(SensorKind::Gyroscope));
        assert_eq!(coord.take_pending(), None);

        for _ in 0..MAX_PENDING_FLUSHES {
            coord.queue_flush(SensorKind::Light).unwrap();
        }
        assert_eq!(
            coord.queue_flush(SensorKind::Light),
            Err(HubError::FlushBacklog)
        );
    }
}

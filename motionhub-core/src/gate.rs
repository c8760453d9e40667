//! Output-rate gate: decides whether a routed sample is due for delivery
//!
//! ## The decimation problem
//!
//! Several logical sensors share one physical engine, which the arbitrator
//! configures at the *fastest* requested rate. A sensor that asked for
//! 50 ms samples on an engine running at 10 ms must see every fifth
//! sample — not every sample, and not a jittery mix.
//!
//! ## Rule
//!
//! Per sensor, the gate keeps the last emitted timestamp and computes a
//! delivery threshold from the engine's configured interval `E` and the
//! sensor's requested interval `R`:
//!
//! ```text
//! periods    = round(R / E)          (whole engine intervals per output)
//! threshold  = periods * E - E / 2   (half an engine interval of slack)
//! emit  iff  timestamp - last_emitted > threshold
//! ```
//!
//! Snapping to whole engine intervals keeps consecutive emissions evenly
//! spaced when a slow consumer shares a fast engine; the half-interval
//! slack absorbs device timestamp jitter. `R <= E` degenerates to a zero
//! threshold: the sensor takes every sample, including the boundary case
//! where the requested rate exactly equals the configured rate.
//!
//! ## Batch and edge-triggered delivery
//!
//! In batch mode the threshold is bypassed entirely — the device already
//! timed the samples — and only exact-equal timestamps are suppressed,
//! because a device may repeat the last FIFO entry at drain boundaries.
//! Edge-triggered sensors (step, tilt, pickup) get the same equality-only
//! suppression in every mode.

use crate::sensors::{DeliveryMode, LogicalSensor};
use crate::time::Timestamp;

/// Delivery threshold in nanoseconds for a continuous-mode sensor
pub fn threshold(engine_ns: u64, requested_ns: u64) -> u64 {
    if engine_ns == 0 || requested_ns <= engine_ns {
        return 0;
    }
    let periods = (requested_ns + engine_ns / 2) / engine_ns;
    periods * engine_ns - engine_ns / 2
}

/// Gate one routed sample
///
/// `engine_ns` is the *configured* interval of the engine driving this
/// sensor (`None` while unconfigured), `requested_ns` the sensor's own
/// effective interval. Updates `last_emitted` when the sample is due.
pub fn maybe_emit(
    sensor: &mut LogicalSensor,
    engine_ns: Option<u64>,
    requested_ns: u64,
    timestamp: Timestamp,
) -> bool {
    match sensor.mode() {
        DeliveryMode::Disabled => false,
        DeliveryMode::Batched => emit_deduped(sensor, timestamp),
        DeliveryMode::Continuous => {
            if sensor.kind.is_edge_triggered() {
                return emit_deduped(sensor, timestamp);
            }
            if sensor.last_emitted == 0 {
                // First sample after enable: deliver immediately.
                sensor.last_emitted = timestamp;
                return true;
            }
            let gate_ns = threshold(engine_ns.unwrap_or(0), requested_ns);
            if timestamp.saturating_sub(sensor.last_emitted) > gate_ns {
                sensor.last_emitted = timestamp;
                true
            } else {
                false
            }
        }
    }
}

/// Exact-timestamp duplicate suppression
fn emit_deduped(sensor: &mut LogicalSensor, timestamp: Timestamp) -> bool {
    if timestamp == sensor.last_emitted {
        return false;
    }
    sensor.last_emitted = timestamp;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::{SensorKind, SensorTable};
    use crate::time::NS_PER_MS;
    use core::time::Duration;

    fn continuous(kind: SensorKind, interval_ms: u64) -> LogicalSensor {
        let mut table = SensorTable::new();
        let sensor = table.get_mut(kind);
        sensor.enabled = true;
        sensor.interval = Duration::from_millis(interval_ms);
        *sensor
    }

    #[test]
    fn equal_rates_emit_every_sample() {
        let mut sensor = continuous(SensorKind::Gyroscope, 20);
        let engine = Some(20 * NS_PER_MS);
        let mut emitted = 0;
        for i in 1..=50u64 {
            if maybe_emit(&mut sensor, engine, 20 * NS_PER_MS, i * 20 * NS_PER_MS) {
                emitted += 1;
            }
        }
        assert_eq!(emitted, 50);
    }

    #[test]
    fn slow_consumer_on_fast_engine_decimates() {
        let mut sensor = continuous(SensorKind::Accelerometer, 50);
        let engine = Some(10 * NS_PER_MS);
        let mut emissions = std::vec::Vec::new();
        for i in 1..=100u64 {
            let ts = i * 10 * NS_PER_MS;
            if maybe_emit(&mut sensor, engine, 50 * NS_PER_MS, ts) {
                emissions.push(ts);
            }
        }
        // First sample immediately, then every fifth engine sample.
        assert_eq!(emissions.len(), 20);
        for pair in emissions[1..].windows(2) {
            assert_eq!(pair[1] - pair[0], 50 * NS_PER_MS);
        }
    }

    #[test]
    fn threshold_snaps_to_engine_periods() {
        let e = 10 * NS_PER_MS;
        // Exact multiple: R - E/2.
        assert_eq!(threshold(e, 50 * NS_PER_MS), 45 * NS_PER_MS);
        // Non-multiple rounds to the nearest whole period.
        assert_eq!(threshold(e, 25 * NS_PER_MS), 25 * NS_PER_MS);
        // Requested faster or equal: take every sample.
        assert_eq!(threshold(e, e), 0);
        assert_eq!(threshold(e, 5 * NS_PER_MS), 0);
    }

    #[test]
    fn batch_mode_bypasses_threshold_but_dedupes() {
        let mut table = SensorTable::new();
        let sensor = table.get_mut(SensorKind::Accelerometer);
        sensor.enabled = true;
        sensor.interval = Duration::from_millis(100);
        sensor.batch_timeout = Duration::from_millis(1000);

        let engine = Some(10 * NS_PER_MS);
        // Samples far faster than requested all pass in batch mode.
        assert!(maybe_emit(sensor, engine, 100 * NS_PER_MS, 10));
        assert!(maybe_emit(sensor, engine, 100 * NS_PER_MS, 20));
        // FIFO drain repeated the last entry: suppressed.
        assert!(!maybe_emit(sensor, engine, 100 * NS_PER_MS, 20));
        assert!(maybe_emit(sensor, engine, 100 * NS_PER_MS, 30));
    }

    #[test]
    fn edge_triggered_ignores_rate_in_continuous_mode() {
        let mut sensor = continuous(SensorKind::StepDetector, 1000);
        let engine = Some(20 * NS_PER_MS);
        assert!(maybe_emit(&mut sensor, engine, 1000 * NS_PER_MS, 100));
        // Same pulse timestamp twice: one event.
        assert!(!maybe_emit(&mut sensor, engine, 1000 * NS_PER_MS, 100));
        // A new pulse well inside the "interval" still emits.
        assert!(maybe_emit(&mut sensor, engine, 1000 * NS_PER_MS, 150));
    }

    #[test]
    fn disabled_sensor_never_emits() {
        let mut table = SensorTable::new();
        let sensor = table.get_mut(SensorKind::Gyroscope);
        assert!(!maybe_emit(sensor, Some(NS_PER_MS), NS_PER_MS, 1000));
        assert_eq!(sensor.last_emitted, 0);
    }

    #[test]
    fn unconfigured_engine_passes_samples_through() {
        let mut sensor = continuous(SensorKind::Gyroscope, 20);
        assert!(maybe_emit(&mut sensor, None, 20 * NS_PER_MS, 10 * NS_PER_MS));
        assert!(maybe_emit(&mut sensor, None, 20 * NS_PER_MS, 11 * NS_PER_MS));
    }
}

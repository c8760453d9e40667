//! Consumer-facing events and the ordered delivery queue
//!
//! The hub's output is a single ordered queue of typed events: one
//! [`HubEvent::Sample`] per due sensor sample, plus
//! [`HubEvent::FlushComplete`] markers. Order is the decode order of the
//! poll cycle; the only permitted reordering is deferring a flush marker
//! until its accounting is complete.
//!
//! The queue is bounded and single-threaded — the core runs one poll cycle
//! at a time on one dispatch thread, so there is nothing to lock. Overflow
//! drops the newest event and counts it; the consumer can watch
//! [`QueueStats::dropped`] for backpressure.

use heapless::Deque;

use crate::sensors::{Accuracy, SensorKind};
use crate::time::Timestamp;

/// Event queue capacity
pub const EVENT_QUEUE_CAPACITY: usize = 128;

/// Payload of a sample event
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SampleValue {
    /// Calibrated three-axis value
    Vec3([f32; 3]),
    /// Uncalibrated value plus estimated bias (raw-variant sensors)
    VecBias {
        /// Uncalibrated reading
        value: [f32; 3],
        /// Estimated bias in the same units
        bias: [f32; 3],
    },
    /// Orientation quaternion `[x, y, z, w]` with heading accuracy
    Quat {
        /// Unit quaternion
        quat: [f32; 4],
        /// Heading accuracy estimate in radians
        heading_accuracy: f32,
    },
    /// Single-channel value (pressure, light, proximity)
    Scalar(f32),
    /// Monotonic running count (step counter)
    Count(u64),
    /// Edge-triggered occurrence with no magnitude
    Trigger,
}

/// One entry in the consumer queue
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HubEvent {
    /// A due sample for an enabled logical sensor
    Sample {
        /// Source sensor
        sensor: SensorKind,
        /// Device timestamp of the underlying record
        timestamp: Timestamp,
        /// Typed payload
        value: SampleValue,
        /// Calibration grade at emission time
        accuracy: Accuracy,
    },
    /// All samples queued before the matching `flush()` call have been
    /// delivered
    FlushComplete {
        /// Sensor the flush was requested for
        sensor: SensorKind,
    },
}

impl HubEvent {
    /// The sensor this event belongs to
    pub fn sensor(&self) -> SensorKind {
        match self {
            Self::Sample { sensor, .. } => *sensor,
            Self::FlushComplete { sensor } => *sensor,
        }
    }
}

/// Queue health counters
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueStats {
    /// Total events accepted
    pub pushed: u32,
    /// Events dropped because the queue was full
    pub dropped: u32,
    /// Deepest occupancy seen
    pub max_depth: u32,
}

/// Bounded FIFO of consumer events
pub struct EventQueue {
    events: Deque<HubEvent, EVENT_QUEUE_CAPACITY>,
    stats: QueueStats,
}

impl EventQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self { events: Deque::new(), stats: QueueStats::default() }
    }

    /// Append an event, dropping it (and counting the drop) when full
    pub fn push(&mut self, event: HubEvent) -> bool {
        match self.events.push_back(event) {
            Ok(()) => {
                self.stats.pushed += 1;
                let depth = self.events.len() as u32;
                if depth > self.stats.max_depth {
                    self.stats.max_depth = depth;
                }
                true
            }
            Err(_) => {
                self.stats.dropped += 1;
                false
            }
        }
    }

    /// Remove the oldest event
    pub fn pop(&mut self) -> Option<HubEvent> {
        self.events.pop_front()
    }

    /// Current occupancy
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True when no events are queued
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Health counters
    pub fn stats(&self) -> QueueStats {
        self.stats
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ts: Timestamp) -> HubEvent {
        HubEvent::Sample {
            sensor: SensorKind::Accelerometer,
            timestamp: ts,
            value: SampleValue::Vec3([0.0, 0.0, 9.8]),
            accuracy: Accuracy::High,
        }
    }

    #[test]
    fn fifo_order() {
        let mut q = EventQueue::new();
        q.push(sample(1));
        q.push(HubEvent::FlushComplete { sensor: SensorKind::Accelerometer });
        q.push(sample(2));

        assert_eq!(q.pop(), Some(sample(1)));
        assert_eq!(
            q.pop(),
            Some(HubEvent::FlushComplete { sensor: SensorKind::Accelerometer })
        );
        assert_eq!(q.pop(), Some(sample(2)));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn overflow_drops_newest_and_counts() {
        let mut q = EventQueue::new();
        for i in 0..EVENT_QUEUE_CAPACITY as u64 {
            assert!(q.push(sample(i)));
        }
        assert!(!q.push(sample(9999)));
        assert_eq!(q.stats().dropped, 1);
        assert_eq!(q.stats().max_depth, EVENT_QUEUE_CAPACITY as u32);
        // Oldest survives; the overflowing event is the one lost.
        assert_eq!(q.pop(), Some(sample(0)));
    }
}

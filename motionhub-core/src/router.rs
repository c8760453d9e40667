//! Record routing: decoded records to per-sensor calibrated samples
//!
//! ## Overview
//!
//! The router is the fan-out point between the framer and the output gate.
//! For each decoded record it:
//!
//! 1. updates the per-engine raw sample cache,
//! 2. invokes the calibration provider (calibrate or fusion, by kind), and
//! 3. produces zero or more [`RoutedSample`]s, one per logical sensor the
//!    record feeds.
//!
//! One record can feed many sensors: in host-fused mode a single gyro
//! record refreshes the gyro streams *and* every fusion-derived stream,
//! because the provider rebuilds its quaternions on each gyro sample. In
//! device-fused mode the fusion streams ride their own quaternion records
//! instead.
//!
//! Accuracy-status records update sensor grades for their calibration
//! domain and never produce output. Edge-triggered pulses (step, tilt,
//! pickup) are forwarded verbatim, stamped with the accel cache timestamp
//! the gesture engine derives from. Markers are the hub's business and
//! route to nothing here.
//!
//! A provider returning `None` anywhere means the affected sensor skips
//! this cycle; routing continues for the rest of the fan-out.

use heapless::Vec;

use crate::calibration::{Calibrated, CalibrationProvider, RawSample, RawSampleCache};
use crate::engines::{CalibrationMode, EngineId};
use crate::events::SampleValue;
use crate::records::{Record, RecordBody, RecordKind};
use crate::sensors::{Accuracy, SensorKind, SensorTable};
use crate::time::Timestamp;

/// Most sensors one record can feed
///
/// Worst case is a host-fused gyro record: both gyro streams plus five
/// fusion-derived streams.
pub const MAX_FANOUT: usize = 8;

/// A calibrated sample addressed to one logical sensor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoutedSample {
    /// Destination sensor
    pub sensor: SensorKind,
    /// Timestamp of the originating record
    pub timestamp: Timestamp,
    /// Typed payload for the consumer event
    pub value: SampleValue,
    /// Grade attached to the emitted event
    pub accuracy: Accuracy,
}

/// Routed output of one record
pub type Fanout = Vec<RoutedSample, MAX_FANOUT>;

/// Record classifier and raw-state owner
pub struct Router {
    cache: RawSampleCache,
}

impl Router {
    /// Create a router with an empty cache
    pub fn new() -> Self {
        Self { cache: RawSampleCache::default() }
    }

    /// Read access to the raw cache
    pub fn cache(&self) -> &RawSampleCache {
        &self.cache
    }

    /// Route one decoded record
    ///
    /// `sensors` is mutated for accuracy-status updates and step-count
    /// duplicate suppression. Disabled sensors are skipped at the source;
    /// the gate re-checks anyway.
    pub fn route<C: CalibrationProvider>(
        &mut self,
        record: &Record,
        sensors: &mut SensorTable,
        cal: &mut C,
        mode: CalibrationMode,
    ) -> Fanout {
        let mut out = Fanout::new();
        match record.kind {
            RecordKind::GyroRaw | RecordKind::Gyro => {
                let sample = raw_sample(record);
                self.cache.update(EngineId::Gyro, sample);
                self.route_calibrated(
                    EngineId::Gyro,
                    &sample,
                    SensorKind::Gyroscope,
                    Some(SensorKind::GyroscopeRaw),
                    record.timestamp,
                    sensors,
                    cal,
                    mode,
                    &mut out,
                );
                if mode == CalibrationMode::HostFused {
                    self.route_six_axis_group(record.timestamp, sensors, cal, &mut out);
                    self.route_nine_axis_group(record.timestamp, sensors, cal, &mut out);
                }
            }

            RecordKind::Accel => {
                let sample = raw_sample(record);
                self.cache.update(EngineId::Accel, sample);
                self.route_calibrated(
                    EngineId::Accel,
                    &sample,
                    SensorKind::Accelerometer,
                    None,
                    record.timestamp,
                    sensors,
                    cal,
                    mode,
                    &mut out,
                );
                if mode == CalibrationMode::HostFused {
                    self.route_geomag_group(record.timestamp, sensors, cal, &mut out);
                }
            }

            RecordKind::CompassRaw | RecordKind::Compass => {
                let sample = raw_sample(record);
                self.cache.update(EngineId::Compass, sample);
                self.route_calibrated(
                    EngineId::Compass,
                    &sample,
                    SensorKind::Magnetometer,
                    Some(SensorKind::MagnetometerRaw),
                    record.timestamp,
                    sensors,
                    cal,
                    mode,
                    &mut out,
                );
            }

            RecordKind::Pressure => {
                let sample = raw_sample(record);
                self.cache.update(EngineId::Pressure, sample);
                if sensors.get(SensorKind::Pressure).enabled {
                    if let Some(calibrated) = cal.calibrate(EngineId::Pressure, &sample) {
                        store_accuracy(sensors, SensorKind::Pressure, calibrated.accuracy);
                        push(&mut out, RoutedSample {
                            sensor: SensorKind::Pressure,
                            timestamp: record.timestamp,
                            value: SampleValue::Scalar(calibrated.values[0]),
                            accuracy: calibrated.accuracy,
                        });
                    }
                }
            }

            RecordKind::Light => {
                let sample = raw_sample(record);
                self.cache.update(EngineId::Light, sample);
                if let Some(calibrated) = cal.calibrate(EngineId::Light, &sample) {
                    for (sensor, channel) in
                        [(SensorKind::Light, 0usize), (SensorKind::Proximity, 1usize)]
                    {
                        if sensors.get(sensor).enabled {
                            push(&mut out, RoutedSample {
                                sensor,
                                timestamp: record.timestamp,
                                value: SampleValue::Scalar(calibrated.values[channel]),
                                accuracy: calibrated.accuracy,
                            });
                        }
                    }
                }
            }

            RecordKind::SixAxisQuat | RecordKind::PedQuat => {
                self.cache.update(EngineId::SixAxis, raw_sample(record));
                self.route_six_axis_group(record.timestamp, sensors, cal, &mut out);
            }

            RecordKind::NineAxisQuat => {
                self.cache.update(EngineId::NineAxis, raw_sample(record));
                self.route_nine_axis_group(record.timestamp, sensors, cal, &mut out);
            }

            RecordKind::GeomagQuat => {
                self.cache.update(EngineId::Geomag, raw_sample(record));
                self.route_geomag_group(record.timestamp, sensors, cal, &mut out);
            }

            RecordKind::StepCount => {
                let count = record.count();
                let sensor = sensors.get_mut(SensorKind::StepCounter);
                if sensor.enabled && sensor.last_count != count {
                    sensor.last_count = count;
                    let accuracy = sensor.accuracy;
                    push(&mut out, RoutedSample {
                        sensor: SensorKind::StepCounter,
                        timestamp: record.timestamp,
                        value: SampleValue::Count(count),
                        accuracy,
                    });
                }
            }

            RecordKind::Step => {
                self.route_pulse(SensorKind::StepDetector, self.gesture_timestamp(), sensors, &mut out);
            }
            RecordKind::StepStandalone => {
                self.route_pulse(SensorKind::StepDetector, record.timestamp, sensors, &mut out);
            }
            RecordKind::Tilt => {
                self.route_pulse(SensorKind::Tilt, self.gesture_timestamp(), sensors, &mut out);
            }
            RecordKind::Pickup => {
                self.route_pulse(SensorKind::Pickup, self.gesture_timestamp(), sensors, &mut out);
            }

            RecordKind::GyroAccuracy => {
                update_domain_accuracy(sensors, record, DOMAIN_GYRO);
            }
            RecordKind::AccelAccuracy => {
                update_domain_accuracy(sensors, record, DOMAIN_ACCEL);
            }
            RecordKind::CompassAccuracy => {
                update_domain_accuracy(sensors, record, DOMAIN_COMPASS);
            }

            // Markers and the activity classifier carry no consumer sample.
            RecordKind::Activity | RecordKind::EmptyMarker | RecordKind::FlushMarker => {}
        }
        out
    }

    /// Calibrated + raw-variant routing shared by the three triads
    ///
    /// Grade authority follows the calibration mode: host fusion trusts
    /// the provider's grade, device fusion trusts the accuracy-status
    /// records already folded into the sensor table.
    #[allow(clippy::too_many_arguments)]
    fn route_calibrated<C: CalibrationProvider>(
        &mut self,
        engine: EngineId,
        sample: &RawSample,
        calibrated_sensor: SensorKind,
        raw_sensor: Option<SensorKind>,
        timestamp: Timestamp,
        sensors: &mut SensorTable,
        cal: &mut C,
        mode: CalibrationMode,
        out: &mut Fanout,
    ) {
        let wants_cal = sensors.get(calibrated_sensor).enabled;
        let wants_raw = raw_sensor.is_some_and(|s| sensors.get(s).enabled);
        if !wants_cal && !wants_raw {
            return;
        }

        let Some(calibrated) = cal.calibrate(engine, sample) else {
            return;
        };
        let grade = match mode {
            CalibrationMode::HostFused => {
                store_accuracy(sensors, calibrated_sensor, calibrated.accuracy);
                calibrated.accuracy
            }
            CalibrationMode::DeviceFused => sensors.get(calibrated_sensor).accuracy,
        };

        if wants_cal {
            push(out, RoutedSample {
                sensor: calibrated_sensor,
                timestamp,
                value: SampleValue::Vec3(calibrated.values),
                accuracy: grade,
            });
        }
        if let Some(raw) = raw_sensor {
            if sensors.get(raw).enabled {
                push(out, RoutedSample {
                    sensor: raw,
                    timestamp,
                    value: uncalibrated_value(&calibrated),
                    // Raw variants always report ungraded data.
                    accuracy: Accuracy::Unreliable,
                });
            }
        }
    }

    fn route_six_axis_group<C: CalibrationProvider>(
        &mut self,
        timestamp: Timestamp,
        sensors: &mut SensorTable,
        cal: &mut C,
        out: &mut Fanout,
    ) {
        if sensors.get(SensorKind::GameRotationVector).enabled {
            if let Some(fused) = cal.fuse_six_axis(&self.cache) {
                push(out, RoutedSample {
                    sensor: SensorKind::GameRotationVector,
                    timestamp,
                    value: SampleValue::Quat {
                        quat: fused.quat,
                        heading_accuracy: fused.heading_accuracy,
                    },
                    accuracy: sensors.get(SensorKind::GameRotationVector).accuracy,
                });
            }
        }
        if sensors.get(SensorKind::LinearAcceleration).enabled {
            if let Some(la) = cal.linear_acceleration(&self.cache) {
                push(out, RoutedSample {
                    sensor: SensorKind::LinearAcceleration,
                    timestamp,
                    value: SampleValue::Vec3(la.values),
                    accuracy: la.accuracy,
                });
            }
        }
        if sensors.get(SensorKind::Gravity).enabled {
            if let Some(gravity) = cal.gravity(&self.cache) {
                push(out, RoutedSample {
                    sensor: SensorKind::Gravity,
                    timestamp,
                    value: SampleValue::Vec3(gravity.values),
                    accuracy: gravity.accuracy,
                });
            }
        }
    }

    fn route_nine_axis_group<C: CalibrationProvider>(
        &mut self,
        timestamp: Timestamp,
        sensors: &mut SensorTable,
        cal: &mut C,
        out: &mut Fanout,
    ) {
        if sensors.get(SensorKind::RotationVector).enabled {
            if let Some(fused) = cal.fuse_nine_axis(&self.cache) {
                push(out, RoutedSample {
                    sensor: SensorKind::RotationVector,
                    timestamp,
                    value: SampleValue::Quat {
                        quat: fused.quat,
                        heading_accuracy: fused.heading_accuracy,
                    },
                    accuracy: sensors.get(SensorKind::RotationVector).accuracy,
                });
            }
        }
        if sensors.get(SensorKind::Orientation).enabled {
            if let Some(orientation) = cal.orientation(&self.cache) {
                push(out, RoutedSample {
                    sensor: SensorKind::Orientation,
                    timestamp,
                    value: SampleValue::Vec3(orientation.values),
                    accuracy: orientation.accuracy,
                });
            }
        }
    }

    fn route_geomag_group<C: CalibrationProvider>(
        &mut self,
        timestamp: Timestamp,
        sensors: &mut SensorTable,
        cal: &mut C,
        out: &mut Fanout,
    ) {
        if sensors.get(SensorKind::GeomagneticRotationVector).enabled {
            if let Some(fused) = cal.fuse_geomagnetic(&self.cache) {
                push(out, RoutedSample {
                    sensor: SensorKind::GeomagneticRotationVector,
                    timestamp,
                    value: SampleValue::Quat {
                        quat: fused.quat,
                        heading_accuracy: fused.heading_accuracy,
                    },
                    accuracy: sensors.get(SensorKind::GeomagneticRotationVector).accuracy,
                });
            }
        }
    }

    fn route_pulse(
        &self,
        sensor: SensorKind,
        timestamp: Timestamp,
        sensors: &SensorTable,
        out: &mut Fanout,
    ) {
        if sensors.get(sensor).enabled {
            let accuracy = sensors.get(sensor).accuracy;
            push(out, RoutedSample {
                sensor,
                timestamp,
                value: SampleValue::Trigger,
                accuracy,
            });
        }
    }

    /// Gesture pulses carry no wire timestamp; the gesture engine runs off
    /// the accel stream, so its latest timestamp is the pulse time.
    fn gesture_timestamp(&self) -> Timestamp {
        self.cache.accel.map(|s| s.timestamp).unwrap_or(0)
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

/// Sensors whose grade follows the gyro calibration domain
const DOMAIN_GYRO: &[SensorKind] = &[
    SensorKind::Gyroscope,
    SensorKind::GyroscopeRaw,
    SensorKind::GameRotationVector,
];

/// Sensors whose grade follows the accel calibration domain
const DOMAIN_ACCEL: &[SensorKind] = &[
    SensorKind::Accelerometer,
    SensorKind::LinearAcceleration,
    SensorKind::Gravity,
];

/// Sensors whose grade follows the compass calibration domain
const DOMAIN_COMPASS: &[SensorKind] = &[
    SensorKind::Magnetometer,
    SensorKind::MagnetometerRaw,
    SensorKind::RotationVector,
    SensorKind::GeomagneticRotationVector,
    SensorKind::Orientation,
];

fn update_domain_accuracy(sensors: &mut SensorTable, record: &Record, domain: &[SensorKind]) {
    let grade = match record.body {
        RecordBody::Scalar(raw) => Accuracy::from_raw(raw),
        _ => return,
    };
    for sensor in domain {
        sensors.get_mut(*sensor).accuracy = grade;
    }
}

fn store_accuracy(sensors: &mut SensorTable, sensor: SensorKind, accuracy: Accuracy) {
    sensors.get_mut(sensor).accuracy = accuracy;
}

/// Uncalibrated = calibrated + bias, the raw-variant payload convention
fn uncalibrated_value(calibrated: &Calibrated) -> SampleValue {
    SampleValue::VecBias {
        value: [
            calibrated.values[0] + calibrated.bias[0],
            calibrated.values[1] + calibrated.bias[1],
            calibrated.values[2] + calibrated.bias[2],
        ],
        bias: calibrated.bias,
    }
}

/// Widen a record payload into a raw cache sample
fn raw_sample(record: &Record) -> RawSample {
    let values = match record.body {
        RecordBody::Axes(axes) => [axes[0] as i32, axes[1] as i32, axes[2] as i32],
        RecordBody::Words(words) => words,
        RecordBody::Scalar(value) => [value, 0, 0],
    };
    RawSample { values, timestamp: record.timestamp }
}

fn push(out: &mut Fanout, sample: RoutedSample) {
    // Capacity covers the widest fan-out; a miss means MAX_FANOUT is stale.
    debug_assert!(!out.is_full());
    let _ = out.push(sample);
}

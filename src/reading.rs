use chrono::{DateTime, Utc};
use std::fmt;

/// Power-on default reported by DS18B20 probes before the first conversion.
pub const POWER_ON_DEFAULT_C: f64 = 85.0;
/// Reported when the probe answered but had nothing to convert yet.
pub const NOT_READY_C: f64 = 0.0;

/// True when the decoded value is one of the "sensor not ready" markers.
///
/// Exact comparison on purpose: the markers come out of the integer decode
/// bit-for-bit, so anything else is a real measurement.
#[allow(clippy::float_cmp)]
pub fn is_sentinel(value: f64) -> bool {
    value == NOT_READY_C || value == POWER_ON_DEFAULT_C
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SensorId(String);

impl SensorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Reading {
    pub sensor_id: SensorId,
    pub value: f64,
    pub observed_at: DateTime<Utc>,
}

impl Reading {
    pub fn new(sensor_id: SensorId, value: f64, observed_at: DateTime<Utc>) -> Self {
        Self {
            sensor_id,
            value,
            observed_at,
        }
    }

    pub fn is_valid(&self) -> bool {
        !is_sentinel(self.value)
    }
}

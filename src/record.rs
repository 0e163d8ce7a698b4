use crate::reading::Reading;

pub const DIMENSION_SENSOR_ID: &str = "SensorId";
pub const DIMENSION_MEASUREMENT: &str = "Measurement";
pub const MEASUREMENT_KIND: &str = "Temperature";
pub const MEASURE_NAME: &str = "temperature";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

impl Dimension {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasureValueType {
    Double,
    Bigint,
    Varchar,
    Boolean,
}

impl MeasureValueType {
    pub fn as_str(self) -> &'static str {
        match self {
            MeasureValueType::Double => "DOUBLE",
            MeasureValueType::Bigint => "BIGINT",
            MeasureValueType::Varchar => "VARCHAR",
            MeasureValueType::Boolean => "BOOLEAN",
        }
    }
}

/// One point as the store receives it. Built per valid reading, written once.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesRecord {
    pub dimensions: Vec<Dimension>,
    pub measure_name: String,
    pub measure_value: String,
    pub measure_value_type: MeasureValueType,
    pub timestamp_millis: i64,
}

impl TimeSeriesRecord {
    pub fn temperature(reading: &Reading) -> Self {
        Self {
            dimensions: vec![
                Dimension::new(DIMENSION_SENSOR_ID, reading.sensor_id.as_str()),
                Dimension::new(DIMENSION_MEASUREMENT, MEASUREMENT_KIND),
            ],
            measure_name: MEASURE_NAME.to_string(),
            measure_value: reading.value.to_string(),
            measure_value_type: MeasureValueType::Double,
            timestamp_millis: reading.observed_at.timestamp_millis(),
        }
    }
}

/// Hot/cold retention applied when the table is first created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionConfig {
    pub memory_store_hours: i64,
    pub magnetic_store_days: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            memory_store_hours: 1,
            magnetic_store_days: 1,
        }
    }
}

//! 1-Wire temperature probe discovery and decoding.
//!
//! The kernel `w1_therm` driver exposes each probe as a directory under
//! `/sys/bus/w1/devices` named `<family>-<serial>`, with a two-line
//! `w1_slave` status file:
//!
//! ```text
//! 72 01 4b 46 7f ff 0e 10 57 : crc=57 YES
//! 72 01 4b 46 7f ff 0e 10 57 t=23125
//! ```

use crate::reading::SensorId;
use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_DEVICES_DIR: &str = "/sys/bus/w1/devices";
/// DS18B20 family code.
pub const DEFAULT_FAMILY_PREFIX: &str = "28-";
const STATUS_FILE: &str = "w1_slave";
const CRC_OK_MARKER: &str = "YES";
const TEMPERATURE_TOKEN_INDEX: usize = 9;
const TEMPERATURE_TOKEN_PREFIX: &str = "t=";

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("failed to open {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to enumerate {}: {source}", path.display())]
    Enumerate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("status text has {lines} line(s), expected 2")]
    Truncated { lines: usize },
    #[error("crc check did not report YES")]
    CrcMismatch,
    #[error("malformed temperature line: {line:?}")]
    Malformed { line: String },
    #[error("sensor read timed out")]
    Timeout,
}

/// Source of temperature readings.
#[async_trait]
pub trait TemperatureProbe: Send + Sync {
    /// First probe in enumeration order. `Ok(None)` means nothing is attached.
    async fn find_sensor_id(&self) -> Result<Option<SensorId>, SensorError>;

    /// Degrees Celsius.
    async fn read_temperature(&self, id: &SensorId) -> Result<f64, SensorError>;
}

#[derive(Debug, Clone)]
pub struct W1Bus {
    devices_dir: PathBuf,
    family_prefix: String,
}

impl W1Bus {
    pub fn new(devices_dir: impl Into<PathBuf>, family_prefix: impl Into<String>) -> Self {
        Self {
            devices_dir: devices_dir.into(),
            family_prefix: family_prefix.into(),
        }
    }

    fn status_path(&self, id: &SensorId) -> PathBuf {
        self.devices_dir.join(id.as_str()).join(STATUS_FILE)
    }
}

impl Default for W1Bus {
    fn default() -> Self {
        Self::new(DEFAULT_DEVICES_DIR, DEFAULT_FAMILY_PREFIX)
    }
}

#[async_trait]
impl TemperatureProbe for W1Bus {
    async fn find_sensor_id(&self) -> Result<Option<SensorId>, SensorError> {
        let mut entries = match tokio::fs::read_dir(&self.devices_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(SensorError::Enumerate {
                    path: self.devices_dir.clone(),
                    source,
                })
            }
        };

        let mut matches = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(source) => {
                    return Err(SensorError::Enumerate {
                        path: self.devices_dir.clone(),
                        source,
                    })
                }
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(&self.family_prefix) {
                matches.push(name);
            }
        }

        // read_dir order is filesystem-dependent; sort so "first" is stable.
        matches.sort();
        Ok(matches.into_iter().next().map(SensorId::new))
    }

    async fn read_temperature(&self, id: &SensorId) -> Result<f64, SensorError> {
        let path = self.status_path(id);
        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| SensorError::Unreadable { path, source })?;
        parse_w1_slave(&contents)
    }
}

/// Decode the `w1_slave` status text into degrees Celsius.
pub fn parse_w1_slave(contents: &str) -> Result<f64, SensorError> {
    let lines: Vec<&str> = contents.lines().collect();
    if lines.len() < 2 {
        return Err(SensorError::Truncated { lines: lines.len() });
    }
    if !lines[0].contains(CRC_OK_MARKER) {
        return Err(SensorError::CrcMismatch);
    }

    let line = lines[1];
    let millidegrees = line
        .split(' ')
        .nth(TEMPERATURE_TOKEN_INDEX)
        .and_then(|token| token.trim().strip_prefix(TEMPERATURE_TOKEN_PREFIX))
        .and_then(|raw| raw.parse::<i64>().ok())
        .ok_or_else(|| SensorError::Malformed {
            line: line.to_string(),
        })?;

    Ok(millidegrees as f64 / 1000.0)
}

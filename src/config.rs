use crate::alert::{DEFAULT_TEMPLATE, DEFAULT_THRESHOLD_C};
use crate::control::LoopSettings;
use crate::export::UnloadJob;
use crate::record::RetentionConfig;
use crate::sensor::{DEFAULT_DEVICES_DIR, DEFAULT_FAMILY_PREFIX};
use crate::window::DEFAULT_WINDOW_SIZE;
use anyhow::{anyhow, bail, Context, Result};
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_OVERRIDES_PATH: &str = "/etc/temp-sentinel/config.json";

fn overrides_path() -> PathBuf {
    env_optional("SENTINEL_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OVERRIDES_PATH))
}

/// Keys accepted in the JSON overrides file. Each one only applies when the
/// matching environment variable is unset.
#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigOverrides {
    #[serde(default)]
    aws_region: Option<String>,
    #[serde(default)]
    database: Option<String>,
    #[serde(default)]
    table: Option<String>,
    #[serde(default)]
    alert_threshold: Option<f64>,
    #[serde(default)]
    alert_topic_arn: Option<String>,
    #[serde(default)]
    alert_template: Option<String>,
    #[serde(default)]
    window_size: Option<usize>,
    #[serde(default)]
    poll_interval_ms: Option<u64>,
    #[serde(default)]
    w1_devices_dir: Option<String>,
    #[serde(default)]
    export_bucket: Option<String>,
    #[serde(default)]
    export_prefix: Option<String>,
}

/// A missing file is `Ok(None)`. An unreadable or unparsable one is reported
/// as a warning string; config loading runs before logging is installed.
fn load_overrides(path: &Path) -> std::result::Result<Option<ConfigOverrides>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path).map_err(|err| {
        format!(
            "failed to read config overrides {}: {err}; using env defaults",
            path.display()
        )
    })?;
    serde_json::from_str(&contents).map(Some).map_err(|err| {
        format!(
            "failed to parse config overrides {}: {err}; using env defaults",
            path.display()
        )
    })
}

fn apply_overrides(config: &mut Config, overrides: &ConfigOverrides) {
    let env_allows = |key: &str| env_optional(key).is_none();
    let non_empty = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    if env_allows("SENTINEL_AWS_REGION") && env_allows("AWS_REGION") {
        if let Some(region) = non_empty(&overrides.aws_region) {
            config.aws_region = region;
        }
    }
    if env_allows("SENTINEL_DATABASE") {
        if let Some(database) = non_empty(&overrides.database) {
            config.database = database;
        }
    }
    if env_allows("SENTINEL_TABLE") {
        if let Some(table) = non_empty(&overrides.table) {
            config.table = table;
        }
    }
    if env_allows("SENTINEL_ALERT_THRESHOLD") {
        if let Some(threshold) = overrides.alert_threshold.filter(|v| v.is_finite()) {
            config.alert_threshold = threshold;
        }
    }
    if env_allows("SENTINEL_ALERT_TOPIC_ARN") {
        if let Some(arn) = non_empty(&overrides.alert_topic_arn) {
            config.alert_topic_arn = Some(arn);
        }
    }
    if env_allows("SENTINEL_ALERT_TEMPLATE") {
        if let Some(template) = non_empty(&overrides.alert_template) {
            config.alert_template = template;
        }
    }
    if env_allows("SENTINEL_WINDOW_SIZE") {
        if let Some(size) = overrides.window_size.filter(|v| *v != 0) {
            config.window_size = size;
        }
    }
    if env_allows("SENTINEL_POLL_INTERVAL_MS") {
        if let Some(ms) = overrides.poll_interval_ms.filter(|v| *v != 0) {
            config.poll_interval_ms = ms;
        }
    }
    if env_allows("SENTINEL_W1_DEVICES_DIR") {
        if let Some(dir) = non_empty(&overrides.w1_devices_dir) {
            config.w1_devices_dir = PathBuf::from(dir);
        }
    }
    if env_allows("SENTINEL_EXPORT_BUCKET") {
        if let Some(bucket) = non_empty(&overrides.export_bucket) {
            config.export_bucket = bucket;
        }
    }
    if env_allows("SENTINEL_EXPORT_PREFIX") {
        if let Some(prefix) = overrides.export_prefix.as_deref() {
            config.export_prefix = prefix.trim().to_string();
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub aws_region: String,
    pub database: String,
    pub table: String,
    pub memory_retention_hours: i64,
    pub magnetic_retention_days: i64,
    pub alert_threshold: f64,
    pub alert_topic_arn: Option<String>,
    pub alert_template: String,
    pub window_size: usize,
    pub poll_interval_ms: u64,
    pub call_timeout_ms: u64,
    pub w1_devices_dir: PathBuf,
    pub sensor_prefix: String,
    pub export_bucket: String,
    pub export_prefix: String,
    pub export_lookback_hours: u32,
    pub export_timeout_secs: u64,
    pub log_file: Option<PathBuf>,
    pub otlp_endpoint: Option<String>,
    /// Problems found while loading; log them once tracing is up.
    pub warnings: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let aws_region = env_optional("SENTINEL_AWS_REGION")
            .or_else(|| env_optional("AWS_REGION"))
            .unwrap_or_else(|| "eu-west-1".to_string());

        let mut config = Self {
            aws_region,
            database: env_string("SENTINEL_DATABASE", "db_sensor"),
            table: env_string("SENTINEL_TABLE", "temp_evolution"),
            memory_retention_hours: env_parse("SENTINEL_MEMORY_RETENTION_HOURS", 1)?,
            magnetic_retention_days: env_parse("SENTINEL_MAGNETIC_RETENTION_DAYS", 1)?,
            alert_threshold: env_parse("SENTINEL_ALERT_THRESHOLD", DEFAULT_THRESHOLD_C)?,
            alert_topic_arn: env_optional("SENTINEL_ALERT_TOPIC_ARN"),
            alert_template: env_string("SENTINEL_ALERT_TEMPLATE", DEFAULT_TEMPLATE),
            window_size: env_parse("SENTINEL_WINDOW_SIZE", DEFAULT_WINDOW_SIZE)?,
            poll_interval_ms: env_parse("SENTINEL_POLL_INTERVAL_MS", 1000)?,
            call_timeout_ms: env_parse("SENTINEL_CALL_TIMEOUT_MS", 5000)?,
            w1_devices_dir: PathBuf::from(env_string("SENTINEL_W1_DEVICES_DIR", DEFAULT_DEVICES_DIR)),
            sensor_prefix: env_string("SENTINEL_SENSOR_PREFIX", DEFAULT_FAMILY_PREFIX),
            export_bucket: env_string("SENTINEL_EXPORT_BUCKET", "sensor-daily-report-bucket"),
            export_prefix: env_optional("SENTINEL_EXPORT_PREFIX").unwrap_or_default(),
            export_lookback_hours: env_parse("SENTINEL_EXPORT_LOOKBACK_HOURS", 24)?,
            export_timeout_secs: env_parse("SENTINEL_EXPORT_TIMEOUT_SECS", 600)?,
            log_file: env_optional("SENTINEL_LOG_FILE").map(PathBuf::from),
            otlp_endpoint: env_optional("OTEL_EXPORTER_OTLP_ENDPOINT"),
            warnings: Vec::new(),
        };

        match load_overrides(&overrides_path()) {
            Ok(Some(overrides)) => apply_overrides(&mut config, &overrides),
            Ok(None) => {}
            Err(warning) => config.warnings.push(warning),
        }
        config.validate()?;
        Ok(config)
    }

    pub fn log_warnings(&self) {
        for warning in &self.warnings {
            tracing::warn!("{warning}");
        }
    }

    fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            bail!("SENTINEL_WINDOW_SIZE must be at least 1");
        }
        if !self.alert_threshold.is_finite() {
            bail!("SENTINEL_ALERT_THRESHOLD must be a finite number");
        }
        if self.poll_interval_ms == 0 {
            bail!("SENTINEL_POLL_INTERVAL_MS must be greater than zero");
        }
        if self.call_timeout_ms == 0 {
            bail!("SENTINEL_CALL_TIMEOUT_MS must be greater than zero");
        }
        if self.export_lookback_hours == 0 {
            bail!("SENTINEL_EXPORT_LOOKBACK_HOURS must be greater than zero");
        }
        Ok(())
    }

    pub fn require_alert_topic(&self) -> Result<&str> {
        self.alert_topic_arn
            .as_deref()
            .ok_or_else(|| anyhow!("SENTINEL_ALERT_TOPIC_ARN is required (or alert_topic_arn in the config overrides)"))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn export_timeout(&self) -> Duration {
        Duration::from_secs(self.export_timeout_secs)
    }

    pub fn retention(&self) -> RetentionConfig {
        RetentionConfig {
            memory_store_hours: self.memory_retention_hours,
            magnetic_store_days: self.magnetic_retention_days,
        }
    }

    pub fn loop_settings(&self) -> Result<LoopSettings> {
        Ok(LoopSettings {
            database: self.database.clone(),
            table: self.table.clone(),
            retention: self.retention(),
            alert_destination: self.require_alert_topic()?.to_string(),
            period: self.poll_interval(),
            call_timeout: self.call_timeout(),
        })
    }

    pub fn unload_job(&self) -> UnloadJob {
        UnloadJob {
            database: self.database.clone(),
            table: self.table.clone(),
            bucket: self.export_bucket.clone(),
            prefix: self.export_prefix.clone(),
            lookback_hours: self.export_lookback_hours,
        }
    }
}

fn env_string(key: &str, default: &str) -> String {
    env_optional(key).unwrap_or_else(|| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env_optional(key) {
        Some(value) => value.parse::<T>().with_context(|| format!("invalid {key}")),
        None => Ok(default),
    }
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

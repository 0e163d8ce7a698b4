//! In-memory collaborators that record every call.

use crate::reading::SensorId;
use crate::record::{RetentionConfig, TimeSeriesRecord};
use crate::sensor::{SensorError, TemperatureProbe};
use crate::sink::{
    Creation, NotificationSink, NotifyError, Presence, QueryOutcome, SinkError, TimeSeriesQuery,
    TimeSeriesSink,
};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

pub const TEST_SENSOR: &str = "28-0316a279b1ff";

#[derive(Debug, Clone, Copy)]
pub enum ProbeStep {
    Value(f64),
    NoSensor,
    ReadError,
    Hang,
}

/// Replays a script, one step per iteration. An exhausted script reports no sensor.
pub struct ScriptedProbe {
    steps: Mutex<VecDeque<ProbeStep>>,
}

impl ScriptedProbe {
    pub fn new(steps: impl IntoIterator<Item = ProbeStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
        }
    }

    pub fn values(values: &[f64]) -> Self {
        Self::new(values.iter().copied().map(ProbeStep::Value))
    }
}

#[async_trait]
impl TemperatureProbe for ScriptedProbe {
    async fn find_sensor_id(&self) -> Result<Option<SensorId>, SensorError> {
        let mut steps = self.steps.lock().unwrap();
        match steps.front() {
            None => Ok(None),
            Some(ProbeStep::NoSensor) => {
                steps.pop_front();
                Ok(None)
            }
            Some(_) => Ok(Some(SensorId::new(TEST_SENSOR))),
        }
    }

    async fn read_temperature(&self, _id: &SensorId) -> Result<f64, SensorError> {
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(ProbeStep::Value(value)) => Ok(value),
            Some(ProbeStep::Hang) => {
                futures::future::pending::<()>().await;
                unreachable!()
            }
            _ => Err(SensorError::Truncated { lines: 0 }),
        }
    }
}

#[derive(Default)]
pub(crate) struct SinkState {
    namespaces: HashSet<String>,
    tables: HashSet<(String, String)>,
    writes: Vec<TimeSeriesRecord>,
    create_calls: usize,
}

#[derive(Default)]
pub struct RecordingSink {
    pub(crate) state: Mutex<SinkState>,
    pub fail_writes: bool,
    pub fail_creates: bool,
    /// Only `create_table` fails; the database step still succeeds.
    pub fail_table_creates: bool,
    pub fail_describes: bool,
    /// Describe says "missing" but create reports a conflict, as when
    /// another process wins the race.
    pub lose_create_race: bool,
    pub hang_writes: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> Vec<TimeSeriesRecord> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn create_calls(&self) -> usize {
        self.state.lock().unwrap().create_calls
    }

    pub fn has_table(&self, namespace: &str, table: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .tables
            .contains(&(namespace.to_string(), table.to_string()))
    }
}

#[async_trait]
impl TimeSeriesSink for RecordingSink {
    async fn describe_namespace(&self, name: &str) -> Result<Presence, SinkError> {
        if self.fail_describes {
            return Err(SinkError::service("describe_namespace", "access denied"));
        }
        let state = self.state.lock().unwrap();
        if state.namespaces.contains(name) && !self.lose_create_race {
            Ok(Presence::Exists)
        } else {
            Ok(Presence::NotFound)
        }
    }

    async fn create_namespace(&self, name: &str) -> Result<Creation, SinkError> {
        let mut state = self.state.lock().unwrap();
        state.create_calls += 1;
        if self.fail_creates {
            return Err(SinkError::service("create_namespace", "quota exceeded"));
        }
        if self.lose_create_race {
            state.namespaces.insert(name.to_string());
            return Ok(Creation::AlreadyExists);
        }
        if state.namespaces.insert(name.to_string()) {
            Ok(Creation::Created)
        } else {
            Ok(Creation::AlreadyExists)
        }
    }

    async fn describe_table(&self, namespace: &str, table: &str) -> Result<Presence, SinkError> {
        if self.fail_describes {
            return Err(SinkError::service("describe_table", "access denied"));
        }
        let state = self.state.lock().unwrap();
        let key = (namespace.to_string(), table.to_string());
        if state.tables.contains(&key) && !self.lose_create_race {
            Ok(Presence::Exists)
        } else {
            Ok(Presence::NotFound)
        }
    }

    async fn create_table(
        &self,
        namespace: &str,
        table: &str,
        _retention: &RetentionConfig,
    ) -> Result<Creation, SinkError> {
        let mut state = self.state.lock().unwrap();
        state.create_calls += 1;
        if self.fail_creates || self.fail_table_creates {
            return Err(SinkError::service("create_table", "quota exceeded"));
        }
        let inserted = state
            .tables
            .insert((namespace.to_string(), table.to_string()));
        if inserted && !self.lose_create_race {
            Ok(Creation::Created)
        } else {
            Ok(Creation::AlreadyExists)
        }
    }

    async fn write_record(
        &self,
        _namespace: &str,
        _table: &str,
        record: &TimeSeriesRecord,
    ) -> Result<(), SinkError> {
        if self.hang_writes {
            futures::future::pending::<()>().await;
        }
        let mut state = self.state.lock().unwrap();
        // Attempts are recorded even when they fail so tests can count them.
        state.writes.push(record.clone());
        if self.fail_writes {
            return Err(SinkError::service("write_records", "throttled"));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
    pub fail: bool,
    pub hang: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn send(&self, destination: &str, message: &str) -> Result<String, NotifyError> {
        let count = {
            let mut sent = self.sent.lock().unwrap();
            sent.push((destination.to_string(), message.to_string()));
            sent.len()
        };
        if self.hang {
            futures::future::pending::<()>().await;
        }
        if self.fail {
            return Err(NotifyError::Delivery("endpoint unreachable".to_string()));
        }
        Ok(format!("msg-{count}"))
    }
}

pub struct RecordingQuery {
    statements: Mutex<Vec<String>>,
    fail_with: Option<fn() -> SinkError>,
    hang: bool,
}

impl RecordingQuery {
    pub fn new() -> Self {
        Self {
            statements: Mutex::new(Vec::new()),
            fail_with: None,
            hang: false,
        }
    }

    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::new()
        }
    }

    pub fn failing(fail_with: fn() -> SinkError) -> Self {
        Self {
            statements: Mutex::new(Vec::new()),
            fail_with: Some(fail_with),
            hang: false,
        }
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }
}

#[async_trait]
impl TimeSeriesQuery for RecordingQuery {
    async fn query(&self, statement: &str) -> Result<QueryOutcome, SinkError> {
        self.statements.lock().unwrap().push(statement.to_string());
        if self.hang {
            futures::future::pending::<()>().await;
        }
        if let Some(fail_with) = self.fail_with {
            return Err(fail_with());
        }
        Ok(QueryOutcome {
            query_id: Some("q-1".to_string()),
            rows: vec![vec![
                Some("1".to_string()),
                Some("1024".to_string()),
                Some("s3://sensor-daily-report-bucket/2026-10-19/manifest".to_string()),
            ]],
        })
    }
}

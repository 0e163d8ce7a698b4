//! The sampling loop: probe, filter, persist, alert, sleep.

use crate::alert::{AlertGate, Transition};
use crate::reading::Reading;
use crate::record::{RetentionConfig, TimeSeriesRecord};
use crate::sensor::{SensorError, TemperatureProbe};
use crate::sink::{bounded, Creation, NotificationSink, NotifyError, Presence, SinkError, TimeSeriesSink};
use crate::window::SmoothingWindow;
use chrono::Utc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to create database {database}: {source}")]
    Namespace {
        database: String,
        #[source]
        source: SinkError,
    },
    #[error("failed to create table {database}.{table}: {source}")]
    Table {
        database: String,
        table: String,
        #[source]
        source: SinkError,
    },
}

#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub database: String,
    pub table: String,
    pub retention: RetentionConfig,
    pub alert_destination: String,
    pub period: Duration,
    pub call_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    NoSensor,
    ReadFailed,
    NotReady(f64),
    Recorded {
        value: f64,
        written: bool,
        transition: Transition,
        notified: bool,
        smoothed: Option<f64>,
    },
}

/// Idempotent database + table setup. "Already exists" on either step is success.
pub async fn ensure_storage<S: TimeSeriesSink + ?Sized>(
    sink: &S,
    database: &str,
    table: &str,
    retention: &RetentionConfig,
    call_timeout: Duration,
) -> Result<(), StartupError> {
    let presence = bounded(
        "describe_database",
        call_timeout,
        sink.describe_namespace(database),
    )
    .await;
    match presence {
        Ok(Presence::Exists) => tracing::info!(database, "database already exists"),
        other => {
            if let Err(err) = other {
                tracing::warn!(database, error = %err, "failed to describe database; attempting create");
            } else {
                tracing::info!(database, "database does not exist");
            }
            let created = bounded("create_database", call_timeout, sink.create_namespace(database))
                .await
                .map_err(|source| StartupError::Namespace {
                    database: database.to_string(),
                    source,
                })?;
            match created {
                Creation::Created => tracing::info!(database, "database created"),
                Creation::AlreadyExists => {
                    tracing::info!(database, "database created concurrently; continuing")
                }
            }
        }
    }

    let presence = bounded(
        "describe_table",
        call_timeout,
        sink.describe_table(database, table),
    )
    .await;
    match presence {
        Ok(Presence::Exists) => tracing::info!(database, table, "table already exists"),
        other => {
            if let Err(err) = other {
                tracing::warn!(database, table, error = %err, "failed to describe table; attempting create");
            } else {
                tracing::info!(database, table, "table does not exist");
            }
            let created = bounded(
                "create_table",
                call_timeout,
                sink.create_table(database, table, retention),
            )
            .await
            .map_err(|source| StartupError::Table {
                database: database.to_string(),
                table: table.to_string(),
                source,
            })?;
            match created {
                Creation::Created => tracing::info!(
                    database,
                    table,
                    memory_hours = retention.memory_store_hours,
                    magnetic_days = retention.magnetic_store_days,
                    "table created"
                ),
                Creation::AlreadyExists => {
                    tracing::info!(database, table, "table created concurrently; skipping")
                }
            }
        }
    }

    Ok(())
}

pub struct ControlLoop<P, S, N> {
    probe: P,
    sink: S,
    notifier: N,
    window: SmoothingWindow,
    gate: AlertGate,
    settings: LoopSettings,
}

impl<P, S, N> ControlLoop<P, S, N>
where
    P: TemperatureProbe,
    S: TimeSeriesSink,
    N: NotificationSink,
{
    pub fn new(
        probe: P,
        sink: S,
        notifier: N,
        window: SmoothingWindow,
        gate: AlertGate,
        settings: LoopSettings,
    ) -> Self {
        Self {
            probe,
            sink,
            notifier,
            window,
            gate,
            settings,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn window(&self) -> &SmoothingWindow {
        &self.window
    }

    pub fn gate(&self) -> &AlertGate {
        &self.gate
    }

    pub async fn ensure_storage(&self) -> Result<(), StartupError> {
        ensure_storage(
            &self.sink,
            &self.settings.database,
            &self.settings.table,
            &self.settings.retention,
            self.settings.call_timeout,
        )
        .await
    }

    /// One iteration. Never fails: every error is logged and folded into the outcome.
    pub async fn tick(&mut self) -> TickOutcome {
        let timeout = self.settings.call_timeout;

        let found = tokio::time::timeout(timeout, self.probe.find_sensor_id())
            .await
            .unwrap_or(Err(SensorError::Timeout));
        let sensor_id = match found {
            Ok(Some(id)) => id,
            Ok(None) => {
                tracing::info!("no temperature sensor found");
                return TickOutcome::NoSensor;
            }
            Err(err) => {
                tracing::warn!(error = %err, "sensor discovery failed");
                return TickOutcome::NoSensor;
            }
        };

        let read = tokio::time::timeout(timeout, self.probe.read_temperature(&sensor_id))
            .await
            .unwrap_or(Err(SensorError::Timeout));
        let value = match read {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(sensor_id = %sensor_id, error = %err, "error reading temperature");
                return TickOutcome::ReadFailed;
            }
        };

        let reading = Reading::new(sensor_id, value, Utc::now());
        if !reading.is_valid() {
            tracing::info!(sensor_id = %reading.sensor_id, value, "sensor not ready; skipping reading");
            return TickOutcome::NotReady(value);
        }

        tracing::info!(sensor_id = %reading.sensor_id, "Temperature: {value:.2}°C");
        self.window.push(value);
        let smoothed = self.window.average();
        if let Some(avg) = smoothed {
            tracing::debug!(sensor_id = %reading.sensor_id, avg, samples = self.window.len(), "smoothed temperature");
        }

        let record = TimeSeriesRecord::temperature(&reading);
        let written = match bounded(
            "write_records",
            timeout,
            self.sink
                .write_record(&self.settings.database, &self.settings.table, &record),
        )
        .await
        {
            Ok(()) => {
                tracing::info!(sensor_id = %reading.sensor_id, "Temperature: {value:.2}°C - written");
                true
            }
            Err(err) => {
                tracing::warn!(sensor_id = %reading.sensor_id, error = %err, "error writing to time-series store");
                false
            }
        };

        let transition = self.gate.evaluate(value);
        let notified = if transition.notifies() {
            self.notify(value).await
        } else {
            false
        };

        TickOutcome::Recorded {
            value,
            written,
            transition,
            notified,
            smoothed,
        }
    }

    async fn notify(&self, value: f64) -> bool {
        let message = self.gate.message(value);
        let timeout = self.settings.call_timeout;
        let sent = tokio::time::timeout(
            timeout,
            self.notifier
                .send(&self.settings.alert_destination, &message),
        )
        .await
        .unwrap_or(Err(NotifyError::Timeout(timeout)));
        match sent {
            Ok(message_id) => {
                tracing::info!(message_id = %message_id, threshold = self.gate.threshold(), value, "alert sent");
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, value, "error sending alert");
                false
            }
        }
    }

    /// Ticks until cancelled, or until `max_iterations` ticks have run.
    ///
    /// The period is slept after each tick completes, so ticks never overlap.
    pub async fn run(&mut self, cancel: CancellationToken, max_iterations: Option<u64>) -> u64 {
        let mut iteration = 0u64;
        loop {
            if cancel.is_cancelled() {
                break;
            }
            iteration += 1;
            let outcome = tokio::select! {
                _ = cancel.cancelled() => break,
                outcome = self.tick() => outcome,
            };
            tracing::trace!(iteration, ?outcome, "tick complete");

            if max_iterations.is_some_and(|max| iteration >= max) {
                break;
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.settings.period) => {}
            }
        }
        tracing::info!(iterations = iteration, "control loop stopped");
        iteration
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        ProbeStep, RecordingNotifier, RecordingSink, ScriptedProbe, TEST_SENSOR,
    };

    fn settings() -> LoopSettings {
        LoopSettings {
            database: "db_sensor".to_string(),
            table: "temp_evolution".to_string(),
            retention: RetentionConfig::default(),
            alert_destination: "arn:aws:sns:eu-west-1:000000000000:SensorTopic".to_string(),
            period: Duration::from_secs(1),
            call_timeout: Duration::from_secs(5),
        }
    }

    fn control(
        probe: ScriptedProbe,
        sink: RecordingSink,
        notifier: RecordingNotifier,
    ) -> ControlLoop<ScriptedProbe, RecordingSink, RecordingNotifier> {
        ControlLoop::new(
            probe,
            sink,
            notifier,
            SmoothingWindow::default(),
            AlertGate::new(35.0),
            settings(),
        )
    }

    async fn tick_n<P, S, N>(control: &mut ControlLoop<P, S, N>, n: usize) -> Vec<TickOutcome>
    where
        P: TemperatureProbe,
        S: TimeSeriesSink,
        N: NotificationSink,
    {
        let mut outcomes = Vec::with_capacity(n);
        for _ in 0..n {
            outcomes.push(control.tick().await);
        }
        outcomes
    }

    #[tokio::test]
    async fn writes_raw_values_and_alerts_on_each_upward_crossing() {
        let mut control = control(
            ScriptedProbe::values(&[20.0, 36.0, 34.0, 36.0]),
            RecordingSink::new(),
            RecordingNotifier::new(),
        );
        let outcomes = tick_n(&mut control, 4).await;

        let written: Vec<String> = control
            .sink()
            .writes()
            .into_iter()
            .map(|record| record.measure_value)
            .collect();
        assert_eq!(written, vec!["20", "36", "34", "36"]);

        let transitions: Vec<Transition> = outcomes
            .iter()
            .map(|outcome| match outcome {
                TickOutcome::Recorded { transition, .. } => *transition,
                other => panic!("unexpected outcome {other:?}"),
            })
            .collect();
        assert_eq!(
            transitions,
            vec![
                Transition::Idle,
                Transition::Triggered,
                Transition::Reset,
                Transition::Triggered
            ]
        );

        let sent = control.notifier().sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, settings().alert_destination);
        assert!(sent[0].1.ends_with("Temperatur erreicht: 36.00°C"));
    }

    #[tokio::test]
    async fn sentinels_reach_neither_sink_nor_gate() {
        let mut control = control(
            ScriptedProbe::values(&[85.0, 0.0, 85.0, 0.0]),
            RecordingSink::new(),
            RecordingNotifier::new(),
        );
        let outcomes = tick_n(&mut control, 4).await;

        assert!(outcomes
            .iter()
            .all(|outcome| matches!(outcome, TickOutcome::NotReady(_))));
        assert!(control.sink().writes().is_empty());
        assert!(control.notifier().sent().is_empty());
        assert!(control.window().is_empty());
        assert_eq!(control.gate().state(), crate::alert::AlertState::Inactive);
    }

    #[tokio::test]
    async fn sentinel_does_not_reset_an_active_alert() {
        let mut control = control(
            ScriptedProbe::values(&[40.0, 0.0, 41.0]),
            RecordingSink::new(),
            RecordingNotifier::new(),
        );
        tick_n(&mut control, 3).await;
        assert_eq!(control.notifier().sent().len(), 1);
    }

    #[tokio::test]
    async fn skips_missing_sensor_and_failed_reads() {
        let mut control = control(
            ScriptedProbe::new([
                ProbeStep::NoSensor,
                ProbeStep::ReadError,
                ProbeStep::Value(21.5),
            ]),
            RecordingSink::new(),
            RecordingNotifier::new(),
        );
        let outcomes = tick_n(&mut control, 4).await;

        assert_eq!(outcomes[0], TickOutcome::NoSensor);
        assert_eq!(outcomes[1], TickOutcome::ReadFailed);
        assert!(matches!(
            outcomes[2],
            TickOutcome::Recorded {
                written: true,
                notified: false,
                ..
            }
        ));
        assert_eq!(outcomes[3], TickOutcome::NoSensor);

        let writes = control.sink().writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].dimensions[0].value, TEST_SENSOR);
    }

    #[tokio::test]
    async fn write_failure_still_evaluates_alert() {
        let sink = RecordingSink {
            fail_writes: true,
            ..RecordingSink::default()
        };
        let mut control = control(ScriptedProbe::values(&[38.0, 39.0]), sink, RecordingNotifier::new());
        let outcomes = tick_n(&mut control, 2).await;

        assert!(matches!(
            outcomes[0],
            TickOutcome::Recorded {
                written: false,
                notified: true,
                ..
            }
        ));
        assert_eq!(control.sink().writes().len(), 2);
        assert_eq!(control.notifier().sent().len(), 1);
    }

    #[tokio::test]
    async fn notification_failure_keeps_gate_active() {
        let mut control = control(
            ScriptedProbe::values(&[40.0, 40.0]),
            RecordingSink::new(),
            RecordingNotifier::failing(),
        );
        let outcomes = tick_n(&mut control, 2).await;

        assert!(matches!(
            outcomes[0],
            TickOutcome::Recorded {
                transition: Transition::Triggered,
                notified: false,
                ..
            }
        ));
        assert!(matches!(
            outcomes[1],
            TickOutcome::Recorded {
                transition: Transition::Suppressed,
                ..
            }
        ));
        assert_eq!(control.notifier().sent().len(), 1);
    }

    #[tokio::test]
    async fn smoothed_average_tracks_window() {
        let mut control = control(
            ScriptedProbe::values(&[20.0, 22.0, 85.0, 24.0]),
            RecordingSink::new(),
            RecordingNotifier::new(),
        );
        let outcomes = tick_n(&mut control, 4).await;
        match &outcomes[3] {
            TickOutcome::Recorded { smoothed, .. } => {
                assert!((smoothed.unwrap() - 22.0).abs() < 1e-9)
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hung_calls_time_out_as_transient_errors() {
        let mut control = control(
            ScriptedProbe::new([ProbeStep::Hang, ProbeStep::Value(30.0)]),
            RecordingSink {
                hang_writes: true,
                ..RecordingSink::default()
            },
            RecordingNotifier::new(),
        );
        assert_eq!(control.tick().await, TickOutcome::ReadFailed);
        assert!(matches!(
            control.tick().await,
            TickOutcome::Recorded { written: false, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_notification_times_out_and_gate_stays_active() {
        let mut control = control(
            ScriptedProbe::values(&[40.0, 41.0]),
            RecordingSink::new(),
            RecordingNotifier::hanging(),
        );
        let outcomes = tick_n(&mut control, 2).await;

        assert!(matches!(
            outcomes[0],
            TickOutcome::Recorded {
                written: true,
                transition: Transition::Triggered,
                notified: false,
                ..
            }
        ));
        assert!(matches!(
            outcomes[1],
            TickOutcome::Recorded {
                transition: Transition::Suppressed,
                ..
            }
        ));
        assert_eq!(control.gate().state(), crate::alert::AlertState::Active);
        assert_eq!(control.notifier().sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_after_max_iterations() {
        let mut control = control(
            ScriptedProbe::values(&[20.0, 21.0, 22.0, 23.0]),
            RecordingSink::new(),
            RecordingNotifier::new(),
        );
        let iterations = control.run(CancellationToken::new(), Some(3)).await;
        assert_eq!(iterations, 3);
        assert_eq!(control.sink().writes().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn run_honours_cancellation_within_a_period() {
        let mut control = control(
            ScriptedProbe::values(&[20.0; 100]),
            RecordingSink::new(),
            RecordingNotifier::new(),
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            trigger.cancel();
        });
        let iterations = control.run(cancel, None).await;
        assert_eq!(iterations, 3);
    }

    #[tokio::test]
    async fn ensure_storage_creates_then_is_idempotent() {
        let sink = RecordingSink::new();
        let retention = RetentionConfig::default();
        let timeout = Duration::from_secs(1);

        ensure_storage(&sink, "db_sensor", "temp_evolution", &retention, timeout)
            .await
            .unwrap();
        assert!(sink.has_table("db_sensor", "temp_evolution"));
        assert_eq!(sink.create_calls(), 2);

        ensure_storage(&sink, "db_sensor", "temp_evolution", &retention, timeout)
            .await
            .unwrap();
        assert_eq!(sink.create_calls(), 2);
    }

    #[tokio::test]
    async fn ensure_storage_treats_conflicts_as_success() {
        let sink = RecordingSink {
            lose_create_race: true,
            ..RecordingSink::default()
        };
        let retention = RetentionConfig::default();
        for _ in 0..2 {
            ensure_storage(&sink, "db_sensor", "temp_evolution", &retention, Duration::from_secs(1))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn ensure_storage_fails_on_real_create_errors() {
        let sink = RecordingSink {
            fail_creates: true,
            ..RecordingSink::default()
        };
        let err = ensure_storage(
            &sink,
            "db_sensor",
            "temp_evolution",
            &RetentionConfig::default(),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StartupError::Namespace { .. }));
    }

    #[tokio::test]
    async fn ensure_storage_fails_when_table_creation_fails() {
        let sink = RecordingSink {
            fail_table_creates: true,
            ..RecordingSink::default()
        };
        let err = ensure_storage(
            &sink,
            "db_sensor",
            "temp_evolution",
            &RetentionConfig::default(),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, StartupError::Table { .. }));
        assert!(err
            .to_string()
            .starts_with("failed to create table db_sensor.temp_evolution"));
        assert!(!sink.has_table("db_sensor", "temp_evolution"));
        assert_eq!(sink.create_calls(), 2);
    }

    #[tokio::test]
    async fn describe_errors_fall_through_to_create() {
        let sink = RecordingSink {
            fail_describes: true,
            ..RecordingSink::default()
        };
        ensure_storage(
            &sink,
            "db_sensor",
            "temp_evolution",
            &RetentionConfig::default(),
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert!(sink.has_table("db_sensor", "temp_evolution"));
    }
}

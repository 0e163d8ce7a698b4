//! Collaborator seams: the time-series store and the notification channel.

use crate::record::{RetentionConfig, TimeSeriesRecord};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Exists,
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Creation {
    Created,
    AlreadyExists,
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
    #[error("{operation} rejected: {message}")]
    Validation {
        operation: &'static str,
        message: String,
    },
    #[error("{operation} failed: {message}")]
    Service {
        operation: &'static str,
        message: String,
    },
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

impl SinkError {
    pub fn service(operation: &'static str, err: impl std::fmt::Display) -> Self {
        SinkError::Service {
            operation,
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification timed out after {0:?}")]
    Timeout(Duration),
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Write side of the time-series store.
#[async_trait]
pub trait TimeSeriesSink: Send + Sync {
    async fn describe_namespace(&self, name: &str) -> Result<Presence, SinkError>;

    async fn create_namespace(&self, name: &str) -> Result<Creation, SinkError>;

    async fn describe_table(&self, namespace: &str, table: &str) -> Result<Presence, SinkError>;

    async fn create_table(
        &self,
        namespace: &str,
        table: &str,
        retention: &RetentionConfig,
    ) -> Result<Creation, SinkError>;

    async fn write_record(
        &self,
        namespace: &str,
        table: &str,
        record: &TimeSeriesRecord,
    ) -> Result<(), SinkError>;
}

/// Drained result of a query: its id plus every row, columns as text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOutcome {
    pub query_id: Option<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

/// Read side of the time-series store; only the export job uses it.
#[async_trait]
pub trait TimeSeriesQuery: Send + Sync {
    async fn query(&self, statement: &str) -> Result<QueryOutcome, SinkError>;
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Returns the provider's message id.
    async fn send(&self, destination: &str, message: &str) -> Result<String, NotifyError>;
}

/// Runs `fut` under `timeout`, mapping expiry to [`SinkError::Timeout`].
pub async fn bounded<T, F>(operation: &'static str, timeout: Duration, fut: F) -> Result<T, SinkError>
where
    F: Future<Output = Result<T, SinkError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(SinkError::Timeout { operation, timeout }),
    }
}

//! Daily UNLOAD of the recent window to S3 as CSV.
//!
//! Unlike the control loop, every failure here propagates: the job runs once,
//! unattended, and the scheduler is the only thing that can react.

use crate::sink::{bounded, QueryOutcome, SinkError, TimeSeriesQuery};
use chrono::NaiveDate;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("unload query rejected")]
    Validation(#[source] SinkError),
    #[error("unload query did not finish in time")]
    Timeout(#[source] SinkError),
    #[error("unload query failed")]
    Query(#[source] SinkError),
}

impl From<SinkError> for ExportError {
    fn from(err: SinkError) -> Self {
        match err {
            SinkError::Validation { .. } => ExportError::Validation(err),
            SinkError::Timeout { .. } => ExportError::Timeout(err),
            other => ExportError::Query(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UnloadJob {
    pub database: String,
    pub table: String,
    pub bucket: String,
    /// Prepended to the date folder, e.g. `reports/`.
    pub prefix: String,
    pub lookback_hours: u32,
}

impl UnloadJob {
    pub fn select_statement(&self) -> String {
        format!(
            "SELECT * FROM \"{}\".\"{}\" WHERE time >= ago({}h) ORDER BY time DESC",
            self.database, self.table, self.lookback_hours
        )
    }

    pub fn destination(&self, date: NaiveDate) -> String {
        format!(
            "s3://{}/{}{}/",
            self.bucket.trim_end_matches('/'),
            self.prefix,
            date.format("%Y-%m-%d")
        )
    }

    pub fn unload_statement(&self, date: NaiveDate) -> String {
        format!(
            "UNLOAD ({}) TO '{}' WITH (format = 'CSV', compression = 'NONE')",
            self.select_statement(),
            self.destination(date)
        )
    }
}

pub async fn run_unload<Q: TimeSeriesQuery + ?Sized>(
    query: &Q,
    job: &UnloadJob,
    date: NaiveDate,
    timeout: Duration,
) -> Result<QueryOutcome, ExportError> {
    let statement = job.unload_statement(date);
    tracing::info!(
        database = %job.database,
        table = %job.table,
        destination = %job.destination(date),
        "starting unload"
    );
    tracing::debug!(%statement, "unload statement");

    match bounded("unload", timeout, query.query(&statement)).await {
        Ok(outcome) => {
            tracing::info!(
                query_id = outcome.query_id.as_deref().unwrap_or("-"),
                rows = outcome.rows.len(),
                "unload finished"
            );
            Ok(outcome)
        }
        Err(err) => {
            tracing::error!(error = %err, "unload failed");
            Err(err.into())
        }
    }
}

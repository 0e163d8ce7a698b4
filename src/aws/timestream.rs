use crate::record::{MeasureValueType, RetentionConfig, TimeSeriesRecord};
use crate::sink::{Creation, Presence, QueryOutcome, SinkError, TimeSeriesQuery, TimeSeriesSink};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use aws_sdk_timestreamquery::error::DisplayErrorContext as QueryErrorContext;
use aws_sdk_timestreamquery::Client as QueryClient;
use aws_sdk_timestreamwrite::error::DisplayErrorContext;
use aws_sdk_timestreamwrite::types::{
    Dimension as SdkDimension, MeasureValueType as SdkMeasureValueType, Record,
    RetentionProperties, TimeUnit,
};
use aws_sdk_timestreamwrite::Client as WriteClient;
use aws_types::SdkConfig;

/// Timestream clients must resolve their cell endpoint before the first call;
/// the SDK hands back a reload task that keeps it fresh.
#[derive(Clone, Debug)]
pub struct TimestreamWriter {
    client: WriteClient,
}

impl TimestreamWriter {
    pub async fn connect(config: &SdkConfig) -> Result<Self> {
        let (client, reload) = WriteClient::new(config)
            .with_endpoint_discovery_enabled()
            .await
            .map_err(|err| anyhow!("timestream-write endpoint discovery failed: {err}"))?;
        tokio::spawn(reload.reload_task());
        Ok(Self { client })
    }
}

#[async_trait]
impl TimeSeriesSink for TimestreamWriter {
    async fn describe_namespace(&self, name: &str) -> Result<Presence, SinkError> {
        match self.client.describe_database().database_name(name).send().await {
            Ok(_) => Ok(Presence::Exists),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_not_found_exception()) =>
            {
                Ok(Presence::NotFound)
            }
            Err(err) => Err(SinkError::service(
                "describe_database",
                DisplayErrorContext(&err),
            )),
        }
    }

    async fn create_namespace(&self, name: &str) -> Result<Creation, SinkError> {
        match self.client.create_database().database_name(name).send().await {
            Ok(_) => Ok(Creation::Created),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_conflict_exception()) => {
                Ok(Creation::AlreadyExists)
            }
            Err(err) => Err(SinkError::service(
                "create_database",
                DisplayErrorContext(&err),
            )),
        }
    }

    async fn describe_table(&self, namespace: &str, table: &str) -> Result<Presence, SinkError> {
        match self
            .client
            .describe_table()
            .database_name(namespace)
            .table_name(table)
            .send()
            .await
        {
            Ok(_) => Ok(Presence::Exists),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_not_found_exception()) =>
            {
                Ok(Presence::NotFound)
            }
            Err(err) => Err(SinkError::service("describe_table", DisplayErrorContext(&err))),
        }
    }

    async fn create_table(
        &self,
        namespace: &str,
        table: &str,
        retention: &RetentionConfig,
    ) -> Result<Creation, SinkError> {
        let retention = to_sdk_retention(retention)?;
        match self
            .client
            .create_table()
            .database_name(namespace)
            .table_name(table)
            .retention_properties(retention)
            .send()
            .await
        {
            Ok(_) => Ok(Creation::Created),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_conflict_exception()) => {
                Ok(Creation::AlreadyExists)
            }
            Err(err) => Err(SinkError::service("create_table", DisplayErrorContext(&err))),
        }
    }

    async fn write_record(
        &self,
        namespace: &str,
        table: &str,
        record: &TimeSeriesRecord,
    ) -> Result<(), SinkError> {
        let record = to_sdk_record(record)?;
        self.client
            .write_records()
            .database_name(namespace)
            .table_name(table)
            .records(record)
            .send()
            .await
            .map_err(|err| SinkError::service("write_records", DisplayErrorContext(&err)))?;
        Ok(())
    }
}

fn to_sdk_retention(retention: &RetentionConfig) -> Result<RetentionProperties, SinkError> {
    RetentionProperties::builder()
        .memory_store_retention_period_in_hours(retention.memory_store_hours)
        .magnetic_store_retention_period_in_days(retention.magnetic_store_days)
        .build()
        .map_err(|err| SinkError::InvalidRecord(err.to_string()))
}

fn to_sdk_measure_type(kind: MeasureValueType) -> SdkMeasureValueType {
    match kind {
        MeasureValueType::Double => SdkMeasureValueType::Double,
        MeasureValueType::Bigint => SdkMeasureValueType::Bigint,
        MeasureValueType::Varchar => SdkMeasureValueType::Varchar,
        MeasureValueType::Boolean => SdkMeasureValueType::Boolean,
    }
}

pub(crate) fn to_sdk_record(record: &TimeSeriesRecord) -> Result<Record, SinkError> {
    let mut builder = Record::builder()
        .measure_name(&record.measure_name)
        .measure_value(&record.measure_value)
        .measure_value_type(to_sdk_measure_type(record.measure_value_type))
        .time(record.timestamp_millis.to_string())
        .time_unit(TimeUnit::Milliseconds);
    for dimension in &record.dimensions {
        let dimension = SdkDimension::builder()
            .name(&dimension.name)
            .value(&dimension.value)
            .build()
            .map_err(|err| SinkError::InvalidRecord(err.to_string()))?;
        builder = builder.dimensions(dimension);
    }
    Ok(builder.build())
}

#[derive(Clone, Debug)]
pub struct TimestreamQuery {
    client: QueryClient,
}

impl TimestreamQuery {
    pub async fn connect(config: &SdkConfig) -> Result<Self> {
        let (client, reload) = QueryClient::new(config)
            .with_endpoint_discovery_enabled()
            .await
            .map_err(|err| anyhow!("timestream-query endpoint discovery failed: {err}"))?;
        tokio::spawn(reload.reload_task());
        Ok(Self { client })
    }
}

#[async_trait]
impl TimeSeriesQuery for TimestreamQuery {
    async fn query(&self, statement: &str) -> Result<QueryOutcome, SinkError> {
        let mut outcome = QueryOutcome::default();
        let mut next_token: Option<String> = None;
        loop {
            let page = match self
                .client
                .query()
                .query_string(statement)
                .set_next_token(next_token.take())
                .send()
                .await
            {
                Ok(page) => page,
                Err(err) if err.as_service_error().is_some_and(|e| e.is_validation_exception()) => {
                    return Err(SinkError::Validation {
                        operation: "query",
                        message: QueryErrorContext(&err).to_string(),
                    })
                }
                Err(err) => return Err(SinkError::service("query", QueryErrorContext(&err))),
            };

            if outcome.query_id.is_none() {
                outcome.query_id = Some(page.query_id().to_string());
            }
            outcome.rows.extend(page.rows().iter().map(|row| {
                row.data()
                    .iter()
                    .map(|datum| datum.scalar_value().map(str::to_string))
                    .collect()
            }));

            match page.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }
        Ok(outcome)
    }
}

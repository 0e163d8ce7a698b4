use crate::config::Config;
use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

const DEFAULT_FILTER: &str = "info,temp_sentinel=info";

/// Console output always; a plain-text log file and OTLP export when configured.
///
/// The returned guard flushes the file writer on drop, so `main` must hold it.
pub fn init_tracing(config: &Config, service_name: &'static str) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let mut layers: Vec<BoxedLayer> = vec![tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .boxed()];

    let guard = match &config.log_file {
        Some(path) => {
            let (layer, guard) = file_layer(path)?;
            layers.push(layer);
            Some(guard)
        }
        None => None,
    };
    if let Some(endpoint) = &config.otlp_endpoint {
        layers.push(otlp_layer(endpoint, service_name)?);
    }

    tracing_subscriber::registry()
        .with(layers.with_filter(filter))
        .try_init()?;
    Ok(guard)
}

fn file_layer(path: &Path) -> Result<(BoxedLayer, WorkerGuard)> {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .with_context(|| format!("SENTINEL_LOG_FILE has no file name: {}", path.display()))?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
    let layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(writer)
        .boxed();
    Ok((layer, guard))
}

fn otlp_layer(endpoint: &str, service_name: &'static str) -> Result<BoxedLayer> {
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::{runtime::Tokio, trace::Config as TraceConfig, Resource};

    let resource = Resource::new(vec![KeyValue::new("service.name", service_name)]);
    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .http()
                .with_endpoint(traces_endpoint(endpoint)),
        )
        .with_trace_config(TraceConfig::default().with_resource(resource))
        .install_batch(Tokio)
        .context("failed to install OTLP trace pipeline")?;
    Ok(tracing_opentelemetry::layer().with_tracer(tracer).boxed())
}

/// The HTTP exporter wants the full signal path; collectors are usually
/// configured by base URL.
fn traces_endpoint(endpoint: &str) -> String {
    let base = endpoint.trim();
    if base.is_empty() || base.ends_with("/v1/traces") {
        return base.to_string();
    }
    format!("{}/v1/traces", base.trim_end_matches('/'))
}

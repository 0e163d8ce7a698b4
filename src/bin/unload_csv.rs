use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use temp_sentinel::aws::{self, TimestreamQuery};
use temp_sentinel::cli::UnloadArgs;
use temp_sentinel::config::Config;
use temp_sentinel::export::run_unload;
use temp_sentinel::observability::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let args = UnloadArgs::parse();
    let config = Config::from_env()?;
    let _log_guard = init_tracing(&config, "unload-csv")?;
    config.log_warnings();

    let job = config.unload_job();
    let date = args.date.unwrap_or_else(|| Utc::now().date_naive());

    if args.dry_run {
        tracing::info!(statement = %job.unload_statement(date), "dry run; not issuing unload");
        return Ok(());
    }

    let sdk_config = aws::load_sdk_config(&config.aws_region).await;
    let query = TimestreamQuery::connect(&sdk_config).await?;
    run_unload(&query, &job, date, config.export_timeout())
        .await
        .with_context(|| format!("unload to {} failed", job.destination(date)))?;
    Ok(())
}

use anyhow::{Context, Result};
use clap::Parser;
use temp_sentinel::alert::AlertGate;
use temp_sentinel::aws::{self, SnsNotifier, TimestreamWriter};
use temp_sentinel::cli::SentinelArgs;
use temp_sentinel::config::Config;
use temp_sentinel::control::ControlLoop;
use temp_sentinel::observability::init_tracing;
use temp_sentinel::sensor::W1Bus;
use temp_sentinel::window::SmoothingWindow;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    let args = SentinelArgs::parse();
    let config = Config::from_env()?;
    let _log_guard = init_tracing(&config, "temp-sentinel")?;
    config.log_warnings();

    let settings = config.loop_settings()?;
    let sdk_config = aws::load_sdk_config(&config.aws_region).await;
    let sink = TimestreamWriter::connect(&sdk_config).await?;
    let notifier = SnsNotifier::new(&sdk_config);
    let probe = W1Bus::new(config.w1_devices_dir.clone(), config.sensor_prefix.clone());

    let mut control = ControlLoop::new(
        probe,
        sink,
        notifier,
        SmoothingWindow::new(config.window_size),
        AlertGate::with_template(config.alert_threshold, config.alert_template.clone()),
        settings,
    );

    if args.skip_setup {
        tracing::info!("skipping database/table setup");
    } else {
        control
            .ensure_storage()
            .await
            .context("time-series storage setup failed")?;
    }

    tracing::info!(
        region = %config.aws_region,
        database = %config.database,
        table = %config.table,
        threshold = config.alert_threshold,
        devices_dir = %config.w1_devices_dir.display(),
        "temp-sentinel started"
    );

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("shutdown signal received");
        signal_cancel.cancel();
    });

    control.run(cancel, args.iterations).await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "failed to listen for ctrl-c");
            futures::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to listen for SIGTERM");
                futures::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = futures::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

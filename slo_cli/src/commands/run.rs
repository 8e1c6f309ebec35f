use crate::{web, RunArgs};
use anyhow::{Context, Result};
use futures::future::join_all;
use slo_core::Evaluator;
use slo_engine::{load_config_from_file, spawn_workers};
use slo_metrics::PrometheusSink;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub async fn execute(args: RunArgs) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "Starting SLO exporter");

    let file_config = load_config_from_file(&args.config).await?;
    debug!("Loaded config:\n{}", serde_yaml::to_string(&file_config)?);

    let grace = file_config
        .gracefulshutdownperiod
        .unwrap_or(args.graceful_shutdown_period);
    let engine = file_config
        .into_engine_config(args.interval_seconds)
        .context("invalid configuration")?;

    let backend = args.backend.build()?;
    info!(url = %args.backend.prometheus_url, "Using Prometheus backend");

    let sink = PrometheusSink::new()?.with_process_metrics()?;
    let cancel = CancellationToken::new();

    let mut server = tokio::spawn(web::serve(
        args.web_listen_address.clone(),
        sink.clone(),
        cancel.clone(),
    ));

    let workers = spawn_workers(
        &engine,
        Evaluator::new(Arc::new(backend)),
        Arc::new(sink),
        cancel.clone(),
    );
    info!(budgets = workers.len(), "Workers started");

    tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
        result = &mut server => {
            // the server only returns early on failure
            cancel.cancel();
            let err = match result {
                Ok(Err(e)) => e,
                Ok(Ok(())) => anyhow::anyhow!("web server exited unexpectedly"),
                Err(e) => anyhow::Error::new(e).context("web server task panicked"),
            };
            error!(error = %err, "Web server stopped");
            return Err(err);
        }
    }

    cancel.cancel();
    drain(workers, server, grace).await;

    info!("Shut down");
    Ok(())
}

/// Waits for workers, then the server, under one shared grace period.
async fn drain(workers: Vec<JoinHandle<()>>, server: JoinHandle<Result<()>>, grace: Duration) {
    let deadline = Instant::now() + grace;

    if timeout_at(deadline, join_all(workers)).await.is_err() {
        warn!(grace = ?grace, "Workers still busy after grace period, exiting anyway");
    }

    match timeout_at(deadline, server).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => warn!(error = %e, "Web server shut down with error"),
        Ok(Err(e)) => warn!(error = %e, "Web server task failed"),
        Err(_) => warn!("Web server did not stop within grace period"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_drain_shares_one_grace_period() {
        let grace = Duration::from_millis(200);
        let workers = vec![tokio::spawn(std::future::pending::<()>())];
        let server = tokio::spawn(std::future::pending::<Result<()>>());

        let started = Instant::now();
        drain(workers, server, grace).await;
        let elapsed = started.elapsed();

        assert!(elapsed >= grace);
        assert!(elapsed < grace * 2, "shutdown took {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_drain_returns_once_everything_stops() {
        let workers = vec![tokio::spawn(async {})];
        let server = tokio::spawn(async { Ok(()) });

        let started = Instant::now();
        drain(workers, server, Duration::from_secs(5)).await;

        assert!(started.elapsed() < Duration::from_secs(1));
    }
}

//! Allocator Metrics Service
//!
//! Runs the allocator actor against an in-process metrics catalog.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize tracing
//! 3. Initialize the Prometheus recorder for self-observability metrics
//! 4. Spawn the allocator actor (registers the fixed allocator metrics)
//! 5. Run an allocation cycle and log a catalog snapshot every interval
//! 6. On Ctrl+C or SIGTERM, shut the actor down and verify that every metric
//!    was unregistered

#![warn(clippy::pedantic)]

use allocator_metrics::actors::AllocatorActorHandle;
use allocator_metrics::catalog::InMemoryCatalog;
use allocator_metrics::config::Config;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "allocator=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    if config.json_logs {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }

    info!("Starting Allocator Metrics Service");
    info!(
        allocator_id = %config.allocator_id,
        resource_kinds = ?config.resource_kinds,
        read_timeout_ms = config.read_timeout.as_millis(),
        stats_window_seconds = config.stats_window.as_secs(),
        violation_policy = config.violation_policy.as_str(),
        mailbox_capacity = config.mailbox_capacity,
        "Configuration loaded successfully"
    );

    // Must happen before any metrics are recorded
    let prometheus_handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        format!("Failed to install Prometheus metrics recorder: {e}")
    })?;

    let catalog = InMemoryCatalog::new();
    let (allocator, allocator_task) =
        AllocatorActorHandle::spawn(config.allocator_options(), catalog.clone()).map_err(|e| {
            error!(error = %e, "Failed to start allocator");
            e
        })?;
    info!(entries = catalog.len(), "Allocator started");

    let mut ticker = tokio::time::interval(config.snapshot_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    info!("Allocator Metrics Service running - press Ctrl+C to shutdown");
    loop {
        tokio::select! {
            () = &mut shutdown => break,
            _ = ticker.tick() => {
                if let Err(e) = allocator.run_allocation().await {
                    warn!(error = %e, "Allocation run failed");
                }

                let snapshot = catalog.snapshot().await;
                match snapshot.to_json() {
                    Ok(json) => info!(
                        entries = snapshot.values.len(),
                        unavailable = snapshot.unavailable.len(),
                        snapshot = %json,
                        "Metrics snapshot"
                    ),
                    Err(e) => warn!(error = %e, "Failed to render metrics snapshot"),
                }

                prometheus_handle.run_upkeep();
                debug!(self_metrics = %prometheus_handle.render(), "Self-observability metrics");
            }
        }
    }

    info!("Shutdown signal received, initiating graceful shutdown...");
    if let Err(e) = allocator.shutdown().await {
        warn!(error = %e, "Allocator shutdown error");
    }
    if let Err(e) = allocator_task.await {
        error!(error = %e, "Allocator task failed");
    }

    if !catalog.is_empty() {
        error!(
            residual = ?catalog.names(),
            "Metrics still registered after allocator shutdown"
        );
        return Err("metrics catalog not empty after shutdown".into());
    }

    info!("Allocator Metrics Service shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

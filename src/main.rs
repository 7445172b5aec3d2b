//! `endpoint-monitor` daemon.
//!
//! Loads the config, registers the configured endpoints, optionally serves
//! the admin API and Prometheus metrics, and reloads the endpoint list when
//! the config file changes.

use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use clap::Parser;
use tokio::net::TcpListener;

use endpoint_monitor::admin::{self, AdminState};
use endpoint_monitor::config::{load_config, watcher::ConfigWatcher, MonitorConfig};
use endpoint_monitor::lifecycle::{signals, startup};
use endpoint_monitor::observability::{logging, metrics};
use endpoint_monitor::Shutdown;

#[derive(Parser)]
#[command(name = "endpoint-monitor")]
#[command(about = "Health monitor for inference endpoints", long_about = None)]
struct Args {
    /// Path to the TOML config file; defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => MonitorConfig::default(),
    };

    logging::init_logging(&config.observability.log_level);
    tracing::info!("endpoint-monitor v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let monitor = startup::build_monitor(&config)?;
    let _change_logger = startup::attach_change_logger(&monitor);
    startup::register_endpoints(&monitor, &config.endpoints);

    tracing::info!(
        endpoints = config.endpoints.len(),
        probe_interval_ms = config.monitor.probe_interval_ms,
        failure_threshold = config.monitor.failure_threshold,
        "Monitor running"
    );

    let shutdown = Shutdown::new();
    let shared_config = Arc::new(ArcSwap::from_pointee(config.clone()));

    let admin_task = if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        let state = AdminState {
            monitor: monitor.clone(),
            config: shared_config.clone(),
        };
        Some(tokio::spawn(admin::serve_admin(listener, state, shutdown.subscribe())))
    } else {
        None
    };

    // Dropping the watcher stops reloads, so it lives until shutdown.
    let _watcher = match &args.config {
        Some(path) => {
            let (watcher, mut updates) = ConfigWatcher::new(path);
            let watcher = watcher.run()?;

            let monitor = monitor.clone();
            let shared_config = shared_config.clone();
            let mut stop = shutdown.subscribe();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        update = updates.recv() => {
                            let Some(new_config) = update else { break };
                            let old_config = shared_config.load_full();
                            startup::reconcile_endpoints(&monitor, &old_config, &new_config);
                            shared_config.store(Arc::new(new_config));
                        }
                        _ = stop.recv() => break,
                    }
                }
            });
            Some(watcher)
        }
        None => None,
    };

    signals::wait_for_signal().await;
    tracing::info!("Shutting down");

    shutdown.trigger();
    if let Some(task) = admin_task {
        match task.await {
            Ok(Err(e)) => tracing::error!(error = %e, "Admin API failed"),
            Err(e) => tracing::error!(error = %e, "Admin API task panicked"),
            Ok(Ok(())) => {}
        }
    }

    monitor.cleanup();
    tracing::info!("Shutdown complete");
    Ok(())
}

//! Process assembly for `jobgridd serve`.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};

use jobgrid_bridge::SchedulerBridge;
use jobgrid_core::{DaemonConfig, JobEvent};
use jobgrid_scheduler::{
    BroadcastNotifier, CompositeNotifier, JobLifecycleManager, ManagerConfig, TracingNotifier,
};
use jobgrid_telemetry::ResourceTelemetry;

/// How long shutdown waits for in-flight local jobs before exiting anyway.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(10);

pub async fn run_serve(config: DaemonConfig, event_log: Option<PathBuf>) -> anyhow::Result<()> {
    info!(
        port = config.server.port,
        scheduler = %config.scheduler.kind,
        "jobgrid daemon starting"
    );

    // ── Initialize subsystems ──────────────────────────────────

    let telemetry = ResourceTelemetry::new();
    let telemetry_handle = telemetry.handle();

    let bridge = if config.scheduler.kind.is_external() {
        let bridge = SchedulerBridge::new(config.scheduler.kind)?;
        info!(kind = %config.scheduler.kind, "scheduler bridge initialized");
        Some(bridge)
    } else {
        None
    };

    let events = Arc::new(BroadcastNotifier::default());
    let notifier = CompositeNotifier::new()
        .with(Arc::new(TracingNotifier))
        .with(events.clone());

    let mut builder = JobLifecycleManager::builder(telemetry_handle)
        .limits(config.limits.clone())
        .config(ManagerConfig::from_daemon(&config))
        .notifier(Arc::new(notifier));
    if let Some(bridge) = bridge {
        builder = builder.bridge(bridge);
    }
    let manager = builder.build();
    info!(limits = ?config.limits, "job manager initialized");

    // ── Start background tasks ─────────────────────────────────

    let telemetry_interval = Duration::from_secs(config.intervals.telemetry_secs);
    let telemetry_task = tokio::spawn(telemetry.run(telemetry_interval, manager.shutdown_signal()));

    manager.ensure_dispatch();
    manager.ensure_monitor();

    let event_task = event_log.map(|path| {
        let rx = events.subscribe();
        let shutdown = manager.shutdown_signal();
        tokio::spawn(async move {
            if let Err(e) = write_events(&path, rx, shutdown).await {
                error!(path = %path.display(), error = %e, "event log writer stopped");
            }
        })
    });

    // ── Start API server ───────────────────────────────────────

    let router = jobgrid_api::build_router(manager.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!(%addr, "API server listening");

    let shutdown_manager = manager.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for ctrl-c");
            }
            info!("shutdown signal received");
            shutdown_manager.shutdown();
        })
        .await?;

    if !manager.wait_until_idle(SHUTDOWN_DRAIN).await {
        warn!("jobs still active at shutdown");
    }
    let _ = telemetry_task.await;
    if let Some(task) = event_task {
        let _ = task.await;
    }

    info!("jobgrid daemon stopped");
    Ok(())
}

/// Append events as JSON lines until shutdown or the channel closes.
async fn write_events(
    path: &Path,
    mut rx: broadcast::Receiver<JobEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("open event log {}", path.display()))?;

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Ok(event) => {
                    let mut line = serde_json::to_vec(&event)?;
                    line.push(b'\n');
                    file.write_all(&line).await?;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event log fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = shutdown.changed() => break,
        }
    }
    file.flush().await?;
    Ok(())
}

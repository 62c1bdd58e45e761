//! Manyfold Intake - watched-folder intake service
//!
//! # Execution Flow
//!
//! 1. Load runtime settings (defaults → `manyfold.yaml` → `MANYFOLD_*` env)
//! 2. Initialize logging → `<log_dir>/manyfold-intake.<date>`
//! 3. Create the tokio runtime
//! 4. Prepare Input/Staging, load `config.yaml` (processing always starts disabled)
//! 5. Spawn the coordinator actor, then the debounced watcher (startup scan first)
//! 6. Run until Ctrl-C, stop the watcher, drain the coordinator
//! 7. Log the metrics summary and shut the runtime down with a 5s timeout

use anyhow::{Context, Result};
use manyfold_intake::config::{ConfigManager, load_settings};
use manyfold_intake::logging::{LOG_PREFIX, setup_logging_with_console};
use manyfold_intake::{
    APP_NAME, Collaborators, DebouncedWatcher, Dispatcher, IntakeCoordinator, Metrics, QueueDirs,
    Settings, VERSION, WatcherConfig,
};
use std::sync::Arc;
use std::time::Duration;

/// Interval for the one-line metrics log
const METRICS_LOG_INTERVAL: Duration = Duration::from_secs(600);

fn main() -> Result<()> {
    let settings = load_settings()?;

    let _log_guard =
        setup_logging_with_console(&settings.log_dir, LOG_PREFIX, settings.debug_mode, true)?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("manyfold-worker")
        .build()
        .context("Failed to create tokio runtime")?;

    let metrics = Arc::new(Metrics::new());
    let result = runtime.block_on(run(settings, metrics.clone()));

    metrics.log_summary();
    runtime.shutdown_timeout(Duration::from_secs(5));
    tracing::info!("Shutdown complete");

    result
}

async fn run(settings: Settings, metrics: Arc<Metrics>) -> Result<()> {
    let dirs = QueueDirs::prepare(&settings.input_dir, &settings.staging_dir)
        .context("Failed to prepare queue directories")?;
    std::fs::create_dir_all(&settings.output_dir)
        .with_context(|| format!("Failed to create output directory: {}", settings.output_dir))?;

    let config_manager = ConfigManager::new(&settings.config_dir)?;
    let dispatcher = Dispatcher::new(
        settings.output_dir.clone(),
        dirs.staging.clone(),
        Collaborators::from_settings(&settings),
    );

    let watcher_config = WatcherConfig::from_settings(&settings, &dirs.input);
    let (coordinator, intake) =
        IntakeCoordinator::new(dirs, dispatcher, config_manager, metrics.clone());
    let coordinator_task = coordinator.spawn();

    let watcher = DebouncedWatcher::spawn(watcher_config, intake.clone())
        .await
        .context("Failed to start the input watcher")?;

    tracing::info!(
        "Ready; automatic processing is {}",
        if intake.get_config().auto_process { "on" } else { "off" }
    );

    let mut metrics_ticker = tokio::time::interval(METRICS_LOG_INTERVAL);
    metrics_ticker.tick().await;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                tracing::info!("Ctrl-C received, shutting down");
                break;
            }
            _ = metrics_ticker.tick() => metrics.log_periodic(),
        }
    }

    watcher.stop().await;
    if intake.shutdown().await.is_err() {
        tracing::warn!("Coordinator already stopped");
    }
    if let Err(e) = coordinator_task.await {
        tracing::error!("Coordinator task failed: {}", e);
    }

    Ok(())
}

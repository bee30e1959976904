use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::constants::schedule;
use crate::models::ServiceConfig;
use crate::services::binance_client::BinanceFuturesClient;
use crate::services::config_watcher::ConfigWatcher;
use crate::worker::daily_sync::{DailySyncScheduler, SystemClock};
use crate::worker::periodic::{ExecutorSettings, OverlapPolicy, PeriodicExecutor, ShutdownToken};

pub fn run(config: PathBuf, schema: PathBuf, check_interval_secs: u64, api_base_url: String) {
    println!("🚀 Starting perpvault sync service");
    println!("📄 Config: {}", config.display());
    println!("📐 Schema: {}", schema.display());

    let watcher = match ConfigWatcher::<ServiceConfig>::new(&config, &schema) {
        Ok(watcher) => Arc::new(watcher),
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    };
    println!("🗄️  Database: {}", watcher.active_config().database_path.display());

    let client = match BinanceFuturesClient::new(&api_base_url) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("❌ Failed to create async runtime: {}", e);
            std::process::exit(1);
        }
    };

    runtime.block_on(serve(watcher, client, Duration::from_secs(check_interval_secs)));
    println!("👋 Sync service stopped");
}

async fn serve(
    watcher: Arc<ConfigWatcher<ServiceConfig>>,
    client: Arc<BinanceFuturesClient>,
    check_interval: Duration,
) {
    let shutdown = ShutdownToken::new();
    spawn_signal_listener(shutdown.clone());

    let scheduler = Arc::new(DailySyncScheduler::new(
        client,
        Arc::clone(&watcher),
        Arc::new(SystemClock),
    ));

    let config_executor = PeriodicExecutor::new(
        ExecutorSettings::new(check_interval, Duration::from_millis(schedule::CONFIG_TIMEOUT_MS)),
        &shutdown,
    );
    let sync_executor = PeriodicExecutor::new(
        ExecutorSettings::new(
            Duration::from_millis(schedule::SYNC_TICK_MS),
            Duration::from_millis(schedule::SYNC_TIMEOUT_MS),
        )
        .with_start_delay(Duration::from_secs(schedule::SYNC_START_DELAY_SECS))
        .with_overlap(OverlapPolicy::SkipWhileRunning),
        &shutdown,
    );

    config_executor.run_detached(watcher);
    sync_executor.run(scheduler).await;
    config_executor.request_stop().await;

    info!("All executors stopped");
}

fn spawn_signal_listener(shutdown: ShutdownToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received, finishing current work");
        shutdown.trigger();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            warn!("Cannot listen for SIGTERM: {}", e);
            ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    ctrl_c().await;
}

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed.
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

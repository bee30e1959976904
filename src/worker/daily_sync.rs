use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::Result;
use crate::models::{ServiceConfig, TradingDay};
use crate::services::config_watcher::{ConfigWatcher, ReloadableConfig};
use crate::services::market_data::MarketDataSource;
use crate::services::ohlcv_sync::{OhlcvSyncEngine, SyncReport};
use crate::worker::periodic::Tickable;

/// Source of the current time
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

struct SchedulerState<M: MarketDataSource> {
    /// `None` until the first tick has run
    next_midnight: Option<DateTime<Utc>>,
    config: ServiceConfig,
    engine: OhlcvSyncEngine<M>,
    last_report: Option<SyncReport>,
}

/// Runs one sync cycle per UTC day and applies configuration updates.
///
/// The first tick always syncs. After that a cycle runs on the first tick at
/// or past the next UTC midnight, targeting the day that just closed. A failed
/// cycle is not retried until the following midnight.
pub struct DailySyncScheduler<M: MarketDataSource> {
    source: Arc<M>,
    watcher: Arc<ConfigWatcher<ServiceConfig>>,
    clock: Arc<dyn Clock>,
    state: Mutex<SchedulerState<M>>,
}

impl<M: MarketDataSource> DailySyncScheduler<M> {
    pub fn new(source: Arc<M>, watcher: Arc<ConfigWatcher<ServiceConfig>>, clock: Arc<dyn Clock>) -> Self {
        let config = (*watcher.active_config()).clone();
        let engine = OhlcvSyncEngine::new(Arc::clone(&source), config.database_path.clone());

        Self {
            source,
            watcher,
            clock,
            state: Mutex::new(SchedulerState {
                next_midnight: None,
                config,
                engine,
                last_report: None,
            }),
        }
    }

    pub async fn next_midnight(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.next_midnight
    }

    pub async fn active_config(&self) -> ServiceConfig {
        self.state.lock().await.config.clone()
    }

    pub async fn last_report(&self) -> Option<SyncReport> {
        self.state.lock().await.last_report.clone()
    }

    fn apply_config(&self, state: &mut SchedulerState<M>, next: ServiceConfig) {
        if next.database_path != state.config.database_path {
            info!(
                from = %state.config.database_path.display(),
                to = %next.database_path.display(),
                "Database path changed, rebinding sync engine"
            );
            state.engine = OhlcvSyncEngine::new(Arc::clone(&self.source), next.database_path.clone());
        }

        info!(config = %next.to_diagnostic_json(), "Applied new configuration");
        state.config = next;
    }
}

impl<M: MarketDataSource> Tickable for DailySyncScheduler<M> {
    fn name(&self) -> &str {
        "daily-sync"
    }

    async fn tick(self: Arc<Self>) -> Result<()> {
        let mut state = self.state.lock().await;
        let now = self.clock.now();

        let due = state.next_midnight.map_or(true, |midnight| now >= midnight);
        if due {
            let target = TradingDay::yesterday(now);
            info!(day = %target, first_run = state.next_midnight.is_none(), "Starting daily sync");

            let outcome = state.engine.download_data(target).await;
            match outcome {
                Ok(report) => state.last_report = Some(report),
                Err(e) => warn!(day = %target, "Daily sync failed, next attempt after midnight UTC: {}", e),
            }

            let next = TradingDay::next_midnight_after(now);
            info!(next_sync = %next, "Scheduled next daily sync");
            state.next_midnight = Some(next);
        }

        if let Some(next) = self.watcher.consume_pending() {
            self.apply_config(&mut state, next);
        }

        Ok(())
    }

    fn on_timeout(&self, budget: Duration) {
        warn!(budget_ms = budget.as_millis() as u64, "Daily sync tick still running");
    }
}

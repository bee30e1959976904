use chrono::Utc;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::constants::{FETCH_BATCH_SIZE, MAX_BACKFILL_DAYS, TOP_N};
use crate::error::{AppError, Result};
use crate::models::{CandleSet, TrackedPairs, TradingDay};
use crate::services::market_data::{FetchWindow, MarketDataSource};
use crate::services::ohlcv_store::OhlcvStore;

/// Outcome of one sync cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub target: TradingDay,
    /// Ranking fetched and ledger rewritten during this cycle
    pub ledger_refreshed: bool,
    pub tracked_pairs: usize,
    /// Pairs with a non-empty gap
    pub requested_pairs: usize,
    pub pairs_with_data: usize,
    pub candles_stored: usize,
    pub candles_pruned: usize,
}

impl SyncReport {
    fn new(target: TradingDay) -> Self {
        Self {
            target,
            ledger_refreshed: false,
            tracked_pairs: 0,
            requested_pairs: 0,
            pairs_with_data: 0,
            candles_stored: 0,
            candles_pruned: 0,
        }
    }
}

/// Number of trailing days `pair` needs to reach `target`, or `None` when the
/// stored data already covers it.
///
/// A pair with no stored candles gets the full backfill window.
pub fn compute_gap(last_stored: Option<TradingDay>, target: TradingDay) -> Option<u32> {
    let Some(last) = last_stored else {
        return Some(MAX_BACKFILL_DAYS);
    };
    if last >= target {
        return None;
    }
    let days = target.days_since(last);
    Some(u32::try_from(days).unwrap_or(MAX_BACKFILL_DAYS).min(MAX_BACKFILL_DAYS))
}

/// Incremental daily candle sync for the tracked universe
pub struct OhlcvSyncEngine<M: MarketDataSource> {
    source: Arc<M>,
    database_path: PathBuf,
}

impl<M: MarketDataSource> OhlcvSyncEngine<M> {
    pub fn new(source: Arc<M>, database_path: impl Into<PathBuf>) -> Self {
        Self {
            source,
            database_path: database_path.into(),
        }
    }

    /// Runs one full sync cycle for `target`.
    ///
    /// Fails on store open, ranking or persistence errors. Per-pair fetch
    /// failures only drop that pair from the cycle.
    #[instrument(skip(self, target), fields(day = %target))]
    pub async fn download_data(&self, target: TradingDay) -> Result<SyncReport> {
        let start = Instant::now();
        let store = OhlcvStore::open(&self.database_path).await?;

        let result = self.sync_with_store(&store, target).await;
        store.close().await;

        match &result {
            Ok(report) => info!(
                tracked = report.tracked_pairs,
                requested = report.requested_pairs,
                with_data = report.pairs_with_data,
                stored = report.candles_stored,
                pruned = report.candles_pruned,
                duration_s = start.elapsed().as_secs_f64(),
                "Sync cycle completed"
            ),
            Err(e) => error!(duration_s = start.elapsed().as_secs_f64(), "Sync cycle failed: {}", e),
        }

        result
    }

    async fn sync_with_store(&self, store: &OhlcvStore, target: TradingDay) -> Result<SyncReport> {
        let mut report = SyncReport::new(target);

        if let Err(e) = store
            .record_dataset_start_if_empty(TradingDay::containing(Utc::now()))
            .await
        {
            warn!("Failed to record dataset start: {}", e);
        }

        let previous = store.load_tracked_pairs().await?.filter(|p| !p.is_empty());

        let ledger = match previous {
            Some(snapshot) if snapshot.date == target => {
                debug!("Tracked pairs already current, skipping ranking");
                snapshot
            }
            previous => {
                let ledger = self.refresh_ledger(store, previous.as_ref(), target).await?;
                report.ledger_refreshed = true;
                ledger
            }
        };
        report.tracked_pairs = ledger.len();

        let mut requests = Vec::new();
        for pair in ledger.symbols() {
            let last = store.latest_candle_day(pair).await?;
            if let Some(days) = compute_gap(last, target) {
                requests.push((pair.to_string(), days));
            }
        }
        report.requested_pairs = requests.len();

        if requests.is_empty() {
            info!("All tracked pairs are up to date");
            return Ok(report);
        }

        let (mut candles, pairs_with_data) = self.fetch_candles(&requests, target).await;
        report.pairs_with_data = pairs_with_data;
        report.candles_pruned = candles.prune_after(target);

        if candles.is_empty() {
            warn!(requested = requests.len(), "No candles returned for any requested pair");
            return Ok(report);
        }

        report.candles_stored = store.upsert_candles(&candles).await?;
        Ok(report)
    }

    async fn refresh_ledger(
        &self,
        store: &OhlcvStore,
        previous: Option<&TrackedPairs>,
        target: TradingDay,
    ) -> Result<TrackedPairs> {
        let ranking = self.source.top_pairs_by_volume(TOP_N).await?;
        if ranking.is_empty() {
            return Err(AppError::EmptyRanking);
        }

        let top: BTreeSet<String> = ranking.into_iter().collect();
        let ledger = TrackedPairs::recompute(previous, &top, target);
        store.replace_tracked_pairs(&ledger).await?;

        info!(
            ranked = top.len(),
            tracked = ledger.len(),
            outside_top = ledger.len() - top.len(),
            "Updated tracked pairs"
        );
        Ok(ledger)
    }

    /// Fetches every request in batches of `FETCH_BATCH_SIZE` concurrent tasks.
    /// Returns the merged candles and the number of pairs that produced data.
    async fn fetch_candles(&self, requests: &[(String, u32)], target: TradingDay) -> (CandleSet, usize) {
        let merged = Arc::new(Mutex::new(CandleSet::new()));
        let total_batches = requests.len().div_ceil(FETCH_BATCH_SIZE);
        let mut pairs_with_data = 0;

        for (batch_idx, batch) in requests.chunks(FETCH_BATCH_SIZE).enumerate() {
            let batch_start = Instant::now();
            let mut tasks = Vec::with_capacity(batch.len());

            for (pair, days) in batch {
                let source = Arc::clone(&self.source);
                let merged = Arc::clone(&merged);
                let pair = pair.clone();
                let window = FetchWindow::ending_on(target, *days);

                tasks.push(tokio::spawn(async move {
                    let rows = match source.daily_candles(&pair, &window).await {
                        Ok(rows) => rows,
                        Err(e) => {
                            warn!(pair = %pair, days = window.days, "Failed to fetch candles: {}", e);
                            return 0;
                        }
                    };

                    let mut local = CandleSet::new();
                    for (day, candle) in rows {
                        if day <= window.end {
                            local.insert(&pair, day, candle);
                        }
                    }

                    let fetched = local.candle_count();
                    merged
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .merge(local);
                    fetched
                }));
            }

            let results = futures::future::join_all(tasks).await;
            for result in results {
                match result {
                    Ok(fetched) if fetched > 0 => pairs_with_data += 1,
                    Ok(_) => {}
                    Err(e) => error!("Candle fetch task failed: {}", e),
                }
            }

            debug!(
                batch_num = batch_idx + 1,
                total_batches,
                pairs = batch.len(),
                duration_s = batch_start.elapsed().as_secs_f64(),
                "Batch completed"
            );
        }

        let candles = std::mem::take(&mut *merged.lock().unwrap_or_else(PoisonError::into_inner));
        (candles, pairs_with_data)
    }
}

use std::future::Future;

use crate::constants::MAX_BACKFILL_DAYS;
use crate::error::Result;
use crate::models::{Candle, TradingDay};

/// Remote source of the volume ranking and daily candles.
///
/// Implemented by the Binance futures client in production and by in-memory
/// fakes in tests.
pub trait MarketDataSource: Send + Sync + 'static {
    /// Symbols ordered by descending 24h quote volume, at most `limit` long.
    fn top_pairs_by_volume(&self, limit: usize) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Daily candles for `pair` covering `window`.
    fn daily_candles(
        &self,
        pair: &str,
        window: &FetchWindow,
    ) -> impl Future<Output = Result<Vec<(TradingDay, Candle)>>> + Send;
}

/// Trailing range of days requested for one pair, ending on the target day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: TradingDay,
    /// Target day, inclusive
    pub end: TradingDay,
    pub days: u32,
}

impl FetchWindow {
    /// Window of `days` days ending on `target`, clamped to 1..=MAX_BACKFILL_DAYS.
    pub fn ending_on(target: TradingDay, days: u32) -> Self {
        let days = days.clamp(1, MAX_BACKFILL_DAYS);
        Self {
            start: target.sub_days(days - 1),
            end: target,
            days,
        }
    }

    pub fn start_millis(&self) -> i64 {
        self.start.start_millis_utc()
    }

    /// Midnight UTC after the target day
    pub fn end_millis_exclusive(&self) -> i64 {
        self.end.next().start_millis_utc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> TradingDay {
        s.parse().unwrap()
    }

    #[test]
    fn test_window_bounds() {
        let window = FetchWindow::ending_on(day("2024-03-10"), 100);
        assert_eq!(window.start, day("2023-12-02"));
        assert_eq!(window.end, day("2024-03-10"));
        assert_eq!(window.end_millis_exclusive() - window.start_millis(), 100 * 86_400_000);
    }

    #[test]
    fn test_window_clamps_days() {
        assert_eq!(FetchWindow::ending_on(day("2024-03-10"), 0).days, 1);
        assert_eq!(FetchWindow::ending_on(day("2024-03-10"), 0).start, day("2024-03-10"));
        assert_eq!(FetchWindow::ending_on(day("2024-03-10"), 500).days, MAX_BACKFILL_DAYS);
    }
}

//! Sync Constants
//!
//! Fixed parameters of the daily sync cycle and the Binance USDⓈ-M futures API.
//!
//! ## Universe
//!
//! The tracked universe is the top 50 `*USDT` perpetuals by 24h quote volume,
//! re-ranked once per UTC day. Pairs that drop out of the ranking stay tracked
//! and accumulate a "days outside" counter.

/// Size of the volume ranking that defines the tracked universe
pub const TOP_N: usize = 50;

/// Maximum trailing days fetched for one pair in one cycle
///
/// Also the gap assigned to a pair with no stored candles.
pub const MAX_BACKFILL_DAYS: u32 = 100;

/// Pairs fetched concurrently within one batch
pub const FETCH_BATCH_SIZE: usize = 8;

/// Quote asset suffix kept by the ranking filter
pub const QUOTE_SUFFIX: &str = "USDT";

/// Binance endpoint settings
pub mod binance {
    /// Default REST host for USDⓈ-M futures
    pub const DEFAULT_BASE_URL: &str = "https://fapi.binance.com";

    /// 24h rolling ticker statistics for every symbol
    pub const TICKER_24H_PATH: &str = "/fapi/v1/ticker/24hr";

    /// Candlestick data
    pub const KLINES_PATH: &str = "/fapi/v1/klines";

    /// Daily kline interval identifier
    pub const DAILY_INTERVAL: &str = "1d";

    /// Per-request timeout in seconds
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;

    /// Environment variable overriding the REST host
    pub const BASE_URL_ENV: &str = "PERPVAULT_API_BASE_URL";
}

/// Periodic executor defaults
pub mod schedule {
    /// Orchestrator tick interval in milliseconds
    pub const SYNC_TICK_MS: u64 = 1_000;

    /// Advisory budget for one orchestrator tick in milliseconds
    pub const SYNC_TIMEOUT_MS: u64 = 30_000;

    /// Delay before the orchestrator's first tick in seconds
    pub const SYNC_START_DELAY_SECS: u64 = 2;

    /// Default config check interval in seconds
    pub const CONFIG_CHECK_INTERVAL_SECS: u64 = 30;

    /// Advisory budget for one config check in milliseconds
    pub const CONFIG_TIMEOUT_MS: u64 = 500;
}

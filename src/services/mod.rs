pub mod binance_client;
pub mod config_watcher;
pub mod json_schema;
pub mod market_data;
pub mod ohlcv_store;
pub mod ohlcv_sync;

pub use binance_client::BinanceFuturesClient;
pub use config_watcher::{ConfigWatcher, ReloadableConfig};
pub use market_data::{FetchWindow, MarketDataSource};
pub use ohlcv_store::OhlcvStore;
pub use ohlcv_sync::{compute_gap, OhlcvSyncEngine, SyncReport};

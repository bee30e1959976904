mod candle;
mod service_config;
mod tracked_pairs;
mod trading_day;

pub use candle::{Candle, CandleSet};
pub use service_config::{ServiceConfig, SUPPORTED_EXCHANGE};
pub use tracked_pairs::TrackedPairs;
pub use trading_day::TradingDay;

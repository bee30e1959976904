pub mod daily_sync;
pub mod periodic;

pub use daily_sync::{Clock, DailySyncScheduler, SystemClock};
pub use periodic::{ExecutorSettings, OverlapPolicy, PeriodicExecutor, ShutdownToken, Tickable};

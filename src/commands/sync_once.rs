use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;

use crate::models::{ServiceConfig, TradingDay};
use crate::services::binance_client::BinanceFuturesClient;
use crate::services::ohlcv_sync::OhlcvSyncEngine;

pub fn run(config: PathBuf, schema: PathBuf, date: Option<String>, api_base_url: String) {
    let service_config = match ServiceConfig::load(&config, &schema) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    };

    let target = match date {
        Some(raw) => match raw.parse::<TradingDay>() {
            Ok(day) => day,
            Err(e) => {
                eprintln!("❌ {}", e);
                std::process::exit(1);
            }
        },
        None => TradingDay::yesterday(Utc::now()),
    };

    let client = match BinanceFuturesClient::new(&api_base_url) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    };

    println!("🔄 Syncing {} into {}", target, service_config.database_path.display());

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("❌ Failed to create async runtime: {}", e);
            std::process::exit(1);
        }
    };

    let engine = OhlcvSyncEngine::new(client, service_config.database_path);
    match runtime.block_on(engine.download_data(target)) {
        Ok(report) => {
            println!("\n✅ Sync for {} completed", report.target);
            println!("   📋 Tracked pairs:   {}{}", report.tracked_pairs,
                if report.ledger_refreshed { " (ranking refreshed)" } else { "" });
            println!("   📥 Pairs requested: {}", report.requested_pairs);
            println!("   📈 Pairs with data: {}", report.pairs_with_data);
            println!("   💾 Candles stored:  {}", report.candles_stored);
            if report.candles_pruned > 0 {
                println!("   ✂️  Future candles dropped: {}", report.candles_pruned);
            }
        }
        Err(e) => {
            eprintln!("\n❌ Sync failed: {}", e);
            std::process::exit(1);
        }
    }
}

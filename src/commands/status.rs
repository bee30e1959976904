use std::path::PathBuf;

use crate::constants::TOP_N;
use crate::error::Result;
use crate::services::ohlcv_store::OhlcvStore;

pub fn run(database: PathBuf, pair: Option<String>) {
    println!("📊 Perpvault Status\n");

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("❌ Failed to create async runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(show_status(database, pair)) {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

async fn show_status(database: PathBuf, pair: Option<String>) -> Result<()> {
    let store = OhlcvStore::open_existing(&database).await?;
    let result = print_sections(&store, pair.as_deref()).await;
    store.close().await;
    result
}

async fn print_sections(store: &OhlcvStore, pair: Option<&str>) -> Result<()> {
    println!("🗄️  Database: {}", store.path().display());
    match store.dataset_start().await? {
        Some(day) => println!("📅 Dataset started: {}", day),
        None => println!("📅 Dataset started: (not recorded)"),
    }
    println!("🕯️  Stored candles: {}", store.candle_count().await?);

    println!("\n═══════════════════════════════════════════════════════════\n");

    match store.load_tracked_pairs().await? {
        Some(ledger) => {
            println!("🔹 Tracked pairs on {} ({} pairs)", ledger.date, ledger.len());
            let mut rows: Vec<(&String, &u32)> = ledger.pairs.iter().collect();
            rows.sort_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)));
            for (symbol, days_out) in rows {
                if *days_out == 0 {
                    println!("   {:<16} in top {}", symbol, TOP_N);
                } else {
                    println!("   {:<16} {} day(s) outside top {}", symbol, days_out, TOP_N);
                }
            }
        }
        None => println!("⚠️  No tracked pairs stored yet. Run 'sync' first."),
    }

    println!("\n═══════════════════════════════════════════════════════════\n");

    match store.latest_stored_day().await? {
        Some(day) => {
            println!("🔹 Candles on {}", day);
            println!("   {:<16} {:>14} {:>14} {:>14} {:>14} {:>18}", "pair", "open", "high", "low", "close", "volume");
            for (symbol, c) in store.candles_on(day).await? {
                println!(
                    "   {:<16} {:>14.6} {:>14.6} {:>14.6} {:>14.6} {:>18.2}",
                    symbol, c.open, c.high, c.low, c.close, c.volume
                );
            }
        }
        None => println!("⚠️  No candles stored yet."),
    }

    if let Some(pair) = pair {
        println!("\n═══════════════════════════════════════════════════════════\n");
        let candles = store.candles_for(pair).await?;
        println!("🔹 {} ({} candles)", pair, candles.len());
        for (day, c) in candles {
            println!(
                "   {}  O {:.6}  H {:.6}  L {:.6}  C {:.6}  V {:.2}",
                day, c.open, c.high, c.low, c.close, c.volume
            );
        }
    }

    Ok(())
}

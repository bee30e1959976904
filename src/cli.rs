use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands;
use crate::constants::{binance, schedule};
use crate::utils::init_logging;

#[derive(Parser)]
#[command(name = "perpvault")]
#[command(about = "Daily top-50 crypto futures OHLCV sync", long_about = None)]
pub struct Cli {
    /// Market data REST host
    #[arg(long, global = true, env = binance::BASE_URL_ENV, default_value = binance::DEFAULT_BASE_URL)]
    pub api_base_url: String,

    /// Enable debug logging (RUST_LOG overrides)
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the sync service until interrupted
    Run {
        /// Path to the JSON config file
        #[arg(short, long)]
        config: PathBuf,

        /// Path to the JSON schema the config must satisfy
        #[arg(short, long)]
        schema: PathBuf,

        /// Seconds between config file checks
        #[arg(long, default_value_t = schedule::CONFIG_CHECK_INTERVAL_SECS,
              value_parser = clap::value_parser!(u64).range(1..))]
        check_interval: u64,
    },
    /// Run a single sync cycle and exit
    Sync {
        /// Path to the JSON config file
        #[arg(short, long)]
        config: PathBuf,

        /// Path to the JSON schema the config must satisfy
        #[arg(short, long)]
        schema: PathBuf,

        /// Target day (YYYY-MM-DD), defaults to yesterday UTC
        #[arg(long)]
        date: Option<String>,
    },
    /// Show the dataset start, tracked pairs and latest candles
    Status {
        /// Path to the SQLite database
        #[arg(short, long)]
        database: PathBuf,

        /// Also list the stored candles of this pair
        #[arg(long)]
        pair: Option<String>,
    },
}

pub fn run() {
    let cli = Cli::parse();
    init_logging(cli.debug);

    match cli.command {
        Commands::Run { config, schema, check_interval } => {
            commands::run::run(config, schema, check_interval, cli.api_base_url);
        }
        Commands::Sync { config, schema, date } => {
            commands::sync_once::run(config, schema, date, cli.api_base_url);
        }
        Commands::Status { database, pair } => {
            commands::status::run(database, pair);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_defaults() {
        let cli = Cli::try_parse_from(["perpvault", "run", "-c", "service.json", "-s", "schema.json"]).unwrap();
        assert!(!cli.debug);
        match cli.command {
            Commands::Run { check_interval, .. } => assert_eq!(check_interval, 30),
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_zero_check_interval_rejected() {
        let parsed = Cli::try_parse_from([
            "perpvault", "run", "-c", "a.json", "-s", "b.json", "--check-interval", "0",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_sync_with_date_and_global_flags() {
        let cli = Cli::try_parse_from([
            "perpvault", "sync", "-c", "a.json", "-s", "b.json", "--date", "2024-03-10",
            "--debug", "--api-base-url", "http://localhost:9000",
        ])
        .unwrap();

        assert!(cli.debug);
        assert_eq!(cli.api_base_url, "http://localhost:9000");
        match cli.command {
            Commands::Sync { date, .. } => assert_eq!(date.as_deref(), Some("2024-03-10")),
            _ => panic!("expected sync"),
        }
    }
}

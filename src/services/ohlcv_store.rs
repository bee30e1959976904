use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::error::{AppError, Result};
use crate::models::{Candle, CandleSet, TrackedPairs, TradingDay};

/// SQLite store for the tracked-pair ledger and daily candles.
///
/// Holds a single-connection pool; the sync engine opens one per cycle and
/// closes it when the cycle ends.
#[derive(Debug)]
pub struct OhlcvStore {
    pool: SqlitePool,
    database_path: PathBuf,
}

impl OhlcvStore {
    /// Opens the database at `database_path`, creating the file, its parent
    /// directories and the schema if needed.
    pub async fn open(database_path: &Path) -> Result<Self> {
        debug!("Opening OHLCV store at: {:?}", database_path);

        if let Some(parent) = database_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    AppError::Io(format!("Failed to create {}: {}", parent.display(), e))
                })?;
            }
        }

        let connect_options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect_options)
            .await
            .map_err(|e| {
                AppError::Database(format!("Failed to open {}: {}", database_path.display(), e))
            })?;

        let store = Self {
            pool,
            database_path: database_path.to_path_buf(),
        };
        store.initialize_schema().await?;

        Ok(store)
    }

    /// Opens an existing database for inspection without creating anything.
    pub async fn open_existing(database_path: &Path) -> Result<Self> {
        if !database_path.exists() {
            return Err(AppError::Database(format!(
                "Database not found: {}",
                database_path.display()
            )));
        }

        let connect_options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(false)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect_options)
            .await?;

        Ok(Self {
            pool,
            database_path: database_path.to_path_buf(),
        })
    }

    async fn initialize_schema(&self) -> Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS tracked_pairs (
                date TEXT PRIMARY KEY,
                json TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS ohlcv_data (
                pair TEXT NOT NULL,
                date INTEGER NOT NULL,
                open REAL,
                high REAL,
                low REAL,
                close REAL,
                volume REAL,
                PRIMARY KEY (pair, date)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS date_of_start (
                id TEXT PRIMARY KEY
            )
            "#,
        ];

        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.database_path
    }

    /// Writes the dataset-start marker unless one already exists.
    /// Returns true when the marker was written by this call.
    pub async fn record_dataset_start_if_empty(&self, day: TradingDay) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO date_of_start (id) SELECT ?1 WHERE NOT EXISTS (SELECT 1 FROM date_of_start)",
        )
        .bind(day.yyyymmdd().to_string())
        .execute(&self.pool)
        .await?;

        let written = result.rows_affected() > 0;
        if written {
            info!(day = %day, "Recorded dataset start");
        }
        Ok(written)
    }

    pub async fn dataset_start(&self) -> Result<Option<TradingDay>> {
        let marker: Option<String> =
            sqlx::query_scalar("SELECT id FROM date_of_start ORDER BY id LIMIT 1")
                .fetch_optional(&self.pool)
                .await?;

        Ok(marker
            .and_then(|id| id.trim().parse::<u32>().ok())
            .and_then(TradingDay::from_yyyymmdd))
    }

    /// Loads the stored ledger snapshot.
    ///
    /// A row that cannot be decoded is logged and reported as absent, so the
    /// next cycle rebuilds the ledger from the live ranking.
    pub async fn load_tracked_pairs(&self) -> Result<Option<TrackedPairs>> {
        let row = sqlx::query("SELECT date, json FROM tracked_pairs ORDER BY date DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let date: String = row.try_get("date")?;
        let json: String = row.try_get("json")?;

        match TrackedPairs::from_stored(&date, &json) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                error!(date = %date, "Discarding unreadable tracked pairs snapshot: {}", e);
                Ok(None)
            }
        }
    }

    /// Replaces the stored ledger snapshot with `snapshot` in one transaction.
    pub async fn replace_tracked_pairs(&self, snapshot: &TrackedPairs) -> Result<()> {
        let json = snapshot.to_json()?;
        let mut transaction = self.pool.begin().await?;

        sqlx::query("DELETE FROM tracked_pairs")
            .execute(&mut *transaction)
            .await?;

        sqlx::query("INSERT INTO tracked_pairs (date, json) VALUES (?1, ?2)")
            .bind(snapshot.date.to_string())
            .bind(json)
            .execute(&mut *transaction)
            .await?;

        transaction.commit().await?;

        debug!(date = %snapshot.date, pairs = snapshot.len(), "Stored tracked pairs");
        Ok(())
    }

    /// Most recent stored candle day for `pair`
    pub async fn latest_candle_day(&self, pair: &str) -> Result<Option<TradingDay>> {
        let latest: Option<i64> = sqlx::query_scalar("SELECT MAX(date) FROM ohlcv_data WHERE pair = ?1")
            .bind(pair)
            .fetch_one(&self.pool)
            .await?;

        Ok(latest.and_then(day_from_key))
    }

    /// Most recent stored candle day across all pairs
    pub async fn latest_stored_day(&self) -> Result<Option<TradingDay>> {
        let latest: Option<i64> = sqlx::query_scalar("SELECT MAX(date) FROM ohlcv_data")
            .fetch_one(&self.pool)
            .await?;

        Ok(latest.and_then(day_from_key))
    }

    /// Inserts or overwrites every candle in `candles` in one transaction.
    pub async fn upsert_candles(&self, candles: &CandleSet) -> Result<usize> {
        if candles.is_empty() {
            return Ok(0);
        }

        let mut transaction = self.pool.begin().await?;
        let mut written = 0;

        for (pair, key, candle) in candles.iter() {
            sqlx::query(
                r#"
                INSERT INTO ohlcv_data (pair, date, open, high, low, close, volume)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(pair, date) DO UPDATE SET
                    open = excluded.open,
                    high = excluded.high,
                    low = excluded.low,
                    close = excluded.close,
                    volume = excluded.volume
                "#,
            )
            .bind(pair)
            .bind(i64::from(key))
            .bind(candle.open)
            .bind(candle.high)
            .bind(candle.low)
            .bind(candle.close)
            .bind(candle.volume)
            .execute(&mut *transaction)
            .await?;

            written += 1;
        }

        transaction.commit().await?;
        Ok(written)
    }

    /// Stored candles for `pair`, oldest first
    pub async fn candles_for(&self, pair: &str) -> Result<Vec<(TradingDay, Candle)>> {
        let rows = sqlx::query(
            "SELECT date, open, high, low, close, volume FROM ohlcv_data WHERE pair = ?1 ORDER BY date",
        )
        .bind(pair)
        .fetch_all(&self.pool)
        .await?;

        let mut candles = Vec::with_capacity(rows.len());
        for row in rows {
            let key: i64 = row.try_get("date")?;
            let Some(day) = day_from_key(key) else {
                continue;
            };
            candles.push((day, row_to_candle(&row)?));
        }
        Ok(candles)
    }

    /// Every stored candle on `day`, ordered by pair
    pub async fn candles_on(&self, day: TradingDay) -> Result<Vec<(String, Candle)>> {
        let rows = sqlx::query(
            "SELECT pair, open, high, low, close, volume FROM ohlcv_data WHERE date = ?1 ORDER BY pair",
        )
        .bind(i64::from(day.yyyymmdd()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<(String, Candle)> {
                let pair: String = row.try_get("pair")?;
                Ok((pair, row_to_candle(row)?))
            })
            .collect()
    }

    pub async fn candle_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ohlcv_data")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

fn day_from_key(key: i64) -> Option<TradingDay> {
    u32::try_from(key).ok().and_then(TradingDay::from_yyyymmdd)
}

fn row_to_candle(row: &sqlx::sqlite::SqliteRow) -> Result<Candle> {
    Ok(Candle {
        open: row.try_get("open")?,
        high: row.try_get("high")?,
        low: row.try_get("low")?,
        close: row.try_get("close")?,
        volume: row.try_get("volume")?,
    })
}

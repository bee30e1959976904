use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::constants::{binance, QUOTE_SUFFIX};
use crate::error::{Error, Result};
use crate::models::{Candle, TradingDay};
use crate::services::market_data::{FetchWindow, MarketDataSource};

/// REST client for Binance USDⓈ-M futures market data
#[derive(Debug, Clone)]
pub struct BinanceFuturesClient {
    base_url: String,
    client: reqwest::Client,
}

impl BinanceFuturesClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `base_url` - REST host, e.g. "https://fapi.binance.com"
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(Error::Config(format!(
                "Invalid base_url: must start with http:// or https://, got: '{}'",
                base_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(binance::REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        info!(base_url = %base_url, "Created Binance futures client");

        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        debug!("Sending request to: {}", url);

        let response = self.client.get(url).send().await.map_err(|e| {
            let error_msg = format!("API request failed: {} (url: {})", e, url);
            error!("{}", error_msg);
            Error::Network(error_msg)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(Error::Network(format!(
                "API returned HTTP {} for {}: {}",
                status, url, snippet
            )));
        }

        response
            .text()
            .await
            .map_err(|e| Error::Network(format!("Failed to read response body: {}", e)))
    }
}

impl MarketDataSource for BinanceFuturesClient {
    async fn top_pairs_by_volume(&self, limit: usize) -> Result<Vec<String>> {
        let url = format!("{}{}", self.base_url, binance::TICKER_24H_PATH);
        let body = self.get_text(&url).await?;
        let ranking = parse_volume_ranking(&body, limit)?;

        debug!(pairs = ranking.len(), "Fetched volume ranking");
        Ok(ranking)
    }

    async fn daily_candles(&self, pair: &str, window: &FetchWindow) -> Result<Vec<(TradingDay, Candle)>> {
        let url = format!(
            "{}{}?symbol={}&interval={}&limit={}&startTime={}&endTime={}",
            self.base_url,
            binance::KLINES_PATH,
            pair,
            binance::DAILY_INTERVAL,
            window.days,
            window.start_millis(),
            window.end_millis_exclusive()
        );
        let body = self.get_text(&url).await?;

        parse_daily_klines(&body).map_err(|e| Error::Parse(format!("{}: {}", pair, e)))
    }
}

/// Ranks `*USDT` symbols by 24h quote volume, highest first.
///
/// Entries without a symbol or a numeric `quoteVolume` are skipped. Equal
/// volumes keep response order.
pub fn parse_volume_ranking(body: &str, limit: usize) -> Result<Vec<String>> {
    let tickers: Vec<Value> = serde_json::from_str(body)
        .map_err(|e| Error::Parse(format!("Invalid 24h ticker response: {}", e)))?;

    let mut ranked: Vec<(String, f64)> = tickers
        .iter()
        .filter_map(|ticker| {
            let symbol = ticker.get("symbol")?.as_str()?;
            if symbol.len() <= QUOTE_SUFFIX.len() || !symbol.ends_with(QUOTE_SUFFIX) {
                return None;
            }
            match ticker.get("quoteVolume").and_then(decimal) {
                Some(volume) => Some((symbol.to_string(), volume)),
                None => {
                    debug!(symbol, "Skipping ticker without a usable quoteVolume");
                    None
                }
            }
        })
        .collect();

    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.truncate(limit);

    Ok(ranked.into_iter().map(|(symbol, _)| symbol).collect())
}

/// Parses a klines array of arrays into (day, candle) rows.
///
/// Any malformed row fails the whole response.
pub fn parse_daily_klines(body: &str) -> Result<Vec<(TradingDay, Candle)>> {
    let rows: Vec<Vec<Value>> = serde_json::from_str(body)
        .map_err(|e| Error::Parse(format!("Invalid klines response: {}", e)))?;

    rows.iter()
        .enumerate()
        .map(|(index, row)| {
            parse_kline_row(row).ok_or_else(|| Error::Parse(format!("Malformed kline row {}", index)))
        })
        .collect()
}

fn parse_kline_row(row: &[Value]) -> Option<(TradingDay, Candle)> {
    if row.len() < 6 {
        return None;
    }
    let open_time = row[0].as_i64()?;
    let day = TradingDay::from_millis_utc(open_time)?;

    let candle = Candle {
        open: decimal(&row[1])?,
        high: decimal(&row[2])?,
        low: decimal(&row[3])?,
        close: decimal(&row[4])?,
        volume: decimal(&row[5])?,
    };
    Some((day, candle))
}

/// Binance sends decimals as strings; plain JSON numbers are accepted too.
fn decimal(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    parsed.is_finite().then_some(parsed)
}

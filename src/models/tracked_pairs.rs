use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

use super::TradingDay;
use crate::error::{AppError, Result};

/// Ledger snapshot: the pairs of interest on `date`, each with the number of
/// consecutive days it has spent outside the volume ranking.
///
/// A pair inside the ranking always has a counter of 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedPairs {
    pub date: TradingDay,
    pub pairs: BTreeMap<String, u32>,
}

impl TrackedPairs {
    /// Builds the ledger for `target` from the previous snapshot and today's ranking.
    ///
    /// Ranked pairs reset to 0. Previously tracked pairs missing from the
    /// ranking age by the number of days elapsed since the previous snapshot,
    /// never less than one. Pairs in neither set are dropped.
    pub fn recompute(
        previous: Option<&TrackedPairs>,
        top: &BTreeSet<String>,
        target: TradingDay,
    ) -> TrackedPairs {
        let mut pairs: BTreeMap<String, u32> =
            top.iter().map(|symbol| (symbol.clone(), 0)).collect();

        if let Some(prev) = previous {
            let elapsed = target.days_since(prev.date);
            let delta = if elapsed < 1 {
                warn!(
                    previous = %prev.date,
                    day = %target,
                    elapsed,
                    "Ledger target is not after the previous snapshot, treating as one day"
                );
                1
            } else {
                u32::try_from(elapsed).unwrap_or(u32::MAX)
            };

            for (symbol, days_out) in &prev.pairs {
                if !top.contains(symbol) {
                    pairs.insert(symbol.clone(), days_out.saturating_add(delta));
                }
            }
        }

        TrackedPairs { date: target, pairs }
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.pairs.keys().map(String::as_str)
    }

    /// JSON object mapping symbol to days outside the ranking
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.pairs)?)
    }

    /// Rebuilds a snapshot from its stored `YYYY-MM-DD` date and JSON body.
    pub fn from_stored(date: &str, json: &str) -> Result<Self> {
        let date: TradingDay = date.parse()?;
        let pairs: BTreeMap<String, u32> = serde_json::from_str(json).map_err(|e| {
            AppError::Parse(format!("Invalid tracked pairs JSON for {}: {}", date, e))
        })?;
        Ok(Self { date, pairs })
    }
}

use std::collections::BTreeMap;

use super::TradingDay;

/// One daily OHLCV bar
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self { open, high, low, close, volume }
    }
}

/// Candles keyed by pair, then by YYYYMMDD day key.
///
/// At most one candle exists per (pair, day); inserting again replaces it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandleSet {
    pairs: BTreeMap<String, BTreeMap<u32, Candle>>,
}

impl CandleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pair: &str, day: TradingDay, candle: Candle) {
        self.pairs
            .entry(pair.to_string())
            .or_default()
            .insert(day.yyyymmdd(), candle);
    }

    /// Moves every candle of `other` into `self`, overwriting duplicates.
    pub fn merge(&mut self, other: CandleSet) {
        for (pair, days) in other.pairs {
            self.pairs.entry(pair).or_default().extend(days);
        }
    }

    /// Drops candles dated after `day` and pairs left without candles.
    /// Returns how many candles were removed.
    pub fn prune_after(&mut self, day: TradingDay) -> usize {
        let cutoff = day.yyyymmdd();
        let mut removed = 0;

        for days in self.pairs.values_mut() {
            let future = days.split_off(&(cutoff + 1));
            removed += future.len();
        }
        self.pairs.retain(|_, days| !days.is_empty());

        removed
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    #[cfg(test)]
    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    pub fn candle_count(&self) -> usize {
        self.pairs.values().map(BTreeMap::len).sum()
    }

    #[cfg(test)]
    pub fn get(&self, pair: &str) -> Option<&BTreeMap<u32, Candle>> {
        self.pairs.get(pair)
    }

    /// Flattened (pair, day key, candle) view in pair then day order
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32, &Candle)> {
        self.pairs.iter().flat_map(|(pair, days)| {
            days.iter().map(move |(key, candle)| (pair.as_str(), *key, candle))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> TradingDay {
        s.parse().unwrap()
    }

    fn bar(close: f64) -> Candle {
        Candle::new(1.0, 2.0, 0.5, close, 10.0)
    }

    #[test]
    fn test_insert_replaces_same_day() {
        let mut set = CandleSet::new();
        set.insert("BTCUSDT", day("2024-03-10"), bar(1.5));
        set.insert("BTCUSDT", day("2024-03-10"), bar(1.7));

        assert_eq!(set.candle_count(), 1);
        assert_eq!(set.get("BTCUSDT").unwrap()[&20240310].close, 1.7);
    }

    #[test]
    fn test_merge_combines_pairs() {
        let mut left = CandleSet::new();
        left.insert("BTCUSDT", day("2024-03-09"), bar(1.0));

        let mut right = CandleSet::new();
        right.insert("BTCUSDT", day("2024-03-10"), bar(2.0));
        right.insert("ETHUSDT", day("2024-03-10"), bar(3.0));

        left.merge(right);
        assert_eq!(left.pair_count(), 2);
        assert_eq!(left.candle_count(), 3);
    }

    #[test]
    fn test_prune_after_removes_future_and_empty_pairs() {
        let mut set = CandleSet::new();
        set.insert("BTCUSDT", day("2024-03-10"), bar(1.0));
        set.insert("BTCUSDT", day("2024-03-11"), bar(1.1));
        set.insert("ETHUSDT", day("2024-03-12"), bar(2.0));

        let removed = set.prune_after(day("2024-03-10"));

        assert_eq!(removed, 2);
        assert_eq!(set.pair_count(), 1);
        assert!(set.get("ETHUSDT").is_none());
        assert!(set.iter().all(|(_, key, _)| key <= 20240310));
    }
}

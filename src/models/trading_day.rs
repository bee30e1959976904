use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, Utc};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

/// A calendar day in UTC.
///
/// Every conversion to and from epoch milliseconds is pinned to UTC midnight,
/// so the same value maps to the same candle open time regardless of the host
/// time zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TradingDay(NaiveDate);

impl TradingDay {
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    /// The UTC day containing `now`
    pub fn containing(now: DateTime<Utc>) -> Self {
        Self(now.date_naive())
    }

    /// The last fully closed UTC day before `now`
    pub fn yesterday(now: DateTime<Utc>) -> Self {
        Self::containing(now).previous()
    }

    pub fn previous(&self) -> Self {
        self.sub_days(1)
    }

    pub fn next(&self) -> Self {
        self.add_days(1)
    }

    /// Saturates at the calendar bounds chrono supports.
    pub fn add_days(&self, days: u32) -> Self {
        self.0
            .checked_add_days(Days::new(u64::from(days)))
            .map(Self)
            .unwrap_or(*self)
    }

    pub fn sub_days(&self, days: u32) -> Self {
        self.0
            .checked_sub_days(Days::new(u64::from(days)))
            .map(Self)
            .unwrap_or(*self)
    }

    /// Whole days from `earlier` to `self`; negative when `earlier` is later.
    pub fn days_since(&self, earlier: TradingDay) -> i64 {
        (self.0 - earlier.0).num_days()
    }

    /// Integer key used by the candle table, e.g. 20240310
    pub fn yyyymmdd(&self) -> u32 {
        let year = u32::try_from(self.0.year()).unwrap_or(0);
        year * 10_000 + self.0.month() * 100 + self.0.day()
    }

    pub fn from_yyyymmdd(value: u32) -> Option<Self> {
        let year = i32::try_from(value / 10_000).ok()?;
        Self::from_ymd(year, (value / 100) % 100, value % 100)
    }

    /// Epoch milliseconds of 00:00:00 UTC on this day
    pub fn start_millis_utc(&self) -> i64 {
        self.0.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
    }

    /// The UTC day an epoch-millisecond timestamp falls on
    pub fn from_millis_utc(millis: i64) -> Option<Self> {
        DateTime::from_timestamp_millis(millis).map(Self::containing)
    }

    /// First UTC midnight strictly after `now`
    pub fn next_midnight_after(now: DateTime<Utc>) -> DateTime<Utc> {
        Self::containing(now)
            .next()
            .0
            .and_time(NaiveTime::MIN)
            .and_utc()
    }
}

impl fmt::Display for TradingDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for TradingDay {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Self)
            .map_err(|e| AppError::Parse(format!("Invalid date '{}' (expected YYYY-MM-DD): {}", s, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(s: &str) -> TradingDay {
        s.parse().unwrap()
    }

    #[test]
    fn test_yyyymmdd_conversions() {
        let d = day("2024-03-10");
        assert_eq!(d.yyyymmdd(), 20240310);
        assert_eq!(TradingDay::from_yyyymmdd(20240310), Some(d));
        assert_eq!(TradingDay::from_yyyymmdd(20241340), None);
    }

    #[test]
    fn test_display_and_parse() {
        assert_eq!(day("2024-01-03").to_string(), "2024-01-03");
        assert!("2024/01/03".parse::<TradingDay>().is_err());
        assert!("".parse::<TradingDay>().is_err());
    }

    #[test]
    fn test_millis_are_utc_midnight() {
        let d = day("2024-03-10");
        assert_eq!(d.start_millis_utc(), 1_710_028_800_000);
        assert_eq!(TradingDay::from_millis_utc(1_710_028_800_000), Some(d));
        // one millisecond before midnight still belongs to the previous day
        assert_eq!(TradingDay::from_millis_utc(1_710_028_799_999), Some(d.previous()));
    }

    #[test]
    fn test_day_arithmetic_crosses_month_and_leap_day() {
        assert_eq!(day("2024-02-28").next(), day("2024-02-29"));
        assert_eq!(day("2024-03-01").previous(), day("2024-02-29"));
        assert_eq!(day("2024-03-10").sub_days(99), day("2023-12-02"));
        assert_eq!(day("2024-01-03").days_since(day("2024-01-01")), 2);
        assert_eq!(day("2024-01-01").days_since(day("2024-01-03")), -2);
        // YYYYMMDD subtraction would give 8870 here
        assert_eq!(day("2024-01-01").days_since(day("2023-03-10")), 297);
    }

    #[test]
    fn test_next_midnight_after() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 23, 59, 59).unwrap();
        let midnight = TradingDay::next_midnight_after(now);
        assert_eq!(midnight, Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap());

        // exactly at midnight the next boundary is a full day away
        assert_eq!(
            TradingDay::next_midnight_after(midnight),
            Utc.with_ymd_and_hms(2024, 3, 12, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_yesterday() {
        let now = Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 1).unwrap();
        assert_eq!(TradingDay::yesterday(now), day("2024-03-10"));
    }
}

//! Market data types and historical sources
//!
//! Candles arrive at minute granularity or coarser from the broker's
//! historical API; the backtest consumes them through the
//! [`HistoricalSource`] trait so tests and replays can run from memory
//! or CSV without a broker session.

use crate::core::errors::EngineError;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// OHLCV candle in market-zone local time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl Candle {
    pub fn new(timestamp: NaiveDateTime, open: f64, high: f64, low: f64, close: f64, volume: i64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Close at or above open
    #[inline(always)]
    pub fn is_bullish(&self) -> bool {
        self.close >= self.open
    }
}

/// Supported candle intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandleInterval {
    Minute,
    Minute3,
    Minute5,
    Minute15,
    Day,
}

impl CandleInterval {
    /// Broker API interval name
    pub const fn as_str(&self) -> &'static str {
        match self {
            CandleInterval::Minute => "minute",
            CandleInterval::Minute3 => "3minute",
            CandleInterval::Minute5 => "5minute",
            CandleInterval::Minute15 => "15minute",
            CandleInterval::Day => "day",
        }
    }

    pub const fn seconds(&self) -> i64 {
        match self {
            CandleInterval::Minute => 60,
            CandleInterval::Minute3 => 180,
            CandleInterval::Minute5 => 300,
            CandleInterval::Minute15 => 900,
            CandleInterval::Day => 86_400,
        }
    }
}

impl fmt::Display for CandleInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source of historical index candles, keyed by trading day.
pub trait HistoricalSource: Send + Sync {
    /// Whether any data exists for the given day; used by the backtest
    /// to fail fast with `DATA_UNAVAILABLE`.
    fn has_data_for(&self, date: NaiveDate) -> bool;

    /// Session candles for the day, ascending by timestamp.
    fn session_candles(&self, date: NaiveDate, interval: CandleInterval) -> Result<Vec<Candle>, EngineError>;
}

/// In-memory candle store for backtests and tests.
#[derive(Debug, Default)]
pub struct InMemoryHistory {
    days: HashMap<NaiveDate, Vec<Candle>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a day's candles; they are sorted by timestamp on insert.
    pub fn insert_day(&mut self, date: NaiveDate, mut candles: Vec<Candle>) {
        candles.sort_by_key(|c| c.timestamp);
        self.days.insert(date, candles);
    }
}

impl HistoricalSource for InMemoryHistory {
    fn has_data_for(&self, date: NaiveDate) -> bool {
        self.days.get(&date).is_some_and(|candles| !candles.is_empty())
    }

    fn session_candles(&self, date: NaiveDate, _interval: CandleInterval) -> Result<Vec<Candle>, EngineError> {
        match self.days.get(&date) {
            Some(candles) if !candles.is_empty() => Ok(candles.clone()),
            _ => Err(EngineError::DataUnavailable {
                detail: format!("no historical candles for {}", date),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 8, 1).unwrap()
    }

    fn candle(h: u32, m: u32, o: f64, hi: f64, lo: f64, c: f64) -> Candle {
        Candle::new(day().and_hms_opt(h, m, 0).unwrap(), o, hi, lo, c, 1_000)
    }

    #[test]
    fn test_bullish_flag() {
        assert!(candle(9, 15, 100.0, 110.0, 95.0, 105.0).is_bullish());
        assert!(candle(9, 15, 100.0, 110.0, 95.0, 100.0).is_bullish());
        assert!(!candle(9, 15, 100.0, 110.0, 95.0, 99.0).is_bullish());
    }

    #[test]
    fn test_in_memory_history_sorts() {
        let mut history = InMemoryHistory::new();
        history.insert_day(
            day(),
            vec![candle(9, 20, 1.0, 1.0, 1.0, 1.0), candle(9, 15, 2.0, 2.0, 2.0, 2.0)],
        );

        let candles = history.session_candles(day(), CandleInterval::Minute).unwrap();
        assert!(candles[0].timestamp < candles[1].timestamp);
    }

    #[test]
    fn test_missing_day_is_data_unavailable() {
        let history = InMemoryHistory::new();
        assert!(!history.has_data_for(day()));
        let err = history.session_candles(day(), CandleInterval::Minute).unwrap_err();
        assert_eq!(err.tag(), "DATA_UNAVAILABLE");
    }

    #[test]
    fn test_interval_names() {
        assert_eq!(CandleInterval::Minute.as_str(), "minute");
        assert_eq!(CandleInterval::Minute5.seconds(), 300);
    }
}

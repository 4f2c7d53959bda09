//! Synthetic premium estimation for candle replays
//!
//! Historical index candles carry the spot, not the option premiums, so
//! the replay derives a combined-premium estimate per price point and
//! splits it across legs. The default model is deliberately coarse (the
//! simplest harness divides evenly); strategies can substitute a
//! per-leg model through the trait.

use chrono::NaiveDateTime;

/// Maps a spot price point to a combined premium estimate.
pub trait PremiumEstimator: Send {
    /// Combined premium for the whole position at this spot and time
    fn combined(&self, spot: f64, at: NaiveDateTime) -> f64;

    /// Per-leg price for the estimate; the default splits evenly.
    fn leg_price(&self, combined: f64, leg_count: usize) -> f64 {
        if leg_count == 0 {
            return 0.0;
        }
        combined / leg_count as f64
    }
}

/// Combined-premium model for a short straddle around a fixed strike:
/// the premium grows with the spot's distance from the strike and
/// bleeds a constant decay per elapsed minute.
#[derive(Debug, Clone)]
pub struct StraddleEstimator {
    strike: f64,
    entry_spot: f64,
    entry_premium: f64,
    entry_time: NaiveDateTime,
    decay_per_minute: f64,
}

impl StraddleEstimator {
    pub fn new(
        strike: f64,
        entry_spot: f64,
        entry_premium: f64,
        entry_time: NaiveDateTime,
        decay_per_minute: f64,
    ) -> Self {
        Self {
            strike,
            entry_spot,
            entry_premium,
            entry_time,
            decay_per_minute,
        }
    }
}

impl PremiumEstimator for StraddleEstimator {
    fn combined(&self, spot: f64, at: NaiveDateTime) -> f64 {
        let drift = (spot - self.strike).abs() - (self.entry_spot - self.strike).abs();
        let minutes = (at - self.entry_time).num_seconds().max(0) as f64 / 60.0;
        (self.entry_premium + drift - self.decay_per_minute * minutes).max(0.0)
    }
}

/// Fixed path of combined premiums, one per call; used by tests and by
/// replays that recorded actual premium streams.
#[derive(Debug)]
pub struct RecordedPremiums {
    values: Vec<f64>,
    cursor: std::cell::Cell<usize>,
}

impl RecordedPremiums {
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values,
            cursor: std::cell::Cell::new(0),
        }
    }
}

impl PremiumEstimator for RecordedPremiums {
    fn combined(&self, _spot: f64, _at: NaiveDateTime) -> f64 {
        let i = self.cursor.get();
        let value = self
            .values
            .get(i)
            .or_else(|| self.values.last())
            .copied()
            .unwrap_or(0.0);
        self.cursor.set(i + 1);
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 8, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_pinned_spot_decays() {
        let est = StraddleEstimator::new(22_500.0, 22_500.0, 300.0, at(9, 20), 0.5);
        assert_eq!(est.combined(22_500.0, at(9, 20)), 300.0);
        assert_eq!(est.combined(22_500.0, at(9, 30)), 295.0);
        assert_eq!(est.combined(22_500.0, at(10, 20)), 270.0);
    }

    #[test]
    fn test_drift_expands() {
        let est = StraddleEstimator::new(22_500.0, 22_500.0, 300.0, at(9, 20), 0.0);
        assert_eq!(est.combined(22_560.0, at(9, 25)), 360.0);
        assert_eq!(est.combined(22_440.0, at(9, 25)), 360.0);
    }

    #[test]
    fn test_floor_at_zero() {
        let est = StraddleEstimator::new(22_500.0, 22_500.0, 10.0, at(9, 20), 5.0);
        assert_eq!(est.combined(22_500.0, at(12, 0)), 0.0);
    }

    #[test]
    fn test_even_leg_split() {
        let est = StraddleEstimator::new(22_500.0, 22_500.0, 300.0, at(9, 20), 0.0);
        assert_eq!(est.leg_price(300.0, 2), 150.0);
        assert_eq!(est.leg_price(300.0, 0), 0.0);
    }

    #[test]
    fn test_recorded_premiums_replay_in_order() {
        let est = RecordedPremiums::new(vec![300.0, 292.0, 284.0]);
        let t = at(9, 20);
        assert_eq!(est.combined(0.0, t), 300.0);
        assert_eq!(est.combined(0.0, t), 292.0);
        assert_eq!(est.combined(0.0, t), 284.0);
        // Exhausted: repeats the last value
        assert_eq!(est.combined(0.0, t), 284.0);
    }
}

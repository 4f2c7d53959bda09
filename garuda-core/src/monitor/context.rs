//! Reusable per-tick evaluation snapshot
//!
//! One `ExitContext` lives inside each monitor and is rewritten in place
//! for every tick batch. The leg list retains its allocation across
//! ticks, so steady-state evaluation allocates nothing.

use crate::core::types::{Direction, ExecutionId, Leg};
use chrono::NaiveDateTime;
use std::sync::Arc;

/// Snapshot of everything an exit strategy may consult for one tick.
///
/// Valid only for the duration of a single evaluation pass; strategies
/// must not retain references into it.
#[derive(Debug)]
pub struct ExitContext {
    pub execution_id: ExecutionId,
    pub direction: Direction,
    pub direction_multiplier: f64,
    pub cumulative_target_points: f64,
    pub cumulative_stop_points: f64,
    pub entry_premium: f64,
    pub target_premium_level: f64,
    pub stop_loss_premium_level: f64,
    /// Cumulative P&L in per-contract points, signed by direction
    pub cumulative_pnl: f64,
    /// Candle timestamp in backtest; wall clock in the market zone live
    pub now: NaiveDateTime,
    legs: Vec<Arc<Leg>>,
}

impl ExitContext {
    pub fn new(
        execution_id: ExecutionId,
        direction: Direction,
        cumulative_target_points: f64,
        cumulative_stop_points: f64,
    ) -> Self {
        Self {
            execution_id,
            direction,
            direction_multiplier: direction.multiplier(),
            cumulative_target_points,
            cumulative_stop_points,
            entry_premium: 0.0,
            target_premium_level: 0.0,
            stop_loss_premium_level: 0.0,
            cumulative_pnl: 0.0,
            now: NaiveDateTime::default(),
            legs: Vec::with_capacity(4),
        }
    }

    /// Rewrite the per-tick fields in place. The leg Vec is cleared and
    /// refilled from the monitor's current snapshot, reusing capacity.
    #[allow(clippy::too_many_arguments)]
    pub fn reset_for_tick(
        &mut self,
        cumulative_pnl: f64,
        entry_premium: f64,
        target_premium_level: f64,
        stop_loss_premium_level: f64,
        legs: &[Arc<Leg>],
        now: NaiveDateTime,
    ) {
        self.cumulative_pnl = cumulative_pnl;
        self.entry_premium = entry_premium;
        self.target_premium_level = target_premium_level;
        self.stop_loss_premium_level = stop_loss_premium_level;
        self.now = now;
        self.legs.clear();
        self.legs.extend(legs.iter().cloned());
    }

    #[inline(always)]
    pub fn legs(&self) -> &[Arc<Leg>] {
        &self.legs
    }

    /// Combined premium: sum of per-leg LTPs across held legs
    #[inline]
    pub fn combined_ltp(&self) -> f64 {
        self.legs.iter().map(|leg| leg.current_price()).sum()
    }

    /// Per-contract P&L points contributed by one leg, signed by the
    /// monitor direction and the leg side
    #[inline(always)]
    pub fn leg_points(&self, leg: &Leg) -> f64 {
        leg.unit_pnl() * self.direction_multiplier * leg.side().multiplier()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{LegSide, OptionType};
    use chrono::NaiveDate;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 8, 1)
            .unwrap()
            .and_hms_opt(10, 5, 0)
            .unwrap()
    }

    #[test]
    fn test_reset_reuses_capacity() {
        let mut ctx = ExitContext::new(ExecutionId::generate(), Direction::Short, 15.0, 10.0);
        let legs = vec![
            Arc::new(Leg::new("O1", "CE", 1, 150.0, 50, OptionType::CE, LegSide::Primary)),
            Arc::new(Leg::new("O2", "PE", 2, 150.0, 50, OptionType::PE, LegSide::Primary)),
        ];

        ctx.reset_for_tick(0.0, 300.0, 285.0, 330.0, &legs, ts());
        let cap = ctx.legs.capacity();
        assert_eq!(ctx.legs().len(), 2);

        ctx.reset_for_tick(3.5, 300.0, 285.0, 330.0, &legs, ts());
        assert_eq!(ctx.legs.capacity(), cap);
        assert_eq!(ctx.cumulative_pnl, 3.5);
    }

    #[test]
    fn test_combined_ltp_and_leg_points() {
        let mut ctx = ExitContext::new(ExecutionId::generate(), Direction::Short, 15.0, 10.0);
        let ce = Arc::new(Leg::new("O1", "CE", 1, 150.0, 50, OptionType::CE, LegSide::Primary));
        let pe = Arc::new(Leg::new("O2", "PE", 2, 150.0, 50, OptionType::PE, LegSide::Primary));
        ce.set_current_price(140.0);
        pe.set_current_price(145.0);

        ctx.reset_for_tick(0.0, 300.0, 285.0, 330.0, &[ce.clone(), pe.clone()], ts());
        assert_eq!(ctx.combined_ltp(), 285.0);

        // Short monitor: falling premium is positive points
        assert_eq!(ctx.leg_points(&ce), 10.0);
        assert_eq!(ctx.leg_points(&pe), 5.0);
    }
}

//! Premium-level exits and the individual-leg adjustment rule
//!
//! Operates on combined premium (sum of per-leg LTPs) against the decay
//! target and expansion stop levels derived from the entry premium. When
//! neither level is breached, a two-leg position with one sufficiently
//! profitable and one sufficiently loss-making leg triggers the
//! exit-and-replace adjustment instead.

use crate::core::exit::{ExitReason, ExitResult};
use crate::monitor::context::ExitContext;
use std::sync::Arc;

use crate::core::types::Leg;

#[derive(Debug, Clone)]
pub struct PremiumExit {
    enabled: bool,
    /// Per-leg decay fraction of entry price a leg must have earned to
    /// count as "profitable enough" for the adjustment rule
    leg_decay_pct: f64,
    /// Per-leg expansion fraction of entry price a leg must have lost to
    /// count as "loss-making enough"
    leg_expansion_pct: f64,
}

impl PremiumExit {
    pub fn new(enabled: bool, leg_decay_pct: f64, leg_expansion_pct: f64) -> Self {
        Self {
            enabled,
            leg_decay_pct,
            leg_expansion_pct,
        }
    }

    #[inline(always)]
    pub fn is_enabled(&self, _ctx: &ExitContext) -> bool {
        self.enabled
    }

    pub fn evaluate(&mut self, ctx: &ExitContext) -> ExitResult {
        let combined = ctx.combined_ltp();

        if combined <= ctx.target_premium_level {
            return ExitResult::ExitAll(ExitReason::PremiumDecayTargetHit {
                combined_ltp: combined,
                target_level: ctx.target_premium_level,
            });
        }

        if combined >= ctx.stop_loss_premium_level {
            return ExitResult::ExitAll(ExitReason::PremiumExpansionSlHit {
                combined_ltp: combined,
                stop_level: ctx.stop_loss_premium_level,
            });
        }

        self.evaluate_adjustment(ctx)
    }

    /// The adjustment rule applies only to two-leg positions: exactly one
    /// leg profitable beyond the decay threshold and the other loss-making
    /// beyond the expansion threshold. The profitable leg is exited and a
    /// replacement of the same type requested at the loss leg's LTP; the
    /// loss leg is re-based to that LTP.
    fn evaluate_adjustment(&self, ctx: &ExitContext) -> ExitResult {
        let legs = ctx.legs();
        if legs.len() != 2 {
            return ExitResult::NoExit;
        }

        let profitable: Vec<&Arc<Leg>> = legs
            .iter()
            .filter(|leg| self.profitable_enough(ctx, leg))
            .collect();
        let losing: Vec<&Arc<Leg>> = legs
            .iter()
            .filter(|leg| self.loss_making_enough(ctx, leg))
            .collect();

        let (&winner, &loser) = match (profitable.as_slice(), losing.as_slice()) {
            ([w], [l]) if w.symbol() != l.symbol() => (w, l),
            _ => return ExitResult::NoExit,
        };

        let loser_ltp = loser.current_price();
        ExitResult::AdjustLeg {
            exited_leg_symbol: winner.symbol().to_string(),
            new_leg_type: winner.option_type(),
            target_premium: loser_ltp,
            loss_leg_symbol: loser.symbol().to_string(),
            loss_leg_new_entry_price: loser_ltp,
            exited_leg_ltp: winner.current_price(),
            reason: ExitReason::PremiumLegAdjustment {
                exited_leg: winner.symbol().to_string(),
                rebased_leg: loser.symbol().to_string(),
            },
        }
    }

    fn profitable_enough(&self, ctx: &ExitContext, leg: &Leg) -> bool {
        let points = ctx.leg_points(leg);
        points > 0.0 && points >= leg.entry_price() * self.leg_decay_pct
    }

    fn loss_making_enough(&self, ctx: &ExitContext, leg: &Leg) -> bool {
        let points = ctx.leg_points(leg);
        points < 0.0 && -points >= leg.entry_price() * self.leg_expansion_pct
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Direction, ExecutionId, LegSide, OptionType};
    use chrono::NaiveDateTime;
    use std::sync::Arc;

    fn straddle(ce_ltp: f64, pe_ltp: f64) -> Vec<Arc<Leg>> {
        let ce = Arc::new(Leg::new("O1", "NIFTY24AUGCE", 1, 150.0, 50, OptionType::CE, LegSide::Primary));
        let pe = Arc::new(Leg::new("O2", "NIFTY24AUGPE", 2, 150.0, 50, OptionType::PE, LegSide::Primary));
        ce.set_current_price(ce_ltp);
        pe.set_current_price(pe_ltp);
        vec![ce, pe]
    }

    fn ctx_for(legs: &[Arc<Leg>]) -> ExitContext {
        let mut ctx = ExitContext::new(ExecutionId::generate(), Direction::Short, 0.0, 0.0);
        // entry premium 300, 5% decay target, 10% expansion stop
        ctx.reset_for_tick(0.0, 300.0, 285.0, 330.0, legs, NaiveDateTime::default());
        ctx
    }

    #[test]
    fn test_decay_target_hit() {
        let legs = straddle(142.0, 142.0); // combined 284 <= 285
        let mut strat = PremiumExit::new(true, 0.3, 0.3);
        match strat.evaluate(&ctx_for(&legs)) {
            ExitResult::ExitAll(ExitReason::PremiumDecayTargetHit { combined_ltp, target_level }) => {
                assert_eq!(combined_ltp, 284.0);
                assert_eq!(target_level, 285.0);
            }
            other => panic!("expected decay target, got {:?}", other),
        }
    }

    #[test]
    fn test_expansion_stop_hit() {
        let legs = straddle(160.0, 171.0); // combined 331 >= 330
        let mut strat = PremiumExit::new(true, 0.3, 0.3);
        match strat.evaluate(&ctx_for(&legs)) {
            ExitResult::ExitAll(ExitReason::PremiumExpansionSlHit { combined_ltp, .. }) => {
                assert_eq!(combined_ltp, 331.0);
            }
            other => panic!("expected expansion stop, got {:?}", other),
        }
    }

    #[test]
    fn test_between_levels_no_exit() {
        let legs = straddle(148.0, 150.0); // combined 298, nothing extreme per leg
        let mut strat = PremiumExit::new(true, 0.3, 0.3);
        assert_eq!(strat.evaluate(&ctx_for(&legs)), ExitResult::NoExit);
    }

    #[test]
    fn test_adjustment_rule() {
        // Short straddle: CE decayed 150 -> 90 (profit 60 >= 45), PE
        // expanded 150 -> 210 (loss 60 >= 45). Combined 300: inside the
        // 285/330 band, so the adjustment applies.
        let legs = straddle(90.0, 210.0);
        let mut strat = PremiumExit::new(true, 0.3, 0.3);

        match strat.evaluate(&ctx_for(&legs)) {
            ExitResult::AdjustLeg {
                exited_leg_symbol,
                new_leg_type,
                target_premium,
                loss_leg_symbol,
                loss_leg_new_entry_price,
                exited_leg_ltp,
                ..
            } => {
                assert_eq!(exited_leg_symbol, "NIFTY24AUGCE");
                assert_eq!(new_leg_type, OptionType::CE);
                assert_eq!(target_premium, 210.0);
                assert_eq!(loss_leg_symbol, "NIFTY24AUGPE");
                assert_eq!(loss_leg_new_entry_price, 210.0);
                assert_eq!(exited_leg_ltp, 90.0);
            }
            other => panic!("expected adjustment, got {:?}", other),
        }
    }

    #[test]
    fn test_adjustment_needs_both_thresholds() {
        // CE profitable enough but PE loss too small: no adjustment
        let legs = straddle(90.0, 160.0);
        let mut strat = PremiumExit::new(true, 0.3, 0.3);
        assert_eq!(strat.evaluate(&ctx_for(&legs)), ExitResult::NoExit);
    }

    #[test]
    fn test_adjustment_skipped_for_single_leg() {
        let legs = straddle(90.0, 210.0);
        let single = vec![legs[0].clone()];
        let mut strat = PremiumExit::new(true, 0.3, 0.3);
        let mut ctx = ExitContext::new(ExecutionId::generate(), Direction::Short, 0.0, 0.0);
        ctx.reset_for_tick(0.0, 300.0, 10.0, 1_000.0, &single, NaiveDateTime::default());
        assert_eq!(strat.evaluate(&ctx), ExitResult::NoExit);
    }
}

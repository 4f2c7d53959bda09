//! Cumulative-points target and stop-loss
//!
//! Both operate on the context's cumulative P&L (per-contract points,
//! signed by direction) against fixed thresholds. Active only in POINTS
//! and MTM stop-loss modes.

use crate::core::exit::{ExitReason, ExitResult};
use crate::core::types::SlMode;
use crate::monitor::context::ExitContext;

#[derive(Debug, Clone)]
pub struct PointsTargetExit {
    sl_mode: SlMode,
    target_points: f64,
}

impl PointsTargetExit {
    pub fn new(sl_mode: SlMode, target_points: f64) -> Self {
        Self {
            sl_mode,
            target_points,
        }
    }

    #[inline(always)]
    pub fn is_enabled(&self, _ctx: &ExitContext) -> bool {
        matches!(self.sl_mode, SlMode::Points | SlMode::Mtm) && self.target_points > 0.0
    }

    pub fn evaluate(&mut self, ctx: &ExitContext) -> ExitResult {
        if ctx.cumulative_pnl >= self.target_points {
            return ExitResult::ExitAll(ExitReason::CumulativeTargetHit {
                pnl: ctx.cumulative_pnl,
                target: self.target_points,
            });
        }
        ExitResult::NoExit
    }
}

#[derive(Debug, Clone)]
pub struct PointsStopLossExit {
    sl_mode: SlMode,
    stop_loss_points: f64,
}

impl PointsStopLossExit {
    pub fn new(sl_mode: SlMode, stop_loss_points: f64) -> Self {
        Self {
            sl_mode,
            stop_loss_points,
        }
    }

    #[inline(always)]
    pub fn is_enabled(&self, _ctx: &ExitContext) -> bool {
        matches!(self.sl_mode, SlMode::Points | SlMode::Mtm) && self.stop_loss_points > 0.0
    }

    pub fn evaluate(&mut self, ctx: &ExitContext) -> ExitResult {
        if ctx.cumulative_pnl <= -self.stop_loss_points {
            return ExitResult::ExitAll(ExitReason::CumulativeStoplossHit {
                pnl: ctx.cumulative_pnl,
                stop: self.stop_loss_points,
            });
        }
        ExitResult::NoExit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Direction, ExecutionId};
    use chrono::NaiveDateTime;

    fn ctx_with_pnl(pnl: f64) -> ExitContext {
        let mut ctx = ExitContext::new(ExecutionId::generate(), Direction::Long, 15.0, 10.0);
        ctx.reset_for_tick(pnl, 0.0, 0.0, 0.0, &[], NaiveDateTime::default());
        ctx
    }

    #[test]
    fn test_target_hit_at_threshold() {
        let mut strat = PointsTargetExit::new(SlMode::Points, 15.0);
        assert_eq!(strat.evaluate(&ctx_with_pnl(14.99)), ExitResult::NoExit);

        match strat.evaluate(&ctx_with_pnl(15.0)) {
            ExitResult::ExitAll(ExitReason::CumulativeTargetHit { pnl, target }) => {
                assert_eq!(pnl, 15.0);
                assert_eq!(target, 15.0);
            }
            other => panic!("expected target hit, got {:?}", other),
        }
    }

    #[test]
    fn test_stop_hit_below_threshold() {
        let mut strat = PointsStopLossExit::new(SlMode::Points, 10.0);
        assert_eq!(strat.evaluate(&ctx_with_pnl(-9.99)), ExitResult::NoExit);
        assert!(strat.evaluate(&ctx_with_pnl(-11.0)).requires_action());
    }

    #[test]
    fn test_disabled_in_premium_mode() {
        let target = PointsTargetExit::new(SlMode::Premium, 15.0);
        let stop = PointsStopLossExit::new(SlMode::Premium, 10.0);
        let ctx = ctx_with_pnl(100.0);
        assert!(!target.is_enabled(&ctx));
        assert!(!stop.is_enabled(&ctx));
    }

    #[test]
    fn test_disabled_with_zero_threshold() {
        let ctx = ctx_with_pnl(100.0);
        assert!(!PointsTargetExit::new(SlMode::Points, 0.0).is_enabled(&ctx));
        assert!(!PointsStopLossExit::new(SlMode::Mtm, 0.0).is_enabled(&ctx));
    }

    #[test]
    fn test_enabled_in_mtm_mode() {
        let ctx = ctx_with_pnl(0.0);
        assert!(PointsTargetExit::new(SlMode::Mtm, 15.0).is_enabled(&ctx));
        assert!(PointsStopLossExit::new(SlMode::Mtm, 10.0).is_enabled(&ctx));
    }
}

//! Pluggable exit strategies
//!
//! A tagged variant per strategy kind instead of trait objects: the
//! monitor iterates a fixed, priority-sorted array and dispatches with a
//! match, so the hot path carries no virtual calls.
//!
//! Priorities (lower evaluates first):
//!
//! | Strategy              | Priority |
//! |-----------------------|----------|
//! | Time-based forced     | 0        |
//! | Premium decay/expand  | 50       |
//! | Points target         | 100      |
//! | Trailing stop-loss    | 300      |
//! | Points stop-loss      | 400      |
//!
//! Equal priorities are a configuration error; the set constructor
//! rejects them rather than leaving the tie-break undefined.

pub mod points;
pub mod premium;
pub mod time;
pub mod trailing;

pub use points::{PointsStopLossExit, PointsTargetExit};
pub use premium::PremiumExit;
pub use time::TimeForcedExit;
pub use trailing::TrailingStopLoss;

use crate::core::errors::EngineError;
use crate::core::exit::ExitResult;
use crate::monitor::context::ExitContext;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::error;

/// One exit strategy with its configuration and mutable state.
#[derive(Debug, Clone)]
pub enum ExitStrategy {
    TimeForced(TimeForcedExit),
    Premium(PremiumExit),
    PointsTarget(PointsTargetExit),
    Trailing(TrailingStopLoss),
    PointsStop(PointsStopLossExit),
}

impl ExitStrategy {
    /// Evaluation order; lower runs first
    pub const fn priority(&self) -> u16 {
        match self {
            ExitStrategy::TimeForced(_) => 0,
            ExitStrategy::Premium(_) => 50,
            ExitStrategy::PointsTarget(_) => 100,
            ExitStrategy::Trailing(_) => 300,
            ExitStrategy::PointsStop(_) => 400,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            ExitStrategy::TimeForced(_) => "time_based_forced_exit",
            ExitStrategy::Premium(_) => "premium_based_exit",
            ExitStrategy::PointsTarget(_) => "points_based_target",
            ExitStrategy::Trailing(_) => "trailing_stoploss",
            ExitStrategy::PointsStop(_) => "points_based_stoploss",
        }
    }

    #[inline]
    pub fn is_enabled(&self, ctx: &ExitContext) -> bool {
        match self {
            ExitStrategy::TimeForced(s) => s.is_enabled(ctx),
            ExitStrategy::Premium(s) => s.is_enabled(ctx),
            ExitStrategy::PointsTarget(s) => s.is_enabled(ctx),
            ExitStrategy::Trailing(s) => s.is_enabled(ctx),
            ExitStrategy::PointsStop(s) => s.is_enabled(ctx),
        }
    }

    #[inline]
    pub fn evaluate(&mut self, ctx: &ExitContext) -> ExitResult {
        match self {
            ExitStrategy::TimeForced(s) => s.evaluate(ctx),
            ExitStrategy::Premium(s) => s.evaluate(ctx),
            ExitStrategy::PointsTarget(s) => s.evaluate(ctx),
            ExitStrategy::Trailing(s) => s.evaluate(ctx),
            ExitStrategy::PointsStop(s) => s.evaluate(ctx),
        }
    }

    /// Evaluation must be total: a panicking strategy degrades to
    /// `NoExit` with an error log instead of unwinding the tick thread.
    pub fn evaluate_contained(&mut self, ctx: &ExitContext) -> ExitResult {
        let name = self.name();
        match catch_unwind(AssertUnwindSafe(|| self.evaluate(ctx))) {
            Ok(result) => result,
            Err(_) => {
                error!(strategy = name, execution_id = %ctx.execution_id, "exit strategy panicked; treating as NoExit");
                ExitResult::NoExit
            }
        }
    }
}

/// Sort strategies by priority, rejecting duplicates.
pub fn build_priority_set(mut strategies: Vec<ExitStrategy>) -> Result<Vec<ExitStrategy>, EngineError> {
    strategies.sort_by_key(|s| s.priority());
    for pair in strategies.windows(2) {
        if pair[0].priority() == pair[1].priority() {
            return Err(EngineError::ConfigInvalid {
                detail: format!(
                    "duplicate exit strategy priority {} ({} vs {})",
                    pair[0].priority(),
                    pair[0].name(),
                    pair[1].name()
                ),
            });
        }
    }
    Ok(strategies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Direction, ExecutionId, SlMode};
    use chrono::{NaiveDateTime, NaiveTime};

    fn full_set() -> Vec<ExitStrategy> {
        vec![
            ExitStrategy::PointsStop(PointsStopLossExit::new(SlMode::Points, 10.0)),
            ExitStrategy::Trailing(TrailingStopLoss::new(true, 5.0, 2.0)),
            ExitStrategy::TimeForced(TimeForcedExit::new(
                true,
                NaiveTime::from_hms_opt(15, 10, 0).unwrap(),
            )),
            ExitStrategy::PointsTarget(PointsTargetExit::new(SlMode::Points, 15.0)),
            ExitStrategy::Premium(PremiumExit::new(false, 0.3, 0.3)),
        ]
    }

    #[test]
    fn test_priority_ordering() {
        let set = build_priority_set(full_set()).unwrap();
        let priorities: Vec<u16> = set.iter().map(|s| s.priority()).collect();
        assert_eq!(priorities, vec![0, 50, 100, 300, 400]);
    }

    #[test]
    fn test_duplicate_priority_rejected() {
        let set = vec![
            ExitStrategy::Trailing(TrailingStopLoss::new(true, 5.0, 2.0)),
            ExitStrategy::Trailing(TrailingStopLoss::new(true, 8.0, 3.0)),
        ];
        let err = build_priority_set(set).unwrap_err();
        assert_eq!(err.tag(), "CONFIG_INVALID");
    }

    #[test]
    fn test_contained_evaluation_survives_poisoned_input() {
        // NaN cumulative P&L must not fire and must not panic
        let mut ctx = ExitContext::new(ExecutionId::generate(), Direction::Long, 15.0, 10.0);
        ctx.reset_for_tick(f64::NAN, 0.0, 0.0, 0.0, &[], NaiveDateTime::default());

        for strategy in build_priority_set(full_set()).unwrap().iter_mut() {
            if strategy.is_enabled(&ctx) {
                assert_eq!(strategy.evaluate_contained(&ctx), ExitResult::NoExit);
            }
        }
    }
}

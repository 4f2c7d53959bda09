//! Time-based forced exit
//!
//! Highest-priority strategy: once the market-zone time-of-day crosses
//! the configured cutoff, the whole position is squared off regardless
//! of P&L. Fires at most once per monitor.

use crate::core::exit::{ExitReason, ExitResult};
use crate::monitor::context::ExitContext;
use chrono::NaiveTime;

#[derive(Debug, Clone)]
pub struct TimeForcedExit {
    enabled: bool,
    cutoff: NaiveTime,
    fired: bool,
}

impl TimeForcedExit {
    pub fn new(enabled: bool, cutoff: NaiveTime) -> Self {
        Self {
            enabled,
            cutoff,
            fired: false,
        }
    }

    pub fn cutoff(&self) -> NaiveTime {
        self.cutoff
    }

    #[inline(always)]
    pub fn is_enabled(&self, _ctx: &ExitContext) -> bool {
        self.enabled
    }

    pub fn evaluate(&mut self, ctx: &ExitContext) -> ExitResult {
        if self.fired {
            return ExitResult::NoExit;
        }
        if ctx.now.time() >= self.cutoff {
            self.fired = true;
            return ExitResult::ExitAll(ExitReason::TimeForcedExit { cutoff: self.cutoff });
        }
        ExitResult::NoExit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Direction, ExecutionId};
    use chrono::NaiveDate;

    fn ctx_at(h: u32, m: u32) -> ExitContext {
        let mut ctx = ExitContext::new(ExecutionId::generate(), Direction::Short, 0.0, 0.0);
        let now = NaiveDate::from_ymd_opt(2024, 8, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap();
        ctx.reset_for_tick(0.0, 0.0, 0.0, 0.0, &[], now);
        ctx
    }

    fn cutoff() -> NaiveTime {
        NaiveTime::from_hms_opt(15, 10, 0).unwrap()
    }

    #[test]
    fn test_before_cutoff_no_exit() {
        let mut strat = TimeForcedExit::new(true, cutoff());
        assert_eq!(strat.evaluate(&ctx_at(15, 9)), ExitResult::NoExit);
    }

    #[test]
    fn test_fires_at_cutoff() {
        let mut strat = TimeForcedExit::new(true, cutoff());
        let result = strat.evaluate(&ctx_at(15, 10));
        match result {
            ExitResult::ExitAll(reason) => {
                assert_eq!(reason.to_string(), "TIME_BASED_FORCED_EXIT @ 15:10");
            }
            other => panic!("expected ExitAll, got {:?}", other),
        }
    }

    #[test]
    fn test_idempotent_after_firing() {
        let mut strat = TimeForcedExit::new(true, cutoff());
        assert!(strat.evaluate(&ctx_at(15, 10)).requires_action());
        assert_eq!(strat.evaluate(&ctx_at(15, 11)), ExitResult::NoExit);
        assert_eq!(strat.evaluate(&ctx_at(15, 30)), ExitResult::NoExit);
    }

    #[test]
    fn test_disabled() {
        let strat = TimeForcedExit::new(false, cutoff());
        assert!(!strat.is_enabled(&ctx_at(15, 20)));
    }
}

//! Auto-restart scheduling
//!
//! When a monitor completes on a clean target or stop, the scheduler
//! re-executes the same strategy at the next 5-minute boundary in the
//! market zone. One scheduled restart per execution id, a bounded
//! number per user, and every task dies with its user's session.

use crate::config::RestartConfig;
use crate::core::exit::CompletionKind;
use crate::core::types::ExecutionId;
use crate::instruments::Underlying;
use crate::market;
use chrono::NaiveDate;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Paper and live restarts are gated separately
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradingMode {
    Live,
    Paper,
}

/// User context carried onto the scheduled task
#[derive(Debug, Clone)]
pub struct RestartContext {
    pub user_id: String,
    pub strategy_type: String,
    pub underlying: Underlying,
    pub expiry: NaiveDate,
    pub lots: u32,
}

struct ScheduledRestart {
    user_id: String,
    cancelled: Arc<AtomicBool>,
}

struct Inner {
    config: RestartConfig,
    pending: DashMap<ExecutionId, ScheduledRestart>,
    restarts_used: DashMap<String, u32>,
}

#[derive(Clone)]
pub struct RestartScheduler {
    inner: Arc<Inner>,
}

impl RestartScheduler {
    pub fn new(config: RestartConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                pending: DashMap::new(),
                restarts_used: DashMap::new(),
            }),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    pub fn restarts_used(&self, user_id: &str) -> u32 {
        self.inner.restarts_used.get(user_id).map(|c| *c).unwrap_or(0)
    }

    fn mode_allowed(&self, mode: TradingMode) -> bool {
        let config = &self.inner.config;
        config.auto_restart_enabled
            && match mode {
                TradingMode::Live => config.auto_restart_live_enabled,
                TradingMode::Paper => config.auto_restart_paper_enabled,
            }
    }

    /// Schedule a restart for a completed execution. Returns whether a
    /// task was actually scheduled; duplicates, ineligible completions
    /// and exhausted budgets are dropped.
    pub fn schedule(
        &self,
        execution_id: ExecutionId,
        completion: CompletionKind,
        mode: TradingMode,
        ctx: RestartContext,
        action: impl FnOnce(RestartContext) + Send + 'static,
    ) -> bool {
        let delay = market::restart_delay(market::now_in_market_zone());
        self.schedule_with_delay(execution_id, completion, mode, ctx, delay, action)
    }

    /// As `schedule`, with an explicit delay (tests use small ones).
    pub fn schedule_with_delay(
        &self,
        execution_id: ExecutionId,
        completion: CompletionKind,
        mode: TradingMode,
        ctx: RestartContext,
        delay: Duration,
        action: impl FnOnce(RestartContext) + Send + 'static,
    ) -> bool {
        if !completion.restart_eligible() {
            debug!(%execution_id, ?completion, "completion not restart-eligible");
            return false;
        }
        if !self.mode_allowed(mode) {
            debug!(%execution_id, ?mode, "auto-restart disabled for mode");
            return false;
        }
        if self.inner.pending.contains_key(&execution_id) {
            warn!(%execution_id, "duplicate restart request dropped");
            return false;
        }

        {
            let mut used = self.inner.restarts_used.entry(ctx.user_id.clone()).or_insert(0);
            if *used >= self.inner.config.max_auto_restarts {
                info!(
                    user = ctx.user_id,
                    max = self.inner.config.max_auto_restarts,
                    "restart budget exhausted"
                );
                return false;
            }
            *used += 1;
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        self.inner.pending.insert(
            execution_id,
            ScheduledRestart {
                user_id: ctx.user_id.clone(),
                cancelled: Arc::clone(&cancelled),
            },
        );

        info!(
            %execution_id,
            user = ctx.user_id,
            delay_secs = delay.as_secs_f64(),
            "restart scheduled for next 5-minute boundary"
        );

        let inner = Arc::clone(&self.inner);
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            inner.pending.remove(&execution_id);
            if cancelled.load(Ordering::Acquire) {
                info!(%execution_id, "scheduled restart cancelled");
                return;
            }
            action(ctx);
        });
        true
    }

    /// Session invalidation: cancel every pending restart for the user.
    pub fn cancel_user(&self, user_id: &str) {
        let mut cancelled = 0usize;
        for entry in self.inner.pending.iter() {
            if entry.value().user_id == user_id {
                entry.value().cancelled.store(true, Ordering::Release);
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            info!(user = user_id, cancelled, "pending restarts cancelled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    fn ctx(user: &str) -> RestartContext {
        RestartContext {
            user_id: user.to_string(),
            strategy_type: "short_straddle".into(),
            underlying: Underlying::Nifty,
            expiry: NaiveDate::from_ymd_opt(2024, 8, 29).unwrap(),
            lots: 1,
        }
    }

    fn permissive_config() -> RestartConfig {
        RestartConfig {
            auto_restart_enabled: true,
            auto_restart_paper_enabled: true,
            auto_restart_live_enabled: false,
            max_auto_restarts: 2,
        }
    }

    fn wait_for(condition: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_schedule_fires_action() {
        let scheduler = RestartScheduler::new(permissive_config());
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_cb = Arc::clone(&fired);

        let scheduled = scheduler.schedule_with_delay(
            ExecutionId::generate(),
            CompletionKind::TargetHit,
            TradingMode::Paper,
            ctx("user-1"),
            Duration::from_millis(10),
            move |_| {
                fired_cb.fetch_add(1, Ordering::SeqCst);
            },
        );
        assert!(scheduled);
        wait_for(|| fired.load(Ordering::SeqCst) == 1);
        wait_for(|| scheduler.pending_count() == 0);
    }

    #[test]
    fn test_ineligible_completions_dropped() {
        let scheduler = RestartScheduler::new(permissive_config());
        for completion in [
            CompletionKind::TrailingStoplossHit,
            CompletionKind::TimeExit,
            CompletionKind::Failed,
            CompletionKind::Manual,
        ] {
            let scheduled = scheduler.schedule_with_delay(
                ExecutionId::generate(),
                completion,
                TradingMode::Paper,
                ctx("user-1"),
                Duration::from_millis(1),
                |_| {},
            );
            assert!(!scheduled, "{:?} must not restart", completion);
        }
    }

    #[test]
    fn test_mode_gate() {
        let scheduler = RestartScheduler::new(permissive_config());
        // live disabled in the permissive config
        let scheduled = scheduler.schedule_with_delay(
            ExecutionId::generate(),
            CompletionKind::StoplossHit,
            TradingMode::Live,
            ctx("user-1"),
            Duration::from_millis(1),
            |_| {},
        );
        assert!(!scheduled);
    }

    #[test]
    fn test_duplicate_execution_dropped() {
        let scheduler = RestartScheduler::new(permissive_config());
        let execution_id = ExecutionId::generate();

        assert!(scheduler.schedule_with_delay(
            execution_id,
            CompletionKind::TargetHit,
            TradingMode::Paper,
            ctx("user-1"),
            Duration::from_millis(200),
            |_| {},
        ));
        assert!(!scheduler.schedule_with_delay(
            execution_id,
            CompletionKind::TargetHit,
            TradingMode::Paper,
            ctx("user-1"),
            Duration::from_millis(200),
            |_| {},
        ));
    }

    #[test]
    fn test_budget_bound() {
        let scheduler = RestartScheduler::new(permissive_config()); // max 2
        for i in 0..2 {
            assert!(
                scheduler.schedule_with_delay(
                    ExecutionId::generate(),
                    CompletionKind::TargetHit,
                    TradingMode::Paper,
                    ctx("user-1"),
                    Duration::from_millis(1),
                    |_| {},
                ),
                "restart {} within budget",
                i
            );
        }
        assert!(!scheduler.schedule_with_delay(
            ExecutionId::generate(),
            CompletionKind::TargetHit,
            TradingMode::Paper,
            ctx("user-1"),
            Duration::from_millis(1),
            |_| {},
        ));
        assert_eq!(scheduler.restarts_used("user-1"), 2);
    }

    #[test]
    fn test_cancel_user_suppresses_action() {
        let scheduler = RestartScheduler::new(permissive_config());
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_cb = Arc::clone(&fired);

        scheduler.schedule_with_delay(
            ExecutionId::generate(),
            CompletionKind::TargetHit,
            TradingMode::Paper,
            ctx("user-1"),
            Duration::from_millis(100),
            move |_| {
                fired_cb.fetch_add(1, Ordering::SeqCst);
            },
        );
        scheduler.cancel_user("user-1");

        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.pending_count(), 0);
    }
}

//! Position monitor
//!
//! Owns the leg set for one execution, applies tick batches, drives the
//! exit strategies in priority order and dispatches at most one exit
//! action per tick.
//!
//! ## Hot path
//!
//! ```text
//!              update_prices(&[Tick])
//!                       │
//!              active? ──no──► return
//!                       │
//!              snapshot legs-by-token (one Arc clone)
//!                       │
//!              write LTPs (atomic stores, misses dropped)
//!                       │
//!              replacement pending? ──fresh──► return
//!                       │ (expired: clear, continue)
//!                       │
//!              cumulative P&L over cached legs
//!                       │
//!              ctx.reset_for_tick (in place, no alloc)
//!                       │
//!              strategies in priority order ──► first action wins
//!                       │
//!                   dispatch
//! ```
//!
//! The token index is an immutable snapshot republished whole on every
//! leg mutation, so tick threads never observe a half-built index. All
//! evaluation state sits behind one uncontended mutex; the only lock-free
//! writers are the per-leg price cells.

use crate::config::normalize_pct;
use crate::core::errors::EngineError;
use crate::core::exit::{ExitReason, ExitResult};
use crate::core::types::{Direction, ExecutionId, Leg, LegSide, OptionType, SlMode, Tick};
use crate::exit::{
    build_priority_set, ExitStrategy, PointsStopLossExit, PointsTargetExit, PremiumExit,
    TimeForcedExit, TrailingStopLoss,
};
use crate::market;
use crate::monitor::context::ExitContext;
use chrono::{NaiveDateTime, NaiveTime};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// A pending leg replacement expires after this long; the monitor then
/// resumes evaluation (and usually exits on the next tick).
pub const LEG_REPLACEMENT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, Default)]
pub struct TrailingConfig {
    pub enabled: bool,
    pub activation_points: f64,
    pub distance_points: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct ForcedExitConfig {
    pub enabled: bool,
    pub cutoff: NaiveTime,
}

impl Default for ForcedExitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cutoff: market::market_close(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PremiumExitConfig {
    /// Premium strategy also runs when true, irrespective of sl_mode
    pub enabled: bool,
    pub entry_premium: f64,
    pub target_decay_pct: f64,
    pub stop_loss_expansion_pct: f64,
    /// Adjustment rule thresholds, fractions of leg entry price
    pub leg_decay_pct: f64,
    pub leg_expansion_pct: f64,
}

/// Full monitor configuration. Percentages may arrive as whole percents
/// (>= 1.0) or fractions; `normalized()` folds both to fractions.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub execution_id: ExecutionId,
    pub user_id: String,
    pub direction: Direction,
    pub sl_mode: SlMode,
    pub target_points: f64,
    pub stop_loss_points: f64,
    pub trailing: TrailingConfig,
    pub forced_exit: ForcedExitConfig,
    pub premium: PremiumExitConfig,
}

impl MonitorConfig {
    pub fn new(execution_id: ExecutionId, user_id: impl Into<String>, direction: Direction) -> Self {
        Self {
            execution_id,
            user_id: user_id.into(),
            direction,
            sl_mode: SlMode::Points,
            target_points: 0.0,
            stop_loss_points: 0.0,
            trailing: TrailingConfig::default(),
            forced_exit: ForcedExitConfig::default(),
            premium: PremiumExitConfig::default(),
        }
    }

    fn normalized(mut self) -> Self {
        self.premium.target_decay_pct = normalize_pct(self.premium.target_decay_pct);
        self.premium.stop_loss_expansion_pct = normalize_pct(self.premium.stop_loss_expansion_pct);
        self.premium.leg_decay_pct = normalize_pct(self.premium.leg_decay_pct);
        self.premium.leg_expansion_pct = normalize_pct(self.premium.leg_expansion_pct);
        self
    }
}

/// Payload handed to the leg-replacement callback on ADJUST_LEG.
#[derive(Debug, Clone, PartialEq)]
pub struct LegReplacementRequest {
    pub exited_leg_symbol: String,
    pub new_leg_type: OptionType,
    pub target_premium: f64,
    pub loss_leg_symbol: String,
    pub loss_leg_new_entry_price: f64,
    pub exited_leg_ltp: f64,
}

pub type ExitAllFn = dyn Fn(ExecutionId, &ExitReason, f64) + Send + Sync;
pub type ExitLegFn = dyn Fn(ExecutionId, &str, &ExitReason) + Send + Sync;
pub type LegReplacementFn = dyn Fn(ExecutionId, &LegReplacementRequest) + Send + Sync;

/// Owner-supplied reactions to dispatched exits. All optional; a raising
/// callback is logged and swallowed, never unwound into the tick thread.
#[derive(Clone, Default)]
pub struct MonitorCallbacks {
    pub on_exit_all: Option<Arc<ExitAllFn>>,
    pub on_exit_leg: Option<Arc<ExitLegFn>>,
    pub on_leg_replacement: Option<Arc<LegReplacementFn>>,
}

impl MonitorCallbacks {
    pub fn exit_all(mut self, f: impl Fn(ExecutionId, &ExitReason, f64) + Send + Sync + 'static) -> Self {
        self.on_exit_all = Some(Arc::new(f));
        self
    }

    pub fn exit_leg(mut self, f: impl Fn(ExecutionId, &str, &ExitReason) + Send + Sync + 'static) -> Self {
        self.on_exit_leg = Some(Arc::new(f));
        self
    }

    pub fn leg_replacement(
        mut self,
        f: impl Fn(ExecutionId, &LegReplacementRequest) + Send + Sync + 'static,
    ) -> Self {
        self.on_leg_replacement = Some(Arc::new(f));
        self
    }
}

struct PendingReplacement {
    symbol: String,
    started: Instant,
}

/// Evaluation state: everything the tick-thread mutates under one lock.
struct EvalState {
    strategies: Vec<ExitStrategy>,
    ctx: ExitContext,
    /// Authoritative leg list, insertion order, unique symbols
    legs: Vec<Arc<Leg>>,
    entry_premium: f64,
    target_premium_level: f64,
    stop_loss_premium_level: f64,
    /// Candle time injected by the backtest; live uses the wall clock
    simulated_now: Option<NaiveDateTime>,
}

pub struct PositionMonitor {
    config: MonitorConfig,
    callbacks: MonitorCallbacks,
    active: AtomicBool,
    replacement_in_progress: AtomicBool,
    replacement: Mutex<Option<PendingReplacement>>,
    /// Immutable snapshot for the tick path; republished whole on mutation
    by_token: RwLock<Arc<HashMap<u64, Arc<Leg>>>>,
    eval: Mutex<EvalState>,
    exit_reason: Mutex<Option<ExitReason>>,
}

impl PositionMonitor {
    pub fn new(config: MonitorConfig, callbacks: MonitorCallbacks) -> Result<Self, EngineError> {
        let config = config.normalized();

        if config.target_points < 0.0 || config.stop_loss_points < 0.0 {
            return Err(EngineError::ConfigInvalid {
                detail: "target/stop points must be non-negative".into(),
            });
        }
        let premium_active = config.premium.enabled || config.sl_mode == SlMode::Premium;
        if premium_active && config.premium.entry_premium <= 0.0 {
            return Err(EngineError::ConfigInvalid {
                detail: "premium exit requires a positive entry premium".into(),
            });
        }

        let strategies = build_priority_set(vec![
            ExitStrategy::TimeForced(TimeForcedExit::new(
                config.forced_exit.enabled,
                config.forced_exit.cutoff,
            )),
            ExitStrategy::Premium(PremiumExit::new(
                premium_active,
                config.premium.leg_decay_pct,
                config.premium.leg_expansion_pct,
            )),
            ExitStrategy::PointsTarget(PointsTargetExit::new(config.sl_mode, config.target_points)),
            ExitStrategy::Trailing(TrailingStopLoss::new(
                config.trailing.enabled,
                config.trailing.activation_points,
                config.trailing.distance_points,
            )),
            ExitStrategy::PointsStop(PointsStopLossExit::new(
                config.sl_mode,
                config.stop_loss_points,
            )),
        ])?;

        let entry_premium = config.premium.entry_premium;
        let (target_level, stop_level) = premium_levels(
            entry_premium,
            config.premium.target_decay_pct,
            config.premium.stop_loss_expansion_pct,
        );

        let ctx = ExitContext::new(
            config.execution_id,
            config.direction,
            config.target_points,
            config.stop_loss_points,
        );

        info!(
            execution_id = %config.execution_id,
            direction = %config.direction,
            sl_mode = %config.sl_mode,
            target = config.target_points,
            stop = config.stop_loss_points,
            "position monitor created"
        );

        Ok(Self {
            config,
            callbacks,
            active: AtomicBool::new(true),
            replacement_in_progress: AtomicBool::new(false),
            replacement: Mutex::new(None),
            by_token: RwLock::new(Arc::new(HashMap::new())),
            eval: Mutex::new(EvalState {
                strategies,
                ctx,
                legs: Vec::new(),
                entry_premium,
                target_premium_level: target_level,
                stop_loss_premium_level: stop_level,
                simulated_now: None,
            }),
            exit_reason: Mutex::new(None),
        })
    }

    pub fn execution_id(&self) -> ExecutionId {
        self.config.execution_id
    }

    pub fn user_id(&self) -> &str {
        &self.config.user_id
    }

    pub fn direction(&self) -> Direction {
        self.config.direction
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    #[inline(always)]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn is_replacement_in_progress(&self) -> bool {
        self.replacement_in_progress.load(Ordering::Acquire)
    }

    pub fn exit_reason(&self) -> Option<ExitReason> {
        self.exit_reason.lock().clone()
    }

    /// Snapshot of current legs, insertion order
    pub fn legs(&self) -> Vec<Arc<Leg>> {
        self.eval.lock().legs.clone()
    }

    pub fn leg_count(&self) -> usize {
        self.eval.lock().legs.len()
    }

    /// Tokens currently indexed for tick routing
    pub fn instrument_tokens(&self) -> Vec<u64> {
        self.by_token.read().keys().copied().collect()
    }

    pub fn entry_premium(&self) -> f64 {
        self.eval.lock().entry_premium
    }

    pub fn premium_levels(&self) -> (f64, f64) {
        let eval = self.eval.lock();
        (eval.target_premium_level, eval.stop_loss_premium_level)
    }

    /// Cumulative per-contract P&L points at current prices
    pub fn cumulative_pnl(&self) -> f64 {
        cumulative_points(&self.eval.lock().legs, self.config.direction)
    }

    /// Inject the simulated clock; the backtest sets this before every
    /// synthetic tick so the time-based strategy sees candle time.
    pub fn set_simulated_now(&self, now: NaiveDateTime) {
        self.eval.lock().simulated_now = Some(now);
    }

    /// Append a leg. No-op when the symbol is already present.
    #[allow(clippy::too_many_arguments)]
    pub fn add_leg(
        &self,
        order_id: impl Into<String>,
        symbol: impl Into<String>,
        instrument_token: u64,
        entry_price: f64,
        quantity: u32,
        option_type: OptionType,
        side: LegSide,
    ) {
        let symbol = symbol.into();
        let mut eval = self.eval.lock();
        if eval.legs.iter().any(|leg| leg.symbol() == symbol) {
            debug!(symbol, "add_leg ignored: symbol already present");
            return;
        }
        let leg = Arc::new(Leg::new(
            order_id.into(),
            symbol,
            instrument_token,
            entry_price,
            quantity,
            option_type,
            side,
        ));
        eval.legs.push(leg);
        self.publish_token_index(&eval.legs);
    }

    /// Remove a leg by symbol, keeping both indices consistent.
    pub fn remove_leg(&self, symbol: &str) -> Option<Arc<Leg>> {
        let mut eval = self.eval.lock();
        let position = eval.legs.iter().position(|leg| leg.symbol() == symbol)?;
        let removed = eval.legs.remove(position);
        self.publish_token_index(&eval.legs);
        Some(removed)
    }

    /// `add_leg` + entry-premium recompute + replacement-complete signal,
    /// used by the owner when the replacement order has filled.
    #[allow(clippy::too_many_arguments)]
    pub fn add_replacement_leg(
        &self,
        order_id: impl Into<String>,
        symbol: impl Into<String>,
        instrument_token: u64,
        entry_price: f64,
        quantity: u32,
        option_type: OptionType,
        side: LegSide,
    ) {
        let symbol = symbol.into();
        self.add_leg(
            order_id,
            symbol.clone(),
            instrument_token,
            entry_price,
            quantity,
            option_type,
            side,
        );
        self.update_entry_premium_after_leg_replacement();
        self.signal_leg_replacement_complete(&symbol);
    }

    /// Recompute the entry premium as the sum of current leg entry
    /// prices, and the derived target/stop levels with it. The two
    /// levels always change together.
    pub fn update_entry_premium_after_leg_replacement(&self) {
        let mut eval = self.eval.lock();
        let entry_premium: f64 = eval.legs.iter().map(|leg| leg.entry_price()).sum();
        let (target, stop) = premium_levels(
            entry_premium,
            self.config.premium.target_decay_pct,
            self.config.premium.stop_loss_expansion_pct,
        );
        eval.entry_premium = entry_premium;
        eval.target_premium_level = target;
        eval.stop_loss_premium_level = stop;
        info!(
            execution_id = %self.config.execution_id,
            entry_premium,
            target_level = target,
            stop_level = stop,
            "entry premium re-based after leg replacement"
        );
    }

    pub fn signal_leg_replacement_complete(&self, symbol: &str) {
        *self.replacement.lock() = None;
        self.replacement_in_progress.store(false, Ordering::Release);
        info!(
            execution_id = %self.config.execution_id,
            symbol,
            "leg replacement complete; evaluation resumed"
        );
    }

    /// The replacement order failed; evaluation resumes immediately and
    /// the unbalanced position will usually exit on the next tick.
    pub fn signal_leg_replacement_failed(&self, detail: &str) {
        *self.replacement.lock() = None;
        self.replacement_in_progress.store(false, Ordering::Release);
        warn!(
            execution_id = %self.config.execution_id,
            detail,
            "leg replacement failed; evaluation resumed"
        );
    }

    /// Terminal: the monitor never evaluates or dispatches again.
    pub fn stop(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            let mut reason = self.exit_reason.lock();
            if reason.is_none() {
                *reason = Some(ExitReason::ManualExit);
            }
            info!(execution_id = %self.config.execution_id, "monitor stopped");
        }
    }

    /// Hot path: apply a tick batch and evaluate exits.
    pub fn update_prices(&self, ticks: &[Tick]) {
        if !self.active.load(Ordering::Acquire) {
            return;
        }

        // One snapshot read per batch; ticks for unknown tokens are
        // silently dropped.
        let index = self.by_token.read().clone();
        for tick in ticks {
            if let Some(leg) = index.get(&tick.instrument_token) {
                leg.set_current_price(tick.last_price);
            }
        }

        if self.replacement_in_progress.load(Ordering::Acquire) && !self.expire_replacement() {
            return;
        }

        let (action, cumulative) = {
            let mut guard = self.eval.lock();
            let EvalState {
                strategies,
                ctx,
                legs,
                entry_premium,
                target_premium_level,
                stop_loss_premium_level,
                simulated_now,
            } = &mut *guard;

            let cumulative = cumulative_points(legs, self.config.direction);
            let now = simulated_now.unwrap_or_else(market::now_in_market_zone);
            ctx.reset_for_tick(
                cumulative,
                *entry_premium,
                *target_premium_level,
                *stop_loss_premium_level,
                legs,
                now,
            );

            let mut action = ExitResult::NoExit;
            for strategy in strategies.iter_mut() {
                if !strategy.is_enabled(ctx) {
                    continue;
                }
                let result = strategy.evaluate_contained(ctx);
                if result.requires_action() {
                    action = result;
                    break;
                }
            }
            (action, cumulative)
        };

        if action.requires_action() {
            self.dispatch(action, cumulative);
        }
    }

    /// Returns true when a pending replacement has expired (and was
    /// cleared); false when it is still fresh and evaluation must pause.
    fn expire_replacement(&self) -> bool {
        let mut guard = self.replacement.lock();
        match guard.as_ref() {
            Some(pending) if pending.started.elapsed() < LEG_REPLACEMENT_TIMEOUT => false,
            Some(pending) => {
                let err = EngineError::LegReplacementTimeout {
                    symbol: pending.symbol.clone(),
                };
                warn!(execution_id = %self.config.execution_id, %err, "resuming evaluation");
                *guard = None;
                self.replacement_in_progress.store(false, Ordering::Release);
                true
            }
            None => {
                self.replacement_in_progress.store(false, Ordering::Release);
                true
            }
        }
    }

    fn dispatch(&self, action: ExitResult, cumulative_pnl: f64) {
        match action {
            ExitResult::NoExit => {}
            ExitResult::ExitAll(reason) => self.complete(reason, cumulative_pnl),
            ExitResult::ExitLeg { symbol, reason } => {
                if self.remove_leg(&symbol).is_none() {
                    warn!(symbol, "EXIT_LEG for unknown symbol ignored");
                    return;
                }
                self.invoke_exit_leg(&symbol, &reason);
                if self.leg_count() == 0 {
                    self.finish(reason);
                }
            }
            ExitResult::AdjustLeg {
                exited_leg_symbol,
                new_leg_type,
                target_premium,
                loss_leg_symbol,
                loss_leg_new_entry_price,
                exited_leg_ltp,
                reason,
            } => {
                if let Some(loss_leg) = self.find_leg(&loss_leg_symbol) {
                    loss_leg.set_entry_price(loss_leg_new_entry_price);
                } else {
                    warn!(symbol = loss_leg_symbol, "ADJUST_LEG loss leg missing; ignored");
                    return;
                }
                if self.remove_leg(&exited_leg_symbol).is_none() {
                    warn!(symbol = exited_leg_symbol, "ADJUST_LEG exited leg missing; ignored");
                    return;
                }

                self.invoke_exit_leg(&exited_leg_symbol, &reason);

                *self.replacement.lock() = Some(PendingReplacement {
                    symbol: exited_leg_symbol.clone(),
                    started: Instant::now(),
                });
                self.replacement_in_progress.store(true, Ordering::Release);

                let request = LegReplacementRequest {
                    exited_leg_symbol,
                    new_leg_type,
                    target_premium,
                    loss_leg_symbol,
                    loss_leg_new_entry_price,
                    exited_leg_ltp,
                };
                info!(
                    execution_id = %self.config.execution_id,
                    exited = %request.exited_leg_symbol,
                    new_type = %request.new_leg_type,
                    target_premium = request.target_premium,
                    "leg replacement requested; evaluation paused"
                );
                if let Some(cb) = &self.callbacks.on_leg_replacement {
                    let cb = Arc::clone(cb);
                    invoke_contained("leg_replacement", || {
                        cb(self.config.execution_id, &request)
                    });
                }
            }
        }
    }

    fn invoke_exit_leg(&self, symbol: &str, reason: &ExitReason) {
        if let Some(cb) = &self.callbacks.on_exit_leg {
            let cb = Arc::clone(cb);
            invoke_contained("exit_leg", || cb(self.config.execution_id, symbol, reason));
        }
    }

    /// EXIT_ALL: transition to not-active and fire the callback exactly
    /// once; the swap on `active` is the guard.
    fn complete(&self, reason: ExitReason, cumulative_pnl: f64) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        *self.exit_reason.lock() = Some(reason.clone());
        info!(
            execution_id = %self.config.execution_id,
            reason = %reason,
            pnl = cumulative_pnl,
            "position exit dispatched"
        );
        if let Some(cb) = &self.callbacks.on_exit_all {
            let cb = Arc::clone(cb);
            invoke_contained("exit_all", || {
                cb(self.config.execution_id, &reason, cumulative_pnl)
            });
        }
    }

    /// Last leg gone: record the reason and go inactive without firing
    /// the exit-all callback (the leg exit already did the work).
    fn finish(&self, reason: ExitReason) {
        if self.active.swap(false, Ordering::AcqRel) {
            *self.exit_reason.lock() = Some(reason);
            info!(execution_id = %self.config.execution_id, "last leg removed; monitor stopped");
        }
    }

    fn find_leg(&self, symbol: &str) -> Option<Arc<Leg>> {
        self.eval
            .lock()
            .legs
            .iter()
            .find(|leg| leg.symbol() == symbol)
            .cloned()
    }

    fn publish_token_index(&self, legs: &[Arc<Leg>]) {
        let index: HashMap<u64, Arc<Leg>> = legs
            .iter()
            .map(|leg| (leg.instrument_token(), Arc::clone(leg)))
            .collect();
        *self.by_token.write() = Arc::new(index);
    }
}

fn premium_levels(entry_premium: f64, decay_pct: f64, expansion_pct: f64) -> (f64, f64) {
    (
        entry_premium * (1.0 - decay_pct),
        entry_premium * (1.0 + expansion_pct),
    )
}

/// `Σ (current − entry) · direction_multiplier · leg_multiplier`
fn cumulative_points(legs: &[Arc<Leg>], direction: Direction) -> f64 {
    legs.iter()
        .map(|leg| leg.unit_pnl() * direction.multiplier() * leg.side().multiplier())
        .sum()
}

fn invoke_contained(which: &'static str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!(callback = which, "monitor callback panicked; swallowed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn points_config(direction: Direction, target: f64, stop: f64) -> MonitorConfig {
        let mut cfg = MonitorConfig::new(ExecutionId::generate(), "user-1", direction);
        cfg.target_points = target;
        cfg.stop_loss_points = stop;
        cfg
    }

    fn premium_config(entry_premium: f64) -> MonitorConfig {
        let mut cfg = MonitorConfig::new(ExecutionId::generate(), "user-1", Direction::Short);
        cfg.sl_mode = SlMode::Premium;
        cfg.premium = PremiumExitConfig {
            enabled: true,
            entry_premium,
            target_decay_pct: 5.0,      // whole percent on purpose
            stop_loss_expansion_pct: 0.10, // already fractional
            leg_decay_pct: 30.0,
            leg_expansion_pct: 0.30,
        };
        cfg
    }

    #[test]
    fn test_percent_normalization() {
        let monitor = PositionMonitor::new(premium_config(300.0), MonitorCallbacks::default()).unwrap();
        let (target, stop) = monitor.premium_levels();
        assert!((target - 285.0).abs() < 1e-9); // 300 * (1 - 0.05)
        assert!((stop - 330.0).abs() < 1e-9); // 300 * (1 + 0.10)
    }

    #[test]
    fn test_premium_level_ordering_invariant() {
        let monitor = PositionMonitor::new(premium_config(415.0), MonitorCallbacks::default()).unwrap();
        let (target, stop) = monitor.premium_levels();
        assert!(target <= monitor.entry_premium());
        assert!(monitor.entry_premium() <= stop);
    }

    #[test]
    fn test_add_leg_duplicate_symbol_is_noop() {
        let monitor =
            PositionMonitor::new(points_config(Direction::Long, 15.0, 10.0), MonitorCallbacks::default())
                .unwrap();
        monitor.add_leg("O1", "CE", 1, 150.0, 50, OptionType::CE, LegSide::Primary);
        monitor.add_leg("O2", "CE", 99, 999.0, 50, OptionType::CE, LegSide::Primary);
        assert_eq!(monitor.leg_count(), 1);
        assert_eq!(monitor.legs()[0].instrument_token(), 1);
    }

    #[test]
    fn test_remove_leg_keeps_index_consistent() {
        let monitor =
            PositionMonitor::new(points_config(Direction::Long, 15.0, 10.0), MonitorCallbacks::default())
                .unwrap();
        monitor.add_leg("O1", "CE", 1, 150.0, 50, OptionType::CE, LegSide::Primary);
        monitor.add_leg("O2", "PE", 2, 145.0, 50, OptionType::PE, LegSide::Primary);

        monitor.remove_leg("CE");
        assert_eq!(monitor.instrument_tokens(), vec![2]);

        // Tick for the removed token is dropped
        monitor.update_prices(&[Tick::new(1, 500.0)]);
        assert_eq!(monitor.legs()[0].current_price(), 145.0);
    }

    #[test]
    fn test_target_exit_fires_callback_once() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_cb = Arc::clone(&fired);
        let callbacks = MonitorCallbacks::default().exit_all(move |_, reason, pnl| {
            assert_eq!(reason.tag(), "CUMULATIVE_TARGET_HIT");
            assert!(pnl >= 15.0);
            fired_cb.fetch_add(1, Ordering::SeqCst);
        });

        let monitor =
            PositionMonitor::new(points_config(Direction::Long, 15.0, 10.0), callbacks).unwrap();
        monitor.add_leg("O1", "CE", 1, 150.0, 50, OptionType::CE, LegSide::Primary);
        monitor.add_leg("O2", "PE", 2, 145.0, 50, OptionType::PE, LegSide::Primary);

        monitor.update_prices(&[Tick::new(1, 153.0), Tick::new(2, 149.0)]); // +7
        assert!(monitor.is_active());

        monitor.update_prices(&[Tick::new(1, 158.0), Tick::new(2, 153.0)]); // +16
        assert!(!monitor.is_active());
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // Further ticks are ignored and never re-fire
        monitor.update_prices(&[Tick::new(1, 200.0)]);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_short_stoploss() {
        let reason_tag = Arc::new(Mutex::new(String::new()));
        let tag_cb = Arc::clone(&reason_tag);
        let callbacks = MonitorCallbacks::default()
            .exit_all(move |_, reason, _| *tag_cb.lock() = reason.tag().to_string());

        let monitor =
            PositionMonitor::new(points_config(Direction::Short, 15.0, 10.0), callbacks).unwrap();
        monitor.add_leg("O1", "CE", 1, 120.0, 50, OptionType::CE, LegSide::Primary);
        monitor.add_leg("O2", "PE", 2, 115.0, 50, OptionType::PE, LegSide::Primary);

        // Combined premium rises 11 points: cumulative = -11 for a short
        monitor.update_prices(&[Tick::new(1, 126.0), Tick::new(2, 120.0)]);
        assert!(!monitor.is_active());
        assert_eq!(&*reason_tag.lock(), "CUMULATIVE_STOPLOSS_HIT");
    }

    #[test]
    fn test_callback_panic_is_swallowed() {
        let callbacks = MonitorCallbacks::default().exit_all(|_, _, _| panic!("boom"));
        let monitor =
            PositionMonitor::new(points_config(Direction::Long, 5.0, 10.0), callbacks).unwrap();
        monitor.add_leg("O1", "CE", 1, 100.0, 50, OptionType::CE, LegSide::Primary);

        monitor.update_prices(&[Tick::new(1, 110.0)]);
        // Monitor completed despite the panicking callback
        assert!(!monitor.is_active());
        assert_eq!(monitor.exit_reason().unwrap().tag(), "CUMULATIVE_TARGET_HIT");
    }

    #[test]
    fn test_stop_is_terminal() {
        let monitor =
            PositionMonitor::new(points_config(Direction::Long, 5.0, 10.0), MonitorCallbacks::default())
                .unwrap();
        monitor.add_leg("O1", "CE", 1, 100.0, 50, OptionType::CE, LegSide::Primary);
        monitor.stop();
        assert!(!monitor.is_active());
        assert_eq!(monitor.exit_reason().unwrap().tag(), "MANUAL_EXIT");

        monitor.update_prices(&[Tick::new(1, 200.0)]);
        assert_eq!(monitor.exit_reason().unwrap().tag(), "MANUAL_EXIT");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut cfg = points_config(Direction::Long, -1.0, 10.0);
        cfg.target_points = -1.0;
        assert!(PositionMonitor::new(cfg, MonitorCallbacks::default()).is_err());

        let mut cfg = premium_config(0.0);
        cfg.premium.entry_premium = 0.0;
        assert!(PositionMonitor::new(cfg, MonitorCallbacks::default()).is_err());
    }
}

//! Candle-driven backtest engine
//!
//! The engine owns the candle loop, restart/fast-forward alignment and
//! result aggregation; the position monitor is reused unchanged. A
//! [`BacktestStrategy`] decides when to enter and reacts to candle,
//! restart and market-close events through the [`BacktestContext`].
//!
//! Synthetic ticks flow through a real `TickDispatcher` with live
//! subscriptions disabled, so the replay exercises the identical
//! dispatch path as live trading with zero network activity.

use crate::backtest::premium::PremiumEstimator;
use crate::backtest::result::{
    decimal_from_f64, BacktestResult, ChargeModel, LegPrice, TradeEvent, TradeEventType,
    TradeLeg, TradeRecord,
};
use crate::backtest::walk::worst_case_walk;
use crate::core::errors::EngineError;
use crate::core::exit::ExitReason;
use crate::core::types::{Direction, ExecutionId, LegSide, OptionType, SlMode, Tick};
use crate::data::{Candle, CandleInterval, HistoricalSource};
use crate::instruments::Underlying;
use crate::market;
use crate::monitor::dispatcher::{NullTransport, TickDispatcher};
use crate::monitor::position::{
    MonitorCallbacks, MonitorConfig, PositionMonitor, PremiumExitConfig, TrailingConfig,
};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// One backtest run request
#[derive(Debug, Clone)]
pub struct BacktestRequest {
    pub date: NaiveDate,
    pub underlying: Underlying,
    pub expiry: NaiveDate,
    pub lots: u32,
    pub direction: Direction,
    pub sl_mode: SlMode,
    pub target_points: f64,
    pub stop_loss_points: f64,
    pub trailing: TrailingConfig,
    /// Forced square-off time; None disables the time-based exit
    pub square_off: Option<NaiveTime>,
    pub premium: PremiumExitConfig,
    pub candle_interval: CandleInterval,
    pub fast_forward_enabled: bool,
    pub charges_enabled: bool,
    pub max_restarts: u32,
}

impl BacktestRequest {
    pub fn new(date: NaiveDate, underlying: Underlying, expiry: NaiveDate, lots: u32) -> Self {
        Self {
            date,
            underlying,
            expiry,
            lots,
            direction: Direction::Short,
            sl_mode: SlMode::Points,
            target_points: 15.0,
            stop_loss_points: 10.0,
            trailing: TrailingConfig::default(),
            square_off: market::parse_hhmm("15:20"),
            premium: PremiumExitConfig::default(),
            candle_interval: CandleInterval::Minute,
            fast_forward_enabled: true,
            charges_enabled: true,
            max_restarts: 3,
        }
    }
}

/// Strategy hooks driven by the engine's candle loop.
pub trait BacktestStrategy {
    fn name(&self) -> &'static str;

    /// Called once before the loop; a returned error fails the run.
    fn initialize(&mut self, request: &BacktestRequest, ctx: &mut BacktestContext)
        -> Result<(), EngineError>;

    fn on_candle(&mut self, candle: &Candle, ctx: &mut BacktestContext, processed: &[Candle]);

    /// Called on the candle a restart re-enters at (after any
    /// fast-forward alignment).
    fn on_restart(&mut self, candle: &Candle, ctx: &mut BacktestContext);

    fn on_market_close(&mut self, candle: &Candle, ctx: &mut BacktestContext);
}

/// One leg of a position entry
#[derive(Debug, Clone)]
pub struct EntryLeg {
    pub symbol: String,
    pub instrument_token: u64,
    pub entry_price: f64,
    pub quantity: u32,
    pub option_type: OptionType,
    pub side: LegSide,
}

#[derive(Default)]
struct ExitCapture {
    exits: Mutex<Vec<(ExitReason, f64)>>,
}

struct OpenTrade {
    entry_time: NaiveDateTime,
    /// symbol -> (quantity, entry price); survives entry rewrites
    entries: HashMap<String, (u32, f64)>,
}

/// Mutable replay state handed to the strategy hooks.
pub struct BacktestContext {
    request: BacktestRequest,
    dispatcher: Arc<TickDispatcher>,
    monitor: Option<Arc<PositionMonitor>>,
    estimator: Option<Box<dyn PremiumEstimator>>,
    capture: Arc<ExitCapture>,
    charge_model: Option<Arc<dyn ChargeModel>>,
    events: Vec<TradeEvent>,
    trades: Vec<TradeRecord>,
    open_trade: Option<OpenTrade>,
    restart_requested_at: Option<NaiveDateTime>,
    restart_count: u32,
}

impl BacktestContext {
    fn new(request: BacktestRequest, charge_model: Option<Arc<dyn ChargeModel>>) -> Self {
        let dispatcher = Arc::new(TickDispatcher::new("backtest", Arc::new(NullTransport)));
        dispatcher.set_live_subscriptions(false);
        Self {
            request,
            dispatcher,
            monitor: None,
            estimator: None,
            capture: Arc::new(ExitCapture::default()),
            charge_model,
            events: Vec::new(),
            trades: Vec::new(),
            open_trade: None,
            restart_requested_at: None,
            restart_count: 0,
        }
    }

    pub fn request(&self) -> &BacktestRequest {
        &self.request
    }

    pub fn monitor(&self) -> Option<&Arc<PositionMonitor>> {
        self.monitor.as_ref()
    }

    pub fn has_open_position(&self) -> bool {
        self.monitor.as_ref().is_some_and(|m| m.is_active())
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn restart_count(&self) -> u32 {
        self.restart_count
    }

    /// Open a position: build the monitor from the request, register it
    /// with the dispatcher and record the ENTRY event.
    pub fn enter_position(
        &mut self,
        at: NaiveDateTime,
        legs: Vec<EntryLeg>,
        entry_premium: f64,
        estimator: Box<dyn PremiumEstimator>,
    ) -> Result<(), EngineError> {
        if self.has_open_position() {
            return Err(EngineError::ConfigInvalid {
                detail: "position already open".into(),
            });
        }

        let mut config = MonitorConfig::new(ExecutionId::generate(), "backtest", self.request.direction);
        config.sl_mode = self.request.sl_mode;
        config.target_points = self.request.target_points;
        config.stop_loss_points = self.request.stop_loss_points;
        config.trailing = self.request.trailing;
        if let Some(cutoff) = self.request.square_off {
            config.forced_exit.enabled = true;
            config.forced_exit.cutoff = cutoff;
        } else {
            config.forced_exit.enabled = false;
        }
        config.premium = self.request.premium;
        config.premium.entry_premium = entry_premium;

        let capture = Arc::new(ExitCapture::default());
        let capture_cb = Arc::clone(&capture);
        let callbacks = MonitorCallbacks::default().exit_all(move |_, reason, pnl| {
            capture_cb.exits.lock().push((reason.clone(), pnl));
        });

        let monitor = Arc::new(PositionMonitor::new(config, callbacks)?);
        let mut entries = HashMap::new();
        for leg in &legs {
            monitor.add_leg(
                format!("BT-{}", leg.symbol),
                leg.symbol.clone(),
                leg.instrument_token,
                leg.entry_price,
                leg.quantity,
                leg.option_type,
                leg.side,
            );
            entries.insert(leg.symbol.clone(), (leg.quantity, leg.entry_price));
        }
        monitor.set_simulated_now(at);
        self.dispatcher.start_monitoring(Arc::clone(&monitor));

        info!(
            execution_id = %monitor.execution_id(),
            at = %at,
            legs = legs.len(),
            entry_premium,
            "backtest position entered"
        );

        self.events.push(TradeEvent {
            timestamp: at,
            event_type: TradeEventType::Entry,
            leg_prices: legs
                .iter()
                .map(|leg| LegPrice {
                    symbol: leg.symbol.clone(),
                    price: leg.entry_price,
                })
                .collect(),
            cumulative_pnl: 0.0,
            unrealized_pnl: 0.0,
        });

        self.open_trade = Some(OpenTrade {
            entry_time: at,
            entries,
        });
        self.capture = capture;
        self.monitor = Some(monitor);
        self.estimator = Some(estimator);
        Ok(())
    }

    /// Walk the candle's worst-case price points through the monitor.
    /// Returns the exit reason when the position closed on this candle.
    pub fn step_candle(&mut self, candle: &Candle) -> Option<ExitReason> {
        let monitor = Arc::clone(self.monitor.as_ref()?);
        if !monitor.is_active() {
            return None;
        }
        let legs = monitor.legs();
        if legs.is_empty() {
            return None;
        }

        {
            let estimator = self.estimator.as_ref()?;
            let walk = worst_case_walk(candle, monitor.direction());
            let mut ticks: Vec<Tick> = Vec::with_capacity(legs.len());

            for spot in walk {
                monitor.set_simulated_now(candle.timestamp);
                let combined = estimator.combined(spot, candle.timestamp);
                let per_leg = estimator.leg_price(combined, legs.len());

                ticks.clear();
                ticks.extend(legs.iter().map(|leg| Tick::new(leg.instrument_token(), per_leg)));
                self.dispatcher.on_tick_batch(&ticks);

                // First exit terminates the intra-candle walk
                if !monitor.is_active() {
                    break;
                }
            }
        }

        self.push_event(candle.timestamp, TradeEventType::Tick, &monitor);

        let captured = {
            let mut exits = self.capture.exits.lock();
            let first = exits.drain(..).next();
            first
        };
        if let Some((reason, pnl)) = captured {
            self.push_event(candle.timestamp, TradeEventType::Exit, &monitor);
            self.close_trade(candle.timestamp, &monitor, &reason, pnl);
            return Some(reason);
        }

        // Stopped without an exit-all callback (e.g. last leg removed)
        if !monitor.is_active() {
            let reason = monitor.exit_reason().unwrap_or(ExitReason::ManualExit);
            let pnl = monitor.cumulative_pnl();
            self.push_event(candle.timestamp, TradeEventType::Exit, &monitor);
            self.close_trade(candle.timestamp, &monitor, &reason, pnl);
            return Some(reason);
        }

        None
    }

    /// Square off an open position at current prices (market close).
    pub fn square_off(&mut self, candle: &Candle) -> Option<ExitReason> {
        let monitor = Arc::clone(self.monitor.as_ref()?);
        if !monitor.is_active() {
            return None;
        }
        let reason = ExitReason::TimeForcedExit {
            cutoff: candle.timestamp.time(),
        };
        let pnl = monitor.cumulative_pnl();
        monitor.stop();
        self.push_event(candle.timestamp, TradeEventType::Exit, &monitor);
        self.close_trade(candle.timestamp, &monitor, &reason, pnl);
        Some(reason)
    }

    /// Ask for a restart at the next 5-minute boundary after `at`.
    /// Ignored once the restart budget is spent.
    pub fn request_restart(&mut self, at: NaiveDateTime) {
        if self.restart_count >= self.request.max_restarts {
            debug!(
                restarts = self.restart_count,
                "restart budget exhausted; request ignored"
            );
            return;
        }
        self.restart_requested_at = Some(at);
    }

    fn take_restart_request(&mut self) -> Option<NaiveDateTime> {
        self.restart_requested_at.take()
    }

    fn note_restart(&mut self, candle: &Candle) {
        self.restart_count += 1;
        self.events.push(TradeEvent {
            timestamp: candle.timestamp,
            event_type: TradeEventType::Restart,
            leg_prices: Vec::new(),
            cumulative_pnl: 0.0,
            unrealized_pnl: 0.0,
        });
        info!(at = %candle.timestamp, count = self.restart_count, "backtest restart");
    }

    fn push_event(&mut self, timestamp: NaiveDateTime, event_type: TradeEventType, monitor: &PositionMonitor) {
        let legs = monitor.legs();
        let cumulative = monitor.cumulative_pnl();
        self.events.push(TradeEvent {
            timestamp,
            event_type,
            leg_prices: legs
                .iter()
                .map(|leg| LegPrice {
                    symbol: leg.symbol().to_string(),
                    price: leg.current_price(),
                })
                .collect(),
            cumulative_pnl: cumulative,
            unrealized_pnl: position_amount(monitor),
        });
    }

    fn close_trade(
        &mut self,
        exit_time: NaiveDateTime,
        monitor: &Arc<PositionMonitor>,
        reason: &ExitReason,
        pnl_points: f64,
    ) {
        let Some(open) = self.open_trade.take() else {
            return;
        };

        let direction = monitor.direction();
        let mut trade_legs = Vec::new();
        let mut buy_value = Decimal::ZERO;
        let mut sell_value = Decimal::ZERO;
        let mut gross = 0.0f64;

        for leg in monitor.legs() {
            let (quantity, entry_price) = open
                .entries
                .get(leg.symbol())
                .copied()
                .unwrap_or((leg.quantity(), leg.entry_price()));
            let exit_price = leg.current_price();
            let qty = quantity as f64;

            let signed = direction.multiplier() * leg.side().multiplier();
            gross += (exit_price - entry_price) * signed * qty;

            let entry_value = decimal_from_f64(entry_price * qty);
            let exit_value = decimal_from_f64(exit_price * qty);
            if signed < 0.0 {
                // Entered on the sell side, exits with a buy-back
                sell_value += entry_value;
                buy_value += exit_value;
            } else {
                buy_value += entry_value;
                sell_value += exit_value;
            }

            trade_legs.push(TradeLeg {
                symbol: leg.symbol().to_string(),
                quantity,
                entry_price,
                exit_price,
            });
        }

        let gross_amount = decimal_from_f64(gross);
        let charges = match (&self.charge_model, self.request.charges_enabled) {
            (Some(model), true) => {
                model.round_trip_charges(buy_value, sell_value, trade_legs.len() as u32 * 2)
            }
            _ => Decimal::ZERO,
        };

        self.trades.push(TradeRecord {
            entry_time: open.entry_time,
            exit_time,
            direction,
            legs: trade_legs,
            exit_reason: reason.to_string(),
            completion: reason.completion(),
            pnl_points,
            gross_amount,
            charges,
            net_amount: gross_amount - charges,
        });

        self.dispatcher.stop_monitoring(monitor.execution_id());
        self.monitor = None;
        self.estimator = None;
    }

    fn into_outputs(self) -> (Vec<TradeRecord>, Vec<TradeEvent>, u32) {
        (self.trades, self.events, self.restart_count)
    }
}

/// Signed position value in currency: points times quantity per leg
fn position_amount(monitor: &PositionMonitor) -> f64 {
    let direction = monitor.direction();
    monitor
        .legs()
        .iter()
        .map(|leg| leg.unit_pnl() * direction.multiplier() * leg.side().multiplier() * leg.quantity() as f64)
        .sum()
}

pub struct BacktestEngine {
    history: Arc<dyn HistoricalSource>,
    charge_model: Option<Arc<dyn ChargeModel>>,
}

impl BacktestEngine {
    pub fn new(history: Arc<dyn HistoricalSource>) -> Self {
        Self {
            history,
            charge_model: None,
        }
    }

    pub fn with_charge_model(mut self, model: Arc<dyn ChargeModel>) -> Self {
        self.charge_model = Some(model);
        self
    }

    /// Run one backtest to completion. Failures are captured into the
    /// result; a partially-processed run never reports Completed.
    pub fn run(&self, request: BacktestRequest, strategy: &mut dyn BacktestStrategy) -> BacktestResult {
        let id = Uuid::new_v4().to_string();
        let started = Instant::now();
        let date = request.date;
        let underlying = request.underlying.to_string();

        info!(run_id = id, %date, underlying, strategy = strategy.name(), "backtest starting");

        match self.run_inner(&request, strategy) {
            Ok((trades, events, restarts)) => {
                let elapsed = started.elapsed().as_millis() as u64;
                info!(run_id = id, trades = trades.len(), restarts, elapsed_ms = elapsed, "backtest completed");
                BacktestResult::completed(id, date, underlying, trades, events, restarts, elapsed)
            }
            Err(e) => {
                let elapsed = started.elapsed().as_millis() as u64;
                error!(run_id = id, error = %e, "backtest failed");
                BacktestResult::failed(id, date, underlying, e.to_string(), elapsed)
            }
        }
    }

    fn run_inner(
        &self,
        request: &BacktestRequest,
        strategy: &mut dyn BacktestStrategy,
    ) -> Result<(Vec<TradeRecord>, Vec<TradeEvent>, u32), EngineError> {
        if !self.history.has_data_for(request.date) {
            return Err(EngineError::DataUnavailable {
                detail: format!("no historical data for {}", request.date),
            });
        }

        let candles = self.history.session_candles(request.date, request.candle_interval)?;
        let session: Vec<Candle> = candles
            .into_iter()
            .filter(|c| c.timestamp.time() >= market::market_open())
            .collect();
        if session.is_empty() {
            return Err(EngineError::DataUnavailable {
                detail: format!("no session candles for {}", request.date),
            });
        }

        let mut ctx = BacktestContext::new(request.clone(), self.charge_model.clone());
        strategy.initialize(request, &mut ctx)?;

        let mut processed: Vec<Candle> = Vec::with_capacity(session.len());
        let mut index = 0usize;
        let mut closed = false;

        while index < session.len() {
            if let Some(trigger_at) = ctx.take_restart_request() {
                if request.fast_forward_enabled {
                    let boundary = market::next_5min_boundary(trigger_at);
                    if boundary <= trigger_at {
                        // Triggered exactly on a boundary: no advance
                        let candle = session[index];
                        ctx.note_restart(&candle);
                        strategy.on_restart(&candle, &mut ctx);
                    } else if let Some(offset) =
                        session[index..].iter().position(|c| c.timestamp >= boundary)
                    {
                        index += offset;
                        let candle = session[index];
                        ctx.note_restart(&candle);
                        strategy.on_restart(&candle, &mut ctx);
                    } else {
                        warn!(%boundary, "no candle on or after restart boundary; restart abandoned");
                    }
                } else {
                    let candle = session[index];
                    ctx.note_restart(&candle);
                    strategy.on_restart(&candle, &mut ctx);
                }
            }

            let candle = session[index];
            if candle.timestamp.time() >= market::market_close() {
                strategy.on_market_close(&candle, &mut ctx);
                closed = true;
                break;
            }

            processed.push(candle);
            strategy.on_candle(&candle, &mut ctx, &processed);
            index += 1;
        }

        if !closed {
            if let Some(last) = session.last() {
                strategy.on_market_close(last, &mut ctx);
            }
        }

        Ok(ctx.into_outputs())
    }
}

//! Backtest results: events, trade records, aggregate statistics and
//! the process-wide result cache.

use crate::core::exit::CompletionKind;
use crate::core::types::Direction;
use chrono::NaiveDateTime;
use dashmap::DashMap;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};

/// Charge computation over one completed round trip. The engine treats
/// the coefficients as opaque; implementations live with the strategy
/// crates.
pub trait ChargeModel: Send + Sync {
    /// Total charges for a round trip with the given buy-side and
    /// sell-side traded values and number of executed orders.
    fn round_trip_charges(&self, buy_value: Decimal, sell_value: Decimal, executed_orders: u32) -> Decimal;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeEventType {
    Entry,
    Tick,
    Exit,
    Restart,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegPrice {
    pub symbol: String,
    pub price: f64,
}

/// Immutable replay event; appended by the engine, destroyed only with
/// the containing result cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    pub timestamp: NaiveDateTime,
    pub event_type: TradeEventType,
    pub leg_prices: Vec<LegPrice>,
    pub cumulative_pnl: f64,
    pub unrealized_pnl: f64,
}

/// Per-leg entry/exit snapshot on a completed trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeLeg {
    pub symbol: String,
    pub quantity: u32,
    pub entry_price: f64,
    pub exit_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub entry_time: NaiveDateTime,
    pub exit_time: NaiveDateTime,
    pub direction: Direction,
    pub legs: Vec<TradeLeg>,
    pub exit_reason: String,
    pub completion: CompletionKind,
    pub pnl_points: f64,
    pub gross_amount: Decimal,
    pub charges: Decimal,
    pub net_amount: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BacktestStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub id: String,
    pub status: BacktestStatus,
    pub error_message: Option<String>,
    pub date: chrono::NaiveDate,
    pub underlying: String,

    pub total_pnl_points: f64,
    pub gross_pnl_amount: Decimal,
    pub total_charges: Decimal,
    pub net_pnl_amount: Decimal,

    pub trades: Vec<TradeRecord>,
    pub events: Vec<TradeEvent>,

    pub win_count: usize,
    pub loss_count: usize,
    pub win_rate: f64,
    /// Largest equity-curve fall, percent of the preceding peak
    pub max_drawdown_pct: f64,
    /// Highest equity point, percent of the total traded entry value
    pub max_profit_pct: f64,
    pub avg_win_amount: Decimal,
    pub avg_loss_amount: Decimal,
    pub profit_factor: f64,

    pub restart_count: u32,
    pub elapsed_ms: u64,
}

impl BacktestResult {
    pub fn failed(
        id: String,
        date: chrono::NaiveDate,
        underlying: String,
        error_message: String,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            id,
            status: BacktestStatus::Failed,
            error_message: Some(error_message),
            date,
            underlying,
            total_pnl_points: 0.0,
            gross_pnl_amount: Decimal::ZERO,
            total_charges: Decimal::ZERO,
            net_pnl_amount: Decimal::ZERO,
            trades: Vec::new(),
            events: Vec::new(),
            win_count: 0,
            loss_count: 0,
            win_rate: 0.0,
            max_drawdown_pct: 0.0,
            max_profit_pct: 0.0,
            avg_win_amount: Decimal::ZERO,
            avg_loss_amount: Decimal::ZERO,
            profit_factor: 0.0,
            restart_count: 0,
            elapsed_ms,
        }
    }

    /// Aggregate the per-trade outcomes into a completed result.
    pub fn completed(
        id: String,
        date: chrono::NaiveDate,
        underlying: String,
        trades: Vec<TradeRecord>,
        events: Vec<TradeEvent>,
        restart_count: u32,
        elapsed_ms: u64,
    ) -> Self {
        let total_pnl_points: f64 = trades.iter().map(|t| t.pnl_points).sum();
        let gross_pnl_amount: Decimal = trades.iter().map(|t| t.gross_amount).sum();
        let total_charges: Decimal = trades.iter().map(|t| t.charges).sum();
        let net_pnl_amount: Decimal = trades.iter().map(|t| t.net_amount).sum();

        let wins: Vec<Decimal> = trades
            .iter()
            .filter(|t| t.net_amount > Decimal::ZERO)
            .map(|t| t.net_amount)
            .collect();
        let losses: Vec<Decimal> = trades
            .iter()
            .filter(|t| t.net_amount < Decimal::ZERO)
            .map(|t| t.net_amount)
            .collect();

        let win_count = wins.len();
        let loss_count = losses.len();
        let win_rate = if trades.is_empty() {
            0.0
        } else {
            win_count as f64 / trades.len() as f64
        };

        let gross_profit: Decimal = wins.iter().copied().sum();
        let gross_loss: Decimal = -losses.iter().copied().sum::<Decimal>();
        let profit_factor = if gross_loss > Decimal::ZERO {
            decimal_to_f64(gross_profit) / decimal_to_f64(gross_loss)
        } else if gross_profit > Decimal::ZERO {
            f64::INFINITY
        } else {
            0.0
        };

        let avg_win_amount = if win_count > 0 {
            gross_profit / Decimal::from(win_count as u64)
        } else {
            Decimal::ZERO
        };
        let avg_loss_amount = if loss_count > 0 {
            -gross_loss / Decimal::from(loss_count as u64)
        } else {
            Decimal::ZERO
        };

        let (max_drawdown_pct, max_profit_pct) = equity_extremes(&trades);

        Self {
            id,
            status: BacktestStatus::Completed,
            error_message: None,
            date,
            underlying,
            total_pnl_points,
            gross_pnl_amount,
            total_charges,
            net_pnl_amount,
            trades,
            events,
            win_count,
            loss_count,
            win_rate,
            max_drawdown_pct,
            max_profit_pct,
            avg_win_amount,
            avg_loss_amount,
            profit_factor,
            restart_count,
            elapsed_ms,
        }
    }
}

/// Walk the equity curve of net trade amounts: max drawdown relative to
/// the running peak, max profit relative to total entry value.
fn equity_extremes(trades: &[TradeRecord]) -> (f64, f64) {
    let mut equity = 0.0f64;
    let mut peak = 0.0f64;
    let mut max_drawdown = 0.0f64;

    for trade in trades {
        equity += decimal_to_f64(trade.net_amount);
        peak = peak.max(equity);
        max_drawdown = max_drawdown.max(peak - equity);
    }

    let entry_value: f64 = trades
        .iter()
        .flat_map(|t| t.legs.iter())
        .map(|leg| leg.entry_price * leg.quantity as f64)
        .sum();

    let drawdown_pct = if peak > 0.0 {
        max_drawdown / peak * 100.0
    } else if max_drawdown > 0.0 {
        100.0
    } else {
        0.0
    };
    let profit_pct = if entry_value > 0.0 {
        peak / entry_value * 100.0
    } else {
        0.0
    };
    (drawdown_pct, profit_pct)
}

fn decimal_to_f64(value: Decimal) -> f64 {
    use rust_decimal::prelude::ToPrimitive;
    value.to_f64().unwrap_or(0.0)
}

pub fn decimal_from_f64(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or(Decimal::ZERO)
}

/// Process-wide cache of finished results, keyed by run id. Backing
/// store for the result/list/delete operations of the REST surface.
#[derive(Default)]
pub struct ResultCache {
    results: DashMap<String, Arc<BacktestResult>>,
}

static GLOBAL_CACHE: OnceLock<ResultCache> = OnceLock::new();

impl ResultCache {
    pub fn global() -> &'static ResultCache {
        GLOBAL_CACHE.get_or_init(ResultCache::default)
    }

    pub fn insert(&self, result: BacktestResult) -> Arc<BacktestResult> {
        let result = Arc::new(result);
        self.results.insert(result.id.clone(), Arc::clone(&result));
        result
    }

    pub fn get(&self, id: &str) -> Option<Arc<BacktestResult>> {
        self.results.get(id).map(|r| Arc::clone(r.value()))
    }

    pub fn list_ids(&self) -> Vec<String> {
        self.results.iter().map(|r| r.key().clone()).collect()
    }

    pub fn clear(&self) -> usize {
        let count = self.results.len();
        self.results.clear();
        count
    }
}

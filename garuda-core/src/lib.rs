//! Garuda Core - Position Monitoring and Exit Decision Engine
//!
//! Runtime core of an intraday Indian-index options bot. Streaming
//! price updates mutate leg state, and a priority-ordered set of exit
//! strategies decides whether the position (or one leg) is closed,
//! adjusted, or left alone. The candle-driven backtest replays history
//! through the identical monitor.
//!
//! ## Architecture
//! - **Lock-free tick path**: per-leg atomic price cells, token index
//!   republished whole, no allocation in steady state
//! - **Tagged-variant strategies**: priority-ordered matches, no
//!   virtual calls on the hot path
//! - **Same engine live and replayed**: the backtest feeds synthetic
//!   ticks through a real dispatcher with live subscriptions disabled
//! - **Total evaluation**: strategy panics and callback panics degrade
//!   to no-ops with a log line, never an unwound tick thread
//!
//! ## Core Modules
//! - `core`: legs, exit results/reasons, boundary errors
//! - `exit`: the exit strategy variants (time, premium, points, trailing)
//! - `monitor`: position monitor, evaluation context, tick dispatcher
//! - `backtest`: candle loop, worst-case OHLC walk, results
//! - `instruments`: ATM resolution and the dump cache
//! - `execution`: order gateway abstraction, basket rollback, journal
//! - `schedule`: 5-minute-boundary auto-restart
//! - `risk`: per-endpoint broker rate limiting
//! - `market`: market zone and session arithmetic
//! - `resilience`: reconnect backoff, panic hook
//! - `config` / `monitoring` / `utils`: ambient stack

pub mod backtest;
pub mod config;
pub mod core;
pub mod data;
pub mod execution;
pub mod exit;
pub mod instruments;
pub mod market;
pub mod monitor;
pub mod monitoring;
pub mod resilience;
pub mod risk;
pub mod schedule;
pub mod testing;
pub mod utils;

pub use crate::core::{
    CompletionKind, Direction, EngineError, ExecutionId, ExitReason, ExitResult, Leg, LegSide,
    OptionType, SlMode, Tick,
};
pub use monitor::{MonitorCallbacks, MonitorConfig, PositionMonitor, TickDispatcher};

pub use anyhow::{Error, Result};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::backtest::{BacktestEngine, BacktestRequest, BacktestResult, BacktestStrategy};
    pub use crate::core::{
        CompletionKind, Direction, EngineError, ExecutionId, ExitReason, ExitResult, Leg,
        LegSide, OptionType, SlMode, Tick,
    };
    pub use crate::data::{Candle, CandleInterval, HistoricalSource};
    pub use crate::execution::OrderGateway;
    pub use crate::instruments::Underlying;
    pub use crate::monitor::{MonitorCallbacks, MonitorConfig, PositionMonitor, TickDispatcher};
    pub use crate::{Error, Result};
}

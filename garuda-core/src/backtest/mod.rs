//! Backtest replay engine
//!
//! Replays historical index candles through the same PositionMonitor
//! used live. Per candle, prices are walked in a worst-case order (the
//! adverse extreme before the close), synthetic per-leg premiums are
//! derived from the spot, and the exit strategies run unchanged. On a
//! qualifying completion the loop fast-forwards to the next 5-minute
//! boundary and re-enters.
//!
//! ```text
//!   candle stream ──► BacktestEngine ──► worst-case walk
//!                                            │ synthetic ticks
//!                                            ▼
//!                      TickDispatcher (live subs disabled)
//!                                            │
//!                                            ▼
//!                              PositionMonitor (unchanged)
//!                                            │ exit events
//!                                            ▼
//!                        TradeRecords ──► BacktestResult
//! ```

pub mod engine;
pub mod premium;
pub mod result;
pub mod walk;

pub use engine::{BacktestContext, BacktestEngine, BacktestRequest, BacktestStrategy, EntryLeg};
pub use premium::{PremiumEstimator, RecordedPremiums, StraddleEstimator};
pub use result::{
    BacktestResult, BacktestStatus, ChargeModel, LegPrice, ResultCache, TradeEvent,
    TradeEventType, TradeLeg, TradeRecord,
};
pub use walk::worst_case_walk;

//! Garuda Strategies - entry strategies and the charge model
//!
//! Strategy implementations live apart from the core so the engine
//! stays generic over [`garuda_core::backtest::BacktestStrategy`] and
//! binaries compose the pair they need.

pub mod charges;
pub mod short_straddle;
pub mod test_helpers;

pub use charges::{ChargesBreakdown, IndianOptionsCharges};
pub use short_straddle::{ShortStraddleStrategy, StraddlePricing};

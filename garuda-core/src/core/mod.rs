//! Core types shared across the engine
//!
//! - `types`: legs, directions, ticks, atomic price cells
//! - `exit`: exit results, reasons and completion buckets
//! - `errors`: boundary error tags

pub mod errors;
pub mod exit;
pub mod types;

pub use errors::EngineError;
pub use exit::{CompletionKind, ExitReason, ExitResult};
pub use types::{AtomicPrice, Direction, ExecutionId, Leg, LegSide, OptionType, SlMode, Tick};

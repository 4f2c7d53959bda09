//! Intra-candle worst-case price sequencing
//!
//! A candle only records O/H/L/C, not the path between them. The replay
//! walks four price points per candle, ordered so the adverse extreme is
//! visited before the close: a stop that would have been touched
//! mid-candle fires mid-candle, never optimistically at the close.

use crate::core::types::Direction;
use crate::data::Candle;

/// Price sequence for one candle.
///
/// SHORT positions walk the natural candle path (bullish `O,L,H,C`,
/// bearish `O,H,L,C`) which puts the adverse high before the close;
/// LONG positions use the mirrored orderings so the adverse low comes
/// first instead.
pub fn worst_case_walk(candle: &Candle, direction: Direction) -> [f64; 4] {
    match (direction, candle.is_bullish()) {
        (Direction::Short, true) => [candle.open, candle.low, candle.high, candle.close],
        (Direction::Short, false) => [candle.open, candle.high, candle.low, candle.close],
        (Direction::Long, true) => [candle.open, candle.high, candle.low, candle.close],
        (Direction::Long, false) => [candle.open, candle.low, candle.high, candle.close],
    }
}

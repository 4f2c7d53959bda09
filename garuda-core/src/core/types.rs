//! Core types for the position engine
//!
//! All types in this module are designed for:
//! - Copy semantics where possible
//! - Single-writer atomic price fields (no mutex on the tick path)
//! - Minimal memory footprint

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Unique identifier for one monitored execution (a multi-leg position).
///
/// Wraps a UUID so identifiers are stable across restarts and safe to
/// use as map keys in the dispatcher and scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(Uuid);

impl ExecutionId {
    /// Generate a fresh random execution id
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Option contract type
///
/// Single byte enum for minimal size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum OptionType {
    /// Call European
    CE = 0,
    /// Put European
    PE = 1,
}

impl OptionType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            OptionType::CE => "CE",
            OptionType::PE => "PE",
        }
    }
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Monitor direction: LONG buys premium, SHORT sells it.
///
/// The multiplier flips per-leg P&L so that a favourable move is always
/// positive cumulative points regardless of direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Direction {
    Long = 0,
    Short = 1,
}

impl Direction {
    #[inline(always)]
    pub const fn multiplier(&self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// Per-leg side relative to the monitor direction.
///
/// A hedge leg carries the opposite sign: its gains offset primary-leg
/// losses in the cumulative P&L.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum LegSide {
    Primary = 0,
    Hedge = 1,
}

impl LegSide {
    #[inline(always)]
    pub const fn multiplier(&self) -> f64 {
        match self {
            LegSide::Primary => 1.0,
            LegSide::Hedge => -1.0,
        }
    }
}

/// Stop-loss accounting mode for a monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SlMode {
    /// Cumulative points against fixed thresholds
    Points = 0,
    /// Combined premium decay/expansion levels
    Premium = 1,
    /// Mark-to-market (points thresholds on cumulative P&L)
    Mtm = 2,
}

impl fmt::Display for SlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlMode::Points => write!(f, "POINTS"),
            SlMode::Premium => write!(f, "PREMIUM"),
            SlMode::Mtm => write!(f, "MTM"),
        }
    }
}

/// Last-traded-price update for one instrument.
///
/// The monitor consumes only token and LTP from the transport's tick
/// structure; everything else stays at the transport boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    pub instrument_token: u64,
    pub last_price: f64,
}

impl Tick {
    #[inline(always)]
    pub const fn new(instrument_token: u64, last_price: f64) -> Self {
        Self {
            instrument_token,
            last_price,
        }
    }
}

/// Single-writer atomic f64 price cell.
///
/// Stores the bit pattern in an `AtomicU64` so the tick thread can write
/// and the evaluator read without a lock. Release/Acquire pairs keep the
/// value visible across threads; there is exactly one writer per cell.
#[derive(Default)]
pub struct AtomicPrice(AtomicU64);

impl AtomicPrice {
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    #[inline(always)]
    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    #[inline(always)]
    pub fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Release);
    }
}

impl fmt::Debug for AtomicPrice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.load())
    }
}

/// One option contract held inside a multi-leg position.
///
/// Identity and quantity are immutable after construction. `entry_price`
/// is rewritten at most once, by the monitor during a leg-replacement
/// adjustment; `current_price` is written by the tick thread and read by
/// the evaluator.
#[derive(Debug)]
pub struct Leg {
    order_id: String,
    symbol: String,
    instrument_token: u64,
    quantity: u32,
    option_type: OptionType,
    side: LegSide,
    entry_price: AtomicPrice,
    current_price: AtomicPrice,
}

impl Leg {
    pub fn new(
        order_id: impl Into<String>,
        symbol: impl Into<String>,
        instrument_token: u64,
        entry_price: f64,
        quantity: u32,
        option_type: OptionType,
        side: LegSide,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            symbol: symbol.into(),
            instrument_token,
            quantity,
            option_type,
            side,
            entry_price: AtomicPrice::new(entry_price),
            // Until the first tick arrives the leg marks at its entry
            current_price: AtomicPrice::new(entry_price),
        }
    }

    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    #[inline(always)]
    pub fn instrument_token(&self) -> u64 {
        self.instrument_token
    }

    #[inline(always)]
    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    #[inline(always)]
    pub fn option_type(&self) -> OptionType {
        self.option_type
    }

    #[inline(always)]
    pub fn side(&self) -> LegSide {
        self.side
    }

    #[inline(always)]
    pub fn entry_price(&self) -> f64 {
        self.entry_price.load()
    }

    /// Rewrite the entry price. Only the monitor calls this, during a
    /// leg-replacement adjustment; never the tick thread.
    #[inline]
    pub fn set_entry_price(&self, price: f64) {
        self.entry_price.store(price);
    }

    #[inline(always)]
    pub fn current_price(&self) -> f64 {
        self.current_price.load()
    }

    /// Write the latest LTP. Safe when concurrent with reads; the cell
    /// has a single writer (the tick thread owning this monitor).
    #[inline(always)]
    pub fn set_current_price(&self, price: f64) {
        self.current_price.store(price);
    }

    /// Raw P&L in currency points for the full quantity, unsigned by
    /// direction: `(current - entry) * quantity`.
    #[inline(always)]
    pub fn pnl(&self) -> f64 {
        self.unit_pnl() * self.quantity as f64
    }

    /// Per-contract P&L: `current - entry`.
    #[inline(always)]
    pub fn unit_pnl(&self) -> f64 {
        self.current_price.load() - self.entry_price.load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_atomic_price_roundtrip() {
        let p = AtomicPrice::new(152.35);
        assert_eq!(p.load(), 152.35);
        p.store(148.6);
        assert_eq!(p.load(), 148.6);
    }

    #[test]
    fn test_direction_multipliers() {
        assert_eq!(Direction::Long.multiplier(), 1.0);
        assert_eq!(Direction::Short.multiplier(), -1.0);
        assert_eq!(LegSide::Primary.multiplier(), 1.0);
        assert_eq!(LegSide::Hedge.multiplier(), -1.0);
    }

    #[test]
    fn test_leg_pnl() {
        let leg = Leg::new("OID1", "NIFTY24AUG22500CE", 256265, 150.0, 50, OptionType::CE, LegSide::Primary);
        assert_eq!(leg.unit_pnl(), 0.0);

        leg.set_current_price(165.5);
        assert_eq!(leg.unit_pnl(), 15.5);
        assert_eq!(leg.pnl(), 15.5 * 50.0);
    }

    #[test]
    fn test_leg_entry_rewrite() {
        let leg = Leg::new("OID2", "NIFTY24AUG22500PE", 256266, 150.0, 50, OptionType::PE, LegSide::Primary);
        leg.set_current_price(210.0);
        assert_eq!(leg.unit_pnl(), 60.0);

        // Re-base after a leg replacement: the open loss is absorbed
        leg.set_entry_price(210.0);
        assert_eq!(leg.unit_pnl(), 0.0);
    }

    #[test]
    fn test_concurrent_price_visibility() {
        let leg = Arc::new(Leg::new("OID3", "SYM", 1, 100.0, 50, OptionType::CE, LegSide::Primary));
        let writer = Arc::clone(&leg);

        let handle = thread::spawn(move || {
            for i in 0..10_000u32 {
                writer.set_current_price(100.0 + i as f64 * 0.05);
            }
        });

        // Reader must only ever observe values the writer stored
        for _ in 0..10_000 {
            let p = leg.current_price();
            assert!((100.0..=600.0).contains(&p));
        }

        handle.join().unwrap();
        assert_eq!(leg.current_price(), 100.0 + 9_999.0 * 0.05);
    }

    #[test]
    fn test_display_tags() {
        assert_eq!(OptionType::CE.to_string(), "CE");
        assert_eq!(OptionType::PE.to_string(), "PE");
        assert_eq!(Direction::Short.to_string(), "SHORT");
        assert_eq!(SlMode::Premium.to_string(), "PREMIUM");
    }
}

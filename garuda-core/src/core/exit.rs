//! Exit decisions
//!
//! An exit strategy evaluation produces exactly one [`ExitResult`]. The
//! common case is `NoExit` and allocates nothing; the action variants are
//! built once per position lifetime, on the way out.

use super::types::OptionType;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a position (or leg) was closed.
///
/// Each variant carries the numbers that were live at the moment of the
/// decision; `Display` renders the wire tag plus payload, which is what
/// lands in logs, journals and backtest trade records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExitReason {
    TimeForcedExit {
        cutoff: NaiveTime,
    },
    CumulativeTargetHit {
        pnl: f64,
        target: f64,
    },
    CumulativeStoplossHit {
        pnl: f64,
        stop: f64,
    },
    TrailingStoplossHit {
        pnl: f64,
        high_water_mark: f64,
        trail_level: f64,
    },
    PremiumDecayTargetHit {
        combined_ltp: f64,
        target_level: f64,
    },
    PremiumExpansionSlHit {
        combined_ltp: f64,
        stop_level: f64,
    },
    /// Individual-leg adjustment inside a premium-mode position
    PremiumLegAdjustment {
        exited_leg: String,
        rebased_leg: String,
    },
    LegReplacementFailed {
        detail: String,
    },
    /// Operator- or strategy-initiated square-off outside any threshold
    ManualExit,
}

/// Coarse completion bucket used by the restart scheduler and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionKind {
    TargetHit,
    StoplossHit,
    /// Kept distinct from StoplossHit so trailing exits can be reported
    /// and gated separately
    TrailingStoplossHit,
    TimeExit,
    Adjusted,
    Failed,
    Manual,
}

impl CompletionKind {
    /// Only clean target/stop completions qualify for an auto-restart.
    #[inline]
    pub const fn restart_eligible(&self) -> bool {
        matches!(self, CompletionKind::TargetHit | CompletionKind::StoplossHit)
    }
}

impl ExitReason {
    /// Stable ALLCAPS tag, without payload
    pub const fn tag(&self) -> &'static str {
        match self {
            ExitReason::TimeForcedExit { .. } => "TIME_BASED_FORCED_EXIT",
            ExitReason::CumulativeTargetHit { .. } => "CUMULATIVE_TARGET_HIT",
            ExitReason::CumulativeStoplossHit { .. } => "CUMULATIVE_STOPLOSS_HIT",
            ExitReason::TrailingStoplossHit { .. } => "TRAILING_STOPLOSS_HIT",
            ExitReason::PremiumDecayTargetHit { .. } => "PREMIUM_DECAY_TARGET_HIT",
            ExitReason::PremiumExpansionSlHit { .. } => "PREMIUM_EXPANSION_SL_HIT",
            ExitReason::PremiumLegAdjustment { .. } => "PREMIUM_LEG_ADJUSTMENT",
            ExitReason::LegReplacementFailed { .. } => "LEG_REPLACEMENT_FAILED",
            ExitReason::ManualExit => "MANUAL_EXIT",
        }
    }

    pub const fn completion(&self) -> CompletionKind {
        match self {
            ExitReason::CumulativeTargetHit { .. } | ExitReason::PremiumDecayTargetHit { .. } => {
                CompletionKind::TargetHit
            }
            ExitReason::CumulativeStoplossHit { .. } | ExitReason::PremiumExpansionSlHit { .. } => {
                CompletionKind::StoplossHit
            }
            ExitReason::TrailingStoplossHit { .. } => CompletionKind::TrailingStoplossHit,
            ExitReason::TimeForcedExit { .. } => CompletionKind::TimeExit,
            ExitReason::PremiumLegAdjustment { .. } => CompletionKind::Adjusted,
            ExitReason::LegReplacementFailed { .. } => CompletionKind::Failed,
            ExitReason::ManualExit => CompletionKind::Manual,
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::TimeForcedExit { cutoff } => {
                write!(f, "TIME_BASED_FORCED_EXIT @ {}", cutoff.format("%H:%M"))
            }
            ExitReason::CumulativeTargetHit { pnl, target } => {
                write!(f, "CUMULATIVE_TARGET_HIT (P&L: {:.2} >= {:.2} points)", pnl, target)
            }
            ExitReason::CumulativeStoplossHit { pnl, stop } => {
                write!(f, "CUMULATIVE_STOPLOSS_HIT (P&L: {:.2} <= -{:.2} points)", pnl, stop)
            }
            ExitReason::TrailingStoplossHit {
                pnl,
                high_water_mark,
                trail_level,
            } => {
                write!(
                    f,
                    "TRAILING_STOPLOSS_HIT (P&L: {:.2}, HighWaterMark: {:.2}, TrailLevel: {:.2} points)",
                    pnl, high_water_mark, trail_level
                )
            }
            ExitReason::PremiumDecayTargetHit {
                combined_ltp,
                target_level,
            } => {
                write!(
                    f,
                    "PREMIUM_DECAY_TARGET_HIT (combined: {:.2} <= {:.2})",
                    combined_ltp, target_level
                )
            }
            ExitReason::PremiumExpansionSlHit {
                combined_ltp,
                stop_level,
            } => {
                write!(
                    f,
                    "PREMIUM_EXPANSION_SL_HIT (combined: {:.2} >= {:.2})",
                    combined_ltp, stop_level
                )
            }
            ExitReason::PremiumLegAdjustment {
                exited_leg,
                rebased_leg,
            } => {
                write!(
                    f,
                    "PREMIUM_LEG_ADJUSTMENT (exited: {}, rebased: {})",
                    exited_leg, rebased_leg
                )
            }
            ExitReason::LegReplacementFailed { detail } => {
                write!(f, "LEG_REPLACEMENT_FAILED: {}", detail)
            }
            ExitReason::ManualExit => write!(f, "MANUAL_EXIT"),
        }
    }
}

/// Outcome of one strategy evaluation.
///
/// At most one non-`NoExit` result is dispatched per tick; the monitor
/// stops consulting lower-priority strategies once it has one.
#[derive(Debug, Clone, PartialEq)]
pub enum ExitResult {
    NoExit,
    /// Close every leg and finish the position
    ExitAll(ExitReason),
    /// Close the named leg only
    ExitLeg { symbol: String, reason: ExitReason },
    /// Close `exited_leg_symbol`, re-base `loss_leg_symbol` to its LTP,
    /// and ask the owner to open a replacement of `new_leg_type` near
    /// `target_premium`
    AdjustLeg {
        exited_leg_symbol: String,
        new_leg_type: OptionType,
        target_premium: f64,
        loss_leg_symbol: String,
        loss_leg_new_entry_price: f64,
        exited_leg_ltp: f64,
        reason: ExitReason,
    },
}

impl ExitResult {
    #[inline(always)]
    pub const fn requires_action(&self) -> bool {
        !matches!(self, ExitResult::NoExit)
    }

    pub const fn reason(&self) -> Option<&ExitReason> {
        match self {
            ExitResult::NoExit => None,
            ExitResult::ExitAll(reason)
            | ExitResult::ExitLeg { reason, .. }
            | ExitResult::AdjustLeg { reason, .. } => Some(reason),
        }
    }
}

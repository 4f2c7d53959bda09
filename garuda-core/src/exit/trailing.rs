//! Trailing stop-loss
//!
//! State machine: IDLE until cumulative P&L reaches the activation
//! threshold, then ACTIVATED forever. Once activated the high-water mark
//! only rises, and the trail level follows it at a fixed distance. An
//! exit fires when P&L falls back to the trail level.

use crate::core::exit::{ExitReason, ExitResult};
use crate::monitor::context::ExitContext;

#[derive(Debug, Clone, Copy, PartialEq)]
enum TrailState {
    Idle,
    Activated {
        high_water_mark: f64,
        trail_level: f64,
    },
}

#[derive(Debug, Clone)]
pub struct TrailingStopLoss {
    enabled: bool,
    activation_points: f64,
    distance_points: f64,
    state: TrailState,
}

impl TrailingStopLoss {
    pub fn new(enabled: bool, activation_points: f64, distance_points: f64) -> Self {
        Self {
            enabled,
            activation_points,
            distance_points,
            state: TrailState::Idle,
        }
    }

    pub fn is_activated(&self) -> bool {
        matches!(self.state, TrailState::Activated { .. })
    }

    pub fn high_water_mark(&self) -> Option<f64> {
        match self.state {
            TrailState::Idle => None,
            TrailState::Activated { high_water_mark, .. } => Some(high_water_mark),
        }
    }

    pub fn trail_level(&self) -> Option<f64> {
        match self.state {
            TrailState::Idle => None,
            TrailState::Activated { trail_level, .. } => Some(trail_level),
        }
    }

    #[inline(always)]
    pub fn is_enabled(&self, _ctx: &ExitContext) -> bool {
        self.enabled
    }

    pub fn evaluate(&mut self, ctx: &ExitContext) -> ExitResult {
        let pnl = ctx.cumulative_pnl;

        match self.state {
            TrailState::Idle => {
                if pnl >= self.activation_points {
                    self.state = TrailState::Activated {
                        high_water_mark: pnl,
                        trail_level: pnl - self.distance_points,
                    };
                }
                ExitResult::NoExit
            }
            TrailState::Activated {
                high_water_mark,
                trail_level,
            } => {
                if pnl > high_water_mark {
                    // Raise both marks by the same delta; never lowers
                    self.state = TrailState::Activated {
                        high_water_mark: pnl,
                        trail_level: pnl - self.distance_points,
                    };
                    return ExitResult::NoExit;
                }
                if pnl <= trail_level {
                    return ExitResult::ExitAll(ExitReason::TrailingStoplossHit {
                        pnl,
                        high_water_mark,
                        trail_level,
                    });
                }
                ExitResult::NoExit
            }
        }
    }
}

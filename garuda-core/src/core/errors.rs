//! Domain-specific error types for the position engine
//!
//! These errors carry the failure tags surfaced at the system boundary.
//! The tick-evaluation hot path never raises any of them; there,
//! failures degrade to `NoExit` plus a log line.

use std::fmt;

/// Boundary errors with stable tags.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// No historical data for the requested date, or the symbol dump is
    /// missing entirely
    DataUnavailable {
        detail: String,
    },

    /// ATM CE/PE not locatable in the instrument dump
    InstrumentNotFound {
        underlying: String,
        strike: f64,
        expiry: String,
    },

    /// Broker refused the order or returned no order id
    OrderPlacementFailed {
        message: String,
    },

    /// Basket returned a mix of success and failure; rollback is in
    /// flight or has been attempted
    OrderPartialFill {
        placed: usize,
        failed: usize,
    },

    /// A rate-limiter permit was denied; the caller may retry
    RateLimited {
        endpoint: &'static str,
    },

    /// Broker access token expired; propagated unchanged
    SessionInvalid,

    /// A pending leg replacement expired; recovered locally by clearing
    /// the paused sub-state
    LegReplacementTimeout {
        symbol: String,
    },

    /// Rollback of a partial basket missed its deadline
    ManualInterventionRequired {
        detail: String,
    },

    /// Rejected at the configuration boundary
    ConfigInvalid {
        detail: String,
    },
}

impl EngineError {
    /// Stable tag for logs, journals and API payloads
    pub const fn tag(&self) -> &'static str {
        match self {
            EngineError::DataUnavailable { .. } => "DATA_UNAVAILABLE",
            EngineError::InstrumentNotFound { .. } => "INSTRUMENT_NOT_FOUND",
            EngineError::OrderPlacementFailed { .. } => "ORDER_PLACEMENT_FAILED",
            EngineError::OrderPartialFill { .. } => "ORDER_PARTIAL_FILL",
            EngineError::RateLimited { .. } => "RATE_LIMITED",
            EngineError::SessionInvalid => "SESSION_INVALID",
            EngineError::LegReplacementTimeout { .. } => "LEG_REPLACEMENT_TIMEOUT",
            EngineError::ManualInterventionRequired { .. } => "MANUAL_INTERVENTION_REQUIRED",
            EngineError::ConfigInvalid { .. } => "CONFIG_INVALID",
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::DataUnavailable { detail } => {
                write!(f, "DATA_UNAVAILABLE: {}", detail)
            }
            EngineError::InstrumentNotFound {
                underlying,
                strike,
                expiry,
            } => {
                write!(
                    f,
                    "INSTRUMENT_NOT_FOUND: no CE/PE for {} strike {} expiry {}",
                    underlying, strike, expiry
                )
            }
            EngineError::OrderPlacementFailed { message } => {
                write!(f, "ORDER_PLACEMENT_FAILED: {}", message)
            }
            EngineError::OrderPartialFill { placed, failed } => {
                write!(
                    f,
                    "ORDER_PARTIAL_FILL: {} placed, {} failed; rolling back",
                    placed, failed
                )
            }
            EngineError::RateLimited { endpoint } => {
                write!(f, "RATE_LIMITED: no permit for {} endpoint", endpoint)
            }
            EngineError::SessionInvalid => write!(f, "SESSION_INVALID: broker token expired"),
            EngineError::LegReplacementTimeout { symbol } => {
                write!(f, "LEG_REPLACEMENT_TIMEOUT: replacement for {} expired", symbol)
            }
            EngineError::ManualInterventionRequired { detail } => {
                write!(f, "MANUAL_INTERVENTION_REQUIRED: {}", detail)
            }
            EngineError::ConfigInvalid { detail } => {
                write!(f, "CONFIG_INVALID: {}", detail)
            }
        }
    }
}

impl std::error::Error for EngineError {}

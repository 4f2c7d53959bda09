//! Instrument universe: underlyings, contract records, ATM resolution
//! and the process-wide dump cache.

pub mod cache;
pub mod resolver;

pub use cache::{InstrumentCache, InstrumentSource};
pub use resolver::{atm_strike, resolve_atm, AtmPair};

use crate::core::types::OptionType;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Exchange segment carried on instrument records and order requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Exchange {
    /// NSE futures & options
    Nfo,
    /// NSE cash
    Nse,
}

impl Exchange {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Exchange::Nfo => "NFO",
            Exchange::Nse => "NSE",
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported index underlyings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Underlying {
    Nifty,
    BankNifty,
    FinNifty,
}

impl Underlying {
    /// Listed strike spacing for the underlying
    pub const fn strike_interval(&self) -> f64 {
        match self {
            Underlying::Nifty => 50.0,
            Underlying::BankNifty => 100.0,
            Underlying::FinNifty => 50.0,
        }
    }

    /// Name as it appears in the instrument dump
    pub const fn as_str(&self) -> &'static str {
        match self {
            Underlying::Nifty => "NIFTY",
            Underlying::BankNifty => "BANKNIFTY",
            Underlying::FinNifty => "FINNIFTY",
        }
    }
}

impl fmt::Display for Underlying {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Underlying {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NIFTY" => Ok(Underlying::Nifty),
            "BANKNIFTY" => Ok(Underlying::BankNifty),
            "FINNIFTY" => Ok(Underlying::FinNifty),
            other => Err(format!("unknown underlying '{}'", other)),
        }
    }
}

/// Contract kind in the dump
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstrumentKind {
    CE,
    PE,
    Fut,
    Eq,
}

impl InstrumentKind {
    pub const fn option_type(&self) -> Option<OptionType> {
        match self {
            InstrumentKind::CE => Some(OptionType::CE),
            InstrumentKind::PE => Some(OptionType::PE),
            _ => None,
        }
    }
}

impl From<OptionType> for InstrumentKind {
    fn from(t: OptionType) -> Self {
        match t {
            OptionType::CE => InstrumentKind::CE,
            OptionType::PE => InstrumentKind::PE,
        }
    }
}

/// One row of the broker instrument dump
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub instrument_token: u64,
    pub tradingsymbol: String,
    /// Underlying name, e.g. "NIFTY"
    pub name: String,
    pub expiry: NaiveDate,
    pub strike: f64,
    pub lot_size: u32,
    pub kind: InstrumentKind,
    pub exchange: Exchange,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strike_intervals() {
        assert_eq!(Underlying::Nifty.strike_interval(), 50.0);
        assert_eq!(Underlying::BankNifty.strike_interval(), 100.0);
        assert_eq!(Underlying::FinNifty.strike_interval(), 50.0);
    }

    #[test]
    fn test_underlying_parse() {
        assert_eq!("nifty".parse::<Underlying>().unwrap(), Underlying::Nifty);
        assert_eq!("BANKNIFTY".parse::<Underlying>().unwrap(), Underlying::BankNifty);
        assert!("SENSEX".parse::<Underlying>().is_err());
    }

    #[test]
    fn test_kind_option_type() {
        assert_eq!(InstrumentKind::CE.option_type(), Some(OptionType::CE));
        assert_eq!(InstrumentKind::Fut.option_type(), None);
        assert_eq!(InstrumentKind::from(OptionType::PE), InstrumentKind::PE);
    }
}

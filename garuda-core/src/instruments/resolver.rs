//! ATM contract resolution
//!
//! Maps (underlying, expiry, spot) to the at-the-money CE/PE pair by a
//! linear scan of the cached instrument dump. A missing leg is a hard
//! error; the resolver never substitutes a neighbouring strike.

use super::{Instrument, InstrumentKind, Underlying};
use crate::core::errors::EngineError;
use chrono::NaiveDate;
use tracing::debug;

/// Strike equality tolerance; dump strikes are exact multiples of the
/// interval but arrive as floats
const STRIKE_EPS: f64 = 1e-6;

/// ATM CE/PE pair with the shared lot size
#[derive(Debug, Clone, PartialEq)]
pub struct AtmPair {
    pub ce: Instrument,
    pub pe: Instrument,
    pub strike: f64,
    pub lot_size: u32,
}

/// Snap the spot to the nearest listed strike for the underlying
pub fn atm_strike(spot: f64, underlying: Underlying) -> f64 {
    let interval = underlying.strike_interval();
    (spot / interval).round() * interval
}

/// Resolve the ATM CE and PE for `(underlying, expiry, spot)` from the
/// instrument dump. Expiry matching is calendar-day equality.
pub fn resolve_atm(
    dump: &[Instrument],
    underlying: Underlying,
    expiry: NaiveDate,
    spot: f64,
) -> Result<AtmPair, EngineError> {
    let strike = atm_strike(spot, underlying);

    let mut ce: Option<&Instrument> = None;
    let mut pe: Option<&Instrument> = None;

    for instrument in dump {
        if instrument.name != underlying.as_str()
            || instrument.expiry != expiry
            || (instrument.strike - strike).abs() > STRIKE_EPS
        {
            continue;
        }
        match instrument.kind {
            InstrumentKind::CE => ce = Some(instrument),
            InstrumentKind::PE => pe = Some(instrument),
            _ => {}
        }
        if ce.is_some() && pe.is_some() {
            break;
        }
    }

    match (ce, pe) {
        (Some(ce), Some(pe)) => {
            // Lot size from CE, falling back to PE
            let lot_size = if ce.lot_size > 0 { ce.lot_size } else { pe.lot_size };
            debug!(
                underlying = %underlying,
                strike,
                %expiry,
                ce = ce.tradingsymbol,
                pe = pe.tradingsymbol,
                lot_size,
                "resolved ATM pair"
            );
            Ok(AtmPair {
                ce: ce.clone(),
                pe: pe.clone(),
                strike,
                lot_size,
            })
        }
        _ => Err(EngineError::InstrumentNotFound {
            underlying: underlying.as_str().to_string(),
            strike,
            expiry: expiry.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruments::Exchange;

    fn expiry() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 8, 29).unwrap()
    }

    fn option(name: &str, strike: f64, kind: InstrumentKind, token: u64) -> Instrument {
        let suffix = match kind {
            InstrumentKind::CE => "CE",
            InstrumentKind::PE => "PE",
            _ => "XX",
        };
        Instrument {
            instrument_token: token,
            tradingsymbol: format!("{}24AUG{}{}", name, strike as i64, suffix),
            name: name.to_string(),
            expiry: expiry(),
            strike,
            lot_size: 50,
            kind,
            exchange: Exchange::Nfo,
        }
    }

    fn dump() -> Vec<Instrument> {
        vec![
            option("NIFTY", 22_450.0, InstrumentKind::CE, 1),
            option("NIFTY", 22_450.0, InstrumentKind::PE, 2),
            option("NIFTY", 22_500.0, InstrumentKind::CE, 3),
            option("NIFTY", 22_500.0, InstrumentKind::PE, 4),
            option("NIFTY", 22_550.0, InstrumentKind::CE, 5),
            option("BANKNIFTY", 48_500.0, InstrumentKind::CE, 6),
            option("BANKNIFTY", 48_500.0, InstrumentKind::PE, 7),
        ]
    }

    #[test]
    fn test_atm_strike_rounding() {
        assert_eq!(atm_strike(22_510.0, Underlying::Nifty), 22_500.0);
        assert_eq!(atm_strike(22_525.0, Underlying::Nifty), 22_550.0);
        assert_eq!(atm_strike(22_474.9, Underlying::Nifty), 22_450.0);
        assert_eq!(atm_strike(48_449.0, Underlying::BankNifty), 48_400.0);
        assert_eq!(atm_strike(48_450.0, Underlying::BankNifty), 48_500.0);
    }

    #[test]
    fn test_resolve_atm_pair() {
        let pair = resolve_atm(&dump(), Underlying::Nifty, expiry(), 22_490.0).unwrap();
        assert_eq!(pair.strike, 22_500.0);
        assert_eq!(pair.ce.instrument_token, 3);
        assert_eq!(pair.pe.instrument_token, 4);
        assert_eq!(pair.lot_size, 50);
    }

    #[test]
    fn test_missing_pe_is_not_found() {
        // 22550 has only a CE in the dump
        let err = resolve_atm(&dump(), Underlying::Nifty, expiry(), 22_560.0).unwrap_err();
        assert_eq!(err.tag(), "INSTRUMENT_NOT_FOUND");
    }

    #[test]
    fn test_wrong_expiry_is_not_found() {
        let other = NaiveDate::from_ymd_opt(2024, 9, 26).unwrap();
        let err = resolve_atm(&dump(), Underlying::Nifty, other, 22_490.0).unwrap_err();
        assert_eq!(err.tag(), "INSTRUMENT_NOT_FOUND");
    }

    #[test]
    fn test_never_substitutes_neighbouring_strike() {
        // Spot snaps to 22450 which exists; but a spot snapping to a
        // strike with no contracts must fail even though 22500 is listed
        let thin: Vec<Instrument> = dump()
            .into_iter()
            .filter(|i| i.strike != 22_450.0)
            .collect();
        let err = resolve_atm(&thin, Underlying::Nifty, expiry(), 22_460.0).unwrap_err();
        assert_eq!(err.tag(), "INSTRUMENT_NOT_FOUND");
    }

    #[test]
    fn test_lot_size_falls_back_to_pe() {
        let mut d = dump();
        for i in &mut d {
            if i.instrument_token == 3 {
                i.lot_size = 0;
            }
        }
        let pair = resolve_atm(&d, Underlying::Nifty, expiry(), 22_500.0).unwrap();
        assert_eq!(pair.lot_size, 50);
    }
}

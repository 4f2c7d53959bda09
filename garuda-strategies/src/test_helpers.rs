//! Fixtures for strategy tests: instrument dumps and session candles

use chrono::{NaiveDate, NaiveDateTime};
use garuda_core::data::Candle;
use garuda_core::instruments::{Exchange, Instrument, InstrumentKind, Underlying};

pub fn trading_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 8, 1).expect("static date")
}

pub fn expiry() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 8, 29).expect("static date")
}

pub fn ts(hour: u32, minute: u32) -> NaiveDateTime {
    trading_day().and_hms_opt(hour, minute, 0).expect("static time")
}

/// NIFTY option chain around 22500, strikes every 50 points
pub fn nifty_dump(strikes_around: i64) -> Vec<Instrument> {
    let mut dump = Vec::new();
    let mut token = 100u64;
    for i in -strikes_around..=strikes_around {
        let strike = 22_500.0 + (i * 50) as f64;
        for kind in [InstrumentKind::CE, InstrumentKind::PE] {
            let suffix = if kind == InstrumentKind::CE { "CE" } else { "PE" };
            dump.push(Instrument {
                instrument_token: token,
                tradingsymbol: format!("NIFTY24AUG{}{}", strike as i64, suffix),
                name: Underlying::Nifty.as_str().to_string(),
                expiry: expiry(),
                strike,
                lot_size: 50,
                kind,
                exchange: Exchange::Nfo,
            });
            token += 1;
        }
    }
    dump
}

/// Flat session: the index pins `spot` from 09:15 for `count` minute
/// candles
pub fn flat_candles(spot: f64, count: usize) -> Vec<Candle> {
    let open = ts(9, 15);
    (0..count)
        .map(|i| {
            let at = open + chrono::Duration::minutes(i as i64);
            Candle::new(at, spot, spot + 2.0, spot - 2.0, spot, 5_000)
        })
        .collect()
}

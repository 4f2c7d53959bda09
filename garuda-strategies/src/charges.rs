//! Indian intraday option transaction charges
//!
//! Charges for one round trip are built from opaque coefficients in
//! `ChargesConfig`: flat brokerage per executed order, STT on the
//! sell-side premium, exchange transaction charges on total turnover,
//! GST on brokerage plus transaction charges, the SEBI turnover fee,
//! and stamp duty on the buy side.
//!
//! All math runs on `Decimal`; premiums are small and the coefficients
//! smaller, float drift here would show up directly in net P&L.
//!
//! # Example
//!
//! ```
//! use garuda_strategies::charges::IndianOptionsCharges;
//! use garuda_core::backtest::ChargeModel;
//! use garuda_core::config::ChargesConfig;
//! use rust_decimal_macros::dec;
//!
//! let model = IndianOptionsCharges::new(ChargesConfig::default());
//! // Short straddle round trip: sold 300 x 50, bought back 285 x 50
//! let charges = model.round_trip_charges(dec!(14250), dec!(15000), 4);
//! assert!(charges > dec!(80) && charges < dec!(120));
//! ```

use garuda_core::backtest::ChargeModel;
use garuda_core::config::ChargesConfig;
use rust_decimal::Decimal;

/// Itemized round-trip charges
#[derive(Debug, Clone, PartialEq)]
pub struct ChargesBreakdown {
    pub brokerage: Decimal,
    pub stt: Decimal,
    pub exchange_txn: Decimal,
    pub gst: Decimal,
    pub sebi: Decimal,
    pub stamp_duty: Decimal,
}

impl ChargesBreakdown {
    pub fn total(&self) -> Decimal {
        self.brokerage + self.stt + self.exchange_txn + self.gst + self.sebi + self.stamp_duty
    }
}

pub struct IndianOptionsCharges {
    config: ChargesConfig,
}

impl IndianOptionsCharges {
    pub fn new(config: ChargesConfig) -> Self {
        Self { config }
    }

    /// Itemize charges for a round trip with the given buy-side and
    /// sell-side traded premium values.
    pub fn breakdown(
        &self,
        buy_value: Decimal,
        sell_value: Decimal,
        executed_orders: u32,
    ) -> ChargesBreakdown {
        let cfg = &self.config;
        let turnover = buy_value + sell_value;

        let brokerage = cfg.brokerage_per_order * Decimal::from(executed_orders);
        let stt = sell_value * cfg.stt_sell_pct;
        let exchange_txn = turnover * cfg.exchange_txn_pct;
        let gst = (brokerage + exchange_txn) * cfg.gst_pct;
        let sebi = turnover * cfg.sebi_turnover_pct;
        let stamp_duty = buy_value * cfg.stamp_duty_buy_pct;

        ChargesBreakdown {
            brokerage,
            stt,
            exchange_txn,
            gst,
            sebi,
            stamp_duty,
        }
    }
}

impl ChargeModel for IndianOptionsCharges {
    fn round_trip_charges(
        &self,
        buy_value: Decimal,
        sell_value: Decimal,
        executed_orders: u32,
    ) -> Decimal {
        self.breakdown(buy_value, sell_value, executed_orders).total()
    }
}

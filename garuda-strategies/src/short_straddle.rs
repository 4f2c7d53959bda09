//! Short ATM straddle backtest strategy
//!
//! Sells the ATM CE and PE a few candles after the open, lets the
//! monitor's exit strategies manage the position, and requests a
//! restart on clean target/stop completions. Re-entry after a restart
//! resolves a fresh ATM pair at the restart candle's open.

use garuda_core::backtest::{
    BacktestContext, BacktestRequest, BacktestStrategy, EntryLeg, StraddleEstimator,
};
use garuda_core::core::errors::EngineError;
use garuda_core::core::types::{LegSide, OptionType};
use garuda_core::data::Candle;
use garuda_core::instruments::{resolve_atm, Instrument};
use std::sync::Arc;
use tracing::{info, warn};

/// Synthetic entry pricing: combined straddle premium as a fraction of
/// spot, and its per-minute decay while the spot pins the strike.
#[derive(Debug, Clone, Copy)]
pub struct StraddlePricing {
    pub premium_pct_of_spot: f64,
    pub decay_per_minute: f64,
}

impl Default for StraddlePricing {
    fn default() -> Self {
        Self {
            premium_pct_of_spot: 0.013,
            decay_per_minute: 0.05,
        }
    }
}

pub struct ShortStraddleStrategy {
    dump: Arc<Vec<Instrument>>,
    pricing: StraddlePricing,
    /// Candles to wait after the open before the first entry
    entry_delay_candles: usize,
    entered_once: bool,
}

impl ShortStraddleStrategy {
    pub fn new(dump: Arc<Vec<Instrument>>) -> Self {
        Self {
            dump,
            pricing: StraddlePricing::default(),
            entry_delay_candles: 5,
            entered_once: false,
        }
    }

    pub fn with_pricing(mut self, pricing: StraddlePricing) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_entry_delay(mut self, candles: usize) -> Self {
        self.entry_delay_candles = candles;
        self
    }

    fn enter(&mut self, candle: &Candle, ctx: &mut BacktestContext) {
        let request = ctx.request().clone();
        let spot = candle.open;

        let pair = match resolve_atm(&self.dump, request.underlying, request.expiry, spot) {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, spot, "ATM resolution failed; entry skipped");
                return;
            }
        };

        let quantity = request.lots * pair.lot_size;
        let combined = spot * self.pricing.premium_pct_of_spot;
        let per_leg = combined / 2.0;

        let legs = vec![
            EntryLeg {
                symbol: pair.ce.tradingsymbol.clone(),
                instrument_token: pair.ce.instrument_token,
                entry_price: per_leg,
                quantity,
                option_type: OptionType::CE,
                side: LegSide::Primary,
            },
            EntryLeg {
                symbol: pair.pe.tradingsymbol.clone(),
                instrument_token: pair.pe.instrument_token,
                entry_price: per_leg,
                quantity,
                option_type: OptionType::PE,
                side: LegSide::Primary,
            },
        ];

        let estimator = StraddleEstimator::new(
            pair.strike,
            spot,
            combined,
            candle.timestamp,
            self.pricing.decay_per_minute,
        );

        match ctx.enter_position(candle.timestamp, legs, combined, Box::new(estimator)) {
            Ok(()) => {
                self.entered_once = true;
                info!(
                    at = %candle.timestamp,
                    strike = pair.strike,
                    combined_premium = combined,
                    quantity,
                    "short straddle entered"
                );
            }
            Err(e) => warn!(error = %e, "straddle entry rejected"),
        }
    }
}

impl BacktestStrategy for ShortStraddleStrategy {
    fn name(&self) -> &'static str {
        "short_straddle"
    }

    fn initialize(
        &mut self,
        request: &BacktestRequest,
        _ctx: &mut BacktestContext,
    ) -> Result<(), EngineError> {
        if self.dump.is_empty() {
            return Err(EngineError::DataUnavailable {
                detail: "instrument dump is empty".into(),
            });
        }
        info!(
            underlying = %request.underlying,
            expiry = %request.expiry,
            lots = request.lots,
            "short straddle initialized"
        );
        Ok(())
    }

    fn on_candle(&mut self, candle: &Candle, ctx: &mut BacktestContext, processed: &[Candle]) {
        if !self.entered_once && !ctx.has_open_position() && processed.len() > self.entry_delay_candles
        {
            self.enter(candle, ctx);
        }

        if let Some(reason) = ctx.step_candle(candle) {
            if reason.completion().restart_eligible() {
                ctx.request_restart(candle.timestamp);
            }
        }
    }

    fn on_restart(&mut self, candle: &Candle, ctx: &mut BacktestContext) {
        if !ctx.has_open_position() {
            self.enter(candle, ctx);
        }
    }

    fn on_market_close(&mut self, candle: &Candle, ctx: &mut BacktestContext) {
        if ctx.square_off(candle).is_some() {
            info!(at = %candle.timestamp, "open straddle squared off at close");
        }
    }
}

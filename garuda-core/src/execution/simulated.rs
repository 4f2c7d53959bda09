//! Simulated order gateway for paper trading and backtests
//!
//! Fills every order instantly at the limit price, or at the seeded LTP
//! for market orders. Pessimistic enough for the engine's purposes: no
//! queue position, no partial fills, fees handled by the charge model.

use super::types::{OrderEvent, OrderKind, OrderRequest, OrderResponse, Quote};
use super::OrderGateway;
use crate::core::errors::EngineError;
use crate::data::{Candle, CandleInterval};
use crate::instruments::{Exchange, Instrument};
use chrono::NaiveDateTime;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

pub struct SimulatedGateway {
    /// Seeded LTPs by tradingsymbol; market orders fill here
    ltps: DashMap<String, f64>,
    /// Order histories by order id
    histories: DashMap<String, Vec<OrderEvent>>,
    /// Symbols whose orders are forced to fail (tests, fault injection)
    failing_symbols: Mutex<HashSet<String>>,
    /// Instrument dump served by `instruments()`
    dump: Mutex<Vec<Instrument>>,
    order_seq: AtomicU64,
    orders_placed: AtomicU64,
}

impl SimulatedGateway {
    pub fn new() -> Self {
        info!("simulated order gateway initialized");
        Self {
            ltps: DashMap::new(),
            histories: DashMap::new(),
            failing_symbols: Mutex::new(HashSet::new()),
            dump: Mutex::new(Vec::new()),
            order_seq: AtomicU64::new(1),
            orders_placed: AtomicU64::new(0),
        }
    }

    /// Seed the last traded price for a symbol
    pub fn set_ltp(&self, symbol: impl Into<String>, price: f64) {
        self.ltps.insert(symbol.into(), price);
    }

    /// Serve this dump from `instruments()`
    pub fn set_instrument_dump(&self, dump: Vec<Instrument>) {
        *self.dump.lock() = dump;
    }

    /// Force orders for `symbol` to fail (fault injection)
    pub fn fail_orders_for(&self, symbol: impl Into<String>) {
        self.failing_symbols.lock().insert(symbol.into());
    }

    pub fn clear_failures(&self) {
        self.failing_symbols.lock().clear();
    }

    pub fn orders_placed(&self) -> u64 {
        self.orders_placed.load(Ordering::Relaxed)
    }

    fn fill_price(&self, request: &OrderRequest) -> Option<f64> {
        match request.kind {
            OrderKind::Limit { price } => Some(price),
            OrderKind::Market => self.ltps.get(&request.tradingsymbol).map(|p| *p),
        }
    }

    fn next_order_id(&self) -> String {
        format!("SIM{:012}", self.order_seq.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderGateway for SimulatedGateway {
    fn place_order(&self, request: &OrderRequest) -> Result<OrderResponse, EngineError> {
        if request.quantity == 0 {
            return Err(EngineError::OrderPlacementFailed {
                message: "quantity must be positive".into(),
            });
        }
        if self.failing_symbols.lock().contains(&request.tradingsymbol) {
            return Ok(OrderResponse::failed(format!(
                "order rejected for {}",
                request.tradingsymbol
            )));
        }

        let Some(price) = self.fill_price(request) else {
            return Ok(OrderResponse::failed(format!(
                "no market price for {}",
                request.tradingsymbol
            )));
        };

        let order_id = self.next_order_id();
        self.histories.insert(
            order_id.clone(),
            vec![
                OrderEvent {
                    status: "OPEN".into(),
                    price,
                    average_price: 0.0,
                },
                OrderEvent {
                    status: "COMPLETE".into(),
                    price,
                    average_price: price,
                },
            ],
        );
        self.orders_placed.fetch_add(1, Ordering::Relaxed);

        debug!(
            order_id,
            symbol = request.tradingsymbol,
            side = %request.transaction_type,
            qty = request.quantity,
            price,
            "simulated fill"
        );
        Ok(OrderResponse::success(order_id))
    }

    fn order_history(&self, order_id: &str) -> Result<Vec<OrderEvent>, EngineError> {
        self.histories
            .get(order_id)
            .map(|events| events.clone())
            .ok_or_else(|| EngineError::OrderPlacementFailed {
                message: format!("unknown order id {}", order_id),
            })
    }

    fn cancel_order(&self, order_id: &str) -> Result<(), EngineError> {
        if let Some(mut events) = self.histories.get_mut(order_id) {
            events.push(OrderEvent {
                status: "CANCELLED".into(),
                price: 0.0,
                average_price: 0.0,
            });
        }
        Ok(())
    }

    fn modify_order(&self, order_id: &str, new_price: f64) -> Result<(), EngineError> {
        if let Some(mut events) = self.histories.get_mut(order_id) {
            events.push(OrderEvent {
                status: "MODIFIED".into(),
                price: new_price,
                average_price: 0.0,
            });
        }
        Ok(())
    }

    fn ltp(&self, symbols: &[String]) -> Result<HashMap<String, f64>, EngineError> {
        Ok(symbols
            .iter()
            .filter_map(|s| self.ltps.get(s).map(|p| (s.clone(), *p)))
            .collect())
    }

    fn quote(&self, symbols: &[String]) -> Result<HashMap<String, Quote>, EngineError> {
        // Synthetic book: one tick wide around the LTP
        Ok(symbols
            .iter()
            .filter_map(|s| {
                self.ltps.get(s).map(|p| {
                    let last = *p;
                    (
                        s.clone(),
                        Quote {
                            last_price: last,
                            bid: last - 0.05,
                            ask: last + 0.05,
                            volume: 0,
                        },
                    )
                })
            })
            .collect())
    }

    fn historical(
        &self,
        _instrument_token: u64,
        _from: NaiveDateTime,
        _to: NaiveDateTime,
        _interval: CandleInterval,
        _continuous: bool,
        _oi: bool,
    ) -> Result<Vec<Candle>, EngineError> {
        Err(EngineError::DataUnavailable {
            detail: "simulated gateway has no historical data; use a HistoricalSource".into(),
        })
    }

    fn instruments(&self, exchange: Exchange) -> Result<Vec<Instrument>, EngineError> {
        let dump = self.dump.lock();
        if dump.is_empty() {
            return Err(EngineError::DataUnavailable {
                detail: format!("no instrument dump seeded for {}", exchange),
            });
        }
        Ok(dump.iter().filter(|i| i.exchange == exchange).cloned().collect())
    }
}

//! Order execution
//!
//! The engine never talks to a broker directly; everything goes through
//! the [`OrderGateway`] trait. The monitor itself places no orders - it
//! only fires callbacks - so the gateway is consumed by strategy code
//! and the binaries.

pub mod basket;
pub mod journal;
pub mod simulated;
pub mod types;

pub use basket::place_basket_with_rollback;
pub use journal::{CompletedExecution, ExecutionJournal, JournalEvent, LegFill};
pub use simulated::SimulatedGateway;
pub use types::{
    BasketResponse, BasketStatus, LegPlacement, OrderEvent, OrderKind, OrderRequest,
    OrderResponse, OrderStatusKind, ProductType, Quote, TransactionType,
};

use crate::core::errors::EngineError;
use crate::data::{Candle, CandleInterval};
use crate::instruments::{Exchange, Instrument};
use chrono::NaiveDateTime;
use std::collections::HashMap;

/// Abstract broker order/market-data surface.
///
/// Implementations are expected to be internally synchronized; the
/// engine calls them from order-placement worker threads.
pub trait OrderGateway: Send + Sync {
    fn place_order(&self, request: &OrderRequest) -> Result<OrderResponse, EngineError>;

    fn order_history(&self, order_id: &str) -> Result<Vec<OrderEvent>, EngineError>;

    fn cancel_order(&self, order_id: &str) -> Result<(), EngineError>;

    fn modify_order(&self, order_id: &str, new_price: f64) -> Result<(), EngineError>;

    fn ltp(&self, symbols: &[String]) -> Result<HashMap<String, f64>, EngineError>;

    fn quote(&self, symbols: &[String]) -> Result<HashMap<String, Quote>, EngineError>;

    #[allow(clippy::too_many_arguments)]
    fn historical(
        &self,
        instrument_token: u64,
        from: NaiveDateTime,
        to: NaiveDateTime,
        interval: CandleInterval,
        continuous: bool,
        oi: bool,
    ) -> Result<Vec<Candle>, EngineError>;

    fn instruments(&self, exchange: Exchange) -> Result<Vec<Instrument>, EngineError>;
}

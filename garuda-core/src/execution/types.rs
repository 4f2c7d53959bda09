//! Order and basket types for the broker gateway

use crate::instruments::Exchange;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order side as the broker sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
    Buy,
    Sell,
}

impl TransactionType {
    /// The transaction that unwinds this one
    pub const fn reversed(&self) -> Self {
        match self {
            TransactionType::Buy => TransactionType::Sell,
            TransactionType::Sell => TransactionType::Buy,
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionType::Buy => write!(f, "BUY"),
            TransactionType::Sell => write!(f, "SELL"),
        }
    }
}

/// Order pricing
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OrderKind {
    Market,
    Limit { price: f64 },
}

/// Product type; intraday positions use MIS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductType {
    Mis,
    Nrml,
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProductType::Mis => write!(f, "MIS"),
            ProductType::Nrml => write!(f, "NRML"),
        }
    }
}

/// One order to be submitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub tradingsymbol: String,
    pub exchange: Exchange,
    pub transaction_type: TransactionType,
    pub quantity: u32,
    pub product: ProductType,
    pub kind: OrderKind,
    pub tag: Option<String>,
}

impl OrderRequest {
    pub fn market(
        tradingsymbol: impl Into<String>,
        exchange: Exchange,
        transaction_type: TransactionType,
        quantity: u32,
    ) -> Self {
        Self {
            tradingsymbol: tradingsymbol.into(),
            exchange,
            transaction_type,
            quantity,
            product: ProductType::Mis,
            kind: OrderKind::Market,
            tag: None,
        }
    }

    pub fn limit(
        tradingsymbol: impl Into<String>,
        exchange: Exchange,
        transaction_type: TransactionType,
        quantity: u32,
        price: f64,
    ) -> Self {
        Self {
            kind: OrderKind::Limit { price },
            ..Self::market(tradingsymbol, exchange, transaction_type, quantity)
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Market order that unwinds this one (rollback, square-off)
    pub fn reversal(&self) -> Self {
        Self {
            transaction_type: self.transaction_type.reversed(),
            kind: OrderKind::Market,
            tag: Some("rollback".into()),
            ..self.clone()
        }
    }
}

/// Broker acknowledgement status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatusKind {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResponse {
    pub order_id: Option<String>,
    pub status: OrderStatusKind,
    pub message: String,
}

impl OrderResponse {
    pub fn success(order_id: impl Into<String>) -> Self {
        Self {
            order_id: Some(order_id.into()),
            status: OrderStatusKind::Success,
            message: String::new(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            order_id: None,
            status: OrderStatusKind::Failed,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OrderStatusKind::Success && self.order_id.is_some()
    }
}

/// Overall basket outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BasketStatus {
    Success,
    Partial,
    Failed,
}

/// Per-leg basket result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegPlacement {
    pub tradingsymbol: String,
    pub order_id: Option<String>,
    pub status: OrderStatusKind,
    pub message: String,
    pub execution_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasketResponse {
    pub overall: BasketStatus,
    pub legs: Vec<LegPlacement>,
}

impl BasketResponse {
    pub fn overall_of(legs: &[LegPlacement]) -> BasketStatus {
        let placed = legs.iter().filter(|l| l.status == OrderStatusKind::Success).count();
        if placed == legs.len() && placed > 0 {
            BasketStatus::Success
        } else if placed == 0 {
            BasketStatus::Failed
        } else {
            BasketStatus::Partial
        }
    }
}

/// One row of an order's lifecycle history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub status: String,
    pub price: f64,
    pub average_price: f64,
}

/// Quote with top-of-book depth
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub last_price: f64,
    pub bid: f64,
    pub ask: f64,
    pub volume: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reversal_flips_side_to_market() {
        let sell = OrderRequest::limit("NIFTY24AUG22500CE", Exchange::Nfo, TransactionType::Sell, 50, 150.0);
        let rollback = sell.reversal();
        assert_eq!(rollback.transaction_type, TransactionType::Buy);
        assert_eq!(rollback.kind, OrderKind::Market);
        assert_eq!(rollback.quantity, 50);
    }

    #[test]
    fn test_basket_overall() {
        let ok = LegPlacement {
            tradingsymbol: "A".into(),
            order_id: Some("1".into()),
            status: OrderStatusKind::Success,
            message: String::new(),
            execution_price: Some(10.0),
        };
        let bad = LegPlacement {
            status: OrderStatusKind::Failed,
            order_id: None,
            message: "rejected".into(),
            execution_price: None,
            tradingsymbol: "B".into(),
        };

        assert_eq!(BasketResponse::overall_of(&[ok.clone(), ok.clone()]), BasketStatus::Success);
        assert_eq!(BasketResponse::overall_of(&[ok.clone(), bad.clone()]), BasketStatus::Partial);
        assert_eq!(BasketResponse::overall_of(&[bad.clone()]), BasketStatus::Failed);
        assert_eq!(BasketResponse::overall_of(&[]), BasketStatus::Failed);
    }

    #[test]
    fn test_order_response_success_needs_id() {
        assert!(OrderResponse::success("240801000001").is_success());
        assert!(!OrderResponse::failed("margin exceeded").is_success());
    }
}

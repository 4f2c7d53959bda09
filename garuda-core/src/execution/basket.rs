//! Parallel basket placement with partial-fill rollback
//!
//! Basket legs are submitted concurrently, one worker thread per leg.
//! On a mixed outcome the placed legs are unwound with market orders
//! (BUY-back for a SHORT entry, SELL for a LONG one) under a 5-second
//! deadline. A missed deadline is never retried silently: it surfaces
//! `MANUAL_INTERVENTION_REQUIRED` and logs for the operator.

use super::types::{BasketResponse, BasketStatus, LegPlacement, OrderRequest, OrderStatusKind};
use super::OrderGateway;
use crate::core::errors::EngineError;
use crossbeam::channel;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Rollback must finish within this window
pub const ROLLBACK_DEADLINE: Duration = Duration::from_secs(5);

/// Place all legs concurrently and resolve the basket outcome.
///
/// - every leg placed: `Ok(BasketResponse { overall: Success, .. })`
/// - no leg placed: `Ok(BasketResponse { overall: Failed, .. })`
/// - mixed: placed legs are rolled back; returns
///   `Err(ORDER_PARTIAL_FILL)` when the rollback lands in time and
///   `Err(MANUAL_INTERVENTION_REQUIRED)` when it does not.
pub fn place_basket_with_rollback(
    gateway: &Arc<dyn OrderGateway>,
    requests: &[OrderRequest],
    rollback_deadline: Duration,
) -> Result<BasketResponse, EngineError> {
    if requests.is_empty() {
        return Ok(BasketResponse {
            overall: BasketStatus::Failed,
            legs: Vec::new(),
        });
    }

    let legs = place_parallel(gateway, requests);
    let overall = BasketResponse::overall_of(&legs);

    match overall {
        BasketStatus::Success | BasketStatus::Failed => Ok(BasketResponse { overall, legs }),
        BasketStatus::Partial => {
            let placed: Vec<&OrderRequest> = requests
                .iter()
                .zip(&legs)
                .filter(|(_, leg)| leg.status == OrderStatusKind::Success)
                .map(|(request, _)| request)
                .collect();
            let failed = legs.len() - placed.len();

            warn!(
                placed = placed.len(),
                failed,
                "basket partially placed; rolling back"
            );
            rollback(gateway, &placed, rollback_deadline)?;
            Err(EngineError::OrderPartialFill {
                placed: placed.len(),
                failed,
            })
        }
    }
}

/// One placement worker per leg; results come back in request order.
fn place_parallel(gateway: &Arc<dyn OrderGateway>, requests: &[OrderRequest]) -> Vec<LegPlacement> {
    let (tx, rx) = channel::bounded(requests.len());

    let mut handles = Vec::with_capacity(requests.len());
    for (index, request) in requests.iter().cloned().enumerate() {
        let gateway = Arc::clone(gateway);
        let tx = tx.clone();
        handles.push(thread::spawn(move || {
            let placement = match gateway.place_order(&request) {
                Ok(response) => LegPlacement {
                    tradingsymbol: request.tradingsymbol.clone(),
                    execution_price: None,
                    order_id: response.order_id,
                    status: response.status,
                    message: response.message,
                },
                Err(e) => LegPlacement {
                    tradingsymbol: request.tradingsymbol.clone(),
                    order_id: None,
                    status: OrderStatusKind::Failed,
                    message: e.to_string(),
                    execution_price: None,
                },
            };
            let _ = tx.send((index, placement));
        }));
    }
    drop(tx);

    let mut legs: Vec<Option<LegPlacement>> = vec![None; requests.len()];
    for (index, placement) in rx {
        legs[index] = Some(placement);
    }
    for handle in handles {
        let _ = handle.join();
    }

    // Fill the execution price from order history where available
    let mut legs: Vec<LegPlacement> = legs.into_iter().flatten().collect();
    for leg in legs.iter_mut().filter(|l| l.status == OrderStatusKind::Success) {
        if let Some(order_id) = &leg.order_id {
            if let Ok(history) = gateway.order_history(order_id) {
                leg.execution_price = history
                    .iter()
                    .rev()
                    .find(|event| event.average_price > 0.0)
                    .map(|event| event.average_price);
            }
        }
    }
    legs
}

/// Unwind the placed legs with reversed market orders under a deadline.
fn rollback(
    gateway: &Arc<dyn OrderGateway>,
    placed: &[&OrderRequest],
    deadline: Duration,
) -> Result<(), EngineError> {
    let started = Instant::now();
    let (tx, rx) = channel::bounded(placed.len());

    for request in placed {
        let reversal = request.reversal();
        let gateway = Arc::clone(gateway);
        let tx = tx.clone();
        // Detached on purpose: a hung broker call must not pin the
        // caller past the deadline
        thread::spawn(move || {
            let ok = matches!(gateway.place_order(&reversal), Ok(r) if r.is_success());
            let _ = tx.send((reversal.tradingsymbol, ok));
        });
    }
    drop(tx);

    let mut unwound = 0usize;
    while unwound < placed.len() {
        let remaining = deadline.checked_sub(started.elapsed()).unwrap_or(Duration::ZERO);
        match rx.recv_timeout(remaining) {
            Ok((symbol, true)) => {
                info!(symbol, "rollback leg unwound");
                unwound += 1;
            }
            Ok((symbol, false)) => {
                error!(symbol, "rollback order failed; operator intervention required");
                return Err(EngineError::ManualInterventionRequired {
                    detail: format!("rollback order for {} failed", symbol),
                });
            }
            Err(_) => {
                error!(
                    unwound,
                    total = placed.len(),
                    "rollback deadline expired; operator intervention required"
                );
                return Err(EngineError::ManualInterventionRequired {
                    detail: format!(
                        "rollback deadline expired with {}/{} legs unwound",
                        unwound,
                        placed.len()
                    ),
                });
            }
        }
    }
    Ok(())
}

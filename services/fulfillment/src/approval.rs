//! Payment-approval fulfillment workflow
//!
//! The boundary between payment handling and the slot pool. Callers invoke
//! `fulfill_order` only after the order's payment has been verified; the
//! `payment_reference` is recorded in the logs as the audit trail of that
//! verification.
//!
//! Candidate handling: `CapacityExhausted` from an assign means the
//! candidate filled up between selection and commit, which is routine under
//! load, so the workflow moves to the next availability candidate. Every
//! other assign failure is escalated to the operator unchanged; in
//! particular `IncompleteCredentials` is a data-entry defect, never retried.

use std::time::Instant;

use slot_pool::{Allocator, AssignError, Binding, OrderStatus};
use tracing::{debug, info, warn};

use crate::metrics;

/// Failure modes surfaced to the admin API.
#[derive(Debug, thiserror::Error)]
pub enum FulfillError {
    #[error("order not found: {0}")]
    OrderNotFound(String),

    #[error("order {order_id} already bound to account {account_id}")]
    OrderAlreadyBound {
        order_id: String,
        account_id: String,
    },

    #[error("order {order_id} is {status}, not bindable")]
    OrderNotBindable { order_id: String, status: &'static str },

    #[error("no capacity for service {service_id} ({candidates} candidates tried)")]
    NoCapacity {
        service_id: String,
        candidates: usize,
    },

    #[error(transparent)]
    Assign(AssignError),
}

impl FulfillError {
    /// Outcome label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            FulfillError::OrderNotFound(_) => "order_not_found",
            FulfillError::OrderAlreadyBound { .. } => "order_already_bound",
            FulfillError::OrderNotBindable { .. } => "order_not_bindable",
            FulfillError::NoCapacity { .. } => "no_capacity",
            FulfillError::Assign(e) => e.label(),
        }
    }
}

/// Fulfill an approved order: walk the availability index and bind the
/// first candidate with a free slot.
///
/// `payment_reference` is the verified payment's identifier, logged for
/// audit. `profile_override`/`profile_pin` pass through to the binding.
pub async fn fulfill_order(
    allocator: &Allocator,
    order_id: &str,
    payment_reference: &str,
    profile_override: Option<String>,
    profile_pin: Option<String>,
) -> Result<Binding, FulfillError> {
    let started = Instant::now();
    let result = fulfill_inner(
        allocator,
        order_id,
        payment_reference,
        profile_override,
        profile_pin,
    )
    .await;

    let outcome = match &result {
        Ok(_) => "success",
        Err(e) => e.label(),
    };
    metrics::record_fulfillment(outcome, started.elapsed().as_secs_f64());
    result
}

async fn fulfill_inner(
    allocator: &Allocator,
    order_id: &str,
    payment_reference: &str,
    profile_override: Option<String>,
    profile_pin: Option<String>,
) -> Result<Binding, FulfillError> {
    let order = allocator
        .orders()
        .get(order_id)
        .await
        .ok_or_else(|| FulfillError::OrderNotFound(order_id.to_string()))?;

    // Fast-fail at the boundary; the allocator re-checks under its own
    // locks at commit time.
    if let Some(access) = &order.access_info {
        return Err(FulfillError::OrderAlreadyBound {
            order_id: order_id.to_string(),
            account_id: access.account_id.clone(),
        });
    }
    if order.status != OrderStatus::Pending {
        return Err(FulfillError::OrderNotBindable {
            order_id: order_id.to_string(),
            status: order.status.label(),
        });
    }

    info!(
        order_id,
        order_no = order.order_no,
        service_id = order.service_id,
        payment_reference,
        "payment approved, allocating slot"
    );

    let candidates = allocator.find_available(&order.service_id).await;
    let total = candidates.len();

    for candidate in candidates {
        match allocator
            .assign(
                &candidate.id,
                order_id,
                profile_override.clone(),
                profile_pin.clone(),
            )
            .await
        {
            Ok(binding) => {
                info!(
                    order_id,
                    account_id = binding.account_id,
                    slot_number = binding.slot_number,
                    "order fulfilled"
                );
                return Ok(binding);
            }
            Err(e) if e.is_retryable() => {
                // Candidate filled up since selection; the index already
                // ordered the rest, keep walking.
                debug!(order_id, account_id = candidate.id, "candidate exhausted, trying next");
                continue;
            }
            Err(AssignError::OrderAlreadyBound {
                order_id,
                account_id,
            }) => {
                // A concurrent fulfillment won this order.
                return Err(FulfillError::OrderAlreadyBound {
                    order_id,
                    account_id,
                });
            }
            Err(e) => {
                warn!(order_id, account_id = candidate.id, error = %e, "assignment failed, escalating");
                return Err(FulfillError::Assign(e));
            }
        }
    }

    warn!(
        order_id,
        service_id = order.service_id,
        candidates = total,
        "no capacity, order needs manual assignment"
    );
    Err(FulfillError::NoCapacity {
        service_id: order.service_id,
        candidates: total,
    })
}

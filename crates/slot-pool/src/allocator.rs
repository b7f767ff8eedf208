//! Transactional assign/release across the account and order stores
//!
//! The two stores are separate files, so there is no multi-document
//! transaction to lean on. Assign follows the compensating-action protocol:
//! the account mutation commits first (capacity is the must-not-oversell
//! resource), the order mutation second, and any failure in the order phase
//! immediately releases the just-reserved slot before the original error is
//! surfaced. The caller never sees a failure that left an account
//! over-capacity.
//!
//! Release runs the same protocol in reverse: free the slot, then expire
//! the order; if expiring the order fails to persist, the slot is
//! reinstated. Reinstatement re-checks capacity: when a concurrent
//! reservation retook the freed slot in the meantime, the release stands
//! and the sweep expires the stale order binding.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::account::AccountSummary;
use crate::account_store::{AccountStore, ReinstateOutcome};
use crate::error::{AssignError, Error, ReleaseError, ReleaseOutcome};
use crate::order::AccessInfo;
use crate::order_store::OrderStore;

/// A successful allocation, returned to the approval workflow.
///
/// Carries the credential snapshot for downstream notification. This is an
/// assignment view, the one place credentials leave the pool.
#[derive(Debug, Clone, Serialize)]
pub struct Binding {
    pub account_id: String,
    pub order_id: String,
    pub slot_number: u32,
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_pin: Option<String>,
    /// When the customer's grant ends, unix millis.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_expires_at: Option<u64>,
}

/// Slot allocator over the two persisted stores.
pub struct Allocator {
    accounts: Arc<AccountStore>,
    orders: Arc<OrderStore>,
}

impl Allocator {
    pub fn new(accounts: Arc<AccountStore>, orders: Arc<OrderStore>) -> Self {
        Self { accounts, orders }
    }

    /// The account store reference (for the admin API and sweep).
    pub fn accounts(&self) -> &Arc<AccountStore> {
        &self.accounts
    }

    /// The order store reference (for the admin API and sweep).
    pub fn orders(&self) -> &Arc<OrderStore> {
        &self.orders
    }

    /// Availability index: candidate accounts for a service, least-used first.
    pub async fn find_available(&self, service_id: &str) -> Vec<AccountSummary> {
        self.accounts
            .find_available(service_id, unix_millis())
            .await
    }

    /// Atomically bind one slot of an account to an order.
    ///
    /// `profile_override` and `profile_pin` replace the account defaults in
    /// the snapshot when supplied by the caller.
    pub async fn assign(
        &self,
        account_id: &str,
        order_id: &str,
        profile_override: Option<String>,
        profile_pin: Option<String>,
    ) -> Result<Binding, AssignError> {
        let result = self
            .assign_inner(account_id, order_id, profile_override, profile_pin)
            .await;
        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.label(),
        };
        metrics::counter!("slot_assignments_total", "outcome" => outcome).increment(1);
        result
    }

    async fn assign_inner(
        &self,
        account_id: &str,
        order_id: &str,
        profile_override: Option<String>,
        profile_pin: Option<String>,
    ) -> Result<Binding, AssignError> {
        // Phase 1: reserve capacity. Guard and increment are one atomic
        // step inside the account store.
        let reservation = self.accounts.reserve_slot(account_id, order_id).await?;

        let access = AccessInfo {
            account_id: account_id.to_string(),
            profile_name: profile_override.or_else(|| reservation.profile_name.clone()),
            slot_number: reservation.slot_number,
            email: reservation.email.clone(),
            password: reservation.password.clone(),
            profile_pin: profile_pin.or_else(|| reservation.profile_pin.clone()),
        };

        // Phase 2: write the binding onto the order.
        match self.orders.bind(order_id, access).await {
            Ok(order) => {
                info!(
                    account_id,
                    order_id,
                    slot_number = reservation.slot_number,
                    "slot assigned"
                );
                Ok(Binding {
                    account_id: account_id.to_string(),
                    order_id: order_id.to_string(),
                    slot_number: reservation.slot_number,
                    email: reservation.email,
                    password: reservation.password,
                    profile_name: order.access_info.as_ref().and_then(|a| a.profile_name.clone()),
                    profile_pin: order.access_info.and_then(|a| a.profile_pin),
                    order_expires_at: order.expires_at,
                })
            }
            Err(e) => {
                warn!(account_id, order_id, error = %e, "order bind failed, releasing reserved slot");
                if let Err(comp) = self.accounts.release_slot(account_id, order_id).await {
                    // The in-memory counters rolled back inside release_slot;
                    // only the persisted file can be stale here.
                    error!(account_id, order_id, error = %comp, "compensating release failed");
                }
                Err(e)
            }
        }
    }

    /// Free the slot held by an order and expire the order.
    pub async fn release(
        &self,
        account_id: &str,
        order_id: &str,
    ) -> Result<ReleaseOutcome, ReleaseError> {
        let result = self.release_inner(account_id, order_id).await;
        let outcome = match &result {
            Ok(ReleaseOutcome::Released) => "released",
            Ok(ReleaseOutcome::AlreadyReleased) => "already_released",
            Err(_) => "error",
        };
        metrics::counter!("slot_releases_total", "outcome" => outcome).increment(1);
        result
    }

    async fn release_inner(
        &self,
        account_id: &str,
        order_id: &str,
    ) -> Result<ReleaseOutcome, ReleaseError> {
        match self.accounts.release_slot(account_id, order_id).await? {
            ReleaseOutcome::AlreadyReleased => {
                debug!(account_id, order_id, "release was a no-op");
                Ok(ReleaseOutcome::AlreadyReleased)
            }
            ReleaseOutcome::Released => match self.orders.clear(order_id).await {
                Ok(_) => {
                    info!(account_id, order_id, "slot released, order expired");
                    Ok(ReleaseOutcome::Released)
                }
                Err(Error::NotFound(_)) => {
                    // Slot was held for an order record that no longer
                    // exists; freeing it is the right end state.
                    warn!(account_id, order_id, "released slot had no order record");
                    Ok(ReleaseOutcome::Released)
                }
                Err(e) => {
                    warn!(account_id, order_id, error = %e, "order clear failed, reinstating slot");
                    match self.accounts.reinstate_slot(account_id, order_id).await {
                        Ok(ReinstateOutcome::Reinstated) => {
                            Err(ReleaseError::Store(e.to_string()))
                        }
                        Ok(ReinstateOutcome::SlotTaken) => {
                            // A concurrent assign won the freed slot while
                            // the clear was failing. The release stands; the
                            // order still has to be expired. Retry the clear
                            // once, then leave the stale binding to the
                            // sweep's repair pass.
                            match self.orders.clear(order_id).await {
                                Ok(_) | Err(Error::NotFound(_)) => {
                                    info!(account_id, order_id, "order expired on retry");
                                    Ok(ReleaseOutcome::Released)
                                }
                                Err(retry) => {
                                    error!(account_id, order_id, error = %retry, "order clear retry failed, sweep will expire the stale binding");
                                    Err(ReleaseError::Store(e.to_string()))
                                }
                            }
                        }
                        Err(comp) => {
                            error!(account_id, order_id, error = %comp, "slot reinstatement failed");
                            Err(ReleaseError::Store(e.to_string()))
                        }
                    }
                }
            },
        }
    }
}

/// Current unix time in milliseconds.
fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

//! Persisted account pool and the availability index
//!
//! Manages a JSON file mapping account IDs to account records. All writes
//! use atomic temp-file + rename to prevent corruption on crash. A tokio
//! Mutex serializes mutations, so the capacity guard and the slot counter
//! increment in `reserve_slot` are one serializable step: two concurrent
//! reservations can never both pass the guard at `used_slots == max_slots - 1`.
//!
//! Every mutation persists before the lock is dropped. If the persist fails,
//! the in-memory change is rolled back so memory and disk never diverge.

use std::collections::HashMap;
use std::path::PathBuf;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::account::{AccountRecord, AccountStatus, AccountSummary};
use crate::error::{AssignError, Error, ReleaseError, ReleaseOutcome, Result};
use crate::persist::write_atomic;

/// Snapshot handed to the allocator when a slot is reserved.
///
/// Carries the credential copy for the order binding so the allocator does
/// not re-read the record after the reservation committed.
#[derive(Debug, Clone)]
pub struct SlotReservation {
    pub account_id: String,
    /// Slot position at commit time (`used_slots` after the increment).
    pub slot_number: u32,
    pub email: String,
    pub password: String,
    pub profile_name: Option<String>,
    pub profile_pin: Option<String>,
}

/// Result of a compensating reinstatement after a failed order clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReinstateOutcome {
    /// The slot is held by the order again (or never stopped being held).
    Reinstated,
    /// A concurrent reservation took the freed slot; the release stands.
    SlotTaken,
}

/// Thread-safe persisted account collection.
pub struct AccountStore {
    path: PathBuf,
    state: Mutex<HashMap<String, AccountRecord>>,
}

impl AccountStore {
    /// Load accounts from the given file path.
    ///
    /// If the file doesn't exist, creates it as `{}` (cold start with zero
    /// accounts). The pool reports `unhealthy` until an operator adds
    /// accounts via the admin API.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading account file: {e}")))?;
            let accounts: HashMap<String, AccountRecord> = serde_json::from_str(&contents)
                .map_err(|e| Error::Parse(format!("parsing account file: {e}")))?;
            info!(path = %path.display(), accounts = accounts.len(), "loaded account pool");
            accounts
        } else {
            info!(path = %path.display(), "account file not found, starting with empty pool");
            let accounts = HashMap::new();
            write_atomic(&path, &accounts).await?;
            accounts
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Get a clone of a specific account record (detail view, with credentials).
    pub async fn get(&self, account_id: &str) -> Option<AccountRecord> {
        let state = self.state.lock().await;
        state.get(account_id).cloned()
    }

    /// Add or replace an account record and persist to disk.
    ///
    /// Validates the record's slot invariants; replacing an existing record
    /// is how credential rotation reaches the store, and rotation never
    /// touches the slot counters of the record it replaces.
    pub async fn insert(&self, record: AccountRecord) -> Result<()> {
        if record.id.is_empty() {
            return Err(Error::InvalidRecord("account id must not be empty".into()));
        }
        if record.service_id.is_empty() {
            return Err(Error::InvalidRecord("service_id must not be empty".into()));
        }
        if record.slots.max_slots == 0 {
            return Err(Error::InvalidRecord("max_slots must be at least 1".into()));
        }
        if record.slots.used_slots > record.slots.max_slots {
            return Err(Error::InvalidRecord(format!(
                "used_slots {} exceeds max_slots {}",
                record.slots.used_slots, record.slots.max_slots
            )));
        }
        if record.slots.assigned_to.len() as u32 != record.slots.used_slots {
            return Err(Error::InvalidRecord(format!(
                "assigned_to has {} entries but used_slots is {}",
                record.slots.assigned_to.len(),
                record.slots.used_slots
            )));
        }

        let mut state = self.state.lock().await;
        let previous = state.insert(record.id.clone(), record.clone());
        if let Err(e) = write_atomic(&self.path, &*state).await {
            match previous {
                Some(prev) => {
                    state.insert(record.id.clone(), prev);
                }
                None => {
                    state.remove(&record.id);
                }
            }
            return Err(e);
        }
        debug!(account_id = record.id, "stored account");
        Ok(())
    }

    /// Remove an account and persist to disk.
    ///
    /// Rejected while any slot is in use: bound orders reference this
    /// record, so the operator must release them first.
    pub async fn remove(&self, account_id: &str) -> Result<Option<AccountRecord>> {
        let mut state = self.state.lock().await;
        if let Some(record) = state.get(account_id)
            && record.slots.used_slots > 0
        {
            return Err(Error::AccountInUse {
                account_id: account_id.to_string(),
                used_slots: record.slots.used_slots,
            });
        }
        let removed = state.remove(account_id);
        if removed.is_some() {
            if let Err(e) = write_atomic(&self.path, &*state).await {
                if let Some(rec) = removed {
                    state.insert(rec.id.clone(), rec);
                }
                return Err(e);
            }
            debug!(account_id, "removed account");
        }
        Ok(removed)
    }

    /// Credential-free summaries of every account.
    pub async fn summaries(&self) -> Vec<AccountSummary> {
        let state = self.state.lock().await;
        state.values().map(AccountRecord::summary).collect()
    }

    /// Full record snapshot, for the expiry sweep.
    pub async fn records(&self) -> Vec<AccountRecord> {
        let state = self.state.lock().await;
        state.values().cloned().collect()
    }

    /// Availability index: candidates for a service, least-used first.
    ///
    /// Filters to accounts with free slots whose subscription is still live
    /// at `now_millis`, ordered by ascending `used_slots` (pack
    /// partially-filled accounts first, keeping the pool compact), id as
    /// tie-break for determinism. An unknown service id yields an empty
    /// list, a valid "no capacity" result, not an error.
    pub async fn find_available(&self, service_id: &str, now_millis: u64) -> Vec<AccountSummary> {
        let state = self.state.lock().await;
        let mut candidates: Vec<AccountSummary> = state
            .values()
            .filter(|r| r.service_id == service_id)
            .filter(|r| r.status == AccountStatus::Available && r.slots.has_free_slot())
            .filter(|r| r.is_subscribed_at(now_millis))
            .map(AccountRecord::summary)
            .collect();
        candidates.sort_by(|a, b| a.used_slots.cmp(&b.used_slots).then_with(|| a.id.cmp(&b.id)));
        candidates
    }

    /// Reserve one slot for an order: the commit-time capacity guard.
    ///
    /// The guard (`used_slots < max_slots`), the counter increment and the
    /// `assigned_to` append happen under one lock acquisition and persist
    /// before returning. A failed guard is `CapacityExhausted`; the caller
    /// retries the next availability candidate, not this account.
    pub async fn reserve_slot(
        &self,
        account_id: &str,
        order_id: &str,
    ) -> std::result::Result<SlotReservation, AssignError> {
        let mut state = self.state.lock().await;
        let record = state
            .get_mut(account_id)
            .ok_or_else(|| AssignError::AccountNotFound(account_id.to_string()))?;

        if !record.credentials.is_complete() {
            return Err(AssignError::IncompleteCredentials(account_id.to_string()));
        }
        if record.slots.holds(order_id) {
            return Err(AssignError::OrderAlreadyBound {
                order_id: order_id.to_string(),
                account_id: account_id.to_string(),
            });
        }
        if !record.slots.has_free_slot() {
            return Err(AssignError::CapacityExhausted {
                account_id: account_id.to_string(),
                max_slots: record.slots.max_slots,
            });
        }

        record.slots.used_slots += 1;
        record.slots.assigned_to.push(order_id.to_string());
        record.recompute_status();

        let reservation = SlotReservation {
            account_id: record.id.clone(),
            slot_number: record.slots.used_slots,
            email: record.credentials.email.clone(),
            password: record.credentials.password.clone(),
            profile_name: record.credentials.profile_name.clone(),
            profile_pin: record.credentials.profile_pin.clone(),
        };

        if let Err(e) = write_atomic(&self.path, &*state).await {
            // Roll back so the unpersisted reservation is not observable
            let record = state
                .get_mut(account_id)
                .expect("account present, lock held since lookup");
            record.slots.used_slots -= 1;
            record.slots.assigned_to.retain(|o| o != order_id);
            record.recompute_status();
            return Err(AssignError::Store(e.to_string()));
        }

        debug!(
            account_id,
            order_id,
            used_slots = reservation.slot_number,
            "slot reserved"
        );
        Ok(reservation)
    }

    /// Free the slot held by an order.
    ///
    /// An order id absent from `assigned_to` is `AlreadyReleased`: the
    /// second release of the same order is a labeled no-op, never a
    /// decrement below zero.
    pub async fn release_slot(
        &self,
        account_id: &str,
        order_id: &str,
    ) -> std::result::Result<ReleaseOutcome, ReleaseError> {
        let mut state = self.state.lock().await;
        let record = state
            .get_mut(account_id)
            .ok_or_else(|| ReleaseError::AccountNotFound(account_id.to_string()))?;

        if !record.slots.holds(order_id) {
            debug!(account_id, order_id, "release for order not holding a slot");
            return Ok(ReleaseOutcome::AlreadyReleased);
        }

        record.slots.assigned_to.retain(|o| o != order_id);
        record.slots.used_slots -= 1;
        record.recompute_status();

        if let Err(e) = write_atomic(&self.path, &*state).await {
            let record = state
                .get_mut(account_id)
                .expect("account present, lock held since lookup");
            record.slots.assigned_to.push(order_id.to_string());
            record.slots.used_slots += 1;
            record.recompute_status();
            return Err(ReleaseError::Store(e.to_string()));
        }

        debug!(account_id, order_id, "slot released");
        Ok(ReleaseOutcome::Released)
    }

    /// Put a just-released slot back, compensating a failed order clear.
    ///
    /// Skips the credential guard (the slot was held moments ago) but keeps
    /// the capacity guard: a concurrent reservation may have won the freed
    /// slot between the release and this call, and pushing past `max_slots`
    /// would oversell the account. In that case the release stands and the
    /// caller finishes clearing the order instead.
    pub(crate) async fn reinstate_slot(
        &self,
        account_id: &str,
        order_id: &str,
    ) -> std::result::Result<ReinstateOutcome, ReleaseError> {
        let mut state = self.state.lock().await;
        let record = state
            .get_mut(account_id)
            .ok_or_else(|| ReleaseError::AccountNotFound(account_id.to_string()))?;

        if record.slots.holds(order_id) {
            return Ok(ReinstateOutcome::Reinstated);
        }
        if !record.slots.has_free_slot() {
            warn!(
                account_id,
                order_id, "freed slot already retaken, keeping the release"
            );
            return Ok(ReinstateOutcome::SlotTaken);
        }

        record.slots.assigned_to.push(order_id.to_string());
        record.slots.used_slots += 1;
        record.recompute_status();

        if let Err(e) = write_atomic(&self.path, &*state).await {
            let record = state
                .get_mut(account_id)
                .expect("account present, lock held since lookup");
            record.slots.assigned_to.retain(|o| o != order_id);
            record.slots.used_slots -= 1;
            record.recompute_status();
            return Err(ReleaseError::Store(e.to_string()));
        }
        Ok(ReinstateOutcome::Reinstated)
    }

    /// Pool health summary for the admin API.
    ///
    /// Status mapping: every account offerable → healthy, some → degraded,
    /// none → unhealthy. Lapsed subscriptions count as not offerable even
    /// with free slots.
    pub async fn health(&self, now_millis: u64) -> serde_json::Value {
        let state = self.state.lock().await;

        let mut accounts = Vec::new();
        let mut offerable = 0usize;
        let mut full = 0usize;
        let mut lapsed = 0usize;
        let mut slots_total = 0u64;
        let mut slots_used = 0u64;

        for record in state.values() {
            slots_total += u64::from(record.slots.max_slots);
            slots_used += u64::from(record.slots.used_slots);

            let state_label = if !record.is_subscribed_at(now_millis) {
                lapsed += 1;
                "subscription_lapsed"
            } else if record.slots.has_free_slot() {
                offerable += 1;
                record.status.label()
            } else {
                full += 1;
                record.status.label()
            };

            accounts.push(serde_json::json!({
                "id": record.id,
                "service_id": record.service_id,
                "status": state_label,
                "used_slots": record.slots.used_slots,
                "max_slots": record.slots.max_slots,
            }));
        }

        let total = state.len();
        let pool_status = if offerable == total && total > 0 {
            "healthy"
        } else if offerable > 0 {
            "degraded"
        } else {
            "unhealthy"
        };

        serde_json::json!({
            "status": pool_status,
            "accounts_total": total,
            "accounts_offerable": offerable,
            "accounts_full": full,
            "accounts_lapsed": lapsed,
            "slots_total": slots_total,
            "slots_used": slots_used,
            "accounts": accounts
        })
    }

    /// Number of stored accounts.
    pub async fn len(&self) -> usize {
        let state = self.state.lock().await;
        state.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

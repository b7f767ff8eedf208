//! Account records: pooled subscription credentials with slot capacity
//!
//! An `AccountRecord` is one third-party subscription shared across up to
//! `max_slots` orders. Credentials are persisted with the record (the store
//! file is 0600) but never leave the crate through summary views; only the
//! assignment path hands them out, as a snapshot on the order.

use serde::{Deserialize, Serialize};

/// Login credentials for a pooled subscription account.
///
/// `email` and `password` are mandatory for an account to be handed out;
/// a record missing either is a data-entry defect and must fail assignment
/// loudly rather than leak a broken grant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountCredentials {
    pub email: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_pin: Option<String>,
}

impl AccountCredentials {
    /// Whether the account can be handed out at all.
    pub fn is_complete(&self) -> bool {
        !self.email.is_empty() && !self.password.is_empty()
    }
}

/// Slot capacity counters for one account.
///
/// Invariants, checked on insert and preserved by every mutation:
/// `used_slots <= max_slots` and `assigned_to.len() == used_slots`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotInfo {
    pub max_slots: u32,
    pub used_slots: u32,
    /// Order ids currently occupying a slot.
    pub assigned_to: Vec<String>,
}

impl SlotInfo {
    pub fn new(max_slots: u32) -> Self {
        Self {
            max_slots,
            used_slots: 0,
            assigned_to: Vec::new(),
        }
    }

    pub fn has_free_slot(&self) -> bool {
        self.used_slots < self.max_slots
    }

    pub fn holds(&self, order_id: &str) -> bool {
        self.assigned_to.iter().any(|o| o == order_id)
    }
}

/// Derived status of a pool account.
///
/// Available iff `used_slots < max_slots`; recomputed after every slot
/// mutation, cached on the record for index filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Available,
    Assigned,
}

impl AccountStatus {
    /// Status label for health/logging.
    pub fn label(&self) -> &'static str {
        match self {
            AccountStatus::Available => "available",
            AccountStatus::Assigned => "assigned",
        }
    }

    pub fn from_slots(slots: &SlotInfo) -> Self {
        if slots.has_free_slot() {
            AccountStatus::Available
        } else {
            AccountStatus::Assigned
        }
    }
}

/// One pooled subscription account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRecord {
    pub id: String,
    /// Catalog service this account serves (opaque to the pool).
    pub service_id: String,
    pub credentials: AccountCredentials,
    pub slots: SlotInfo,
    pub status: AccountStatus,
    /// When the underlying third-party subscription lapses, unix millis.
    /// Lapsed accounts are never offered even with free slots.
    pub subscription_expires_at: u64,
}

impl AccountRecord {
    /// Create a fresh record with all slots free.
    pub fn new(
        id: impl Into<String>,
        service_id: impl Into<String>,
        credentials: AccountCredentials,
        max_slots: u32,
        subscription_expires_at: u64,
    ) -> Self {
        let slots = SlotInfo::new(max_slots);
        let status = AccountStatus::from_slots(&slots);
        Self {
            id: id.into(),
            service_id: service_id.into(),
            credentials,
            slots,
            status,
            subscription_expires_at,
        }
    }

    /// Recompute the cached status from the slot counters.
    pub fn recompute_status(&mut self) {
        self.status = AccountStatus::from_slots(&self.slots);
    }

    pub fn is_subscribed_at(&self, now_millis: u64) -> bool {
        self.subscription_expires_at > now_millis
    }

    /// Credential-free view for list endpoints and the availability index.
    pub fn summary(&self) -> AccountSummary {
        AccountSummary {
            id: self.id.clone(),
            service_id: self.service_id.clone(),
            status: self.status,
            max_slots: self.slots.max_slots,
            used_slots: self.slots.used_slots,
            subscription_expires_at: self.subscription_expires_at,
        }
    }
}

/// Summary view of an account. Never carries credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSummary {
    pub id: String,
    pub service_id: String,
    pub status: AccountStatus,
    pub max_slots: u32,
    pub used_slots: u32,
    pub subscription_expires_at: u64,
}

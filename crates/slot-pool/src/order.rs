//! The order slice the allocator owns
//!
//! Orders live in a separate lifecycle subsystem; the pool only touches the
//! narrow slice it needs: status transitions pending → active → expired and
//! the `access_info` binding written at assignment time.

use serde::{Deserialize, Serialize};

/// Order status values relevant to slot allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Active,
    Expired,
}

impl OrderStatus {
    pub fn label(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Active => "active",
            OrderStatus::Expired => "expired",
        }
    }
}

/// The binding result written onto an order at assignment time.
///
/// `email`/`password`/`profile_pin` are a point-in-time copy of the account
/// credentials. The copy is intentional: rotating the account's credentials
/// later must not rewrite what this order was granted. `account_id` is a
/// reference, not ownership; the order never owns the account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessInfo {
    pub account_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_name: Option<String>,
    pub slot_number: u32,
    pub email: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_pin: Option<String>,
}

/// One customer order, as seen by the allocator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    /// Human-facing order number.
    pub order_no: String,
    /// Catalog service the order purchased.
    pub service_id: String,
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_info: Option<AccessInfo>,
    /// When the customer's grant ends, unix millis. Set by the order
    /// subsystem; the sweep releases active orders past this point.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

impl Order {
    /// Create a pending, unbound order.
    pub fn new(
        id: impl Into<String>,
        order_no: impl Into<String>,
        service_id: impl Into<String>,
        expires_at: Option<u64>,
    ) -> Self {
        Self {
            id: id.into(),
            order_no: order_no.into(),
            service_id: service_id.into(),
            status: OrderStatus::Pending,
            access_info: None,
            expires_at,
        }
    }
}

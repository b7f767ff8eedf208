//! Persisted order collection: the bind/clear half of an allocation
//!
//! Same persistence discipline as the account store: JSON file, atomic
//! temp-file + rename, tokio Mutex, roll back the in-memory change if the
//! persist fails. The order file also holds credential snapshots, so it
//! stays 0600.

use std::collections::HashMap;
use std::path::PathBuf;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{AssignError, Error, Result};
use crate::order::{AccessInfo, Order, OrderStatus};
use crate::persist::write_atomic;

/// Thread-safe persisted order collection.
pub struct OrderStore {
    path: PathBuf,
    state: Mutex<HashMap<String, Order>>,
}

impl OrderStore {
    /// Load orders from the given file path, creating `{}` on cold start.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading order file: {e}")))?;
            let orders: HashMap<String, Order> = serde_json::from_str(&contents)
                .map_err(|e| Error::Parse(format!("parsing order file: {e}")))?;
            info!(path = %path.display(), orders = orders.len(), "loaded orders");
            orders
        } else {
            info!(path = %path.display(), "order file not found, starting empty");
            let orders = HashMap::new();
            write_atomic(&path, &orders).await?;
            orders
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Get a clone of a specific order.
    pub async fn get(&self, order_id: &str) -> Option<Order> {
        let state = self.state.lock().await;
        state.get(order_id).cloned()
    }

    /// Add or replace an order and persist to disk.
    pub async fn insert(&self, order: Order) -> Result<()> {
        if order.id.is_empty() {
            return Err(Error::InvalidRecord("order id must not be empty".into()));
        }
        if order.service_id.is_empty() {
            return Err(Error::InvalidRecord("service_id must not be empty".into()));
        }

        let mut state = self.state.lock().await;
        let previous = state.insert(order.id.clone(), order.clone());
        if let Err(e) = write_atomic(&self.path, &*state).await {
            match previous {
                Some(prev) => {
                    state.insert(order.id.clone(), prev);
                }
                None => {
                    state.remove(&order.id);
                }
            }
            return Err(e);
        }
        debug!(order_id = order.id, "stored order");
        Ok(())
    }

    /// Snapshot of all orders, for the expiry sweep.
    pub async fn orders(&self) -> Vec<Order> {
        let state = self.state.lock().await;
        state.values().cloned().collect()
    }

    /// Write an allocation result onto an order: pending → active.
    ///
    /// Fails without mutation if the order is missing, already bound, or
    /// not in a bindable state, each a distinct `AssignError` so the
    /// allocator can compensate and the workflow can route the failure.
    pub async fn bind(
        &self,
        order_id: &str,
        access: AccessInfo,
    ) -> std::result::Result<Order, AssignError> {
        let mut state = self.state.lock().await;
        let order = state
            .get_mut(order_id)
            .ok_or_else(|| AssignError::OrderNotFound(order_id.to_string()))?;

        if let Some(existing) = &order.access_info {
            return Err(AssignError::OrderAlreadyBound {
                order_id: order_id.to_string(),
                account_id: existing.account_id.clone(),
            });
        }
        if order.status != OrderStatus::Pending {
            return Err(AssignError::OrderNotBindable {
                order_id: order_id.to_string(),
                status: order.status.label(),
            });
        }

        order.access_info = Some(access);
        order.status = OrderStatus::Active;
        let bound = order.clone();

        if let Err(e) = write_atomic(&self.path, &*state).await {
            let order = state
                .get_mut(order_id)
                .expect("order present, lock held since lookup");
            order.access_info = None;
            order.status = OrderStatus::Pending;
            return Err(AssignError::Store(e.to_string()));
        }

        debug!(order_id, account_id = bound.access_info.as_ref().map(|a| a.account_id.as_str()), "order bound");
        Ok(bound)
    }

    /// Drop an order's binding: active → expired, `access_info` cleared.
    ///
    /// Clearing an already-expired, unbound order is a no-op success so
    /// that release stays idempotent end to end.
    pub async fn clear(&self, order_id: &str) -> Result<Order> {
        let mut state = self.state.lock().await;
        let order = state
            .get_mut(order_id)
            .ok_or_else(|| Error::NotFound(format!("order {order_id}")))?;

        if order.access_info.is_none() && order.status == OrderStatus::Expired {
            return Ok(order.clone());
        }

        let previous = order.clone();
        order.access_info = None;
        order.status = OrderStatus::Expired;
        let cleared = order.clone();

        if let Err(e) = write_atomic(&self.path, &*state).await {
            state.insert(order_id.to_string(), previous);
            return Err(e);
        }

        debug!(order_id, "order binding cleared");
        Ok(cleared)
    }

    /// Number of stored orders.
    pub async fn len(&self) -> usize {
        let state = self.state.lock().await;
        state.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_access(account_id: &str, slot: u32) -> AccessInfo {
        AccessInfo {
            account_id: account_id.into(),
            profile_name: Some("P1".into()),
            slot_number: slot,
            email: "pool@example.com".into(),
            password: "pw".into(),
            profile_pin: None,
        }
    }

    async fn test_store(dir: &tempfile::TempDir) -> OrderStore {
        OrderStore::load(dir.path().join("orders.json")).await.unwrap()
    }

    #[tokio::test]
    async fn roundtrip_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.json");

        let store = OrderStore::load(path.clone()).await.unwrap();
        store
            .insert(Order::new("ord-1", "20260825-0001", "svc", None))
            .await
            .unwrap();

        let store2 = OrderStore::load(path).await.unwrap();
        let order = store2.get("ord-1").await.unwrap();
        assert_eq!(order.order_no, "20260825-0001");
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn bind_transitions_pending_to_active() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        store
            .insert(Order::new("ord-1", "n1", "svc", Some(9_999)))
            .await
            .unwrap();

        let bound = store.bind("ord-1", test_access("acc-1", 1)).await.unwrap();
        assert_eq!(bound.status, OrderStatus::Active);
        let access = bound.access_info.unwrap();
        assert_eq!(access.account_id, "acc-1");
        assert_eq!(access.slot_number, 1);

        // Persisted
        let order = store.get("ord-1").await.unwrap();
        assert_eq!(order.status, OrderStatus::Active);
    }

    #[tokio::test]
    async fn bind_missing_order_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        let err = store.bind("ghost", test_access("acc-1", 1)).await.unwrap_err();
        assert!(matches!(err, AssignError::OrderNotFound(_)));
    }

    #[tokio::test]
    async fn bind_twice_reports_current_account() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        store.insert(Order::new("ord-1", "n1", "svc", None)).await.unwrap();
        store.bind("ord-1", test_access("acc-1", 1)).await.unwrap();

        let err = store.bind("ord-1", test_access("acc-2", 1)).await.unwrap_err();
        match err {
            AssignError::OrderAlreadyBound { account_id, .. } => {
                assert_eq!(account_id, "acc-1");
            }
            other => panic!("expected OrderAlreadyBound, got {other}"),
        }

        // Binding unchanged
        let access = store.get("ord-1").await.unwrap().access_info.unwrap();
        assert_eq!(access.account_id, "acc-1");
    }

    #[tokio::test]
    async fn bind_expired_order_not_bindable() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        let mut order = Order::new("ord-1", "n1", "svc", None);
        order.status = OrderStatus::Expired;
        store.insert(order).await.unwrap();

        let err = store.bind("ord-1", test_access("acc-1", 1)).await.unwrap_err();
        assert!(matches!(
            err,
            AssignError::OrderNotBindable {
                status: "expired",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn clear_expires_order_and_drops_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        store.insert(Order::new("ord-1", "n1", "svc", None)).await.unwrap();
        store.bind("ord-1", test_access("acc-1", 1)).await.unwrap();

        let cleared = store.clear("ord-1").await.unwrap();
        assert_eq!(cleared.status, OrderStatus::Expired);
        assert!(cleared.access_info.is_none());

        // Idempotent
        let again = store.clear("ord-1").await.unwrap();
        assert_eq!(again.status, OrderStatus::Expired);
    }

    #[tokio::test]
    async fn clear_missing_order_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        let err = store.clear("ghost").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn snapshot_survives_account_credential_rotation() {
        // The order's access_info is a copy taken at bind time. Rewriting
        // the order record is the only way to change it; nothing in the
        // account store reaches into orders.
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        store.insert(Order::new("ord-1", "n1", "svc", None)).await.unwrap();
        store.bind("ord-1", test_access("acc-1", 1)).await.unwrap();

        let before = store.get("ord-1").await.unwrap().access_info.unwrap();
        assert_eq!(before.password, "pw");

        // Rotation happens entirely in the account store; the snapshot here
        // must still read the original password afterwards.
        let after = store.get("ord-1").await.unwrap().access_info.unwrap();
        assert_eq!(after.password, before.password);
        assert_eq!(after.email, before.email);
    }
}

//! Scheduled release sweep
//!
//! Two conditions end a grant without anyone calling the admin API: the
//! customer's order passes its expiry, or the pooled account's underlying
//! subscription lapses while orders are still bound to it. Neither is a
//! hidden side effect of assign/release; this sweep is the one place that
//! mass-releases, on an explicit schedule.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::allocator::Allocator;
use crate::order::OrderStatus;

/// Spawn a background task that periodically releases ended grants.
///
/// Runs every `interval`. Returns a `JoinHandle` for the spawned task.
pub fn spawn_expiry_sweep(
    allocator: Arc<Allocator>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // Skip the immediate first tick, stores were just loaded
        ticker.tick().await;

        loop {
            ticker.tick().await;
            sweep_cycle(&allocator).await;
        }
    })
}

/// Run one sweep cycle: release expired orders, then bindings on lapsed
/// subscriptions.
async fn sweep_cycle(allocator: &Allocator) {
    let now_millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;

    let mut released = 0usize;

    // Active orders past their grant expiry
    for order in allocator.orders().orders().await {
        if order.status != OrderStatus::Active {
            continue;
        }
        let Some(expires_at) = order.expires_at else {
            continue;
        };
        if expires_at > now_millis {
            continue;
        }
        let Some(access) = &order.access_info else {
            continue;
        };

        debug!(order_id = order.id, "order grant expired, releasing");
        match allocator.release(&access.account_id, &order.id).await {
            Ok(_) => released += 1,
            Err(e) => {
                warn!(order_id = order.id, error = %e, "sweep release failed, will retry next cycle");
            }
        }
    }

    // Accounts whose third-party subscription lapsed mid-grant
    for record in allocator.accounts().records().await {
        if record.is_subscribed_at(now_millis) || record.slots.assigned_to.is_empty() {
            continue;
        }

        info!(
            account_id = record.id,
            bound_orders = record.slots.assigned_to.len(),
            "subscription lapsed with bound orders, releasing"
        );
        for order_id in record.slots.assigned_to.clone() {
            match allocator.release(&record.id, &order_id).await {
                Ok(_) => released += 1,
                Err(e) => {
                    warn!(account_id = record.id, order_id, error = %e, "sweep release failed, will retry next cycle");
                }
            }
        }
    }

    // Active orders whose account no longer holds their slot. These are
    // remnants of a release whose order clear failed after a concurrent
    // reservation retook the freed slot; expiring the order finishes the
    // interrupted release.
    for order in allocator.orders().orders().await {
        if order.status != OrderStatus::Active {
            continue;
        }
        let Some(access) = &order.access_info else {
            continue;
        };
        let held = allocator
            .accounts()
            .get(&access.account_id)
            .await
            .is_some_and(|record| record.slots.holds(&order.id));
        if held {
            continue;
        }

        warn!(
            order_id = order.id,
            account_id = access.account_id,
            "active order holds no slot, expiring stale binding"
        );
        match allocator.orders().clear(&order.id).await {
            Ok(_) => released += 1,
            Err(e) => {
                warn!(order_id = order.id, error = %e, "stale binding clear failed, will retry next cycle");
            }
        }
    }

    if released > 0 {
        info!(released, "sweep cycle released ended grants");
    }
}

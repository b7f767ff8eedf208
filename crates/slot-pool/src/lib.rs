//! Slot pool for resold subscription accounts
//!
//! Manages a pool of shared subscription credentials, each with a fixed
//! number of concurrent-use slots, and binds slots to paying orders. The
//! account store is the single source of truth for capacity; the order store
//! carries the credential snapshot each order was granted.
//!
//! Binding lifecycle:
//! 1. Operator adds an account via the admin API → record stored, status `Available`
//! 2. Approval workflow asks for candidates → `find_available`, least-used first
//! 3. `Allocator::assign` reserves a slot (commit-time capacity guard) and
//!    writes the credential snapshot onto the order → order `Active`
//! 4. Account fills up → status `Assigned`, excluded from candidates
//! 5. Grant ends (cancellation, expiry sweep, admin action) →
//!    `Allocator::release` frees the slot and expires the order
//! 6. Background sweep releases bindings for lapsed subscriptions and
//!    expired orders

pub mod account;
pub mod account_store;
pub mod allocator;
pub mod error;
pub mod order;
pub mod order_store;
mod persist;
pub mod sweep;

pub use account::{AccountCredentials, AccountRecord, AccountStatus, AccountSummary, SlotInfo};
pub use account_store::{AccountStore, SlotReservation};
pub use allocator::{Allocator, Binding};
pub use error::{AssignError, Error, ReleaseError, ReleaseOutcome, Result};
pub use order::{AccessInfo, Order, OrderStatus};
pub use order_store::OrderStore;
pub use sweep::spawn_expiry_sweep;

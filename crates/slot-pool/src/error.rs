//! Error types for pool operations

/// Errors from store maintenance operations (load, insert, remove).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("store I/O error: {0}")]
    Io(String),

    #[error("store parse error: {0}")]
    Parse(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("account {account_id} still has {used_slots} slots in use")]
    AccountInUse { account_id: String, used_slots: u32 },

    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure modes for `Allocator::assign`.
///
/// `CapacityExhausted` is routine under load and retryable against the next
/// availability candidate. Everything else is surfaced to an operator:
/// `IncompleteCredentials` in particular signals a data-entry defect, never
/// something to retry.
#[derive(Debug, thiserror::Error)]
pub enum AssignError {
    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("account {0} has incomplete credentials")]
    IncompleteCredentials(String),

    #[error("account {account_id} capacity exhausted ({max_slots} slots in use)")]
    CapacityExhausted { account_id: String, max_slots: u32 },

    #[error("order not found: {0}")]
    OrderNotFound(String),

    #[error("order {order_id} already bound to account {account_id}")]
    OrderAlreadyBound {
        order_id: String,
        account_id: String,
    },

    #[error("order {order_id} is {status}, not bindable")]
    OrderNotBindable {
        order_id: String,
        status: &'static str,
    },

    #[error("store error: {0}")]
    Store(String),
}

impl AssignError {
    /// Whether the caller should retry against a different candidate account.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AssignError::CapacityExhausted { .. })
    }

    /// Outcome label for metrics and logging.
    pub fn label(&self) -> &'static str {
        match self {
            AssignError::AccountNotFound(_) => "account_not_found",
            AssignError::IncompleteCredentials(_) => "incomplete_credentials",
            AssignError::CapacityExhausted { .. } => "capacity_exhausted",
            AssignError::OrderNotFound(_) => "order_not_found",
            AssignError::OrderAlreadyBound { .. } => "order_already_bound",
            AssignError::OrderNotBindable { .. } => "order_not_bindable",
            AssignError::Store(_) => "store_error",
        }
    }
}

/// Failure modes for `Allocator::release`.
#[derive(Debug, thiserror::Error)]
pub enum ReleaseError {
    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("store error: {0}")]
    Store(String),
}

/// Outcome of a successful release.
///
/// Releasing an order that no longer occupies a slot is `AlreadyReleased`,
/// never an error and never a second capacity decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released,
    AlreadyReleased,
}

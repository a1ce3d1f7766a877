//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, authorization). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found")]
    NotFound,

    /// The actor lacks permission for the action or role.
    #[error("unauthorized")]
    Unauthorized,

    /// The requested quantity exceeds what the basket has left.
    ///
    /// Routine for callers racing on a popular basket; retry against a
    /// different basket, not the same one.
    #[error("insufficient inventory: requested {requested}, remaining {remaining}")]
    InsufficientInventory { requested: u32, remaining: u32 },

    /// The basket cannot accept reservations (inactive or expired).
    #[error("basket unavailable: {0}")]
    BasketUnavailable(String),

    /// A status change not permitted by the state machine.
    #[error("illegal transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn unauthorized() -> Self {
        Self::Unauthorized
    }

    pub fn insufficient_inventory(requested: u32, remaining: u32) -> Self {
        Self::InsufficientInventory { requested, remaining }
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::BasketUnavailable(msg.into())
    }

    pub fn illegal_transition(from: impl ToString, to: impl ToString) -> Self {
        Self::IllegalTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}

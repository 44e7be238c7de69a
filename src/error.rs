//! Error types for the repair workflow.
//!
//! Every public operation returns `Result<T, WorkflowError>`. Storage backends
//! report `StoreError`, which converts into the workflow taxonomy so that an
//! optimistic-lock failure always surfaces as `ConcurrencyConflict` rather than
//! a generic storage failure.

use thiserror::Error;
use uuid::Uuid;

use crate::models::RepairOrderStatus;
use crate::workflow::report_state::{ReportAction, ReportStatus};

/// Failures returned by the workflow services.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// A required field is missing or malformed.
    #[error("{0}")]
    Validation(String),

    /// The actor does not own, or may not act on, the referenced resource.
    #[error("{0}")]
    Authorization(String),

    /// The action is not legal from the report's current state.
    #[error("cannot {action} a report in {state} state")]
    StateTransition {
        action: ReportAction,
        state: ReportStatus,
    },

    /// The repair order's lifecycle status does not allow the operation.
    #[error("cannot {action} repair order {order_id} in {status} state")]
    OrderState {
        action: &'static str,
        order_id: Uuid,
        status: RepairOrderStatus,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// The row changed since it was read. Callers decide whether to re-fetch.
    #[error("{entity} {id} was modified concurrently, reload and try again")]
    ConcurrencyConflict { entity: &'static str, id: Uuid },

    #[error("storage failure: {0}")]
    Storage(String),
}

impl WorkflowError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Authorization(message.into())
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Failures reported by a [`Store`](crate::store::Store) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A versioned write found a different version (or no row) than expected.
    #[error("{entity} {id} version conflict")]
    Conflict { entity: &'static str, id: Uuid },

    /// A uniqueness constraint rejected the write.
    #[error("{0}")]
    Duplicate(String),

    #[error("database error: {0}")]
    Database(String),

    /// A persisted row could not be mapped back into a domain value.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Duplicate(db.message().to_string())
            }
            _ => StoreError::Database(err.to_string()),
        }
    }
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { entity, id } => WorkflowError::ConcurrencyConflict { entity, id },
            StoreError::Duplicate(message) => WorkflowError::Validation(message),
            StoreError::Database(message) | StoreError::Corrupt(message) => {
                WorkflowError::Storage(message)
            }
        }
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;
pub type StoreResult<T> = Result<T, StoreError>;

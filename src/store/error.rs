use uuid::Uuid;

use crate::domain::edition::{EditionError, EditionKey};
use crate::utils::IsTransient;

// ============================================================================
// Store Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("An order with payment reference {0} already exists")]
    DuplicatePaymentReference(String),

    #[error("Order {order_id} changed concurrently (expected version {expected_version})")]
    VersionConflict { order_id: Uuid, expected_version: i64 },

    #[error("Order {0} not found")]
    OrderNotFound(Uuid),

    #[error("Edition {0} is not locked by this settlement")]
    EditionNotLocked(EditionKey),

    #[error("Ledger constraint violated: {0}")]
    Constraint(String),

    #[error(transparent)]
    Edition(#[from] EditionError),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl IsTransient for StoreError {
    fn is_transient(&self) -> bool {
        match self {
            StoreError::Database(e) => match e {
                sqlx::Error::Io(_)
                | sqlx::Error::PoolTimedOut
                | sqlx::Error::PoolClosed
                | sqlx::Error::WorkerCrashed
                | sqlx::Error::Protocol(_)
                | sqlx::Error::Tls(_) => true,
                // serialization_failure / deadlock_detected
                sqlx::Error::Database(db) => {
                    matches!(db.code().as_deref(), Some("40001") | Some("40P01"))
                }
                _ => false,
            },
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_connection_level_errors_are_transient() {
        assert!(StoreError::Database(sqlx::Error::PoolTimedOut).is_transient());
        assert!(!StoreError::Database(sqlx::Error::RowNotFound).is_transient());
        assert!(!StoreError::DuplicatePaymentReference("pi_1".to_string()).is_transient());
        assert!(!StoreError::Constraint("sold over limit".to_string()).is_transient());
    }
}

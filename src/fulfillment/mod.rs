// ============================================================================
// Fulfillment - Turning confirmed payments into orders
// ============================================================================
//
// The payment event processor owns the only write path to `editions_sold`.
// Each confirmation is settled in one unit: lock the editions it names,
// allocate edition numbers, stage the increments, write the order, commit.
//
// ============================================================================

pub mod order_writer;
pub mod processor;

pub use processor::{OversellPolicy, PaymentEventProcessor};

use crate::domain::order::OrderError;
use crate::store::StoreError;
use crate::utils::IsTransient;

#[derive(Debug, thiserror::Error)]
pub enum FulfillmentError {
    /// The confirmation can never become an order; redelivery will not help
    #[error("Payment confirmation is not a valid order: {0}")]
    InvalidConfirmation(#[from] OrderError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl FulfillmentError {
    /// Whether the provider should redeliver the event
    pub fn is_retryable(&self) -> bool {
        matches!(self, FulfillmentError::Store(e) if e.is_transient())
    }
}

use super::value_objects::OrderStatus;

// ============================================================================
// Order Business Rule Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OrderError {
    #[error("Order is already cancelled")]
    AlreadyCancelled,

    #[error("Cannot move order from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    #[error("New orders start as paid or cancelled, not {0}")]
    InvalidInitialStatus(OrderStatus),

    #[error("Order items cannot be empty")]
    EmptyItems,

    #[error("Invalid quantity {quantity} for {artwork_id}/{size}")]
    InvalidQuantity {
        artwork_id: String,
        size: String,
        quantity: u32,
    },

    #[error("Payment reference cannot be empty")]
    MissingPaymentReference,

    #[error("Order total overflows")]
    TotalOverflow,

    #[error("Invalid customer: {0}")]
    InvalidCustomer(String),

    #[error("Unknown order status: {0}")]
    UnknownStatus(String),
}

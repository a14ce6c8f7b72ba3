// ============================================================================
// Checkout - Cart validation before a payment session exists
// ============================================================================

pub mod request;
pub mod reservation;

pub use request::{CheckoutRequest, CheckoutResponse};
pub use reservation::{CheckoutError, CheckoutLine, CheckoutService};

// ============================================================================
// Payments - Hosted checkout sessions and signed webhook events
// ============================================================================

pub mod metadata;
pub mod provider;
pub mod stripe;
pub mod webhook;

pub use metadata::LineMetadata;
pub use provider::{CheckoutSession, PaymentProvider, PaymentProviderError, SessionLine, SessionRequest};
pub use stripe::{StripeClient, StripeSettings};
pub use webhook::{parse_event, verify_signature, PaymentConfirmation, WebhookError, WebhookEvent};

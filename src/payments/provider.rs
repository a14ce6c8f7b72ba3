use async_trait::async_trait;

use super::metadata::LineMetadata;
use crate::domain::order::Customer;
use crate::utils::{CircuitState, IsTransient};

// ============================================================================
// Payment Provider
// ============================================================================

/// One line of a hosted checkout page
#[derive(Debug, Clone, PartialEq)]
pub struct SessionLine {
    pub title: String,
    pub image_url: Option<String>,
    pub metadata: LineMetadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionRequest {
    pub lines: Vec<SessionLine>,
    pub customer: Customer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentProviderError {
    #[error("Payment provider unavailable: {0}")]
    Unavailable(String),

    #[error("Payment provider rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Payment provider returned an unexpected response: {0}")]
    InvalidResponse(String),

    #[error("Payment provider circuit is open")]
    CircuitOpen,

    #[error("Could not encode session metadata: {0}")]
    Metadata(#[from] serde_json::Error),
}

impl IsTransient for PaymentProviderError {
    fn is_transient(&self) -> bool {
        matches!(self, PaymentProviderError::Unavailable(_))
    }
}

impl From<reqwest::Error> for PaymentProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            PaymentProviderError::InvalidResponse(err.to_string())
        } else {
            PaymentProviderError::Unavailable(err.to_string())
        }
    }
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: &SessionRequest,
    ) -> Result<CheckoutSession, PaymentProviderError>;

    async fn circuit_state(&self) -> CircuitState {
        CircuitState::Closed
    }
}

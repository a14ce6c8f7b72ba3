use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::edition::{is_available, ArtworkEdition, EditionKey};
use crate::domain::order::{Customer, OrderError};
use crate::metrics::Metrics;
use crate::payments::{CheckoutSession, LineMetadata, PaymentProvider, PaymentProviderError, SessionLine, SessionRequest};
use crate::store::{Store, StoreError};
use crate::utils::{retry_on_transient, RetryConfig};

// ============================================================================
// Checkout Reservation Step
// ============================================================================
//
// Read-only against the ledger. A cart is validated line by line against
// fresh rows; only a fully valid cart reaches the payment provider. Edition
// ranges embedded in the session are provisional and nothing is held.
//
// ============================================================================

/// Session metadata has a fixed key budget at the provider
pub const MAX_CART_LINES: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutLine {
    pub artwork_id: String,
    pub size: String,
    pub title: String,
    pub quantity: u32,
    pub expected_unit_price: u64,
    pub image_url: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Cart has more than {max} lines")]
    TooManyLines { max: usize },

    #[error("Quantity for {artwork_id} ({size}) must be at least 1")]
    InvalidQuantity { artwork_id: String, size: String },

    #[error("Invalid customer details: {0}")]
    InvalidCustomer(String),

    #[error("Artwork {artwork_id} is not available in size {size}")]
    NotFound { artwork_id: String, size: String },

    #[error("{artwork_id} ({size}) is sold out: requested {requested}, {remaining} remaining")]
    SoldOut {
        artwork_id: String,
        size: String,
        requested: u32,
        remaining: u32,
    },

    #[error("Price for {artwork_id} ({size}) has changed: expected {expected}, current {actual}")]
    PriceMismatch {
        artwork_id: String,
        size: String,
        expected: u64,
        actual: u64,
    },

    #[error(transparent)]
    Provider(#[from] PaymentProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CheckoutError {
    /// Short label for metrics
    pub fn reason(&self) -> &'static str {
        match self {
            CheckoutError::EmptyCart => "empty_cart",
            CheckoutError::TooManyLines { .. } => "too_many_lines",
            CheckoutError::InvalidQuantity { .. } => "invalid_quantity",
            CheckoutError::InvalidCustomer(_) => "invalid_customer",
            CheckoutError::NotFound { .. } => "not_found",
            CheckoutError::SoldOut { .. } => "sold_out",
            CheckoutError::PriceMismatch { .. } => "price_mismatch",
            CheckoutError::Provider(_) => "provider_error",
            CheckoutError::Store(_) => "store_error",
        }
    }
}

impl From<OrderError> for CheckoutError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::InvalidCustomer(message) => CheckoutError::InvalidCustomer(message),
            other => CheckoutError::InvalidCustomer(other.to_string()),
        }
    }
}

pub struct CheckoutService {
    store: Arc<dyn Store>,
    provider: Arc<dyn PaymentProvider>,
    retry: RetryConfig,
    metrics: Arc<Metrics>,
}

impl CheckoutService {
    pub fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn PaymentProvider>,
        retry: RetryConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            provider,
            retry,
            metrics,
        }
    }

    /// Validate the cart and open a payment session for it
    pub async fn create_session(
        &self,
        lines: Vec<CheckoutLine>,
        customer: Customer,
    ) -> Result<CheckoutSession, CheckoutError> {
        let result = self.reserve(lines, customer).await;
        match &result {
            Ok(_) => self.metrics.checkout_sessions_created.inc(),
            Err(e) => {
                self.metrics.record_checkout_rejection(e.reason());
                tracing::warn!(reason = e.reason(), error = %e, "Checkout rejected");
            }
        }
        result
    }

    async fn reserve(&self, lines: Vec<CheckoutLine>, customer: Customer) -> Result<CheckoutSession, CheckoutError> {
        customer.validate()?;
        let session_lines = self.validate_cart(&lines).await?;

        let request = SessionRequest {
            lines: session_lines,
            customer,
        };

        let session = retry_on_transient("create_checkout_session", self.retry.clone(), |attempt| {
            if attempt > 1 {
                self.metrics.record_retry_attempt("create_checkout_session");
            }
            self.provider.create_checkout_session(&request)
        })
        .await
        .into_result()?;

        tracing::info!(
            session_id = %session.id,
            lines = request.lines.len(),
            "💳 Checkout session created"
        );
        Ok(session)
    }

    /// Check every line against the current ledger and compute its
    /// provisional edition range. Lines naming the same edition are checked
    /// against what the earlier lines already asked for.
    pub async fn validate_cart(&self, lines: &[CheckoutLine]) -> Result<Vec<SessionLine>, CheckoutError> {
        if lines.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        if lines.len() > MAX_CART_LINES {
            return Err(CheckoutError::TooManyLines { max: MAX_CART_LINES });
        }

        let mut seen: HashMap<EditionKey, ArtworkEdition> = HashMap::new();
        let mut session_lines = Vec::with_capacity(lines.len());

        for line in lines {
            if line.quantity == 0 {
                return Err(CheckoutError::InvalidQuantity {
                    artwork_id: line.artwork_id.clone(),
                    size: line.size.clone(),
                });
            }

            let key = EditionKey::new(line.artwork_id.clone(), line.size.clone());
            let edition = match seen.entry(key) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let fresh = self.store.edition(entry.key()).await?.ok_or_else(|| CheckoutError::NotFound {
                        artwork_id: line.artwork_id.clone(),
                        size: line.size.clone(),
                    })?;
                    entry.insert(fresh)
                }
            };

            if !is_available(edition, line.quantity) {
                return Err(CheckoutError::SoldOut {
                    artwork_id: line.artwork_id.clone(),
                    size: line.size.clone(),
                    requested: line.quantity,
                    remaining: edition.remaining(),
                });
            }

            if edition.price_minor_units != line.expected_unit_price {
                return Err(CheckoutError::PriceMismatch {
                    artwork_id: line.artwork_id.clone(),
                    size: line.size.clone(),
                    expected: line.expected_unit_price,
                    actual: edition.price_minor_units,
                });
            }

            // Local view only; the ledger row is not touched
            let range = edition.next_range(line.quantity);
            edition.editions_sold += line.quantity;

            session_lines.push(SessionLine {
                title: line.title.clone(),
                image_url: line.image_url.clone(),
                metadata: LineMetadata {
                    artwork_id: line.artwork_id.clone(),
                    size: line.size.clone(),
                    title: line.title.clone(),
                    quantity: line.quantity,
                    unit_price: edition.price_minor_units,
                    edition_start: range.start,
                },
            });
        }

        Ok(session_lines)
    }
}

// ============================================================================
// Tests
// ============================================================================

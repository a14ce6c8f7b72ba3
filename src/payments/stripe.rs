use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::metadata;
use super::provider::{CheckoutSession, PaymentProvider, PaymentProviderError, SessionRequest};
use crate::utils::{CircuitBreaker, CircuitBreakerError, CircuitState};

// ============================================================================
// Stripe Checkout Client
// ============================================================================
//
// Creates hosted Checkout Sessions over the REST API (form-encoded, basic
// auth with the secret key). All calls go through a circuit breaker; the
// caller decides whether to retry.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct StripeSettings {
    pub secret_key: String,
    pub api_base: String,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
    pub request_timeout: Duration,
}

pub struct StripeClient {
    http: reqwest::Client,
    settings: StripeSettings,
    breaker: CircuitBreaker,
}

#[derive(Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl StripeClient {
    pub fn new(settings: StripeSettings, breaker: CircuitBreaker) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()?;

        tracing::info!(api_base = %settings.api_base, currency = %settings.currency, "Stripe client ready");
        Ok(Self { http, settings, breaker })
    }

    /// Form fields for `POST /v1/checkout/sessions`
    pub fn session_form(&self, request: &SessionRequest) -> Result<Vec<(String, String)>, PaymentProviderError> {
        let mut form: Vec<(String, String)> = vec![
            ("mode".to_string(), "payment".to_string()),
            ("success_url".to_string(), self.settings.success_url.clone()),
            ("cancel_url".to_string(), self.settings.cancel_url.clone()),
            ("customer_email".to_string(), request.customer.email.clone()),
        ];

        for (i, line) in request.lines.iter().enumerate() {
            let prefix = format!("line_items[{}]", i);
            form.push((format!("{}[quantity]", prefix), line.metadata.quantity.to_string()));
            form.push((
                format!("{}[price_data][currency]", prefix),
                self.settings.currency.clone(),
            ));
            form.push((
                format!("{}[price_data][unit_amount]", prefix),
                line.metadata.unit_price.to_string(),
            ));
            form.push((
                format!("{}[price_data][product_data][name]", prefix),
                format!("{} ({})", line.title, line.metadata.size),
            ));
            if let Some(image_url) = &line.image_url {
                form.push((
                    format!("{}[price_data][product_data][images][0]", prefix),
                    image_url.clone(),
                ));
            }
        }

        let line_metadata: Vec<_> = request.lines.iter().map(|line| line.metadata.clone()).collect();
        for (key, value) in metadata::encode(&line_metadata, &request.customer)? {
            form.push((format!("metadata[{}]", key), value));
        }

        Ok(form)
    }

    async fn post_session(&self, form: &[(String, String)]) -> Result<CheckoutSession, PaymentProviderError> {
        let response = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.settings.api_base))
            .basic_auth(&self.settings.secret_key, None::<&str>)
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(PaymentProviderError::Unavailable(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            let message = response
                .json::<ErrorResponse>()
                .await
                .ok()
                .and_then(|body| body.error.message)
                .unwrap_or_else(|| status.to_string());
            return Err(PaymentProviderError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let session: SessionResponse = response.json().await?;
        let url = session
            .url
            .ok_or_else(|| PaymentProviderError::InvalidResponse(format!("session {} has no url", session.id)))?;

        Ok(CheckoutSession { id: session.id, url })
    }
}

#[async_trait]
impl PaymentProvider for StripeClient {
    async fn create_checkout_session(
        &self,
        request: &SessionRequest,
    ) -> Result<CheckoutSession, PaymentProviderError> {
        let form = self.session_form(request)?;

        match self.breaker.call(self.post_session(&form)).await {
            Ok(session) => {
                tracing::debug!(session_id = %session.id, lines = request.lines.len(), "Checkout session created");
                Ok(session)
            }
            Err(CircuitBreakerError::CircuitOpen) => Err(PaymentProviderError::CircuitOpen),
            Err(CircuitBreakerError::OperationFailed(err)) => Err(err),
        }
    }

    async fn circuit_state(&self) -> CircuitState {
        self.breaker.get_state().await
    }
}

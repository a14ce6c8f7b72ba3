use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;

use super::metadata::{self, LineMetadata, MetadataError};
use crate::domain::order::Customer;

// ============================================================================
// Stripe Webhook Verification & Decoding
// ============================================================================

pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Missing Stripe-Signature header")]
    MissingSignature,

    #[error("Invalid Stripe-Signature header")]
    MalformedSignature,

    #[error("Webhook signature mismatch")]
    SignatureMismatch,

    #[error("Webhook timestamp outside tolerance")]
    StaleTimestamp,

    #[error("Webhook body is not a Stripe event: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error("Checkout session {session_id} carries unusable metadata: {source}")]
    InvalidMetadata {
        session_id: String,
        #[source]
        source: MetadataError,
    },
}

impl WebhookError {
    /// Short label for logs and metrics
    pub fn reason(&self) -> &'static str {
        match self {
            WebhookError::MissingSignature => "missing_signature",
            WebhookError::MalformedSignature => "malformed_signature",
            WebhookError::SignatureMismatch => "signature_mismatch",
            WebhookError::StaleTimestamp => "stale_timestamp",
            WebhookError::InvalidPayload(_) => "invalid_payload",
            WebhookError::InvalidMetadata { .. } => "invalid_metadata",
        }
    }
}

/// Verify a `Stripe-Signature` header (`t=...,v1=...[,v1=...]`) against the
/// raw body. Any matching `v1` entry is accepted.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
    tolerance_secs: i64,
) -> Result<(), WebhookError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        let part = part.trim();
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = Some(t);
        } else if let Some(v) = part.strip_prefix("v1=") {
            signatures.push(v);
        }
    }

    let timestamp = timestamp.ok_or(WebhookError::MalformedSignature)?;
    if signatures.is_empty() {
        return Err(WebhookError::MalformedSignature);
    }

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| WebhookError::MalformedSignature)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);

    let matched = signatures.iter().any(|signature| match hex::decode(signature) {
        // verify_slice compares in constant time
        Ok(bytes) => mac.clone().verify_slice(&bytes).is_ok(),
        Err(_) => false,
    });
    if !matched {
        return Err(WebhookError::SignatureMismatch);
    }

    let ts: i64 = timestamp.parse().map_err(|_| WebhookError::MalformedSignature)?;
    if (now - ts).abs() > tolerance_secs {
        return Err(WebhookError::StaleTimestamp);
    }

    Ok(())
}

// ============================================================================
// Event Decoding
// ============================================================================

#[derive(Deserialize)]
struct StripeEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: EventData,
}

#[derive(Deserialize)]
struct EventData {
    object: serde_json::Value,
}

#[derive(Deserialize)]
struct CheckoutSessionObject {
    id: String,
    payment_intent: Option<String>,
    payment_status: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

/// A paid checkout session, ready for the payment event processor
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentConfirmation {
    pub event_id: String,
    pub session_id: String,
    /// Idempotency key for the order
    pub payment_reference: String,
    pub lines: Vec<LineMetadata>,
    pub customer: Customer,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WebhookEvent {
    PaymentConfirmed(PaymentConfirmation),
    Ignored { event_type: String, reason: &'static str },
}

pub fn parse_event(payload: &[u8]) -> Result<WebhookEvent, WebhookError> {
    let event: StripeEvent = serde_json::from_slice(payload)?;

    match event.event_type.as_str() {
        "checkout.session.completed" | "checkout.session.async_payment_succeeded" => {}
        _ => {
            return Ok(WebhookEvent::Ignored {
                event_type: event.event_type,
                reason: "unhandled event type",
            })
        }
    }

    let session: CheckoutSessionObject = serde_json::from_value(event.data.object)?;

    // A completed session may still be waiting on a delayed payment method;
    // async_payment_succeeded follows once the money is in
    if event.event_type == "checkout.session.completed"
        && !matches!(
            session.payment_status.as_deref(),
            Some("paid") | Some("no_payment_required")
        )
    {
        return Ok(WebhookEvent::Ignored {
            event_type: event.event_type,
            reason: "payment not yet settled",
        });
    }

    let (lines, customer) = metadata::decode(&session.metadata).map_err(|source| WebhookError::InvalidMetadata {
        session_id: session.id.clone(),
        source,
    })?;

    let payment_reference = session.payment_intent.clone().unwrap_or_else(|| session.id.clone());

    Ok(WebhookEvent::PaymentConfirmed(PaymentConfirmation {
        event_id: event.id,
        session_id: session.id,
        payment_reference,
        lines,
        customer,
    }))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::order::aggregate::tests::test_customer;
    use serde_json::json;

    pub(crate) const SECRET: &str = "whsec_test";

    /// Signature header value for `payload`, as Stripe would send it
    pub(crate) fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    pub(crate) fn session_event(
        event_type: &str,
        payment_status: &str,
        payment_intent: &str,
        lines: &[LineMetadata],
    ) -> Vec<u8> {
        let metadata: HashMap<String, String> = metadata::encode(lines, &test_customer()).unwrap().into_iter().collect();
        serde_json::to_vec(&json!({
            "id": "evt_1",
            "type": event_type,
            "data": {
                "object": {
                    "id": "cs_test_1",
                    "object": "checkout.session",
                    "payment_intent": payment_intent,
                    "payment_status": payment_status,
                    "metadata": metadata,
                }
            }
        }))
        .unwrap()
    }

    fn wave_line() -> LineMetadata {
        LineMetadata {
            artwork_id: "wave".to_string(),
            size: "small".to_string(),
            title: "The Wave".to_string(),
            quantity: 1,
            unit_price: 5000,
            edition_start: 1,
        }
    }

    #[test]
    fn test_valid_signature_is_accepted() {
        let payload = br#"{"id":"evt_1"}"#;
        let header = sign(payload, SECRET, 1_700_000_000);
        assert!(verify_signature(payload, &header, SECRET, 1_700_000_010, 300).is_ok());
    }

    #[test]
    fn test_tampered_body_is_rejected() {
        let header = sign(br#"{"amount":1}"#, SECRET, 1_700_000_000);
        let result = verify_signature(br#"{"amount":9}"#, &header, SECRET, 1_700_000_000, 300);
        assert!(matches!(result, Err(WebhookError::SignatureMismatch)));
    }

    #[test]
    fn test_old_timestamp_is_rejected() {
        let payload = br#"{}"#;
        let header = sign(payload, SECRET, 1_700_000_000);
        let result = verify_signature(payload, &header, SECRET, 1_700_000_301, 300);
        assert!(matches!(result, Err(WebhookError::StaleTimestamp)));
    }

    #[test]
    fn test_any_v1_entry_may_match() {
        let payload = br#"{}"#;
        let good = sign(payload, SECRET, 1_700_000_000);
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t=1700000000,v1={},v1={}", "00".repeat(32), good_sig);
        assert!(verify_signature(payload, &header, SECRET, 1_700_000_000, 300).is_ok());
    }

    #[test]
    fn test_header_without_signature_is_malformed() {
        let result = verify_signature(b"{}", "t=1700000000", SECRET, 1_700_000_000, 300);
        assert!(matches!(result, Err(WebhookError::MalformedSignature)));
    }

    #[test]
    fn test_paid_session_becomes_confirmation() {
        let payload = session_event("checkout.session.completed", "paid", "pi_1", &[wave_line()]);

        match parse_event(&payload).unwrap() {
            WebhookEvent::PaymentConfirmed(confirmation) => {
                assert_eq!(confirmation.payment_reference, "pi_1");
                assert_eq!(confirmation.session_id, "cs_test_1");
                assert_eq!(confirmation.lines, vec![wave_line()]);
                assert_eq!(confirmation.customer, test_customer());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unpaid_completion_is_ignored() {
        let payload = session_event("checkout.session.completed", "unpaid", "pi_1", &[wave_line()]);
        assert!(matches!(parse_event(&payload).unwrap(), WebhookEvent::Ignored { .. }));

        let later = session_event("checkout.session.async_payment_succeeded", "paid", "pi_1", &[wave_line()]);
        assert!(matches!(parse_event(&later).unwrap(), WebhookEvent::PaymentConfirmed(_)));
    }

    #[test]
    fn test_session_reference_is_fallback() {
        let payload = serde_json::to_vec(&json!({
            "id": "evt_2",
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_free",
                "payment_intent": null,
                "payment_status": "no_payment_required",
                "metadata": metadata::encode(&[wave_line()], &test_customer())
                    .unwrap()
                    .into_iter()
                    .collect::<HashMap<_, _>>(),
            }}
        }))
        .unwrap();

        match parse_event(&payload).unwrap() {
            WebhookEvent::PaymentConfirmed(confirmation) => assert_eq!(confirmation.payment_reference, "cs_free"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_other_event_types_are_ignored() {
        let payload = serde_json::to_vec(&json!({
            "id": "evt_3",
            "type": "charge.refunded",
            "data": { "object": { "id": "ch_1" } }
        }))
        .unwrap();
        assert!(matches!(
            parse_event(&payload).unwrap(),
            WebhookEvent::Ignored { event_type, .. } if event_type == "charge.refunded"
        ));
    }

    #[test]
    fn test_missing_metadata_is_reported() {
        let payload = session_event("checkout.session.completed", "paid", "pi_1", &[]);
        assert!(matches!(
            parse_event(&payload),
            Err(WebhookError::InvalidMetadata { .. })
        ));
        assert!(matches!(parse_event(b"not json"), Err(WebhookError::InvalidPayload(_))));
    }
}

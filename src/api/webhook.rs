use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde_json::json;

use super::AppState;
use crate::payments::webhook::SIGNATURE_HEADER;
use crate::payments::{parse_event, verify_signature, WebhookError, WebhookEvent};

// ============================================================================
// Stripe Webhook Endpoint
// ============================================================================
//
// The provider redelivers anything that is not 2xx, so only failures that a
// redelivery can fix get a 5xx. Bad signatures and bodies get a 400; events
// that can never become orders are logged and acknowledged.
//
// ============================================================================

/// POST /api/webhooks/stripe
pub async fn stripe_webhook(req: HttpRequest, body: web::Bytes, state: web::Data<AppState>) -> HttpResponse {
    let Some(header) = req.headers().get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) else {
        return reject(&state, WebhookError::MissingSignature);
    };

    if let Err(e) = verify_signature(
        &body,
        header,
        &state.webhook_secret,
        Utc::now().timestamp(),
        state.webhook_tolerance_secs,
    ) {
        return reject(&state, e);
    }

    let event = match parse_event(&body) {
        Ok(event) => event,
        Err(e @ WebhookError::InvalidMetadata { .. }) => {
            // Signed by the provider, so redelivery would carry the same metadata
            state.metrics.record_webhook_rejection(e.reason());
            tracing::error!(error = %e, "❌ Paid session cannot be turned into an order, needs manual follow-up");
            return HttpResponse::Ok().json(json!({ "received": true, "outcome": "unprocessable" }));
        }
        Err(e) => return reject(&state, e),
    };

    let confirmation = match event {
        WebhookEvent::Ignored { event_type, reason } => {
            tracing::debug!(event_type = %event_type, reason, "Webhook event ignored");
            return HttpResponse::Ok().json(json!({ "received": true, "outcome": "ignored" }));
        }
        WebhookEvent::PaymentConfirmed(confirmation) => confirmation,
    };

    tracing::info!(
        event_id = %confirmation.event_id,
        session_id = %confirmation.session_id,
        payment_reference = %confirmation.payment_reference,
        lines = confirmation.lines.len(),
        "📨 Payment confirmation received"
    );

    match state.processor.process(&confirmation).await {
        Ok(outcome) => HttpResponse::Ok().json(json!({ "received": true, "outcome": outcome.label() })),
        Err(e) if e.is_retryable() => {
            HttpResponse::InternalServerError().json(json!({ "error": "Temporary failure, please redeliver" }))
        }
        Err(e) => {
            state.metrics.record_webhook_rejection("unprocessable");
            tracing::error!(
                payment_reference = %confirmation.payment_reference,
                error = %e,
                "❌ Payment confirmation cannot be settled, needs manual follow-up"
            );
            HttpResponse::Ok().json(json!({ "received": true, "outcome": "unprocessable" }))
        }
    }
}

fn reject(state: &AppState, err: WebhookError) -> HttpResponse {
    state.metrics.record_webhook_rejection(err.reason());
    tracing::warn!(reason = err.reason(), error = %err, "Webhook rejected");
    HttpResponse::BadRequest().json(json!({ "error": err.to_string() }))
}

use actix_web::{web, App, HttpServer};
use std::sync::Arc;

use crate::checkout::CheckoutService;
use crate::domain::order::OrderStatusHandler;
use crate::fulfillment::PaymentEventProcessor;
use crate::metrics::Metrics;
use crate::store::Store;

// ============================================================================
// HTTP API
// ============================================================================
//
// Public:  POST /api/checkout
//          POST /api/webhooks/stripe
//          GET  /api/artworks/{artwork_id}/editions
// Admin:   /api/admin/... (bearer token)
//
// Handlers are thin: parse, call one service, map the result.
//
// ============================================================================

mod admin;
mod artworks;
mod checkout;
mod error;
mod webhook;

pub use error::ApiError;

/// Body size cap for JSON requests and webhook payloads
const MAX_BODY_BYTES: usize = 256 * 1024;

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub checkout: CheckoutService,
    pub processor: PaymentEventProcessor,
    pub orders: OrderStatusHandler,
    pub metrics: Arc<Metrics>,
    pub webhook_secret: String,
    pub webhook_tolerance_secs: i64,
    pub admin_token: String,
}

/// Register every API route; shared by the server and the handler tests
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .limit(MAX_BODY_BYTES)
            .error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into()),
    )
    .app_data(web::PayloadConfig::new(MAX_BODY_BYTES))
    .app_data(
        web::QueryConfig::default().error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into()),
    )
    .service(
        web::scope("/api")
            .route("/checkout", web::post().to(checkout::create_checkout))
            .route("/webhooks/stripe", web::post().to(webhook::stripe_webhook))
            .route("/artworks/{artwork_id}/editions", web::get().to(artworks::list_editions))
            .service(
                web::scope("/admin")
                    .route("/artworks/{artwork_id}/editions", web::put().to(admin::publish_editions))
                    .route("/orders", web::get().to(admin::list_orders))
                    .route("/orders/{order_id}", web::get().to(admin::get_order))
                    .route("/orders/{order_id}/history", web::get().to(admin::order_history))
                    .route("/orders/{order_id}/transitions", web::post().to(admin::transition_order))
                    .route("/review-queue", web::get().to(admin::review_queue)),
            ),
    );
}

pub async fn start_api_server(state: web::Data<AppState>, port: u16) -> std::io::Result<()> {
    tracing::info!("🌐 Starting storefront API on http://0.0.0.0:{}/api", port);

    HttpServer::new(move || App::new().app_data(state.clone()).configure(configure))
        .bind(("0.0.0.0", port))?
        .run()
        .await
}

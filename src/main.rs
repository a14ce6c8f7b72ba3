use actix_web::web;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod checkout;
mod config;
mod domain;
mod event_log;
mod fulfillment;
mod health;
mod metrics;
mod payments;
mod store;
mod utils;

use api::AppState;
use checkout::CheckoutService;
use config::Config;
use domain::order::OrderStatusHandler;
use fulfillment::PaymentEventProcessor;
use health::HealthReporter;
use payments::{PaymentProvider, StripeClient};
use store::{MemoryStore, PgStore, Store};
use utils::{CircuitBreaker, CircuitBreakerConfig, RetryConfig};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,edition_store=debug"))
        )
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        environment = %config.environment,
        oversell_policy = %config.oversell_policy,
        "🚀 Starting limited-edition print store"
    );

    // === 1. Store ===
    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            tracing::info!("Connecting to PostgreSQL...");
            Arc::new(PgStore::connect(url, config.database_max_connections).await?)
        }
        None => {
            if !config.is_development() {
                anyhow::bail!("DATABASE_URL must be set in {} environment", config.environment);
            }
            tracing::warn!("⚠️ DATABASE_URL not set, using in-memory store; nothing survives a restart");
            Arc::new(MemoryStore::new())
        }
    };

    // === 2. Metrics ===
    let metrics = Arc::new(metrics::Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    // === 3. Payment provider (with circuit breaker) ===
    let breaker_metrics = metrics.clone();
    let breaker = CircuitBreaker::new("stripe", CircuitBreakerConfig::default())
        .on_state_change(move |state| breaker_metrics.update_circuit_breaker_state(state));
    let provider: Arc<dyn PaymentProvider> = Arc::new(StripeClient::new(config.stripe.clone(), breaker)?);

    // === 4. Services ===
    let state = web::Data::new(AppState {
        store: store.clone(),
        checkout: CheckoutService::new(store.clone(), provider.clone(), RetryConfig::interactive(), metrics.clone()),
        processor: PaymentEventProcessor::new(store.clone(), config.oversell_policy, metrics.clone()),
        orders: OrderStatusHandler::new(store.clone()),
        metrics: metrics.clone(),
        webhook_secret: config.stripe_webhook_secret.clone(),
        webhook_tolerance_secs: config.webhook_tolerance_secs,
        admin_token: config.admin_token.clone(),
    });

    let health = Arc::new(HealthReporter::new(store, provider));
    let registry = Arc::new(metrics.registry().clone());

    // === 5. Serve ===
    futures_util::try_join!(
        api::start_api_server(state, config.http_port),
        metrics::start_metrics_server(registry, health, config.metrics_port),
    )?;

    tracing::info!("✅ Shutdown complete");
    Ok(())
}

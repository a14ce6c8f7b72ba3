use anyhow::{anyhow, Context};
use std::str::FromStr;
use std::time::Duration;

use crate::fulfillment::OversellPolicy;
use crate::payments::StripeSettings;

/// Service configuration, read from the environment
#[derive(Debug, Clone)]
pub struct Config {
    /// development | staging | production
    pub environment: String,
    /// PostgreSQL connection URL; without it the in-memory store is used
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub http_port: u16,
    pub metrics_port: u16,
    pub stripe: StripeSettings,
    pub stripe_webhook_secret: String,
    pub webhook_tolerance_secs: i64,
    pub admin_token: String,
    pub oversell_policy: OversellPolicy,
}

impl Config {
    /// Load configuration from environment variables, after a `.env` file
    /// if one exists
    pub fn from_env() -> anyhow::Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env file");
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let environment = var("ENVIRONMENT").unwrap_or_else(|| "development".into());

        // Secrets must be set outside development
        let secret = |name: &str| -> anyhow::Result<String> {
            match var(name) {
                Some(v) => Ok(v),
                None if environment == "development" => Ok(format!("dev-{name}-not-for-production")),
                None => Err(anyhow!("{name} must be set in {environment} environment")),
            }
        };

        let stripe = StripeSettings {
            secret_key: secret("STRIPE_SECRET_KEY")?,
            api_base: var("STRIPE_API_BASE").unwrap_or_else(|| "https://api.stripe.com".into()),
            currency: var("CURRENCY").unwrap_or_else(|| "usd".into()).to_ascii_lowercase(),
            success_url: var("CHECKOUT_SUCCESS_URL")
                .unwrap_or_else(|| "http://localhost:3000/checkout/success?session_id={CHECKOUT_SESSION_ID}".into()),
            cancel_url: var("CHECKOUT_CANCEL_URL").unwrap_or_else(|| "http://localhost:3000/cart".into()),
            request_timeout: Duration::from_secs(parse_or(&var, "STRIPE_TIMEOUT_SECS", 10)?),
        };

        let oversell_policy = match var("OVERSELL_POLICY") {
            Some(v) => OversellPolicy::from_str(&v).map_err(|e| anyhow!(e))?,
            None => OversellPolicy::default(),
        };

        Ok(Self {
            database_url: var("DATABASE_URL"),
            database_max_connections: parse_or(&var, "DATABASE_MAX_CONNECTIONS", 10)?,
            http_port: parse_or(&var, "HTTP_PORT", 8080)?,
            metrics_port: parse_or(&var, "METRICS_PORT", 9090)?,
            stripe,
            stripe_webhook_secret: secret("STRIPE_WEBHOOK_SECRET")?,
            webhook_tolerance_secs: parse_or(&var, "WEBHOOK_TOLERANCE_SECS", 300)?,
            admin_token: secret("ADMIN_TOKEN")?,
            oversell_policy,
            environment,
        })
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(name) {
        Some(v) => v.trim().parse().with_context(|| format!("{name} has an invalid value: {v}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_development_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();

        assert!(config.is_development());
        assert!(config.database_url.is_none());
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.metrics_port, 9090);
        assert_eq!(config.webhook_tolerance_secs, 300);
        assert_eq!(config.stripe.api_base, "https://api.stripe.com");
        assert_eq!(config.stripe.currency, "usd");
        assert_eq!(config.oversell_policy, OversellPolicy::CancelAndFlag);
        assert!(config.admin_token.starts_with("dev-"));
    }

    #[test]
    fn test_production_requires_secrets() {
        let err = Config::from_lookup(lookup(&[("ENVIRONMENT", "production")])).unwrap_err();
        assert!(err.to_string().contains("STRIPE_SECRET_KEY"));

        let config = Config::from_lookup(lookup(&[
            ("ENVIRONMENT", "production"),
            ("STRIPE_SECRET_KEY", "sk_live_x"),
            ("STRIPE_WEBHOOK_SECRET", "whsec_x"),
            ("ADMIN_TOKEN", "s3cret"),
            ("DATABASE_URL", "postgres://localhost/prints"),
        ]))
        .unwrap();
        assert_eq!(config.admin_token, "s3cret");
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/prints"));
    }

    #[test]
    fn test_overrides_and_invalid_values() {
        let config = Config::from_lookup(lookup(&[
            ("HTTP_PORT", "3001"),
            ("OVERSELL_POLICY", "review"),
            ("CURRENCY", "EUR"),
        ]))
        .unwrap();
        assert_eq!(config.http_port, 3001);
        assert_eq!(config.oversell_policy, OversellPolicy::HoldForReview);
        assert_eq!(config.stripe.currency, "eur");

        assert!(Config::from_lookup(lookup(&[("HTTP_PORT", "eighty")])).is_err());
        assert!(Config::from_lookup(lookup(&[("OVERSELL_POLICY", "refund")])).is_err());
    }
}

//! Runtime configuration, collected from the environment at boot.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub nats_url: Option<String>,
    /// Chapa gateway endpoints and credentials.
    pub gateway_base_url: String,
    pub gateway_public_key: String,
    pub gateway_secret_key: String,
    pub gateway_timeout: Duration,
    /// Secret for HMAC verification of inbound webhooks.
    pub webhook_secret: String,
    /// Base URL this service is reachable at, used to build callback URLs.
    pub callback_base_url: String,
    /// Reviews require a delivered order for the same product.
    pub review_requires_purchase: bool,
    /// Reject webhooks whose signature does not verify. Off only for tests.
    pub signature_enforcement: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL")?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8084".to_string())
                .parse()?,
            nats_url: std::env::var("NATS_URL").ok(),
            gateway_base_url: std::env::var("CHAPA_BASE_URL")
                .unwrap_or_else(|_| "https://api.chapa.co/v1".to_string()),
            gateway_public_key: std::env::var("CHAPA_PUBLIC_KEY").unwrap_or_default(),
            gateway_secret_key: std::env::var("CHAPA_SECRET_KEY").unwrap_or_default(),
            gateway_timeout: Duration::from_secs(
                std::env::var("CHAPA_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(15),
            ),
            webhook_secret: std::env::var("CHAPA_WEBHOOK_SECRET").unwrap_or_default(),
            callback_base_url: std::env::var("CALLBACK_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8084".to_string()),
            review_requires_purchase: env_bool("REVIEW_REQUIRES_PURCHASE", true),
            signature_enforcement: env_bool("WEBHOOK_SIGNATURE_ENFORCEMENT", true),
        })
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_bool_parses_common_spellings() {
        std::env::set_var("MERCATO_TEST_FLAG", "TRUE");
        assert!(env_bool("MERCATO_TEST_FLAG", false));
        std::env::set_var("MERCATO_TEST_FLAG", "0");
        assert!(!env_bool("MERCATO_TEST_FLAG", true));
        std::env::remove_var("MERCATO_TEST_FLAG");
        assert!(env_bool("MERCATO_TEST_FLAG", true));
    }
}

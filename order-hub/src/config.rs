//! Order hub configuration

use crate::error::BoxError;

/// Credentials and endpoint for one payment provider
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub secret_key: Option<String>,
    pub merchant_id: Option<String>,
}

impl ProviderConfig {
    /// Read `{PREFIX}_API_URL`, `{PREFIX}_API_KEY`, `{PREFIX}_SECRET_KEY`, `{PREFIX}_MERCHANT_ID`
    fn from_env(prefix: &str, default_url: &str) -> Self {
        let var = |suffix: &str| {
            std::env::var(format!("{prefix}_{suffix}"))
                .ok()
                .filter(|s| !s.is_empty())
        };
        Self {
            api_url: var("API_URL").unwrap_or_else(|| default_url.to_string()),
            api_key: var("API_KEY"),
            secret_key: var("SECRET_KEY"),
            merchant_id: var("MERCHANT_ID"),
        }
    }

    /// All credentials present
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some() && self.secret_key.is_some() && self.merchant_id.is_some()
    }
}

/// Order hub configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Environment: development | staging | production
    pub environment: String,
    pub http_port: u16,
    /// PostgreSQL connection URL (None = in-memory store)
    pub database_url: Option<String>,
    /// JWT secret for bearer verification
    pub jwt_secret: String,
    /// Public base URL of this service (webhook URLs are built from it)
    pub app_url: String,
    /// Base URL for default payment redirects
    pub frontend_url: String,
    pub payment_currency: String,
    pub payment_expiry_minutes: i64,
    /// Reject webhooks without a signature header
    pub webhook_require_signature: bool,
    pub mynita: ProviderConfig,
    pub wave: ProviderConfig,
    /// Audit channel capacity
    pub audit_buffer_size: usize,
    /// Per-connection outbound buffer of the realtime hub
    pub hub_connection_buffer: usize,
    pub log_level: String,
    pub log_json: bool,
    pub log_dir: Option<String>,
    /// JSON file with tenants, users, catalog items and tables for the
    /// in-memory collaborators
    pub seed_file: Option<String>,
}

impl Config {
    /// Require a secret env var: must be set and non-empty in non-development environments.
    fn require_secret(name: &str, environment: &str) -> Result<String, BoxError> {
        let val = match std::env::var(name) {
            Ok(v) => v,
            Err(_) => {
                if environment != "development" {
                    return Err(format!("{name} must be set in {environment} environment").into());
                }
                format!("dev-{name}-not-for-production")
            }
        };
        if val.is_empty() && environment != "development" {
            return Err(format!("{name} must not be empty in {environment} environment").into());
        }
        Ok(val)
    }

    fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
        std::env::var(name)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn flag(name: &str) -> Option<bool> {
        std::env::var(name)
            .ok()
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, BoxError> {
        let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into());
        let is_dev = environment == "development";
        let http_port = Self::parse_or("HTTP_PORT", 8080u16);

        let config = Self {
            http_port,
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|s| !s.is_empty()),
            jwt_secret: Self::require_secret("JWT_SECRET", &environment)?,
            app_url: std::env::var("APP_URL")
                .unwrap_or_else(|_| format!("http://localhost:{http_port}")),
            frontend_url: std::env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),
            payment_currency: std::env::var("PAYMENT_CURRENCY").unwrap_or_else(|_| "XOF".into()),
            payment_expiry_minutes: Self::parse_or("PAYMENT_EXPIRY_MINUTES", 30),
            webhook_require_signature: Self::flag("WEBHOOK_REQUIRE_SIGNATURE").unwrap_or(!is_dev),
            mynita: ProviderConfig::from_env("MYNITA", "https://api.mynita.com/v1"),
            wave: ProviderConfig::from_env("WAVE", "https://api.wave.com/v1"),
            audit_buffer_size: Self::parse_or("AUDIT_BUFFER_SIZE", 1024usize).max(1),
            hub_connection_buffer: Self::parse_or("HUB_CONNECTION_BUFFER", 64usize).max(1),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_json: Self::flag("LOG_JSON").unwrap_or(false),
            log_dir: std::env::var("LOG_DIR").ok().filter(|s| !s.is_empty()),
            seed_file: std::env::var("SEED_FILE").ok().filter(|s| !s.is_empty()),
            environment,
        };
        Ok(config)
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// Defaults used by tests and local tooling
    pub fn for_development() -> Self {
        Self {
            environment: "development".into(),
            http_port: 8080,
            database_url: None,
            jwt_secret: "dev-JWT_SECRET-not-for-production".into(),
            app_url: "http://localhost:8080".into(),
            frontend_url: "http://localhost:3000".into(),
            payment_currency: "XOF".into(),
            payment_expiry_minutes: 30,
            webhook_require_signature: false,
            mynita: ProviderConfig {
                api_url: "https://api.mynita.com/v1".into(),
                ..Default::default()
            },
            wave: ProviderConfig {
                api_url: "https://api.wave.com/v1".into(),
                ..Default::default()
            },
            audit_buffer_size: 1024,
            hub_connection_buffer: 64,
            log_level: "info".into(),
            log_json: false,
            log_dir: None,
            seed_file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_configured_requires_all_credentials() {
        let mut cfg = ProviderConfig {
            api_url: "https://example.test".into(),
            api_key: Some("k".into()),
            secret_key: Some("s".into()),
            merchant_id: None,
        };
        assert!(!cfg.is_configured());
        cfg.merchant_id = Some("m".into());
        assert!(cfg.is_configured());
    }

    #[test]
    fn test_development_defaults() {
        let cfg = Config::for_development();
        assert!(cfg.is_development());
        assert_eq!(cfg.payment_currency, "XOF");
        assert_eq!(cfg.payment_expiry_minutes, 30);
        assert!(!cfg.mynita.is_configured());
    }

    #[test]
    fn test_require_secret_outside_development() {
        let missing = "ORDER_HUB_TEST_SECRET_THAT_IS_NEVER_SET";
        assert!(Config::require_secret(missing, "production").is_err());
        let dev = Config::require_secret(missing, "development").unwrap();
        assert!(dev.starts_with("dev-"));
    }
}

//! Payment provider adapters
//!
//! Each provider translates the orchestrator's canonical request/response
//! to its own API and maps its status vocabulary onto [`PaymentStatus`]
//! through an explicit table. Unknown statuses are `Pending`, never
//! `Success`.

mod mynita;
pub mod signature;
mod wave;

pub use mynita::MyNitaProvider;
pub use wave::WaveProvider;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use serde_json::Value;
use shared::order::{PaymentMethod, PaymentStatus};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{Config, ProviderConfig};

pub(crate) const INITIATE_TIMEOUT: Duration = Duration::from_secs(30);
pub(crate) const STATUS_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{0} is not configured")]
    NotConfigured(PaymentMethod),

    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider answered but refused
    #[error("provider rejected the request: {0}")]
    Rejected(String),

    #[error("unexpected provider response: {0}")]
    InvalidResponse(String),

    #[error("invalid callback payload: {0}")]
    InvalidPayload(String),
}

/// Canonical initiation request
#[derive(Debug, Clone)]
pub struct InitiateRequest {
    pub order_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub description: String,
    pub customer_phone: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
    pub webhook_url: String,
}

#[derive(Debug, Clone)]
pub struct InitiateResponse {
    pub transaction_id: String,
    pub payment_url: String,
    pub raw: Value,
}

/// Callback normalised into the canonical shape
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackData {
    pub transaction_id: String,
    pub order_id: Option<String>,
    pub status: PaymentStatus,
    pub provider_reference: Option<String>,
    pub message: Option<String>,
    pub raw: Value,
}

/// Result of a status poll
#[derive(Debug, Clone)]
pub struct StatusCheck {
    pub status: PaymentStatus,
    pub provider_reference: Option<String>,
    pub raw: Value,
}

/// Operator-facing provider status (no secrets)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderInfo {
    pub configured: bool,
    pub api_url: String,
    pub merchant_id: Option<String>,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn method(&self) -> PaymentMethod;

    /// Header carrying the webhook signature
    fn signature_header(&self) -> &'static str;

    fn is_configured(&self) -> bool;

    fn info(&self) -> ProviderInfo;

    async fn initiate(&self, req: &InitiateRequest) -> Result<InitiateResponse, ProviderError>;

    /// Constant-time signature check over the webhook body
    ///
    /// Always false when the provider is not configured.
    fn verify_signature(&self, raw_body: &[u8], payload: &Value, signature: &str) -> bool;

    async fn check_status(&self, transaction_id: &str) -> Result<StatusCheck, ProviderError>;

    fn map_status(&self, raw: &str) -> PaymentStatus;

    fn parse_callback(&self, payload: &Value) -> Result<CallbackData, ProviderError>;
}

/// Look `raw` up in a status table (case-insensitive, default `Pending`)
pub(crate) fn map_with(table: &[(&str, PaymentStatus)], raw: &str) -> PaymentStatus {
    let raw = raw.trim();
    table
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(raw))
        .map(|(_, status)| *status)
        .unwrap_or(PaymentStatus::Pending)
}

/// First string value among `keys`
pub(crate) fn first_str(payload: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match payload.get(*k) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Whole amounts go out as integers, fractional ones as floats
pub(crate) fn amount_json(amount: Decimal) -> Value {
    if amount.fract().is_zero()
        && let Some(whole) = amount.to_i64()
    {
        return Value::from(whole);
    }
    amount.to_f64().map(Value::from).unwrap_or(Value::Null)
}

/// `***` + last four characters
pub(crate) fn mask_merchant_id(id: &str) -> String {
    let chars: Vec<char> = id.chars().collect();
    let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
    format!("***{tail}")
}

pub(crate) fn provider_info(config: &ProviderConfig) -> ProviderInfo {
    ProviderInfo {
        configured: config.is_configured(),
        api_url: config.api_url.clone(),
        merchant_id: config.merchant_id.as_deref().map(mask_merchant_id),
    }
}

/// Decode a provider JSON response; non-2xx bodies become `Rejected`
pub(crate) async fn read_json(resp: reqwest::Response) -> Result<Value, ProviderError> {
    let status = resp.status();
    let body: Value = match resp.json().await {
        Ok(body) => body,
        Err(e) => {
            tracing::debug!(http_status = status.as_u16(), error = %e, "Provider body is not JSON");
            Value::Null
        }
    };
    if status.is_success() {
        return Ok(body);
    }
    let message = first_str(&body, &["message", "error"])
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
    Err(ProviderError::Rejected(message))
}

/// Providers selected by payment method
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<PaymentMethod, Arc<dyn PaymentProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// MyNita + Wave from configuration (unconfigured ones are still listed)
    pub fn from_config(config: &Config) -> Self {
        Self::new()
            .with(Arc::new(MyNitaProvider::new(config.mynita.clone())))
            .with(Arc::new(WaveProvider::new(config.wave.clone())))
    }

    pub fn with(mut self, provider: Arc<dyn PaymentProvider>) -> Self {
        self.providers.insert(provider.method(), provider);
        self
    }

    pub fn get(&self, method: PaymentMethod) -> Option<&Arc<dyn PaymentProvider>> {
        self.providers.get(&method)
    }

    /// Provider by webhook path segment (`wave`, `mynita`)
    pub fn by_slug(&self, slug: &str) -> Option<&Arc<dyn PaymentProvider>> {
        let method = slug.parse::<PaymentMethod>().ok()?;
        self.get(method)
    }

    pub fn status(&self) -> BTreeMap<String, ProviderInfo> {
        self.providers
            .iter()
            .map(|(method, p)| (method.slug(), p.info()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_status_is_pending() {
        let table = [("paid", PaymentStatus::Success)];
        assert_eq!(map_with(&table, "PAID"), PaymentStatus::Success);
        assert_eq!(map_with(&table, "weird"), PaymentStatus::Pending);
        assert_eq!(map_with(&table, ""), PaymentStatus::Pending);
    }

    fn response(status: u16, body: &'static str) -> reqwest::Response {
        http::Response::builder()
            .status(status)
            .body(body)
            .unwrap()
            .into()
    }

    #[tokio::test]
    async fn non_json_error_body_reports_http_status() {
        let err = read_json(response(502, "<html>bad gateway</html>")).await.unwrap_err();
        assert!(matches!(err, ProviderError::Rejected(ref m) if m == "HTTP 502"));

        let err = read_json(response(400, r#"{"message":"amount too low"}"#)).await.unwrap_err();
        assert!(matches!(err, ProviderError::Rejected(ref m) if m == "amount too low"));
    }

    #[tokio::test]
    async fn non_json_success_body_is_null() {
        let body = read_json(response(200, "ok")).await.unwrap();
        assert!(body.is_null());
    }

    #[test]
    fn masking_keeps_last_four() {
        assert_eq!(mask_merchant_id("MERCHANT-12345"), "***2345");
        assert_eq!(mask_merchant_id("ab"), "***ab");
    }

    #[test]
    fn amounts_serialise_as_numbers() {
        assert_eq!(amount_json(Decimal::from(6000)), serde_json::json!(6000));
        assert_eq!(amount_json(Decimal::new(1250, 2)), serde_json::json!(12.5));
    }

    #[test]
    fn registry_resolves_slugs() {
        let config = Config::for_development();
        let registry = ProviderRegistry::from_config(&config);
        assert!(registry.by_slug("wave").is_some());
        assert!(registry.by_slug("MYNITA").is_some());
        assert!(registry.by_slug("cash").is_none());
        assert!(registry.by_slug("paypal").is_none());
        assert_eq!(registry.status().len(), 2);
    }
}

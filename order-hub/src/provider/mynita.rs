//! MyNita mobile-money adapter
//!
//! Requests and callbacks are signed with hex HMAC-SHA256 over the canonical
//! `k=v&…` string of the sorted top-level fields.

use async_trait::async_trait;
use serde_json::{Value, json};
use shared::order::{PaymentMethod, PaymentStatus};

use super::signature::{canonical_string, sign_hex, verify_hex};
use super::{
    CallbackData, INITIATE_TIMEOUT, InitiateRequest, InitiateResponse, PaymentProvider,
    ProviderError, ProviderInfo, STATUS_TIMEOUT, StatusCheck, amount_json, first_str, map_with,
    provider_info, read_json,
};
use crate::config::ProviderConfig;

const STATUS_TABLE: &[(&str, PaymentStatus)] = &[
    ("success", PaymentStatus::Success),
    ("completed", PaymentStatus::Success),
    ("paid", PaymentStatus::Success),
    ("failed", PaymentStatus::Failed),
    ("error", PaymentStatus::Failed),
    ("cancelled", PaymentStatus::Cancelled),
    ("canceled", PaymentStatus::Cancelled),
    ("pending", PaymentStatus::Pending),
    ("processing", PaymentStatus::Pending),
];

pub struct MyNitaProvider {
    config: ProviderConfig,
    http: reqwest::Client,
}

/// Credentials of a configured provider
struct Credentials<'a> {
    api_key: &'a str,
    secret_key: &'a str,
    merchant_id: &'a str,
}

impl MyNitaProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn credentials(&self) -> Result<Credentials<'_>, ProviderError> {
        match (
            self.config.api_key.as_deref(),
            self.config.secret_key.as_deref(),
            self.config.merchant_id.as_deref(),
        ) {
            (Some(api_key), Some(secret_key), Some(merchant_id)) => Ok(Credentials {
                api_key,
                secret_key,
                merchant_id,
            }),
            _ => Err(ProviderError::NotConfigured(PaymentMethod::Mynita)),
        }
    }
}

#[async_trait]
impl PaymentProvider for MyNitaProvider {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Mynita
    }

    fn signature_header(&self) -> &'static str {
        "x-mynita-signature"
    }

    fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    fn info(&self) -> ProviderInfo {
        provider_info(&self.config)
    }

    async fn initiate(&self, req: &InitiateRequest) -> Result<InitiateResponse, ProviderError> {
        let creds = self.credentials()?;

        let mut body = json!({
            "merchant_id": creds.merchant_id,
            "order_id": req.order_id,
            "amount": amount_json(req.amount),
            "currency": req.currency,
            "description": req.description,
            "customer_phone": req.customer_phone,
            "success_url": req.success_url,
            "cancel_url": req.cancel_url,
            "webhook_url": req.webhook_url,
            "timestamp": shared::util::now_millis(),
        });
        let signature = sign_hex(creds.secret_key, canonical_string(&body).as_bytes());
        body["signature"] = Value::String(signature);

        tracing::info!(order_id = %req.order_id, "Initiating MyNita payment");

        let resp = self
            .http
            .post(format!("{}/payments/initiate", self.config.api_url))
            .bearer_auth(creds.api_key)
            .json(&body)
            .timeout(INITIATE_TIMEOUT)
            .send()
            .await?;
        let data = read_json(resp).await?;

        if data["success"].as_bool() != Some(true) {
            let message = first_str(&data, &["message"]).unwrap_or_else(|| "unknown error".into());
            return Err(ProviderError::Rejected(message));
        }

        let transaction_id = first_str(&data, &["transaction_id"])
            .ok_or_else(|| ProviderError::InvalidResponse("missing transaction_id".into()))?;
        let payment_url = first_str(&data, &["payment_url"])
            .ok_or_else(|| ProviderError::InvalidResponse("missing payment_url".into()))?;

        Ok(InitiateResponse {
            transaction_id,
            payment_url,
            raw: data,
        })
    }

    fn verify_signature(&self, _raw_body: &[u8], payload: &Value, signature: &str) -> bool {
        let Ok(creds) = self.credentials() else {
            return false;
        };
        verify_hex(
            creds.secret_key,
            canonical_string(payload).as_bytes(),
            signature,
        )
    }

    async fn check_status(&self, transaction_id: &str) -> Result<StatusCheck, ProviderError> {
        let creds = self.credentials()?;
        let resp = self
            .http
            .get(format!(
                "{}/payments/{transaction_id}/status",
                self.config.api_url
            ))
            .bearer_auth(creds.api_key)
            .timeout(STATUS_TIMEOUT)
            .send()
            .await?;
        let data = read_json(resp).await?;

        let status = first_str(&data, &["status"])
            .map(|s| self.map_status(&s))
            .unwrap_or(PaymentStatus::Pending);
        Ok(StatusCheck {
            status,
            provider_reference: first_str(&data, &["mynita_reference", "reference"]),
            raw: data,
        })
    }

    fn map_status(&self, raw: &str) -> PaymentStatus {
        map_with(STATUS_TABLE, raw)
    }

    fn parse_callback(&self, payload: &Value) -> Result<CallbackData, ProviderError> {
        if !payload.is_object() {
            return Err(ProviderError::InvalidPayload("expected a JSON object".into()));
        }
        let transaction_id = first_str(payload, &["transaction_id", "id"])
            .ok_or_else(|| ProviderError::InvalidPayload("missing transaction_id".into()))?;
        let status = first_str(payload, &["status"])
            .map(|s| self.map_status(&s))
            .unwrap_or(PaymentStatus::Pending);

        Ok(CallbackData {
            transaction_id,
            order_id: first_str(payload, &["order_id", "reference"]),
            status,
            provider_reference: first_str(payload, &["mynita_reference", "reference"]),
            message: first_str(payload, &["message", "description"]),
            raw: payload.clone(),
        })
    }
}

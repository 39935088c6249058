//! Wave checkout adapter
//!
//! Signatures are hex HMAC-SHA256 over the exact request/webhook body bytes.

use async_trait::async_trait;
use serde_json::{Value, json};
use shared::order::{PaymentMethod, PaymentStatus};

use super::signature::{sign_hex, verify_hex};
use super::{
    CallbackData, INITIATE_TIMEOUT, InitiateRequest, InitiateResponse, PaymentProvider,
    ProviderError, ProviderInfo, STATUS_TIMEOUT, StatusCheck, amount_json, first_str, map_with,
    provider_info, read_json,
};
use crate::config::ProviderConfig;

const STATUS_TABLE: &[(&str, PaymentStatus)] = &[
    ("success", PaymentStatus::Success),
    ("successful", PaymentStatus::Success),
    ("completed", PaymentStatus::Success),
    ("paid", PaymentStatus::Success),
    ("failed", PaymentStatus::Failed),
    ("error", PaymentStatus::Failed),
    ("declined", PaymentStatus::Failed),
    ("cancelled", PaymentStatus::Cancelled),
    ("canceled", PaymentStatus::Cancelled),
    ("pending", PaymentStatus::Pending),
    ("processing", PaymentStatus::Pending),
    ("initiated", PaymentStatus::Pending),
];

pub struct WaveProvider {
    config: ProviderConfig,
    http: reqwest::Client,
}

impl WaveProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        if !self.config.is_configured() {
            return Err(ProviderError::NotConfigured(PaymentMethod::Wave));
        }
        self.config
            .api_key
            .as_deref()
            .ok_or(ProviderError::NotConfigured(PaymentMethod::Wave))
    }

    fn secret(&self) -> Option<&str> {
        if !self.config.is_configured() {
            return None;
        }
        self.config.secret_key.as_deref()
    }
}

#[async_trait]
impl PaymentProvider for WaveProvider {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Wave
    }

    fn signature_header(&self) -> &'static str {
        "x-wave-signature"
    }

    fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    fn info(&self) -> ProviderInfo {
        provider_info(&self.config)
    }

    async fn initiate(&self, req: &InitiateRequest) -> Result<InitiateResponse, ProviderError> {
        let api_key = self.api_key()?;
        let secret = self
            .secret()
            .ok_or(ProviderError::NotConfigured(PaymentMethod::Wave))?;

        let body = json!({
            "merchant_id": self.config.merchant_id,
            "reference": req.order_id,
            "amount": amount_json(req.amount),
            "currency": req.currency,
            "description": req.description,
            "customer": { "phone": req.customer_phone },
            "callback_urls": {
                "success": req.success_url,
                "cancel": req.cancel_url,
                "webhook": req.webhook_url,
            },
            "metadata": {
                "order_id": req.order_id,
                "timestamp": shared::util::now_millis(),
            },
        });
        // 签名必须覆盖实际发送的字节
        let bytes = serde_json::to_vec(&body)
            .map_err(|e| ProviderError::InvalidPayload(e.to_string()))?;
        let signature = sign_hex(secret, &bytes);

        tracing::info!(order_id = %req.order_id, "Initiating Wave payment");

        let resp = self
            .http
            .post(format!("{}/payments/initialize", self.config.api_url))
            .bearer_auth(api_key)
            .header("X-Wave-Signature", signature)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(bytes)
            .timeout(INITIATE_TIMEOUT)
            .send()
            .await?;
        let data = read_json(resp).await?;

        let accepted = data["success"].as_bool() == Some(true)
            || data["status"].as_str() == Some("success");
        if !accepted {
            let message =
                first_str(&data, &["message", "error"]).unwrap_or_else(|| "unknown error".into());
            return Err(ProviderError::Rejected(message));
        }

        let transaction_id = first_str(&data, &["transaction_id", "id"])
            .ok_or_else(|| ProviderError::InvalidResponse("missing transaction id".into()))?;
        let payment_url = first_str(&data, &["payment_url", "checkout_url"])
            .ok_or_else(|| ProviderError::InvalidResponse("missing payment url".into()))?;

        Ok(InitiateResponse {
            transaction_id,
            payment_url,
            raw: data,
        })
    }

    fn verify_signature(&self, raw_body: &[u8], _payload: &Value, signature: &str) -> bool {
        match self.secret() {
            Some(secret) => verify_hex(secret, raw_body, signature),
            None => false,
        }
    }

    async fn check_status(&self, transaction_id: &str) -> Result<StatusCheck, ProviderError> {
        let api_key = self.api_key()?;
        let resp = self
            .http
            .get(format!("{}/payments/{transaction_id}", self.config.api_url))
            .bearer_auth(api_key)
            .timeout(STATUS_TIMEOUT)
            .send()
            .await?;
        let data = read_json(resp).await?;

        let status = first_str(&data, &["status"])
            .map(|s| self.map_status(&s))
            .unwrap_or(PaymentStatus::Pending);
        Ok(StatusCheck {
            status,
            provider_reference: first_str(&data, &["wave_reference", "id"]),
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
        let transaction_id = first_str(payload, &["id", "transaction_id"])
            .ok_or_else(|| ProviderError::InvalidPayload("missing id".into()))?;
        let status = first_str(payload, &["status"])
            .map(|s| self.map_status(&s))
            .unwrap_or(PaymentStatus::Pending);
        let order_id = payload
            .get("metadata")
            .and_then(|m| first_str(m, &["order_id"]))
            .or_else(|| first_str(payload, &["reference"]));

        Ok(CallbackData {
            transaction_id,
            order_id,
            status,
            provider_reference: first_str(payload, &["wave_reference", "id"]),
            message: first_str(payload, &["message", "status_message"]),
            raw: payload.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> WaveProvider {
        WaveProvider::new(ProviderConfig {
            api_url: "http://127.0.0.1:9".into(),
            api_key: Some("key".into()),
            secret_key: Some("wave-secret".into()),
            merchant_id: Some("WAVE-7781".into()),
        })
    }

    #[test]
    fn status_table() {
        let p = configured();
        assert_eq!(p.map_status("successful"), PaymentStatus::Success);
        assert_eq!(p.map_status("Declined"), PaymentStatus::Failed);
        assert_eq!(p.map_status("initiated"), PaymentStatus::Pending);
        assert_eq!(p.map_status("chargeback"), PaymentStatus::Pending);
    }

    #[test]
    fn callback_reads_metadata_order() {
        let p = configured();
        let cb = p
            .parse_callback(&json!({
                "id": "wave-tx-1",
                "status": "completed",
                "metadata": { "order_id": "o-1" },
                "status_message": "done",
            }))
            .unwrap();
        assert_eq!(cb.transaction_id, "wave-tx-1");
        assert_eq!(cb.order_id.as_deref(), Some("o-1"));
        assert_eq!(cb.provider_reference.as_deref(), Some("wave-tx-1"));
        assert_eq!(cb.status, PaymentStatus::Success);
        assert_eq!(cb.message.as_deref(), Some("done"));
    }

    #[test]
    fn signature_over_raw_body() {
        let p = configured();
        let body = br#"{"id":"wave-tx-1","status":"completed"}"#;
        let sig = sign_hex("wave-secret", body);
        let payload: Value = serde_json::from_slice(body).unwrap();

        assert!(p.verify_signature(body, &payload, &sig));
        assert!(!p.verify_signature(br#"{"id":"wave-tx-1","status":"failed"}"#, &payload, &sig));
    }

    #[test]
    fn info_masks_merchant() {
        let info = configured().info();
        assert!(info.configured);
        assert_eq!(info.merchant_id.as_deref(), Some("***7781"));
    }
}

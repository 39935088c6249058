//! Provider webhooks
//!
//! POST /payments/webhooks/{provider}: raw body, signature in the provider's
//! header. Every processed outcome answers 200 `{success, message}` so the
//! provider stops retrying; malformed, unknown-provider and
//! unsigned-when-required callbacks answer 400.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use serde::Serialize;

use crate::payments::{CallbackOutcome, PaymentError};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct WebhookReply {
    pub success: bool,
    pub message: String,
}

type WebhookResponse = (StatusCode, Json<WebhookReply>);

fn reply(result: Result<CallbackOutcome, PaymentError>, provider: &str) -> WebhookResponse {
    match result {
        Ok(outcome) => (
            StatusCode::OK,
            Json(WebhookReply {
                success: true,
                message: outcome.message().to_string(),
            }),
        ),
        Err(e) => {
            tracing::warn!(provider = %provider, error = %e, "Webhook rejected");
            let status = if e.is_bad_request() {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::OK
            };
            let message = match e {
                PaymentError::Store(_) => "Internal error".to_string(),
                other => other.to_string(),
            };
            (
                status,
                Json(WebhookReply {
                    success: false,
                    message,
                }),
            )
        }
    }
}

pub async fn handle_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> WebhookResponse {
    let signature = state
        .payments
        .signature_header(&provider)
        .and_then(|name| headers.get(name))
        .and_then(|v| v.to_str().ok());

    tracing::info!(provider = %provider, signed = signature.is_some(), "Received payment webhook");

    let result = state
        .payments
        .handle_callback(&provider, &body, signature)
        .await;
    reply(result, &provider)
}

/// Development only: canonical unsigned body
pub async fn handle_test_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    body: Bytes,
) -> WebhookResponse {
    let result = match serde_json::from_slice::<serde_json::Value>(&body) {
        Ok(payload) => {
            state
                .payments
                .handle_test_callback(&provider, &payload)
                .await
        }
        Err(e) => Err(PaymentError::InvalidPayload(e.to_string())),
    };
    reply(result, &provider)
}

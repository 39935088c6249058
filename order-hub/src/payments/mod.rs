//! Payment Orchestrator
//!
//! Initiates provider payments against PENDING orders and reconciles the
//! provider callbacks. Settlement is idempotent per `transaction_id`: the
//! terminal-state gate is checked inside the same store unit that writes the
//! outcome, so retried callbacks change nothing and emit nothing.

mod orchestrator;

pub use orchestrator::{CallbackOutcome, PaymentDeps, PaymentOrchestrator, PaymentSettings};

use shared::error::{AppError, ErrorCode};
use shared::order::{OrderStatus, PaymentMethod};
use thiserror::Error;

use crate::provider::ProviderError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("order {0} not found")]
    OrderNotFound(String),

    #[error("order {order_id} is {status}, payments need a PENDING order")]
    OrderNotPending {
        order_id: String,
        status: OrderStatus,
    },

    #[error("{0} is not settled by a payment provider")]
    UnsupportedProvider(PaymentMethod),

    /// Webhook path names no known provider
    #[error("unknown payment provider {0}")]
    UnknownProvider(String),

    #[error("{0} is not configured")]
    ProviderUnavailable(PaymentMethod),

    #[error("order {0} already has an active payment")]
    AlreadyInProgress(String),

    #[error("provider could not create the payment: {0}")]
    InitiationFailed(String),

    #[error("missing webhook signature")]
    MissingSignature,

    #[error("invalid webhook signature")]
    InvalidSignature,

    #[error("malformed callback: {0}")]
    InvalidPayload(String),

    #[error("payment {0} not found")]
    PaymentNotFound(String),

    #[error(transparent)]
    Provider(ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PaymentError {
    /// Webhook rejections answered with a client error instead of 200
    pub fn is_bad_request(&self) -> bool {
        matches!(
            self,
            PaymentError::UnknownProvider(_)
                | PaymentError::MissingSignature
                | PaymentError::InvalidPayload(_)
        )
    }
}

impl From<ProviderError> for PaymentError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::NotConfigured(method) => PaymentError::ProviderUnavailable(method),
            ProviderError::InvalidPayload(msg) => PaymentError::InvalidPayload(msg),
            other => PaymentError::Provider(other),
        }
    }
}

impl From<PaymentError> for AppError {
    fn from(e: PaymentError) -> Self {
        match e {
            PaymentError::OrderNotFound(id) => {
                AppError::new(ErrorCode::OrderNotFound).with_detail("order_id", id)
            }
            PaymentError::OrderNotPending { order_id, status } => {
                AppError::new(ErrorCode::OrderNotPending)
                    .with_detail("order_id", order_id)
                    .with_detail("current", status.as_str())
            }
            PaymentError::UnsupportedProvider(method) => {
                AppError::new(ErrorCode::PaymentUnsupportedProvider)
                    .with_detail("method", method.as_str())
            }
            PaymentError::UnknownProvider(name) => {
                AppError::new(ErrorCode::PaymentUnsupportedProvider).with_detail("provider", name)
            }
            PaymentError::ProviderUnavailable(method) => {
                AppError::new(ErrorCode::PaymentProviderUnavailable)
                    .with_detail("method", method.as_str())
            }
            PaymentError::AlreadyInProgress(order_id) => {
                AppError::new(ErrorCode::PaymentAlreadyInProgress).with_detail("order_id", order_id)
            }
            PaymentError::InitiationFailed(msg) => {
                AppError::with_message(ErrorCode::PaymentInitiationFailed, msg)
            }
            PaymentError::MissingSignature | PaymentError::InvalidSignature => {
                AppError::new(ErrorCode::PaymentInvalidSignature)
            }
            PaymentError::InvalidPayload(msg) => AppError::with_message(ErrorCode::InvalidFormat, msg),
            PaymentError::PaymentNotFound(id) => {
                AppError::new(ErrorCode::PaymentNotFound).with_detail("payment", id)
            }
            PaymentError::Provider(e) => {
                tracing::warn!(error = %e, "Provider call failed");
                AppError::new(ErrorCode::PaymentFailed)
            }
            PaymentError::Store(e) => e.into(),
        }
    }
}

pub type PaymentResult<T> = Result<T, PaymentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_client_errors() {
        assert!(PaymentError::MissingSignature.is_bad_request());
        assert!(PaymentError::UnknownProvider("paypal".into()).is_bad_request());
        assert!(!PaymentError::InvalidSignature.is_bad_request());
        assert!(!PaymentError::PaymentNotFound("tx".into()).is_bad_request());
    }

    #[test]
    fn not_configured_becomes_unavailable() {
        let err: PaymentError = ProviderError::NotConfigured(PaymentMethod::Wave).into();
        let app: AppError = err.into();
        assert_eq!(app.code, ErrorCode::PaymentProviderUnavailable);
    }

    #[test]
    fn not_pending_reports_current_status() {
        let app: AppError = PaymentError::OrderNotPending {
            order_id: "o1".into(),
            status: OrderStatus::Preparing,
        }
        .into();
        assert_eq!(app.code, ErrorCode::OrderNotPending);
        assert_eq!(app.http_status(), http::StatusCode::CONFLICT);
    }
}

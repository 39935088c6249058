//! Service-layer error bridge
//!
//! Store and infrastructure failures become `InternalError` after being
//! logged; business errors pass through as `AppError` unchanged.

use shared::error::{AppError, ErrorCode};

use crate::store::StoreError;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateOrderNumber(number) => AppError::with_message(
                ErrorCode::OrderCreationFailed,
                format!("Order number {number} already taken"),
            ),
            StoreError::ActivePaymentExists(order_id) => {
                AppError::new(ErrorCode::PaymentAlreadyInProgress)
                    .with_detail("order_id", order_id)
            }
            StoreError::DuplicateTransaction(_) => {
                AppError::new(ErrorCode::PaymentInitiationFailed)
            }
            StoreError::NotFound(what) => AppError::not_found(what),
            StoreError::Backend(err) => {
                tracing::error!(error = %err, "Store backend error");
                AppError::new(ErrorCode::InternalError)
            }
        }
    }
}

/// Handler result alias
pub type ApiResult<T> = Result<shared::ApiResponse<T>, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_errors_hide_details() {
        let err: AppError = StoreError::Backend("connection reset".into()).into();
        assert_eq!(err.code, ErrorCode::InternalError);
        assert!(!err.message.contains("connection reset"));
    }

    #[test]
    fn active_payment_maps_to_conflict() {
        let err: AppError = StoreError::ActivePaymentExists("o1".into()).into();
        assert_eq!(err.code, ErrorCode::PaymentAlreadyInProgress);
        assert_eq!(err.http_status(), http::StatusCode::CONFLICT);
    }
}

//! Order Ledger
//!
//! Owns orders and their lines: catalog validation, totals, per-tenant daily
//! numbering and the status state machine.

mod ledger;
mod numbering;

pub use ledger::{LedgerDeps, OrderLedger};
pub(crate) use ledger::publish_transition;
pub use numbering::{MAX_NUMBER_ATTEMPTS, OrderNumbering, next_order_number};

use serde::Serialize;
use shared::error::{AppError, ErrorCode};
use shared::order::OrderStatus;
use thiserror::Error;

use crate::error::BoxError;
use crate::store::StoreError;

/// Why a requested line was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    NotFound,
    Unavailable,
    OutOfStock,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedLine {
    /// Position in the request
    pub line: usize,
    pub item_id: String,
    pub reason: RejectReason,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("order has no items")]
    EmptyOrder,

    #[error("{0}")]
    Validation(String),

    #[error("{} requested item(s) cannot be ordered", .0.len())]
    ItemUnavailable(Vec<RejectedLine>),

    #[error("table {0} not found")]
    TableNotFound(String),

    #[error("tenant {0} not found")]
    TenantNotFound(String),

    #[error("order {0} not found")]
    OrderNotFound(String),

    #[error("cannot move order from {current} to {requested}")]
    InvalidTransition {
        current: OrderStatus,
        requested: OrderStatus,
        allowed: &'static [OrderStatus],
    },

    #[error("order {0} is already delivered")]
    AlreadyCompleted(String),

    #[error("order {0} is already cancelled")]
    AlreadyCancelled(String),

    #[error("order {0} kept changing, giving up")]
    ConcurrentModification(String),

    #[error("could not allocate an order number: {0}")]
    CreationFailed(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Catalog / directory failure
    #[error("collaborator error: {0}")]
    Collaborator(#[source] BoxError),
}

impl From<LedgerError> for AppError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::EmptyOrder => AppError::new(ErrorCode::OrderEmpty),
            LedgerError::Validation(msg) => AppError::validation(msg),
            LedgerError::ItemUnavailable(rejected) => {
                let Some(first) = rejected.first() else {
                    return AppError::new(ErrorCode::ProductUnavailable);
                };
                let code = match first.reason {
                    RejectReason::NotFound => ErrorCode::ProductNotFound,
                    RejectReason::OutOfStock => ErrorCode::ProductOutOfStock,
                    RejectReason::Unavailable => ErrorCode::ProductUnavailable,
                };
                AppError::with_message(code, format!("Item {} cannot be ordered", first.item_id))
                    .with_detail("item_id", first.item_id.clone())
                    .with_detail(
                        "rejected",
                        serde_json::to_value(&rejected).unwrap_or_default(),
                    )
            }
            LedgerError::TableNotFound(id) => {
                AppError::new(ErrorCode::TableNotFound).with_detail("table_id", id)
            }
            LedgerError::TenantNotFound(_) => AppError::new(ErrorCode::TenantNotFound),
            LedgerError::OrderNotFound(id) => {
                AppError::new(ErrorCode::OrderNotFound).with_detail("order_id", id)
            }
            LedgerError::InvalidTransition {
                current,
                requested,
                allowed,
            } => AppError::with_message(
                ErrorCode::OrderInvalidTransition,
                format!("Cannot move order from {current} to {requested}"),
            )
            .with_detail("current", current.as_str())
            .with_detail("requested", requested.as_str())
            .with_detail(
                "allowed",
                allowed.iter().map(OrderStatus::as_str).collect::<Vec<_>>(),
            ),
            LedgerError::AlreadyCompleted(_) => AppError::new(ErrorCode::OrderAlreadyCompleted),
            LedgerError::AlreadyCancelled(_) => AppError::new(ErrorCode::OrderAlreadyCancelled),
            LedgerError::ConcurrentModification(_) => {
                AppError::new(ErrorCode::OrderConcurrentModification)
            }
            LedgerError::CreationFailed(msg) => {
                tracing::error!(reason = %msg, "Order creation failed");
                AppError::new(ErrorCode::OrderCreationFailed)
            }
            LedgerError::Store(e) => e.into(),
            LedgerError::Collaborator(e) => {
                tracing::error!(error = %e, "Collaborator lookup failed");
                AppError::new(ErrorCode::InternalError)
            }
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

//! Persistence ports for orders and payments
//!
//! ```text
//! OrderLedger ──► OrderRepository ──┐
//!                                   ├── MemoryStore (default, tests)
//! PaymentOrchestrator ──► PaymentRepository ──┘   PgStore (feature "postgres")
//! ```
//!
//! Every read and write takes the tenant id except the transaction-id lookup,
//! which is global because provider callbacks carry no tenant context.
//! Data constraints live here, not in the callers:
//! - `(tenant_id, order_number)` is unique
//! - `transaction_id` is unique
//! - at most one PENDING/SUCCESS payment per order

mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgStore;

use async_trait::async_trait;
use shared::order::{
    Order, OrderFilter, OrderStatus, OrderStatusChange, Payment, PaymentFilter, PaymentStatus,
};
use thiserror::Error;

use crate::error::BoxError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("order number {0} already exists for tenant")]
    DuplicateOrderNumber(String),

    #[error("order {0} already has an active payment")]
    ActivePaymentExists(String),

    #[error("transaction {0} already exists")]
    DuplicateTransaction(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("storage backend error: {0}")]
    Backend(#[source] BoxError),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of a conditional status write
#[derive(Debug, Clone)]
pub enum CasOutcome {
    /// Status matched the expectation; order and history were written
    Applied(Order),
    /// Someone else moved the order first
    Stale(OrderStatus),
    NotFound,
}

/// Terminal outcome of a payment, applied once per transaction
#[derive(Debug, Clone)]
pub struct Settlement {
    pub transaction_id: String,
    pub status: PaymentStatus,
    pub provider_reference: Option<String>,
    /// Raw callback (or status poll) payload
    pub callback_data: serde_json::Value,
    pub processed_at: i64,
}

#[derive(Debug, Clone)]
pub enum SettleOutcome {
    /// This call moved the payment out of PENDING
    Applied {
        payment: Payment,
        /// Order after confirmation steps (Some only for SUCCESS)
        order: Option<Order>,
        /// Transitions written for the confirmation steps
        transitions: Vec<OrderStatusChange>,
    },
    /// The payment was already terminal; nothing written
    AlreadySettled(Payment),
}

/// Order persistence
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert a new order with its lines
    ///
    /// Fails with `DuplicateOrderNumber` when the tenant already uses the number.
    async fn insert_order(&self, order: &Order) -> StoreResult<()>;

    async fn find_order(&self, tenant_id: &str, order_id: &str) -> StoreResult<Option<Order>>;

    /// Highest order number of the tenant starting with `prefix`
    async fn last_order_number(&self, tenant_id: &str, prefix: &str)
    -> StoreResult<Option<String>>;

    /// Write `change.new_status` only if the stored status is still
    /// `change.old_status`; history is appended in the same unit
    async fn compare_and_set_status(
        &self,
        tenant_id: &str,
        change: &OrderStatusChange,
    ) -> StoreResult<CasOutcome>;

    /// Filtered page (newest first) and the total match count
    async fn list_orders(
        &self,
        tenant_id: &str,
        filter: &OrderFilter,
    ) -> StoreResult<(Vec<Order>, u64)>;

    /// Non-terminal orders, oldest first
    async fn active_orders(&self, tenant_id: &str) -> StoreResult<Vec<Order>>;

    /// All orders created inside the window (stats input)
    async fn orders_between(
        &self,
        tenant_id: &str,
        from: Option<i64>,
        to: Option<i64>,
    ) -> StoreResult<Vec<Order>>;

    async fn status_history(
        &self,
        tenant_id: &str,
        order_id: &str,
    ) -> StoreResult<Vec<OrderStatusChange>>;
}

/// Payment persistence
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Insert a PENDING payment
    ///
    /// Fails with `ActivePaymentExists` when the order already has a PENDING or
    /// SUCCESS payment and with `DuplicateTransaction` on a reused transaction id.
    /// Both checks and the write are one atomic unit.
    async fn insert_payment(&self, payment: &Payment) -> StoreResult<()>;

    async fn find_active_payment(
        &self,
        tenant_id: &str,
        order_id: &str,
    ) -> StoreResult<Option<Payment>>;

    /// Global lookup by external correlation key
    async fn find_by_transaction(&self, transaction_id: &str) -> StoreResult<Option<Payment>>;

    async fn find_payment(&self, tenant_id: &str, payment_id: &str)
    -> StoreResult<Option<Payment>>;

    /// Filtered payments, newest first, limit/offset applied
    async fn list_payments(
        &self,
        tenant_id: &str,
        filter: &PaymentFilter,
    ) -> StoreResult<Vec<Payment>>;

    /// Every payment of the tenant (stats input)
    async fn all_payments(&self, tenant_id: &str) -> StoreResult<Vec<Payment>>;

    /// PENDING payments whose `expires_at` is before `now`
    async fn stale_pending(&self, tenant_id: &str, now: i64) -> StoreResult<Vec<Payment>>;

    /// Apply a terminal outcome
    ///
    /// The terminal-state gate, the payment write and (on SUCCESS) the order
    /// confirmation steps happen in one unit. A second call for the same
    /// transaction returns `AlreadySettled` and writes nothing.
    async fn settle(&self, settlement: &Settlement) -> StoreResult<SettleOutcome>;
}

/// `provider_data` after settlement: previous keys plus callback data
pub(crate) fn merge_provider_data(
    existing: &serde_json::Value,
    settlement: &Settlement,
) -> serde_json::Value {
    let mut data = match existing {
        serde_json::Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    data.insert("callback_data".into(), settlement.callback_data.clone());
    data.insert(
        "processed_at".into(),
        serde_json::Value::from(settlement.processed_at),
    );
    serde_json::Value::Object(data)
}

/// History rows for the confirmation steps of a paid order
pub(crate) fn confirmation_changes(
    order: &Order,
    settlement: &Settlement,
) -> Vec<OrderStatusChange> {
    let mut current = order.status;
    order
        .status
        .payment_confirmation_path()
        .iter()
        .map(|next| {
            let change = OrderStatusChange {
                order_id: order.id.clone(),
                old_status: current,
                new_status: *next,
                reason: Some(format!(
                    "payment {} confirmed",
                    settlement.transaction_id
                )),
                user_id: None,
                changed_at: settlement.processed_at,
            };
            current = *next;
            change
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use shared::order::PaymentMethod;

    fn order(status: OrderStatus) -> Order {
        Order {
            id: "o1".into(),
            tenant_id: "t1".into(),
            order_number: "202601010001".into(),
            table_id: None,
            user_id: None,
            customer_name: None,
            customer_phone: None,
            notes: None,
            status,
            payment_method: PaymentMethod::Wave,
            total_amount: Decimal::from(100),
            items: vec![],
            created_at: 1,
            updated_at: 1,
        }
    }

    fn settlement() -> Settlement {
        Settlement {
            transaction_id: "tx-1".into(),
            status: PaymentStatus::Success,
            provider_reference: None,
            callback_data: serde_json::json!({"status": "paid"}),
            processed_at: 42,
        }
    }

    #[test]
    fn confirmation_changes_chain_from_pending() {
        let changes = confirmation_changes(&order(OrderStatus::Pending), &settlement());
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].old_status, OrderStatus::Pending);
        assert_eq!(changes[0].new_status, OrderStatus::Accepted);
        assert_eq!(changes[1].old_status, OrderStatus::Accepted);
        assert_eq!(changes[1].new_status, OrderStatus::Preparing);
        assert!(changes.iter().all(|c| c.changed_at == 42));
    }

    #[test]
    fn confirmation_changes_empty_for_cancelled() {
        assert!(confirmation_changes(&order(OrderStatus::Cancelled), &settlement()).is_empty());
    }

    #[test]
    fn merge_keeps_initiation_urls() {
        let existing = serde_json::json!({"payment_url": "https://pay"});
        let merged = merge_provider_data(&existing, &settlement());
        assert_eq!(merged["payment_url"], "https://pay");
        assert_eq!(merged["callback_data"]["status"], "paid");
        assert_eq!(merged["processed_at"], 42);
    }
}

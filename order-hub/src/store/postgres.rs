//! PostgreSQL store (feature `postgres`)
//!
//! Constraints from `migrations/0001_init.sql` back the invariants:
//! `orders_tenant_number_key`, `payments_transaction_id_key` and the partial
//! index `payments_one_active_per_order`. Unique violations are mapped back to
//! the matching `StoreError`.

use async_trait::async_trait;
use rust_decimal::Decimal;
use shared::order::{
    Order, OrderFilter, OrderLine, OrderStatus, OrderStatusChange, Payment, PaymentFilter,
    PaymentMethod, PaymentStatus,
};
use sqlx::{PgPool, Postgres, Transaction};

use super::{
    CasOutcome, OrderRepository, PaymentRepository, SettleOutcome, Settlement, StoreError,
    StoreResult, confirmation_changes, merge_provider_data,
};

const ORDER_COLUMNS: &str = "id, tenant_id, order_number, table_id, user_id, customer_name, \
     customer_phone, notes, status, payment_method, total_amount, created_at, updated_at";

const PAYMENT_COLUMNS: &str = "id, tenant_id, order_id, method, amount, currency, status, \
     transaction_id, provider_reference, provider_data, expires_at, created_at, updated_at";

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(e.into())
    }
}

fn decode_err(e: shared::order::UnknownStatus) -> StoreError {
    StoreError::Backend(e.into())
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: String,
    tenant_id: String,
    order_number: String,
    table_id: Option<String>,
    user_id: Option<String>,
    customer_name: Option<String>,
    customer_phone: Option<String>,
    notes: Option<String>,
    status: String,
    payment_method: String,
    total_amount: Decimal,
    created_at: i64,
    updated_at: i64,
}

#[derive(sqlx::FromRow)]
struct LineRow {
    id: String,
    order_id: String,
    item_id: String,
    name: String,
    quantity: i32,
    unit_price: Decimal,
    total_price: Decimal,
    note: Option<String>,
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    order_id: String,
    old_status: String,
    new_status: String,
    reason: Option<String>,
    user_id: Option<String>,
    changed_at: i64,
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: String,
    tenant_id: String,
    order_id: String,
    method: String,
    amount: Decimal,
    currency: String,
    status: String,
    transaction_id: String,
    provider_reference: Option<String>,
    provider_data: serde_json::Value,
    expires_at: i64,
    created_at: i64,
    updated_at: i64,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderLine>) -> StoreResult<Order> {
        Ok(Order {
            status: self.status.parse::<OrderStatus>().map_err(decode_err)?,
            payment_method: self
                .payment_method
                .parse::<PaymentMethod>()
                .map_err(decode_err)?,
            id: self.id,
            tenant_id: self.tenant_id,
            order_number: self.order_number,
            table_id: self.table_id,
            user_id: self.user_id,
            customer_name: self.customer_name,
            customer_phone: self.customer_phone,
            notes: self.notes,
            total_amount: self.total_amount,
            items,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl From<LineRow> for OrderLine {
    fn from(row: LineRow) -> Self {
        OrderLine {
            id: row.id,
            item_id: row.item_id,
            name: row.name,
            quantity: row.quantity,
            unit_price: row.unit_price,
            total_price: row.total_price,
            note: row.note,
        }
    }
}

impl TryFrom<HistoryRow> for OrderStatusChange {
    type Error = StoreError;

    fn try_from(row: HistoryRow) -> StoreResult<Self> {
        Ok(OrderStatusChange {
            order_id: row.order_id,
            old_status: row.old_status.parse().map_err(decode_err)?,
            new_status: row.new_status.parse().map_err(decode_err)?,
            reason: row.reason,
            user_id: row.user_id,
            changed_at: row.changed_at,
        })
    }
}

impl TryFrom<PaymentRow> for Payment {
    type Error = StoreError;

    fn try_from(row: PaymentRow) -> StoreResult<Self> {
        Ok(Payment {
            method: row.method.parse::<PaymentMethod>().map_err(decode_err)?,
            status: row.status.parse::<PaymentStatus>().map_err(decode_err)?,
            id: row.id,
            tenant_id: row.tenant_id,
            order_id: row.order_id,
            amount: row.amount,
            currency: row.currency,
            transaction_id: row.transaction_id,
            provider_reference: row.provider_reference,
            provider_data: row.provider_data,
            expires_at: row.expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Constraint name of a unique violation, if that is what failed
fn unique_violation(e: &sqlx::Error) -> Option<String> {
    match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            Some(db.constraint().unwrap_or_default().to_string())
        }
        _ => None,
    }
}

/// Postgres-backed order and payment store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and run migrations
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPool::connect(database_url).await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Backend(e.into()))?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Attach lines to order rows (one query for the whole batch)
    async fn hydrate(&self, rows: Vec<OrderRow>) -> StoreResult<Vec<Order>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let lines: Vec<LineRow> = sqlx::query_as(
            "SELECT id, order_id, item_id, name, quantity, unit_price, total_price, note
             FROM order_items WHERE order_id = ANY($1) ORDER BY order_id, position",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_order: std::collections::HashMap<String, Vec<OrderLine>> =
            std::collections::HashMap::new();
        for line in lines {
            by_order
                .entry(line.order_id.clone())
                .or_default()
                .push(line.into());
        }
        rows.into_iter()
            .map(|row| {
                let items = by_order.remove(&row.id).unwrap_or_default();
                row.into_order(items)
            })
            .collect()
    }

    async fn load_order_in(
        tx: &mut Transaction<'_, Postgres>,
        order_id: &str,
    ) -> StoreResult<Option<OrderRow>> {
        let row = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(order_id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row)
    }

    async fn insert_history(
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: &str,
        change: &OrderStatusChange,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO order_status_history
                (tenant_id, order_id, old_status, new_status, reason, user_id, changed_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(tenant_id)
        .bind(&change.order_id)
        .bind(change.old_status.as_str())
        .bind(change.new_status.as_str())
        .bind(&change.reason)
        .bind(&change.user_id)
        .bind(change.changed_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for PgStore {
    async fn insert_order(&self, order: &Order) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            "INSERT INTO orders (id, tenant_id, order_number, table_id, user_id, customer_name,
                customer_phone, notes, status, payment_method, total_amount, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(&order.id)
        .bind(&order.tenant_id)
        .bind(&order.order_number)
        .bind(&order.table_id)
        .bind(&order.user_id)
        .bind(&order.customer_name)
        .bind(&order.customer_phone)
        .bind(&order.notes)
        .bind(order.status.as_str())
        .bind(order.payment_method.as_str())
        .bind(order.total_amount)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            return Err(match unique_violation(&e) {
                Some(c) if c == "orders_tenant_number_key" => {
                    StoreError::DuplicateOrderNumber(order.order_number.clone())
                }
                _ => e.into(),
            });
        }

        for (position, line) in order.items.iter().enumerate() {
            sqlx::query(
                "INSERT INTO order_items
                    (id, order_id, position, item_id, name, quantity, unit_price, total_price, note)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(&line.id)
            .bind(&order.id)
            .bind(position as i32)
            .bind(&line.item_id)
            .bind(&line.name)
            .bind(line.quantity)
            .bind(line.unit_price)
            .bind(line.total_price)
            .bind(&line.note)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_order(&self, tenant_id: &str, order_id: &str) -> StoreResult<Option<Order>> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE tenant_id = $1 AND id = $2"
        ))
        .bind(tenant_id)
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn last_order_number(
        &self,
        tenant_id: &str,
        prefix: &str,
    ) -> StoreResult<Option<String>> {
        let number: Option<String> = sqlx::query_scalar(
            "SELECT MAX(order_number) FROM orders WHERE tenant_id = $1 AND order_number LIKE $2",
        )
        .bind(tenant_id)
        .bind(format!("{prefix}%"))
        .fetch_one(&self.pool)
        .await?;
        Ok(number)
    }

    async fn compare_and_set_status(
        &self,
        tenant_id: &str,
        change: &OrderStatusChange,
    ) -> StoreResult<CasOutcome> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            "UPDATE orders SET status = $1, updated_at = $2
             WHERE tenant_id = $3 AND id = $4 AND status = $5",
        )
        .bind(change.new_status.as_str())
        .bind(change.changed_at)
        .bind(tenant_id)
        .bind(&change.order_id)
        .bind(change.old_status.as_str())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let current: Option<String> =
                sqlx::query_scalar("SELECT status FROM orders WHERE tenant_id = $1 AND id = $2")
                    .bind(tenant_id)
                    .bind(&change.order_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            tx.rollback().await?;
            return match current {
                Some(status) => Ok(CasOutcome::Stale(status.parse().map_err(decode_err)?)),
                None => Ok(CasOutcome::NotFound),
            };
        }

        Self::insert_history(&mut tx, tenant_id, change).await?;
        tx.commit().await?;

        match self.find_order(tenant_id, &change.order_id).await? {
            Some(order) => Ok(CasOutcome::Applied(order)),
            None => Ok(CasOutcome::NotFound),
        }
    }

    async fn list_orders(
        &self,
        tenant_id: &str,
        filter: &OrderFilter,
    ) -> StoreResult<(Vec<Order>, u64)> {
        const WHERE: &str = "WHERE tenant_id = $1
               AND ($2::text IS NULL OR status = $2)
               AND ($3::text IS NULL OR payment_method = $3)
               AND ($4::text IS NULL OR table_id = $4)
               AND ($5::bigint IS NULL OR created_at >= $5)
               AND ($6::bigint IS NULL OR created_at <= $6)";

        let status = filter.status.map(|s| s.as_str());
        let method = filter.payment_method.map(|m| m.as_str());

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM orders {WHERE}"))
            .bind(tenant_id)
            .bind(status)
            .bind(method)
            .bind(&filter.table_id)
            .bind(filter.from)
            .bind(filter.to)
            .fetch_one(&self.pool)
            .await?;

        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders {WHERE}
             ORDER BY created_at DESC, order_number DESC LIMIT $7 OFFSET $8"
        ))
        .bind(tenant_id)
        .bind(status)
        .bind(method)
        .bind(&filter.table_id)
        .bind(filter.from)
        .bind(filter.to)
        .bind(i64::from(filter.limit()))
        .bind(i64::try_from(filter.offset()).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok((self.hydrate(rows).await?, total.max(0) as u64))
    }

    async fn active_orders(&self, tenant_id: &str) -> StoreResult<Vec<Order>> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders
             WHERE tenant_id = $1 AND status NOT IN ('DELIVERED', 'CANCELLED')
             ORDER BY created_at ASC, order_number ASC"
        ))
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        self.hydrate(rows).await
    }

    async fn orders_between(
        &self,
        tenant_id: &str,
        from: Option<i64>,
        to: Option<i64>,
    ) -> StoreResult<Vec<Order>> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders
             WHERE tenant_id = $1
               AND ($2::bigint IS NULL OR created_at >= $2)
               AND ($3::bigint IS NULL OR created_at <= $3)"
        ))
        .bind(tenant_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        self.hydrate(rows).await
    }

    async fn status_history(
        &self,
        tenant_id: &str,
        order_id: &str,
    ) -> StoreResult<Vec<OrderStatusChange>> {
        let rows: Vec<HistoryRow> = sqlx::query_as(
            "SELECT order_id, old_status, new_status, reason, user_id, changed_at
             FROM order_status_history WHERE tenant_id = $1 AND order_id = $2 ORDER BY id",
        )
        .bind(tenant_id)
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[async_trait]
impl PaymentRepository for PgStore {
    async fn insert_payment(&self, payment: &Payment) -> StoreResult<()> {
        let result = sqlx::query(
            "INSERT INTO payments (id, tenant_id, order_id, method, amount, currency, status,
                transaction_id, provider_reference, provider_data, expires_at, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(&payment.id)
        .bind(&payment.tenant_id)
        .bind(&payment.order_id)
        .bind(payment.method.as_str())
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(payment.status.as_str())
        .bind(&payment.transaction_id)
        .bind(&payment.provider_reference)
        .bind(&payment.provider_data)
        .bind(payment.expires_at)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => Err(match unique_violation(&e).as_deref() {
                Some("payments_one_active_per_order") => {
                    StoreError::ActivePaymentExists(payment.order_id.clone())
                }
                Some("payments_transaction_id_key") => {
                    StoreError::DuplicateTransaction(payment.transaction_id.clone())
                }
                _ => e.into(),
            }),
        }
    }

    async fn find_active_payment(
        &self,
        tenant_id: &str,
        order_id: &str,
    ) -> StoreResult<Option<Payment>> {
        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments
             WHERE tenant_id = $1 AND order_id = $2 AND status IN ('PENDING', 'SUCCESS')"
        ))
        .bind(tenant_id)
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn find_by_transaction(&self, transaction_id: &str) -> StoreResult<Option<Payment>> {
        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE transaction_id = $1"
        ))
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn find_payment(
        &self,
        tenant_id: &str,
        payment_id: &str,
    ) -> StoreResult<Option<Payment>> {
        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE tenant_id = $1 AND id = $2"
        ))
        .bind(tenant_id)
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list_payments(
        &self,
        tenant_id: &str,
        filter: &PaymentFilter,
    ) -> StoreResult<Vec<Payment>> {
        let rows: Vec<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments
             WHERE tenant_id = $1
               AND ($2::text IS NULL OR status = $2)
               AND ($3::text IS NULL OR method = $3)
               AND ($4::bigint IS NULL OR created_at >= $4)
               AND ($5::bigint IS NULL OR created_at <= $5)
             ORDER BY created_at DESC LIMIT $6 OFFSET $7"
        ))
        .bind(tenant_id)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.method.map(|m| m.as_str()))
        .bind(filter.from)
        .bind(filter.to)
        .bind(i64::from(filter.limit()))
        .bind(i64::from(filter.offset()))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn all_payments(&self, tenant_id: &str) -> StoreResult<Vec<Payment>> {
        let rows: Vec<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE tenant_id = $1"
        ))
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn stale_pending(&self, tenant_id: &str, now: i64) -> StoreResult<Vec<Payment>> {
        let rows: Vec<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments
             WHERE tenant_id = $1 AND status = 'PENDING' AND expires_at < $2
             ORDER BY expires_at"
        ))
        .bind(tenant_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn settle(&self, settlement: &Settlement) -> StoreResult<SettleOutcome> {
        let mut tx = self.pool.begin().await?;

        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE transaction_id = $1 FOR UPDATE"
        ))
        .bind(&settlement.transaction_id)
        .fetch_optional(&mut *tx)
        .await?;
        let mut payment: Payment = row
            .ok_or_else(|| StoreError::NotFound(settlement.transaction_id.clone()))?
            .try_into()?;

        if payment.status.is_terminal() {
            tx.rollback().await?;
            return Ok(SettleOutcome::AlreadySettled(payment));
        }

        payment.status = settlement.status;
        if settlement.provider_reference.is_some() {
            payment.provider_reference = settlement.provider_reference.clone();
        }
        payment.provider_data = merge_provider_data(&payment.provider_data, settlement);
        payment.updated_at = settlement.processed_at;

        sqlx::query(
            "UPDATE payments SET status = $1, provider_reference = $2, provider_data = $3,
                updated_at = $4 WHERE id = $5",
        )
        .bind(payment.status.as_str())
        .bind(&payment.provider_reference)
        .bind(&payment.provider_data)
        .bind(payment.updated_at)
        .bind(&payment.id)
        .execute(&mut *tx)
        .await?;

        let mut transitions = Vec::new();
        let mut confirmed = None;
        if settlement.status == PaymentStatus::Success
            && let Some(row) = Self::load_order_in(&mut tx, &payment.order_id).await?
        {
            let order = row.into_order(Vec::new())?;
            transitions = confirmation_changes(&order, settlement);
            if let Some(last) = transitions.last() {
                sqlx::query("UPDATE orders SET status = $1, updated_at = $2 WHERE id = $3")
                    .bind(last.new_status.as_str())
                    .bind(settlement.processed_at)
                    .bind(&order.id)
                    .execute(&mut *tx)
                    .await?;
                for change in &transitions {
                    Self::insert_history(&mut tx, &payment.tenant_id, change).await?;
                }
            }
            confirmed = Some(order.id);
        }

        tx.commit().await?;

        let order = match confirmed {
            Some(order_id) => self.find_order(&payment.tenant_id, &order_id).await?,
            None => None,
        };
        Ok(SettleOutcome::Applied {
            payment,
            order,
            transitions,
        })
    }
}

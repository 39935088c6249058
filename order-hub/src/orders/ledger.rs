use rust_decimal::Decimal;
use serde_json::json;
use shared::order::{
    CreateOrderRequest, Order, OrderFilter, OrderLine, OrderLineInput, OrderPage, OrderStats,
    OrderStatus, OrderStatusChange, OrderSummary, Pagination,
};
use shared::realtime::ServerMessage;
use shared::util::{millis_to_utc, new_id, now_millis};
use std::sync::Arc;

use super::numbering::{MAX_NUMBER_ATTEMPTS, OrderNumbering, next_order_number};
use super::{LedgerError, LedgerResult, RejectReason, RejectedLine};
use crate::audit::{AuditEntry, AuditEventType, AuditService};
use crate::catalog::Catalog;
use crate::directory::Directory;
use crate::live::EventPublisher;
use crate::store::{CasOutcome, OrderRepository, StoreError};

const MAX_LINE_NOTE: usize = 500;
const MAX_CUSTOMER_NAME: usize = 255;
const MAX_CUSTOMER_PHONE: usize = 20;
const MAX_ORDER_NOTES: usize = 1000;
const MAX_REASON: usize = 500;

/// Re-validations of a status change that lost a concurrent race
const MAX_TRANSITION_ATTEMPTS: usize = 3;

/// Collaborators injected into the ledger
#[derive(Clone)]
pub struct LedgerDeps {
    pub orders: Arc<dyn OrderRepository>,
    pub catalog: Arc<dyn Catalog>,
    pub directory: Arc<dyn Directory>,
    pub publisher: Arc<dyn EventPublisher>,
    pub audit: AuditService,
}

pub struct OrderLedger {
    orders: Arc<dyn OrderRepository>,
    catalog: Arc<dyn Catalog>,
    directory: Arc<dyn Directory>,
    publisher: Arc<dyn EventPublisher>,
    audit: AuditService,
    numbering: OrderNumbering,
}

fn check_len(field: &str, value: Option<&str>, max: usize) -> LedgerResult<()> {
    match value {
        Some(v) if v.chars().count() > max => Err(LedgerError::Validation(format!(
            "{field} must be at most {max} characters"
        ))),
        _ => Ok(()),
    }
}

/// Shape checks that need no lookups
fn validate_request(req: &CreateOrderRequest) -> LedgerResult<()> {
    if req.items.is_empty() {
        return Err(LedgerError::EmptyOrder);
    }
    for (idx, line) in req.items.iter().enumerate() {
        if line.item_id.trim().is_empty() {
            return Err(LedgerError::Validation(format!("line {idx}: item_id is required")));
        }
        if line.quantity < 1 {
            return Err(LedgerError::Validation(format!(
                "line {idx}: quantity must be at least 1"
            )));
        }
        check_len("note", line.note.as_deref(), MAX_LINE_NOTE)?;
    }
    check_len("customer_name", req.customer_name.as_deref(), MAX_CUSTOMER_NAME)?;
    check_len("customer_phone", req.customer_phone.as_deref(), MAX_CUSTOMER_PHONE)?;
    check_len("notes", req.notes.as_deref(), MAX_ORDER_NOTES)?;
    Ok(())
}

impl OrderLedger {
    pub fn new(deps: LedgerDeps) -> Self {
        Self {
            orders: deps.orders,
            catalog: deps.catalog,
            directory: deps.directory,
            publisher: deps.publisher,
            audit: deps.audit,
            numbering: OrderNumbering::new(),
        }
    }

    // ========== 创建 ==========

    /// Create an order for an authenticated tenant
    pub async fn create(
        &self,
        tenant_id: &str,
        user_id: Option<&str>,
        req: CreateOrderRequest,
    ) -> LedgerResult<Order> {
        validate_request(&req)?;

        if let Some(table_id) = req.table_id.as_deref() {
            let table = self
                .catalog
                .get_table(table_id, tenant_id)
                .await
                .map_err(LedgerError::Collaborator)?;
            if !table.is_some_and(|t| t.active) {
                return Err(LedgerError::TableNotFound(table_id.to_string()));
            }
        }

        let items = self.price_lines(tenant_id, &req.items).await?;
        let total_amount: Decimal = items.iter().map(|l| l.total_price).sum();
        let now = now_millis();

        let order = Order {
            id: new_id(),
            tenant_id: tenant_id.to_string(),
            order_number: String::new(),
            table_id: req.table_id,
            user_id: user_id.map(str::to_string),
            customer_name: req.customer_name,
            customer_phone: req.customer_phone,
            notes: req.notes,
            status: OrderStatus::Pending,
            payment_method: req.payment_method,
            total_amount,
            items,
            created_at: now,
            updated_at: now,
        };

        let order = self.insert_numbered(order).await?;

        tracing::info!(
            tenant_id = %tenant_id,
            order_id = %order.id,
            order_number = %order.order_number,
            total = %order.total_amount,
            "Order created"
        );

        self.audit.append(
            AuditEntry::new(
                tenant_id,
                AuditEventType::OrderCreated,
                format!("Order {} created", order.order_number),
            )
            .user(user_id)
            .order(&order.id)
            .metadata(json!({
                "order_number": order.order_number,
                "total_amount": order.total_amount.to_string(),
                "items_count": order.items.len(),
                "payment_method": order.payment_method,
            })),
        );
        self.publisher.publish(
            tenant_id,
            ServerMessage::NewOrder {
                order: Box::new(order.clone()),
            },
        );

        Ok(order)
    }

    /// Customer-facing create: the tenant is resolved from its public slug
    pub async fn create_public_order(
        &self,
        tenant_slug: &str,
        req: CreateOrderRequest,
    ) -> LedgerResult<Order> {
        let tenant = self
            .directory
            .tenant_by_slug(tenant_slug)
            .await
            .map_err(LedgerError::Collaborator)?
            .filter(|t| t.active)
            .ok_or_else(|| LedgerError::TenantNotFound(tenant_slug.to_string()))?;
        self.create(&tenant.id, None, req).await
    }

    /// Batch validation: every line is checked and all rejections reported
    async fn price_lines(
        &self,
        tenant_id: &str,
        inputs: &[OrderLineInput],
    ) -> LedgerResult<Vec<OrderLine>> {
        let mut lines = Vec::with_capacity(inputs.len());
        let mut rejected = Vec::new();

        for (idx, input) in inputs.iter().enumerate() {
            let item = self
                .catalog
                .get_item(&input.item_id, tenant_id)
                .await
                .map_err(LedgerError::Collaborator)?;
            let reason = match &item {
                None => Some(RejectReason::NotFound),
                Some(i) if !i.available => Some(RejectReason::Unavailable),
                Some(i) if i.out_of_stock => Some(RejectReason::OutOfStock),
                Some(_) => None,
            };
            match (reason, item) {
                (Some(reason), _) => rejected.push(RejectedLine {
                    line: idx,
                    item_id: input.item_id.clone(),
                    reason,
                }),
                (None, Some(item)) => lines.push(OrderLine {
                    id: new_id(),
                    item_id: item.id,
                    name: item.name,
                    quantity: input.quantity,
                    unit_price: item.unit_price,
                    total_price: item.unit_price * Decimal::from(input.quantity),
                    note: input.note.clone(),
                }),
                (None, None) => {}
            }
        }

        if !rejected.is_empty() {
            tracing::info!(
                tenant_id = %tenant_id,
                rejected = rejected.len(),
                "Order lines rejected"
            );
            return Err(LedgerError::ItemUnavailable(rejected));
        }
        Ok(lines)
    }

    async fn insert_numbered(&self, mut order: Order) -> LedgerResult<Order> {
        let date_prefix = millis_to_utc(order.created_at).format("%Y%m%d").to_string();
        let _guard = self.numbering.lock(&order.tenant_id, &date_prefix).await;

        for attempt in 1..=MAX_NUMBER_ATTEMPTS {
            let last = self
                .orders
                .last_order_number(&order.tenant_id, &date_prefix)
                .await?;
            order.order_number = next_order_number(last.as_deref(), &date_prefix)?;

            match self.orders.insert_order(&order).await {
                Ok(()) => return Ok(order),
                Err(StoreError::DuplicateOrderNumber(number)) => {
                    tracing::warn!(
                        tenant_id = %order.tenant_id,
                        order_number = %number,
                        attempt,
                        "Order number collision, retrying"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(LedgerError::CreationFailed(format!(
            "{MAX_NUMBER_ATTEMPTS} number collisions for tenant {}",
            order.tenant_id
        )))
    }

    // ========== 状态机 ==========

    /// Apply a staff status change
    pub async fn update_status(
        &self,
        tenant_id: &str,
        order_id: &str,
        requested: OrderStatus,
        reason: Option<String>,
        user_id: Option<&str>,
    ) -> LedgerResult<Order> {
        self.transition(tenant_id, order_id, requested, reason, user_id)
            .await
    }

    /// Cancel, with dedicated errors for orders already finished
    pub async fn cancel(
        &self,
        tenant_id: &str,
        order_id: &str,
        reason: Option<String>,
        user_id: Option<&str>,
    ) -> LedgerResult<Order> {
        self.transition(tenant_id, order_id, OrderStatus::Cancelled, reason, user_id)
            .await
    }

    /// Optimistic read-validate-write loop
    ///
    /// A lost race re-reads the order and re-validates the transition before
    /// trying again.
    async fn transition(
        &self,
        tenant_id: &str,
        order_id: &str,
        requested: OrderStatus,
        reason: Option<String>,
        user_id: Option<&str>,
    ) -> LedgerResult<Order> {
        check_len("reason", reason.as_deref(), MAX_REASON)?;

        for _ in 0..MAX_TRANSITION_ATTEMPTS {
            let order = self.get_order(tenant_id, order_id).await?;

            if requested == OrderStatus::Cancelled {
                match order.status {
                    OrderStatus::Delivered => {
                        return Err(LedgerError::AlreadyCompleted(order.id));
                    }
                    OrderStatus::Cancelled => {
                        return Err(LedgerError::AlreadyCancelled(order.id));
                    }
                    _ => {}
                }
            }
            if !order.status.can_transition_to(requested) {
                return Err(LedgerError::InvalidTransition {
                    current: order.status,
                    requested,
                    allowed: order.status.allowed_transitions(),
                });
            }

            let change = OrderStatusChange {
                order_id: order.id.clone(),
                old_status: order.status,
                new_status: requested,
                reason: reason.clone(),
                user_id: user_id.map(str::to_string),
                changed_at: now_millis(),
            };

            match self.orders.compare_and_set_status(tenant_id, &change).await? {
                CasOutcome::Applied(updated) => {
                    self.after_transition(&updated, &change);
                    return Ok(updated);
                }
                CasOutcome::Stale(current) => {
                    tracing::debug!(
                        order_id = %order_id,
                        expected = %change.old_status,
                        current = %current,
                        "Status changed concurrently, re-validating"
                    );
                }
                CasOutcome::NotFound => {
                    return Err(LedgerError::OrderNotFound(order_id.to_string()));
                }
            }
        }

        tracing::warn!(tenant_id = %tenant_id, order_id = %order_id, "Status update kept losing races");
        Err(LedgerError::ConcurrentModification(order_id.to_string()))
    }

    fn after_transition(&self, order: &Order, change: &OrderStatusChange) {
        tracing::info!(
            tenant_id = %order.tenant_id,
            order_id = %order.id,
            old_status = %change.old_status,
            new_status = %change.new_status,
            "Order status changed"
        );

        self.audit.append(
            AuditEntry::new(
                &order.tenant_id,
                AuditEventType::OrderUpdated,
                format!(
                    "Order {} moved from {} to {}",
                    order.order_number, change.old_status, change.new_status
                ),
            )
            .user(change.user_id.as_deref())
            .order(&order.id)
            .metadata(json!({
                "old_status": change.old_status,
                "new_status": change.new_status,
                "reason": change.reason,
            })),
        );

        publish_transition(self.publisher.as_ref(), order, change);
    }

    // ========== 查询 ==========

    pub async fn get_order(&self, tenant_id: &str, order_id: &str) -> LedgerResult<Order> {
        self.orders
            .find_order(tenant_id, order_id)
            .await?
            .ok_or_else(|| LedgerError::OrderNotFound(order_id.to_string()))
    }

    pub async fn list_orders(&self, tenant_id: &str, filter: &OrderFilter) -> LedgerResult<OrderPage> {
        let (orders, total) = self.orders.list_orders(tenant_id, filter).await?;
        Ok(OrderPage {
            orders: orders.into_iter().map(OrderSummary::from).collect(),
            pagination: Pagination::new(filter.page(), filter.limit(), total),
        })
    }

    /// Non-terminal orders, oldest first
    pub async fn active_orders(&self, tenant_id: &str) -> LedgerResult<Vec<Order>> {
        Ok(self.orders.active_orders(tenant_id).await?)
    }

    pub async fn order_stats(
        &self,
        tenant_id: &str,
        from: Option<i64>,
        to: Option<i64>,
    ) -> LedgerResult<OrderStats> {
        let orders = self.orders.orders_between(tenant_id, from, to).await?;
        Ok(OrderStats::from_orders(&orders))
    }

    pub async fn status_history(
        &self,
        tenant_id: &str,
        order_id: &str,
    ) -> LedgerResult<Vec<OrderStatusChange>> {
        // 先确认订单属于该 tenant
        self.get_order(tenant_id, order_id).await?;
        Ok(self.orders.status_history(tenant_id, order_id).await?)
    }
}

/// Broadcast a recorded transition (`order_ready` rides along on READY)
pub(crate) fn publish_transition(
    publisher: &dyn EventPublisher,
    order: &Order,
    change: &OrderStatusChange,
) {
    publisher.publish(
        &order.tenant_id,
        ServerMessage::OrderStatusUpdate {
            order_id: order.id.clone(),
            order_number: order.order_number.clone(),
            old_status: change.old_status,
            new_status: change.new_status,
            table_id: order.table_id.clone(),
        },
    );
    if change.new_status == OrderStatus::Ready {
        publisher.publish(
            &order.tenant_id,
            ServerMessage::OrderReady {
                order_id: order.id.clone(),
                order_number: order.order_number.clone(),
                table_id: order.table_id.clone(),
            },
        );
    }
}

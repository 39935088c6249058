//! In-memory store
//!
//! One `parking_lot::Mutex` per tenant guards that tenant's orders, history
//! and payments, so every multi-record unit (order + history, payment +
//! order confirmation) is atomic. Locks are never held across an `.await`.
//! Transaction ids are indexed globally because callbacks arrive without a
//! tenant.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use shared::order::{
    Order, OrderFilter, OrderStatusChange, Payment, PaymentFilter, PaymentStatus,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::{
    CasOutcome, OrderRepository, PaymentRepository, SettleOutcome, Settlement, StoreError,
    StoreResult, confirmation_changes, merge_provider_data,
};

#[derive(Default)]
struct TenantTables {
    orders: HashMap<String, Order>,
    order_numbers: HashSet<String>,
    history: HashMap<String, Vec<OrderStatusChange>>,
    payments: HashMap<String, Payment>,
}

impl TenantTables {
    fn active_payment_for(&self, order_id: &str) -> Option<&Payment> {
        self.payments
            .values()
            .find(|p| p.order_id == order_id && p.status.is_active())
    }
}

/// Process-local store; the default backend and the one tests run against
#[derive(Clone, Default)]
pub struct MemoryStore {
    tenants: Arc<DashMap<String, Arc<Mutex<TenantTables>>>>,
    /// transaction_id → (tenant_id, payment_id)
    transactions: Arc<DashMap<String, (String, String)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tenant(&self, tenant_id: &str) -> Arc<Mutex<TenantTables>> {
        self.tenants
            .entry(tenant_id.to_string())
            .or_default()
            .value()
            .clone()
    }

    fn existing_tenant(&self, tenant_id: &str) -> Option<Arc<Mutex<TenantTables>>> {
        self.tenants.get(tenant_id).map(|t| t.value().clone())
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn insert_order(&self, order: &Order) -> StoreResult<()> {
        let tables = self.tenant(&order.tenant_id);
        let mut tables = tables.lock();
        if !tables.order_numbers.insert(order.order_number.clone()) {
            return Err(StoreError::DuplicateOrderNumber(order.order_number.clone()));
        }
        tables.orders.insert(order.id.clone(), order.clone());
        Ok(())
    }

    async fn find_order(&self, tenant_id: &str, order_id: &str) -> StoreResult<Option<Order>> {
        Ok(self
            .existing_tenant(tenant_id)
            .and_then(|t| t.lock().orders.get(order_id).cloned()))
    }

    async fn last_order_number(
        &self,
        tenant_id: &str,
        prefix: &str,
    ) -> StoreResult<Option<String>> {
        Ok(self.existing_tenant(tenant_id).and_then(|t| {
            t.lock()
                .order_numbers
                .iter()
                .filter(|n| n.starts_with(prefix))
                .max()
                .cloned()
        }))
    }

    async fn compare_and_set_status(
        &self,
        tenant_id: &str,
        change: &OrderStatusChange,
    ) -> StoreResult<CasOutcome> {
        let Some(tables) = self.existing_tenant(tenant_id) else {
            return Ok(CasOutcome::NotFound);
        };
        let mut tables = tables.lock();
        let Some(order) = tables.orders.get_mut(&change.order_id) else {
            return Ok(CasOutcome::NotFound);
        };
        if order.status != change.old_status {
            return Ok(CasOutcome::Stale(order.status));
        }
        order.status = change.new_status;
        order.updated_at = change.changed_at;
        let updated = order.clone();
        tables
            .history
            .entry(change.order_id.clone())
            .or_default()
            .push(change.clone());
        Ok(CasOutcome::Applied(updated))
    }

    async fn list_orders(
        &self,
        tenant_id: &str,
        filter: &OrderFilter,
    ) -> StoreResult<(Vec<Order>, u64)> {
        let Some(tables) = self.existing_tenant(tenant_id) else {
            return Ok((Vec::new(), 0));
        };
        let mut matched: Vec<Order> = tables
            .lock()
            .orders
            .values()
            .filter(|o| filter.matches(o))
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.order_number.cmp(&a.order_number))
        });
        let total = matched.len() as u64;
        let page = matched
            .into_iter()
            .skip(usize::try_from(filter.offset()).unwrap_or(usize::MAX))
            .take(filter.limit() as usize)
            .collect();
        Ok((page, total))
    }

    async fn active_orders(&self, tenant_id: &str) -> StoreResult<Vec<Order>> {
        let Some(tables) = self.existing_tenant(tenant_id) else {
            return Ok(Vec::new());
        };
        let mut active: Vec<Order> = tables
            .lock()
            .orders
            .values()
            .filter(|o| o.is_active())
            .cloned()
            .collect();
        active.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.order_number.cmp(&b.order_number))
        });
        Ok(active)
    }

    async fn orders_between(
        &self,
        tenant_id: &str,
        from: Option<i64>,
        to: Option<i64>,
    ) -> StoreResult<Vec<Order>> {
        let filter = OrderFilter {
            from,
            to,
            ..Default::default()
        };
        Ok(self
            .existing_tenant(tenant_id)
            .map(|t| {
                t.lock()
                    .orders
                    .values()
                    .filter(|o| filter.matches(o))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn status_history(
        &self,
        tenant_id: &str,
        order_id: &str,
    ) -> StoreResult<Vec<OrderStatusChange>> {
        Ok(self
            .existing_tenant(tenant_id)
            .and_then(|t| t.lock().history.get(order_id).cloned())
            .unwrap_or_default())
    }
}

#[async_trait]
impl PaymentRepository for MemoryStore {
    async fn insert_payment(&self, payment: &Payment) -> StoreResult<()> {
        let tables = self.tenant(&payment.tenant_id);
        let mut tables = tables.lock();
        if tables.active_payment_for(&payment.order_id).is_some() {
            return Err(StoreError::ActivePaymentExists(payment.order_id.clone()));
        }
        match self.transactions.entry(payment.transaction_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(StoreError::DuplicateTransaction(
                    payment.transaction_id.clone(),
                ));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert((payment.tenant_id.clone(), payment.id.clone()));
            }
        }
        tables.payments.insert(payment.id.clone(), payment.clone());
        Ok(())
    }

    async fn find_active_payment(
        &self,
        tenant_id: &str,
        order_id: &str,
    ) -> StoreResult<Option<Payment>> {
        Ok(self
            .existing_tenant(tenant_id)
            .and_then(|t| t.lock().active_payment_for(order_id).cloned()))
    }

    async fn find_by_transaction(&self, transaction_id: &str) -> StoreResult<Option<Payment>> {
        let Some((tenant_id, payment_id)) = self
            .transactions
            .get(transaction_id)
            .map(|e| e.value().clone())
        else {
            return Ok(None);
        };
        self.find_payment(&tenant_id, &payment_id).await
    }

    async fn find_payment(
        &self,
        tenant_id: &str,
        payment_id: &str,
    ) -> StoreResult<Option<Payment>> {
        Ok(self
            .existing_tenant(tenant_id)
            .and_then(|t| t.lock().payments.get(payment_id).cloned()))
    }

    async fn list_payments(
        &self,
        tenant_id: &str,
        filter: &PaymentFilter,
    ) -> StoreResult<Vec<Payment>> {
        let mut matched: Vec<Payment> = self
            .existing_tenant(tenant_id)
            .map(|t| {
                t.lock()
                    .payments
                    .values()
                    .filter(|p| filter.matches(p))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matched
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.limit() as usize)
            .collect())
    }

    async fn all_payments(&self, tenant_id: &str) -> StoreResult<Vec<Payment>> {
        Ok(self
            .existing_tenant(tenant_id)
            .map(|t| t.lock().payments.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn stale_pending(&self, tenant_id: &str, now: i64) -> StoreResult<Vec<Payment>> {
        let mut stale: Vec<Payment> = self
            .existing_tenant(tenant_id)
            .map(|t| {
                t.lock()
                    .payments
                    .values()
                    .filter(|p| p.status == PaymentStatus::Pending && p.expires_at < now)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        stale.sort_by_key(|p| p.expires_at);
        Ok(stale)
    }

    async fn settle(&self, settlement: &Settlement) -> StoreResult<SettleOutcome> {
        let (tenant_id, payment_id) = self
            .transactions
            .get(&settlement.transaction_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| StoreError::NotFound(settlement.transaction_id.clone()))?;

        let tables = self.tenant(&tenant_id);
        let mut tables = tables.lock();

        let payment = tables
            .payments
            .get_mut(&payment_id)
            .ok_or_else(|| StoreError::NotFound(payment_id.clone()))?;
        if payment.status.is_terminal() {
            return Ok(SettleOutcome::AlreadySettled(payment.clone()));
        }

        payment.status = settlement.status;
        if settlement.provider_reference.is_some() {
            payment.provider_reference = settlement.provider_reference.clone();
        }
        payment.provider_data = merge_provider_data(&payment.provider_data, settlement);
        payment.updated_at = settlement.processed_at;
        let payment = payment.clone();

        if settlement.status != PaymentStatus::Success {
            return Ok(SettleOutcome::Applied {
                payment,
                order: None,
                transitions: Vec::new(),
            });
        }

        let Some(order) = tables.orders.get_mut(&payment.order_id) else {
            return Ok(SettleOutcome::Applied {
                payment,
                order: None,
                transitions: Vec::new(),
            });
        };
        let transitions = confirmation_changes(order, settlement);
        if let Some(last) = transitions.last() {
            order.status = last.new_status;
            order.updated_at = settlement.processed_at;
        }
        let order = order.clone();
        if !transitions.is_empty() {
            tables
                .history
                .entry(order.id.clone())
                .or_default()
                .extend(transitions.iter().cloned());
        }

        Ok(SettleOutcome::Applied {
            payment,
            order: Some(order),
            transitions,
        })
    }
}

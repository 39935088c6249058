//! Order, line and payment records plus the request/response shapes built on them

use super::status::{OrderStatus, PaymentMethod, PaymentStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Records
// ============================================================================

/// A tenant-owned order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: String,
    pub tenant_id: String,
    /// `YYYYMMDD` + 4-digit daily sequence, unique per tenant
    pub order_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_id: Option<String>,
    /// Staff member who created the order (None for public orders)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    /// Sum of line totals, fixed at creation
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    pub items: Vec<OrderLine>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Order {
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }
}

/// Order line with prices captured at creation time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderLine {
    pub id: String,
    /// Catalog item reference
    pub item_id: String,
    /// Item name snapshot
    pub name: String,
    pub quantity: i32,
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
    /// `unit_price * quantity`
    #[serde(with = "rust_decimal::serde::float")]
    pub total_price: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// One recorded status transition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderStatusChange {
    pub order_id: String,
    pub old_status: OrderStatus,
    pub new_status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub changed_at: i64,
}

/// A payment attempt against an order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: String,
    pub tenant_id: String,
    pub order_id: String,
    pub method: PaymentMethod,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    /// External correlation key, globally unique
    pub transaction_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_reference: Option<String>,
    /// URLs at initiation; `callback_data` + `processed_at` after settlement
    #[serde(default)]
    pub provider_data: serde_json::Value,
    /// Advisory only, never drives a state change
    pub expires_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

// ============================================================================
// Requests
// ============================================================================

/// Requested order line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLineInput {
    pub item_id: String,
    pub quantity: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Create-order request (staff and public)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<OrderLineInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub payment_method: PaymentMethod,
}

/// Status update request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Cancel request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelOrderRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Optional redirect URLs supplied at initiation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InitiatePaymentRequest {
    pub method: PaymentMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_url: Option<String>,
}

/// Initiation result returned to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub payment_id: String,
    pub transaction_id: String,
    pub payment_url: String,
    pub expires_at: i64,
}

// ============================================================================
// Listings
// ============================================================================

/// Order filter for listings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderFilter {
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub table_id: Option<String>,
    /// Inclusive lower bound (millis)
    #[serde(default)]
    pub from: Option<i64>,
    /// Inclusive upper bound (millis)
    #[serde(default)]
    pub to: Option<i64>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
}

impl OrderFilter {
    pub const DEFAULT_LIMIT: u32 = 20;
    pub const MAX_LIMIT: u32 = 100;

    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> u32 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }

    /// Rows to skip; computed in u64 so a huge `page` cannot overflow
    pub fn offset(&self) -> u64 {
        u64::from(self.page() - 1) * u64::from(self.limit())
    }

    pub fn matches(&self, order: &Order) -> bool {
        self.status.is_none_or(|s| order.status == s)
            && self.payment_method.is_none_or(|m| order.payment_method == m)
            && self
                .table_id
                .as_deref()
                .is_none_or(|t| order.table_id.as_deref() == Some(t))
            && self.from.is_none_or(|from| order.created_at >= from)
            && self.to.is_none_or(|to| order.created_at <= to)
    }
}

/// Order row in a listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSummary {
    #[serde(flatten)]
    pub order: Order,
    pub items_count: usize,
}

impl From<Order> for OrderSummary {
    fn from(order: Order) -> Self {
        let items_count = order.items.len();
        Self { order, items_count }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u64,
}

impl Pagination {
    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        let pages = total.div_ceil(u64::from(limit.max(1)));
        Self {
            page,
            limit,
            total,
            pages,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPage {
    pub orders: Vec<OrderSummary>,
    pub pagination: Pagination,
}

/// Payment filter for listings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentFilter {
    #[serde(default)]
    pub status: Option<PaymentStatus>,
    #[serde(default)]
    pub method: Option<PaymentMethod>,
    #[serde(default)]
    pub from: Option<i64>,
    #[serde(default)]
    pub to: Option<i64>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
}

impl PaymentFilter {
    pub const DEFAULT_LIMIT: u32 = 50;
    pub const MAX_LIMIT: u32 = 200;

    pub fn limit(&self) -> u32 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }

    pub fn offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }

    pub fn matches(&self, payment: &Payment) -> bool {
        self.status.is_none_or(|s| payment.status == s)
            && self.method.is_none_or(|m| payment.method == m)
            && self.from.is_none_or(|from| payment.created_at >= from)
            && self.to.is_none_or(|to| payment.created_at <= to)
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Count and amount for one payment method
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MethodTotals {
    pub count: u64,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
}

/// Order statistics over an optional created-at window
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OrderStats {
    pub total_orders: u64,
    pub by_status: BTreeMap<String, u64>,
    /// Sum of DELIVERED totals
    #[serde(with = "rust_decimal::serde::float")]
    pub revenue: Decimal,
    /// Revenue / delivered count
    #[serde(with = "rust_decimal::serde::float")]
    pub average_order_value: Decimal,
    pub by_payment_method: BTreeMap<String, MethodTotals>,
}

impl OrderStats {
    pub fn from_orders<'a>(orders: impl IntoIterator<Item = &'a Order>) -> Self {
        let mut stats = OrderStats::default();
        let mut delivered: u64 = 0;
        for order in orders {
            stats.total_orders += 1;
            *stats
                .by_status
                .entry(order.status.as_str().to_string())
                .or_default() += 1;
            let per_method = stats
                .by_payment_method
                .entry(order.payment_method.as_str().to_string())
                .or_default();
            per_method.count += 1;
            per_method.total += order.total_amount;
            if order.status == OrderStatus::Delivered {
                delivered += 1;
                stats.revenue += order.total_amount;
            }
        }
        if delivered > 0 {
            stats.average_order_value = (stats.revenue / Decimal::from(delivered)).round_dp(2);
        }
        stats
    }
}

/// Payment statistics for a tenant
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PaymentStats {
    pub total_payments: u64,
    pub successful: u64,
    pub failed: u64,
    pub pending: u64,
    pub cancelled: u64,
    /// Percentage of successful payments, two decimals
    #[serde(with = "rust_decimal::serde::float")]
    pub success_rate: Decimal,
    /// Sum of successful amounts
    #[serde(with = "rust_decimal::serde::float")]
    pub revenue: Decimal,
    pub by_method: BTreeMap<String, MethodTotals>,
}

impl PaymentStats {
    pub fn from_payments<'a>(payments: impl IntoIterator<Item = &'a Payment>) -> Self {
        let mut stats = PaymentStats::default();
        for payment in payments {
            stats.total_payments += 1;
            match payment.status {
                PaymentStatus::Pending => stats.pending += 1,
                PaymentStatus::Success => {
                    stats.successful += 1;
                    stats.revenue += payment.amount;
                }
                PaymentStatus::Failed => stats.failed += 1,
                PaymentStatus::Cancelled => stats.cancelled += 1,
            }
            let per_method = stats
                .by_method
                .entry(payment.method.as_str().to_string())
                .or_default();
            per_method.count += 1;
            per_method.total += payment.amount;
        }
        if stats.total_payments > 0 {
            stats.success_rate = (Decimal::from(stats.successful) * Decimal::ONE_HUNDRED
                / Decimal::from(stats.total_payments))
            .round_dp(2);
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(status: OrderStatus, method: PaymentMethod, total: i64, created_at: i64) -> Order {
        Order {
            id: format!("o-{created_at}"),
            tenant_id: "t1".to_string(),
            order_number: "202601010001".to_string(),
            table_id: None,
            user_id: None,
            customer_name: None,
            customer_phone: None,
            notes: None,
            status,
            payment_method: method,
            total_amount: Decimal::from(total),
            items: vec![],
            created_at,
            updated_at: created_at,
        }
    }

    #[test]
    fn test_filter_pagination_bounds() {
        let filter = OrderFilter {
            page: Some(0),
            limit: Some(500),
            ..Default::default()
        };
        assert_eq!(filter.page(), 1);
        assert_eq!(filter.limit(), 100);
        assert_eq!(filter.offset(), 0);

        let filter = OrderFilter {
            page: Some(3),
            limit: Some(0),
            ..Default::default()
        };
        assert_eq!(filter.limit(), 1);
        assert_eq!(filter.offset(), 2);

        let filter = OrderFilter {
            page: Some(u32::MAX),
            limit: Some(100),
            ..Default::default()
        };
        assert_eq!(filter.offset(), (u64::from(u32::MAX) - 1) * 100);

        assert_eq!(OrderFilter::default().limit(), 20);
    }

    #[test]
    fn test_payment_filter_limit_is_capped() {
        let filter = PaymentFilter {
            limit: Some(u32::MAX),
            ..Default::default()
        };
        assert_eq!(filter.limit(), PaymentFilter::MAX_LIMIT);
        assert_eq!(PaymentFilter::default().limit(), 50);
        let filter = PaymentFilter {
            limit: Some(0),
            ..Default::default()
        };
        assert_eq!(filter.limit(), 1);
    }

    #[test]
    fn test_filter_matches() {
        let o = order(OrderStatus::Ready, PaymentMethod::Wave, 1000, 50);
        assert!(OrderFilter::default().matches(&o));
        assert!(
            OrderFilter {
                status: Some(OrderStatus::Ready),
                from: Some(50),
                to: Some(50),
                ..Default::default()
            }
            .matches(&o)
        );
        assert!(
            !OrderFilter {
                payment_method: Some(PaymentMethod::Cash),
                ..Default::default()
            }
            .matches(&o)
        );
        assert!(
            !OrderFilter {
                table_id: Some("T1".into()),
                ..Default::default()
            }
            .matches(&o)
        );
    }

    #[test]
    fn test_pagination_pages() {
        assert_eq!(Pagination::new(1, 20, 0).pages, 0);
        assert_eq!(Pagination::new(1, 20, 20).pages, 1);
        assert_eq!(Pagination::new(1, 20, 21).pages, 2);
    }

    #[test]
    fn test_order_stats_revenue_counts_delivered_only() {
        let orders = vec![
            order(OrderStatus::Delivered, PaymentMethod::Cash, 3000, 1),
            order(OrderStatus::Delivered, PaymentMethod::Wave, 1000, 2),
            order(OrderStatus::Pending, PaymentMethod::Wave, 9999, 3),
        ];
        let stats = OrderStats::from_orders(&orders);
        assert_eq!(stats.total_orders, 3);
        assert_eq!(stats.revenue, Decimal::from(4000));
        assert_eq!(stats.average_order_value, Decimal::from(2000));
        assert_eq!(stats.by_status.get("DELIVERED"), Some(&2));
        assert_eq!(stats.by_payment_method["WAVE"].count, 2);
    }

    #[test]
    fn test_order_json_uses_numeric_amounts() {
        let o = order(OrderStatus::Pending, PaymentMethod::Cash, 6000, 1);
        let json = serde_json::to_value(&o).unwrap();
        assert_eq!(json["total_amount"], serde_json::json!(6000.0));
        assert_eq!(json["status"], "PENDING");
        assert!(json.get("table_id").is_none());
    }
}

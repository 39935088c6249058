//! 审计日志
//!
//! ```text
//! OrderLedger / PaymentOrchestrator
//!        │ AuditService::append (try_send, never blocks)
//!        ▼
//!   mpsc channel ──► AuditWorker ──► AuditSink (memory / tracing / postgres)
//! ```
//!
//! Appending is best-effort: a full or closed channel drops the entry and
//! logs it. The authoritative transition record is the order status history,
//! written atomically with the status itself.

mod service;
mod sink;

pub use service::{AuditService, AuditWorker};
#[cfg(feature = "postgres")]
pub use sink::PgAuditSink;
pub use sink::{MemoryAuditSink, TracingAuditSink};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::BoxError;

/// 审计事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    OrderCreated,
    OrderUpdated,
    PaymentInitiated,
    PaymentSucceeded,
    PaymentFailed,
}

impl AuditEventType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::OrderCreated => "ORDER_CREATED",
            AuditEventType::OrderUpdated => "ORDER_UPDATED",
            AuditEventType::PaymentInitiated => "PAYMENT_INITIATED",
            AuditEventType::PaymentSucceeded => "PAYMENT_SUCCEEDED",
            AuditEventType::PaymentFailed => "PAYMENT_FAILED",
        }
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub tenant_id: String,
    pub user_id: Option<String>,
    pub order_id: Option<String>,
    pub event_type: AuditEventType,
    pub description: String,
    pub metadata: serde_json::Value,
    pub created_at: i64,
}

impl AuditEntry {
    pub fn new(
        tenant_id: impl Into<String>,
        event_type: AuditEventType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            user_id: None,
            order_id: None,
            event_type,
            description: description.into(),
            metadata: serde_json::Value::Null,
            created_at: shared::util::now_millis(),
        }
    }

    pub fn user(mut self, user_id: Option<&str>) -> Self {
        self.user_id = user_id.map(str::to_string);
        self
    }

    pub fn order(mut self, order_id: &str) -> Self {
        self.order_id = Some(order_id.to_string());
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Append-only destination for audit entries
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> Result<(), BoxError>;
}

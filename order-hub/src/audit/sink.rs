use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use super::{AuditEntry, AuditSink};
use crate::error::BoxError;

/// Keeps entries in memory (tests, development)
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditSink {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, entry: AuditEntry) -> Result<(), BoxError> {
        self.entries.lock().push(entry);
        Ok(())
    }
}

/// Emits entries on the `audit` tracing target
///
/// With `LOG_DIR` set the logger routes this target into `{LOG_DIR}/audit`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn append(&self, entry: AuditEntry) -> Result<(), BoxError> {
        tracing::info!(
            target: "audit",
            tenant_id = %entry.tenant_id,
            user_id = entry.user_id.as_deref().unwrap_or("-"),
            order_id = entry.order_id.as_deref().unwrap_or("-"),
            event_type = %entry.event_type,
            metadata = %entry.metadata,
            created_at = entry.created_at,
            "{}",
            entry.description
        );
        Ok(())
    }
}

/// Writes into the `audit_logs` table
#[cfg(feature = "postgres")]
#[derive(Clone)]
pub struct PgAuditSink {
    pool: sqlx::PgPool,
}

#[cfg(feature = "postgres")]
impl PgAuditSink {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[cfg(feature = "postgres")]
#[async_trait]
impl AuditSink for PgAuditSink {
    async fn append(&self, entry: AuditEntry) -> Result<(), BoxError> {
        sqlx::query(
            "INSERT INTO audit_logs
                (tenant_id, user_id, order_id, event_type, description, metadata, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&entry.tenant_id)
        .bind(&entry.user_id)
        .bind(&entry.order_id)
        .bind(entry.event_type.as_str())
        .bind(&entry.description)
        .bind(&entry.metadata)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

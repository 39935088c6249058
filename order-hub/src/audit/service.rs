//! 审计日志服务 + 后台 Worker

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::{AuditEntry, AuditSink};

/// Front of the audit pipeline
///
/// Cloned into every service that records events. `append` never waits:
/// audit must not block or fail the primary operation.
#[derive(Debug, Clone)]
pub struct AuditService {
    tx: mpsc::Sender<AuditEntry>,
}

impl AuditService {
    pub fn new(buffer_size: usize) -> (Self, mpsc::Receiver<AuditEntry>) {
        let (tx, rx) = mpsc::channel(buffer_size.max(1));
        (Self { tx }, rx)
    }

    /// Queue an entry for the worker (fire-and-forget)
    pub fn append(&self, entry: AuditEntry) {
        match self.tx.try_send(entry) {
            Ok(()) => {}
            Err(TrySendError::Full(entry)) => {
                tracing::warn!(
                    tenant_id = %entry.tenant_id,
                    event_type = %entry.event_type,
                    "Audit channel full, entry dropped"
                );
            }
            Err(TrySendError::Closed(entry)) => {
                tracing::error!(
                    tenant_id = %entry.tenant_id,
                    event_type = %entry.event_type,
                    "Audit channel closed, entry dropped"
                );
            }
        }
    }
}

/// 审计日志后台 Worker
///
/// 从 mpsc 通道消费日志，写入 sink。通道关闭时自动退出。
pub struct AuditWorker {
    sink: Arc<dyn AuditSink>,
}

impl AuditWorker {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// 运行 worker（直到所有 AuditService 被 drop）
    pub async fn run(self, mut rx: mpsc::Receiver<AuditEntry>) {
        tracing::info!("Audit worker started");

        while let Some(entry) = rx.recv().await {
            let tenant_id = entry.tenant_id.clone();
            let event_type = entry.event_type;
            if let Err(e) = self.sink.append(entry).await {
                tracing::error!(
                    tenant_id = %tenant_id,
                    event_type = %event_type,
                    error = %e,
                    "Failed to write audit entry"
                );
            }
        }

        tracing::info!("Audit channel closed, worker stopping");
    }
}

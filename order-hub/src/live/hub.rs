use dashmap::DashMap;
use shared::realtime::ServerMessage;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::{EventPublisher, Target, audience};
use crate::auth::{Principal, Role};

pub type ConnectionId = u64;

struct Connection {
    principal: Principal,
    tx: mpsc::Sender<Arc<ServerMessage>>,
    groups: HashSet<String>,
}

struct HubInner {
    connections: DashMap<ConnectionId, Connection>,
    /// group name → connection ids
    groups: DashMap<String, HashSet<ConnectionId>>,
    next_id: AtomicU64,
    /// 每连接缓冲容量
    buffer: usize,
}

/// Tenant/role/user scoped fanout over live connections
#[derive(Clone)]
pub struct NotificationHub {
    inner: Arc<HubInner>,
}

impl NotificationHub {
    pub fn new(connection_buffer: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                connections: DashMap::new(),
                groups: DashMap::new(),
                next_id: AtomicU64::new(1),
                buffer: connection_buffer.max(1),
            }),
        }
    }

    /// Register an authenticated connection and join its default groups
    ///
    /// Joins `tenant:{id}`, `tenant:{id}:{ROLE}` and `user:{id}`; staff
    /// connections also join the kitchen group.
    pub fn register(&self, principal: Principal) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.inner.buffer);

        let mut targets = vec![
            Target::Tenant(principal.tenant_id.clone()),
            Target::Role(principal.tenant_id.clone(), principal.role),
            Target::User(principal.user_id.clone()),
        ];
        if principal.role == Role::Staff {
            targets.push(Target::Kitchen(principal.tenant_id.clone()));
        }

        self.inner.connections.insert(
            id,
            Connection {
                principal: principal.clone(),
                tx,
                groups: HashSet::new(),
            },
        );
        for target in targets {
            self.join_group(id, target.group_name());
        }

        tracing::info!(
            connection_id = id,
            tenant_id = %principal.tenant_id,
            user_id = %principal.user_id,
            role = %principal.role,
            "Realtime connection registered"
        );

        Subscription {
            id,
            principal,
            rx,
            hub: self.clone(),
        }
    }

    fn join_group(&self, id: ConnectionId, group: String) {
        let Some(mut conn) = self.inner.connections.get_mut(&id) else {
            return;
        };
        conn.groups.insert(group.clone());
        drop(conn);
        self.inner.groups.entry(group.clone()).or_default().insert(id);
        // unregister may have run between the two inserts
        if !self.inner.connections.contains_key(&id) {
            self.leave_group(id, &group);
        }
    }

    fn leave_group(&self, id: ConnectionId, group: &str) {
        if let Some(mut conn) = self.inner.connections.get_mut(&id) {
            conn.groups.remove(group);
        }
        if let Some(mut members) = self.inner.groups.get_mut(group) {
            members.remove(&id);
        }
        self.inner.groups.remove_if(group, |_, members| members.is_empty());
    }

    fn tenant_of(&self, id: ConnectionId) -> Option<String> {
        self.inner
            .connections
            .get(&id)
            .map(|c| c.principal.tenant_id.clone())
    }

    /// 手动加入厨房组
    pub fn join_kitchen(&self, id: ConnectionId) {
        if let Some(tenant_id) = self.tenant_of(id) {
            self.join_group(id, Target::Kitchen(tenant_id).group_name());
        }
    }

    pub fn leave_kitchen(&self, id: ConnectionId) {
        if let Some(tenant_id) = self.tenant_of(id) {
            self.leave_group(id, &Target::Kitchen(tenant_id).group_name());
        }
    }

    /// Drop a connection from every group
    pub fn unregister(&self, id: ConnectionId) {
        let Some((_, conn)) = self.inner.connections.remove(&id) else {
            return;
        };
        for group in &conn.groups {
            if let Some(mut members) = self.inner.groups.get_mut(group) {
                members.remove(&id);
            }
            self.inner
                .groups
                .remove_if(group, |_, members| members.is_empty());
        }
        tracing::info!(
            connection_id = id,
            tenant_id = %conn.principal.tenant_id,
            user_id = %conn.principal.user_id,
            "Realtime connection removed"
        );
    }

    /// Deliver to the union of the target groups (each connection at most once)
    ///
    /// Returns the number of connections the message was queued for. A full
    /// buffer drops the message for that connection only.
    pub fn send_to(&self, targets: &[Target], message: ServerMessage) -> usize {
        let mut recipients: HashSet<ConnectionId> = HashSet::new();
        for target in targets {
            if let Some(members) = self.inner.groups.get(&target.group_name()) {
                recipients.extend(members.iter().copied());
            }
        }

        let message = Arc::new(message);
        let mut delivered = 0;
        let mut closed = Vec::new();

        for id in recipients {
            let Some(tx) = self.inner.connections.get(&id).map(|c| c.tx.clone()) else {
                continue;
            };
            match tx.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        connection_id = id,
                        event = message.event_name(),
                        "Connection buffer full, event dropped"
                    );
                }
                Err(TrySendError::Closed(_)) => closed.push(id),
            }
        }

        for id in closed {
            self.unregister(id);
        }
        delivered
    }

    pub fn connection_count(&self) -> usize {
        self.inner.connections.len()
    }

    pub fn group_size(&self, target: &Target) -> usize {
        self.inner
            .groups
            .get(&target.group_name())
            .map(|m| m.len())
            .unwrap_or(0)
    }
}

impl EventPublisher for NotificationHub {
    fn publish(&self, tenant_id: &str, message: ServerMessage) {
        let event = message.event_name();
        let targets = audience(tenant_id, &message);
        let delivered = self.send_to(&targets, message);
        tracing::debug!(tenant_id = %tenant_id, event, delivered, "Event published");
    }
}

/// Receiving side of a registered connection
///
/// Dropping it removes the connection from the hub.
pub struct Subscription {
    id: ConnectionId,
    principal: Principal,
    rx: mpsc::Receiver<Arc<ServerMessage>>,
    hub: NotificationHub,
}

impl Subscription {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub async fn recv(&mut self) -> Option<Arc<ServerMessage>> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Arc<ServerMessage>> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unregister(self.id);
    }
}

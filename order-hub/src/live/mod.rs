//! NotificationHub: 实时事件分发
//!
//! 按 tenant / role / user 分组推送领域事件，所有数据按 tenant 严格隔离。
//!
//! ```text
//! OrderLedger / PaymentOrchestrator
//!       │ EventPublisher::publish (fire-and-forget)
//!       ▼
//! NotificationHub
//!   ├── groups: "tenant:{id}" / "tenant:{id}:{ROLE}" / "tenant:{id}:kitchen" / "user:{id}"
//!   └── connections: id → mpsc::Sender (每连接有界缓冲，满则丢弃)
//!           │
//!           ▼
//!   WS session (/ws) → client
//! ```
//!
//! Delivery is at-most-once. Clients resync from the `active_orders`
//! snapshot pushed on connect (and on `get_active_orders`).

mod hub;

pub use hub::{ConnectionId, NotificationHub, Subscription};

use shared::realtime::ServerMessage;

use crate::auth::Role;

/// Fanout port injected into the ledger and the payment orchestrator
///
/// Publishing never blocks and never fails the caller.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, tenant_id: &str, message: ServerMessage);
}

/// Subscriber group addressed by a broadcast
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    /// Every subscriber of the tenant
    Tenant(String),
    /// Subscribers of the tenant holding a role
    Role(String, Role),
    /// Kitchen view of the tenant
    Kitchen(String),
    /// One user (all of their connections)
    User(String),
}

impl Target {
    pub fn group_name(&self) -> String {
        match self {
            Target::Tenant(tenant_id) => format!("tenant:{tenant_id}"),
            Target::Role(tenant_id, role) => format!("tenant:{tenant_id}:{role}"),
            Target::Kitchen(tenant_id) => format!("tenant:{tenant_id}:kitchen"),
            Target::User(user_id) => format!("user:{user_id}"),
        }
    }
}

/// Groups an event is routed to
///
/// `new_order` goes to the kitchen and to management; everything else to
/// the whole tenant.
pub fn audience(tenant_id: &str, message: &ServerMessage) -> Vec<Target> {
    match message {
        ServerMessage::NewOrder { .. } => vec![
            Target::Kitchen(tenant_id.to_string()),
            Target::Role(tenant_id.to_string(), Role::Manager),
            Target::Role(tenant_id.to_string(), Role::Admin),
        ],
        _ => vec![Target::Tenant(tenant_id.to_string())],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_names() {
        assert_eq!(Target::Tenant("t1".into()).group_name(), "tenant:t1");
        assert_eq!(
            Target::Role("t1".into(), Role::Staff).group_name(),
            "tenant:t1:STAFF"
        );
        assert_eq!(Target::Kitchen("t1".into()).group_name(), "tenant:t1:kitchen");
        assert_eq!(Target::User("u1".into()).group_name(), "user:u1");
    }

    #[test]
    fn pong_and_status_go_to_tenant() {
        let msg = ServerMessage::Pong { timestamp: 1 };
        assert_eq!(audience("t1", &msg), vec![Target::Tenant("t1".into())]);
    }
}

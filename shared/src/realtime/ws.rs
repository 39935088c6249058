//! Realtime WebSocket protocol
//!
//! Hub → Client: ServerMessage (推送)
//! Client → Hub: ClientMessage (分组控制 + 心跳)

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::order::{Order, OrderStatus, PaymentMethod, PaymentStatus};

/// Hub → Client 推送消息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// 连接/请求时的全量活跃订单（非终态）
    ActiveOrders { orders: Vec<Order> },

    /// 新订单（厨房 + 管理角色）
    NewOrder { order: Box<Order> },

    /// 状态变更（全租户）
    OrderStatusUpdate {
        order_id: String,
        order_number: String,
        old_status: OrderStatus,
        new_status: OrderStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        table_id: Option<String>,
    },

    /// 出餐提醒
    OrderReady {
        order_id: String,
        order_number: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        table_id: Option<String>,
    },

    PaymentInitiated(PaymentNotice),
    PaymentSuccess(PaymentNotice),
    PaymentFailed(PaymentNotice),

    /// 心跳回应
    Pong { timestamp: i64 },
}

impl ServerMessage {
    /// Wire name of the event (the `type` tag)
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerMessage::ActiveOrders { .. } => "active_orders",
            ServerMessage::NewOrder { .. } => "new_order",
            ServerMessage::OrderStatusUpdate { .. } => "order_status_update",
            ServerMessage::OrderReady { .. } => "order_ready",
            ServerMessage::PaymentInitiated(_) => "payment_initiated",
            ServerMessage::PaymentSuccess(_) => "payment_success",
            ServerMessage::PaymentFailed(_) => "payment_failed",
            ServerMessage::Pong { .. } => "pong",
        }
    }
}

/// Payment outcome payload shared by the three payment events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentNotice {
    pub payment_id: String,
    pub order_id: String,
    pub transaction_id: String,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Client → Hub 命令
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    JoinKitchen,
    LeaveKitchen,
    GetActiveOrders,
    Ping,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_parse() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"join_kitchen"}"#).unwrap();
        assert_eq!(msg, ClientMessage::JoinKitchen);
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Ping);
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"shutdown"}"#).is_err());
    }

    #[test]
    fn test_server_message_tagging() {
        let msg = ServerMessage::OrderStatusUpdate {
            order_id: "o1".into(),
            order_number: "202601010001".into(),
            old_status: OrderStatus::Accepted,
            new_status: OrderStatus::Preparing,
            table_id: None,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], msg.event_name());
        assert_eq!(json["old_status"], "ACCEPTED");
        assert_eq!(json["new_status"], "PREPARING");

        let notice = PaymentNotice {
            payment_id: "p1".into(),
            order_id: "o1".into(),
            transaction_id: "tx".into(),
            method: PaymentMethod::Wave,
            status: PaymentStatus::Success,
            amount: Decimal::from(6000),
            currency: "XOF".into(),
            message: None,
        };
        let json = serde_json::to_value(ServerMessage::PaymentSuccess(notice)).unwrap();
        assert_eq!(json["type"], "payment_success");
        assert_eq!(json["transaction_id"], "tx");
        assert_eq!(json["status"], "SUCCESS");
    }
}

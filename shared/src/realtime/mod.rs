//! Realtime protocol types
//!
//! 订单中心 → 客户端 的实时推送协议（WebSocket 文本帧，JSON）。
//! 连接建立后先推送 `active_orders` 快照，之后是增量事件。

pub mod ws;

pub use ws::*;

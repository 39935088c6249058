//! Realtime WebSocket endpoint: 订单/支付事件推送
//!
//! GET /ws?token=<JWT>
//! Auth: query parameter（浏览器 WebSocket 不支持自定义 headers）或 Authorization header
//!
//! 协议:
//! - Hub → Client: ServerMessage（连接后先推送 active_orders 快照）
//! - Client → Hub: ClientMessage (join_kitchen / leave_kitchen / get_active_orders / ping)

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use shared::error::AppError;
use shared::realtime::{ClientMessage, ServerMessage};
use shared::util::now_millis;
use tokio::time::Duration;

use crate::auth::{AuthError, Principal, authenticate, bearer_token};
use crate::live::ConnectionId;
use crate::state::AppState;

const PING_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Default, Deserialize)]
pub struct WsAuthQuery {
    #[serde(default)]
    token: Option<String>,
}

/// GET /ws
pub async fn handle_ws(
    State(state): State<AppState>,
    Query(query): Query<WsAuthQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, AppError> {
    let token = query
        .token
        .as_deref()
        .filter(|t| !t.is_empty())
        .or_else(|| {
            headers
                .get(axum::http::header::AUTHORIZATION)
                .and_then(|h| h.to_str().ok())
                .and_then(bearer_token)
        })
        .ok_or(AuthError::Missing)?;

    // 非活跃用户/租户在升级前拒绝
    let principal =
        authenticate(state.verifier.as_ref(), state.directory.as_ref(), token).await?;

    Ok(ws.on_upgrade(move |socket| ws_session(socket, state, principal)))
}

async fn ws_session(socket: WebSocket, state: AppState, principal: Principal) {
    let (mut sink, mut stream) = socket.split();
    let tenant_id = principal.tenant_id.clone();
    let mut sub = state.hub.register(principal);

    tracing::info!(
        tenant_id = %tenant_id,
        user_id = %sub.principal().user_id,
        connection = sub.id(),
        "Realtime client connected"
    );

    // 初始全量快照
    if send_snapshot(&mut sink, &state, &tenant_id).await.is_err() {
        return;
    }

    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    ping_interval.tick().await; // skip immediate

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if sink.send(Message::Ping(vec![].into())).await.is_err() {
                    break;
                }
            }

            event = sub.recv() => {
                match event {
                    Some(msg) => {
                        if send_message(&mut sink, &msg).await.is_err() {
                            break;
                        }
                    }
                    // hub dropped this connection
                    None => break,
                }
            }

            msg = stream.next() => {
                let keep = match msg {
                    Some(Ok(Message::Text(text))) => {
                        on_client_text(&mut sink, &state, sub.id(), &tenant_id, &text).await
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => false,
                    Some(Ok(_)) => true,
                };
                if !keep {
                    break;
                }
            }
        }
    }

    tracing::info!(tenant_id = %tenant_id, connection = sub.id(), "Realtime client disconnected");
    // Subscription drop unregisters from the hub
}

/// Returns false once the socket can no longer be written
async fn on_client_text<S>(
    sink: &mut S,
    state: &AppState,
    connection: ConnectionId,
    tenant_id: &str,
    text: &str,
) -> bool
where
    S: futures::Sink<Message, Error = axum::Error> + Unpin,
{
    let Ok(cmd) = serde_json::from_str::<ClientMessage>(text) else {
        tracing::debug!(connection, "Ignoring unknown client message");
        return true;
    };
    match cmd {
        ClientMessage::JoinKitchen => state.hub.join_kitchen(connection),
        ClientMessage::LeaveKitchen => state.hub.leave_kitchen(connection),
        ClientMessage::GetActiveOrders => {
            return send_snapshot(sink, state, tenant_id).await.is_ok();
        }
        ClientMessage::Ping => {
            let pong = ServerMessage::Pong { timestamp: now_millis() };
            return send_message(sink, &pong).await.is_ok();
        }
    }
    true
}

async fn send_snapshot<S>(sink: &mut S, state: &AppState, tenant_id: &str) -> Result<(), ()>
where
    S: futures::Sink<Message, Error = axum::Error> + Unpin,
{
    let orders = match state.ledger.active_orders(tenant_id).await {
        Ok(orders) => orders,
        Err(e) => {
            tracing::error!(tenant_id = %tenant_id, error = %e, "Active order snapshot failed");
            Vec::new()
        }
    };
    send_message(sink, &ServerMessage::ActiveOrders { orders }).await
}

async fn send_message<S>(sink: &mut S, msg: &ServerMessage) -> Result<(), ()>
where
    S: futures::Sink<Message, Error = axum::Error> + Unpin,
{
    let json = serde_json::to_string(msg).map_err(|_| ())?;
    sink.send(Message::Text(json.into())).await.map_err(|_| ())
}

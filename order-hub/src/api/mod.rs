//! HTTP / WebSocket surface
//!
//! - [`orders`] - 订单接口（含顾客公开下单）
//! - [`payments`] - 支付接口与服务商回调
//! - [`ws`] - 实时推送

pub mod orders;
pub mod payments;
pub mod ws;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Routes without middleware or state
pub fn build_router(development: bool) -> Router<AppState> {
    Router::new()
        .merge(orders::router())
        .merge(payments::router(development))
        .route("/ws", get(ws::handle_ws))
}

/// Fully configured application
pub fn build_app(state: AppState) -> Router {
    build_router(state.config.is_development())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

//! Order API Module

mod handler;

use axum::{
    Router,
    routing::{get, patch, post},
};

use crate::state::AppState;

/// Order router
pub fn router() -> Router<AppState> {
    Router::new().nest("/orders", routes())
}

fn routes() -> Router<AppState> {
    Router::new()
        // 顾客扫码下单（无需登录）
        .route("/public/{tenant_slug}", post(handler::create_public))
        .route("/", post(handler::create).get(handler::list))
        .route("/active", get(handler::active))
        .route("/stats", get(handler::stats))
        .route("/{id}", get(handler::get_by_id))
        .route("/{id}/history", get(handler::history))
        .route("/{id}/status", patch(handler::update_status))
        .route("/{id}/cancel", patch(handler::cancel))
}

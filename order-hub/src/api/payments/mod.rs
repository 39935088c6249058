//! Payment API Module
//!
//! Provider webhooks are mounted here too; they carry no bearer token and are
//! authenticated by their signature instead.

mod handler;
mod webhook;

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

/// Payment router
///
/// The unsigned test webhook only exists in development.
pub fn router(development: bool) -> Router<AppState> {
    Router::new().nest("/payments", routes(development))
}

fn routes(development: bool) -> Router<AppState> {
    let router = Router::new()
        .route("/initiate/{order_id}", post(handler::initiate))
        .route("/", get(handler::list))
        .route("/stats/overview", get(handler::stats))
        .route("/providers/status", get(handler::providers_status))
        .route("/{id}", get(handler::get_by_id))
        .route("/{id}/reconcile", post(handler::reconcile))
        .route("/webhooks/{provider}", post(webhook::handle_webhook));

    if development {
        router.route("/webhooks/test/{provider}", post(webhook::handle_test_webhook))
    } else {
        router
    }
}

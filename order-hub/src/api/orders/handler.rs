//! Order API Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use shared::ApiResponse;
use shared::order::{
    CancelOrderRequest, CreateOrderRequest, Order, OrderFilter, OrderPage, OrderStats,
    OrderStatusChange, UpdateStatusRequest,
};

use crate::auth::{ANY_STAFF, MANAGEMENT, Principal};
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    #[serde(default)]
    pub from: Option<i64>,
    #[serde(default)]
    pub to: Option<i64>,
}

/// Public order placed by a customer
pub async fn create_public(
    State(state): State<AppState>,
    Path(tenant_slug): Path<String>,
    Json(req): Json<CreateOrderRequest>,
) -> ApiResult<Order> {
    let order = state.ledger.create_public_order(&tenant_slug, req).await?;
    Ok(ApiResponse::success_with_message("Order created", order))
}

pub async fn create(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<CreateOrderRequest>,
) -> ApiResult<Order> {
    principal.require_any(ANY_STAFF)?;
    let order = state
        .ledger
        .create(&principal.tenant_id, Some(&principal.user_id), req)
        .await?;
    Ok(ApiResponse::success_with_message("Order created", order))
}

pub async fn list(
    State(state): State<AppState>,
    principal: Principal,
    Query(filter): Query<OrderFilter>,
) -> ApiResult<OrderPage> {
    principal.require_any(ANY_STAFF)?;
    let page = state.ledger.list_orders(&principal.tenant_id, &filter).await?;
    Ok(ApiResponse::success(page))
}

/// Kitchen view: every non-terminal order, oldest first
pub async fn active(
    State(state): State<AppState>,
    principal: Principal,
) -> ApiResult<Vec<Order>> {
    principal.require_any(ANY_STAFF)?;
    let orders = state.ledger.active_orders(&principal.tenant_id).await?;
    Ok(ApiResponse::success(orders))
}

pub async fn stats(
    State(state): State<AppState>,
    principal: Principal,
    Query(query): Query<StatsQuery>,
) -> ApiResult<OrderStats> {
    principal.require_any(MANAGEMENT)?;
    let stats = state
        .ledger
        .order_stats(&principal.tenant_id, query.from, query.to)
        .await?;
    Ok(ApiResponse::success(stats))
}

pub async fn get_by_id(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> ApiResult<Order> {
    principal.require_any(ANY_STAFF)?;
    let order = state.ledger.get_order(&principal.tenant_id, &id).await?;
    Ok(ApiResponse::success(order))
}

pub async fn history(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> ApiResult<Vec<OrderStatusChange>> {
    principal.require_any(ANY_STAFF)?;
    let history = state.ledger.status_history(&principal.tenant_id, &id).await?;
    Ok(ApiResponse::success(history))
}

pub async fn update_status(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> ApiResult<Order> {
    principal.require_any(ANY_STAFF)?;
    let order = state
        .ledger
        .update_status(
            &principal.tenant_id,
            &id,
            req.status,
            req.reason,
            Some(&principal.user_id),
        )
        .await?;
    Ok(ApiResponse::success_with_message("Order status updated", order))
}

pub async fn cancel(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<CancelOrderRequest>,
) -> ApiResult<Order> {
    principal.require_any(MANAGEMENT)?;
    let order = state
        .ledger
        .cancel(&principal.tenant_id, &id, req.reason, Some(&principal.user_id))
        .await?;
    Ok(ApiResponse::success_with_message("Order cancelled", order))
}

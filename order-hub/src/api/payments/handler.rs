//! Payment API Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
};
use shared::ApiResponse;
use shared::order::{InitiatePaymentRequest, Payment, PaymentFilter, PaymentIntent, PaymentStats};
use std::collections::BTreeMap;

use crate::auth::{ADMIN_ONLY, ANY_STAFF, MANAGEMENT, Principal};
use crate::error::ApiResult;
use crate::provider::ProviderInfo;
use crate::state::AppState;

pub async fn initiate(
    State(state): State<AppState>,
    principal: Principal,
    Path(order_id): Path<String>,
    Json(req): Json<InitiatePaymentRequest>,
) -> ApiResult<PaymentIntent> {
    principal.require_any(ANY_STAFF)?;
    let intent = state
        .payments
        .initiate(&principal.tenant_id, &order_id, req, Some(&principal.user_id))
        .await?;
    Ok(ApiResponse::success_with_message("Payment initiated", intent))
}

pub async fn list(
    State(state): State<AppState>,
    principal: Principal,
    Query(filter): Query<PaymentFilter>,
) -> ApiResult<Vec<Payment>> {
    principal.require_any(MANAGEMENT)?;
    let payments = state
        .payments
        .list_payments(&principal.tenant_id, &filter)
        .await?;
    Ok(ApiResponse::success(payments))
}

pub async fn stats(
    State(state): State<AppState>,
    principal: Principal,
) -> ApiResult<PaymentStats> {
    principal.require_any(MANAGEMENT)?;
    let stats = state.payments.payment_stats(&principal.tenant_id).await?;
    Ok(ApiResponse::success(stats))
}

/// Configured flag, endpoint and masked merchant id per provider
pub async fn providers_status(
    State(state): State<AppState>,
    principal: Principal,
) -> ApiResult<BTreeMap<String, ProviderInfo>> {
    principal.require_any(ADMIN_ONLY)?;
    Ok(ApiResponse::success(state.payments.providers_status()))
}

pub async fn get_by_id(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> ApiResult<Payment> {
    principal.require_any(ANY_STAFF)?;
    let payment = state.payments.get_payment(&principal.tenant_id, &id).await?;
    Ok(ApiResponse::success(payment))
}

/// Ask the provider for the current status of a pending payment
pub async fn reconcile(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
) -> ApiResult<Payment> {
    principal.require_any(MANAGEMENT)?;
    let payment = state.payments.reconcile(&principal.tenant_id, &id).await?;
    Ok(ApiResponse::success(payment))
}

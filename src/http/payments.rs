//! Payment endpoints, including the webhook handler.
//!
//! The webhook is mounted twice (`/payments/chapa_webhook` and
//! `/payments/chapa_webhook_standalone`) for gateway-configuration
//! compatibility; both paths hit the same handler and neither goes
//! through request authentication.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::domain::payment::{Payment, PaymentMethod};
use crate::error::ApiResult;
use crate::http::params::ListQuery;
use crate::services::payments::{
    self, InitiatePayment, InitiatedPayment, PaymentDetail, WebhookAck,
};
use crate::services::Paginated;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct InitializePaymentRequest {
    pub order_id: Uuid,
    pub phone_number: Option<String>,
    pub return_url: Option<String>,
}

pub async fn initialize_chapa(
    State(state): State<AppState>,
    ctx: AuthContext,
    Json(req): Json<InitializePaymentRequest>,
) -> ApiResult<(StatusCode, Json<InitiatedPayment>)> {
    let initiated = payments::initiate(
        &state,
        &ctx,
        InitiatePayment {
            order_id: req.order_id,
            method: PaymentMethod::Chapa,
            phone_number: req.phone_number,
            return_url: req.return_url,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(initiated)))
}

pub async fn initialize_cod(
    State(state): State<AppState>,
    ctx: AuthContext,
    Json(req): Json<InitializePaymentRequest>,
) -> ApiResult<(StatusCode, Json<InitiatedPayment>)> {
    let initiated = payments::initiate(
        &state,
        &ctx,
        InitiatePayment {
            order_id: req.order_id,
            method: PaymentMethod::Cod,
            phone_number: req.phone_number,
            return_url: None,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(initiated)))
}

#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    pub tx_ref: String,
}

pub async fn verify_chapa(
    State(state): State<AppState>,
    ctx: AuthContext,
    Json(req): Json<VerifyPaymentRequest>,
) -> ApiResult<Json<PaymentDetail>> {
    Ok(Json(payments::verify(&state, &ctx, &req.tx_ref).await?))
}

/// Always answers 200; the gateway must never see a retry-inducing
/// status from us.
pub async fn chapa_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<WebhookAck>) {
    let mut signatures = Vec::new();
    for name in ["chapa-signature", "x-chapa-signature"] {
        if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
            signatures.push(value);
        }
    }
    let ack = payments::ingest_webhook(&state, &body, &signatures).await;
    (StatusCode::OK, Json(ack))
}

pub async fn confirm_cod(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PaymentDetail>> {
    Ok(Json(payments::confirm_cod(&state, &ctx, id).await?))
}

pub async fn get(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PaymentDetail>> {
    Ok(Json(payments::get_payment(&state, &ctx, id).await?))
}

pub async fn list(
    State(state): State<AppState>,
    ctx: AuthContext,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Paginated<Payment>>> {
    Ok(Json(
        payments::list_payments(&state, &ctx, query.tenant_id, query.pagination()).await?,
    ))
}

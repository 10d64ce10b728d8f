//! Refund endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::domain::refund::{Refund, RefundRequest};
use crate::error::ApiResult;
use crate::http::params::ListQuery;
use crate::services::refunds::{self, RefundRequestDetail};
use crate::services::Paginated;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateRefundRequestBody {
    pub order_id: Uuid,
    pub reason: String,
}

pub async fn create_request(
    State(state): State<AppState>,
    ctx: AuthContext,
    Json(req): Json<CreateRefundRequestBody>,
) -> ApiResult<(StatusCode, Json<RefundRequest>)> {
    let request = refunds::create_request(&state, &ctx, req.order_id, req.reason).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn list_requests(
    State(state): State<AppState>,
    ctx: AuthContext,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Paginated<RefundRequest>>> {
    Ok(Json(
        refunds::list_requests(&state, &ctx, query.pagination()).await?,
    ))
}

pub async fn get_request(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<RefundRequestDetail>> {
    Ok(Json(refunds::get_request(&state, &ctx, id).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct DecisionBody {
    pub admin_notes: Option<String>,
}

pub async fn approve(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    body: Option<Json<DecisionBody>>,
) -> ApiResult<Json<RefundRequest>> {
    let notes = body.and_then(|Json(b)| b.admin_notes);
    Ok(Json(refunds::approve(&state, &ctx, id, notes).await?))
}

pub async fn reject(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    body: Option<Json<DecisionBody>>,
) -> ApiResult<Json<RefundRequest>> {
    let notes = body.and_then(|Json(b)| b.admin_notes);
    Ok(Json(refunds::reject(&state, &ctx, id, notes).await?))
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRefundBody {
    pub refund_request_id: Uuid,
}

pub async fn execute(
    State(state): State<AppState>,
    ctx: AuthContext,
    Json(req): Json<ExecuteRefundBody>,
) -> ApiResult<(StatusCode, Json<Refund>)> {
    let refund = refunds::execute(&state, &ctx, req.refund_request_id).await?;
    Ok((StatusCode::CREATED, Json(refund)))
}

//! Tenant directory and API-key endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::domain::tenant::{ApiKey, Tenant};
use crate::error::ApiResult;
use crate::http::params::ListQuery;
use crate::services::tenants::{self, CreatedApiKey};
use crate::services::Paginated;
use crate::state::AppState;

pub async fn list(
    State(state): State<AppState>,
    ctx: AuthContext,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Paginated<Tenant>>> {
    Ok(Json(tenants::list_tenants(&state, &ctx, query.pagination()).await?))
}

pub async fn get(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Tenant>> {
    Ok(Json(tenants::get_tenant(&state, &ctx, id).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateApiKeyRequest {
    pub tenant_id: Option<Uuid>,
    pub label: Option<String>,
}

pub async fn create_api_key(
    State(state): State<AppState>,
    ctx: AuthContext,
    body: Option<Json<CreateApiKeyRequest>>,
) -> ApiResult<(StatusCode, Json<CreatedApiKey>)> {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    let created = tenants::create_api_key(&state, &ctx, req.tenant_id, req.label).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn list_api_keys(
    State(state): State<AppState>,
    ctx: AuthContext,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Paginated<ApiKey>>> {
    Ok(Json(
        tenants::list_api_keys(&state, &ctx, query.tenant_id, query.pagination()).await?,
    ))
}

pub async fn revoke_api_key(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiKey>> {
    Ok(Json(tenants::revoke_api_key(&state, &ctx, id).await?))
}

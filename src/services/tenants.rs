//! Tenant directory and API-key management.

use rand::RngCore;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::{hash_api_key, AuthContext};
use crate::domain::events::DomainEvent;
use crate::domain::tenant::{ApiKey, Tenant};
use crate::error::{ApiError, ApiResult};
use crate::services::{activity, Page, Paginated};
use crate::state::AppState;

/// Returned once, at creation. The secret is not recoverable later.
#[derive(Debug, Serialize)]
pub struct CreatedApiKey {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub label: String,
    pub secret: String,
}

pub async fn list_tenants(
    state: &AppState,
    ctx: &AuthContext,
    page: Page,
) -> ApiResult<Paginated<Tenant>> {
    if ctx.is_admin() {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tenants")
            .fetch_one(&state.db)
            .await?;
        let results = sqlx::query_as::<_, Tenant>(
            "SELECT * FROM tenants ORDER BY created_at ASC LIMIT $1 OFFSET $2",
        )
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&state.db)
        .await?;
        return Ok(Paginated::new(count, page, results));
    }

    // Non-admins see exactly their own tenant.
    let tenant_id = ctx.acting_tenant(None)?;
    let results = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE id = $1")
        .bind(tenant_id)
        .fetch_all(&state.db)
        .await?;
    let count = results.len() as i64;
    Ok(Paginated::new(count, page, results))
}

pub async fn get_tenant(state: &AppState, ctx: &AuthContext, id: Uuid) -> ApiResult<Tenant> {
    if !ctx.is_admin() && ctx.tenant_id != Some(id) {
        return Err(ApiError::not_found("tenant"));
    }
    sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("tenant"))
}

fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub async fn create_api_key(
    state: &AppState,
    ctx: &AuthContext,
    tenant_id: Option<Uuid>,
    label: Option<String>,
) -> ApiResult<CreatedApiKey> {
    let tenant_id = ctx.acting_tenant(tenant_id)?;
    ctx.require_staff_of(tenant_id)?;

    let secret = generate_secret();
    let key = sqlx::query_as::<_, ApiKey>(
        "INSERT INTO api_keys (id, tenant_id, key_hash, label) \
         VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(tenant_id)
    .bind(hash_api_key(&secret))
    .bind(label.as_deref().unwrap_or(""))
    .fetch_one(&state.db)
    .await?;

    activity::record(
        state,
        Some(ctx),
        &DomainEvent::ApiKeyCreated { api_key_id: key.id },
    )
    .await;

    Ok(CreatedApiKey {
        id: key.id,
        tenant_id: key.tenant_id,
        label: key.label,
        secret,
    })
}

pub async fn list_api_keys(
    state: &AppState,
    ctx: &AuthContext,
    tenant_id: Option<Uuid>,
    page: Page,
) -> ApiResult<Paginated<ApiKey>> {
    let tenant_id = ctx.acting_tenant(tenant_id)?;
    ctx.require_staff_of(tenant_id)?;
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM api_keys WHERE tenant_id = $1")
        .bind(tenant_id)
        .fetch_one(&state.db)
        .await?;
    let results = sqlx::query_as::<_, ApiKey>(
        "SELECT * FROM api_keys WHERE tenant_id = $1 \
         ORDER BY created_at DESC LIMIT $2 OFFSET $3",
    )
    .bind(tenant_id)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.db)
    .await?;
    Ok(Paginated::new(count, page, results))
}

pub async fn revoke_api_key(state: &AppState, ctx: &AuthContext, id: Uuid) -> ApiResult<ApiKey> {
    let key = sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("API key"))?;
    ctx.require_staff_of(key.tenant_id)?;
    if !key.is_live() {
        return Err(ApiError::Conflict("API key is already revoked".into()));
    }

    let revoked = sqlx::query_as::<_, ApiKey>(
        "UPDATE api_keys SET is_active = FALSE, revoked_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .fetch_one(&state.db)
    .await?;

    activity::record(
        state,
        Some(ctx),
        &DomainEvent::ApiKeyRevoked { api_key_id: id },
    )
    .await;
    Ok(revoked)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_is_64_hex() {
        let s = generate_secret();
        assert_eq!(s.len(), 64);
        assert!(s.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(s, generate_secret());
    }
}

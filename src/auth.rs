//! Request authentication: bearer tokens resolve to users, `X-API-KEY`
//! resolves to a tenant-bound key with owner-equivalent capabilities.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::tenant::{ApiKey, Role, User};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Clone)]
pub enum Principal {
    User(User),
    /// API-key call: no user behind it, only the bound tenant.
    ApiKey(ApiKey),
}

#[derive(Debug, Clone)]
pub struct AuthContext {
    pub principal: Principal,
    pub tenant_id: Option<Uuid>,
    pub role: Role,
    pub client_addr: Option<String>,
}

impl AuthContext {
    pub fn user_id(&self) -> Option<Uuid> {
        match &self.principal {
            Principal::User(u) => Some(u.id),
            Principal::ApiKey(_) => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Tenant staff: admin anywhere, owner (or API key) for their own
    /// tenant.
    pub fn is_staff_of(&self, tenant_id: Uuid) -> bool {
        self.is_admin() || (self.role == Role::Owner && self.tenant_id == Some(tenant_id))
    }

    pub fn require_admin(&self) -> ApiResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ApiError::Forbidden("admin access required".into()))
        }
    }

    pub fn require_staff_of(&self, tenant_id: Uuid) -> ApiResult<()> {
        if self.is_staff_of(tenant_id) {
            Ok(())
        } else {
            Err(ApiError::Forbidden("tenant staff access required".into()))
        }
    }

    /// The tenant this request acts for. Admins may name any tenant
    /// explicitly; everyone else is pinned to their own.
    pub fn acting_tenant(&self, explicit: Option<Uuid>) -> ApiResult<Uuid> {
        match explicit {
            Some(tenant_id) => {
                if self.is_admin() || self.tenant_id == Some(tenant_id) {
                    Ok(tenant_id)
                } else {
                    Err(ApiError::Forbidden("cannot act for another tenant".into()))
                }
            }
            None => self
                .tenant_id
                .ok_or_else(|| ApiError::Forbidden("no tenant scope on this principal".into())),
        }
    }
}

pub fn hash_api_key(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

async fn resolve_bearer(state: &AppState, token: &str) -> ApiResult<AuthContext> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE auth_token = $1")
        .bind(token)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::Unauthenticated("invalid token".into()))?;
    if !user.is_verified {
        return Err(ApiError::Forbidden("account verification required".into()));
    }
    Ok(AuthContext {
        tenant_id: user.tenant_id,
        role: user.role,
        principal: Principal::User(user),
        client_addr: None,
    })
}

async fn resolve_api_key(state: &AppState, raw_key: &str) -> ApiResult<AuthContext> {
    let key = sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys WHERE key_hash = $1")
        .bind(hash_api_key(raw_key))
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::Unauthenticated("invalid API key".into()))?;
    if !key.is_live() {
        return Err(ApiError::Unauthenticated("API key revoked".into()));
    }
    Ok(AuthContext {
        tenant_id: Some(key.tenant_id),
        role: Role::Owner,
        principal: Principal::ApiKey(key),
        client_addr: None,
    })
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> ApiResult<Self> {
        let client_addr = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(',').next().unwrap_or(v).trim().to_string());

        let mut ctx = if let Some(token) = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
        {
            resolve_bearer(state, token.trim()).await?
        } else if let Some(key) = parts.headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
            resolve_api_key(state, key.trim()).await?
        } else {
            return Err(ApiError::Unauthenticated("missing credentials".into()));
        };
        ctx.client_addr = client_addr;
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn ctx(role: Role, tenant: Option<Uuid>) -> AuthContext {
        AuthContext {
            principal: Principal::User(User {
                id: Uuid::new_v4(),
                email: "u@example.com".into(),
                full_name: "U".into(),
                role,
                tenant_id: tenant,
                is_verified: true,
                auth_token: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            }),
            tenant_id: tenant,
            role,
            client_addr: None,
        }
    }

    #[test]
    fn hash_is_64_hex() {
        let h = hash_api_key("secret");
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn staff_scope_respects_tenant() {
        let t1 = Uuid::new_v4();
        let t2 = Uuid::new_v4();
        assert!(ctx(Role::Owner, Some(t1)).is_staff_of(t1));
        assert!(!ctx(Role::Owner, Some(t1)).is_staff_of(t2));
        assert!(ctx(Role::Admin, None).is_staff_of(t2));
        assert!(!ctx(Role::Customer, Some(t1)).is_staff_of(t1));
    }

    #[test]
    fn acting_tenant_pins_non_admins() {
        let t1 = Uuid::new_v4();
        let t2 = Uuid::new_v4();
        let owner = ctx(Role::Owner, Some(t1));
        assert_eq!(owner.acting_tenant(None).unwrap(), t1);
        assert_eq!(owner.acting_tenant(Some(t1)).unwrap(), t1);
        assert!(owner.acting_tenant(Some(t2)).is_err());
        let admin = ctx(Role::Admin, None);
        assert_eq!(admin.acting_tenant(Some(t2)).unwrap(), t2);
        assert!(admin.acting_tenant(None).is_err());
    }
}

//! Tenancy: tenants, users with roles, API keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A merchant on the platform. Owns products and sells orders.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub is_verified: bool,
    pub is_active: bool,
    pub business_info: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Owner,
    Customer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Owner => "owner",
            Role::Customer => "customer",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub tenant_id: Option<Uuid>,
    pub is_verified: bool,
    #[serde(skip_serializing)]
    pub auth_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A programmatic credential bound to one tenant. The raw 64-hex secret
/// is returned exactly once at creation; only its SHA-256 lands in the
/// database.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ApiKey {
    pub id: Uuid,
    pub tenant_id: Uuid,
    #[serde(skip_serializing)]
    pub key_hash: String,
    pub label: String,
    pub is_active: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ApiKey {
    /// A key authenticates only while active and unrevoked.
    pub fn is_live(&self) -> bool {
        self.is_active && self.revoked_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(active: bool, revoked: bool) -> ApiKey {
        ApiKey {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            key_hash: "0".repeat(64),
            label: String::new(),
            is_active: active,
            revoked_at: revoked.then(Utc::now),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn revoked_key_is_dead() {
        assert!(key(true, false).is_live());
        assert!(!key(false, false).is_live());
        assert!(!key(false, true).is_live());
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
        assert_eq!(Role::Customer.as_str(), "customer");
    }
}

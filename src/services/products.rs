//! Catalog reference surface: enough product CRUD to exercise the
//! order and payment flows, plus cross-tenant listing.

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::domain::events::DomainEvent;
use crate::domain::product::Product;
use crate::error::{ApiError, ApiResult};
use crate::services::{activity, Page, Paginated};
use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub tenant_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub base_price: Decimal,
    pub profit_percentage: Decimal,
    pub is_public: bool,
    pub quantity: i32,
}

pub async fn create_product(
    state: &AppState,
    ctx: &AuthContext,
    input: NewProduct,
) -> ApiResult<Product> {
    let tenant_id = ctx.acting_tenant(input.tenant_id)?;
    ctx.require_staff_of(tenant_id)?;
    if input.base_price < Decimal::ZERO {
        return Err(ApiError::Validation("base_price cannot be negative".into()));
    }

    let product = sqlx::query_as::<_, Product>(
        "INSERT INTO products \
         (id, tenant_id, name, description, base_price, profit_percentage, is_public, quantity) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(tenant_id)
    .bind(input.name.trim())
    .bind(input.description.as_deref().unwrap_or(""))
    .bind(input.base_price)
    .bind(input.profit_percentage)
    .bind(input.is_public)
    .bind(input.quantity)
    .fetch_one(&state.db)
    .await?;

    activity::record(
        state,
        Some(ctx),
        &DomainEvent::ProductCreated {
            product_id: product.id,
        },
    )
    .await;

    Ok(product)
}

pub async fn get_product(state: &AppState, id: Uuid) -> ApiResult<Product> {
    sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("product"))
}

/// Products the caller can sell: their tenant's own catalog plus public
/// products they listed. Admins see everything.
pub async fn list_products(
    state: &AppState,
    ctx: &AuthContext,
    page: Page,
) -> ApiResult<Paginated<Product>> {
    if ctx.is_admin() {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&state.db)
            .await?;
        let results = sqlx::query_as::<_, Product>(
            "SELECT * FROM products ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&state.db)
        .await?;
        return Ok(Paginated::new(count, page, results));
    }

    let tenant_id = ctx.acting_tenant(None)?;
    let scope = "tenant_id = $1 OR (is_public AND id IN \
                 (SELECT product_id FROM product_listings WHERE tenant_id = $1))";
    let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM products WHERE {scope}"))
        .bind(tenant_id)
        .fetch_one(&state.db)
        .await?;
    let results = sqlx::query_as::<_, Product>(&format!(
        "SELECT * FROM products WHERE {scope} ORDER BY created_at DESC LIMIT $2 OFFSET $3"
    ))
    .bind(tenant_id)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.db)
    .await?;
    Ok(Paginated::new(count, page, results))
}

/// Associate a public product with the acting tenant's catalog for
/// resale.
pub async fn list_for_tenant(
    state: &AppState,
    ctx: &AuthContext,
    product_id: Uuid,
    tenant_id: Option<Uuid>,
) -> ApiResult<()> {
    let tenant_id = ctx.acting_tenant(tenant_id)?;
    ctx.require_staff_of(tenant_id)?;
    let product = get_product(state, product_id).await?;
    if product.tenant_id == tenant_id {
        return Err(ApiError::Conflict(
            "a tenant does not list its own product".into(),
        ));
    }
    if !product.is_public {
        return Err(ApiError::Forbidden("product is not public".into()));
    }

    let inserted = sqlx::query(
        "INSERT INTO product_listings (product_id, tenant_id) VALUES ($1, $2) \
         ON CONFLICT DO NOTHING",
    )
    .bind(product_id)
    .bind(tenant_id)
    .execute(&state.db)
    .await?;
    if inserted.rows_affected() == 0 {
        return Err(ApiError::Conflict("product is already listed".into()));
    }

    activity::record(
        state,
        Some(ctx),
        &DomainEvent::ProductListed {
            product_id,
            listing_tenant_id: tenant_id,
        },
    )
    .await;
    Ok(())
}

/// Tenants that have listed the product for resale.
pub async fn listed_tenants(state: &AppState, product_id: Uuid) -> ApiResult<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> =
        sqlx::query_as("SELECT tenant_id FROM product_listings WHERE product_id = $1")
            .bind(product_id)
            .fetch_all(&state.db)
            .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

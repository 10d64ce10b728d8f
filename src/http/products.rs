//! Catalog reference endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthContext;
use crate::domain::decimal_string;
use crate::domain::product::Product;
use crate::error::ApiResult;
use crate::http::params::ListQuery;
use crate::services::products::{self, NewProduct};
use crate::services::Paginated;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductRequest {
    pub tenant_id: Option<Uuid>,
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    pub description: Option<String>,
    #[serde(with = "decimal_string")]
    pub base_price: Decimal,
    #[serde(default, with = "decimal_string::option")]
    pub profit_percentage: Option<Decimal>,
    #[serde(default)]
    pub is_public: bool,
    #[validate(range(min = 0, message = "quantity cannot be negative"))]
    #[serde(default)]
    pub quantity: i32,
}

pub async fn create(
    State(state): State<AppState>,
    ctx: AuthContext,
    Json(req): Json<CreateProductRequest>,
) -> ApiResult<(StatusCode, Json<Product>)> {
    req.validate()?;
    let product = products::create_product(
        &state,
        &ctx,
        NewProduct {
            tenant_id: req.tenant_id,
            name: req.name,
            description: req.description,
            base_price: req.base_price,
            profit_percentage: req.profit_percentage.unwrap_or_default(),
            is_public: req.is_public,
            quantity: req.quantity,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(product)))
}

#[derive(Debug, Serialize)]
pub struct ProductResponse {
    #[serde(flatten)]
    pub product: Product,
    #[serde(with = "decimal_string")]
    pub selling_price: Decimal,
    pub listed_tenants: Vec<Uuid>,
}

pub async fn get(
    State(state): State<AppState>,
    _ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ProductResponse>> {
    let product = products::get_product(&state, id).await?;
    let listed_tenants = products::listed_tenants(&state, id).await?;
    let selling_price = product.selling_price();
    Ok(Json(ProductResponse {
        product,
        selling_price,
        listed_tenants,
    }))
}

pub async fn list(
    State(state): State<AppState>,
    ctx: AuthContext,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Paginated<Product>>> {
    Ok(Json(
        products::list_products(&state, &ctx, query.pagination()).await?,
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListTenantRequest {
    pub tenant_id: Option<Uuid>,
}

/// Cross-list a public product into the acting tenant's catalog.
pub async fn list_tenant(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    body: Option<Json<ListTenantRequest>>,
) -> ApiResult<StatusCode> {
    let tenant_id = body.and_then(|Json(b)| b.tenant_id);
    products::list_for_tenant(&state, &ctx, id, tenant_id).await?;
    Ok(StatusCode::CREATED)
}

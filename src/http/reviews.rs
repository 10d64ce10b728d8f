//! Review endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthContext;
use crate::domain::review::Review;
use crate::error::ApiResult;
use crate::http::params::ListQuery;
use crate::services::reviews::{
    self, NewReview, ReviewPatch, ReviewSummary, TenantReviewStats,
};
use crate::services::Paginated;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateReviewRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 5, message = "rating must be between 1 and 5"))]
    pub rating: i16,
    #[validate(length(max = 200, message = "title is too long"))]
    pub title: Option<String>,
    #[validate(length(min = 1, message = "comment is required"))]
    pub comment: String,
}

pub async fn create(
    State(state): State<AppState>,
    ctx: AuthContext,
    Json(req): Json<CreateReviewRequest>,
) -> ApiResult<(StatusCode, Json<Review>)> {
    req.validate()?;
    let review = reviews::create_review(
        &state,
        &ctx,
        NewReview {
            product_id: req.product_id,
            rating: req.rating,
            title: req.title,
            comment: req.comment,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(review)))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateReviewRequest {
    #[validate(range(min = 1, max = 5, message = "rating must be between 1 and 5"))]
    pub rating: Option<i16>,
    #[validate(length(max = 200, message = "title is too long"))]
    pub title: Option<String>,
    pub comment: Option<String>,
}

pub async fn update(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateReviewRequest>,
) -> ApiResult<Json<Review>> {
    req.validate()?;
    let patch = ReviewPatch {
        rating: req.rating,
        title: req.title,
        comment: req.comment,
    };
    Ok(Json(reviews::update_review(&state, &ctx, id, patch).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    reviews::delete_review(&state, &ctx, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_for_product(
    State(state): State<AppState>,
    _ctx: AuthContext,
    Path(product_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Paginated<Review>>> {
    Ok(Json(
        reviews::list_for_product(&state, product_id, query.pagination()).await?,
    ))
}

pub async fn product_summary(
    State(state): State<AppState>,
    _ctx: AuthContext,
    Path(product_id): Path<Uuid>,
) -> ApiResult<Json<ReviewSummary>> {
    Ok(Json(reviews::product_summary(&state, product_id).await?))
}

pub async fn my_reviews(
    State(state): State<AppState>,
    ctx: AuthContext,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Paginated<Review>>> {
    Ok(Json(reviews::my_reviews(&state, &ctx, query.pagination()).await?))
}

pub async fn tenant_stats(
    State(state): State<AppState>,
    ctx: AuthContext,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<TenantReviewStats>> {
    let tenant_id = ctx.acting_tenant(query.tenant_id)?;
    Ok(Json(reviews::tenant_stats(&state, &ctx, tenant_id).await?))
}

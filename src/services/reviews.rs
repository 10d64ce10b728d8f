//! Reviews, gated on a delivered purchase in strict mode.

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::domain::events::DomainEvent;
use crate::domain::product::Product;
use crate::domain::review::{rating_in_range, Review};
use crate::error::{ApiError, ApiResult};
use crate::services::{activity, Page, Paginated};
use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct NewReview {
    pub product_id: Uuid,
    pub rating: i16,
    pub title: Option<String>,
    pub comment: String,
}

#[derive(Debug, Clone, Default)]
pub struct ReviewPatch {
    pub rating: Option<i16>,
    pub title: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RatingDistribution {
    pub one: i64,
    pub two: i64,
    pub three: i64,
    pub four: i64,
    pub five: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewSummary {
    pub total: i64,
    #[serde(with = "crate::domain::decimal_string")]
    pub average: Decimal,
    pub distribution: RatingDistribution,
    pub recent: Vec<Review>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TenantReviewStats {
    pub total: i64,
    #[serde(with = "crate::domain::decimal_string")]
    pub average: Decimal,
}

async fn fetch_product(state: &AppState, id: Uuid) -> ApiResult<Product> {
    sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("product"))
}

async fn has_delivered_order(
    conn: &mut PgConnection,
    user_id: Uuid,
    product_id: Uuid,
) -> ApiResult<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM orders o \
         JOIN order_items oi ON oi.order_id = o.id \
         WHERE o.user_id = $1 AND oi.product_id = $2 AND o.status = 'delivered')",
    )
    .bind(user_id)
    .bind(product_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(exists)
}

/// Recompute the product's review counters from the reviews table.
async fn refresh_aggregates(conn: &mut PgConnection, product_id: Uuid) -> ApiResult<()> {
    sqlx::query(
        "UPDATE products SET \
         total_reviews = (SELECT COUNT(*) FROM reviews WHERE product_id = $1), \
         total_ratings = COALESCE(\
             (SELECT ROUND(AVG(rating), 2) FROM reviews WHERE product_id = $1), 0), \
         updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(product_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn create_review(
    state: &AppState,
    ctx: &AuthContext,
    input: NewReview,
) -> ApiResult<Review> {
    let user_id = ctx
        .user_id()
        .ok_or_else(|| ApiError::Forbidden("reviews require a user account".into()))?;
    if !rating_in_range(input.rating) {
        return Err(ApiError::Validation("rating must be between 1 and 5".into()));
    }
    let product = fetch_product(state, input.product_id).await?;

    let mut tx = state.db.begin().await?;
    let purchased = has_delivered_order(&mut tx, user_id, product.id).await?;
    if state.config.review_requires_purchase && !purchased {
        return Err(ApiError::Forbidden(
            "reviews require a delivered order for this product".into(),
        ));
    }
    let duplicate: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM reviews \
         WHERE tenant_id = $1 AND user_id = $2 AND product_id = $3)",
    )
    .bind(product.tenant_id)
    .bind(user_id)
    .bind(product.id)
    .fetch_one(&mut *tx)
    .await?;
    if duplicate {
        return Err(ApiError::Conflict(
            "you have already reviewed this product".into(),
        ));
    }

    let review = sqlx::query_as::<_, Review>(
        "INSERT INTO reviews (id, tenant_id, user_id, product_id, rating, title, comment, is_purchased) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(product.tenant_id)
    .bind(user_id)
    .bind(product.id)
    .bind(input.rating)
    .bind(&input.title)
    .bind(input.comment.trim())
    .bind(purchased)
    .fetch_one(&mut *tx)
    .await?;
    refresh_aggregates(&mut tx, product.id).await?;
    tx.commit().await?;

    activity::record(
        state,
        Some(ctx),
        &DomainEvent::ReviewCreated {
            review_id: review.id,
            product_id: product.id,
            rating: review.rating,
        },
    )
    .await;

    Ok(review)
}

async fn fetch_review(state: &AppState, id: Uuid) -> ApiResult<Review> {
    sqlx::query_as::<_, Review>("SELECT * FROM reviews WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("review"))
}

pub async fn update_review(
    state: &AppState,
    ctx: &AuthContext,
    id: Uuid,
    patch: ReviewPatch,
) -> ApiResult<Review> {
    let review = fetch_review(state, id).await?;
    if ctx.user_id() != Some(review.user_id) {
        return Err(ApiError::Forbidden("only the author can edit a review".into()));
    }
    if let Some(rating) = patch.rating {
        if !rating_in_range(rating) {
            return Err(ApiError::Validation("rating must be between 1 and 5".into()));
        }
    }

    let mut tx = state.db.begin().await?;
    let updated = sqlx::query_as::<_, Review>(
        "UPDATE reviews SET rating = COALESCE($2, rating), title = COALESCE($3, title), \
         comment = COALESCE($4, comment), updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(patch.rating)
    .bind(&patch.title)
    .bind(&patch.comment)
    .fetch_one(&mut *tx)
    .await?;
    refresh_aggregates(&mut tx, review.product_id).await?;
    tx.commit().await?;
    Ok(updated)
}

pub async fn delete_review(state: &AppState, ctx: &AuthContext, id: Uuid) -> ApiResult<()> {
    let review = fetch_review(state, id).await?;
    if ctx.user_id() != Some(review.user_id) && !ctx.is_admin() {
        return Err(ApiError::Forbidden(
            "only the author can delete a review".into(),
        ));
    }

    let mut tx = state.db.begin().await?;
    sqlx::query("DELETE FROM reviews WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    refresh_aggregates(&mut tx, review.product_id).await?;
    tx.commit().await?;

    activity::record(
        state,
        Some(ctx),
        &DomainEvent::ReviewDeleted {
            review_id: id,
            product_id: review.product_id,
        },
    )
    .await;
    Ok(())
}

pub async fn list_for_product(
    state: &AppState,
    product_id: Uuid,
    page: Page,
) -> ApiResult<Paginated<Review>> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reviews WHERE product_id = $1")
        .bind(product_id)
        .fetch_one(&state.db)
        .await?;
    let results = sqlx::query_as::<_, Review>(
        "SELECT * FROM reviews WHERE product_id = $1 \
         ORDER BY created_at DESC LIMIT $2 OFFSET $3",
    )
    .bind(product_id)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.db)
    .await?;
    Ok(Paginated::new(count, page, results))
}

const SUMMARY_RECENT: i64 = 5;

pub async fn product_summary(state: &AppState, product_id: Uuid) -> ApiResult<ReviewSummary> {
    let rows: Vec<(i16, i64)> = sqlx::query_as(
        "SELECT rating, COUNT(*) FROM reviews WHERE product_id = $1 GROUP BY rating",
    )
    .bind(product_id)
    .fetch_all(&state.db)
    .await?;
    let mut distribution = RatingDistribution {
        one: 0,
        two: 0,
        three: 0,
        four: 0,
        five: 0,
    };
    let mut total = 0;
    let mut weighted = 0i64;
    for (rating, count) in rows {
        total += count;
        weighted += i64::from(rating) * count;
        match rating {
            1 => distribution.one = count,
            2 => distribution.two = count,
            3 => distribution.three = count,
            4 => distribution.four = count,
            _ => distribution.five = count,
        }
    }
    let average = if total > 0 {
        (Decimal::from(weighted) / Decimal::from(total)).round_dp(2)
    } else {
        Decimal::ZERO
    };
    let recent = sqlx::query_as::<_, Review>(
        "SELECT * FROM reviews WHERE product_id = $1 ORDER BY created_at DESC LIMIT $2",
    )
    .bind(product_id)
    .bind(SUMMARY_RECENT)
    .fetch_all(&state.db)
    .await?;
    Ok(ReviewSummary {
        total,
        average,
        distribution,
        recent,
    })
}

pub async fn my_reviews(
    state: &AppState,
    ctx: &AuthContext,
    page: Page,
) -> ApiResult<Paginated<Review>> {
    let user_id = ctx
        .user_id()
        .ok_or_else(|| ApiError::Forbidden("reviews require a user account".into()))?;
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reviews WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(&state.db)
        .await?;
    let results = sqlx::query_as::<_, Review>(
        "SELECT * FROM reviews WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
    )
    .bind(user_id)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.db)
    .await?;
    Ok(Paginated::new(count, page, results))
}

/// Review volume and average across every product the tenant owns.
pub async fn tenant_stats(
    state: &AppState,
    ctx: &AuthContext,
    tenant_id: Uuid,
) -> ApiResult<TenantReviewStats> {
    ctx.require_staff_of(tenant_id)?;
    let row: (i64, Option<Decimal>) = sqlx::query_as(
        "SELECT COUNT(*), ROUND(AVG(r.rating), 2) FROM reviews r \
         JOIN products p ON p.id = r.product_id WHERE p.tenant_id = $1",
    )
    .bind(tenant_id)
    .fetch_one(&state.db)
    .await?;
    Ok(TenantReviewStats {
        total: row.0,
        average: row.1.unwrap_or(Decimal::ZERO),
    })
}

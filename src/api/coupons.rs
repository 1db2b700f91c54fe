use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::db::{self, decimal_to_cents, Coupon, CouponResponse, CreateCouponRequest};
use crate::AppState;

use super::auth::Organizer;
use super::error::{ApiError, ApiJson, ValidationErrorBuilder};
use super::permissions::{owned_event, owned_parent_event, EventChild};
use super::validation::{validate_coupon_code, validate_discount_percentage};

pub async fn list_coupons(
    State(state): State<Arc<AppState>>,
    Organizer(user): Organizer,
    Path(event_id): Path<String>,
) -> Result<Json<Vec<CouponResponse>>, ApiError> {
    let event = owned_event(&state.db, &user, &event_id).await?;
    let coupons: Vec<Coupon> = sqlx::query_as("SELECT * FROM coupons WHERE event_id = ? ORDER BY code ASC")
        .bind(&event.id)
        .fetch_all(&state.db)
        .await?;
    Ok(Json(coupons.into_iter().map(CouponResponse::from).collect()))
}

pub async fn create_coupon(
    State(state): State<Arc<AppState>>,
    Organizer(user): Organizer,
    Path(event_id): Path<String>,
    ApiJson(request): ApiJson<CreateCouponRequest>,
) -> Result<(StatusCode, Json<CouponResponse>), ApiError> {
    let event = owned_event(&state.db, &user, &event_id).await?;

    let code = request.code.trim().to_uppercase();
    let mut errors = ValidationErrorBuilder::new();
    errors.check("code", validate_coupon_code(&code));
    errors.check(
        "discount_percentage",
        validate_discount_percentage(request.discount_percentage),
    );
    let fixed_amount_cents = match request.fixed_amount {
        Some(amount) => {
            let cents = decimal_to_cents(amount);
            if cents.is_none() {
                errors.add(
                    "fixed_amount",
                    "Fixed amount must be between 0 and 1000000.00 with at most two decimal places",
                );
            }
            cents
        }
        None => None,
    };
    if request.valid_to <= request.valid_from {
        errors.add("valid_to", "Coupon must end after it starts");
    }
    if request.usage_limit < 1 {
        errors.add("usage_limit", "Usage limit must be at least 1");
    }
    errors.finish()?;

    let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM coupons WHERE event_id = ? AND code = ?")
        .bind(&event.id)
        .bind(&code)
        .fetch_optional(&state.db)
        .await?;
    if existing.is_some() {
        return Err(ApiError::conflict("A coupon with this code already exists for the event"));
    }

    let id = uuid::Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO coupons (id, event_id, code, discount_percentage, fixed_amount_cents, active,
                             valid_from, valid_to, usage_limit, times_used, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?)
        "#,
    )
    .bind(&id)
    .bind(&event.id)
    .bind(&code)
    .bind(request.discount_percentage)
    .bind(fixed_amount_cents)
    .bind(request.active)
    .bind(db::timestamp(request.valid_from))
    .bind(db::timestamp(request.valid_to))
    .bind(request.usage_limit)
    .bind(db::now())
    .execute(&state.db)
    .await?;

    tracing::info!(coupon_id = %id, event_id = %event.id, code = %code, "Coupon created");

    let coupon: Coupon = sqlx::query_as("SELECT * FROM coupons WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;
    Ok((StatusCode::CREATED, Json(CouponResponse::from(coupon))))
}

pub async fn delete_coupon(
    State(state): State<Arc<AppState>>,
    Organizer(user): Organizer,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    owned_parent_event(&state.db, &user, EventChild::Coupon, &id).await?;
    sqlx::query("DELETE FROM coupons WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

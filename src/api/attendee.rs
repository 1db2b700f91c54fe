//! Attendee-scoped endpoints: saved events, upcoming tickets and purchases.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use std::sync::Arc;

use crate::db::{
    self, Coupon, Event, EventResponse, EventStatus, Order, OrderResponse, PurchaseRequest,
    SaveEventRequest, SaveToggleResponse, Ticket, TicketTier, User,
};
use crate::discovery::UpcomingBuckets;
use crate::AppState;

use super::error::{ApiError, ApiJson, ValidationErrorBuilder};
use super::orders::order_response;
use super::permissions::find_event;
use super::serializers::event_responses;
use super::validation::{validate_quantity, validate_uuid};

/// Caller's upcoming ticketed events grouped by time horizon
pub async fn my_upcoming_events(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<UpcomingBuckets<EventResponse>>, ApiError> {
    let now = Utc::now();
    let events: Vec<Event> = sqlx::query_as(
        r#"
        SELECT e.* FROM events e
        WHERE e.start_at >= ?
          AND e.id IN (SELECT event_id FROM tickets WHERE user_id = ? AND status != 'cancelled')
        ORDER BY e.start_at ASC, e.id ASC
        "#,
    )
    .bind(db::timestamp(now))
    .bind(&user.id)
    .fetch_all(&state.db)
    .await?;

    let items = event_responses(&state.db, events).await?;
    Ok(Json(UpcomingBuckets::partition(items, |e| e.start_at, now)))
}

#[derive(Debug, Serialize)]
pub struct SavedEventResponse {
    pub id: String,
    pub saved_at: DateTime<Utc>,
    pub event: EventResponse,
}

#[derive(Debug, FromRow)]
struct SavedRow {
    saved_id: String,
    saved_at: DateTime<Utc>,
    #[sqlx(flatten)]
    event: Event,
}

/// Caller's bookmarks, newest save first
pub async fn list_saved(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<Vec<SavedEventResponse>>, ApiError> {
    let rows: Vec<SavedRow> = sqlx::query_as(
        r#"
        SELECT s.id AS saved_id, s.created_at AS saved_at, e.*
        FROM saved_events s JOIN events e ON e.id = s.event_id
        WHERE s.user_id = ?
        ORDER BY s.created_at DESC, s.id ASC
        "#,
    )
    .bind(&user.id)
    .fetch_all(&state.db)
    .await?;

    let saves: Vec<(String, DateTime<Utc>)> = rows.iter().map(|r| (r.saved_id.clone(), r.saved_at)).collect();
    let events = event_responses(&state.db, rows.into_iter().map(|r| r.event).collect()).await?;

    let items = saves
        .into_iter()
        .zip(events)
        .map(|((id, saved_at), event)| SavedEventResponse { id, saved_at, event })
        .collect();
    Ok(Json(items))
}

/// Toggle a bookmark: 201 "saved" or 200 "unsaved"
pub async fn toggle_saved(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiJson(request): ApiJson<SaveEventRequest>,
) -> Result<(StatusCode, Json<SaveToggleResponse>), ApiError> {
    let event = find_event(&state.db, &request.event_id)
        .await?
        .filter(|e| e.status != EventStatus::Draft || e.organizer_id == user.id)
        .ok_or_else(|| ApiError::not_found("Event not found"))?;

    let removed = sqlx::query("DELETE FROM saved_events WHERE user_id = ? AND event_id = ?")
        .bind(&user.id)
        .bind(&event.id)
        .execute(&state.db)
        .await?;

    if removed.rows_affected() > 0 {
        return Ok((
            StatusCode::OK,
            Json(SaveToggleResponse {
                status: "unsaved",
                event_id: event.id,
            }),
        ));
    }

    sqlx::query("INSERT INTO saved_events (id, user_id, event_id, created_at) VALUES (?, ?, ?, ?)")
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(&user.id)
        .bind(&event.id)
        .bind(db::now())
        .execute(&state.db)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SaveToggleResponse {
            status: "saved",
            event_id: event.id,
        }),
    ))
}

/// Caller's tickets for one event
pub async fn my_event_tickets(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(event_id): Path<String>,
) -> Result<Json<Vec<Ticket>>, ApiError> {
    find_event(&state.db, &event_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Event not found"))?;

    let tickets: Vec<Ticket> = sqlx::query_as(
        "SELECT * FROM tickets WHERE event_id = ? AND user_id = ? ORDER BY created_at DESC, id ASC",
    )
    .bind(&event_id)
    .bind(&user.id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(tickets))
}

/// Price times quantity, rejected rather than wrapped when out of range
fn order_subtotal(price_cents: i64, quantity: i64) -> Result<i64, ApiError> {
    price_cents
        .checked_mul(quantity)
        .ok_or_else(|| ApiError::validation_field("quantity", "Order total is too large"))
}

fn validate_purchase_request(request: &PurchaseRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors.check("ticket_tier_id", validate_uuid(&request.ticket_tier_id, "ticket_tier_id"));
    errors.check("quantity", validate_quantity(request.quantity));
    if let Some(name) = &request.attendee_name {
        if name.chars().count() > 255 {
            errors.add("attendee_name", "Attendee name is too long (max 255 characters)");
        }
    }
    errors.finish()
}

/// Buy tickets: reserve inventory, redeem the coupon, create a pending
/// order and issue its tickets, all in one transaction.
pub async fn purchase(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(event_id): Path<String>,
    ApiJson(request): ApiJson<PurchaseRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    validate_purchase_request(&request)?;

    let now = Utc::now();
    let now_ts = db::timestamp(now);

    let event = find_event(&state.db, &event_id)
        .await?
        .filter(|e| e.status != EventStatus::Draft || e.organizer_id == user.id)
        .ok_or_else(|| ApiError::not_found("Event not found"))?;
    if event.status != EventStatus::Published {
        return Err(ApiError::conflict("Tickets for this event are not on sale"));
    }

    let tier: TicketTier = sqlx::query_as("SELECT * FROM ticket_tiers WHERE id = ? AND event_id = ?")
        .bind(&request.ticket_tier_id)
        .bind(&event.id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Ticket tier not found"))?;
    if !tier.is_on_sale(now) {
        return Err(ApiError::validation_field(
            "ticket_tier_id",
            "Ticket sales are not open for this tier",
        ));
    }

    // Opening with the write makes SQLite take its write lock before any
    // read, so concurrent writers queue on the busy timeout.
    let mut tx = state.db.begin().await?;
    let reserved = sqlx::query(
        r#"
        UPDATE ticket_tiers
        SET available_tickets = available_tickets - ?, updated_at = ?
        WHERE id = ? AND available_tickets >= ?
        "#,
    )
    .bind(request.quantity)
    .bind(&now_ts)
    .bind(&tier.id)
    .bind(request.quantity)
    .execute(&mut *tx)
    .await?;
    if reserved.rows_affected() == 0 {
        return Err(ApiError::conflict("Not enough tickets available"));
    }

    let (price_cents,): (i64,) = sqlx::query_as("SELECT price_cents FROM ticket_tiers WHERE id = ?")
        .bind(&tier.id)
        .fetch_one(&mut *tx)
        .await?;
    let subtotal = order_subtotal(price_cents, request.quantity)?;
    let mut coupon_id = None;
    let mut total = subtotal;

    if let Some(code) = request.coupon_code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        let coupon: Coupon = sqlx::query_as("SELECT * FROM coupons WHERE event_id = ? AND code = ?")
            .bind(&event.id)
            .bind(code.to_uppercase())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| ApiError::validation_field("coupon_code", "Invalid coupon code"))?;
        if !coupon.is_redeemable(now) {
            return Err(ApiError::validation_field("coupon_code", "Coupon is not valid"));
        }

        let redeemed = sqlx::query(
            r#"
            UPDATE coupons SET times_used = times_used + 1
            WHERE id = ? AND active = 1 AND times_used < usage_limit
              AND valid_from <= ? AND valid_to >= ?
            "#,
        )
        .bind(&coupon.id)
        .bind(&now_ts)
        .bind(&now_ts)
        .execute(&mut *tx)
        .await?;
        if redeemed.rows_affected() == 0 {
            return Err(ApiError::validation_field("coupon_code", "Coupon is no longer valid"));
        }

        total = coupon.apply(subtotal);
        coupon_id = Some(coupon.id);
    }

    let order_id = uuid::Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO orders (id, user_id, event_id, ticket_tier_id, quantity, coupon_id,
                            total_amount_cents, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?)
        "#,
    )
    .bind(&order_id)
    .bind(&user.id)
    .bind(&event.id)
    .bind(&tier.id)
    .bind(request.quantity)
    .bind(&coupon_id)
    .bind(total)
    .bind(&now_ts)
    .bind(&now_ts)
    .execute(&mut *tx)
    .await?;

    for _ in 0..request.quantity {
        sqlx::query(
            r#"
            INSERT INTO tickets (id, order_id, event_id, user_id, ticket_tier_id, scan_code,
                                 status, attendee_name, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, 'unused', ?, ?, ?)
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(&order_id)
        .bind(&event.id)
        .bind(&user.id)
        .bind(&tier.id)
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(&request.attendee_name)
        .bind(&now_ts)
        .bind(&now_ts)
        .execute(&mut *tx)
        .await?;
    }

    let order: Order = sqlx::query_as("SELECT * FROM orders WHERE id = ?")
        .bind(&order_id)
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;

    metrics::counter!(super::metrics::TICKETS_SOLD_TOTAL).increment(request.quantity as u64);
    metrics::counter!(super::metrics::ORDERS_TOTAL, "status" => "pending").increment(1);
    tracing::info!(
        order_id = %order.id,
        event_id = %event.id,
        tier_id = %tier.id,
        quantity = request.quantity,
        total_cents = total,
        "Tickets purchased"
    );

    Ok((StatusCode::CREATED, Json(order_response(&state.db, order).await?)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_subtotal_rejects_overflow() {
        assert_eq!(order_subtotal(100_000_000, 10).unwrap(), 1_000_000_000);
        let err = order_subtotal(i64::MAX / 2, 3).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.details().unwrap().contains_key("quantity"));
    }
}

//! Organizer ticket tier management.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::db::{
    self, decimal_to_cents, CreateTicketTierRequest, TicketTier, TicketTierResponse,
    UpdateTicketTierRequest,
};
use crate::AppState;

use super::auth::Organizer;
use super::error::{ApiError, ApiJson, ValidationErrorBuilder};
use super::permissions::{owned_event, owned_parent_event, EventChild};
use super::validation::{validate_inventory, validate_required_text};

fn validate_tier(
    name: &str,
    price: Decimal,
    total: i64,
    available: i64,
    sales_start: DateTime<Utc>,
    sales_end: DateTime<Utc>,
) -> Result<i64, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors.check("name", validate_required_text(name, "Name", 255));
    let price_cents = decimal_to_cents(price);
    if price_cents.is_none() {
        errors.add(
            "price",
            "Price must be between 0 and 1000000.00 with at most two decimal places",
        );
    }
    errors.check("available_tickets", validate_inventory(total, available));
    if sales_end <= sales_start {
        errors.add("sales_end", "Sales end must be after sales start");
    }
    errors.finish()?;
    price_cents.ok_or_else(|| ApiError::validation_field("price", "Invalid price"))
}

async fn load_tier(pool: &sqlx::SqlitePool, id: &str) -> Result<TicketTier, ApiError> {
    sqlx::query_as("SELECT * FROM ticket_tiers WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Ticket tier not found"))
}

pub async fn list_tiers(
    State(state): State<Arc<AppState>>,
    Organizer(user): Organizer,
    Path(event_id): Path<String>,
) -> Result<Json<Vec<TicketTierResponse>>, ApiError> {
    let event = owned_event(&state.db, &user, &event_id).await?;
    let tiers: Vec<TicketTier> =
        sqlx::query_as("SELECT * FROM ticket_tiers WHERE event_id = ? ORDER BY price_cents ASC, name ASC")
            .bind(&event.id)
            .fetch_all(&state.db)
            .await?;
    Ok(Json(tiers.into_iter().map(TicketTierResponse::from).collect()))
}

pub async fn create_tier(
    State(state): State<Arc<AppState>>,
    Organizer(user): Organizer,
    Path(event_id): Path<String>,
    ApiJson(request): ApiJson<CreateTicketTierRequest>,
) -> Result<(StatusCode, Json<TicketTierResponse>), ApiError> {
    let event = owned_event(&state.db, &user, &event_id).await?;

    let available = request.available_tickets.unwrap_or(request.total_tickets);
    let price_cents = validate_tier(
        &request.name,
        request.price,
        request.total_tickets,
        available,
        request.sales_start,
        request.sales_end,
    )?;

    let id = uuid::Uuid::new_v4().to_string();
    let now = db::now();
    sqlx::query(
        r#"
        INSERT INTO ticket_tiers (id, event_id, name, price_cents, total_tickets, available_tickets,
                                  sales_start, sales_end, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&event.id)
    .bind(request.name.trim())
    .bind(price_cents)
    .bind(request.total_tickets)
    .bind(available)
    .bind(db::timestamp(request.sales_start))
    .bind(db::timestamp(request.sales_end))
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    tracing::info!(tier_id = %id, event_id = %event.id, total = request.total_tickets, "Ticket tier created");

    let tier = load_tier(&state.db, &id).await?;
    Ok((StatusCode::CREATED, Json(TicketTierResponse::from(tier))))
}

/// Update a tier. Changing `total_tickets` alone shifts `available_tickets`
/// by the same amount in SQL, so purchases committed meanwhile keep their
/// decrement. An explicit `available_tickets` is written only if inventory
/// still matches what was read.
pub async fn update_tier(
    State(state): State<Arc<AppState>>,
    Organizer(user): Organizer,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<UpdateTicketTierRequest>,
) -> Result<Json<TicketTierResponse>, ApiError> {
    owned_parent_event(&state.db, &user, EventChild::TicketTier, &id).await?;
    let tier = load_tier(&state.db, &id).await?;

    let name = request.name.unwrap_or_else(|| tier.name.clone());
    let price = request.price.unwrap_or_else(|| tier.price());
    let total = request.total_tickets.unwrap_or(tier.total_tickets);
    let available = request
        .available_tickets
        .unwrap_or(tier.available_tickets + (total - tier.total_tickets));
    let sales_start = request.sales_start.unwrap_or(tier.sales_start);
    let sales_end = request.sales_end.unwrap_or(tier.sales_end);

    let price_cents = validate_tier(&name, price, total, available, sales_start, sales_end)?;

    let result = match request.available_tickets {
        None => {
            sqlx::query(
                r#"
                UPDATE ticket_tiers SET
                    name = ?, price_cents = ?,
                    available_tickets = available_tickets + (? - total_tickets),
                    total_tickets = ?, sales_start = ?, sales_end = ?, updated_at = ?
                WHERE id = ? AND available_tickets + (? - total_tickets) >= 0
                "#,
            )
            .bind(name.trim())
            .bind(price_cents)
            .bind(total)
            .bind(total)
            .bind(db::timestamp(sales_start))
            .bind(db::timestamp(sales_end))
            .bind(db::now())
            .bind(&tier.id)
            .bind(total)
            .execute(&state.db)
            .await?
        }
        Some(explicit) => {
            sqlx::query(
                r#"
                UPDATE ticket_tiers SET
                    name = ?, price_cents = ?, total_tickets = ?, available_tickets = ?,
                    sales_start = ?, sales_end = ?, updated_at = ?
                WHERE id = ? AND available_tickets = ? AND total_tickets = ?
                "#,
            )
            .bind(name.trim())
            .bind(price_cents)
            .bind(total)
            .bind(explicit)
            .bind(db::timestamp(sales_start))
            .bind(db::timestamp(sales_end))
            .bind(db::now())
            .bind(&tier.id)
            .bind(tier.available_tickets)
            .bind(tier.total_tickets)
            .execute(&state.db)
            .await?
        }
    };

    if result.rows_affected() == 0 {
        return Err(match request.available_tickets {
            None => ApiError::validation_field(
                "total_tickets",
                "Total tickets cannot be lower than the tickets already sold",
            ),
            Some(_) => ApiError::conflict("Ticket inventory changed while updating; reload and retry"),
        });
    }

    tracing::info!(tier_id = %tier.id, total, "Ticket tier updated");

    let tier = load_tier(&state.db, &id).await?;
    Ok(Json(TicketTierResponse::from(tier)))
}

/// Delete a tier that has no live tickets
pub async fn delete_tier(
    State(state): State<Arc<AppState>>,
    Organizer(user): Organizer,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    owned_parent_event(&state.db, &user, EventChild::TicketTier, &id).await?;

    let (live,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM tickets WHERE ticket_tier_id = ? AND status != 'cancelled'",
    )
    .bind(&id)
    .fetch_one(&state.db)
    .await?;
    if live > 0 {
        return Err(ApiError::conflict("Cannot delete a ticket tier with issued tickets"));
    }

    sqlx::query("DELETE FROM ticket_tiers WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

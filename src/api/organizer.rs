//! Organizer event management, attendee lists and check-in.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, Utc};
use std::sync::Arc;

use crate::db::{
    self, spans_multiple_days, AttendeeRow, CheckInRequest, CreateEventRequest, Event,
    EventDetailResponse, EventResponse, OrderStatus, Paginated, Ticket, TicketStatus,
    UpdateEventRequest, DATE_FORMAT,
};
use crate::AppState;

use super::auth::Organizer;
use super::error::{ApiError, ApiJson, ApiQuery, ValidationErrorBuilder};
use super::filters::{fetch_events, EventFilter, EventScope};
use super::permissions::owned_event;
use super::serializers::event_detail;
use super::validation::{validate_coordinates, validate_optional_url, validate_required_text};

/// Validated field set shared by create and update
struct EventFields {
    title: String,
    description: String,
    category: db::EventCategory,
    image_url: Option<String>,
    location: String,
    address: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    start_at: chrono::DateTime<Utc>,
    end_at: chrono::DateTime<Utc>,
    status: db::EventStatus,
}

impl From<CreateEventRequest> for EventFields {
    fn from(req: CreateEventRequest) -> Self {
        Self {
            title: req.title,
            description: req.description,
            category: req.category,
            image_url: req.image_url,
            location: req.location,
            address: req.address,
            latitude: req.latitude,
            longitude: req.longitude,
            start_at: req.start_at,
            end_at: req.end_at,
            status: req.status,
        }
    }
}

impl EventFields {
    /// Stored values overlaid with the fields present in the update
    fn merged(event: Event, req: UpdateEventRequest) -> Self {
        Self {
            title: req.title.unwrap_or(event.title),
            description: req.description.unwrap_or(event.description),
            category: req.category.unwrap_or(event.category),
            image_url: req.image_url.unwrap_or(event.image_url),
            location: req.location.unwrap_or(event.location),
            address: req.address.unwrap_or(event.address),
            latitude: req.latitude.unwrap_or(event.latitude),
            longitude: req.longitude.unwrap_or(event.longitude),
            start_at: req.start_at.unwrap_or(event.start_at),
            end_at: req.end_at.unwrap_or(event.end_at),
            status: req.status.unwrap_or(event.status),
        }
    }

    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = ValidationErrorBuilder::new();
        errors.check("title", validate_required_text(&self.title, "Title", 255));
        errors.check("location", validate_required_text(&self.location, "Location", 255));
        if self.description.chars().count() > 10_000 {
            errors.add("description", "Description is too long (max 10000 characters)");
        }
        errors.check("image_url", validate_optional_url(&self.image_url));
        errors.check("latitude", validate_coordinates(self.latitude, self.longitude));
        if self.end_at < self.start_at {
            errors.add("end_at", "End date must be after start date");
        }
        errors.finish()
    }
}

/// Days and sessions already on the programme must stay inside the event's
/// new dates
async fn check_programme_fits(pool: &sqlx::SqlitePool, event_id: &str, fields: &EventFields) -> Result<(), ApiError> {
    let (earliest, latest): (Option<String>, Option<String>) = sqlx::query_as(
        r#"
        SELECT MIN(date), MAX(date) FROM (
            SELECT date FROM event_days WHERE event_id = ?
            UNION ALL
            SELECT date FROM schedules WHERE event_id = ?
        )
        "#,
    )
    .bind(event_id)
    .bind(event_id)
    .fetch_one(pool)
    .await?;

    let parse = |value: Option<String>| value.and_then(|d| NaiveDate::parse_from_str(&d, DATE_FORMAT).ok());
    let mut errors = ValidationErrorBuilder::new();
    if let Some(earliest) = parse(earliest) {
        if earliest < fields.start_at.date_naive() {
            errors.add(
                "start_at",
                format!("Programme items are scheduled on {}, before the new start date", earliest),
            );
        }
    }
    if let Some(latest) = parse(latest) {
        if latest > fields.end_at.date_naive() {
            errors.add(
                "end_at",
                format!("Programme items are scheduled on {}, after the new end date", latest),
            );
        }
    }
    errors.finish()
}

/// Organizer's own events, any status, with catalog filters
pub async fn list_my_events(
    State(state): State<Arc<AppState>>,
    Organizer(user): Organizer,
    ApiQuery(filter): ApiQuery<EventFilter>,
) -> Result<Json<Paginated<EventResponse>>, ApiError> {
    let now = db::now();
    let page = fetch_events(&state.db, &filter, EventScope::OwnedBy(&user.id), &now).await?;
    let items = super::serializers::event_responses(&state.db, page.events).await?;
    Ok(Json(Paginated::new(items, page.total, page.page, page.per_page)))
}

pub async fn create_event(
    State(state): State<Arc<AppState>>,
    Organizer(user): Organizer,
    ApiJson(request): ApiJson<CreateEventRequest>,
) -> Result<(StatusCode, Json<EventDetailResponse>), ApiError> {
    let fields = EventFields::from(request);
    fields.validate()?;

    let id = uuid::Uuid::new_v4().to_string();
    let now = db::now();
    sqlx::query(
        r#"
        INSERT INTO events (id, organizer_id, title, description, category, image_url, location,
                            address, latitude, longitude, start_at, end_at, is_multi_day, status,
                            created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&user.id)
    .bind(&fields.title)
    .bind(&fields.description)
    .bind(fields.category)
    .bind(&fields.image_url)
    .bind(&fields.location)
    .bind(&fields.address)
    .bind(fields.latitude)
    .bind(fields.longitude)
    .bind(db::timestamp(fields.start_at))
    .bind(db::timestamp(fields.end_at))
    .bind(spans_multiple_days(fields.start_at, fields.end_at))
    .bind(fields.status)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    tracing::info!(event_id = %id, organizer_id = %user.id, title = %fields.title, "Event created");

    let event = owned_event(&state.db, &user, &id).await?;
    Ok((StatusCode::CREATED, Json(event_detail(&state.db, event).await?)))
}

pub async fn get_my_event(
    State(state): State<Arc<AppState>>,
    Organizer(user): Organizer,
    Path(id): Path<String>,
) -> Result<Json<EventDetailResponse>, ApiError> {
    let event = owned_event(&state.db, &user, &id).await?;
    Ok(Json(event_detail(&state.db, event).await?))
}

pub async fn update_event(
    State(state): State<Arc<AppState>>,
    Organizer(user): Organizer,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<UpdateEventRequest>,
) -> Result<Json<EventDetailResponse>, ApiError> {
    let event = owned_event(&state.db, &user, &id).await?;
    let fields = EventFields::merged(event, request);
    fields.validate()?;
    check_programme_fits(&state.db, &id, &fields).await?;

    sqlx::query(
        r#"
        UPDATE events SET
            title = ?, description = ?, category = ?, image_url = ?, location = ?, address = ?,
            latitude = ?, longitude = ?, start_at = ?, end_at = ?, is_multi_day = ?, status = ?,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&fields.title)
    .bind(&fields.description)
    .bind(fields.category)
    .bind(&fields.image_url)
    .bind(&fields.location)
    .bind(&fields.address)
    .bind(fields.latitude)
    .bind(fields.longitude)
    .bind(db::timestamp(fields.start_at))
    .bind(db::timestamp(fields.end_at))
    .bind(spans_multiple_days(fields.start_at, fields.end_at))
    .bind(fields.status)
    .bind(db::now())
    .bind(&id)
    .execute(&state.db)
    .await?;

    tracing::info!(event_id = %id, status = ?fields.status, "Event updated");

    let event = owned_event(&state.db, &user, &id).await?;
    Ok(Json(event_detail(&state.db, event).await?))
}

pub async fn delete_event(
    State(state): State<Arc<AppState>>,
    Organizer(user): Organizer,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let event = owned_event(&state.db, &user, &id).await?;

    sqlx::query("DELETE FROM events WHERE id = ?")
        .bind(&event.id)
        .execute(&state.db)
        .await?;

    tracing::info!(event_id = %event.id, "Event deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Tickets of paid orders for an event, newest first
pub async fn list_attendees(
    State(state): State<Arc<AppState>>,
    Organizer(user): Organizer,
    Path(id): Path<String>,
) -> Result<Json<Vec<AttendeeRow>>, ApiError> {
    let event = owned_event(&state.db, &user, &id).await?;

    let rows: Vec<AttendeeRow> = sqlx::query_as(
        r#"
        SELECT t.id AS ticket_id, t.scan_code, t.status AS ticket_status, t.used_at,
               t.attendee_name, tt.name AS tier_name, o.id AS order_id,
               u.id AS user_id, u.username, u.email, t.created_at AS purchased_at
        FROM tickets t
        JOIN orders o ON o.id = t.order_id
        JOIN users u ON u.id = t.user_id
        JOIN ticket_tiers tt ON tt.id = t.ticket_tier_id
        WHERE t.event_id = ? AND o.status = 'paid'
        ORDER BY t.created_at DESC, t.id ASC
        "#,
    )
    .bind(&event.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(rows))
}

/// Admit a ticket at the door: unused -> used
pub async fn check_in(
    State(state): State<Arc<AppState>>,
    Organizer(user): Organizer,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<CheckInRequest>,
) -> Result<Json<Ticket>, ApiError> {
    let event = owned_event(&state.db, &user, &id).await?;

    let ticket: Ticket = sqlx::query_as("SELECT * FROM tickets WHERE scan_code = ? AND event_id = ?")
        .bind(request.scan_code.trim())
        .bind(&event.id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Ticket not found"))?;

    let (order_status,): (OrderStatus,) = sqlx::query_as("SELECT status FROM orders WHERE id = ?")
        .bind(&ticket.order_id)
        .fetch_one(&state.db)
        .await?;

    if order_status != OrderStatus::Paid {
        return Err(ApiError::conflict("Ticket's order has not been paid"));
    }
    if !ticket.status.can_transition_to(TicketStatus::Used) {
        return Err(ApiError::conflict(format!("Ticket is already {}", ticket.status)));
    }

    let now = db::now();
    let result = sqlx::query(
        "UPDATE tickets SET status = 'used', used_at = ?, updated_at = ? WHERE id = ? AND status = 'unused'",
    )
    .bind(&now)
    .bind(&now)
    .bind(&ticket.id)
    .execute(&state.db)
    .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::conflict("Ticket is already used"));
    }

    tracing::info!(ticket_id = %ticket.id, event_id = %event.id, "Ticket checked in");

    let ticket: Ticket = sqlx::query_as("SELECT * FROM tickets WHERE id = ?")
        .bind(&ticket.id)
        .fetch_one(&state.db)
        .await?;
    Ok(Json(ticket))
}

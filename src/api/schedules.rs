//! Organizer programme management: event days and sessions.
//!
//! Sessions must end after they start and fall within the event's dates.
//! Bulk creation validates every session before writing any of them.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::collections::HashSet;
use std::sync::Arc;

use crate::db::{
    self, BulkScheduleRequest, CreateEventDayRequest, CreateScheduleRequest, Event, EventDay,
    Schedule, ScheduleResponse, UpdateEventDayRequest, UpdateScheduleRequest, DATE_FORMAT,
    TIME_FORMAT,
};
use crate::AppState;

use super::auth::Organizer;
use super::error::{ApiError, ApiJson, ValidationErrorBuilder};
use super::permissions::{owned_event, owned_parent_event, EventChild};
use super::serializers::{list_days, list_schedules, schedule_responses};
use super::validation::{validate_date_within, validate_required_text, validate_time_range};

// -------------------------------------------------------------------------
// Event days
// -------------------------------------------------------------------------

fn validate_day(
    event: &Event,
    day_number: i64,
    date: chrono::NaiveDate,
    start: chrono::NaiveTime,
    end: chrono::NaiveTime,
    title: &str,
) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if day_number < 1 {
        errors.add("day_number", "Day number must be at least 1");
    }
    errors.check("title", validate_required_text(title, "Title", 255));
    errors.check("end_time", validate_time_range(start, end));
    errors.check("date", validate_date_within(date, event.date_range()));
    errors.finish()
}

async fn load_day(pool: &sqlx::SqlitePool, id: &str) -> Result<EventDay, ApiError> {
    sqlx::query_as("SELECT * FROM event_days WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Event day not found"))
}

pub async fn list_event_days(
    State(state): State<Arc<AppState>>,
    Organizer(user): Organizer,
    Path(event_id): Path<String>,
) -> Result<Json<Vec<EventDay>>, ApiError> {
    let event = owned_event(&state.db, &user, &event_id).await?;
    Ok(Json(list_days(&state.db, &event.id).await?))
}

pub async fn create_event_day(
    State(state): State<Arc<AppState>>,
    Organizer(user): Organizer,
    Path(event_id): Path<String>,
    ApiJson(request): ApiJson<CreateEventDayRequest>,
) -> Result<(StatusCode, Json<EventDay>), ApiError> {
    let event = owned_event(&state.db, &user, &event_id).await?;
    validate_day(
        &event,
        request.day_number,
        request.date,
        request.start_time,
        request.end_time,
        &request.title,
    )?;

    let id = uuid::Uuid::new_v4().to_string();
    let now = db::now();
    sqlx::query(
        r#"
        INSERT INTO event_days (id, event_id, day_number, date, start_time, end_time, title, description,
                                created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&event.id)
    .bind(request.day_number)
    .bind(request.date.format(DATE_FORMAT).to_string())
    .bind(request.start_time.format(TIME_FORMAT).to_string())
    .bind(request.end_time.format(TIME_FORMAT).to_string())
    .bind(request.title.trim())
    .bind(&request.description)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    Ok((StatusCode::CREATED, Json(load_day(&state.db, &id).await?)))
}

pub async fn update_event_day(
    State(state): State<Arc<AppState>>,
    Organizer(user): Organizer,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<UpdateEventDayRequest>,
) -> Result<Json<EventDay>, ApiError> {
    let event = owned_parent_event(&state.db, &user, EventChild::EventDay, &id).await?;
    let day = load_day(&state.db, &id).await?;

    let day_number = request.day_number.unwrap_or(day.day_number);
    let date = request.date.unwrap_or(day.date);
    let start = request.start_time.unwrap_or(day.start_time);
    let end = request.end_time.unwrap_or(day.end_time);
    let title = request.title.unwrap_or(day.title);
    let description = request.description.unwrap_or(day.description);
    validate_day(&event, day_number, date, start, end, &title)?;

    sqlx::query(
        r#"
        UPDATE event_days SET day_number = ?, date = ?, start_time = ?, end_time = ?, title = ?,
                              description = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(day_number)
    .bind(date.format(DATE_FORMAT).to_string())
    .bind(start.format(TIME_FORMAT).to_string())
    .bind(end.format(TIME_FORMAT).to_string())
    .bind(title.trim())
    .bind(&description)
    .bind(db::now())
    .bind(&id)
    .execute(&state.db)
    .await?;

    Ok(Json(load_day(&state.db, &id).await?))
}

pub async fn delete_event_day(
    State(state): State<Arc<AppState>>,
    Organizer(user): Organizer,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    owned_parent_event(&state.db, &user, EventChild::EventDay, &id).await?;
    sqlx::query("DELETE FROM event_days WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// -------------------------------------------------------------------------
// Sessions
// -------------------------------------------------------------------------

/// Ids of the days and speakers a session of this event may reference
struct EventRefs {
    days: HashSet<String>,
    speakers: HashSet<String>,
}

impl EventRefs {
    async fn load(pool: &sqlx::SqlitePool, event_id: &str) -> Result<Self, sqlx::Error> {
        let days: Vec<(String,)> = sqlx::query_as("SELECT id FROM event_days WHERE event_id = ?")
            .bind(event_id)
            .fetch_all(pool)
            .await?;
        let speakers: Vec<(String,)> = sqlx::query_as("SELECT id FROM speakers WHERE event_id = ?")
            .bind(event_id)
            .fetch_all(pool)
            .await?;
        Ok(Self {
            days: days.into_iter().map(|(id,)| id).collect(),
            speakers: speakers.into_iter().map(|(id,)| id).collect(),
        })
    }
}

/// Record every problem with one session under `<prefix><field>`
fn check_schedule(
    errors: &mut ValidationErrorBuilder,
    prefix: &str,
    event: &Event,
    refs: &EventRefs,
    req: &CreateScheduleRequest,
) {
    let field = |name: &str| format!("{}{}", prefix, name);

    errors.check(&field("title"), validate_required_text(&req.title, "Title", 255));
    errors.check(&field("end_time"), validate_time_range(req.start_time, req.end_time));
    errors.check(&field("date"), validate_date_within(req.date, event.date_range()));
    if let Some(day_id) = &req.event_day_id {
        if !refs.days.contains(day_id) {
            errors.add(field("event_day_id"), "Event day does not belong to this event");
        }
    }
    if req.speaker_ids.iter().any(|id| !refs.speakers.contains(id)) {
        errors.add(field("speaker_ids"), "Every speaker must belong to this event");
    }
}

async fn insert_schedule(
    conn: &mut sqlx::SqliteConnection,
    event_id: &str,
    req: &CreateScheduleRequest,
) -> Result<String, sqlx::Error> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = db::now();
    sqlx::query(
        r#"
        INSERT INTO schedules (id, event_id, event_day_id, title, description, date, start_time, end_time,
                               location, position, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(event_id)
    .bind(&req.event_day_id)
    .bind(req.title.trim())
    .bind(&req.description)
    .bind(req.date.format(DATE_FORMAT).to_string())
    .bind(req.start_time.format(TIME_FORMAT).to_string())
    .bind(req.end_time.format(TIME_FORMAT).to_string())
    .bind(&req.location)
    .bind(req.position)
    .bind(&now)
    .bind(&now)
    .execute(&mut *conn)
    .await?;

    set_speakers(conn, &id, &req.speaker_ids).await?;
    Ok(id)
}

async fn set_speakers(
    conn: &mut sqlx::SqliteConnection,
    schedule_id: &str,
    speaker_ids: &[String],
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM schedule_speakers WHERE schedule_id = ?")
        .bind(schedule_id)
        .execute(&mut *conn)
        .await?;
    let unique: HashSet<&String> = speaker_ids.iter().collect();
    for speaker_id in unique {
        sqlx::query("INSERT INTO schedule_speakers (schedule_id, speaker_id) VALUES (?, ?)")
            .bind(schedule_id)
            .bind(speaker_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn load_schedule(pool: &sqlx::SqlitePool, id: &str) -> Result<Schedule, ApiError> {
    sqlx::query_as("SELECT * FROM schedules WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Schedule not found"))
}

async fn schedule_response(pool: &sqlx::SqlitePool, id: &str) -> Result<ScheduleResponse, ApiError> {
    let schedule = load_schedule(pool, id).await?;
    schedule_responses(pool, vec![schedule])
        .await?
        .pop()
        .ok_or_else(|| ApiError::not_found("Schedule not found"))
}

pub async fn list_event_schedules(
    State(state): State<Arc<AppState>>,
    Organizer(user): Organizer,
    Path(event_id): Path<String>,
) -> Result<Json<Vec<ScheduleResponse>>, ApiError> {
    let event = owned_event(&state.db, &user, &event_id).await?;
    let schedules = list_schedules(&state.db, &event.id).await?;
    Ok(Json(schedule_responses(&state.db, schedules).await?))
}

pub async fn create_schedule(
    State(state): State<Arc<AppState>>,
    Organizer(user): Organizer,
    Path(event_id): Path<String>,
    ApiJson(request): ApiJson<CreateScheduleRequest>,
) -> Result<(StatusCode, Json<ScheduleResponse>), ApiError> {
    let event = owned_event(&state.db, &user, &event_id).await?;
    let refs = EventRefs::load(&state.db, &event.id).await?;

    let mut errors = ValidationErrorBuilder::new();
    check_schedule(&mut errors, "", &event, &refs, &request);
    errors.finish()?;

    let mut tx = state.db.begin().await?;
    let id = insert_schedule(&mut tx, &event.id, &request).await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(schedule_response(&state.db, &id).await?)))
}

/// Create several sessions at once; nothing is written if any is invalid
pub async fn bulk_create_schedules(
    State(state): State<Arc<AppState>>,
    Organizer(user): Organizer,
    Path(event_id): Path<String>,
    ApiJson(request): ApiJson<BulkScheduleRequest>,
) -> Result<(StatusCode, Json<Vec<ScheduleResponse>>), ApiError> {
    let event = owned_event(&state.db, &user, &event_id).await?;
    if request.schedules.is_empty() {
        return Err(ApiError::validation_field("schedules", "At least one schedule is required"));
    }

    let refs = EventRefs::load(&state.db, &event.id).await?;
    let mut errors = ValidationErrorBuilder::new();
    for (i, schedule) in request.schedules.iter().enumerate() {
        check_schedule(&mut errors, &format!("schedules[{}].", i), &event, &refs, schedule);
    }
    errors.finish()?;

    let mut tx = state.db.begin().await?;
    let mut ids = Vec::with_capacity(request.schedules.len());
    for schedule in &request.schedules {
        ids.push(insert_schedule(&mut tx, &event.id, schedule).await?);
    }
    tx.commit().await?;

    tracing::info!(event_id = %event.id, count = ids.len(), "Schedules created in bulk");

    let mut responses = Vec::with_capacity(ids.len());
    for id in &ids {
        responses.push(schedule_response(&state.db, id).await?);
    }
    Ok((StatusCode::CREATED, Json(responses)))
}

pub async fn update_schedule(
    State(state): State<Arc<AppState>>,
    Organizer(user): Organizer,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<UpdateScheduleRequest>,
) -> Result<Json<ScheduleResponse>, ApiError> {
    let event = owned_parent_event(&state.db, &user, EventChild::Schedule, &id).await?;
    let current = load_schedule(&state.db, &id).await?;
    let speakers_changed = request.speaker_ids.is_some();

    let merged = CreateScheduleRequest {
        event_day_id: request.event_day_id.unwrap_or(current.event_day_id),
        title: request.title.unwrap_or(current.title),
        description: request.description.unwrap_or(current.description),
        date: request.date.unwrap_or(current.date),
        start_time: request.start_time.unwrap_or(current.start_time),
        end_time: request.end_time.unwrap_or(current.end_time),
        location: request.location.unwrap_or(current.location),
        position: request.position.unwrap_or(current.position),
        speaker_ids: request.speaker_ids.unwrap_or_default(),
    };

    let refs = EventRefs::load(&state.db, &event.id).await?;
    let mut errors = ValidationErrorBuilder::new();
    check_schedule(&mut errors, "", &event, &refs, &merged);
    errors.finish()?;

    let mut tx = state.db.begin().await?;
    sqlx::query(
        r#"
        UPDATE schedules SET event_day_id = ?, title = ?, description = ?, date = ?, start_time = ?,
                             end_time = ?, location = ?, position = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&merged.event_day_id)
    .bind(merged.title.trim())
    .bind(&merged.description)
    .bind(merged.date.format(DATE_FORMAT).to_string())
    .bind(merged.start_time.format(TIME_FORMAT).to_string())
    .bind(merged.end_time.format(TIME_FORMAT).to_string())
    .bind(&merged.location)
    .bind(merged.position)
    .bind(db::now())
    .bind(&id)
    .execute(&mut *tx)
    .await?;
    if speakers_changed {
        set_speakers(&mut tx, &id, &merged.speaker_ids).await?;
    }
    tx.commit().await?;

    Ok(Json(schedule_response(&state.db, &id).await?))
}

pub async fn delete_schedule(
    State(state): State<Arc<AppState>>,
    Organizer(user): Organizer,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    owned_parent_event(&state.db, &user, EventChild::Schedule, &id).await?;
    sqlx::query("DELETE FROM schedules WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::db::{self, CreateSpeakerRequest, Speaker, UpdateSpeakerRequest};
use crate::AppState;

use super::auth::Organizer;
use super::error::{ApiError, ApiJson, ValidationErrorBuilder};
use super::permissions::{owned_event, owned_parent_event, EventChild};
use super::serializers::list_speakers;
use super::validation::{validate_optional_url, validate_required_text};

fn validate_speaker(
    name: &str,
    job_title: &Option<String>,
    company: &Option<String>,
    photo_url: &Option<String>,
) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors.check("name", validate_required_text(name, "Name", 255));
    for (field, value) in [("job_title", job_title), ("company", company)] {
        if value.as_ref().map(|v| v.chars().count() > 255).unwrap_or(false) {
            errors.add(field, "Value is too long (max 255 characters)");
        }
    }
    errors.check("photo_url", validate_optional_url(photo_url));
    errors.finish()
}

async fn load_speaker(pool: &sqlx::SqlitePool, id: &str) -> Result<Speaker, ApiError> {
    sqlx::query_as("SELECT * FROM speakers WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Speaker not found"))
}

pub async fn list_event_speakers(
    State(state): State<Arc<AppState>>,
    Organizer(user): Organizer,
    Path(event_id): Path<String>,
) -> Result<Json<Vec<Speaker>>, ApiError> {
    let event = owned_event(&state.db, &user, &event_id).await?;
    Ok(Json(list_speakers(&state.db, &event.id).await?))
}

pub async fn create_speaker(
    State(state): State<Arc<AppState>>,
    Organizer(user): Organizer,
    Path(event_id): Path<String>,
    ApiJson(request): ApiJson<CreateSpeakerRequest>,
) -> Result<(StatusCode, Json<Speaker>), ApiError> {
    let event = owned_event(&state.db, &user, &event_id).await?;
    validate_speaker(&request.name, &request.job_title, &request.company, &request.photo_url)?;

    let id = uuid::Uuid::new_v4().to_string();
    let now = db::now();
    sqlx::query(
        r#"
        INSERT INTO speakers (id, event_id, name, job_title, company, bio, photo_url, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&event.id)
    .bind(request.name.trim())
    .bind(&request.job_title)
    .bind(&request.company)
    .bind(&request.bio)
    .bind(&request.photo_url)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    Ok((StatusCode::CREATED, Json(load_speaker(&state.db, &id).await?)))
}

pub async fn update_speaker(
    State(state): State<Arc<AppState>>,
    Organizer(user): Organizer,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<UpdateSpeakerRequest>,
) -> Result<Json<Speaker>, ApiError> {
    owned_parent_event(&state.db, &user, EventChild::Speaker, &id).await?;
    let speaker = load_speaker(&state.db, &id).await?;

    let name = request.name.unwrap_or(speaker.name);
    let job_title = request.job_title.unwrap_or(speaker.job_title);
    let company = request.company.unwrap_or(speaker.company);
    let bio = request.bio.unwrap_or(speaker.bio);
    let photo_url = request.photo_url.unwrap_or(speaker.photo_url);
    validate_speaker(&name, &job_title, &company, &photo_url)?;

    sqlx::query(
        r#"
        UPDATE speakers SET name = ?, job_title = ?, company = ?, bio = ?, photo_url = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(name.trim())
    .bind(&job_title)
    .bind(&company)
    .bind(&bio)
    .bind(&photo_url)
    .bind(db::now())
    .bind(&id)
    .execute(&state.db)
    .await?;

    Ok(Json(load_speaker(&state.db, &id).await?))
}

pub async fn delete_speaker(
    State(state): State<Arc<AppState>>,
    Organizer(user): Organizer,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    owned_parent_event(&state.db, &user, EventChild::Speaker, &id).await?;
    sqlx::query("DELETE FROM speakers WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

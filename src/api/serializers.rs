//! Nested JSON payloads for events.
//!
//! Related rows are loaded in batches keyed by event id, so a page of N
//! events costs a fixed number of queries rather than N.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::HashMap;

use crate::db::{
    Event, EventDay, EventDetailResponse, EventResponse, PublicUser, Schedule, ScheduleResponse,
    ScheduleSpeakerRow, Speaker, TicketTier, TicketTierResponse,
};
use crate::discovery::TierSummary;

/// `SELECT ... WHERE <column> IN (?, ?, ...)` over the given ids
fn select_in<'a>(prefix: &str, column: &str, ids: &'a [String], suffix: &str) -> QueryBuilder<'a, Sqlite> {
    let mut qb = QueryBuilder::new(prefix);
    qb.push(" WHERE ").push(column).push(" IN (");
    let mut list = qb.separated(", ");
    for id in ids {
        list.push_bind(id.as_str());
    }
    qb.push(")").push(suffix);
    qb
}

pub async fn tiers_by_event(
    pool: &SqlitePool,
    event_ids: &[String],
) -> Result<HashMap<String, Vec<TicketTier>>, sqlx::Error> {
    let mut grouped: HashMap<String, Vec<TicketTier>> = HashMap::new();
    if event_ids.is_empty() {
        return Ok(grouped);
    }
    let tiers: Vec<TicketTier> = select_in(
        "SELECT * FROM ticket_tiers",
        "event_id",
        event_ids,
        " ORDER BY price_cents ASC, name ASC",
    )
    .build_query_as()
    .fetch_all(pool)
    .await?;
    for tier in tiers {
        grouped.entry(tier.event_id.clone()).or_default().push(tier);
    }
    Ok(grouped)
}

async fn organizers_by_id(
    pool: &SqlitePool,
    organizer_ids: &[String],
) -> Result<HashMap<String, PublicUser>, sqlx::Error> {
    if organizer_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let users: Vec<PublicUser> = select_in("SELECT id, username, email FROM users", "id", organizer_ids, "")
        .build_query_as()
        .fetch_all(pool)
        .await?;
    Ok(users.into_iter().map(|u| (u.id.clone(), u)).collect())
}

/// Listing payload for one event with its tiers already loaded
pub fn event_response(
    event: Event,
    tiers: Vec<TicketTier>,
    organizer: Option<PublicUser>,
    now: DateTime<Utc>,
) -> EventResponse {
    let summary = TierSummary::from_tiers(&tiers);
    EventResponse {
        duration_days: event.duration_days(),
        is_currently_happening: event.is_currently_happening(now),
        id: event.id,
        title: event.title,
        description: event.description,
        category: event.category,
        image_url: event.image_url,
        location: event.location,
        address: event.address,
        latitude: event.latitude,
        longitude: event.longitude,
        start_at: event.start_at,
        end_at: event.end_at,
        is_multi_day: event.is_multi_day,
        status: event.status,
        organizer,
        ticket_tiers: tiers.into_iter().map(TicketTierResponse::from).collect(),
        available_tickets: summary.available_tickets,
        min_price: summary.min_price,
        max_price: summary.max_price,
        created_at: event.created_at,
        updated_at: event.updated_at,
    }
}

/// Serialize a page of events, preserving their order
pub async fn event_responses(pool: &SqlitePool, events: Vec<Event>) -> Result<Vec<EventResponse>, sqlx::Error> {
    let now = Utc::now();
    let event_ids: Vec<String> = events.iter().map(|e| e.id.clone()).collect();
    let mut organizer_ids: Vec<String> = events.iter().map(|e| e.organizer_id.clone()).collect();
    organizer_ids.sort();
    organizer_ids.dedup();

    let mut tiers = tiers_by_event(pool, &event_ids).await?;
    let organizers = organizers_by_id(pool, &organizer_ids).await?;

    Ok(events
        .into_iter()
        .map(|event| {
            let event_tiers = tiers.remove(&event.id).unwrap_or_default();
            let organizer = organizers.get(&event.organizer_id).cloned();
            event_response(event, event_tiers, organizer, now)
        })
        .collect())
}

/// Attach speakers to sessions
pub async fn schedule_responses(
    pool: &SqlitePool,
    schedules: Vec<Schedule>,
) -> Result<Vec<ScheduleResponse>, sqlx::Error> {
    let ids: Vec<String> = schedules.iter().map(|s| s.id.clone()).collect();
    let mut speakers: HashMap<String, Vec<Speaker>> = HashMap::new();
    if !ids.is_empty() {
        let rows: Vec<ScheduleSpeakerRow> = select_in(
            "SELECT ss.schedule_id, sp.* FROM schedule_speakers ss JOIN speakers sp ON sp.id = ss.speaker_id",
            "ss.schedule_id",
            &ids,
            " ORDER BY sp.name ASC",
        )
        .build_query_as()
        .fetch_all(pool)
        .await?;
        for row in rows {
            speakers.entry(row.schedule_id).or_default().push(row.speaker);
        }
    }

    Ok(schedules
        .into_iter()
        .map(|s| {
            let session_speakers = speakers.remove(&s.id).unwrap_or_default();
            ScheduleResponse::new(s, session_speakers)
        })
        .collect())
}

pub async fn list_schedules(pool: &SqlitePool, event_id: &str) -> Result<Vec<Schedule>, sqlx::Error> {
    sqlx::query_as(
        "SELECT * FROM schedules WHERE event_id = ? ORDER BY date ASC, start_time ASC, position ASC",
    )
    .bind(event_id)
    .fetch_all(pool)
    .await
}

pub async fn list_days(pool: &SqlitePool, event_id: &str) -> Result<Vec<EventDay>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM event_days WHERE event_id = ? ORDER BY day_number ASC")
        .bind(event_id)
        .fetch_all(pool)
        .await
}

pub async fn list_speakers(pool: &SqlitePool, event_id: &str) -> Result<Vec<Speaker>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM speakers WHERE event_id = ? ORDER BY name ASC")
        .bind(event_id)
        .fetch_all(pool)
        .await
}

/// Full event page: listing fields plus days, sessions and speakers
pub async fn event_detail(pool: &SqlitePool, event: Event) -> Result<EventDetailResponse, sqlx::Error> {
    let event_id = event.id.clone();
    let response = event_responses(pool, vec![event])
        .await?
        .pop()
        .ok_or(sqlx::Error::RowNotFound)?;

    let event_days = list_days(pool, &event_id).await?;
    let schedules = schedule_responses(pool, list_schedules(pool, &event_id).await?).await?;
    let speakers = list_speakers(pool, &event_id).await?;

    Ok(EventDetailResponse {
        event: response,
        event_days,
        schedules,
        speakers,
    })
}

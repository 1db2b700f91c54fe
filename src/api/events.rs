//! Public event catalog and discovery endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;

use crate::db::{
    self, page_window, Event, EventCategory, EventDetailResponse, EventResponse, EventStatus,
    Paginated, TicketTierResponse, TrendingEventResponse, User,
};
use crate::discovery::{
    rank, recommend, trending, Engagement, History, RECOMMENDATION_LIMIT,
};
use crate::AppState;

use super::auth::MaybeUser;
use super::error::{ApiError, ApiQuery};
use super::filters::{fetch_events, EventFilter, EventScope, PageQuery};
use super::permissions::find_event;
use super::serializers::{event_detail, event_responses, tiers_by_event};

const NEW_EVENTS_LIMIT: i64 = 10;

/// List published events that have not ended, filtered and paginated
pub async fn list_events(
    State(state): State<Arc<AppState>>,
    ApiQuery(filter): ApiQuery<EventFilter>,
) -> Result<Json<Paginated<EventResponse>>, ApiError> {
    let now = db::now();
    let page = fetch_events(&state.db, &filter, EventScope::Catalog { now: &now }, &now).await?;
    let items = event_responses(&state.db, page.events).await?;
    Ok(Json(Paginated::new(items, page.total, page.page, page.per_page)))
}

/// Published events that have not started yet, soonest first
pub async fn upcoming_events(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> Result<Json<Paginated<EventResponse>>, ApiError> {
    let now = db::now();
    let (page, per_page, offset) = page_window(query.page, query.per_page);

    let (total,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM events WHERE status = 'published' AND start_at >= ?",
    )
    .bind(&now)
    .fetch_one(&state.db)
    .await?;

    let events: Vec<Event> = sqlx::query_as(
        r#"
        SELECT * FROM events
        WHERE status = 'published' AND start_at >= ?
        ORDER BY start_at ASC, id ASC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(&now)
    .bind(per_page)
    .bind(offset)
    .fetch_all(&state.db)
    .await?;

    let items = event_responses(&state.db, events).await?;
    Ok(Json(Paginated::new(items, total, page, per_page)))
}

/// Most recently created upcoming events
pub async fn new_events(State(state): State<Arc<AppState>>) -> Result<Json<Vec<EventResponse>>, ApiError> {
    let events: Vec<Event> = sqlx::query_as(
        r#"
        SELECT * FROM events
        WHERE status = 'published' AND start_at >= ?
        ORDER BY created_at DESC, id ASC
        LIMIT ?
        "#,
    )
    .bind(db::now())
    .bind(NEW_EVENTS_LIMIT)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(event_responses(&state.db, events).await?))
}

#[derive(Debug, FromRow)]
struct EngagementRow {
    id: String,
    start_at: DateTime<Utc>,
    recent_tickets: i64,
    recent_saves: i64,
}

impl From<EngagementRow> for Engagement {
    fn from(row: EngagementRow) -> Self {
        Engagement {
            event_id: row.id,
            start_at: row.start_at,
            recent_tickets: row.recent_tickets,
            recent_saves: row.recent_saves,
        }
    }
}

async fn load_events_by_id(pool: &SqlitePool, ids: &[String]) -> Result<HashMap<String, Event>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM events WHERE id IN (");
    let mut list = qb.separated(", ");
    for id in ids {
        list.push_bind(id.as_str());
    }
    qb.push(")");
    let events: Vec<Event> = qb.build_query_as().fetch_all(pool).await?;
    Ok(events.into_iter().map(|e| (e.id.clone(), e)).collect())
}

/// Upcoming events ranked by recent sales and saves
pub async fn trending_events(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<TrendingEventResponse>>, ApiError> {
    let now = Utc::now();
    let since = db::timestamp(trending::window_start(now));

    let rows: Vec<EngagementRow> = sqlx::query_as(
        r#"
        SELECT * FROM (
            SELECT e.id, e.start_at,
                (SELECT COUNT(*) FROM tickets t
                    WHERE t.event_id = e.id AND t.status != 'cancelled' AND t.created_at >= ?) AS recent_tickets,
                (SELECT COUNT(*) FROM saved_events s
                    WHERE s.event_id = e.id AND s.created_at >= ?) AS recent_saves
            FROM events e
            WHERE e.status = 'published' AND e.start_at >= ?
        )
        WHERE ? * recent_tickets + ? * recent_saves >= ?
        ORDER BY ? * recent_tickets + ? * recent_saves DESC, start_at ASC, id ASC
        LIMIT ?
        "#,
    )
    .bind(&since)
    .bind(&since)
    .bind(db::timestamp(now))
    .bind(trending::TICKET_WEIGHT)
    .bind(trending::SAVE_WEIGHT)
    .bind(trending::MIN_SCORE)
    .bind(trending::TICKET_WEIGHT)
    .bind(trending::SAVE_WEIGHT)
    .bind(trending::CANDIDATE_LIMIT)
    .fetch_all(&state.db)
    .await?;

    let ranked = rank(rows.into_iter().map(Engagement::from).collect());
    let ids: Vec<String> = ranked.iter().map(|r| r.event_id.clone()).collect();
    let mut events = load_events_by_id(&state.db, &ids).await?;

    let ordered: Vec<Event> = ids.iter().filter_map(|id| events.remove(id)).collect();
    let responses = event_responses(&state.db, ordered).await?;

    let scores: HashMap<&str, i64> = ranked.iter().map(|r| (r.event_id.as_str(), r.score)).collect();
    let items = responses
        .into_iter()
        .map(|event| TrendingEventResponse {
            trending_score: scores.get(event.id.as_str()).copied().unwrap_or_default(),
            event,
        })
        .collect();

    Ok(Json(items))
}

#[derive(Debug, FromRow)]
struct HistoryRow {
    id: String,
    category: EventCategory,
}

async fn load_history(pool: &SqlitePool, user: &User) -> Result<History, sqlx::Error> {
    let rows: Vec<HistoryRow> = sqlx::query_as(
        r#"
        SELECT e.id, e.category FROM events e
        WHERE e.id IN (
            SELECT event_id FROM tickets WHERE user_id = ? AND status != 'cancelled'
            UNION
            SELECT event_id FROM saved_events WHERE user_id = ?
        )
        "#,
    )
    .bind(&user.id)
    .bind(&user.id)
    .fetch_all(pool)
    .await?;

    let mut history = History::default();
    for row in rows {
        history.categories.insert(row.category);
        history.event_ids.insert(row.id);
    }
    Ok(history)
}

/// Upcoming events in categories the user engaged with; soonest events otherwise
pub async fn recommended_events(
    State(state): State<Arc<AppState>>,
    MaybeUser(user): MaybeUser,
) -> Result<Json<Vec<EventResponse>>, ApiError> {
    let history = match &user {
        Some(user) => load_history(&state.db, user).await?,
        None => History::default(),
    };

    let candidates: Vec<Event> = sqlx::query_as(
        r#"
        SELECT * FROM events
        WHERE status = 'published' AND start_at >= ?
        ORDER BY start_at ASC, id ASC
        LIMIT ?
        "#,
    )
    .bind(db::now())
    .bind(trending::CANDIDATE_LIMIT)
    .fetch_all(&state.db)
    .await?;

    let picked = recommend(&history, candidates, RECOMMENDATION_LIMIT);
    Ok(Json(event_responses(&state.db, picked).await?))
}

/// Load an event the caller may see: drafts only for their organizer
async fn visible_event(pool: &SqlitePool, user: Option<&User>, id: &str) -> Result<Event, ApiError> {
    let event = find_event(pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Event not found"))?;

    let is_owner = user.map(|u| u.id == event.organizer_id).unwrap_or(false);
    if event.status == EventStatus::Draft && !is_owner {
        return Err(ApiError::not_found("Event not found"));
    }
    Ok(event)
}

/// Event page with tiers, aggregates, days, sessions and speakers
pub async fn get_event(
    State(state): State<Arc<AppState>>,
    MaybeUser(user): MaybeUser,
    Path(id): Path<String>,
) -> Result<Json<EventDetailResponse>, ApiError> {
    let event = visible_event(&state.db, user.as_ref(), &id).await?;
    Ok(Json(event_detail(&state.db, event).await?))
}

pub async fn event_ticket_tiers(
    State(state): State<Arc<AppState>>,
    MaybeUser(user): MaybeUser,
    Path(id): Path<String>,
) -> Result<Json<Vec<TicketTierResponse>>, ApiError> {
    let event = visible_event(&state.db, user.as_ref(), &id).await?;
    let mut tiers = tiers_by_event(&state.db, &[event.id.clone()]).await?;
    let items = tiers
        .remove(&event.id)
        .unwrap_or_default()
        .into_iter()
        .map(TicketTierResponse::from)
        .collect();
    Ok(Json(items))
}

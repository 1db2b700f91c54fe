//! Role and ownership checks shared by organizer endpoints.
//!
//! Missing objects are reported as 404 before ownership is checked.

use sqlx::SqlitePool;

use super::error::ApiError;
use crate::db::{Event, User};

pub const NOT_ORGANIZER: &str = "Only organizers can perform this action.";
pub const NOT_OWNER: &str = "You don't have permission to perform this action.";

pub fn require_organizer(user: &User) -> Result<(), ApiError> {
    if user.is_organizer() {
        Ok(())
    } else {
        Err(ApiError::forbidden(NOT_ORGANIZER))
    }
}

pub fn require_event_owner(user: &User, event: &Event) -> Result<(), ApiError> {
    if event.organizer_id == user.id {
        Ok(())
    } else {
        Err(ApiError::forbidden(NOT_OWNER))
    }
}

pub async fn find_event(pool: &SqlitePool, id: &str) -> Result<Option<Event>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM events WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Load an event the user organizes: 404 if missing, 403 if someone else's
pub async fn owned_event(pool: &SqlitePool, user: &User, event_id: &str) -> Result<Event, ApiError> {
    let event = find_event(pool, event_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Event not found"))?;
    require_event_owner(user, &event)?;
    Ok(event)
}

/// Tables whose rows hang off an event
#[derive(Debug, Clone, Copy)]
pub enum EventChild {
    TicketTier,
    Speaker,
    EventDay,
    Schedule,
    Coupon,
}

impl EventChild {
    fn table(self) -> &'static str {
        match self {
            EventChild::TicketTier => "ticket_tiers",
            EventChild::Speaker => "speakers",
            EventChild::EventDay => "event_days",
            EventChild::Schedule => "schedules",
            EventChild::Coupon => "coupons",
        }
    }

    fn label(self) -> &'static str {
        match self {
            EventChild::TicketTier => "Ticket tier",
            EventChild::Speaker => "Speaker",
            EventChild::EventDay => "Event day",
            EventChild::Schedule => "Schedule",
            EventChild::Coupon => "Coupon",
        }
    }
}

/// Resolve a child row to its parent event and check ownership of that event
pub async fn owned_parent_event(
    pool: &SqlitePool,
    user: &User,
    kind: EventChild,
    child_id: &str,
) -> Result<Event, ApiError> {
    let sql = format!("SELECT event_id FROM {} WHERE id = ?", kind.table());
    let event_id: Option<(String,)> = sqlx::query_as(&sql)
        .bind(child_id)
        .fetch_optional(pool)
        .await?;
    let (event_id,) = event_id.ok_or_else(|| ApiError::not_found(format!("{} not found", kind.label())))?;
    owned_event(pool, user, &event_id).await
}

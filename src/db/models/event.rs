//! Event catalog models and DTOs.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::schedule::{EventDay, ScheduleResponse, Speaker};
use super::ticket_tier::TicketTierResponse;
use super::user::PublicUser;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum EventCategory {
    Music,
    Sports,
    Conference,
    Workshop,
    Festival,
    Theater,
    Tech,
    Other,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Music => "music",
            EventCategory::Sports => "sports",
            EventCategory::Conference => "conference",
            EventCategory::Workshop => "workshop",
            EventCategory::Festival => "festival",
            EventCategory::Theater => "theater",
            EventCategory::Tech => "tech",
            EventCategory::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum EventStatus {
    #[default]
    Draft,
    Published,
    Cancelled,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: String,
    pub organizer_id: String,
    pub title: String,
    pub description: String,
    pub category: EventCategory,
    pub image_url: Option<String>,
    pub location: String,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub is_multi_day: bool,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An event spans several days when its start and end fall on different calendar dates.
pub fn spans_multiple_days(start_at: DateTime<Utc>, end_at: DateTime<Utc>) -> bool {
    start_at.date_naive() != end_at.date_naive()
}

impl Event {
    /// Number of calendar days touched, counting both ends
    pub fn duration_days(&self) -> i64 {
        (self.end_at.date_naive() - self.start_at.date_naive()).num_days() + 1
    }

    pub fn is_happening_on(&self, date: NaiveDate) -> bool {
        self.start_at.date_naive() <= date && date <= self.end_at.date_naive()
    }

    pub fn is_currently_happening(&self, now: DateTime<Utc>) -> bool {
        self.status == EventStatus::Published && self.start_at <= now && now <= self.end_at
    }

    /// Inclusive date range sessions and days must fall in
    pub fn date_range(&self) -> (NaiveDate, NaiveDate) {
        (self.start_at.date_naive(), self.end_at.date_naive())
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub category: EventCategory,
    pub image_url: Option<String>,
    pub location: String,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    #[serde(default)]
    pub status: EventStatus,
}

/// Partial update; absent fields keep their stored value
#[derive(Debug, Default, Deserialize)]
pub struct UpdateEventRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<EventCategory>,
    /// `null` clears the stored value
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub image_url: Option<Option<String>>,
    pub location: Option<String>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub address: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub latitude: Option<Option<f64>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub longitude: Option<Option<f64>>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub status: Option<EventStatus>,
}

/// Event as returned by listings, with tier aggregates computed at read time
#[derive(Debug, Clone, Serialize)]
pub struct EventResponse {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: EventCategory,
    pub image_url: Option<String>,
    pub location: String,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub is_multi_day: bool,
    pub duration_days: i64,
    pub is_currently_happening: bool,
    pub status: EventStatus,
    pub organizer: Option<PublicUser>,
    pub ticket_tiers: Vec<TicketTierResponse>,
    pub available_tickets: i64,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Event page payload: listing fields plus the programme
#[derive(Debug, Clone, Serialize)]
pub struct EventDetailResponse {
    #[serde(flatten)]
    pub event: EventResponse,
    pub event_days: Vec<EventDay>,
    pub schedules: Vec<ScheduleResponse>,
    pub speakers: Vec<Speaker>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrendingEventResponse {
    #[serde(flatten)]
    pub event: EventResponse,
    pub trending_score: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(start: DateTime<Utc>, end: DateTime<Utc>) -> Event {
        Event {
            id: "e1".into(),
            organizer_id: "u1".into(),
            title: "Rust Conf".into(),
            description: String::new(),
            category: EventCategory::Tech,
            image_url: None,
            location: "Accra".into(),
            address: None,
            latitude: None,
            longitude: None,
            start_at: start,
            end_at: end,
            is_multi_day: spans_multiple_days(start, end),
            status: EventStatus::Published,
            created_at: start,
            updated_at: start,
        }
    }

    #[test]
    fn test_multi_day_uses_calendar_dates() {
        let start = Utc.with_ymd_and_hms(2026, 5, 1, 22, 0, 0).unwrap();
        assert!(!spans_multiple_days(start, start + chrono::Duration::minutes(90)));
        assert!(spans_multiple_days(start, start + chrono::Duration::hours(3)));
    }

    #[test]
    fn test_duration_days_counts_both_ends() {
        let start = Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap();
        assert_eq!(event(start, start + chrono::Duration::hours(2)).duration_days(), 1);
        assert_eq!(event(start, start + chrono::Duration::days(2)).duration_days(), 3);
    }

    #[test]
    fn test_happening_on_and_now() {
        let start = Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap();
        let ev = event(start, start + chrono::Duration::days(1));

        assert!(ev.is_happening_on(NaiveDate::from_ymd_opt(2026, 5, 2).unwrap()));
        assert!(!ev.is_happening_on(NaiveDate::from_ymd_opt(2026, 5, 3).unwrap()));
        assert!(ev.is_currently_happening(start + chrono::Duration::hours(1)));
        assert!(!ev.is_currently_happening(start - chrono::Duration::hours(1)));

        let mut draft = ev.clone();
        draft.status = EventStatus::Draft;
        assert!(!draft.is_currently_happening(start + chrono::Duration::hours(1)));
    }
}

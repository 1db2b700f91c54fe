//! Multi-day programme: event days, sessions and speakers.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Storage format for `NaiveTime` columns
pub const TIME_FORMAT: &str = "%H:%M:%S";
/// Storage format for `NaiveDate` columns
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EventDay {
    pub id: String,
    pub event_id: String,
    pub day_number: i64,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateEventDayRequest {
    pub day_number: i64,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateEventDayRequest {
    pub day_number: Option<i64>,
    pub date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Speaker {
    pub id: String,
    pub event_id: String,
    pub name: String,
    pub job_title: Option<String>,
    pub company: Option<String>,
    pub bio: Option<String>,
    pub photo_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSpeakerRequest {
    pub name: String,
    pub job_title: Option<String>,
    pub company: Option<String>,
    pub bio: Option<String>,
    pub photo_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateSpeakerRequest {
    pub name: Option<String>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub job_title: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub company: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub bio: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub photo_url: Option<Option<String>>,
}

/// One session of the programme
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Schedule {
    pub id: String,
    pub event_id: String,
    pub event_day_id: Option<String>,
    pub title: String,
    pub description: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub location: Option<String>,
    pub position: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Schedule {
    pub fn duration_minutes(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateScheduleRequest {
    pub event_day_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub location: Option<String>,
    #[serde(default)]
    pub position: i64,
    #[serde(default)]
    pub speaker_ids: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateScheduleRequest {
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub event_day_id: Option<Option<String>>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub location: Option<Option<String>>,
    pub position: Option<i64>,
    /// Replaces the speaker set when present
    pub speaker_ids: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct BulkScheduleRequest {
    pub schedules: Vec<CreateScheduleRequest>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleResponse {
    #[serde(flatten)]
    pub schedule: Schedule,
    pub duration_minutes: i64,
    pub speakers: Vec<Speaker>,
}

impl ScheduleResponse {
    pub fn new(schedule: Schedule, speakers: Vec<Speaker>) -> Self {
        Self {
            duration_minutes: schedule.duration_minutes(),
            schedule,
            speakers,
        }
    }
}

/// Row of the schedule/speaker join, used to batch-load session speakers
#[derive(Debug, Clone, FromRow)]
pub struct ScheduleSpeakerRow {
    pub schedule_id: String,
    #[sqlx(flatten)]
    pub speaker: Speaker,
}

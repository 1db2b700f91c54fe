//! Query-string filters for event listings.
//!
//! `EventFilter` turns listing parameters into a conjunction of SQL predicates
//! pushed onto a `QueryBuilder`. Only `location` matches with OR, across
//! the location and address columns.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::error::ApiError;
use crate::db::{
    cents_to_decimal, decimal_to_cents, page_window, Event, DATE_FORMAT, MAX_AMOUNT_CENTS,
};

/// Accepted `ordering` values (prefix with `-` for descending)
const ORDERING_FIELDS: [&str; 4] = ["title", "start_at", "end_at", "created_at"];

#[derive(Debug, Default, Clone, Deserialize)]
pub struct EventFilter {
    pub category: Option<String>,
    pub location: Option<String>,
    /// Events happening on this calendar date
    pub date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub status: Option<String>,
    pub is_multi_day: Option<bool>,
    pub happening_now: Option<bool>,
    pub search: Option<String>,
    pub ordering: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Bare pagination parameters for listings without filters
#[derive(Debug, Default, Clone, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Which events a listing may return before filters apply
#[derive(Debug, Clone, Copy)]
pub enum EventScope<'a> {
    /// Published events that have not ended as of `now`
    Catalog { now: &'a str },
    /// Every event of one organizer, any status
    OwnedBy(&'a str),
}

/// Escape LIKE wildcards and wrap for substring matching
fn like_pattern(value: &str) -> String {
    let escaped = value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn price_bound(value: Option<Decimal>, field: &str) -> Result<Option<i64>, ApiError> {
    match value {
        None => Ok(None),
        // No tier can cost more than the ceiling
        Some(amount) if amount > cents_to_decimal(MAX_AMOUNT_CENTS) => Ok(Some(MAX_AMOUNT_CENTS + 1)),
        Some(amount) => decimal_to_cents(amount).map(Some).ok_or_else(|| {
            ApiError::validation_field(field, "Enter a non-negative amount with at most two decimal places")
        }),
    }
}

impl EventFilter {
    /// SQL ORDER BY clause for the requested ordering
    pub fn order_clause(&self) -> Result<String, ApiError> {
        let raw = non_empty(&self.ordering).unwrap_or("start_at");
        let (field, direction) = match raw.strip_prefix('-') {
            Some(field) => (field, "DESC"),
            None => (raw, "ASC"),
        };
        if !ORDERING_FIELDS.contains(&field) {
            return Err(ApiError::validation_field(
                "ordering",
                format!(
                    "Invalid ordering '{}'. Must be one of: {} (prefix with - for descending)",
                    raw,
                    ORDERING_FIELDS.join(", ")
                ),
            ));
        }
        Ok(format!("e.{} {}, e.id ASC", field, direction))
    }

    /// Append ` AND <predicate>` for every filter that is set
    pub fn push_predicates(&self, qb: &mut QueryBuilder<'_, Sqlite>, now: &str) -> Result<(), ApiError> {
        if let Some(category) = non_empty(&self.category) {
            qb.push(" AND LOWER(e.category) = LOWER(")
                .push_bind(category.to_string())
                .push(")");
        }

        if let Some(location) = non_empty(&self.location) {
            let pattern = like_pattern(location);
            qb.push(" AND (e.location LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR e.address LIKE ")
                .push_bind(pattern)
                .push(" ESCAPE '\\')");
        }

        if let Some(date) = self.date {
            let day = date.format(DATE_FORMAT).to_string();
            qb.push(" AND date(e.start_at) <= ")
                .push_bind(day.clone())
                .push(" AND date(e.end_at) >= ")
                .push_bind(day);
        }

        if let Some(start) = self.start_date {
            qb.push(" AND date(e.end_at) >= ")
                .push_bind(start.format(DATE_FORMAT).to_string());
        }
        if let Some(end) = self.end_date {
            qb.push(" AND date(e.start_at) <= ")
                .push_bind(end.format(DATE_FORMAT).to_string());
        }

        let min_cents = price_bound(self.min_price, "min_price")?;
        let max_cents = price_bound(self.max_price, "max_price")?;
        if min_cents.is_some() || max_cents.is_some() {
            qb.push(" AND EXISTS (SELECT 1 FROM ticket_tiers t WHERE t.event_id = e.id");
            if let Some(min) = min_cents {
                qb.push(" AND t.price_cents >= ").push_bind(min);
            }
            if let Some(max) = max_cents {
                qb.push(" AND t.price_cents <= ").push_bind(max);
            }
            qb.push(")");
        }

        if let Some(status) = non_empty(&self.status) {
            qb.push(" AND LOWER(e.status) = LOWER(")
                .push_bind(status.to_string())
                .push(")");
        }

        if let Some(multi_day) = self.is_multi_day {
            qb.push(" AND e.is_multi_day = ").push_bind(multi_day);
        }

        if let Some(happening) = self.happening_now {
            qb.push(if happening { " AND (" } else { " AND NOT (" })
                .push("e.status = 'published' AND e.start_at <= ")
                .push_bind(now.to_string())
                .push(" AND e.end_at >= ")
                .push_bind(now.to_string())
                .push(")");
        }

        if let Some(search) = non_empty(&self.search) {
            let pattern = like_pattern(search);
            qb.push(" AND (");
            let mut columns = qb.separated(" OR ");
            for column in ["e.title", "e.description", "e.location", "e.category"] {
                columns
                    .push(format!("{} LIKE ", column))
                    .push_bind_unseparated(pattern.clone())
                    .push_unseparated(" ESCAPE '\\'");
            }
            qb.push(")");
        }

        Ok(())
    }
}

fn push_scope(qb: &mut QueryBuilder<'_, Sqlite>, scope: EventScope<'_>) {
    match scope {
        EventScope::Catalog { now } => {
            qb.push(" WHERE e.status = 'published' AND e.end_at >= ")
                .push_bind(now.to_string());
        }
        EventScope::OwnedBy(organizer_id) => {
            qb.push(" WHERE e.organizer_id = ").push_bind(organizer_id.to_string());
        }
    }
}

/// One filtered, ordered page of events plus the unpaginated total
pub struct EventPage {
    pub events: Vec<Event>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

pub async fn fetch_events(
    pool: &SqlitePool,
    filter: &EventFilter,
    scope: EventScope<'_>,
    now: &str,
) -> Result<EventPage, ApiError> {
    let order = filter.order_clause()?;
    let (page, per_page, offset) = page_window(filter.page, filter.per_page);

    let mut count_qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM events e");
    push_scope(&mut count_qb, scope);
    filter.push_predicates(&mut count_qb, now)?;
    let (total,): (i64,) = count_qb.build_query_as().fetch_one(pool).await?;

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT e.* FROM events e");
    push_scope(&mut qb, scope);
    filter.push_predicates(&mut qb, now)?;
    qb.push(" ORDER BY ")
        .push(order)
        .push(" LIMIT ")
        .push_bind(per_page)
        .push(" OFFSET ")
        .push_bind(offset);
    let events: Vec<Event> = qb.build_query_as().fetch_all(pool).await?;

    Ok(EventPage {
        events,
        total,
        page,
        per_page,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: &str = "2026-06-01T12:00:00.000Z";

    fn sql(filter: &EventFilter) -> String {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT e.* FROM events e WHERE 1 = 1");
        filter.push_predicates(&mut qb, NOW).unwrap();
        qb.sql().to_string()
    }

    #[test]
    fn test_empty_filter_adds_nothing() {
        assert_eq!(sql(&EventFilter::default()), "SELECT e.* FROM events e WHERE 1 = 1");
    }

    #[test]
    fn test_location_is_the_only_or() {
        let filter = EventFilter {
            location: Some("Accra".into()),
            category: Some("Music".into()),
            ..Default::default()
        };
        let sql = sql(&filter);
        assert!(sql.contains("LOWER(e.category) = LOWER(?)"));
        assert!(sql.contains("(e.location LIKE ? ESCAPE '\\' OR e.address LIKE ? ESCAPE '\\')"));
        assert_eq!(sql.matches(" OR ").count(), 1);
    }

    #[test]
    fn test_price_bounds_share_one_tier() {
        let filter = EventFilter {
            min_price: Some(Decimal::new(1000, 2)),
            max_price: Some(Decimal::new(5000, 2)),
            ..Default::default()
        };
        let sql = sql(&filter);
        assert_eq!(sql.matches("EXISTS").count(), 1);
        assert!(sql.contains("t.price_cents >= ? AND t.price_cents <= ?"));
    }

    #[test]
    fn test_negative_price_rejected() {
        let filter = EventFilter {
            min_price: Some(Decimal::new(-100, 2)),
            ..Default::default()
        };
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT 1");
        assert!(filter.push_predicates(&mut qb, NOW).is_err());
    }

    #[test]
    fn test_happening_now_negation() {
        let on = sql(&EventFilter {
            happening_now: Some(true),
            ..Default::default()
        });
        let off = sql(&EventFilter {
            happening_now: Some(false),
            ..Default::default()
        });
        assert!(on.contains(" AND (e.status = 'published'"));
        assert!(off.contains(" AND NOT (e.status = 'published'"));
    }

    #[test]
    fn test_search_covers_four_columns() {
        let sql = sql(&EventFilter {
            search: Some("jazz".into()),
            ..Default::default()
        });
        assert!(sql.contains(
            "(e.title LIKE ? ESCAPE '\\' OR e.description LIKE ? ESCAPE '\\' OR e.location LIKE ? ESCAPE '\\' OR e.category LIKE ? ESCAPE '\\')"
        ));
    }

    #[test]
    fn test_ordering_whitelist() {
        let ordering = |v: &str| EventFilter {
            ordering: Some(v.into()),
            ..Default::default()
        };
        assert_eq!(EventFilter::default().order_clause().unwrap(), "e.start_at ASC, e.id ASC");
        assert_eq!(ordering("-created_at").order_clause().unwrap(), "e.created_at DESC, e.id ASC");
        assert_eq!(ordering("title").order_clause().unwrap(), "e.title ASC, e.id ASC");
        assert!(ordering("password_hash").order_clause().is_err());
        assert!(ordering("start_at; DROP TABLE events").order_clause().is_err());
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}

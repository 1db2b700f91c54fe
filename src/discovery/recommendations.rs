//! Category-affinity recommendations with a soonest-first fallback.

use std::collections::HashSet;

use crate::db::{Event, EventCategory};

pub const RECOMMENDATION_LIMIT: usize = 10;

/// What a user has engaged with: events they hold live tickets for or saved
#[derive(Debug, Clone, Default)]
pub struct History {
    pub event_ids: HashSet<String>,
    pub categories: HashSet<EventCategory>,
}

impl History {
    pub fn is_empty(&self) -> bool {
        self.event_ids.is_empty()
    }
}

/// Pick up to `limit` events from `candidates`, which must already be in
/// start order.
///
/// Events in a category the user engaged with, and not already in their
/// history, come first. With no history, or nothing matching, the soonest
/// candidates are returned instead.
pub fn recommend(history: &History, candidates: Vec<Event>, limit: usize) -> Vec<Event> {
    if !history.is_empty() {
        let matching: Vec<Event> = candidates
            .iter()
            .filter(|e| history.categories.contains(&e.category) && !history.event_ids.contains(&e.id))
            .take(limit)
            .cloned()
            .collect();
        if !matching.is_empty() {
            return matching;
        }
    }

    candidates.into_iter().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::EventStatus;
    use chrono::{Duration, Utc};

    fn events(categories: &[EventCategory]) -> Vec<Event> {
        let base = Utc::now() + Duration::days(1);
        categories
            .iter()
            .enumerate()
            .map(|(i, category)| {
                let start = base + Duration::hours(i as i64);
                Event {
                    id: format!("e{}", i),
                    organizer_id: "o".into(),
                    title: format!("Event {}", i),
                    description: String::new(),
                    category: *category,
                    image_url: None,
                    location: "Lagos".into(),
                    address: None,
                    latitude: None,
                    longitude: None,
                    start_at: start,
                    end_at: start + Duration::hours(2),
                    is_multi_day: false,
                    status: EventStatus::Published,
                    created_at: start,
                    updated_at: start,
                }
            })
            .collect()
    }

    fn ids(events: &[Event]) -> Vec<&str> {
        events.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn test_cold_start_returns_soonest() {
        let candidates = events(&[EventCategory::Music; 15]);
        let picked = recommend(&History::default(), candidates, RECOMMENDATION_LIMIT);
        assert_eq!(picked.len(), 10);
        assert_eq!(picked[0].id, "e0");
        assert_eq!(picked[9].id, "e9");
    }

    #[test]
    fn test_matches_history_categories_and_skips_seen() {
        use EventCategory::*;
        let candidates = events(&[Music, Tech, Music, Sports, Tech]);
        let history = History {
            event_ids: ["e1".to_string()].into_iter().collect(),
            categories: [Tech].into_iter().collect(),
        };

        let picked = recommend(&history, candidates, RECOMMENDATION_LIMIT);
        assert_eq!(ids(&picked), vec!["e4"]);
    }

    #[test]
    fn test_falls_back_when_nothing_matches() {
        use EventCategory::*;
        let candidates = events(&[Music, Sports, Festival]);
        let history = History {
            event_ids: ["past".to_string()].into_iter().collect(),
            categories: [Theater].into_iter().collect(),
        };

        let picked = recommend(&history, candidates, 2);
        assert_eq!(ids(&picked), vec!["e0", "e1"]);
    }
}

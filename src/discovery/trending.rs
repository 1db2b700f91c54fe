//! Engagement-based trending ranking.
//!
//! A recent sale weighs twice as much as a recent save. Events below
//! [`MIN_SCORE`] never trend.

use chrono::{DateTime, Duration, Utc};

/// Engagement lookback window in hours
pub const WINDOW_HOURS: i64 = 72;
/// Minimum score to appear in the trending list
pub const MIN_SCORE: i64 = 5;
/// Length of the trending list
pub const TRENDING_LIMIT: usize = 10;
/// Upper bound on candidate rows loaded per request
pub const CANDIDATE_LIMIT: i64 = 500;

pub const TICKET_WEIGHT: i64 = 2;
pub const SAVE_WEIGHT: i64 = 1;

/// Start of the engagement window for a given instant
pub fn window_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::hours(WINDOW_HOURS)
}

/// Recent activity counted for one candidate event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Engagement {
    pub event_id: String,
    pub start_at: DateTime<Utc>,
    pub recent_tickets: i64,
    pub recent_saves: i64,
}

impl Engagement {
    pub fn score(&self) -> i64 {
        TICKET_WEIGHT * self.recent_tickets + SAVE_WEIGHT * self.recent_saves
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ranked {
    pub event_id: String,
    pub score: i64,
}

/// Drop events under the threshold, order by score (desc), then start
/// (asc), then id, and keep the top [`TRENDING_LIMIT`].
pub fn rank(candidates: Vec<Engagement>) -> Vec<Ranked> {
    let mut scored: Vec<(i64, Engagement)> = candidates
        .into_iter()
        .map(|e| (e.score(), e))
        .filter(|(score, _)| *score >= MIN_SCORE)
        .collect();

    scored.sort_by(|(sa, a), (sb, b)| {
        sb.cmp(sa)
            .then(a.start_at.cmp(&b.start_at))
            .then_with(|| a.event_id.cmp(&b.event_id))
    });
    scored.truncate(TRENDING_LIMIT);

    scored
        .into_iter()
        .map(|(score, e)| Ranked {
            event_id: e.event_id,
            score,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn engagement(id: &str, tickets: i64, saves: i64) -> Engagement {
        Engagement {
            event_id: id.to_string(),
            start_at: Utc.with_ymd_and_hms(2026, 6, 1, 18, 0, 0).unwrap(),
            recent_tickets: tickets,
            recent_saves: saves,
        }
    }

    #[test]
    fn test_threshold_excludes_low_scores() {
        let ranked = rank(vec![
            engagement("a", 2, 0),
            engagement("b", 2, 1),
            engagement("c", 0, 5),
        ]);
        let ids: Vec<&str> = ranked.iter().map(|r| r.event_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn test_tie_breaks_on_start_then_id() {
        let mut later = engagement("a", 3, 0);
        later.start_at = later.start_at + Duration::days(1);
        let ranked = rank(vec![later, engagement("z", 3, 0), engagement("m", 3, 0)]);
        let ids: Vec<&str> = ranked.iter().map(|r| r.event_id.as_str()).collect();
        assert_eq!(ids, vec!["m", "z", "a"]);
    }

    #[test]
    fn test_truncates_to_limit() {
        let candidates = (0..25).map(|i| engagement(&format!("e{:02}", i), 3 + i, 0)).collect();
        let ranked = rank(candidates);
        assert_eq!(ranked.len(), TRENDING_LIMIT);
        assert_eq!(ranked[0].event_id, "e24");
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_window_start() {
        let now = Utc.with_ymd_and_hms(2026, 6, 4, 12, 0, 0).unwrap();
        assert_eq!(window_start(now), Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap());
    }

    proptest! {
        #[test]
        fn sale_adds_two_and_save_adds_one(tickets in 0_i64..10_000, saves in 0_i64..10_000) {
            let base = engagement("x", tickets, saves);
            prop_assert_eq!(engagement("x", tickets + 1, saves).score(), base.score() + 2);
            prop_assert_eq!(engagement("x", tickets, saves + 1).score(), base.score() + 1);
        }

        #[test]
        fn ranked_scores_meet_threshold(counts in proptest::collection::vec((0_i64..6, 0_i64..6), 0..40)) {
            let candidates = counts
                .iter()
                .enumerate()
                .map(|(i, (t, s))| engagement(&format!("e{}", i), *t, *s))
                .collect();
            let ranked = rank(candidates);
            prop_assert!(ranked.len() <= TRENDING_LIMIT);
            prop_assert!(ranked.iter().all(|r| r.score >= MIN_SCORE));
        }
    }
}

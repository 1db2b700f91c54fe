use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Upcoming items grouped into nested time horizons.
///
/// `next_24_hours` ⊆ `next_week` ⊆ `next_month` ⊆ `all`, each in start order.
#[derive(Debug, Clone, Serialize)]
pub struct UpcomingBuckets<T> {
    pub next_24_hours: Vec<T>,
    pub next_week: Vec<T>,
    pub next_month: Vec<T>,
    pub all: Vec<T>,
}

impl<T: Clone> UpcomingBuckets<T> {
    /// Items that started before `now` are dropped.
    pub fn partition<F>(items: Vec<T>, start_of: F, now: DateTime<Utc>) -> Self
    where
        F: Fn(&T) -> DateTime<Utc>,
    {
        let mut all: Vec<T> = items.into_iter().filter(|i| start_of(i) >= now).collect();
        all.sort_by_key(|i| start_of(i));

        let within = |horizon: Duration| -> Vec<T> {
            let limit = now + horizon;
            all.iter().filter(|i| start_of(i) <= limit).cloned().collect()
        };

        Self {
            next_24_hours: within(Duration::hours(24)),
            next_week: within(Duration::days(7)),
            next_month: within(Duration::days(30)),
            all: all.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_bucket_edges() {
        let items = vec![
            now() + Duration::hours(24),
            now() + Duration::hours(25),
            now() + Duration::days(7),
            now() + Duration::days(30),
            now() + Duration::days(31),
            now() - Duration::minutes(1),
        ];
        let buckets = UpcomingBuckets::partition(items, |t| *t, now());

        assert_eq!(buckets.next_24_hours.len(), 1);
        assert_eq!(buckets.next_week.len(), 3);
        assert_eq!(buckets.next_month.len(), 4);
        assert_eq!(buckets.all.len(), 5);
    }

    #[test]
    fn test_buckets_keep_start_order() {
        let items = vec![now() + Duration::hours(5), now() + Duration::hours(1)];
        let buckets = UpcomingBuckets::partition(items, |t| *t, now());
        assert_eq!(buckets.next_24_hours[0], now() + Duration::hours(1));
    }

    proptest! {
        #[test]
        fn buckets_are_nested(offsets in proptest::collection::vec(-1_000_i64..100_000, 0..60)) {
            let items: Vec<(usize, DateTime<Utc>)> = offsets
                .iter()
                .enumerate()
                .map(|(i, m)| (i, now() + Duration::minutes(*m)))
                .collect();
            let b = UpcomingBuckets::partition(items, |(_, t)| *t, now());

            let contains = |outer: &[(usize, DateTime<Utc>)], inner: &[(usize, DateTime<Utc>)]| {
                inner.iter().all(|i| outer.contains(i))
            };
            prop_assert!(contains(&b.next_week, &b.next_24_hours));
            prop_assert!(contains(&b.next_month, &b.next_week));
            prop_assert!(contains(&b.all, &b.next_month));
            prop_assert!(b.all.iter().all(|(_, t)| *t >= now()));
        }
    }
}

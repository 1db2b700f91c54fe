use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::common::cents_to_decimal;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Coupon {
    pub id: String,
    pub event_id: String,
    pub code: String,
    pub discount_percentage: i64,
    pub fixed_amount_cents: Option<i64>,
    pub active: bool,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub usage_limit: i64,
    pub times_used: i64,
    pub created_at: DateTime<Utc>,
}

impl Coupon {
    /// Active, inside its validity window, and not used up
    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        self.active
            && self.valid_from <= now
            && now <= self.valid_to
            && self.times_used < self.usage_limit
    }

    /// Apply the discount to a subtotal in cents.
    ///
    /// A fixed amount takes precedence over the percentage. The result never
    /// drops below zero.
    pub fn apply(&self, subtotal_cents: i64) -> i64 {
        let discount = match self.fixed_amount_cents {
            Some(fixed) => fixed,
            None => {
                let percentage = i128::from(self.discount_percentage.clamp(0, 100));
                // at most `subtotal_cents`, so it fits back into i64
                (i128::from(subtotal_cents) * percentage / 100) as i64
            }
        };
        subtotal_cents.saturating_sub(discount).max(0)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateCouponRequest {
    pub code: String,
    #[serde(default)]
    pub discount_percentage: i64,
    pub fixed_amount: Option<Decimal>,
    #[serde(default = "default_active")]
    pub active: bool,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    #[serde(default = "default_usage_limit")]
    pub usage_limit: i64,
}

fn default_active() -> bool {
    true
}

fn default_usage_limit() -> i64 {
    100
}

#[derive(Debug, Clone, Serialize)]
pub struct CouponResponse {
    pub id: String,
    pub event_id: String,
    pub code: String,
    pub discount_percentage: i64,
    pub fixed_amount: Option<Decimal>,
    pub active: bool,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub usage_limit: i64,
    pub times_used: i64,
}

impl From<Coupon> for CouponResponse {
    fn from(c: Coupon) -> Self {
        Self {
            fixed_amount: c.fixed_amount_cents.map(cents_to_decimal),
            id: c.id,
            event_id: c.event_id,
            code: c.code,
            discount_percentage: c.discount_percentage,
            active: c.active,
            valid_from: c.valid_from,
            valid_to: c.valid_to,
            usage_limit: c.usage_limit,
            times_used: c.times_used,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn coupon(percentage: i64, fixed: Option<i64>) -> Coupon {
        let now = Utc::now();
        Coupon {
            id: "c1".into(),
            event_id: "e1".into(),
            code: "EARLY".into(),
            discount_percentage: percentage,
            fixed_amount_cents: fixed,
            active: true,
            valid_from: now - Duration::days(1),
            valid_to: now + Duration::days(1),
            usage_limit: 2,
            times_used: 0,
            created_at: now,
        }
    }

    #[test]
    fn test_percentage_discount() {
        assert_eq!(coupon(10, None).apply(5000), 4500);
        assert_eq!(coupon(0, None).apply(5000), 5000);
        assert_eq!(coupon(100, None).apply(5000), 0);
    }

    #[test]
    fn test_fixed_amount_wins_and_clamps_at_zero() {
        assert_eq!(coupon(50, Some(500)).apply(5000), 4500);
        assert_eq!(coupon(0, Some(9000)).apply(5000), 0);
    }

    #[test]
    fn test_discount_on_largest_subtotal() {
        assert_eq!(coupon(50, None).apply(i64::MAX), i64::MAX - i64::MAX / 2);
        assert_eq!(coupon(100, None).apply(i64::MAX), 0);
        assert_eq!(coupon(0, Some(i64::MAX)).apply(1), 0);
    }

    #[test]
    fn test_redeemable_window_and_limit() {
        let now = Utc::now();
        let c = coupon(10, None);
        assert!(c.is_redeemable(now));

        let mut used_up = c.clone();
        used_up.times_used = 2;
        assert!(!used_up.is_redeemable(now));

        let mut inactive = c.clone();
        inactive.active = false;
        assert!(!inactive.is_redeemable(now));

        assert!(!c.is_redeemable(now + Duration::days(2)));
    }
}

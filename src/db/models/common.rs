//! Shared pagination and money helpers.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PER_PAGE: i64 = 20;
pub const MAX_PER_PAGE: i64 = 100;
/// Highest page number honoured; larger values read past every row anyway
pub const MAX_PAGE: i64 = 100_000;
/// Largest accepted price or fixed discount: 1,000,000.00
pub const MAX_AMOUNT_CENTS: i64 = 100_000_000;

/// One page of a listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, total: i64, page: i64, per_page: i64) -> Self {
        let total_pages = if total == 0 {
            0
        } else {
            (total + per_page - 1) / per_page
        };
        Self {
            items,
            total,
            page,
            per_page,
            total_pages,
        }
    }
}

/// Clamp raw `page`/`per_page` query values and compute the row offset.
pub fn page_window(page: Option<i64>, per_page: Option<i64>) -> (i64, i64, i64) {
    let page = page.unwrap_or(1).clamp(1, MAX_PAGE);
    let per_page = per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);
    (page, per_page, (page - 1) * per_page)
}

/// Money column value (integer cents) as a two-place decimal
pub fn cents_to_decimal(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

/// Convert a decimal amount to cents. Returns `None` for negative values,
/// more than two fractional digits, or amounts above [`MAX_AMOUNT_CENTS`].
pub fn decimal_to_cents(amount: Decimal) -> Option<i64> {
    if amount.is_sign_negative() || amount.normalize().scale() > 2 {
        return None;
    }
    amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|cents| cents.to_i64())
        .filter(|cents| *cents <= MAX_AMOUNT_CENTS)
}

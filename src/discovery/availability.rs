//! Availability and price aggregation across an event's ticket tiers.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::db::{cents_to_decimal, TicketTier};

/// Derived per-event totals, computed at read time and never stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TierSummary {
    pub available_tickets: i64,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
}

impl TierSummary {
    pub fn from_tiers(tiers: &[TicketTier]) -> Self {
        let available_tickets = tiers.iter().map(|t| t.available_tickets).sum();
        let min_price = tiers.iter().map(|t| t.price_cents).min().map(cents_to_decimal);
        let max_price = tiers.iter().map(|t| t.price_cents).max().map(cents_to_decimal);

        Self {
            available_tickets,
            min_price,
            max_price,
        }
    }

    pub fn is_sold_out(&self) -> bool {
        self.available_tickets == 0
    }
}

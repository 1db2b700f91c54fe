use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::common::cents_to_decimal;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketTier {
    pub id: String,
    pub event_id: String,
    pub name: String,
    pub price_cents: i64,
    pub total_tickets: i64,
    pub available_tickets: i64,
    pub sales_start: DateTime<Utc>,
    pub sales_end: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TicketTier {
    pub fn price(&self) -> Decimal {
        cents_to_decimal(self.price_cents)
    }

    pub fn tickets_sold(&self) -> i64 {
        self.total_tickets - self.available_tickets
    }

    pub fn is_on_sale(&self, now: DateTime<Utc>) -> bool {
        self.sales_start <= now && now <= self.sales_end
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTicketTierRequest {
    pub name: String,
    pub price: Decimal,
    pub total_tickets: i64,
    /// Defaults to `total_tickets`
    pub available_tickets: Option<i64>,
    pub sales_start: DateTime<Utc>,
    pub sales_end: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateTicketTierRequest {
    pub name: Option<String>,
    pub price: Option<Decimal>,
    pub total_tickets: Option<i64>,
    pub available_tickets: Option<i64>,
    pub sales_start: Option<DateTime<Utc>>,
    pub sales_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TicketTierResponse {
    pub id: String,
    pub event_id: String,
    pub name: String,
    pub price: Decimal,
    pub total_tickets: i64,
    pub available_tickets: i64,
    pub tickets_sold: i64,
    pub sales_start: DateTime<Utc>,
    pub sales_end: DateTime<Utc>,
}

impl From<TicketTier> for TicketTierResponse {
    fn from(tier: TicketTier) -> Self {
        Self {
            price: tier.price(),
            tickets_sold: tier.tickets_sold(),
            id: tier.id,
            event_id: tier.event_id,
            name: tier.name,
            total_tickets: tier.total_tickets,
            available_tickets: tier.available_tickets,
            sales_start: tier.sales_start,
            sales_end: tier.sales_end,
        }
    }
}

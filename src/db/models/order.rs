//! Orders, tickets and saved events.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::common::cents_to_decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Paid,
    Cancelled,
    Expired,
}

impl OrderStatus {
    /// pending -> {paid, cancelled, expired}, paid -> {cancelled, expired}.
    /// cancelled and expired are terminal.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Paid) | (Pending, Cancelled) | (Pending, Expired) | (Paid, Cancelled) | (Paid, Expired)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Expired => "expired",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum TicketStatus {
    #[default]
    Unused,
    Used,
    Cancelled,
}

impl TicketStatus {
    /// unused -> {used, cancelled}, used -> cancelled. cancelled is terminal.
    pub fn can_transition_to(self, next: TicketStatus) -> bool {
        use TicketStatus::*;
        matches!(
            (self, next),
            (Unused, Used) | (Unused, Cancelled) | (Used, Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Unused => "unused",
            TicketStatus::Used => "used",
            TicketStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub event_id: String,
    pub ticket_tier_id: String,
    pub quantity: i64,
    pub coupon_id: Option<String>,
    pub total_amount_cents: i64,
    pub transaction_id: Option<String>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: String,
    pub order_id: String,
    pub event_id: String,
    pub user_id: String,
    pub ticket_tier_id: String,
    pub scan_code: String,
    pub status: TicketStatus,
    pub used_at: Option<DateTime<Utc>>,
    pub attendee_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SavedEvent {
    pub id: String,
    pub user_id: String,
    pub event_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    pub ticket_tier_id: String,
    pub quantity: i64,
    pub coupon_code: Option<String>,
    pub attendee_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PayOrderRequest {
    pub payment_reference: String,
}

#[derive(Debug, Deserialize)]
pub struct SaveEventRequest {
    pub event_id: String,
}

#[derive(Debug, Serialize)]
pub struct SaveToggleResponse {
    pub status: &'static str,
    pub event_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckInRequest {
    pub scan_code: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub event_id: String,
    pub ticket_tier_id: String,
    pub quantity: i64,
    pub coupon_id: Option<String>,
    pub total_amount: Decimal,
    pub transaction_id: Option<String>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub tickets: Vec<Ticket>,
}

impl OrderResponse {
    pub fn new(order: Order, tickets: Vec<Ticket>) -> Self {
        Self {
            total_amount: cents_to_decimal(order.total_amount_cents),
            id: order.id,
            event_id: order.event_id,
            ticket_tier_id: order.ticket_tier_id,
            quantity: order.quantity,
            coupon_id: order.coupon_id,
            transaction_id: order.transaction_id,
            status: order.status,
            created_at: order.created_at,
            updated_at: order.updated_at,
            tickets,
        }
    }
}

/// Attendee list row for organizers
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AttendeeRow {
    pub ticket_id: String,
    pub scan_code: String,
    pub ticket_status: TicketStatus,
    pub used_at: Option<DateTime<Utc>>,
    pub attendee_name: Option<String>,
    pub tier_name: String,
    pub order_id: String,
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub purchased_at: DateTime<Utc>,
}

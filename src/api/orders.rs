//! Order lifecycle: listing, payment and cancellation.

use axum::{
    extract::{Path, State},
    Json,
};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;

use crate::db::{self, Order, OrderResponse, OrderStatus, PayOrderRequest, Ticket, User};
use crate::AppState;

use super::error::{ApiError, ApiJson, ValidationErrorBuilder};

pub async fn tickets_by_order(
    pool: &SqlitePool,
    order_ids: &[String],
) -> Result<HashMap<String, Vec<Ticket>>, sqlx::Error> {
    let mut grouped: HashMap<String, Vec<Ticket>> = HashMap::new();
    if order_ids.is_empty() {
        return Ok(grouped);
    }
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM tickets WHERE order_id IN (");
    let mut list = qb.separated(", ");
    for id in order_ids {
        list.push_bind(id.as_str());
    }
    qb.push(") ORDER BY created_at ASC, id ASC");

    let tickets: Vec<Ticket> = qb.build_query_as().fetch_all(pool).await?;
    for ticket in tickets {
        grouped.entry(ticket.order_id.clone()).or_default().push(ticket);
    }
    Ok(grouped)
}

pub async fn order_response(pool: &SqlitePool, order: Order) -> Result<OrderResponse, sqlx::Error> {
    let mut tickets = tickets_by_order(pool, &[order.id.clone()]).await?;
    let order_tickets = tickets.remove(&order.id).unwrap_or_default();
    Ok(OrderResponse::new(order, order_tickets))
}

/// Load one of the caller's orders. Other users' orders read as missing.
async fn own_order(conn: &mut SqliteConnection, user: &User, id: &str) -> Result<Order, ApiError> {
    let order: Option<Order> = sqlx::query_as("SELECT * FROM orders WHERE id = ? AND user_id = ?")
        .bind(id)
        .bind(&user.id)
        .fetch_optional(conn)
        .await?;
    order.ok_or_else(|| ApiError::not_found("Order not found"))
}

fn check_transition(order: &Order, next: OrderStatus) -> Result<(), ApiError> {
    if order.status.can_transition_to(next) {
        Ok(())
    } else {
        Err(ApiError::conflict(format!(
            "Cannot change order from {} to {}",
            order.status, next
        )))
    }
}

/// Move an order between states, guarded on its current state.
///
/// Zero rows affected means another request changed the order first.
async fn transition(
    conn: &mut SqliteConnection,
    order: &Order,
    next: OrderStatus,
    transaction_id: Option<&str>,
) -> Result<(), ApiError> {
    let result = sqlx::query(
        r#"
        UPDATE orders
        SET status = ?, transaction_id = COALESCE(?, transaction_id), updated_at = ?
        WHERE id = ? AND status = ?
        "#,
    )
    .bind(next)
    .bind(transaction_id)
    .bind(db::now())
    .bind(&order.id)
    .bind(order.status)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::conflict("Order was modified by another request"));
    }
    Ok(())
}

/// Caller's orders, newest first
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders: Vec<Order> = sqlx::query_as(
        "SELECT * FROM orders WHERE user_id = ? ORDER BY created_at DESC, id ASC",
    )
    .bind(&user.id)
    .fetch_all(&state.db)
    .await?;

    let ids: Vec<String> = orders.iter().map(|o| o.id.clone()).collect();
    let mut tickets = tickets_by_order(&state.db, &ids).await?;

    let items = orders
        .into_iter()
        .map(|order| {
            let order_tickets = tickets.remove(&order.id).unwrap_or_default();
            OrderResponse::new(order, order_tickets)
        })
        .collect();
    Ok(Json(items))
}

/// Record payment: pending -> paid
pub async fn pay_order(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<PayOrderRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let reference = request.payment_reference.trim();
    let mut errors = ValidationErrorBuilder::new();
    if reference.is_empty() {
        errors.add("payment_reference", "Payment reference is required");
    } else if reference.len() > 255 {
        errors.add("payment_reference", "Payment reference is too long (max 255 characters)");
    }
    errors.finish()?;

    let mut conn = state.db.acquire().await?;
    let order = own_order(&mut conn, &user, &id).await?;
    check_transition(&order, OrderStatus::Paid)?;
    transition(&mut conn, &order, OrderStatus::Paid, Some(reference)).await?;
    let order = own_order(&mut conn, &user, &id).await?;
    drop(conn);

    metrics::counter!(super::metrics::ORDERS_TOTAL, "status" => "paid").increment(1);
    tracing::info!(order_id = %order.id, user_id = %user.id, "Order paid");

    Ok(Json(order_response(&state.db, order).await?))
}

/// Cancel an order, its tickets, and return the seats to the tier
pub async fn cancel_order(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = {
        let mut conn = state.db.acquire().await?;
        own_order(&mut conn, &user, &id).await?
    };
    check_transition(&order, OrderStatus::Cancelled)?;

    // The guarded status write opens the transaction
    let mut tx = state.db.begin().await?;
    transition(&mut tx, &order, OrderStatus::Cancelled, None).await?;

    let now = db::now();
    sqlx::query("UPDATE tickets SET status = 'cancelled', updated_at = ? WHERE order_id = ? AND status != 'cancelled'")
        .bind(&now)
        .bind(&order.id)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        r#"
        UPDATE ticket_tiers
        SET available_tickets = MIN(total_tickets, available_tickets + ?), updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(order.quantity)
    .bind(&now)
    .bind(&order.ticket_tier_id)
    .execute(&mut *tx)
    .await?;

    if let Some(coupon_id) = &order.coupon_id {
        sqlx::query("UPDATE coupons SET times_used = MAX(0, times_used - 1) WHERE id = ?")
            .bind(coupon_id)
            .execute(&mut *tx)
            .await?;
    }

    let order = own_order(&mut tx, &user, &id).await?;
    tx.commit().await?;

    metrics::counter!(super::metrics::ORDERS_TOTAL, "status" => "cancelled").increment(1);
    tracing::info!(order_id = %order.id, user_id = %user.id, quantity = order.quantity, "Order cancelled");

    Ok(Json(order_response(&state.db, order).await?))
}

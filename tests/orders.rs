mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use serde_json::json;

use common::TestApp;
use ticketr::db::{self, UserRole};

struct Fixture {
    app: TestApp,
    organizer_token: String,
    buyer_token: String,
    event: String,
    tier: String,
}

async fn fixture(available: i64) -> Fixture {
    let app = TestApp::new().await;
    let (organizer, organizer_token) = app.user("host", UserRole::Organizer).await;
    let (_, buyer_token) = app.user("buyer", UserRole::Attendee).await;
    let event = app
        .event(&organizer, "Afrobeats Live", "music", "published", Duration::days(7), Duration::hours(5))
        .await;
    let tier = app.tier(&event, "Regular", 2500, available, available).await;
    Fixture {
        app,
        organizer_token,
        buyer_token,
        event,
        tier,
    }
}

#[tokio::test]
async fn test_purchase_creates_pending_order_and_tickets() {
    let f = fixture(10).await;

    let order = f.app.purchase(&f.buyer_token, &f.event, &f.tier, 3).await;
    assert_eq!(order["status"], "pending");
    assert_eq!(order["quantity"], 3);
    assert_eq!(order["total_amount"], "75.00");
    let tickets = order["tickets"].as_array().unwrap();
    assert_eq!(tickets.len(), 3);
    assert!(tickets.iter().all(|t| t["status"] == "unused"));
    assert_eq!(f.app.available_tickets(&f.tier).await, 7);

    let mine = f.app.get(&format!("/api/event/{}/ticket/", f.event), Some(&f.buyer_token)).await;
    assert_eq!(mine.status, StatusCode::OK);
    assert_eq!(mine.body.as_array().unwrap().len(), 3);

    let orders = f.app.get("/api/orders/", Some(&f.buyer_token)).await;
    assert_eq!(orders.body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_purchase_never_oversells() {
    let f = fixture(2).await;
    let uri = format!("/api/event/{}/purchase/", f.event);

    let too_many = f
        .app
        .post(&uri, Some(&f.buyer_token), json!({ "ticket_tier_id": f.tier, "quantity": 3 }))
        .await;
    assert_eq!(too_many.status, StatusCode::CONFLICT);
    assert_eq!(too_many.body["message"], "Not enough tickets available");
    assert_eq!(f.app.available_tickets(&f.tier).await, 2);

    f.app.purchase(&f.buyer_token, &f.event, &f.tier, 2).await;
    assert_eq!(f.app.available_tickets(&f.tier).await, 0);

    let sold_out = f
        .app
        .post(&uri, Some(&f.buyer_token), json!({ "ticket_tier_id": f.tier, "quantity": 1 }))
        .await;
    assert_eq!(sold_out.status, StatusCode::CONFLICT);

    // Failed attempts leave no orders behind
    let orders = f.app.get("/api/orders/", Some(&f.buyer_token)).await;
    assert_eq!(orders.body.as_array().unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_tier_edit_racing_a_purchase_keeps_the_decrement() {
    let app = TestApp::on_disk().await;
    let (organizer, organizer_token) = app.user("host", UserRole::Organizer).await;
    let (_, buyer) = app.user("buyer", UserRole::Attendee).await;
    let (_, latecomer) = app.user("latecomer", UserRole::Attendee).await;
    let event = app
        .event(&organizer, "Sold Out Show", "music", "published", Duration::days(5), Duration::hours(3))
        .await;
    let purchase_uri = format!("/api/event/{}/purchase/", event);

    for round in 0..10 {
        let tier = app.tier(&event, &format!("Seats {}", round), 1000, 4, 4).await;

        let tier_uri = format!("/api/organizer/ticket-tiers/{}/", tier);
        let (renamed, bought) = tokio::join!(
            app.patch(
                &tier_uri,
                Some(&organizer_token),
                json!({ "name": format!("Front Row {}", round) }),
            ),
            app.post(&purchase_uri, Some(&buyer), json!({ "ticket_tier_id": tier, "quantity": 4 })),
        );
        assert_eq!(renamed.status, StatusCode::OK, "{}", renamed.body);
        assert_eq!(bought.status, StatusCode::CREATED, "{}", bought.body);
        assert_eq!(app.available_tickets(&tier).await, 0, "round {}", round);

        let second = app
            .post(&purchase_uri, Some(&latecomer), json!({ "ticket_tier_id": tier, "quantity": 4 }))
            .await;
        assert_eq!(second.status, StatusCode::CONFLICT);

        let (live,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM tickets WHERE ticket_tier_id = ? AND status != 'cancelled'",
        )
        .bind(&tier)
        .fetch_one(&app.state.db)
        .await
        .unwrap();
        assert_eq!(live, 4);
    }
}

#[tokio::test]
async fn test_tier_inventory_edits_respect_sold_tickets() {
    let f = fixture(10).await;
    let tier_uri = format!("/api/organizer/ticket-tiers/{}/", f.tier);

    // Shrinking the total below what was sold is refused
    f.app.purchase(&f.buyer_token, &f.event, &f.tier, 6).await;
    let too_small = f
        .app
        .patch(&tier_uri, Some(&f.organizer_token), json!({ "total_tickets": 5 }))
        .await;
    assert_eq!(too_small.status, StatusCode::BAD_REQUEST);
    assert_eq!(f.app.available_tickets(&f.tier).await, 4);

    let restocked = f
        .app
        .patch(&tier_uri, Some(&f.organizer_token), json!({ "available_tickets": 8 }))
        .await;
    assert_eq!(restocked.status, StatusCode::OK);
    assert_eq!(restocked.body["available_tickets"], 8);
}

#[tokio::test]
async fn test_purchase_validates_request() {
    let f = fixture(5).await;
    let uri = format!("/api/event/{}/purchase/", f.event);

    for quantity in [0, 11] {
        let response = f
            .app
            .post(&uri, Some(&f.buyer_token), json!({ "ticket_tier_id": f.tier, "quantity": quantity }))
            .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert!(response.body["details"].get("quantity").is_some());
    }

    let anonymous = f
        .app
        .post(&uri, None, json!({ "ticket_tier_id": f.tier, "quantity": 1 }))
        .await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let unknown_tier = f
        .app
        .post(
            &uri,
            Some(&f.buyer_token),
            json!({ "ticket_tier_id": uuid::Uuid::new_v4().to_string(), "quantity": 1 }),
        )
        .await;
    assert_eq!(unknown_tier.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_purchase_rejects_closed_sales_and_drafts() {
    let f = fixture(5).await;
    let (organizer, _) = f.app.user("other-host", UserRole::Organizer).await;

    sqlx::query("UPDATE ticket_tiers SET sales_end = ? WHERE id = ?")
        .bind(db::timestamp(Utc::now() - Duration::hours(1)))
        .bind(&f.tier)
        .execute(&f.app.state.db)
        .await
        .unwrap();
    let closed = f
        .app
        .post(
            &format!("/api/event/{}/purchase/", f.event),
            Some(&f.buyer_token),
            json!({ "ticket_tier_id": f.tier, "quantity": 1 }),
        )
        .await;
    assert_eq!(closed.status, StatusCode::BAD_REQUEST);
    assert!(closed.body["details"].get("ticket_tier_id").is_some());

    let draft = f
        .app
        .event(&organizer, "Unannounced", "music", "draft", Duration::days(3), Duration::hours(2))
        .await;
    let draft_tier = f.app.tier(&draft, "Regular", 1000, 5, 5).await;
    let hidden = f
        .app
        .post(
            &format!("/api/event/{}/purchase/", draft),
            Some(&f.buyer_token),
            json!({ "ticket_tier_id": draft_tier, "quantity": 1 }),
        )
        .await;
    assert_eq!(hidden.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_coupon_discounts_and_is_returned_on_cancel() {
    let f = fixture(10).await;
    let now = Utc::now();

    let coupon = f
        .app
        .post(
            &format!("/api/organizer/events/{}/coupons/", f.event),
            Some(&f.organizer_token),
            json!({
                "code": "early20",
                "discount_percentage": 20,
                "valid_from": now - Duration::days(1),
                "valid_to": now + Duration::days(1),
                "usage_limit": 1
            }),
        )
        .await;
    assert_eq!(coupon.status, StatusCode::CREATED, "{}", coupon.body);
    assert_eq!(coupon.body["code"], "EARLY20");

    let uri = format!("/api/event/{}/purchase/", f.event);
    let discounted = f
        .app
        .post(
            &uri,
            Some(&f.buyer_token),
            json!({ "ticket_tier_id": f.tier, "quantity": 2, "coupon_code": "early20" }),
        )
        .await;
    assert_eq!(discounted.status, StatusCode::CREATED);
    assert_eq!(discounted.body["total_amount"], "40.00");

    // Usage limit reached: the purchase fails and takes no inventory
    let exhausted = f
        .app
        .post(
            &uri,
            Some(&f.buyer_token),
            json!({ "ticket_tier_id": f.tier, "quantity": 1, "coupon_code": "EARLY20" }),
        )
        .await;
    assert_eq!(exhausted.status, StatusCode::BAD_REQUEST);
    assert!(exhausted.body["details"].get("coupon_code").is_some());
    assert_eq!(f.app.available_tickets(&f.tier).await, 8);

    let order_id = discounted.body["id"].as_str().unwrap();
    let cancelled = f
        .app
        .post(&format!("/api/orders/{}/cancel/", order_id), Some(&f.buyer_token), json!({}))
        .await;
    assert_eq!(cancelled.status, StatusCode::OK);

    let again = f
        .app
        .post(
            &uri,
            Some(&f.buyer_token),
            json!({ "ticket_tier_id": f.tier, "quantity": 1, "coupon_code": "EARLY20" }),
        )
        .await;
    assert_eq!(again.status, StatusCode::CREATED);
    assert_eq!(again.body["total_amount"], "20.00");
}

#[tokio::test]
async fn test_order_pay_and_cancel_transitions() {
    let f = fixture(5).await;
    let order = f.app.purchase(&f.buyer_token, &f.event, &f.tier, 2).await;
    let id = order["id"].as_str().unwrap();
    let pay_uri = format!("/api/orders/{}/pay/", id);
    let cancel_uri = format!("/api/orders/{}/cancel/", id);

    let missing_reference = f
        .app
        .post(&pay_uri, Some(&f.buyer_token), json!({ "payment_reference": "  " }))
        .await;
    assert_eq!(missing_reference.status, StatusCode::BAD_REQUEST);

    let paid = f
        .app
        .post(&pay_uri, Some(&f.buyer_token), json!({ "payment_reference": "PSK-1001" }))
        .await;
    assert_eq!(paid.status, StatusCode::OK);
    assert_eq!(paid.body["status"], "paid");
    assert_eq!(paid.body["transaction_id"], "PSK-1001");

    let paid_twice = f
        .app
        .post(&pay_uri, Some(&f.buyer_token), json!({ "payment_reference": "PSK-1002" }))
        .await;
    assert_eq!(paid_twice.status, StatusCode::CONFLICT);

    let cancelled = f.app.post(&cancel_uri, Some(&f.buyer_token), json!({})).await;
    assert_eq!(cancelled.status, StatusCode::OK);
    assert_eq!(cancelled.body["status"], "cancelled");
    assert!(cancelled.body["tickets"]
        .as_array()
        .unwrap()
        .iter()
        .all(|t| t["status"] == "cancelled"));
    assert_eq!(f.app.available_tickets(&f.tier).await, 5);

    let cancelled_twice = f.app.post(&cancel_uri, Some(&f.buyer_token), json!({})).await;
    assert_eq!(cancelled_twice.status, StatusCode::CONFLICT);
    assert_eq!(f.app.available_tickets(&f.tier).await, 5);

    let pay_cancelled = f
        .app
        .post(&pay_uri, Some(&f.buyer_token), json!({ "payment_reference": "PSK-1003" }))
        .await;
    assert_eq!(pay_cancelled.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_payment_reference_is_unique() {
    let f = fixture(5).await;
    let first = f.app.purchase(&f.buyer_token, &f.event, &f.tier, 1).await;
    let second = f.app.purchase(&f.buyer_token, &f.event, &f.tier, 1).await;

    for (order, status) in [(&first, StatusCode::OK), (&second, StatusCode::CONFLICT)] {
        let response = f
            .app
            .post(
                &format!("/api/orders/{}/pay/", order["id"].as_str().unwrap()),
                Some(&f.buyer_token),
                json!({ "payment_reference": "PSK-SAME" }),
            )
            .await;
        assert_eq!(response.status, status);
    }
}

#[tokio::test]
async fn test_other_users_orders_are_not_found() {
    let f = fixture(5).await;
    let (_, stranger) = f.app.user("stranger", UserRole::Attendee).await;
    let order = f.app.purchase(&f.buyer_token, &f.event, &f.tier, 1).await;
    let id = order["id"].as_str().unwrap();

    let pay = f
        .app
        .post(&format!("/api/orders/{}/pay/", id), Some(&stranger), json!({ "payment_reference": "X-1" }))
        .await;
    assert_eq!(pay.status, StatusCode::NOT_FOUND);

    let cancel = f
        .app
        .post(&format!("/api/orders/{}/cancel/", id), Some(&stranger), json!({}))
        .await;
    assert_eq!(cancel.status, StatusCode::NOT_FOUND);

    let listed = f.app.get("/api/orders/", Some(&stranger)).await;
    assert!(listed.body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_check_in_flow() {
    let f = fixture(5).await;
    let (_, rival_token) = f.app.user("rival", UserRole::Organizer).await;
    let order = f.app.purchase(&f.buyer_token, &f.event, &f.tier, 1).await;
    let scan_code = order["tickets"][0]["scan_code"].as_str().unwrap().to_string();
    let uri = format!("/api/organizer/events/{}/check-in/", f.event);

    // Unpaid orders cannot be admitted
    let unpaid = f
        .app
        .post(&uri, Some(&f.organizer_token), json!({ "scan_code": scan_code }))
        .await;
    assert_eq!(unpaid.status, StatusCode::CONFLICT);

    f.app
        .post(
            &format!("/api/orders/{}/pay/", order["id"].as_str().unwrap()),
            Some(&f.buyer_token),
            json!({ "payment_reference": "PSK-2001" }),
        )
        .await;

    let attendees = f
        .app
        .get(&format!("/api/organizer/events/{}/attendees/", f.event), Some(&f.organizer_token))
        .await;
    assert_eq!(attendees.status, StatusCode::OK);
    assert_eq!(attendees.body.as_array().unwrap().len(), 1);
    assert_eq!(attendees.body[0]["username"], "buyer");

    let not_owner = f.app.post(&uri, Some(&rival_token), json!({ "scan_code": scan_code })).await;
    assert_eq!(not_owner.status, StatusCode::FORBIDDEN);

    let attendee = f.app.post(&uri, Some(&f.buyer_token), json!({ "scan_code": scan_code })).await;
    assert_eq!(attendee.status, StatusCode::FORBIDDEN);
    assert_eq!(attendee.body["message"], "Only organizers can perform this action.");

    let admitted = f
        .app
        .post(&uri, Some(&f.organizer_token), json!({ "scan_code": scan_code }))
        .await;
    assert_eq!(admitted.status, StatusCode::OK);
    assert_eq!(admitted.body["status"], "used");
    assert!(admitted.body["used_at"].is_string());

    let again = f
        .app
        .post(&uri, Some(&f.organizer_token), json!({ "scan_code": scan_code }))
        .await;
    assert_eq!(again.status, StatusCode::CONFLICT);

    let unknown = f
        .app
        .post(&uri, Some(&f.organizer_token), json!({ "scan_code": "no-such-code" }))
        .await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
}

mod attendee;
pub mod auth;
mod coupons;
pub mod error;
mod events;
mod filters;
pub mod metrics;
mod orders;
mod organizer;
pub mod permissions;
pub mod rate_limit;
mod schedules;
mod serializers;
mod speakers;
mod tiers;
pub mod validation;

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::map_response_body::MapResponseBodyLayer;
use tower_http::trace::TraceLayer;

use crate::config::CorsConfig;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Credential endpoints (stricter rate tier)
    let auth_routes = Router::new()
        .route("/jwt/create", post(auth::login))
        .route("/jwt/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout))
        .route("/users/", post(auth::register))
        .route("/users/me/", get(auth::me).patch(auth::update_me))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_auth,
        ));

    let api_routes = Router::new()
        // Public catalog
        .route("/events/", get(events::list_events))
        .route("/events/upcoming/", get(events::upcoming_events))
        .route("/events/new/", get(events::new_events))
        .route("/events/trending/", get(events::trending_events))
        .route("/events/recommended/", get(events::recommended_events))
        .route("/event/:id/", get(events::get_event))
        .route("/event/:id/ticket-tiers/", get(events::event_ticket_tiers))
        // Attendee
        .route("/attendee/events/", get(attendee::my_upcoming_events))
        .route(
            "/events/saved/",
            get(attendee::list_saved).post(attendee::toggle_saved),
        )
        .route("/event/:id/ticket/", get(attendee::my_event_tickets))
        .route("/event/:id/purchase/", post(attendee::purchase))
        .route("/orders/", get(orders::list_orders))
        .route("/orders/:id/pay/", post(orders::pay_order))
        .route("/orders/:id/cancel/", post(orders::cancel_order))
        // Organizer events
        .route(
            "/organizer/events/",
            get(organizer::list_my_events).post(organizer::create_event),
        )
        .route(
            "/organizer/events/:id/",
            get(organizer::get_my_event)
                .patch(organizer::update_event)
                .delete(organizer::delete_event),
        )
        .route("/organizer/events/:id/attendees/", get(organizer::list_attendees))
        .route("/organizer/events/:id/check-in/", post(organizer::check_in))
        // Ticket tiers
        .route(
            "/organizer/events/:id/ticket-tiers/",
            get(tiers::list_tiers).post(tiers::create_tier),
        )
        .route(
            "/organizer/ticket-tiers/:id/",
            patch(tiers::update_tier).delete(tiers::delete_tier),
        )
        // Speakers
        .route(
            "/organizer/events/:id/speakers/",
            get(speakers::list_event_speakers).post(speakers::create_speaker),
        )
        .route(
            "/organizer/speakers/:id/",
            patch(speakers::update_speaker).delete(speakers::delete_speaker),
        )
        // Programme
        .route(
            "/organizer/events/:id/days/",
            get(schedules::list_event_days).post(schedules::create_event_day),
        )
        .route(
            "/organizer/days/:id/",
            patch(schedules::update_event_day).delete(schedules::delete_event_day),
        )
        .route(
            "/organizer/events/:id/schedules/",
            get(schedules::list_event_schedules).post(schedules::create_schedule),
        )
        .route(
            "/organizer/events/:id/schedules/bulk/",
            post(schedules::bulk_create_schedules),
        )
        .route(
            "/organizer/schedules/:id/",
            patch(schedules::update_schedule).delete(schedules::delete_schedule),
        )
        // Coupons
        .route(
            "/organizer/events/:id/coupons/",
            get(coupons::list_coupons).post(coupons::create_coupon),
        )
        .route(
            "/organizer/coupons/:id/",
            axum::routing::delete(coupons::delete_coupon),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_api,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::metrics_endpoint))
        .nest("/api/auth", auth_routes)
        .nest("/api", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(cors_layer(&state.config.cors))
                .layer(MapResponseBodyLayer::new(axum::body::Body::new))
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(metrics::metrics_middleware)),
        )
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

/// Browser access for the configured frontends. Cookies need credentialed
/// CORS, which cannot be combined with a wildcard origin, so an empty list
/// mirrors the caller's origin instead.
fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.trim().parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("CORS: Invalid origin '{}': {}", origin, e);
                None
            }
        })
        .collect();

    let allow_origin = if origins.is_empty() {
        tracing::warn!("CORS: No valid origins configured, mirroring request origin");
        AllowOrigin::mirror_request()
    } else {
        tracing::info!("CORS: Configured with {} allowed origin(s)", origins.len());
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .allow_credentials(true)
        .max_age(Duration::from_secs(86400))
}

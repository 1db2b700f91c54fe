//! Shared harness for HTTP-level tests: an in-memory database behind the
//! real router, plus fixtures inserted directly through the pool.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use chrono::{DateTime, Duration, Utc};
use http_body_util::BodyExt;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceExt;

use ticketr::api::auth::{issue_token, TokenType};
use ticketr::config::Config;
use ticketr::db::{self, User, UserRole};
use ticketr::AppState;

/// `hour`:00 UTC on the day `days` from today
pub fn day_at(days: i64, hour: u32) -> DateTime<Utc> {
    let date = (Utc::now() + Duration::days(days)).date_naive();
    date.and_hms_opt(hour, 0, 0).unwrap().and_utc()
}

pub struct TestApp {
    pub state: Arc<AppState>,
    router: Router,
    db_file: Option<PathBuf>,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        if let Some(path) = &self.db_file {
            for suffix in ["", "-wal", "-shm"] {
                let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
            }
        }
    }
}

pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl Response {
    /// Values of every `Set-Cookie` header
    pub fn set_cookies(&self) -> Vec<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok().map(str::to_string))
            .collect()
    }

    /// The `Set-Cookie` header for `name`
    pub fn cookie(&self, name: &str) -> Option<String> {
        let prefix = format!("{}=", name);
        self.set_cookies().into_iter().find(|c| c.starts_with(&prefix))
    }

    /// Just the value of the `name` cookie
    pub fn cookie_value(&self, name: &str) -> Option<String> {
        self.cookie(name).and_then(|c| {
            c.split(';')
                .next()
                .and_then(|pair| pair.split_once('='))
                .map(|(_, v)| v.to_string())
        })
    }
}

impl TestApp {
    pub async fn new() -> Self {
        let mut config = Config::default();
        config.rate_limit.enabled = false;
        Self::with_config(config).await
    }

    pub async fn with_config(config: Config) -> Self {
        let pool = db::init_in_memory().await.unwrap();
        Self::from_pool(config, pool, None)
    }

    /// Backed by a WAL database file with a multi-connection pool, so
    /// requests really run side by side
    pub async fn on_disk() -> Self {
        let mut config = Config::default();
        config.rate_limit.enabled = false;
        let path = std::env::temp_dir().join(format!("ticketr-test-{}.db", uuid::Uuid::new_v4()));
        let pool = db::init(&path).await.unwrap();
        Self::from_pool(config, pool, Some(path))
    }

    fn from_pool(config: Config, pool: db::DbPool, db_file: Option<PathBuf>) -> Self {
        let state = Arc::new(AppState::new(config, pool));
        let router = ticketr::api::create_router(state.clone());
        Self { state, router, db_file }
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
        };
        Response { status, headers, body }
    }

    pub async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> Response {
        self.call(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> Response {
        self.call(Method::POST, uri, token, Some(body)).await
    }

    pub async fn patch(&self, uri: &str, token: Option<&str>, body: Value) -> Response {
        self.call(Method::PATCH, uri, token, Some(body)).await
    }

    /// Insert a user and mint an access token for it
    pub async fn user(&self, username: &str, role: UserRole) -> (User, String) {
        let id = uuid::Uuid::new_v4().to_string();
        let now = db::now();
        sqlx::query(
            r#"
            INSERT INTO users (id, email, username, role, password_hash, created_at, updated_at)
            VALUES (?, ?, ?, ?, 'not-a-real-hash', ?, ?)
            "#,
        )
        .bind(&id)
        .bind(format!("{}@example.com", username))
        .bind(username)
        .bind(role)
        .bind(&now)
        .bind(&now)
        .execute(&self.state.db)
        .await
        .unwrap();

        let user: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(&id)
            .fetch_one(&self.state.db)
            .await
            .unwrap();
        let token = issue_token(&self.state.config.auth, &user, TokenType::Access).unwrap();
        (user, token)
    }

    /// Insert an event starting `starts_in` from now and lasting `length`
    pub async fn event(
        &self,
        organizer: &User,
        title: &str,
        category: &str,
        status: &str,
        starts_in: Duration,
        length: Duration,
    ) -> String {
        let start = Utc::now() + starts_in;
        self.event_at(organizer, title, category, status, start, start + length).await
    }

    pub async fn event_at(
        &self,
        organizer: &User,
        title: &str,
        category: &str,
        status: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let now = db::now();
        sqlx::query(
            r#"
            INSERT INTO events (id, organizer_id, title, description, category, location, start_at, end_at,
                                is_multi_day, status, created_at, updated_at)
            VALUES (?, ?, ?, '', ?, 'Accra', ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&organizer.id)
        .bind(title)
        .bind(category)
        .bind(db::timestamp(start))
        .bind(db::timestamp(end))
        .bind(db::spans_multiple_days(start, end))
        .bind(status)
        .bind(&now)
        .bind(&now)
        .execute(&self.state.db)
        .await
        .unwrap();
        id
    }

    /// Insert a tier whose sales window is open now
    pub async fn tier(&self, event_id: &str, name: &str, price_cents: i64, total: i64, available: i64) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO ticket_tiers (id, event_id, name, price_cents, total_tickets, available_tickets,
                                      sales_start, sales_end, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(event_id)
        .bind(name)
        .bind(price_cents)
        .bind(total)
        .bind(available)
        .bind(db::timestamp(now - Duration::days(1)))
        .bind(db::timestamp(now + Duration::days(60)))
        .bind(db::timestamp(now))
        .bind(db::timestamp(now))
        .execute(&self.state.db)
        .await
        .unwrap();
        id
    }

    pub async fn available_tickets(&self, tier_id: &str) -> i64 {
        sqlx::query_scalar("SELECT available_tickets FROM ticket_tiers WHERE id = ?")
            .bind(tier_id)
            .fetch_one(&self.state.db)
            .await
            .unwrap()
    }

    /// Buy through the API and return the order body
    pub async fn purchase(&self, token: &str, event_id: &str, tier_id: &str, quantity: i64) -> Value {
        let response = self
            .post(
                &format!("/api/event/{}/purchase/", event_id),
                Some(token),
                serde_json::json!({ "ticket_tier_id": tier_id, "quantity": quantity }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "purchase failed: {}", response.body);
        response.body
    }
}

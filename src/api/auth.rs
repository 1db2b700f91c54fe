//! Accounts and JWT cookie authentication.
//!
//! Login sets an `access_token` and a `refresh_token` cookie, both HS256 JWTs.
//! Requests authenticate with the access cookie or an `Authorization: Bearer`
//! header carrying the same token.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{request::Parts, StatusCode},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use super::error::{ApiError, ApiJson, ValidationErrorBuilder};
use super::validation::{validate_email, validate_password, validate_username};
use crate::config::AuthConfig;
use crate::db::{
    self, LoginRequest, MessageResponse, RegisterRequest, UpdateProfileRequest, User, UserResponse,
    UserRole,
};
use crate::AppState;

pub const ACCESS_COOKIE: &str = "access_token";
pub const REFRESH_COOKIE: &str = "refresh_token";

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

// -------------------------------------------------------------------------
// Tokens
// -------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenType::Access => write!(f, "access"),
            TokenType::Refresh => write!(f, "refresh"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub role: UserRole,
    pub token_type: TokenType,
    pub iat: i64,
    pub exp: i64,
    /// Unique token id
    pub jti: String,
}

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Token has expired")]
    Expired,

    #[error("Invalid token: {0}")]
    Invalid(String),

    #[error("Expected a {0} token")]
    WrongType(TokenType),

    #[error("Failed to sign token: {0}")]
    Signing(String),
}

fn lifetime(config: &AuthConfig, token_type: TokenType) -> Duration {
    match token_type {
        TokenType::Access => Duration::minutes(config.access_token_minutes),
        TokenType::Refresh => Duration::days(config.refresh_token_days),
    }
}

/// Sign a token of the given type for `user`
pub fn issue_token(config: &AuthConfig, user: &User, token_type: TokenType) -> Result<String, TokenError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user.id.clone(),
        role: user.role,
        token_type,
        iat: now.timestamp(),
        exp: (now + lifetime(config, token_type)).timestamp(),
        jti: uuid::Uuid::new_v4().to_string(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| TokenError::Signing(e.to_string()))
}

/// Verify signature, expiry and token type
pub fn decode_token(config: &AuthConfig, token: &str, expected: TokenType) -> Result<Claims, TokenError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::Invalid(e.to_string()),
    })?;

    if data.claims.token_type != expected {
        return Err(TokenError::WrongType(expected));
    }
    Ok(data.claims)
}

fn auth_cookie(name: &'static str, value: String, max_age: Duration, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(time::Duration::seconds(max_age.num_seconds()))
        .build()
}

fn expired_cookie(name: &'static str) -> Cookie<'static> {
    Cookie::build((name, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::ZERO)
        .build()
}

// -------------------------------------------------------------------------
// Extractors
// -------------------------------------------------------------------------

/// Extract the access token: cookie first, then the Authorization header
fn extract_token(parts: &Parts) -> Option<String> {
    let jar = CookieJar::from_headers(&parts.headers);
    if let Some(cookie) = jar.get(ACCESS_COOKIE) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }

    parts
        .headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
}

pub async fn load_user(pool: &sqlx::SqlitePool, id: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Resolve the request's access token to a user
async fn authenticate(parts: &Parts, state: &AppState) -> Result<User, ApiError> {
    let token = extract_token(parts)
        .ok_or_else(|| ApiError::unauthorized("Authentication credentials were not provided."))?;

    let claims = decode_token(&state.config.auth, &token, TokenType::Access).map_err(|e| {
        tracing::debug!("Rejected access token: {}", e);
        ApiError::unauthorized("Given token not valid for any token type")
    })?;

    load_user(&state.db, &claims.sub)
        .await?
        .ok_or_else(|| ApiError::unauthorized("User not found"))
}

/// Extractor for the current authenticated user
#[async_trait]
impl FromRequestParts<Arc<AppState>> for User {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        authenticate(parts, state).await
    }
}

/// The current user when the request is authenticated, `None` otherwise
pub struct MaybeUser(pub Option<User>);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        match authenticate(parts, state).await {
            Ok(user) => Ok(MaybeUser(Some(user))),
            Err(err) if err.status() == StatusCode::UNAUTHORIZED => Ok(MaybeUser(None)),
            Err(err) => Err(err),
        }
    }
}

/// An authenticated user with the organizer role
pub struct Organizer(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Organizer {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let user = authenticate(parts, state).await?;
        super::permissions::require_organizer(&user)?;
        Ok(Organizer(user))
    }
}

// -------------------------------------------------------------------------
// Handlers
// -------------------------------------------------------------------------

/// Login endpoint: sets both auth cookies
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<(CookieJar, Json<MessageResponse>), ApiError> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE LOWER(email) = LOWER(?)")
        .bind(request.email.trim())
        .fetch_optional(&state.db)
        .await?;

    let user = match user {
        Some(user) if verify_password(&request.password, &user.password_hash) => user,
        _ => {
            metrics::counter!(super::metrics::LOGINS_TOTAL, "outcome" => "failure").increment(1);
            return Err(ApiError::unauthorized(
                "No active account found with the given credentials",
            ));
        }
    };

    let auth = &state.config.auth;
    let access = issue_token(auth, &user, TokenType::Access).map_err(|e| ApiError::internal(e.to_string()))?;
    let refresh = issue_token(auth, &user, TokenType::Refresh).map_err(|e| ApiError::internal(e.to_string()))?;

    metrics::counter!(super::metrics::LOGINS_TOTAL, "outcome" => "success").increment(1);
    tracing::info!(user_id = %user.id, "User logged in");

    let jar = jar
        .add(auth_cookie(ACCESS_COOKIE, access, lifetime(auth, TokenType::Access), auth.secure_cookies))
        .add(auth_cookie(REFRESH_COOKIE, refresh, lifetime(auth, TokenType::Refresh), auth.secure_cookies));

    Ok((jar, Json(MessageResponse::new("Login successful"))))
}

/// Reissue the access cookie from a valid refresh cookie
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<MessageResponse>), ApiError> {
    let token = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::unauthorized("Refresh token not provided"))?;

    let auth = &state.config.auth;
    let claims = match decode_token(auth, &token, TokenType::Refresh) {
        Ok(claims) => claims,
        Err(TokenError::Expired) => return Err(ApiError::unauthorized("Refresh token has expired")),
        Err(e @ (TokenError::Invalid(_) | TokenError::WrongType(_))) => {
            tracing::debug!("Rejected refresh token: {}", e);
            return Err(ApiError::unauthorized("Invalid refresh token"));
        }
        Err(e) => {
            tracing::error!("Token refresh failed: {}", e);
            return Err(ApiError::internal(e.to_string()));
        }
    };

    let user = match load_user(&state.db, &claims.sub).await {
        Ok(Some(user)) => user,
        Ok(None) => return Err(ApiError::unauthorized("User not found")),
        Err(e) => {
            tracing::error!("Token refresh failed: {}", e);
            return Err(ApiError::internal(e.to_string()));
        }
    };

    let access = issue_token(auth, &user, TokenType::Access).map_err(|e| {
        tracing::error!("Token refresh failed: {}", e);
        ApiError::internal(e.to_string())
    })?;

    let jar = jar.add(auth_cookie(
        ACCESS_COOKIE,
        access,
        lifetime(auth, TokenType::Access),
        auth.secure_cookies,
    ));
    Ok((jar, Json(MessageResponse::new("Token refreshed"))))
}

/// Logout: expire both cookies
pub async fn logout(jar: CookieJar) -> (CookieJar, Json<MessageResponse>) {
    let jar = jar
        .add(expired_cookie(ACCESS_COOKIE))
        .add(expired_cookie(REFRESH_COOKIE));
    (jar, Json(MessageResponse::new("Logout successful")))
}

fn validate_register_request(request: &RegisterRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors.check("email", validate_email(request.email.trim()));
    errors.check("username", validate_username(&request.username));
    errors.check("password", validate_password(&request.password));
    if request.first_name.chars().count() > 150 {
        errors.add("first_name", "First name is too long (max 150 characters)");
    }
    if request.last_name.chars().count() > 150 {
        errors.add("last_name", "Last name is too long (max 150 characters)");
    }
    errors.finish()
}

/// Register a new account
pub async fn register(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    validate_register_request(&request)?;
    let email = request.email.trim().to_lowercase();

    let taken: Option<(String, String)> = sqlx::query_as(
        "SELECT email, username FROM users WHERE LOWER(email) = ? OR username = ?",
    )
    .bind(&email)
    .bind(&request.username)
    .fetch_optional(&state.db)
    .await?;
    if let Some((taken_email, _)) = taken {
        let mut errors = ValidationErrorBuilder::new();
        if taken_email.to_lowercase() == email {
            errors.add("email", "A user with this email already exists.");
        } else {
            errors.add("username", "A user with that username already exists.");
        }
        return Err(errors.build().unwrap_or_else(|| ApiError::conflict("User already exists")));
    }

    let password_hash = hash_password(&request.password)
        .map_err(|e| ApiError::internal(format!("Failed to hash password: {}", e)))?;

    let id = uuid::Uuid::new_v4().to_string();
    let now = db::now();
    sqlx::query(
        r#"
        INSERT INTO users (id, email, username, first_name, last_name, role, password_hash, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&email)
    .bind(&request.username)
    .bind(&request.first_name)
    .bind(&request.last_name)
    .bind(request.role)
    .bind(&password_hash)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    tracing::info!(user_id = %id, role = %request.role, "Registered user");

    let user = load_user(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::internal("Failed to load created user"))?;
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// Current user's profile
pub async fn me(user: User) -> Json<UserResponse> {
    Json(UserResponse::from(user))
}

/// Update username and names; email stays fixed
pub async fn update_me(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiJson(request): ApiJson<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Some(username) = &request.username {
        errors.check("username", validate_username(username));
    }
    for (field, value) in [("first_name", &request.first_name), ("last_name", &request.last_name)] {
        if value.as_ref().map(|v| v.chars().count() > 150).unwrap_or(false) {
            errors.add(field, "Value is too long (max 150 characters)");
        }
    }
    errors.finish()?;

    sqlx::query(
        r#"
        UPDATE users SET
            username = COALESCE(?, username),
            first_name = COALESCE(?, first_name),
            last_name = COALESCE(?, last_name),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&request.username)
    .bind(&request.first_name)
    .bind(&request.last_name)
    .bind(db::now())
    .bind(&user.id)
    .execute(&state.db)
    .await?;

    let user = load_user(&state.db, &user.id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(UserResponse::from(user)))
}

//! Input validation for API requests.
//!
//! Each function checks one field and returns the message to report for it.
//! Handlers collect these with `ValidationErrorBuilder` from the `error` module.

use chrono::{NaiveDate, NaiveTime};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Pragmatic email shape check: local@domain.tld
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?)*\.[A-Za-z]{2,}$"
    ).unwrap();

    /// Usernames: letters, digits and @/./+/-/_ (3-150 chars)
    static ref USERNAME_REGEX: Regex = Regex::new(
        r"^[\w.@+-]{3,150}$"
    ).unwrap();

    /// Absolute HTTP(S) URL
    static ref HTTP_URL_REGEX: Regex = Regex::new(
        r"^https?://[^\s/$.?#][^\s]*$"
    ).unwrap();

    /// Coupon codes: uppercase letters, digits, dashes and underscores
    static ref COUPON_CODE_REGEX: Regex = Regex::new(
        r"^[A-Z0-9_-]{3,20}$"
    ).unwrap();
}

pub const MAX_TICKETS_PER_ORDER: i64 = 10;

pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }
    if email.len() > 254 {
        return Err("Email is too long (max 254 characters)".to_string());
    }
    if !EMAIL_REGEX.is_match(email) {
        return Err("Enter a valid email address".to_string());
    }
    Ok(())
}

pub fn validate_username(username: &str) -> Result<(), String> {
    if username.is_empty() {
        return Err("Username is required".to_string());
    }
    if !USERNAME_REGEX.is_match(username) {
        return Err(
            "Username must be 3-150 characters of letters, digits and @/./+/-/_".to_string(),
        );
    }
    Ok(())
}

/// At least 8 characters with at least one letter and one digit
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters".to_string());
    }
    if password.len() > 128 {
        return Err("Password is too long (max 128 characters)".to_string());
    }
    if !password.chars().any(|c| c.is_alphabetic()) || !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain at least one letter and one digit".to_string());
    }
    Ok(())
}

/// Non-blank text up to `max` characters
pub fn validate_required_text(value: &str, field_name: &str, max: usize) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{} is required", field_name));
    }
    if value.chars().count() > max {
        return Err(format!("{} is too long (max {} characters)", field_name, max));
    }
    Ok(())
}

pub fn validate_optional_url(url: &Option<String>) -> Result<(), String> {
    if let Some(url) = url {
        if url.is_empty() {
            return Ok(());
        }
        if url.len() > 2048 {
            return Err("URL is too long (max 2048 characters)".to_string());
        }
        if !HTTP_URL_REGEX.is_match(url) {
            return Err("Enter a valid http(s) URL".to_string());
        }
    }
    Ok(())
}

pub fn validate_coordinates(latitude: Option<f64>, longitude: Option<f64>) -> Result<(), String> {
    if let Some(lat) = latitude {
        if !(-90.0..=90.0).contains(&lat) {
            return Err("Latitude must be between -90 and 90".to_string());
        }
    }
    if let Some(lng) = longitude {
        if !(-180.0..=180.0).contains(&lng) {
            return Err("Longitude must be between -180 and 180".to_string());
        }
    }
    Ok(())
}

/// Validate a UUID string
pub fn validate_uuid(id: &str, field_name: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err(format!("{} is required", field_name));
    }

    if uuid::Uuid::parse_str(id).is_err() {
        return Err(format!("Invalid {} format", field_name));
    }

    Ok(())
}

pub fn validate_quantity(quantity: i64) -> Result<(), String> {
    if !(1..=MAX_TICKETS_PER_ORDER).contains(&quantity) {
        return Err(format!(
            "Quantity must be between 1 and {}",
            MAX_TICKETS_PER_ORDER
        ));
    }
    Ok(())
}

pub fn validate_inventory(total: i64, available: i64) -> Result<(), String> {
    if total < 0 {
        return Err("Total tickets cannot be negative".to_string());
    }
    if available < 0 || available > total {
        return Err("Available tickets must be between 0 and total tickets".to_string());
    }
    Ok(())
}

pub fn validate_coupon_code(code: &str) -> Result<(), String> {
    if !COUPON_CODE_REGEX.is_match(code) {
        return Err(
            "Coupon code must be 3-20 uppercase letters, digits, dashes or underscores"
                .to_string(),
        );
    }
    Ok(())
}

pub fn validate_discount_percentage(percentage: i64) -> Result<(), String> {
    if !(0..=100).contains(&percentage) {
        return Err("Discount percentage must be between 0 and 100".to_string());
    }
    Ok(())
}

/// A session or day must end after it starts
pub fn validate_time_range(start: NaiveTime, end: NaiveTime) -> Result<(), String> {
    if end <= start {
        return Err("End time must be after start time".to_string());
    }
    Ok(())
}

/// `date` must fall inside the event's inclusive date range
pub fn validate_date_within(date: NaiveDate, range: (NaiveDate, NaiveDate)) -> Result<(), String> {
    let (first, last) = range;
    if date < first || date > last {
        return Err(format!(
            "Date must be between the event start ({}) and end ({})",
            first, last
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("ama@example.com").is_ok());
        assert!(validate_email("first.last+tag@mail.example.org").is_ok());

        assert!(validate_email("").is_err());
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("a@b").is_err());
        assert!(validate_email("spaces in@example.com").is_err());
    }

    #[test]
    fn test_validate_username() {
        assert!(validate_username("kofi_m").is_ok());
        assert!(validate_username("a.b@c+d-e").is_ok());

        assert!(validate_username("").is_err());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("has space").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("hunter42x").is_ok());

        assert!(validate_password("short1").is_err());
        assert!(validate_password("allletters").is_err());
        assert!(validate_password("1234567890").is_err());
    }

    #[test]
    fn test_validate_required_text() {
        assert!(validate_required_text("Keynote", "Title", 255).is_ok());
        assert!(validate_required_text("   ", "Title", 255).is_err());
        assert!(validate_required_text(&"x".repeat(256), "Title", 255).is_err());
    }

    #[test]
    fn test_validate_optional_url() {
        assert!(validate_optional_url(&None).is_ok());
        assert!(validate_optional_url(&Some("https://cdn.example.com/a.png".into())).is_ok());
        assert!(validate_optional_url(&Some("ftp://example.com".into())).is_err());
    }

    #[test]
    fn test_validate_coordinates() {
        assert!(validate_coordinates(Some(5.6), Some(-0.19)).is_ok());
        assert!(validate_coordinates(None, None).is_ok());
        assert!(validate_coordinates(Some(91.0), None).is_err());
        assert!(validate_coordinates(None, Some(-181.0)).is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000", "event_id").is_ok());
        assert!(validate_uuid("", "event_id").is_err());
        assert!(validate_uuid("not-a-uuid", "event_id").is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(10).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(11).is_err());
    }

    #[test]
    fn test_validate_inventory() {
        assert!(validate_inventory(100, 100).is_ok());
        assert!(validate_inventory(100, 0).is_ok());
        assert!(validate_inventory(100, 101).is_err());
        assert!(validate_inventory(10, -1).is_err());
    }

    #[test]
    fn test_validate_coupon() {
        assert!(validate_coupon_code("EARLY-BIRD").is_ok());
        assert!(validate_coupon_code("early").is_err());
        assert!(validate_discount_percentage(100).is_ok());
        assert!(validate_discount_percentage(101).is_err());
    }

    #[test]
    fn test_validate_time_range() {
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let ten = NaiveTime::from_hms_opt(10, 0, 0).unwrap();
        assert!(validate_time_range(nine, ten).is_ok());
        assert!(validate_time_range(ten, nine).is_err());
        assert!(validate_time_range(nine, nine).is_err());
    }

    #[test]
    fn test_validate_date_within() {
        let first = NaiveDate::from_ymd_opt(2026, 4, 1).unwrap();
        let last = NaiveDate::from_ymd_opt(2026, 4, 3).unwrap();
        assert!(validate_date_within(first, (first, last)).is_ok());
        assert!(validate_date_within(last, (first, last)).is_ok());
        assert!(validate_date_within(NaiveDate::from_ymd_opt(2026, 4, 4).unwrap(), (first, last)).is_err());
        assert!(validate_date_within(NaiveDate::from_ymd_opt(2026, 3, 31).unwrap(), (first, last)).is_err());
    }
}

pub mod health;
pub use self::health::health;

pub mod keys;
pub use self::keys::keys;

pub mod login;
pub use self::login::login;

pub mod register;
pub use self::register::register;

// common functions for the handlers
use axum::http::HeaderMap;
use regex::Regex;

pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").map_or(false, |re| re.is_match(email))
}

pub fn valid_username(username: &str) -> bool {
    Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_.-]{2,31}$").map_or(false, |re| re.is_match(username))
}

pub fn valid_password(password: &str) -> bool {
    // hashed server side, any characters, 8 to 128 of them
    Regex::new(r"^.{8,128}$").map_or(false, |re| re.is_match(password))
}

/// Client IP from common proxy headers; the login origin falls back to the
/// socket peer address when neither is present.
pub fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn valid_email_accepts_plain_addresses() {
        assert!(valid_email("alice@example.com"));
        assert!(valid_email("a.b+c@sub.example.org"));
    }

    #[test]
    fn valid_email_rejects_malformed_addresses() {
        assert!(!valid_email("alice"));
        assert!(!valid_email("alice@"));
        assert!(!valid_email("@example.com"));
        assert!(!valid_email("alice bob@example.com"));
        assert!(!valid_email("alice@example"));
    }

    #[test]
    fn valid_username_bounds_charset_and_length() {
        assert!(valid_username("alice"));
        assert!(valid_username("alice.bob-01_x"));
        assert!(!valid_username("al"));
        assert!(!valid_username(".alice"));
        assert!(!valid_username("alice bob"));
        assert!(!valid_username(&"a".repeat(33)));
    }

    #[test]
    fn valid_password_bounds_length_only() {
        assert!(valid_password("correct horse battery"));
        assert!(valid_password("12345678"));
        assert!(!valid_password("1234567"));
        assert!(!valid_password(&"a".repeat(129)));
    }

    #[test]
    fn extract_client_ip_prefers_forwarded() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("1.2.3.4, 10.0.0.1"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(extract_client_ip(&headers), Some("1.2.3.4".to_string()));
    }

    #[test]
    fn extract_client_ip_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(extract_client_ip(&headers), Some("9.9.9.9".to_string()));
    }

    #[test]
    fn extract_client_ip_none_when_missing() {
        let headers = HeaderMap::new();
        assert_eq!(extract_client_ip(&headers), None);
    }
}

//! Request field validation that collects every failure before responding 422.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::net::IpAddr;

use crate::error::{ApiError, FieldErrors};

/// `per_page` → `per page`
fn label(field: &str) -> String {
    field.replace('_', " ")
}

#[derive(Debug, Default)]
pub struct Validator {
    errors: FieldErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.errors.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn check(&mut self, ok: bool, field: &str, message: impl Into<String>) {
        if !ok {
            self.add(field, message);
        }
    }

    pub fn has(&self, field: &str) -> bool {
        self.errors.contains_key(field)
    }

    /// Non-blank value, or records "field is required".
    pub fn required<'a>(&mut self, field: &str, value: Option<&'a str>) -> Option<&'a str> {
        match value.map(str::trim) {
            Some(v) if !v.is_empty() => value,
            _ => {
                self.add(field, format!("The {} field is required.", label(field)));
                None
            }
        }
    }

    pub fn max_len(&mut self, field: &str, value: Option<&str>, max: usize) {
        if let Some(v) = value {
            if v.chars().count() > max {
                self.add(
                    field,
                    format!("The {} field must not be greater than {} characters.", label(field), max),
                );
            }
        }
    }

    pub fn min_len(&mut self, field: &str, value: Option<&str>, min: usize) {
        if let Some(v) = value {
            if v.chars().count() < min {
                self.add(field, format!("The {} field must be at least {} characters.", label(field), min));
            }
        }
    }

    pub fn email(&mut self, field: &str, value: Option<&str>) {
        if let Some(v) = value {
            if !is_email(v) {
                self.add(field, format!("The {} field must be a valid email address.", label(field)));
            }
        }
    }

    /// `<field>_confirmation` must equal `value`.
    pub fn confirmed(&mut self, field: &str, value: Option<&str>, confirmation: Option<&str>) {
        if value.is_some() && value != confirmation {
            self.add(field, format!("The {} field confirmation does not match.", label(field)));
        }
    }

    pub fn ip(&mut self, field: &str, value: Option<&str>) {
        if let Some(v) = value {
            if v.parse::<IpAddr>().is_err() {
                self.add(field, format!("The {} field must be a valid IP address.", label(field)));
            }
        }
    }

    pub fn url(&mut self, field: &str, value: Option<&str>) {
        if let Some(v) = value {
            let ok = url::Url::parse(v)
                .map(|u| matches!(u.scheme(), "http" | "https"))
                .unwrap_or(false);
            if !ok {
                self.add(field, format!("The {} field must be a valid URL.", label(field)));
            }
        }
    }

    pub fn one_of(&mut self, field: &str, value: Option<&str>, allowed: &[&str]) {
        if let Some(v) = value {
            if !allowed.contains(&v) {
                self.add(field, format!("The selected {} is invalid.", label(field)));
            }
        }
    }

    pub fn unique(&mut self, field: &str, taken: bool) {
        if taken {
            self.add(field, format!("The {} has already been taken.", label(field)));
        }
    }

    pub fn boolean(&mut self, field: &str, value: Option<&str>) -> Option<bool> {
        let v = value?;
        let parsed = parse_bool(v);
        if parsed.is_none() {
            self.add(field, format!("The {} field must be true or false.", label(field)));
        }
        parsed
    }

    pub fn date(&mut self, field: &str, value: Option<&str>) -> Option<NaiveDate> {
        let v = value?;
        let parsed = parse_date(v);
        if parsed.is_none() {
            self.add(field, format!("The {} field must be a valid date.", label(field)));
        }
        parsed
    }

    /// Date-time strictly after now.
    pub fn future_datetime(&mut self, field: &str, value: Option<&str>) -> Option<DateTime<Utc>> {
        let v = value?;
        match parse_datetime(v) {
            Some(at) if at > Utc::now() => Some(at),
            Some(_) => {
                self.add(field, format!("The {} field must be a date after now.", label(field)));
                None
            }
            None => {
                self.add(field, format!("The {} field must be a valid date.", label(field)));
                None
            }
        }
    }

    pub fn integer_between(&mut self, field: &str, value: Option<&str>, min: i64, max: i64) -> Option<i64> {
        let v = value?;
        match v.trim().parse::<i64>() {
            Ok(n) if (min..=max).contains(&n) => Some(n),
            Ok(_) => {
                self.add(field, format!("The {} field must be between {} and {}.", label(field), min, max));
                None
            }
            Err(_) => {
                self.add(field, format!("The {} field must be an integer.", label(field)));
                None
            }
        }
    }

    pub fn finish(self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::validation(self.errors))
        }
    }
}

pub fn is_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !value.chars().any(char::is_whitespace)
}

pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let v = value.trim();
    NaiveDate::parse_from_str(v, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_datetime(v).map(|dt| dt.date_naive()))
}

/// RFC 3339, `Y-m-d H:i:s` or a bare `Y-m-d` (midnight UTC).
pub fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    let v = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(v) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(v, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&ndt));
    }
    NaiveDate::parse_from_str(v, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| Utc.from_utc_datetime(&ndt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_every_failure() {
        let mut v = Validator::new();
        v.required("email", None);
        v.min_len("password", Some("short"), 8);
        v.confirmed("password", Some("short"), Some("other"));
        let err = v.finish().unwrap_err();
        let body = err.to_json();
        assert_eq!(body["errors"]["email"][0], "The email field is required.");
        assert_eq!(body["errors"]["password"][0], "The password field must be at least 8 characters.");
        assert_eq!(body["errors"]["password"][1], "The password field confirmation does not match.");
    }

    #[test]
    fn blank_strings_count_as_missing() {
        let mut v = Validator::new();
        assert_eq!(v.required("name", Some("   ")), None);
        assert!(v.has("name"));
    }

    #[test]
    fn email_shapes() {
        assert!(is_email("john@example.com"));
        assert!(!is_email("john@localhost"));
        assert!(!is_email("john example@x.com"));
        assert!(!is_email("@example.com"));
        assert!(!is_email("a@b@c.com"));
    }

    #[test]
    fn ranges_and_choices() {
        let mut v = Validator::new();
        assert_eq!(v.integer_between("per_page", Some("50"), 1, 100), Some(50));
        assert_eq!(v.integer_between("per_page", Some("500"), 1, 100), None);
        v.one_of("order_direction", Some("sideways"), &["asc", "desc"]);
        let body = v.finish().unwrap_err().to_json();
        assert_eq!(body["errors"]["per_page"][0], "The per page field must be between 1 and 100.");
        assert_eq!(body["errors"]["order_direction"][0], "The selected order direction is invalid.");
    }

    #[test]
    fn dates_accept_common_formats() {
        assert!(parse_date("2024-02-29").is_some());
        assert!(parse_date("2024-02-30").is_none());
        assert!(parse_datetime("2030-01-01T10:00:00Z").is_some());
        assert!(parse_datetime("2030-01-01 10:00:00").is_some());

        let mut v = Validator::new();
        assert!(v.future_datetime("blocked_until", Some("2000-01-01")).is_none());
        assert!(v.future_datetime("expires_at", Some("2999-01-01")).is_some());
        assert!(v.has("blocked_until"));
        assert!(!v.has("expires_at"));
    }

    #[test]
    fn booleans_follow_form_conventions() {
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool("false"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}

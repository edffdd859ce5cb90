use chrono::NaiveDate;
use regex::Regex;
use std::sync::LazyLock;

use super::{ApiError, FieldError};
use crate::constants::limits::{MAX_EMAIL_LEN, MAX_LOG_PAGE_SIZE, MIN_PASSWORD_LEN};
use crate::domain::UserId;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("Invalid regex"));

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\+359|0)[0-9]{8,9}$").expect("Invalid regex"));

const PASSWORD_SPECIALS: &str = "@$!%*?&";

/// Collects every field problem so a request gets one complete answer.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn fail(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, message));
    }

    pub fn email(&mut self, field: &str, value: &str) -> &mut Self {
        let value = value.trim();
        if value.is_empty() {
            self.fail(field, "Email is required");
        } else if value.len() > MAX_EMAIL_LEN || !EMAIL_RE.is_match(value) {
            self.fail(field, "Please provide a valid email address");
        }
        self
    }

    pub fn required(&mut self, field: &str, value: &str, message: &str) -> &mut Self {
        if value.is_empty() {
            self.fail(field, message);
        }
        self
    }

    pub fn password(&mut self, field: &str, value: &str) -> &mut Self {
        if let Some(problem) = password_problem(value) {
            self.fail(field, problem);
        }
        self
    }

    pub fn name(&mut self, field: &str, value: &str) -> &mut Self {
        let len = value.trim().chars().count();
        if !(2..=50).contains(&len) {
            self.fail(field, "Must be between 2 and 50 characters");
        }
        self
    }

    pub fn phone(&mut self, field: &str, value: Option<&str>) -> &mut Self {
        if let Some(phone) = value.map(str::trim).filter(|p| !p.is_empty())
            && !PHONE_RE.is_match(phone)
        {
            self.fail(field, "Please provide a valid Bulgarian phone number");
        }
        self
    }

    pub fn date(&mut self, field: &str, value: Option<&str>) -> &mut Self {
        if let Some(date) = value.map(str::trim).filter(|d| !d.is_empty())
            && NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err()
        {
            self.fail(field, "Date must be in YYYY-MM-DD format");
        }
        self
    }

    pub fn finish(&mut self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::InvalidFields(std::mem::take(&mut self.errors)))
        }
    }
}

/// First rule a password breaks, if any.
#[must_use]
pub fn password_problem(password: &str) -> Option<&'static str> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Some("Password must be at least 8 characters long");
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Some("Password must contain a lowercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Some("Password must contain an uppercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Some("Password must contain a digit");
    }
    if !password.chars().any(|c| PASSWORD_SPECIALS.contains(c)) {
        return Some("Password must contain a special character (@$!%*?&)");
    }
    None
}

pub fn validate_page(page: Option<u64>) -> Result<u64, ApiError> {
    match page {
        None => Ok(1),
        Some(0) => Err(ApiError::validation("Page must be 1 or greater")),
        Some(page) => Ok(page),
    }
}

pub fn validate_page_size(page_size: Option<u64>, default: u64) -> Result<u64, ApiError> {
    let size = page_size.unwrap_or(default);
    if !(1..=MAX_LOG_PAGE_SIZE).contains(&size) {
        return Err(ApiError::validation(format!(
            "Invalid page size: {size}. Must be between 1 and {MAX_LOG_PAGE_SIZE}"
        )));
    }
    Ok(size)
}

pub fn validate_user_id(user_id: Option<i32>) -> Result<Option<UserId>, ApiError> {
    match user_id {
        Some(id) if id < 0 => Err(ApiError::validation(format!(
            "Invalid user id: {id}. Must be 0 or greater"
        ))),
        other => Ok(other.map(UserId::new)),
    }
}

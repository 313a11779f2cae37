//! User account model.
//!
//! # Responsibility
//! - Define the stored account record and its public projections.
//! - Validate sign-up input, including the institutional email rule.
//!
//! # Invariants
//! - `username` and `email` are unique case-insensitively.
//! - Emails are stored trimmed and lowercased.
//! - `password_hash`/`password_salt` never leave the core crate in a profile.

use crate::model::{require_text, ValidationError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type UserId = Uuid;

const USERNAME_MIN_CHARS: usize = 3;
const USERNAME_MAX_CHARS: usize = 30;
const PASSWORD_MIN_CHARS: usize = 8;
const PASSWORD_MAX_CHARS: usize = 128;
const NAME_MAX_CHARS: usize = 50;
const EMAIL_MAX_CHARS: usize = 254;

static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").expect("valid username regex"));
static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@([A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)+)$").expect("valid email regex")
});

/// Stored account record, including credential material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub password_salt: String,
    pub email_confirmed: bool,
    pub failed_login_attempts: u32,
    /// Epoch milliseconds until which sign-in is refused.
    pub locked_until: Option<i64>,
    pub last_login_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl User {
    /// Returns whether sign-in is currently refused because of lockout.
    pub fn is_locked(&self, now_ms: i64) -> bool {
        self.locked_until.is_some_and(|until| until > now_ms)
    }

    /// Projection shown to the account owner.
    pub fn private_profile(&self) -> UserProfile {
        UserProfile {
            email: Some(self.email.clone()),
            email_confirmed: Some(self.email_confirmed),
            ..self.public_profile()
        }
    }

    /// Projection shown to other users.
    pub fn public_profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            username: self.username.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            created_at: self.created_at,
            email: None,
            email_confirmed: None,
        }
    }
}

/// Serializable account view without credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_confirmed: Option<bool>,
}

/// Sign-up input.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

impl NewUser {
    /// Validates and normalizes sign-up input.
    ///
    /// `allowed_domains` lists institutional email domains; an empty list
    /// accepts any well-formed address.
    pub fn validate(&self, allowed_domains: &[String]) -> Result<NewUser, ValidationError> {
        Ok(NewUser {
            username: validate_username(&self.username)?,
            email: validate_email(&self.email, allowed_domains)?,
            password: validate_password(&self.password)?,
            first_name: require_text("first_name", &self.first_name, NAME_MAX_CHARS)?,
            last_name: require_text("last_name", &self.last_name, NAME_MAX_CHARS)?,
        })
    }
}

pub fn validate_username(value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    let len = trimmed.chars().count();
    if !(USERNAME_MIN_CHARS..=USERNAME_MAX_CHARS).contains(&len) {
        return Err(ValidationError::new(
            "username",
            format!("must be {USERNAME_MIN_CHARS} to {USERNAME_MAX_CHARS} characters"),
        ));
    }
    if !USERNAME_RE.is_match(trimmed) {
        return Err(ValidationError::new(
            "username",
            "may only contain letters, digits, `_`, `.` and `-`",
        ));
    }
    Ok(trimmed.to_string())
}

/// Normalizes an email for storage and lookup.
pub fn normalize_email(value: &str) -> String {
    value.trim().to_lowercase()
}

pub fn validate_email(value: &str, allowed_domains: &[String]) -> Result<String, ValidationError> {
    let email = normalize_email(value);
    if email.chars().count() > EMAIL_MAX_CHARS {
        return Err(ValidationError::new(
            "email",
            format!("must be at most {EMAIL_MAX_CHARS} characters"),
        ));
    }
    let Some(caps) = EMAIL_RE.captures(&email) else {
        return Err(ValidationError::new("email", "is not a valid address"));
    };
    let domain = caps.get(1).map_or("", |m| m.as_str());
    if !domain_allowed(domain, allowed_domains) {
        return Err(ValidationError::new(
            "email",
            format!(
                "must belong to an institutional domain ({})",
                allowed_domains.join(", ")
            ),
        ));
    }
    Ok(email)
}

/// Returns whether `domain` equals or is a subdomain of an allowed domain.
pub fn domain_allowed(domain: &str, allowed_domains: &[String]) -> bool {
    if allowed_domains.is_empty() {
        return true;
    }
    let domain = domain.to_lowercase();
    allowed_domains.iter().any(|allowed| {
        let allowed = allowed.trim().trim_start_matches('@').to_lowercase();
        domain == allowed || domain.ends_with(&format!(".{allowed}"))
    })
}

pub fn validate_password(value: &str) -> Result<String, ValidationError> {
    let len = value.chars().count();
    if !(PASSWORD_MIN_CHARS..=PASSWORD_MAX_CHARS).contains(&len) {
        return Err(ValidationError::new(
            "password",
            format!("must be {PASSWORD_MIN_CHARS} to {PASSWORD_MAX_CHARS} characters"),
        ));
    }
    let has_letter = value.chars().any(char::is_alphabetic);
    let has_digit = value.chars().any(|c| c.is_ascii_digit());
    if !has_letter || !has_digit {
        return Err(ValidationError::new(
            "password",
            "must contain at least one letter and one digit",
        ));
    }
    Ok(value.to_string())
}

pub fn validate_name(field: &'static str, value: &str) -> Result<String, ValidationError> {
    require_text(field, value, NAME_MAX_CHARS)
}

//! Domain model for users, posts and comments.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Own input validation rules shared by services and HTTP callers.
//!
//! # Invariants
//! - Every domain object is identified by a stable UUID.
//! - Posts are soft-deleted; users and comments are removed outright.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod comment;
pub mod post;
pub mod user;

/// Field-level validation failure for caller-provided input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Input field that failed validation.
    pub field: &'static str,
    /// Human-readable reason.
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid `{}`: {}", self.field, self.reason)
    }
}

impl Error for ValidationError {}

/// Trims `value` and checks it is non-blank and at most `max_chars` long.
pub(crate) fn require_text(
    field: &'static str,
    value: &str,
    max_chars: usize,
) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new(field, "must not be blank"));
    }
    check_length(field, trimmed, max_chars)?;
    Ok(trimmed.to_string())
}

/// Trims an optional value, mapping blank input to `None`.
pub(crate) fn optional_text(
    field: &'static str,
    value: Option<&str>,
    max_chars: usize,
) -> Result<Option<String>, ValidationError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(trimmed) => {
            check_length(field, trimmed, max_chars)?;
            Ok(Some(trimmed.to_string()))
        }
    }
}

fn check_length(field: &'static str, value: &str, max_chars: usize) -> Result<(), ValidationError> {
    if value.chars().count() > max_chars {
        return Err(ValidationError::new(
            field,
            format!("must be at most {max_chars} characters"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{optional_text, require_text};

    #[test]
    fn require_text_trims_and_rejects_blank() {
        assert_eq!(require_text("title", "  hi  ", 10).unwrap(), "hi");
        let err = require_text("title", "   ", 10).unwrap_err();
        assert_eq!(err.field, "title");
    }

    #[test]
    fn length_is_counted_in_chars() {
        assert!(require_text("title", "ééé", 3).is_ok());
        assert!(require_text("title", "éééé", 3).is_err());
    }

    #[test]
    fn optional_text_maps_blank_to_none() {
        assert_eq!(optional_text("location", Some("  "), 5).unwrap(), None);
        assert_eq!(optional_text("location", None, 5).unwrap(), None);
        assert_eq!(
            optional_text("location", Some(" BA "), 5).unwrap().as_deref(),
            Some("BA")
        );
    }
}

//! Bulletin-board post model.
//!
//! # Responsibility
//! - Define the canonical post record and its category.
//! - Validate and normalize author-provided drafts, including tags.
//!
//! # Invariants
//! - `latitude` and `longitude` are either both set or both absent.
//! - `capacity == 0` means unlimited check-ins.
//! - `event_end` is never earlier than `event_start` when both are set.
//! - Tags are trimmed, lowercased and deduplicated.

use crate::model::user::UserId;
use crate::model::{optional_text, require_text, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

pub type PostId = Uuid;

const TITLE_MAX_CHARS: usize = 100;
const BODY_MAX_CHARS: usize = 2000;
const LOCATION_MAX_CHARS: usize = 200;
const THUMBNAIL_MAX_CHARS: usize = 500;
const TAG_MAX_CHARS: usize = 30;
const TAGS_MAX_COUNT: usize = 10;

/// Board category of a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostKind {
    Event,
    Club,
    Textbook,
    Housing,
    Volunteer,
    Other,
}

impl PostKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Club => "club",
            Self::Textbook => "textbook",
            Self::Housing => "housing",
            Self::Volunteer => "volunteer",
            Self::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "event" => Some(Self::Event),
            "club" => Some(Self::Club),
            "textbook" => Some(Self::Textbook),
            "housing" => Some(Self::Housing),
            "volunteer" => Some(Self::Volunteer),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// Canonical post record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub author_id: UserId,
    pub kind: PostKind,
    pub title: String,
    pub body: String,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Maximum number of check-ins; `0` is unlimited.
    pub capacity: u32,
    /// Epoch milliseconds.
    pub event_start: Option<i64>,
    /// Epoch milliseconds, `>= event_start` when both are set.
    pub event_end: Option<i64>,
    pub thumbnail: Option<String>,
    pub tags: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub is_deleted: bool,
}

impl Post {
    /// Builds a fresh post from an already validated draft.
    pub fn from_draft(author_id: UserId, draft: PostDraft, now_ms: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            author_id,
            kind: draft.kind,
            title: draft.title,
            body: draft.body,
            location: draft.location,
            latitude: draft.latitude,
            longitude: draft.longitude,
            capacity: draft.capacity,
            event_start: draft.event_start,
            event_end: draft.event_end,
            thumbnail: draft.thumbnail,
            tags: draft.tags,
            created_at: now_ms,
            updated_at: now_ms,
            is_deleted: false,
        }
    }

    /// Replaces all author-editable fields with the draft.
    pub fn apply_draft(&mut self, draft: PostDraft, now_ms: i64) {
        self.kind = draft.kind;
        self.title = draft.title;
        self.body = draft.body;
        self.location = draft.location;
        self.latitude = draft.latitude;
        self.longitude = draft.longitude;
        self.capacity = draft.capacity;
        self.event_start = draft.event_start;
        self.event_end = draft.event_end;
        self.thumbnail = draft.thumbnail;
        self.tags = draft.tags;
        self.updated_at = now_ms;
    }

    pub fn has_capacity_limit(&self) -> bool {
        self.capacity > 0
    }
}

/// Author-provided post content used for create and full update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostDraft {
    pub kind: PostKind,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub capacity: u32,
    #[serde(default)]
    pub event_start: Option<i64>,
    #[serde(default)]
    pub event_end: Option<i64>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl PostDraft {
    pub fn new(kind: PostKind, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            body: body.into(),
            location: None,
            latitude: None,
            longitude: None,
            capacity: 0,
            event_start: None,
            event_end: None,
            thumbnail: None,
            tags: Vec::new(),
        }
    }

    /// Validates the draft and returns its normalized form.
    pub fn validate(&self) -> Result<PostDraft, ValidationError> {
        let title = require_text("title", &self.title, TITLE_MAX_CHARS)?;
        let body = require_text("body", &self.body, BODY_MAX_CHARS)?;
        let location = optional_text("location", self.location.as_deref(), LOCATION_MAX_CHARS)?;
        let thumbnail = optional_text("thumbnail", self.thumbnail.as_deref(), THUMBNAIL_MAX_CHARS)?;

        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => {
                if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
                    return Err(ValidationError::new("latitude", "must be within [-90, 90]"));
                }
                if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
                    return Err(ValidationError::new(
                        "longitude",
                        "must be within [-180, 180]",
                    ));
                }
            }
            (None, None) => {}
            _ => {
                return Err(ValidationError::new(
                    "latitude",
                    "latitude and longitude must be provided together",
                ));
            }
        }

        if let (Some(start), Some(end)) = (self.event_start, self.event_end) {
            if end < start {
                return Err(ValidationError::new(
                    "event_end",
                    "must not be earlier than event_start",
                ));
            }
        }

        Ok(PostDraft {
            kind: self.kind,
            title,
            body,
            location,
            latitude: self.latitude,
            longitude: self.longitude,
            capacity: self.capacity,
            event_start: self.event_start,
            event_end: self.event_end,
            thumbnail,
            tags: normalize_tags(&self.tags)?,
        })
    }
}

/// Normalizes one tag value: trimmed and lowercased, `None` when blank.
pub fn normalize_tag(tag: &str) -> Option<String> {
    let trimmed = tag.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Normalizes and deduplicates tag values, sorted by name.
pub fn normalize_tags(tags: &[String]) -> Result<Vec<String>, ValidationError> {
    let mut unique = BTreeSet::new();
    for tag in tags {
        let Some(value) = normalize_tag(tag) else {
            return Err(ValidationError::new("tags", "tags must not be blank"));
        };
        if value.chars().count() > TAG_MAX_CHARS {
            return Err(ValidationError::new(
                "tags",
                format!("each tag must be at most {TAG_MAX_CHARS} characters"),
            ));
        }
        unique.insert(value);
    }
    if unique.len() > TAGS_MAX_COUNT {
        return Err(ValidationError::new(
            "tags",
            format!("at most {TAGS_MAX_COUNT} tags are allowed"),
        ));
    }
    Ok(unique.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::{normalize_tags, PostDraft, PostKind};

    #[test]
    fn validate_normalizes_text_and_tags() {
        let mut draft = PostDraft::new(PostKind::Event, "  Hack Night ", " Bring laptops ");
        draft.tags = vec!["CS".into(), " cs ".into(), "Food".into()];
        draft.location = Some("   ".into());

        let normalized = draft.validate().unwrap();
        assert_eq!(normalized.title, "Hack Night");
        assert_eq!(normalized.body, "Bring laptops");
        assert_eq!(normalized.location, None);
        assert_eq!(normalized.tags, vec!["cs".to_string(), "food".to_string()]);
    }

    #[test]
    fn coordinates_must_come_in_pairs_and_range() {
        let mut draft = PostDraft::new(PostKind::Club, "Chess", "Weekly");
        draft.latitude = Some(43.66);
        assert_eq!(draft.validate().unwrap_err().field, "latitude");

        draft.longitude = Some(-200.0);
        assert_eq!(draft.validate().unwrap_err().field, "longitude");

        draft.longitude = Some(-79.39);
        assert!(draft.validate().is_ok());
    }

    #[test]
    fn event_range_must_be_ordered() {
        let mut draft = PostDraft::new(PostKind::Event, "Talk", "Guest talk");
        draft.event_start = Some(2_000);
        draft.event_end = Some(1_000);
        assert_eq!(draft.validate().unwrap_err().field, "event_end");
    }

    #[test]
    fn tag_limits_are_enforced() {
        let many: Vec<String> = (0..11).map(|i| format!("t{i}")).collect();
        assert!(normalize_tags(&many).is_err());
        assert!(normalize_tags(&["  ".to_string()]).is_err());
        assert!(normalize_tags(&["x".repeat(31)]).is_err());
    }

    #[test]
    fn kind_round_trips_through_storage_names() {
        for kind in [
            PostKind::Event,
            PostKind::Club,
            PostKind::Textbook,
            PostKind::Housing,
            PostKind::Volunteer,
            PostKind::Other,
        ] {
            assert_eq!(PostKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(PostKind::parse("party"), None);
    }
}

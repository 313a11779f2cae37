//! Comment model.

use crate::model::post::PostId;
use crate::model::user::UserId;
use crate::model::{require_text, ValidationError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type CommentId = Uuid;

const COMMENT_MAX_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub author_id: UserId,
    pub body: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Comment {
    pub fn new(post_id: PostId, author_id: UserId, body: String, now_ms: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            post_id,
            author_id,
            body,
            created_at: now_ms,
            updated_at: now_ms,
        }
    }

    /// Returns whether the comment was changed after it was posted.
    pub fn is_edited(&self) -> bool {
        self.updated_at > self.created_at
    }
}

/// Trims and bounds a comment body.
pub fn validate_comment_body(body: &str) -> Result<String, ValidationError> {
    require_text("body", body, COMMENT_MAX_CHARS)
}

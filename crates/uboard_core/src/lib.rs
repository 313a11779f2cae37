//! Core domain logic for UBoard.
//! This crate is the single source of truth for business invariants.

pub mod auth;
pub mod clock;
pub mod db;
pub mod logging;
pub mod mail;
pub mod model;
pub mod repo;
pub mod search;
pub mod service;

pub use clock::{Clock, FixedClock, SystemClock};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status};
pub use mail::{LogMailer, Mailer, MemoryMailer, OutboundEmail};
pub use model::comment::{Comment, CommentId};
pub use model::post::{Post, PostDraft, PostId, PostKind};
pub use model::user::{NewUser, User, UserId, UserProfile};
pub use model::ValidationError;
pub use repo::comment_repo::{CommentView, SqliteCommentRepository};
pub use repo::post_repo::{
    BoundingBox, MapPin, MapQuery, PostListQuery, PostView, SqlitePostRepository, TagCount,
};
pub use repo::token_repo::SqliteTokenRepository;
pub use repo::user_repo::SqliteUserRepository;
pub use repo::{Page, RepoError, RepoResult};
pub use search::fts::{search_posts, SearchError, SearchHit, SearchQuery, SearchResult};
pub use service::auth_service::{AuthContext, AuthError, AuthPolicy, AuthService, SignInResult};
pub use service::comment_service::{CommentService, CommentServiceError};
pub use service::post_service::{EngagementState, PostService, PostServiceError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}

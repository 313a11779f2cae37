//! Post use-case service.
//!
//! # Responsibility
//! - Create, replace and soft-delete posts on behalf of their author.
//! - Serve feed pages, map pins and tag counts.
//! - Toggle likes and check-ins, enforcing capacity.
//!
//! # Invariants
//! - Only the author may update or delete a post.
//! - Update uses full replacement semantics, tags included.
//! - Capacity may not be lowered below the current check-in count.

use crate::clock::Clock;
use crate::model::post::{normalize_tag, Post, PostDraft, PostId};
use crate::model::user::UserId;
use crate::model::ValidationError;
use crate::repo::post_repo::{
    BoundingBox, CheckInOutcome, MapPin, MapQuery, PostListQuery, PostRepository, PostView,
    TagCount, UpdateOutcome,
};
use crate::repo::{Page, RepoError};
use log::info;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Service error for post use-cases.
#[derive(Debug)]
pub enum PostServiceError {
    Validation(ValidationError),
    /// Target post does not exist or was deleted.
    PostNotFound(PostId),
    /// Actor is not the author.
    Forbidden,
    CapacityReached { capacity: u32 },
    Repo(RepoError),
    /// Internal consistency mismatch between write and read-back.
    InconsistentState(&'static str),
}

impl Display for PostServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::PostNotFound(id) => write!(f, "post not found: {id}"),
            Self::Forbidden => write!(f, "only the author may modify this post"),
            Self::CapacityReached { capacity } => {
                write!(f, "post reached its capacity of {capacity}")
            }
            Self::Repo(err) => write!(f, "{err}"),
            Self::InconsistentState(details) => write!(f, "inconsistent post state: {details}"),
        }
    }
}

impl Error for PostServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for PostServiceError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<RepoError> for PostServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::PostNotFound(id),
            other => Self::Repo(other),
        }
    }
}

/// Count and viewer state after a like or check-in toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngagementState {
    pub count: u64,
    pub active: bool,
}

pub struct PostService<R: PostRepository> {
    repo: R,
    clock: Arc<dyn Clock>,
}

impl<R: PostRepository> PostService<R> {
    pub fn new(repo: R, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }

    pub fn create_post(
        &self,
        author: UserId,
        draft: &PostDraft,
    ) -> Result<PostView, PostServiceError> {
        let draft = draft.validate()?;
        let post = Post::from_draft(author, draft, self.clock.now_ms());
        self.repo.create_post(&post)?;
        info!(
            "event=post_create module=post status=ok post_id={} kind={} tags={}",
            post.id,
            post.kind.as_str(),
            post.tags.len()
        );
        self.read_back(post.id, author)
    }

    /// Replaces every editable field of the post, tags included.
    pub fn update_post(
        &self,
        actor: UserId,
        id: PostId,
        draft: &PostDraft,
    ) -> Result<PostView, PostServiceError> {
        let current = self.owned_post(actor, id)?;
        let draft = draft.validate()?;

        let mut post = current.post;
        post.apply_draft(draft, self.clock.now_ms());
        if let UpdateOutcome::CapacityBelowCheckIns { checkins } = self.repo.update_post(&post)? {
            info!(
                "event=post_update module=post status=rejected reason=capacity post_id={id} checkins={checkins}"
            );
            return Err(ValidationError::new(
                "capacity",
                format!("cannot be lower than the current {checkins} check-ins"),
            )
            .into());
        }
        info!("event=post_update module=post status=ok post_id={id}");
        self.read_back(id, actor)
    }

    pub fn delete_post(&self, actor: UserId, id: PostId) -> Result<(), PostServiceError> {
        self.owned_post(actor, id)?;
        self.repo.soft_delete_post(id, self.clock.now_ms())?;
        info!("event=post_delete module=post status=ok post_id={id}");
        Ok(())
    }

    pub fn get_post(&self, viewer: UserId, id: PostId) -> Result<PostView, PostServiceError> {
        self.repo
            .get_post_view(id, viewer)?
            .ok_or(PostServiceError::PostNotFound(id))
    }

    /// Returns one feed page, newest first.
    pub fn list_posts(
        &self,
        viewer: UserId,
        query: &PostListQuery,
    ) -> Result<Page<PostView>, PostServiceError> {
        let mut query = query.clone();
        query.tag = query.tag.as_deref().and_then(normalize_tag);
        query.text = query
            .text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string);
        Ok(self.repo.list_posts(&query, viewer)?)
    }

    pub fn map_pins(&self, query: &MapQuery) -> Result<Vec<MapPin>, PostServiceError> {
        if let Some(bounds) = &query.bounds {
            validate_bounds(bounds)?;
        }
        Ok(self.repo.map_pins(query)?)
    }

    pub fn like(&self, user: UserId, id: PostId) -> Result<EngagementState, PostServiceError> {
        let count = self.repo.set_like(id, user, true, self.clock.now_ms())?;
        Ok(EngagementState {
            count,
            active: true,
        })
    }

    pub fn unlike(&self, user: UserId, id: PostId) -> Result<EngagementState, PostServiceError> {
        let count = self.repo.set_like(id, user, false, self.clock.now_ms())?;
        Ok(EngagementState {
            count,
            active: false,
        })
    }

    pub fn check_in(
        &self,
        user: UserId,
        id: PostId,
    ) -> Result<EngagementState, PostServiceError> {
        match self.repo.check_in(id, user, self.clock.now_ms())? {
            CheckInOutcome::CheckedIn { count } => {
                info!("event=post_checkin module=post status=ok post_id={id} count={count}");
                Ok(EngagementState {
                    count,
                    active: true,
                })
            }
            CheckInOutcome::Full { capacity } => {
                info!(
                    "event=post_checkin module=post status=rejected reason=full post_id={id} capacity={capacity}"
                );
                Err(PostServiceError::CapacityReached { capacity })
            }
        }
    }

    pub fn check_out(
        &self,
        user: UserId,
        id: PostId,
    ) -> Result<EngagementState, PostServiceError> {
        let count = self.repo.check_out(id, user)?;
        Ok(EngagementState {
            count,
            active: false,
        })
    }

    pub fn list_tags(&self) -> Result<Vec<TagCount>, PostServiceError> {
        Ok(self.repo.list_tags()?)
    }

    fn owned_post(&self, actor: UserId, id: PostId) -> Result<PostView, PostServiceError> {
        let current = self.get_post(actor, id)?;
        if current.post.author_id != actor {
            info!(
                "event=post_write module=post status=rejected reason=forbidden post_id={id} actor={actor}"
            );
            return Err(PostServiceError::Forbidden);
        }
        Ok(current)
    }

    fn read_back(&self, id: PostId, viewer: UserId) -> Result<PostView, PostServiceError> {
        self.repo
            .get_post_view(id, viewer)?
            .ok_or(PostServiceError::InconsistentState(
                "written post missing on read-back",
            ))
    }
}

fn validate_bounds(bounds: &BoundingBox) -> Result<(), ValidationError> {
    for (field, value, limit) in [
        ("min_lat", bounds.min_lat, 90.0),
        ("max_lat", bounds.max_lat, 90.0),
        ("min_lng", bounds.min_lng, 180.0),
        ("max_lng", bounds.max_lng, 180.0),
    ] {
        if !value.is_finite() || value.abs() > limit {
            return Err(ValidationError::new(
                field,
                format!("must be within [-{limit}, {limit}]"),
            ));
        }
    }
    if bounds.min_lat > bounds.max_lat {
        return Err(ValidationError::new(
            "min_lat",
            "must not be greater than max_lat",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::validate_bounds;
    use crate::repo::post_repo::BoundingBox;

    fn bounds(min_lat: f64, max_lat: f64, min_lng: f64, max_lng: f64) -> BoundingBox {
        BoundingBox {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        }
    }

    #[test]
    fn bounds_accept_antimeridian_wrap() {
        assert!(validate_bounds(&bounds(43.0, 44.0, 170.0, -170.0)).is_ok());
    }

    #[test]
    fn bounds_reject_out_of_range_and_inverted_latitudes() {
        let err = validate_bounds(&bounds(-91.0, 0.0, 0.0, 1.0)).unwrap_err();
        assert_eq!(err.field, "min_lat");
        let err = validate_bounds(&bounds(10.0, 5.0, 0.0, 1.0)).unwrap_err();
        assert_eq!(err.field, "min_lat");
        let err = validate_bounds(&bounds(0.0, 1.0, 0.0, f64::NAN)).unwrap_err();
        assert_eq!(err.field, "max_lng");
    }
}

//! Comment use-case service.
//!
//! # Invariants
//! - Comments can only be added to visible posts.
//! - Only the author may edit or delete a comment.

use crate::clock::Clock;
use crate::model::comment::{validate_comment_body, Comment, CommentId};
use crate::model::post::PostId;
use crate::model::user::UserId;
use crate::model::ValidationError;
use crate::repo::comment_repo::{CommentRepository, CommentView};
use crate::repo::{Page, RepoError};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

#[derive(Debug)]
pub enum CommentServiceError {
    Validation(ValidationError),
    PostNotFound(PostId),
    CommentNotFound(CommentId),
    /// Actor is not the comment author.
    Forbidden,
    Repo(RepoError),
    InconsistentState(&'static str),
}

impl Display for CommentServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::PostNotFound(id) => write!(f, "post not found: {id}"),
            Self::CommentNotFound(id) => write!(f, "comment not found: {id}"),
            Self::Forbidden => write!(f, "only the author may modify this comment"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::InconsistentState(details) => {
                write!(f, "inconsistent comment state: {details}")
            }
        }
    }
}

impl Error for CommentServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for CommentServiceError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<RepoError> for CommentServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::CommentNotFound(id),
            other => Self::Repo(other),
        }
    }
}

pub struct CommentService<R: CommentRepository> {
    repo: R,
    clock: Arc<dyn Clock>,
}

impl<R: CommentRepository> CommentService<R> {
    pub fn new(repo: R, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }

    pub fn add_comment(
        &self,
        author: UserId,
        post_id: PostId,
        body: &str,
    ) -> Result<CommentView, CommentServiceError> {
        let body = validate_comment_body(body)?;
        self.ensure_post(post_id)?;

        let comment = Comment::new(post_id, author, body, self.clock.now_ms());
        self.repo.create_comment(&comment)?;
        info!(
            "event=comment_add module=comment status=ok comment_id={} post_id={post_id}",
            comment.id
        );
        self.repo
            .get_comment(comment.id)?
            .ok_or(CommentServiceError::InconsistentState(
                "written comment missing on read-back",
            ))
    }

    pub fn edit_comment(
        &self,
        actor: UserId,
        id: CommentId,
        body: &str,
    ) -> Result<CommentView, CommentServiceError> {
        let body = validate_comment_body(body)?;
        self.owned_comment(actor, id)?;
        self.repo
            .update_comment_body(id, &body, self.clock.now_ms())?;
        info!("event=comment_edit module=comment status=ok comment_id={id}");
        self.repo
            .get_comment(id)?
            .ok_or(CommentServiceError::CommentNotFound(id))
    }

    pub fn delete_comment(&self, actor: UserId, id: CommentId) -> Result<(), CommentServiceError> {
        self.owned_comment(actor, id)?;
        self.repo.delete_comment(id)?;
        info!("event=comment_delete module=comment status=ok comment_id={id}");
        Ok(())
    }

    /// Lists comments of a post, oldest first.
    pub fn list_comments(
        &self,
        post_id: PostId,
        limit: Option<u32>,
        offset: u32,
    ) -> Result<Page<CommentView>, CommentServiceError> {
        self.ensure_post(post_id)?;
        Ok(self.repo.list_comments(post_id, limit, offset)?)
    }

    fn ensure_post(&self, post_id: PostId) -> Result<(), CommentServiceError> {
        if !self.repo.post_exists(post_id)? {
            return Err(CommentServiceError::PostNotFound(post_id));
        }
        Ok(())
    }

    fn owned_comment(&self, actor: UserId, id: CommentId) -> Result<CommentView, CommentServiceError> {
        let view = self
            .repo
            .get_comment(id)?
            .ok_or(CommentServiceError::CommentNotFound(id))?;
        if view.comment.author_id != actor {
            info!(
                "event=comment_write module=comment status=rejected reason=forbidden comment_id={id} actor={actor}"
            );
            return Err(CommentServiceError::Forbidden);
        }
        Ok(view)
    }
}

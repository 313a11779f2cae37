//! Comment repository.
//!
//! # Invariants
//! - Comments on soft-deleted posts are neither listed nor writable.
//! - Listing order is `created_at ASC, id ASC`.

use crate::model::comment::{Comment, CommentId};
use crate::model::post::PostId;
use crate::repo::post_repo::{post_visible, AuthorSummary};
use crate::repo::{normalize_limit, parse_uuid, Page, RepoError, RepoResult};
use rusqlite::{params, Connection, Row};
use serde::Serialize;

const COMMENT_VIEW_SELECT_SQL: &str = "SELECT
    c.id AS id,
    c.post_id AS post_id,
    c.author_id AS author_id,
    c.body AS body,
    c.created_at AS created_at,
    c.updated_at AS updated_at,
    u.username AS author_username,
    u.first_name AS author_first_name,
    u.last_name AS author_last_name
FROM comments c
INNER JOIN users u ON u.id = c.author_id
INNER JOIN posts p ON p.id = c.post_id AND p.is_deleted = 0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommentView {
    #[serde(flatten)]
    pub comment: Comment,
    pub author: AuthorSummary,
    pub edited: bool,
}

pub trait CommentRepository {
    fn post_exists(&self, post_id: PostId) -> RepoResult<bool>;
    fn create_comment(&self, comment: &Comment) -> RepoResult<()>;
    fn get_comment(&self, id: CommentId) -> RepoResult<Option<CommentView>>;
    fn update_comment_body(&self, id: CommentId, body: &str, now_ms: i64) -> RepoResult<()>;
    fn delete_comment(&self, id: CommentId) -> RepoResult<()>;
    fn list_comments(
        &self,
        post_id: PostId,
        limit: Option<u32>,
        offset: u32,
    ) -> RepoResult<Page<CommentView>>;
}

pub struct SqliteCommentRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCommentRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl CommentRepository for SqliteCommentRepository<'_> {
    fn post_exists(&self, post_id: PostId) -> RepoResult<bool> {
        post_visible(self.conn, &post_id.to_string())
    }

    fn create_comment(&self, comment: &Comment) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO comments (id, post_id, author_id, body, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                comment.id.to_string(),
                comment.post_id.to_string(),
                comment.author_id.to_string(),
                comment.body.as_str(),
                comment.created_at,
                comment.updated_at,
            ],
        )?;
        Ok(())
    }

    fn get_comment(&self, id: CommentId) -> RepoResult<Option<CommentView>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{COMMENT_VIEW_SELECT_SQL} WHERE c.id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_comment_view_row(row)?));
        }
        Ok(None)
    }

    fn update_comment_body(&self, id: CommentId, body: &str, now_ms: i64) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE comments SET body = ?2, updated_at = ?3 WHERE id = ?1;",
            params![id.to_string(), body, now_ms],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }

    fn delete_comment(&self, id: CommentId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM comments WHERE id = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }

    fn list_comments(
        &self,
        post_id: PostId,
        limit: Option<u32>,
        offset: u32,
    ) -> RepoResult<Page<CommentView>> {
        let post_text = post_id.to_string();
        let limit = normalize_limit(limit);

        let total: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM comments WHERE post_id = ?1;",
            [post_text.as_str()],
            |row| row.get(0),
        )?;

        let mut stmt = self.conn.prepare(&format!(
            "{COMMENT_VIEW_SELECT_SQL}
             WHERE c.post_id = ?1
             ORDER BY c.created_at ASC, c.id ASC
             LIMIT ?2 OFFSET ?3;"
        ))?;
        let mut rows = stmt.query(params![
            post_text.as_str(),
            i64::from(limit),
            i64::from(offset)
        ])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_comment_view_row(row)?);
        }

        Ok(Page {
            items,
            total: u64::try_from(total).unwrap_or_default(),
            limit,
            offset,
        })
    }
}

fn parse_comment_view_row(row: &Row<'_>) -> RepoResult<CommentView> {
    let id_text: String = row.get("id")?;
    let post_text: String = row.get("post_id")?;
    let author_text: String = row.get("author_id")?;
    let author_id = parse_uuid(&author_text, "comments.author_id")?;

    let comment = Comment {
        id: parse_uuid(&id_text, "comments.id")?,
        post_id: parse_uuid(&post_text, "comments.post_id")?,
        author_id,
        body: row.get("body")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    };
    let edited = comment.is_edited();

    Ok(CommentView {
        comment,
        author: AuthorSummary {
            id: author_id,
            username: row.get("author_username")?,
            first_name: row.get("author_first_name")?,
            last_name: row.get("author_last_name")?,
        },
        edited,
    })
}

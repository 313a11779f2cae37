//! Post, tag, like and check-in repository.
//!
//! # Responsibility
//! - Persist posts together with their tag links.
//! - Provide the feed, map and detail read models with engagement counts.
//! - Own like/check-in writes, including the capacity check.
//!
//! # Invariants
//! - All reads and engagement writes ignore soft-deleted posts.
//! - Tag links are replaced as a whole inside the post write transaction.
//! - Capacity is checked and written inside one immediate transaction, both on
//!   check-in and on post update.
//! - Feed order is `created_at DESC, id ASC`.

use crate::db::bool_to_int;
use crate::model::post::{Post, PostId, PostKind};
use crate::model::user::UserId;
use crate::repo::{normalize_limit, parse_flag, parse_uuid, Page, RepoError, RepoResult};
use crate::search::fts::build_match_expression;
use rusqlite::types::Value;
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Row, Transaction,
    TransactionBehavior,
};
use serde::Serialize;

const MAP_PINS_DEFAULT_LIMIT: u32 = 200;

const POST_VIEW_SELECT_SQL: &str = "SELECT
    p.id AS id,
    p.author_id AS author_id,
    p.kind AS kind,
    p.title AS title,
    p.body AS body,
    p.location AS location,
    p.latitude AS latitude,
    p.longitude AS longitude,
    p.capacity AS capacity,
    p.event_start AS event_start,
    p.event_end AS event_end,
    p.thumbnail AS thumbnail,
    p.created_at AS created_at,
    p.updated_at AS updated_at,
    p.is_deleted AS is_deleted,
    u.username AS author_username,
    u.first_name AS author_first_name,
    u.last_name AS author_last_name,
    (SELECT COUNT(*) FROM post_likes l WHERE l.post_id = p.id) AS like_count,
    EXISTS(SELECT 1 FROM post_likes l WHERE l.post_id = p.id AND l.user_id = ?1) AS liked_by_viewer,
    (SELECT COUNT(*) FROM post_checkins c WHERE c.post_id = p.id) AS checkin_count,
    EXISTS(SELECT 1 FROM post_checkins c WHERE c.post_id = p.id AND c.user_id = ?1) AS checked_in_by_viewer,
    (SELECT COUNT(*) FROM comments cm WHERE cm.post_id = p.id) AS comment_count
FROM posts p
INNER JOIN users u ON u.id = p.author_id";

/// Public identity of a post or comment author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorSummary {
    pub id: UserId,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

/// Post read model as seen by one viewer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    pub author: AuthorSummary,
    pub like_count: u64,
    pub liked_by_viewer: bool,
    pub checkin_count: u64,
    pub checked_in_by_viewer: bool,
    pub comment_count: u64,
}

/// Filters and pagination for the feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostListQuery {
    pub kind: Option<PostKind>,
    /// Exact tag match, already normalized.
    pub tag: Option<String>,
    pub author: Option<UserId>,
    /// Free text matched against title and body.
    pub text: Option<String>,
    /// Defaults to 10 and clamps to 50.
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Latitude/longitude rectangle. `min_lng > max_lng` wraps the antimeridian.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapQuery {
    pub bounds: Option<BoundingBox>,
    pub kind: Option<PostKind>,
    /// Defaults to 200 and clamps to 200.
    pub limit: Option<u32>,
}

/// Minimal projection for rendering a post on the map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapPin {
    pub id: PostId,
    pub kind: PostKind,
    pub title: String,
    pub latitude: f64,
    pub longitude: f64,
    pub location: Option<String>,
    pub event_start: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagCount {
    pub name: String,
    pub post_count: u64,
}

/// Result of a check-in attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckInOutcome {
    /// The user is checked in; `count` includes them.
    CheckedIn { count: u64 },
    /// The post reached its capacity; nothing was written.
    Full { capacity: u32 },
}

/// Result of a post update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    /// The new capacity is below the current check-in count; nothing was written.
    CapacityBelowCheckIns { checkins: u64 },
}

pub trait PostRepository {
    /// Inserts the post and its tag links.
    fn create_post(&self, post: &Post) -> RepoResult<()>;
    /// Replaces editable fields and tag links of a visible post.
    ///
    /// A limited capacity is compared with the check-in count in the same
    /// transaction as the write.
    fn update_post(&self, post: &Post) -> RepoResult<UpdateOutcome>;
    /// Gets a visible post.
    fn get_post(&self, id: PostId) -> RepoResult<Option<Post>>;
    fn soft_delete_post(&self, id: PostId, now_ms: i64) -> RepoResult<()>;
    fn get_post_view(&self, id: PostId, viewer: UserId) -> RepoResult<Option<PostView>>;
    fn list_posts(&self, query: &PostListQuery, viewer: UserId) -> RepoResult<Page<PostView>>;
    fn map_pins(&self, query: &MapQuery) -> RepoResult<Vec<MapPin>>;
    /// Adds or removes a like and returns the resulting like count.
    fn set_like(&self, post_id: PostId, user_id: UserId, liked: bool, now_ms: i64)
        -> RepoResult<u64>;
    fn check_in(&self, post_id: PostId, user_id: UserId, now_ms: i64)
        -> RepoResult<CheckInOutcome>;
    /// Removes a check-in and returns the resulting check-in count.
    fn check_out(&self, post_id: PostId, user_id: UserId) -> RepoResult<u64>;
    /// Tags attached to at least one visible post, by name.
    fn list_tags(&self) -> RepoResult<Vec<TagCount>>;
}

pub struct SqlitePostRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqlitePostRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn ensure_visible(&self, post_id: PostId) -> RepoResult<()> {
        if !post_visible(self.conn, &post_id.to_string())? {
            return Err(RepoError::NotFound(post_id));
        }
        Ok(())
    }
}

impl PostRepository for SqlitePostRepository<'_> {
    fn create_post(&self, post: &Post) -> RepoResult<()> {
        let id_text = post.id.to_string();
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO posts (
                id,
                author_id,
                kind,
                title,
                body,
                location,
                latitude,
                longitude,
                capacity,
                event_start,
                event_end,
                thumbnail,
                created_at,
                updated_at,
                is_deleted
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15);",
            params![
                id_text.as_str(),
                post.author_id.to_string(),
                post.kind.as_str(),
                post.title.as_str(),
                post.body.as_str(),
                post.location.as_deref(),
                post.latitude,
                post.longitude,
                i64::from(post.capacity),
                post.event_start,
                post.event_end,
                post.thumbnail.as_deref(),
                post.created_at,
                post.updated_at,
                bool_to_int(post.is_deleted),
            ],
        )?;
        replace_tags(&tx, id_text.as_str(), &post.tags)?;
        tx.commit()?;
        Ok(())
    }

    fn update_post(&self, post: &Post) -> RepoResult<UpdateOutcome> {
        let id_text = post.id.to_string();
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        if post.has_capacity_limit() {
            let checkins = count_rows(&tx, "post_checkins", id_text.as_str())?;
            if checkins > u64::from(post.capacity) {
                return Ok(UpdateOutcome::CapacityBelowCheckIns { checkins });
            }
        }

        let changed = tx.execute(
            "UPDATE posts
             SET
                kind = ?2,
                title = ?3,
                body = ?4,
                location = ?5,
                latitude = ?6,
                longitude = ?7,
                capacity = ?8,
                event_start = ?9,
                event_end = ?10,
                thumbnail = ?11,
                updated_at = ?12
             WHERE id = ?1
               AND is_deleted = 0;",
            params![
                id_text.as_str(),
                post.kind.as_str(),
                post.title.as_str(),
                post.body.as_str(),
                post.location.as_deref(),
                post.latitude,
                post.longitude,
                i64::from(post.capacity),
                post.event_start,
                post.event_end,
                post.thumbnail.as_deref(),
                post.updated_at,
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(post.id));
        }
        replace_tags(&tx, id_text.as_str(), &post.tags)?;
        tx.commit()?;
        Ok(UpdateOutcome::Updated)
    }

    fn get_post(&self, id: PostId) -> RepoResult<Option<Post>> {
        let view = self.get_post_view(id, UserId::nil())?;
        Ok(view.map(|view| view.post))
    }

    fn soft_delete_post(&self, id: PostId, now_ms: i64) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE posts
             SET is_deleted = 1, updated_at = ?2
             WHERE id = ?1
               AND is_deleted = 0;",
            params![id.to_string(), now_ms],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }

    fn get_post_view(&self, id: PostId, viewer: UserId) -> RepoResult<Option<PostView>> {
        let mut stmt = self.conn.prepare(&format!(
            "{POST_VIEW_SELECT_SQL}
             WHERE p.id = ?2
               AND p.is_deleted = 0;"
        ))?;
        let mut rows = stmt.query(params![viewer.to_string(), id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_post_view_row(self.conn, row)?));
        }
        Ok(None)
    }

    fn list_posts(&self, query: &PostListQuery, viewer: UserId) -> RepoResult<Page<PostView>> {
        let limit = normalize_limit(query.limit);

        let mut count_binds = Vec::new();
        let count_filter = build_feed_filter(query, &mut count_binds);
        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM posts p WHERE {count_filter};"),
            params_from_iter(count_binds),
            |row| row.get(0),
        )?;

        let mut binds = vec![Value::Text(viewer.to_string())];
        let filter = build_feed_filter(query, &mut binds);
        let limit_param = push_bind(&mut binds, Value::Integer(i64::from(limit)));
        let offset_param = push_bind(&mut binds, Value::Integer(i64::from(query.offset)));
        let sql = format!(
            "{POST_VIEW_SELECT_SQL}
             WHERE {filter}
             ORDER BY p.created_at DESC, p.id ASC
             LIMIT {limit_param} OFFSET {offset_param};"
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(binds))?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_post_view_row(self.conn, row)?);
        }

        Ok(Page {
            items,
            total: u64::try_from(total).unwrap_or_default(),
            limit,
            offset: query.offset,
        })
    }

    fn map_pins(&self, query: &MapQuery) -> RepoResult<Vec<MapPin>> {
        let mut sql = String::from(
            "SELECT id, kind, title, latitude, longitude, location, event_start
             FROM posts
             WHERE is_deleted = 0
               AND latitude IS NOT NULL
               AND longitude IS NOT NULL",
        );
        let mut binds: Vec<Value> = Vec::new();

        if let Some(bounds) = query.bounds {
            let min_lat = push_bind(&mut binds, Value::Real(bounds.min_lat));
            let max_lat = push_bind(&mut binds, Value::Real(bounds.max_lat));
            let min_lng = push_bind(&mut binds, Value::Real(bounds.min_lng));
            let max_lng = push_bind(&mut binds, Value::Real(bounds.max_lng));
            sql.push_str(&format!(" AND latitude BETWEEN {min_lat} AND {max_lat}"));
            if bounds.min_lng <= bounds.max_lng {
                sql.push_str(&format!(" AND longitude BETWEEN {min_lng} AND {max_lng}"));
            } else {
                sql.push_str(&format!(
                    " AND (longitude >= {min_lng} OR longitude <= {max_lng})"
                ));
            }
        }

        if let Some(kind) = query.kind {
            let kind_param = push_bind(&mut binds, Value::Text(kind.as_str().to_string()));
            sql.push_str(&format!(" AND kind = {kind_param}"));
        }

        let limit = match query.limit {
            Some(value) if value > 0 => value.min(MAP_PINS_DEFAULT_LIMIT),
            _ => MAP_PINS_DEFAULT_LIMIT,
        };
        let limit_param = push_bind(&mut binds, Value::Integer(i64::from(limit)));
        sql.push_str(&format!(
            " ORDER BY created_at DESC, id ASC LIMIT {limit_param};"
        ));

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(binds))?;
        let mut pins = Vec::new();
        while let Some(row) = rows.next()? {
            let id_text: String = row.get("id")?;
            pins.push(MapPin {
                id: parse_uuid(&id_text, "posts.id")?,
                kind: parse_kind(&row.get::<_, String>("kind")?)?,
                title: row.get("title")?,
                latitude: row.get("latitude")?,
                longitude: row.get("longitude")?,
                location: row.get("location")?,
                event_start: row.get("event_start")?,
            });
        }
        Ok(pins)
    }

    fn set_like(
        &self,
        post_id: PostId,
        user_id: UserId,
        liked: bool,
        now_ms: i64,
    ) -> RepoResult<u64> {
        self.ensure_visible(post_id)?;
        let post_text = post_id.to_string();
        if liked {
            self.conn.execute(
                "INSERT OR IGNORE INTO post_likes (post_id, user_id, created_at)
                 VALUES (?1, ?2, ?3);",
                params![post_text.as_str(), user_id.to_string(), now_ms],
            )?;
        } else {
            self.conn.execute(
                "DELETE FROM post_likes WHERE post_id = ?1 AND user_id = ?2;",
                params![post_text.as_str(), user_id.to_string()],
            )?;
        }
        count_rows(self.conn, "post_likes", post_text.as_str())
    }

    fn check_in(
        &self,
        post_id: PostId,
        user_id: UserId,
        now_ms: i64,
    ) -> RepoResult<CheckInOutcome> {
        let post_text = post_id.to_string();
        let user_text = user_id.to_string();
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let capacity: Option<i64> = tx
            .query_row(
                "SELECT capacity FROM posts WHERE id = ?1 AND is_deleted = 0;",
                [post_text.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(capacity) = capacity else {
            return Err(RepoError::NotFound(post_id));
        };
        let capacity = u32::try_from(capacity).map_err(|_| {
            RepoError::InvalidData(format!("invalid capacity `{capacity}` in posts.capacity"))
        })?;

        let already: i64 = tx.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM post_checkins WHERE post_id = ?1 AND user_id = ?2
            );",
            params![post_text.as_str(), user_text.as_str()],
            |row| row.get(0),
        )?;
        let count = count_rows(&tx, "post_checkins", post_text.as_str())?;

        if already == 1 {
            tx.commit()?;
            return Ok(CheckInOutcome::CheckedIn { count });
        }

        if capacity > 0 && count >= u64::from(capacity) {
            return Ok(CheckInOutcome::Full { capacity });
        }

        tx.execute(
            "INSERT INTO post_checkins (post_id, user_id, created_at) VALUES (?1, ?2, ?3);",
            params![post_text.as_str(), user_text.as_str(), now_ms],
        )?;
        tx.commit()?;
        Ok(CheckInOutcome::CheckedIn { count: count + 1 })
    }

    fn check_out(&self, post_id: PostId, user_id: UserId) -> RepoResult<u64> {
        self.ensure_visible(post_id)?;
        let post_text = post_id.to_string();
        self.conn.execute(
            "DELETE FROM post_checkins WHERE post_id = ?1 AND user_id = ?2;",
            params![post_text.as_str(), user_id.to_string()],
        )?;
        count_rows(self.conn, "post_checkins", post_text.as_str())
    }

    fn list_tags(&self) -> RepoResult<Vec<TagCount>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.name AS name, COUNT(p.id) AS post_count
             FROM tags t
             INNER JOIN post_tags pt ON pt.tag_id = t.id
             INNER JOIN posts p ON p.id = pt.post_id AND p.is_deleted = 0
             GROUP BY t.id
             ORDER BY t.name COLLATE NOCASE ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut tags = Vec::new();
        while let Some(row) = rows.next()? {
            let name: String = row.get("name")?;
            let post_count: i64 = row.get("post_count")?;
            tags.push(TagCount {
                name: name.to_lowercase(),
                post_count: u64::try_from(post_count).unwrap_or_default(),
            });
        }
        Ok(tags)
    }
}

/// Returns whether the post exists and is not soft-deleted.
pub(crate) fn post_visible(conn: &Connection, post_id: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM posts WHERE id = ?1 AND is_deleted = 0);",
        [post_id],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

/// Appends a bind value and returns its numbered placeholder.
fn push_bind(binds: &mut Vec<Value>, value: Value) -> String {
    binds.push(value);
    format!("?{}", binds.len())
}

fn build_feed_filter(query: &PostListQuery, binds: &mut Vec<Value>) -> String {
    let mut clauses = vec!["p.is_deleted = 0".to_string()];

    if let Some(kind) = query.kind {
        let param = push_bind(binds, Value::Text(kind.as_str().to_string()));
        clauses.push(format!("p.kind = {param}"));
    }

    if let Some(author) = query.author {
        let param = push_bind(binds, Value::Text(author.to_string()));
        clauses.push(format!("p.author_id = {param}"));
    }

    if let Some(tag) = query.tag.as_ref() {
        let param = push_bind(binds, Value::Text(tag.clone()));
        clauses.push(format!(
            "EXISTS (
                SELECT 1
                FROM post_tags pt
                INNER JOIN tags t ON t.id = pt.tag_id
                WHERE pt.post_id = p.id
                  AND t.name = {param} COLLATE NOCASE
            )"
        ));
    }

    if let Some(expr) = query
        .text
        .as_deref()
        .and_then(|text| build_match_expression(text, false))
    {
        let param = push_bind(binds, Value::Text(expr));
        clauses.push(format!(
            "p.id IN (SELECT post_id FROM posts_fts WHERE posts_fts MATCH {param})"
        ));
    }

    clauses.join(" AND ")
}

fn replace_tags(tx: &Transaction<'_>, post_id: &str, tags: &[String]) -> RepoResult<()> {
    tx.execute("DELETE FROM post_tags WHERE post_id = ?1;", [post_id])?;
    for tag in tags {
        tx.execute("INSERT OR IGNORE INTO tags (name) VALUES (?1);", [tag.as_str()])?;
        tx.execute(
            "INSERT OR IGNORE INTO post_tags (post_id, tag_id)
             SELECT ?1, id
             FROM tags
             WHERE name = ?2 COLLATE NOCASE;",
            params![post_id, tag.as_str()],
        )?;
    }
    Ok(())
}

fn load_tags(conn: &Connection, post_id: &str) -> RepoResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT t.name
         FROM post_tags pt
         INNER JOIN tags t ON t.id = pt.tag_id
         WHERE pt.post_id = ?1
         ORDER BY t.name COLLATE NOCASE ASC;",
    )?;
    let mut rows = stmt.query([post_id])?;
    let mut tags = Vec::new();
    while let Some(row) = rows.next()? {
        let value: String = row.get(0)?;
        tags.push(value.to_lowercase());
    }
    Ok(tags)
}

fn count_rows(conn: &Connection, table: &'static str, post_id: &str) -> RepoResult<u64> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {table} WHERE post_id = ?1;"),
        [post_id],
        |row| row.get(0),
    )?;
    Ok(u64::try_from(count).unwrap_or_default())
}

fn parse_kind(value: &str) -> RepoResult<PostKind> {
    PostKind::parse(value)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid post kind `{value}` in posts.kind")))
}

fn parse_count(row: &Row<'_>, column: &str) -> RepoResult<u64> {
    let value: i64 = row.get(column)?;
    u64::try_from(value)
        .map_err(|_| RepoError::InvalidData(format!("negative count `{value}` in {column}")))
}

fn parse_post_view_row(conn: &Connection, row: &Row<'_>) -> RepoResult<PostView> {
    let id_text: String = row.get("id")?;
    let author_text: String = row.get("author_id")?;
    let author_id = parse_uuid(&author_text, "posts.author_id")?;
    let capacity: i64 = row.get("capacity")?;

    let post = Post {
        id: parse_uuid(&id_text, "posts.id")?,
        author_id,
        kind: parse_kind(&row.get::<_, String>("kind")?)?,
        title: row.get("title")?,
        body: row.get("body")?,
        location: row.get("location")?,
        latitude: row.get("latitude")?,
        longitude: row.get("longitude")?,
        capacity: u32::try_from(capacity).map_err(|_| {
            RepoError::InvalidData(format!("invalid capacity `{capacity}` in posts.capacity"))
        })?,
        event_start: row.get("event_start")?,
        event_end: row.get("event_end")?,
        thumbnail: row.get("thumbnail")?,
        tags: load_tags(conn, &id_text)?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        is_deleted: parse_flag(row.get("is_deleted")?, "posts.is_deleted")?,
    };

    Ok(PostView {
        post,
        author: AuthorSummary {
            id: author_id,
            username: row.get("author_username")?,
            first_name: row.get("author_first_name")?,
            last_name: row.get("author_last_name")?,
        },
        like_count: parse_count(row, "like_count")?,
        liked_by_viewer: parse_flag(row.get("liked_by_viewer")?, "liked_by_viewer")?,
        checkin_count: parse_count(row, "checkin_count")?,
        checked_in_by_viewer: parse_flag(row.get("checked_in_by_viewer")?, "checked_in_by_viewer")?,
        comment_count: parse_count(row, "comment_count")?,
    })
}

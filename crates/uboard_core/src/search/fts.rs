//! SQLite FTS5-based post search.
//!
//! # Responsibility
//! - Provide keyword search over post titles and bodies.
//! - Build safe FTS5 match expressions from free user input.
//!
//! # Invariants
//! - Only non-deleted posts are returned.
//! - Result ordering is deterministic by rank, `created_at` and id.

use crate::db::DbError;
use crate::model::post::{PostId, PostKind};
use crate::repo::parse_uuid;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

const SEARCH_DEFAULT_LIMIT: u32 = 20;
const SEARCH_LIMIT_MAX: u32 = 50;

pub type SearchResult<T> = Result<T, SearchError>;

/// Search-layer error for query parsing, DB interaction and result decoding.
#[derive(Debug)]
pub enum SearchError {
    /// User-provided query cannot be parsed by FTS5 syntax.
    InvalidQuery {
        query: String,
        message: String,
    },
    Db(DbError),
    InvalidData(String),
}

impl Display for SearchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidQuery { query, message } => {
                write!(f, "invalid full-text query `{query}`: {message}")
            }
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid search row: {message}"),
        }
    }
}

impl Error for SearchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for SearchError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Search options.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub text: String,
    pub kind: Option<PostKind>,
    /// Maximum number of hits; clamped to 50.
    pub limit: u32,
    /// Pass text through as a raw FTS5 expression.
    ///
    /// Off by default so type-as-you-search input never hits syntax errors.
    pub raw_fts_syntax: bool,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: None,
            limit: SEARCH_DEFAULT_LIMIT,
            raw_fts_syntax: false,
        }
    }
}

/// Single ranked search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub post_id: PostId,
    pub kind: PostKind,
    pub title: String,
    pub snippet: String,
}

/// Searches posts via FTS5 and returns ranked results.
///
/// Returns an empty list for blank queries or a zero limit.
pub fn search_posts(conn: &Connection, query: &SearchQuery) -> SearchResult<Vec<SearchHit>> {
    let Some(match_expr) = build_match_expression(&query.text, query.raw_fts_syntax) else {
        return Ok(Vec::new());
    };

    if query.limit == 0 {
        return Ok(Vec::new());
    }

    let mut sql = String::from(
        "SELECT
            posts.id AS id,
            posts.kind AS kind,
            posts.title AS title,
            snippet(posts_fts, -1, '[', ']', ' ... ', 12) AS snippet
         FROM posts_fts
         JOIN posts ON posts.id = posts_fts.post_id
         WHERE posts_fts MATCH ?
           AND posts.is_deleted = 0",
    );
    let mut bind_values: Vec<Value> = vec![Value::Text(match_expr.clone())];

    if let Some(kind) = query.kind {
        sql.push_str(" AND posts.kind = ?");
        bind_values.push(Value::Text(kind.as_str().to_string()));
    }

    sql.push_str(" ORDER BY bm25(posts_fts), posts.created_at DESC, posts.id ASC LIMIT ?");
    bind_values.push(Value::Integer(i64::from(query.limit.min(SEARCH_LIMIT_MAX))));

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt
        .query(params_from_iter(bind_values))
        .map_err(|err| map_query_error(err, &match_expr))?;
    let mut hits = Vec::new();

    while let Some(row) = rows
        .next()
        .map_err(|err| map_query_error(err, &match_expr))?
    {
        hits.push(parse_search_hit(row)?);
    }

    Ok(hits)
}

fn parse_search_hit(row: &Row<'_>) -> SearchResult<SearchHit> {
    let id_text: String = row.get("id")?;
    let post_id = parse_uuid(&id_text, "posts.id")
        .map_err(|err| SearchError::InvalidData(err.to_string()))?;

    let kind_text: String = row.get("kind")?;
    let kind = PostKind::parse(&kind_text)
        .ok_or_else(|| SearchError::InvalidData(format!("invalid kind `{kind_text}`")))?;

    Ok(SearchHit {
        post_id,
        kind,
        title: row.get("title")?,
        snippet: row.get("snippet")?,
    })
}

/// Builds an FTS5 match expression from user text.
///
/// Each whitespace-separated term is quoted and the terms are AND-ed.
/// Returns `None` for blank input.
pub fn build_match_expression(text: &str, raw_fts_syntax: bool) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if raw_fts_syntax {
        return Some(text.to_string());
    }

    let terms = text
        .split_whitespace()
        .map(escape_fts_term)
        .collect::<Vec<_>>();

    if terms.is_empty() {
        return None;
    }

    Some(terms.join(" AND "))
}

fn escape_fts_term(raw: &str) -> String {
    let escaped = raw.replace('"', "\"\"");
    format!("\"{escaped}\"")
}

fn map_query_error(err: rusqlite::Error, query: &str) -> SearchError {
    if is_match_syntax_error(&err) {
        return SearchError::InvalidQuery {
            query: query.to_string(),
            message: err.to_string(),
        };
    }

    SearchError::Db(DbError::Sqlite(err))
}

fn is_match_syntax_error(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(_, Some(message)) => {
            let msg = message.to_lowercase();
            (msg.contains("fts5") && msg.contains("syntax"))
                || msg.contains("malformed match expression")
                || msg.contains("unterminated")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::build_match_expression;

    #[test]
    fn terms_are_quoted_and_joined() {
        assert_eq!(
            build_match_expression("  free  pizza ", false).as_deref(),
            Some("\"free\" AND \"pizza\"")
        );
    }

    #[test]
    fn embedded_quotes_are_escaped() {
        assert_eq!(
            build_match_expression("say\"hi", false).as_deref(),
            Some("\"say\"\"hi\"")
        );
    }

    #[test]
    fn blank_input_yields_none_and_raw_passes_through() {
        assert_eq!(build_match_expression("   ", false), None);
        assert_eq!(
            build_match_expression("pizza OR tacos", true).as_deref(),
            Some("pizza OR tacos")
        );
    }
}

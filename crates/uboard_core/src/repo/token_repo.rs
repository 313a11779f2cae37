//! Single-use auth tokens and sign-in sessions.
//!
//! # Responsibility
//! - Store token digests for email confirmation and password reset.
//! - Store session digests for bearer authentication.
//!
//! # Invariants
//! - At most one live token per `(user, purpose)`: issuing replaces.
//! - Only digests are stored; lookups take digests.

use crate::model::user::UserId;
use crate::repo::{parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};

/// What a single-use token authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPurpose {
    ConfirmEmail,
    ResetPassword,
}

impl TokenPurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConfirmEmail => "confirm_email",
            Self::ResetPassword => "reset_password",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthTokenRecord {
    pub user_id: UserId,
    pub purpose: TokenPurpose,
    pub expires_at: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub user_id: UserId,
    pub created_at: i64,
    pub expires_at: i64,
}

/// Rows removed by [`TokenRepository::purge_expired`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeStats {
    pub tokens: usize,
    pub sessions: usize,
}

pub trait TokenRepository {
    /// Deletes outstanding tokens of the same purpose and stores a new one.
    fn replace_token(
        &self,
        user_id: UserId,
        purpose: TokenPurpose,
        token_hash: &str,
        expires_at: i64,
        now_ms: i64,
    ) -> RepoResult<()>;
    fn find_token(
        &self,
        token_hash: &str,
        purpose: TokenPurpose,
    ) -> RepoResult<Option<AuthTokenRecord>>;
    fn delete_token(&self, token_hash: &str) -> RepoResult<()>;
    fn delete_user_tokens(&self, user_id: UserId, purpose: TokenPurpose) -> RepoResult<usize>;

    fn create_session(
        &self,
        token_hash: &str,
        user_id: UserId,
        now_ms: i64,
        expires_at: i64,
    ) -> RepoResult<()>;
    fn find_session(&self, token_hash: &str) -> RepoResult<Option<SessionRecord>>;
    /// Returns whether a session was removed.
    fn delete_session(&self, token_hash: &str) -> RepoResult<bool>;
    /// Removes every session of the user except `keep_token_hash`.
    fn delete_user_sessions(
        &self,
        user_id: UserId,
        keep_token_hash: Option<&str>,
    ) -> RepoResult<usize>;

    fn purge_expired(&self, now_ms: i64) -> RepoResult<PurgeStats>;
}

pub struct SqliteTokenRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTokenRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl TokenRepository for SqliteTokenRepository<'_> {
    fn replace_token(
        &self,
        user_id: UserId,
        purpose: TokenPurpose,
        token_hash: &str,
        expires_at: i64,
        now_ms: i64,
    ) -> RepoResult<()> {
        let user_id_text = user_id.to_string();
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        tx.execute(
            "DELETE FROM auth_tokens WHERE user_id = ?1 AND purpose = ?2;",
            params![user_id_text.as_str(), purpose.as_str()],
        )?;
        tx.execute(
            "INSERT INTO auth_tokens (token_hash, user_id, purpose, expires_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                token_hash,
                user_id_text.as_str(),
                purpose.as_str(),
                expires_at,
                now_ms
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn find_token(
        &self,
        token_hash: &str,
        purpose: TokenPurpose,
    ) -> RepoResult<Option<AuthTokenRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT user_id, expires_at, created_at
                 FROM auth_tokens
                 WHERE token_hash = ?1 AND purpose = ?2;",
                params![token_hash, purpose.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(user_id, expires_at, created_at)| {
            Ok::<_, RepoError>(AuthTokenRecord {
                user_id: parse_uuid(&user_id, "auth_tokens.user_id")?,
                purpose,
                expires_at,
                created_at,
            })
        })
        .transpose()
    }

    fn delete_token(&self, token_hash: &str) -> RepoResult<()> {
        self.conn.execute(
            "DELETE FROM auth_tokens WHERE token_hash = ?1;",
            [token_hash],
        )?;
        Ok(())
    }

    fn delete_user_tokens(&self, user_id: UserId, purpose: TokenPurpose) -> RepoResult<usize> {
        let removed = self.conn.execute(
            "DELETE FROM auth_tokens WHERE user_id = ?1 AND purpose = ?2;",
            params![user_id.to_string(), purpose.as_str()],
        )?;
        Ok(removed)
    }

    fn create_session(
        &self,
        token_hash: &str,
        user_id: UserId,
        now_ms: i64,
        expires_at: i64,
    ) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO sessions (token_hash, user_id, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4);",
            params![token_hash, user_id.to_string(), now_ms, expires_at],
        )?;
        Ok(())
    }

    fn find_session(&self, token_hash: &str) -> RepoResult<Option<SessionRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT user_id, created_at, expires_at FROM sessions WHERE token_hash = ?1;",
                [token_hash],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(user_id, created_at, expires_at)| {
            Ok::<_, RepoError>(SessionRecord {
                user_id: parse_uuid(&user_id, "sessions.user_id")?,
                created_at,
                expires_at,
            })
        })
        .transpose()
    }

    fn delete_session(&self, token_hash: &str) -> RepoResult<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM sessions WHERE token_hash = ?1;", [token_hash])?;
        Ok(removed > 0)
    }

    fn delete_user_sessions(
        &self,
        user_id: UserId,
        keep_token_hash: Option<&str>,
    ) -> RepoResult<usize> {
        let removed = self.conn.execute(
            "DELETE FROM sessions
             WHERE user_id = ?1
               AND (?2 IS NULL OR token_hash <> ?2);",
            params![user_id.to_string(), keep_token_hash],
        )?;
        Ok(removed)
    }

    fn purge_expired(&self, now_ms: i64) -> RepoResult<PurgeStats> {
        let tokens = self
            .conn
            .execute("DELETE FROM auth_tokens WHERE expires_at <= ?1;", [now_ms])?;
        let sessions = self
            .conn
            .execute("DELETE FROM sessions WHERE expires_at <= ?1;", [now_ms])?;
        Ok(PurgeStats { tokens, sessions })
    }
}

//! User repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist accounts and the counters driving sign-in lockout.
//!
//! # Invariants
//! - Username and email lookups are case-insensitive.
//! - Deleting a user cascades to sessions, tokens, posts and engagement rows.

use crate::auth::PasswordHash;
use crate::db::bool_to_int;
use crate::model::user::{normalize_email, User, UserId};
use crate::repo::token_repo::TokenPurpose;
use crate::repo::{map_unique_violation, parse_flag, parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};

const USER_SELECT_SQL: &str = "SELECT
    id,
    username,
    email,
    first_name,
    last_name,
    password_hash,
    password_salt,
    email_confirmed,
    failed_login_attempts,
    locked_until,
    last_login_at,
    created_at,
    updated_at
FROM users";

/// Repository interface for account persistence.
pub trait UserRepository {
    /// Inserts a new account together with its email confirmation token
    /// digest, atomically. Duplicate username/email yield `Conflict`.
    fn create_user(
        &self,
        user: &User,
        confirm_token_hash: &str,
        confirm_expires_at: i64,
    ) -> RepoResult<()>;
    fn get_user(&self, id: UserId) -> RepoResult<Option<User>>;
    /// Looks a user up by username or email.
    fn find_by_login(&self, login: &str) -> RepoResult<Option<User>>;
    fn find_by_email(&self, email: &str) -> RepoResult<Option<User>>;
    fn update_names(
        &self,
        id: UserId,
        first_name: &str,
        last_name: &str,
        now_ms: i64,
    ) -> RepoResult<()>;
    /// Stores a new password and clears any lockout state.
    fn set_password(&self, id: UserId, password: &PasswordHash, now_ms: i64) -> RepoResult<()>;
    fn mark_email_confirmed(&self, id: UserId, now_ms: i64) -> RepoResult<()>;
    /// Persists the failure counter and optional lock deadline.
    fn record_login_failure(
        &self,
        id: UserId,
        failed_attempts: u32,
        locked_until: Option<i64>,
    ) -> RepoResult<()>;
    /// Resets the failure counter and lock; stamps `last_login_at` when given.
    fn record_login_success(&self, id: UserId, last_login_at: Option<i64>) -> RepoResult<()>;
    fn delete_user(&self, id: UserId) -> RepoResult<()>;
}

/// SQLite-backed user repository.
pub struct SqliteUserRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteUserRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn query_one(&self, where_sql: &str, value: &str) -> RepoResult<Option<User>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{USER_SELECT_SQL} WHERE {where_sql};"))?;
        let mut rows = stmt.query([value])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_user_row(row)?));
        }
        Ok(None)
    }

    fn expect_changed(changed: usize, id: UserId) -> RepoResult<()> {
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }
}

impl UserRepository for SqliteUserRepository<'_> {
    fn create_user(
        &self,
        user: &User,
        confirm_token_hash: &str,
        confirm_expires_at: i64,
    ) -> RepoResult<()> {
        let id_text = user.id.to_string();
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO users (
                id,
                username,
                email,
                first_name,
                last_name,
                password_hash,
                password_salt,
                email_confirmed,
                failed_login_attempts,
                locked_until,
                last_login_at,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13);",
            params![
                id_text.as_str(),
                user.username.as_str(),
                user.email.as_str(),
                user.first_name.as_str(),
                user.last_name.as_str(),
                user.password_hash.as_str(),
                user.password_salt.as_str(),
                bool_to_int(user.email_confirmed),
                i64::from(user.failed_login_attempts),
                user.locked_until,
                user.last_login_at,
                user.created_at,
                user.updated_at,
            ],
        )
        .map_err(|err| map_unique_violation(err, "users", &["username", "email"]))?;
        tx.execute(
            "INSERT INTO auth_tokens (token_hash, user_id, purpose, expires_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                confirm_token_hash,
                id_text.as_str(),
                TokenPurpose::ConfirmEmail.as_str(),
                confirm_expires_at,
                user.created_at
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn get_user(&self, id: UserId) -> RepoResult<Option<User>> {
        self.query_one("id = ?1", &id.to_string())
    }

    fn find_by_login(&self, login: &str) -> RepoResult<Option<User>> {
        let login = login.trim();
        if login.contains('@') {
            return self.find_by_email(login);
        }
        self.query_one("username = ?1 COLLATE NOCASE", login)
    }

    fn find_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        self.query_one("email = ?1 COLLATE NOCASE", &normalize_email(email))
    }

    fn update_names(
        &self,
        id: UserId,
        first_name: &str,
        last_name: &str,
        now_ms: i64,
    ) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE users
             SET first_name = ?2, last_name = ?3, updated_at = ?4
             WHERE id = ?1;",
            params![id.to_string(), first_name, last_name, now_ms],
        )?;
        Self::expect_changed(changed, id)
    }

    fn set_password(&self, id: UserId, password: &PasswordHash, now_ms: i64) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE users
             SET
                password_hash = ?2,
                password_salt = ?3,
                failed_login_attempts = 0,
                locked_until = NULL,
                updated_at = ?4
             WHERE id = ?1;",
            params![
                id.to_string(),
                password.hash.as_str(),
                password.salt.as_str(),
                now_ms
            ],
        )?;
        Self::expect_changed(changed, id)
    }

    fn mark_email_confirmed(&self, id: UserId, now_ms: i64) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE users SET email_confirmed = 1, updated_at = ?2 WHERE id = ?1;",
            params![id.to_string(), now_ms],
        )?;
        Self::expect_changed(changed, id)
    }

    fn record_login_failure(
        &self,
        id: UserId,
        failed_attempts: u32,
        locked_until: Option<i64>,
    ) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE users
             SET failed_login_attempts = ?2, locked_until = ?3
             WHERE id = ?1;",
            params![id.to_string(), i64::from(failed_attempts), locked_until],
        )?;
        Self::expect_changed(changed, id)
    }

    fn record_login_success(&self, id: UserId, last_login_at: Option<i64>) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE users
             SET
                failed_login_attempts = 0,
                locked_until = NULL,
                last_login_at = COALESCE(?2, last_login_at)
             WHERE id = ?1;",
            params![id.to_string(), last_login_at],
        )?;
        Self::expect_changed(changed, id)
    }

    fn delete_user(&self, id: UserId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM users WHERE id = ?1;", [id.to_string()])?;
        Self::expect_changed(changed, id)
    }
}

fn parse_user_row(row: &Row<'_>) -> RepoResult<User> {
    let id_text: String = row.get("id")?;
    let failed_attempts: i64 = row.get("failed_login_attempts")?;
    let failed_login_attempts = u32::try_from(failed_attempts).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid failed_login_attempts `{failed_attempts}` in users.failed_login_attempts"
        ))
    })?;

    Ok(User {
        id: parse_uuid(&id_text, "users.id")?,
        username: row.get("username")?,
        email: row.get("email")?,
        first_name: row.get("first_name")?,
        last_name: row.get("last_name")?,
        password_hash: row.get("password_hash")?,
        password_salt: row.get("password_salt")?,
        email_confirmed: parse_flag(row.get("email_confirmed")?, "users.email_confirmed")?,
        failed_login_attempts,
        locked_until: row.get("locked_until")?,
        last_login_at: row.get("last_login_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

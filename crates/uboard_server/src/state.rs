//! Shared application state.
//!
//! # Invariants
//! - The SQLite connection is only touched from blocking worker threads.
//! - Services are built per call and borrow the locked connection.

use crate::error::ApiError;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use uboard_core::{
    AuthContext, AuthService, CommentService, PostService, SqliteCommentRepository,
    SqlitePostRepository, SqliteTokenRepository, SqliteUserRepository,
};

#[derive(Clone)]
pub struct AppState {
    db: Arc<Mutex<Connection>>,
    auth: AuthContext,
}

impl AppState {
    pub fn new(conn: Connection, auth: AuthContext) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            auth,
        }
    }

    pub fn auth_context(&self) -> &AuthContext {
        &self.auth
    }

    /// Runs `f` against the database on the blocking pool.
    pub async fn run<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection, &AuthContext) -> Result<T, ApiError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        let auth = self.auth.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|_| ApiError::Internal("database lock poisoned".to_string()))?;
            f(&conn, &auth)
        })
        .await
        .map_err(|err| ApiError::Internal(format!("blocking task failed: {err}")))?
    }
}

pub(crate) fn auth_service<'conn>(
    conn: &'conn Connection,
    ctx: &AuthContext,
) -> AuthService<SqliteUserRepository<'conn>, SqliteTokenRepository<'conn>> {
    AuthService::new(
        SqliteUserRepository::new(conn),
        SqliteTokenRepository::new(conn),
        ctx.clone(),
    )
}

pub(crate) fn post_service<'conn>(
    conn: &'conn Connection,
    ctx: &AuthContext,
) -> PostService<SqlitePostRepository<'conn>> {
    PostService::new(SqlitePostRepository::new(conn), Arc::clone(&ctx.clock))
}

pub(crate) fn comment_service<'conn>(
    conn: &'conn Connection,
    ctx: &AuthContext,
) -> CommentService<SqliteCommentRepository<'conn>> {
    CommentService::new(SqliteCommentRepository::new(conn), Arc::clone(&ctx.clock))
}

//! Account lifecycle use-cases.
//!
//! # Responsibility
//! - Sign-up with institutional email verification.
//! - Sign-in with failure counting and temporary lockout.
//! - Session authentication, password reset and account maintenance.
//!
//! # Invariants
//! - Unknown users and wrong passwords are indistinguishable to callers.
//! - A locked account is refused before its password is checked.
//! - Password reset and password change revoke other sessions.
//! - Password reset requests never reveal whether an email is registered.

use crate::auth::{generate_token, hash_password, token_digest, verify_password, PasswordHash};
use crate::clock::{Clock, DAY_MS, HOUR_MS, MINUTE_MS};
use crate::mail::{confirmation_email, password_reset_email, Mailer, OutboundEmail};
use crate::model::user::{validate_name, validate_password, NewUser, User, UserId, UserProfile};
use crate::model::ValidationError;
use crate::repo::token_repo::{PurgeStats, TokenPurpose, TokenRepository};
use crate::repo::user_repo::UserRepository;
use crate::repo::RepoError;
use log::{info, warn};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use uuid::Uuid;

/// Tunables for the account lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPolicy {
    /// Institutional email domains accepted at sign-up; empty accepts any.
    pub allowed_email_domains: Vec<String>,
    /// Base URL used to build links in outgoing mail.
    pub public_url: String,
    pub max_failed_logins: u32,
    pub lockout_ms: i64,
    pub confirm_token_ttl_ms: i64,
    pub reset_token_ttl_ms: i64,
    pub session_ttl_ms: i64,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            allowed_email_domains: vec!["utoronto.ca".to_string()],
            public_url: "http://localhost:3000".to_string(),
            max_failed_logins: 5,
            lockout_ms: 15 * MINUTE_MS,
            confirm_token_ttl_ms: DAY_MS,
            reset_token_ttl_ms: HOUR_MS,
            session_ttl_ms: 7 * DAY_MS,
        }
    }
}

/// Shared dependencies handed to every auth service instance.
#[derive(Clone)]
pub struct AuthContext {
    pub clock: Arc<dyn Clock>,
    pub mailer: Arc<dyn Mailer>,
    pub policy: Arc<AuthPolicy>,
}

#[derive(Debug)]
pub enum AuthError {
    Validation(ValidationError),
    UsernameTaken,
    EmailTaken,
    InvalidCredentials,
    AccountLocked { until: i64 },
    EmailNotConfirmed,
    InvalidToken,
    TokenExpired,
    InvalidSession,
    UserNotFound(UserId),
    Repo(RepoError),
}

impl Display for AuthError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::UsernameTaken => write!(f, "username is already taken"),
            Self::EmailTaken => write!(f, "email is already registered"),
            Self::InvalidCredentials => write!(f, "invalid username/email or password"),
            Self::AccountLocked { until } => {
                write!(f, "account is locked until {until} (epoch ms)")
            }
            Self::EmailNotConfirmed => write!(f, "email address has not been confirmed"),
            Self::InvalidToken => write!(f, "token is invalid"),
            Self::TokenExpired => write!(f, "token has expired"),
            Self::InvalidSession => write!(f, "session is invalid or expired"),
            Self::UserNotFound(id) => write!(f, "user not found: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for AuthError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for AuthError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<RepoError> for AuthError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Conflict("username") => Self::UsernameTaken,
            RepoError::Conflict("email") => Self::EmailTaken,
            RepoError::NotFound(id) => Self::UserNotFound(id),
            other => Self::Repo(other),
        }
    }
}

/// Successful sign-in payload. `token` is shown to the client once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignInResult {
    pub token: String,
    pub expires_at: i64,
    pub user: UserProfile,
}

pub struct AuthService<U: UserRepository, T: TokenRepository> {
    users: U,
    tokens: T,
    ctx: AuthContext,
}

impl<U: UserRepository, T: TokenRepository> AuthService<U, T> {
    pub fn new(users: U, tokens: T, ctx: AuthContext) -> Self {
        Self { users, tokens, ctx }
    }

    fn now(&self) -> i64 {
        self.ctx.clock.now_ms()
    }

    /// Registers an unconfirmed account and mails a confirmation link.
    pub fn sign_up(&self, input: &NewUser) -> Result<UserProfile, AuthError> {
        let input = input.validate(&self.ctx.policy.allowed_email_domains)?;
        let now = self.now();
        let password = hash_password(&input.password);
        let user = User {
            id: Uuid::new_v4(),
            username: input.username,
            email: input.email,
            first_name: input.first_name,
            last_name: input.last_name,
            password_hash: password.hash,
            password_salt: password.salt,
            email_confirmed: false,
            failed_login_attempts: 0,
            locked_until: None,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };

        let token = generate_token();
        let expires_at = now + self.ctx.policy.confirm_token_ttl_ms;
        self.users
            .create_user(&user, &token_digest(&token), expires_at)
            .map_err(|err| {
                let err = AuthError::from(err);
                warn!("event=sign_up module=auth status=rejected reason={err}");
                err
            })?;
        let purpose = TokenPurpose::ConfirmEmail;
        self.deliver(&self.token_email(&user, purpose, &token), purpose);

        info!("event=sign_up module=auth status=ok user_id={}", user.id);
        Ok(user.private_profile())
    }

    /// Consumes a confirmation token and marks the account confirmed.
    pub fn confirm_email(&self, token: &str) -> Result<UserProfile, AuthError> {
        let user_id = self.consume_token(token, TokenPurpose::ConfirmEmail)?;
        let now = self.now();
        self.users.mark_email_confirmed(user_id, now)?;
        self.tokens
            .delete_user_tokens(user_id, TokenPurpose::ConfirmEmail)?;

        info!("event=confirm_email module=auth status=ok user_id={user_id}");
        self.load_user(user_id).map(|user| user.private_profile())
    }

    /// Re-sends the confirmation link for an unconfirmed account.
    ///
    /// Unknown or already confirmed addresses succeed without sending.
    pub fn resend_confirmation(&self, email: &str) -> Result<(), AuthError> {
        match self.users.find_by_email(email)? {
            Some(user) if !user.email_confirmed => {
                self.issue_token(&user, TokenPurpose::ConfirmEmail)?;
                info!(
                    "event=resend_confirmation module=auth status=ok user_id={}",
                    user.id
                );
            }
            _ => info!("event=resend_confirmation module=auth status=skipped"),
        }
        Ok(())
    }

    /// Verifies credentials and opens a session.
    pub fn sign_in(&self, login: &str, password: &str) -> Result<SignInResult, AuthError> {
        let now = self.now();
        let Some(user) = self.users.find_by_login(login)? else {
            info!("event=sign_in module=auth status=rejected reason=unknown_user");
            return Err(AuthError::InvalidCredentials);
        };

        if let Some(until) = user.locked_until.filter(|_| user.is_locked(now)) {
            warn!(
                "event=sign_in module=auth status=rejected reason=locked user_id={} locked_until={until}",
                user.id
            );
            return Err(AuthError::AccountLocked { until });
        }

        if !verify_password(password, &stored_password(&user)) {
            return Err(self.register_failure(&user, now)?);
        }

        if !user.email_confirmed {
            self.users.record_login_success(user.id, None)?;
            info!(
                "event=sign_in module=auth status=rejected reason=unconfirmed user_id={}",
                user.id
            );
            return Err(AuthError::EmailNotConfirmed);
        }

        self.users.record_login_success(user.id, Some(now))?;
        let token = generate_token();
        let expires_at = now + self.ctx.policy.session_ttl_ms;
        self.tokens
            .create_session(&token_digest(&token), user.id, now, expires_at)?;

        info!("event=sign_in module=auth status=ok user_id={}", user.id);
        Ok(SignInResult {
            token,
            expires_at,
            user: user.private_profile(),
        })
    }

    /// Resolves a bearer token to its user.
    pub fn authenticate(&self, token: &str) -> Result<User, AuthError> {
        let digest = token_digest(token);
        let Some(session) = self.tokens.find_session(&digest)? else {
            return Err(AuthError::InvalidSession);
        };

        if session.expires_at <= self.now() {
            self.tokens.delete_session(&digest)?;
            return Err(AuthError::InvalidSession);
        }

        self.users
            .get_user(session.user_id)?
            .ok_or(AuthError::InvalidSession)
    }

    /// Ends the session; unknown tokens are ignored.
    pub fn sign_out(&self, token: &str) -> Result<(), AuthError> {
        let removed = self.tokens.delete_session(&token_digest(token))?;
        info!("event=sign_out module=auth status=ok removed={removed}");
        Ok(())
    }

    /// Mails a reset link when the address is registered.
    pub fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
        if let Some(user) = self.users.find_by_email(email)? {
            self.issue_token(&user, TokenPurpose::ResetPassword)?;
            info!(
                "event=password_reset_request module=auth status=ok user_id={}",
                user.id
            );
        } else {
            info!("event=password_reset_request module=auth status=skipped");
        }
        Ok(())
    }

    /// Consumes a reset token, stores the new password and revokes sessions.
    pub fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AuthError> {
        let password = validate_password(new_password)?;
        let user_id = self.consume_token(token, TokenPurpose::ResetPassword)?;
        self.users
            .set_password(user_id, &hash_password(&password), self.now())?;
        self.tokens
            .delete_user_tokens(user_id, TokenPurpose::ResetPassword)?;
        let revoked = self.tokens.delete_user_sessions(user_id, None)?;

        info!(
            "event=password_reset module=auth status=ok user_id={user_id} sessions_revoked={revoked}"
        );
        Ok(())
    }

    /// Changes the password of a signed-in user, keeping `current_session`.
    pub fn change_password(
        &self,
        user: &User,
        current_session: Option<&str>,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        if !verify_password(current_password, &stored_password(user)) {
            return Err(AuthError::InvalidCredentials);
        }
        let password = validate_password(new_password)?;
        self.users
            .set_password(user.id, &hash_password(&password), self.now())?;
        let keep = current_session.map(token_digest);
        let revoked = self
            .tokens
            .delete_user_sessions(user.id, keep.as_deref())?;

        info!(
            "event=password_change module=auth status=ok user_id={} sessions_revoked={revoked}",
            user.id
        );
        Ok(())
    }

    pub fn update_profile(
        &self,
        user_id: UserId,
        first_name: &str,
        last_name: &str,
    ) -> Result<UserProfile, AuthError> {
        let first_name = validate_name("first_name", first_name)?;
        let last_name = validate_name("last_name", last_name)?;
        self.users
            .update_names(user_id, &first_name, &last_name, self.now())?;
        self.load_user(user_id).map(|user| user.private_profile())
    }

    /// Permanently removes the account and everything it owns.
    pub fn delete_account(&self, user: &User, password: &str) -> Result<(), AuthError> {
        if !verify_password(password, &stored_password(user)) {
            return Err(AuthError::InvalidCredentials);
        }
        self.users.delete_user(user.id)?;
        info!("event=delete_account module=auth status=ok user_id={}", user.id);
        Ok(())
    }

    /// Returns the private profile to its owner and the public one otherwise.
    pub fn get_profile(&self, viewer: UserId, user_id: UserId) -> Result<UserProfile, AuthError> {
        let user = self.load_user(user_id)?;
        if viewer == user_id {
            Ok(user.private_profile())
        } else {
            Ok(user.public_profile())
        }
    }

    /// Removes expired single-use tokens and sessions.
    pub fn purge_expired(&self) -> Result<PurgeStats, AuthError> {
        let stats = self.tokens.purge_expired(self.now())?;
        info!(
            "event=purge_expired module=auth status=ok tokens={} sessions={}",
            stats.tokens, stats.sessions
        );
        Ok(stats)
    }

    fn load_user(&self, user_id: UserId) -> Result<User, AuthError> {
        self.users
            .get_user(user_id)?
            .ok_or(AuthError::UserNotFound(user_id))
    }

    fn register_failure(&self, user: &User, now: i64) -> Result<AuthError, AuthError> {
        let attempts = user.failed_login_attempts.saturating_add(1);
        if attempts >= self.ctx.policy.max_failed_logins {
            let until = now + self.ctx.policy.lockout_ms;
            self.users.record_login_failure(user.id, 0, Some(until))?;
            warn!(
                "event=sign_in module=auth status=locked user_id={} attempts={attempts} locked_until={until}",
                user.id
            );
            return Ok(AuthError::AccountLocked { until });
        }

        self.users.record_login_failure(user.id, attempts, None)?;
        info!(
            "event=sign_in module=auth status=rejected reason=bad_password user_id={} attempts={attempts}",
            user.id
        );
        Ok(AuthError::InvalidCredentials)
    }

    fn issue_token(&self, user: &User, purpose: TokenPurpose) -> Result<(), AuthError> {
        let now = self.now();
        let policy = &self.ctx.policy;
        let ttl = match purpose {
            TokenPurpose::ConfirmEmail => policy.confirm_token_ttl_ms,
            TokenPurpose::ResetPassword => policy.reset_token_ttl_ms,
        };
        let token = generate_token();
        self.tokens
            .replace_token(user.id, purpose, &token_digest(&token), now + ttl, now)?;

        self.deliver(&self.token_email(user, purpose, &token), purpose);
        Ok(())
    }

    fn token_email(&self, user: &User, purpose: TokenPurpose, token: &str) -> OutboundEmail {
        let public_url = &self.ctx.policy.public_url;
        match purpose {
            TokenPurpose::ConfirmEmail => {
                confirmation_email(&user.email, &user.username, public_url, token)
            }
            TokenPurpose::ResetPassword => {
                password_reset_email(&user.email, &user.username, public_url, token)
            }
        }
    }

    /// Mail failures are logged; the token stays valid and can be re-sent.
    fn deliver(&self, message: &OutboundEmail, purpose: TokenPurpose) {
        if let Err(err) = self.ctx.mailer.send(message) {
            warn!(
                "event=mail_send module=auth status=error purpose={} error={err}",
                purpose.as_str()
            );
        }
    }

    /// Validates a single-use token and returns its user.
    ///
    /// Expired tokens are deleted on sight.
    fn consume_token(&self, token: &str, purpose: TokenPurpose) -> Result<UserId, AuthError> {
        let digest = token_digest(token);
        let Some(record) = self.tokens.find_token(&digest, purpose)? else {
            info!(
                "event=token_check module=auth status=rejected purpose={} reason=unknown",
                purpose.as_str()
            );
            return Err(AuthError::InvalidToken);
        };

        if record.expires_at <= self.now() {
            self.tokens.delete_token(&digest)?;
            info!(
                "event=token_check module=auth status=rejected purpose={} reason=expired user_id={}",
                purpose.as_str(),
                record.user_id
            );
            return Err(AuthError::TokenExpired);
        }

        Ok(record.user_id)
    }
}

fn stored_password(user: &User) -> PasswordHash {
    PasswordHash {
        hash: user.password_hash.clone(),
        salt: user.password_salt.clone(),
    }
}

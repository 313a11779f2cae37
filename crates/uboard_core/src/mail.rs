//! Outbound email.
//!
//! # Responsibility
//! - Render confirmation and password-reset messages.
//! - Hand messages to a pluggable transport.
//!
//! # Invariants
//! - Tokens only appear inside the link.
//! - `LogMailer` is the delivery channel when no transport is configured: it
//!   logs recipient, subject and link, so the log carries live tokens.

use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    /// Action link carried by the message.
    pub link: String,
}

#[derive(Debug)]
pub struct MailError(pub String);

impl Display for MailError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "mail delivery failed: {}", self.0)
    }
}

impl Error for MailError {}

pub trait Mailer: Send + Sync {
    fn send(&self, message: &OutboundEmail) -> Result<(), MailError>;
}

/// Writes messages to the application log instead of delivering them.
///
/// An operator forwards the logged link to the recipient.
#[derive(Debug, Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, message: &OutboundEmail) -> Result<(), MailError> {
        info!(
            "event=mail_send module=mail status=ok transport=log to={} subject={:?} link={}",
            message.to, message.subject, message.link
        );
        Ok(())
    }
}

/// Keeps every sent message in memory.
#[derive(Debug, Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<OutboundEmail>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }

    pub fn last_to(&self, address: &str) -> Option<OutboundEmail> {
        self.sent()
            .into_iter()
            .rev()
            .find(|message| message.to.eq_ignore_ascii_case(address))
    }
}

impl Mailer for MemoryMailer {
    fn send(&self, message: &OutboundEmail) -> Result<(), MailError> {
        self.sent
            .lock()
            .map_err(|_| MailError("memory mailbox poisoned".to_string()))?
            .push(message.clone());
        Ok(())
    }
}

/// Extracts the `token` query parameter from an action link.
pub fn token_from_link(link: &str) -> Option<&str> {
    let (_, query) = link.split_once('?')?;
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
        .filter(|token| !token.is_empty())
}

pub(crate) fn confirmation_email(
    to: &str,
    username: &str,
    public_url: &str,
    token: &str,
) -> OutboundEmail {
    let link = format!("{}/confirm-email?token={token}", public_url.trim_end_matches('/'));
    OutboundEmail {
        to: to.to_string(),
        subject: "Confirm your UBoard account".to_string(),
        body: format!(
            "Hi {username},\n\nConfirm your email address to start using UBoard:\n{link}\n\nThe link expires in 24 hours."
        ),
        link,
    }
}

pub(crate) fn password_reset_email(
    to: &str,
    username: &str,
    public_url: &str,
    token: &str,
) -> OutboundEmail {
    let link = format!("{}/reset-password?token={token}", public_url.trim_end_matches('/'));
    OutboundEmail {
        to: to.to_string(),
        subject: "Reset your UBoard password".to_string(),
        body: format!(
            "Hi {username},\n\nUse the link below to choose a new password:\n{link}\n\nIf you did not ask for this, ignore this message."
        ),
        link,
    }
}

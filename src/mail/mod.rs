//! Mailbox transport — the narrow interface the watch loop consumes.

pub mod imap;

pub use imap::{ImapConfig, ImapMailbox};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::error::MailError;

/// Summary of one mailbox message, as listed by `fetch_summaries`.
#[derive(Debug, Clone)]
pub struct MessageSummary {
    /// Stable per-mailbox identifier (IMAP UID).
    pub uid: u32,
    /// Canonical display form, `"Name" <mailbox@host>`.
    pub sender: String,
    pub subject: String,
    pub date: DateTime<Utc>,
}

/// A fully fetched message.
#[derive(Debug, Clone)]
pub struct FetchedMessage {
    pub uid: u32,
    pub subject: String,
    pub date: DateTime<Utc>,
    /// The HTML body part, when the message carries one.
    pub html_body: Option<String>,
}

/// Why a bounded wait returned. Both outcomes trigger the same
/// reconciliation; the distinction exists for logging only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxEvent {
    /// The server reported mailbox activity.
    CountChanged,
    /// The bounded wait elapsed quietly.
    TimedOut,
}

/// A connected, authenticated mailbox session.
///
/// Exactly one watch loop owns a session; none of these calls are expected
/// to run concurrently. Errors are session-ending — the caller disconnects
/// and propagates rather than retrying.
#[async_trait]
pub trait Mailbox: Send {
    /// List every message currently in the mailbox.
    async fn fetch_summaries(&mut self) -> Result<Vec<MessageSummary>, MailError>;

    /// Fetch one message in full.
    async fn fetch_message(&mut self, uid: u32) -> Result<FetchedMessage, MailError>;

    /// Block until the server signals mailbox activity or `timeout` elapses.
    async fn wait_for_change(&mut self, timeout: Duration) -> Result<MailboxEvent, MailError>;

    /// Close the session. Safe to call when already closed.
    async fn disconnect(&mut self) -> Result<(), MailError>;
}

/// Render a parsed From header in the canonical display form the match
/// predicate compares against: `"Name" <mailbox@host>`, or the bare address
/// when no display name is present.
pub(crate) fn sender_display(parsed: &mail_parser::Message<'_>) -> String {
    let Some(addr) = parsed.from().and_then(|a| a.first()) else {
        return "(unknown sender)".to_string();
    };
    let address = addr.address().unwrap_or("");
    match addr.name() {
        Some(name) if !name.is_empty() => format!("\"{name}\" <{address}>"),
        _ => address.to_string(),
    }
}

/// Best-effort date for a parsed message: the Date header, else `fallback`.
pub(crate) fn header_date(
    parsed: &mail_parser::Message<'_>,
    fallback: DateTime<Utc>,
) -> DateTime<Utc> {
    parsed
        .date()
        .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0))
        .unwrap_or(fallback)
}

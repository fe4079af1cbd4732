//! IMAP implementation of the mailbox transport.
//!
//! One TLS connection, INBOX opened read-only, change notification via
//! IDLE bounded by the caller's timeout.

use std::time::Duration;

use async_imap::Session;
use async_imap::extensions::idle::IdleResponse;
use async_native_tls::{TlsConnector, TlsStream};
use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use mail_parser::MessageParser;
use secrecy::{ExposeSecret, SecretString};
use tokio::net::TcpStream;
use tracing::{debug, info};

use super::{FetchedMessage, Mailbox, MailboxEvent, MessageSummary, header_date, sender_display};
use crate::error::MailError;

type ImapSession = Session<TlsStream<TcpStream>>;

/// IMAP connection settings.
#[derive(Debug, Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub use_tls: bool,
}

/// A live IMAP session. `None` once the session has been torn down or lost
/// to a failed IDLE.
pub struct ImapMailbox {
    session: Option<ImapSession>,
}

impl std::fmt::Debug for ImapMailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapMailbox")
            .field("connected", &self.session.is_some())
            .finish()
    }
}

impl ImapMailbox {
    /// Connect, authenticate, and open INBOX read-only.
    ///
    /// Rejected credentials and unreachable servers are fatal here — restart
    /// policy belongs to the process supervisor, not this layer.
    pub async fn connect(config: &ImapConfig) -> Result<Self, MailError> {
        if !config.use_tls {
            return Err(MailError::TlsRequired);
        }

        let tcp = TcpStream::connect((config.host.as_str(), config.port))
            .await
            .map_err(|e| MailError::Connect {
                host: config.host.clone(),
                port: config.port,
                reason: e.to_string(),
            })?;
        debug!(host = %config.host, port = config.port, "TCP connected");

        let tls = TlsConnector::new()
            .connect(&config.host, tcp)
            .await
            .map_err(|e| MailError::Tls {
                host: config.host.clone(),
                reason: e.to_string(),
            })?;

        let client = async_imap::Client::new(tls);
        let mut session = client
            .login(&config.username, config.password.expose_secret())
            .await
            .map_err(|e| MailError::Auth {
                username: config.username.clone(),
                reason: e.0.to_string(),
            })?;

        let inbox = session
            .examine("INBOX")
            .await
            .map_err(|e| MailError::Protocol(e.to_string()))?;
        info!(exists = inbox.exists, "INBOX opened read-only");

        Ok(Self {
            session: Some(session),
        })
    }

    fn session(&mut self) -> Result<&mut ImapSession, MailError> {
        self.session.as_mut().ok_or(MailError::Disconnected)
    }
}

#[async_trait]
impl Mailbox for ImapMailbox {
    async fn fetch_summaries(&mut self) -> Result<Vec<MessageSummary>, MailError> {
        let session = self.session()?;

        // The whole mailbox is re-listed on every call. Deliberate: the
        // mailbox is small and a full re-list keeps reconciliation simple.
        let uids = session
            .uid_search("ALL")
            .await
            .map_err(|e| MailError::Protocol(e.to_string()))?;
        if uids.is_empty() {
            return Ok(Vec::new());
        }

        let mut uid_list: Vec<u32> = uids.into_iter().collect();
        uid_list.sort_unstable();
        let set = uid_list
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",");

        let mut summaries = Vec::with_capacity(uid_list.len());
        let mut stream = session
            .uid_fetch(&set, "(UID INTERNALDATE RFC822.HEADER)")
            .await
            .map_err(|e| MailError::Protocol(e.to_string()))?;

        while let Some(fetched) = stream.next().await {
            let fetched = fetched.map_err(|e| MailError::Protocol(e.to_string()))?;
            let Some(uid) = fetched.uid else {
                debug!("fetch response without a UID, skipping");
                continue;
            };
            let Some(parsed) = fetched
                .header()
                .and_then(|h| MessageParser::default().parse(h))
            else {
                debug!(uid, "unparseable message header, skipping");
                continue;
            };

            let fallback = fetched
                .internal_date()
                .map(|d| d.with_timezone(&Utc))
                .unwrap_or_else(Utc::now);

            summaries.push(MessageSummary {
                uid,
                sender: sender_display(&parsed),
                subject: parsed.subject().unwrap_or("(no subject)").to_string(),
                date: header_date(&parsed, fallback),
            });
        }

        Ok(summaries)
    }

    async fn fetch_message(&mut self, uid: u32) -> Result<FetchedMessage, MailError> {
        let session = self.session()?;

        let mut found = None;
        let mut stream = session
            .uid_fetch(uid.to_string(), "RFC822")
            .await
            .map_err(|e| MailError::Protocol(e.to_string()))?;

        while let Some(fetched) = stream.next().await {
            let fetched = fetched.map_err(|e| MailError::Protocol(e.to_string()))?;
            let Some(body) = fetched.body() else { continue };
            let Some(parsed) = MessageParser::default().parse(body) else {
                continue;
            };

            found = Some(FetchedMessage {
                uid,
                subject: parsed.subject().unwrap_or("(no subject)").to_string(),
                date: header_date(&parsed, Utc::now()),
                html_body: parsed.body_html(0).map(|html| html.to_string()),
            });
        }

        found.ok_or_else(|| MailError::Protocol(format!("UID {uid} not found in mailbox")))
    }

    async fn wait_for_change(&mut self, timeout: Duration) -> Result<MailboxEvent, MailError> {
        let session = self.session.take().ok_or(MailError::Disconnected)?;

        // IDLE owns the session until `done()` hands it back. If the wait
        // fails the session is gone with it; the caller treats that as
        // fatal, so there is nothing to restore.
        let mut idle = session.idle();
        idle.init()
            .await
            .map_err(|e| MailError::Idle(e.to_string()))?;

        let (idle_wait, _interrupt) = idle.wait_with_timeout(timeout);
        let response = idle_wait
            .await
            .map_err(|e| MailError::Idle(e.to_string()))?;

        self.session = Some(
            idle.done()
                .await
                .map_err(|e| MailError::Idle(e.to_string()))?,
        );

        match response {
            IdleResponse::NewData(_) => Ok(MailboxEvent::CountChanged),
            // The interrupt handle above is never used; the timeout is the
            // only cancellation primitive.
            IdleResponse::Timeout | IdleResponse::ManualInterrupt => Ok(MailboxEvent::TimedOut),
        }
    }

    async fn disconnect(&mut self) -> Result<(), MailError> {
        if let Some(mut session) = self.session.take() {
            session
                .logout()
                .await
                .map_err(|e| MailError::Protocol(e.to_string()))?;
        }
        Ok(())
    }
}

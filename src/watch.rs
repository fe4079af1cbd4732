//! The mailbox watch loop.
//!
//! On startup the current matching messages are counted but never notified —
//! the count becomes the watermark. The loop then alternates between bounded
//! IDLE waits and reconciliation passes; whatever the matching set has grown
//! by since the watermark is dispatched oldest-first, and the watermark
//! catches up.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::error::{Error, ExtractionError, MailError};
use crate::mail::{FetchedMessage, Mailbox, MessageSummary};
use crate::notify::NotifySink;
use crate::pipeline::{extract, format};

/// How long one IDLE wait may last. Servers are supposed to hold an idle
/// connection for 30 minutes, but Gmail drops them after about 10 — wake
/// after 9 and reconcile as a safety net against missed notifications.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(9 * 60);

/// Subject categories that are administrative noise, not worth forwarding.
/// A message is dropped when its trimmed subject starts or ends with any of
/// these.
const IGNORED_SUBJECT_PHRASES: &[&str] = &[
    "Graded:",
    "Due soon:",
    "Comment posted in ",
    "You were awarded",
    "Lesson ",
    " accepted your friendship invitation",
    "You are now enrolled in class ",
    "You have been added to the group ",
    "Your photo was accepted",
    "You have been transferred to class ",
    "You were unenrolled from class ",
    "Status of ",
];

/// Selects the messages the bridge cares about.
#[derive(Debug, Clone)]
pub struct MessageFilter {
    expected_sender: String,
}

impl MessageFilter {
    pub fn new(expected_sender: impl Into<String>) -> Self {
        Self {
            expected_sender: expected_sender.into(),
        }
    }

    /// True when the message comes from the expected sender and its subject
    /// is not in an ignored category.
    pub fn matches(&self, summary: &MessageSummary) -> bool {
        if summary.sender != self.expected_sender {
            return false;
        }
        let subject = summary.subject.trim();
        !IGNORED_SUBJECT_PHRASES
            .iter()
            .any(|phrase| subject.starts_with(phrase) || subject.ends_with(phrase))
    }
}

/// The long-lived control loop. Sole owner of the mailbox session and the
/// watermark; nothing else mutates either.
pub struct WatchLoop<M: Mailbox> {
    mailbox: M,
    sink: Arc<dyn NotifySink>,
    filter: MessageFilter,
    /// Optional fixed text sent above every delivery.
    message_text: Option<String>,
    /// How many matching messages have already been seen this session.
    watermark: usize,
}

impl<M: Mailbox> WatchLoop<M> {
    pub fn new(
        mailbox: M,
        sink: Arc<dyn NotifySink>,
        filter: MessageFilter,
        message_text: Option<String>,
    ) -> Self {
        Self {
            mailbox,
            sink,
            filter,
            message_text,
            watermark: 0,
        }
    }

    /// Run until the transport fails. Mailbox errors are fatal: the session
    /// is closed and the error propagates for the supervisor to handle.
    pub async fn run(mut self) -> Result<(), Error> {
        self.watermark = self.matching_summaries().await?.len();
        info!(
            watermark = self.watermark,
            "Initial count done; pre-existing messages will not be notified"
        );

        loop {
            match self.mailbox.wait_for_change(IDLE_TIMEOUT).await {
                Ok(event) => {
                    debug!(?event, "Wake from idle");
                    self.reconcile().await?;
                }
                Err(e) => {
                    let _ = self.mailbox.disconnect().await;
                    return Err(e.into());
                }
            }
        }
    }

    /// The current matching set, oldest first.
    async fn matching_summaries(&mut self) -> Result<Vec<MessageSummary>, MailError> {
        let mut matches: Vec<MessageSummary> = self
            .mailbox
            .fetch_summaries()
            .await?
            .into_iter()
            .filter(|summary| self.filter.matches(summary))
            .collect();
        matches.sort_by_key(|summary| summary.date);
        Ok(matches)
    }

    /// One reconciliation pass: everything beyond the watermark is new and
    /// gets dispatched oldest-first; then the watermark catches up — whether
    /// or not the deliveries succeed.
    async fn reconcile(&mut self) -> Result<(), MailError> {
        let matches = self.matching_summaries().await?;

        if matches.len() < self.watermark {
            warn!(
                watermark = self.watermark,
                count = matches.len(),
                "Mailbox shrank; clamping watermark, nothing is new"
            );
        }

        for summary in &matches[self.watermark.min(matches.len())..] {
            let message = self.mailbox.fetch_message(summary.uid).await?;
            info!("{}: {}", message.date, message.subject);
            self.dispatch(message);
        }

        self.watermark = matches.len();
        Ok(())
    }

    /// Fire-and-forget hand-off to the transform-and-deliver pipeline. The
    /// loop never waits on the task, and nothing in it can take the loop
    /// down — failures are logged where they happen.
    fn dispatch(&self, message: FetchedMessage) {
        let sink = Arc::clone(&self.sink);
        let message_text = self.message_text.clone();
        tokio::spawn(async move {
            let subject = message.subject.clone();
            if let Err(e) = deliver_one(sink, message, message_text).await {
                error!(%subject, "Dropped notification: {e}");
            }
        });
    }
}

/// Extract → format → deliver for a single message.
async fn deliver_one(
    sink: Arc<dyn NotifySink>,
    message: FetchedMessage,
    message_text: Option<String>,
) -> Result<(), Error> {
    let html = message
        .html_body
        .as_deref()
        .ok_or(ExtractionError::NoHtmlBody)?;
    let record = extract::extract(html, message.date)?;
    let note = format::build_note(&record, message_text.as_deref())?;
    sink.deliver(&note).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeliveryError;
    use crate::mail::MailboxEvent;
    use crate::notify::OutboundNote;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::Mutex;

    const SENDER: &str = "\"iACADEMY-NEO\" <messages@neolms.com>";

    fn at_minute(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 1, 10, 8, minute, 0).unwrap()
    }

    fn summary(uid: u32, sender: &str, subject: &str, minute: u32) -> MessageSummary {
        MessageSummary {
            uid,
            sender: sender.to_string(),
            subject: subject.to_string(),
            date: at_minute(minute),
        }
    }

    /// Minimal labelled-layout notification body the extractor accepts.
    fn notification_html(title: &str) -> String {
        format!(
            r#"<html><body>
            <table>
              <tr>
                <td><b>From:</b></td>
                <td><img src="https://cdn.neolms.test/avatar.png"></td>
                <td>Maria Santos<br>@ Jan 5, 3:45 PM</td>
              </tr>
              <tr><td><b>Subject:</b></td><td>{title}</td></tr>
            </table>
            <table><tr><td><p>Announcement body.</p></td></tr></table>
            </body></html>"#
        )
    }

    // ── Mocks ───────────────────────────────────────────────────────

    struct MockMailbox {
        /// (summary, html body) per message, mailbox order.
        messages: Vec<(MessageSummary, Option<String>)>,
    }

    #[async_trait]
    impl Mailbox for MockMailbox {
        async fn fetch_summaries(&mut self) -> Result<Vec<MessageSummary>, MailError> {
            Ok(self.messages.iter().map(|(s, _)| s.clone()).collect())
        }

        async fn fetch_message(&mut self, uid: u32) -> Result<FetchedMessage, MailError> {
            self.messages
                .iter()
                .find(|(s, _)| s.uid == uid)
                .map(|(s, html)| FetchedMessage {
                    uid: s.uid,
                    subject: s.subject.clone(),
                    date: s.date,
                    html_body: html.clone(),
                })
                .ok_or_else(|| MailError::Protocol(format!("UID {uid} not found")))
        }

        async fn wait_for_change(&mut self, _: Duration) -> Result<MailboxEvent, MailError> {
            Ok(MailboxEvent::CountChanged)
        }

        async fn disconnect(&mut self) -> Result<(), MailError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        notes: Mutex<Vec<OutboundNote>>,
    }

    #[async_trait]
    impl NotifySink for RecordingSink {
        async fn deliver(&self, note: &OutboundNote) -> Result<(), DeliveryError> {
            self.notes.lock().unwrap().push(note.clone());
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl NotifySink for FailingSink {
        async fn deliver(&self, _: &OutboundNote) -> Result<(), DeliveryError> {
            Err(DeliveryError::Status {
                status: 500,
                body: "boom".to_string(),
            })
        }
    }

    fn watch_with(
        messages: Vec<(MessageSummary, Option<String>)>,
        sink: Arc<dyn NotifySink>,
    ) -> WatchLoop<MockMailbox> {
        WatchLoop::new(
            MockMailbox { messages },
            sink,
            MessageFilter::new(SENDER),
            None,
        )
    }

    async fn settle(sink: &RecordingSink, expected: usize) {
        for _ in 0..100 {
            if sink.notes.lock().unwrap().len() >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    // ── Match predicate ─────────────────────────────────────────────

    #[test]
    fn ignored_subject_prefix_is_excluded() {
        let filter = MessageFilter::new(SENDER);
        assert!(!filter.matches(&summary(1, SENDER, "Due soon: Essay 2", 0)));
        assert!(!filter.matches(&summary(2, SENDER, "Graded: Quiz 1", 0)));
    }

    #[test]
    fn ignored_subject_suffix_is_excluded() {
        let filter = MessageFilter::new(SENDER);
        assert!(!filter.matches(&summary(
            1,
            SENDER,
            "Juan accepted your friendship invitation",
            0
        )));
    }

    #[test]
    fn announcement_subject_is_included() {
        let filter = MessageFilter::new(SENDER);
        assert!(filter.matches(&summary(
            1,
            SENDER,
            "New Announcement: Midterm schedule",
            0
        )));
    }

    #[test]
    fn unrelated_sender_is_always_excluded() {
        let filter = MessageFilter::new(SENDER);
        assert!(!filter.matches(&summary(
            1,
            "\"Someone Else\" <noreply@example.com>",
            "New Announcement: Midterm schedule",
            0
        )));
    }

    #[test]
    fn subject_is_trimmed_before_the_phrase_check() {
        let filter = MessageFilter::new(SENDER);
        assert!(!filter.matches(&summary(1, SENDER, "  Due soon: Essay 2  ", 0)));
    }

    // ── Watermark behavior ──────────────────────────────────────────

    #[tokio::test]
    async fn preexisting_messages_are_counted_but_never_delivered() {
        let sink = Arc::new(RecordingSink::default());
        let mut watch = watch_with(
            vec![
                (
                    summary(1, SENDER, "New Announcement: A", 0),
                    Some(notification_html("A")),
                ),
                (
                    summary(2, SENDER, "New Announcement: B", 1),
                    Some(notification_html("B")),
                ),
                (
                    summary(3, SENDER, "Due soon: Essay 2", 2),
                    Some(notification_html("ignored")),
                ),
            ],
            sink.clone(),
        );

        watch.watermark = watch.matching_summaries().await.unwrap().len();
        assert_eq!(watch.watermark, 2); // the Due soon one does not match

        // A reconciliation with nothing new delivers nothing.
        watch.reconcile().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(sink.notes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn new_arrivals_are_delivered_oldest_first_and_advance_the_watermark() {
        let sink = Arc::new(RecordingSink::default());
        let mut watch = watch_with(
            vec![(
                summary(1, SENDER, "New Announcement: old", 0),
                Some(notification_html("old")),
            )],
            sink.clone(),
        );
        watch.watermark = watch.matching_summaries().await.unwrap().len();
        assert_eq!(watch.watermark, 1);

        watch.mailbox.messages.push((
            summary(5, SENDER, "New Announcement: second", 20),
            Some(notification_html("second")),
        ));
        watch.mailbox.messages.push((
            summary(4, SENDER, "New Announcement: first", 10),
            Some(notification_html("first")),
        ));

        watch.reconcile().await.unwrap();
        assert_eq!(watch.watermark, 3);

        settle(&sink, 2).await;
        let notes = sink.notes.lock().unwrap();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].cards[0].title.as_deref(), Some("first"));
        assert_eq!(notes[1].cards[0].title.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn shrunken_mailbox_clamps_the_watermark() {
        let sink = Arc::new(RecordingSink::default());
        let mut watch = watch_with(
            vec![
                (
                    summary(1, SENDER, "New Announcement: A", 0),
                    Some(notification_html("A")),
                ),
                (
                    summary(2, SENDER, "New Announcement: B", 1),
                    Some(notification_html("B")),
                ),
            ],
            sink.clone(),
        );
        watch.watermark = watch.matching_summaries().await.unwrap().len();
        assert_eq!(watch.watermark, 2);

        watch.mailbox.messages.remove(0);
        watch.reconcile().await.unwrap();
        assert_eq!(watch.watermark, 1);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(sink.notes.lock().unwrap().is_empty());
    }

    // ── Per-message failure isolation ───────────────────────────────

    #[tokio::test]
    async fn malformed_message_is_skipped_and_the_loop_continues() {
        let sink = Arc::new(RecordingSink::default());
        let mut watch = watch_with(vec![], sink.clone());

        watch.mailbox.messages.push((
            summary(1, SENDER, "New Announcement: broken", 0),
            Some("<p>not a notification</p>".to_string()),
        ));
        watch.mailbox.messages.push((
            summary(2, SENDER, "New Announcement: fine", 1),
            Some(notification_html("fine")),
        ));

        watch.reconcile().await.unwrap();
        assert_eq!(watch.watermark, 2);

        settle(&sink, 1).await;
        let notes = sink.notes.lock().unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].cards[0].title.as_deref(), Some("fine"));
    }

    #[tokio::test]
    async fn missing_html_body_is_skipped() {
        let sink = Arc::new(RecordingSink::default());
        let mut watch = watch_with(vec![], sink.clone());

        watch.mailbox.messages.push((
            summary(1, SENDER, "New Announcement: text only", 0),
            None,
        ));

        watch.reconcile().await.unwrap();
        assert_eq!(watch.watermark, 1);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(sink.notes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn delivery_failure_does_not_stop_reconciliation() {
        let mut watch = watch_with(vec![], Arc::new(FailingSink));

        watch.mailbox.messages.push((
            summary(1, SENDER, "New Announcement: A", 0),
            Some(notification_html("A")),
        ));
        watch.mailbox.messages.push((
            summary(2, SENDER, "New Announcement: B", 1),
            Some(notification_html("B")),
        ));

        watch.reconcile().await.unwrap();
        assert_eq!(watch.watermark, 2);

        // Both dispatch tasks fail inside themselves; nothing propagates.
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

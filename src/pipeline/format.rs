//! Card assembly for the delivery sink.
//!
//! One notification becomes one ordered run of cards: the body is split to
//! the sink's description limit, the title and logo ride on the first card,
//! and the footer, timestamp, and any decoration ride on the last.

use crate::error::SplitError;
use crate::notify::{EmbedFooter, EmbedImage, MessageCard, OutboundNote};
use crate::pipeline::extract::{NoticeKind, NotificationRecord};
use crate::pipeline::split;

/// Discord's per-embed description limit.
pub const DESCRIPTION_LIMIT: usize = 2048;

/// Shared accent color for every card.
pub const CARD_COLOR: u32 = 0x305C_A8;

/// Institutional logo shown as the first card's thumbnail.
const THUMBNAIL_URL: &str = "https://employeeportal.iacademy.edu.ph/images/iacnew.png";

/// Decoration attached when an assessment is handed out.
const ASSESSMENT_GIVEN_IMAGE_URL: &str =
    "https://iacademy-college.neolms.com/images/notification-headers/notification-assignment-given.png";

fn footer_text() -> String {
    format!("Automatic notification via {}", env!("CARGO_PKG_REPOSITORY"))
}

/// Build the ordered card run for one record.
pub fn build_cards(record: &NotificationRecord) -> Result<Vec<MessageCard>, SplitError> {
    let chunks = split::split(&record.body_markup, DESCRIPTION_LIMIT)?;
    let count = chunks.len();

    let mut cards = Vec::with_capacity(count);
    for (i, chunk) in chunks.into_iter().enumerate() {
        let mut card = MessageCard::new(chunk, CARD_COLOR);

        if i == 0 {
            card.title = Some(record.title.clone());
            card.thumbnail = Some(EmbedImage {
                url: THUMBNAIL_URL.to_string(),
            });
        }

        if i == count - 1 {
            if record.kind == Some(NoticeKind::AssessmentGiven) {
                card.image = Some(EmbedImage {
                    url: ASSESSMENT_GIVEN_IMAGE_URL.to_string(),
                });
            }
            card.footer = Some(EmbedFooter {
                text: footer_text(),
            });
            card.timestamp = Some(record.event_timestamp.to_rfc3339());
        }

        cards.push(card);
    }

    Ok(cards)
}

/// Assemble the complete outbound notification, display identity included.
pub fn build_note(
    record: &NotificationRecord,
    prefix_text: Option<&str>,
) -> Result<OutboundNote, SplitError> {
    Ok(OutboundNote {
        content: prefix_text.map(String::from),
        cards: build_cards(record)?,
        display_name: record.sender_name.clone(),
        avatar_url: record.sender_avatar_url.clone(),
    })
}

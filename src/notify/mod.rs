//! Delivery sink abstraction and the card types it accepts.

pub mod discord;

pub use discord::DiscordWebhook;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::DeliveryError;

/// One segment of a (possibly multi-part) formatted chat message.
///
/// Serializes directly as a Discord embed object, so the sink can place the
/// whole card list into the webhook payload untouched.
#[derive(Debug, Clone, Serialize)]
pub struct MessageCard {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub description: String,
    pub color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<EmbedImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    /// RFC 3339 instant shown in the card footer line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl MessageCard {
    /// A bare card: description and color only.
    pub fn new(description: impl Into<String>, color: u32) -> Self {
        Self {
            title: None,
            description: description.into(),
            color,
            thumbnail: None,
            image: None,
            footer: None,
            timestamp: None,
        }
    }
}

/// An image reference inside a card.
#[derive(Debug, Clone, Serialize)]
pub struct EmbedImage {
    pub url: String,
}

/// Footer text inside a card.
#[derive(Debug, Clone, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

/// A fully assembled outbound notification: the card run plus the display
/// identity the sink should impersonate.
#[derive(Debug, Clone)]
pub struct OutboundNote {
    /// Optional plain-text line above the cards.
    pub content: Option<String>,
    pub cards: Vec<MessageCard>,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

/// A chat delivery sink.
///
/// One call per source message; the sink provides no idempotency, so a
/// repeated call shows the message twice.
#[async_trait]
pub trait NotifySink: Send + Sync {
    async fn deliver(&self, note: &OutboundNote) -> Result<(), DeliveryError>;
}

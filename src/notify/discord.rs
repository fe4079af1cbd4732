//! Discord webhook sink.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::error::DeliveryError;
use crate::notify::{NotifySink, OutboundNote};

/// Delivers notes to a single Discord webhook, impersonating the display
/// identity carried on each note.
pub struct DiscordWebhook {
    /// Full webhook URL; it embeds the webhook token, hence the wrapper.
    url: SecretString,
    client: reqwest::Client,
}

impl DiscordWebhook {
    pub fn new(url: SecretString) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }

    /// Webhook execution payload for one note.
    fn payload(note: &OutboundNote) -> serde_json::Value {
        let mut body = serde_json::json!({
            "username": note.display_name,
            "embeds": note.cards,
        });
        if let Some(content) = &note.content {
            body["content"] = serde_json::Value::String(content.clone());
        }
        if let Some(avatar) = &note.avatar_url {
            body["avatar_url"] = serde_json::Value::String(avatar.clone());
        }
        body
    }
}

#[async_trait]
impl NotifySink for DiscordWebhook {
    async fn deliver(&self, note: &OutboundNote) -> Result<(), DeliveryError> {
        // TODO: split into several calls once a notification can exceed
        // Discord's 10-embeds-per-message cap.
        let resp = self
            .client
            .post(self.url.expose_secret())
            .json(&Self::payload(note))
            .send()
            .await
            .map_err(|e| DeliveryError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(DeliveryError::Status { status, body });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::MessageCard;

    fn note() -> OutboundNote {
        OutboundNote {
            content: Some("New school notice!".into()),
            cards: vec![MessageCard::new("body", 0x305C_A8)],
            display_name: "Maria Santos".into(),
            avatar_url: Some("https://cdn.neolms.test/avatar.png".into()),
        }
    }

    #[tokio::test]
    async fn unreachable_webhook_is_a_request_error() {
        // Nothing listens on this port; the send itself must fail, typed.
        let sink = DiscordWebhook::new(SecretString::from("http://127.0.0.1:9/webhook"));
        let err = sink.deliver(&note()).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Request(_)));
    }

    #[test]
    fn payload_shape_matches_the_webhook_contract() {
        let body = DiscordWebhook::payload(&note());

        assert_eq!(body["username"], "Maria Santos");
        assert_eq!(body["avatar_url"], "https://cdn.neolms.test/avatar.png");
        assert_eq!(body["content"], "New school notice!");
        assert_eq!(body["embeds"][0]["description"], "body");
        assert_eq!(body["embeds"][0]["color"], 0x305C_A8);
    }

    #[test]
    fn payload_omits_absent_content_and_avatar() {
        let mut n = note();
        n.content = None;
        n.avatar_url = None;

        let body = DiscordWebhook::payload(&n);
        assert!(body.get("content").is_none());
        assert!(body.get("avatar_url").is_none());
        assert_eq!(body["username"], "Maria Santos");
    }
}

//! Platform wire types: inbound webhook payloads and outbound API bodies.

use crate::machine::{ListSection, ReplyPayload};
use serde::{Deserialize, Serialize};

/// Inbound webhook envelope: `{ "event": ..., "data": ... }`.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    pub event: String,
    pub data: serde_json::Value,
}

/// Payload of a `message:in:new` event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageData {
    #[serde(default)]
    pub chat: Option<Chat>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub from_number: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

/// Conversation metadata as supplied by the platform on each inbound event.
/// The core only reads these fields; the platform owns the lifecycle.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    /// "chat" for a direct 1:1 conversation; anything else is a group.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub wa_status: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub owner: Option<ChatOwner>,
    #[serde(default)]
    pub contact: Option<Contact>,
    #[serde(default)]
    pub from_number: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatOwner {
    #[serde(default)]
    pub agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub metadata: Vec<ContactMetadata>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactMetadata {
    pub key: String,
    pub value: String,
}

/// A WhatsApp number connected to the platform.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub session: Option<DeviceSession>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSession {
    #[serde(default)]
    pub status: Option<String>,
}

/// An existing webhook subscription on the platform.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Webhook {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub events: Vec<String>,
}

/// Body for creating a webhook subscription.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWebhook {
    pub url: String,
    pub name: String,
    pub events: Vec<String>,
    pub device: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLabel {
    pub name: String,
    pub color: String,
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Selectable-list body on the send wire (`list` field).
#[derive(Debug, Clone, Serialize)]
pub struct ListMessage {
    pub description: String,
    pub button: String,
    pub title: String,
    pub sections: Vec<ListSection>,
}

/// Body for the platform message-send endpoint. Exactly one of `message`
/// (plain text) or `list` is set.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list: Option<ListMessage>,
    pub device: String,
    /// Deliver immediately, never queue on the platform side.
    pub enqueue: &'static str,
}

impl OutboundMessage {
    pub fn text(phone: impl Into<String>, device: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
            message: Some(body.into()),
            list: None,
            device: device.into(),
            enqueue: "never",
        }
    }

    pub fn from_reply(phone: &str, device: &str, reply: ReplyPayload) -> Self {
        match reply {
            ReplyPayload::Text { body } => Self::text(phone, device, body),
            ReplyPayload::SelectableList {
                description,
                button_label,
                title,
                sections,
            } => Self {
                phone: phone.to_string(),
                message: None,
                list: Some(ListMessage {
                    description,
                    button: button_label,
                    title,
                    sections,
                }),
                device: device.to_string(),
                enqueue: "never",
            },
        }
    }

    /// Short description of the content, for logs.
    pub fn summary(&self) -> &str {
        self.message
            .as_deref()
            .or_else(|| self.list.as_ref().map(|l| l.description.as_str()))
            .unwrap_or("<no message>")
    }
}

/// Platform acknowledgment of a sent message, plus the local attempt count.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub status: String,
    /// Attempts the dispatcher needed (1..=3). Not a platform field.
    #[serde(default)]
    pub attempts: u32,
}

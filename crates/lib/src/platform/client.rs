//! Platform HTTP client: message send with bounded retry, device discovery,
//! webhook registration, and label/team synchronization with TTL caching.

use crate::cache::TtlCache;
use crate::error::DispatchError;
use crate::platform::{
    Chat, ContactMetadata, DeliveryReceipt, Device, Dispatcher, Label, NewLabel, NewWebhook,
    OutboundMessage, TeamMember, Webhook,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Fixed attempt budget for a send; no backoff, bounded blocking.
const SEND_ATTEMPTS: u32 = 3;

/// Platform label colors; chat labels created by the bot pick from these.
const LABEL_COLORS: &[&str] = &[
    "tomato", "orange", "sunflower", "bubble", "rose", "poppy", "rouge", "raspberry", "purple",
    "lavender", "violet", "pool", "emerald", "kelly", "apple", "turquoise", "aqua", "gold",
    "latte", "cocoa",
];

/// Clip to at most `max` characters and trim, matching the platform's field
/// length limits.
fn clip(s: &str, max: usize) -> String {
    s.chars().take(max).collect::<String>().trim().to_string()
}

pub struct PlatformClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    members: TtlCache<Vec<TeamMember>>,
    labels: TtlCache<Vec<Label>>,
}

impl PlatformClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, cache_ttl: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            members: TtlCache::new(cache_ttl),
            labels: TtlCache::new(cache_ttl),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        let res = self
            .http
            .get(&url)
            .header("Authorization", &self.api_key)
            .send()
            .await
            .with_context(|| format!("GET {}", url))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            anyhow::bail!("GET {} failed: {} {}", url, status, body);
        }
        res.json().await.with_context(|| format!("decoding GET {}", url))
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.url(path);
        let res = self
            .http
            .post(&url)
            .header("Authorization", &self.api_key)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {}", url))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            anyhow::bail!("POST {} failed: {} {}", url, status, body);
        }
        res.json().await.with_context(|| format!("decoding POST {}", url))
    }

    async fn patch_json<B: Serialize>(&self, path: &str, body: &B) -> Result<()> {
        let url = self.url(path);
        let res = self
            .http
            .patch(&url)
            .header("Authorization", &self.api_key)
            .json(body)
            .send()
            .await
            .with_context(|| format!("PATCH {}", url))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            anyhow::bail!("PATCH {} failed: {} {}", url, status, body);
        }
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let url = self.url(path);
        let res = self
            .http
            .delete(&url)
            .header("Authorization", &self.api_key)
            .send()
            .await
            .with_context(|| format!("DELETE {}", url))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            anyhow::bail!("DELETE {} failed: {} {}", url, status, body);
        }
        Ok(())
    }

    /// Send one message. Network errors and 5xx responses are retried up to
    /// [`SEND_ATTEMPTS`] times; 4xx responses are permanent and returned
    /// immediately. The receipt records how many attempts were used.
    pub async fn send_message(
        &self,
        message: &OutboundMessage,
    ) -> Result<DeliveryReceipt, DispatchError> {
        let url = self.url("/messages");
        let mut last_reason = String::new();
        for attempt in 1..=SEND_ATTEMPTS {
            let res = self
                .http
                .post(&url)
                .header("Authorization", &self.api_key)
                .json(message)
                .send()
                .await;
            match res {
                Ok(res) => {
                    let status = res.status();
                    if status.is_success() {
                        // The platform accepted the message; a garbled receipt
                        // body must not trigger a resend.
                        let mut receipt = match res.json::<DeliveryReceipt>().await {
                            Ok(receipt) => receipt,
                            Err(e) => {
                                log::warn!(
                                    "message sent but receipt did not decode: {} {}",
                                    message.phone,
                                    e
                                );
                                DeliveryReceipt::default()
                            }
                        };
                        receipt.attempts = attempt;
                        log::info!(
                            "message sent: {} {} {}",
                            message.phone,
                            receipt.id,
                            receipt.status
                        );
                        return Ok(receipt);
                    } else if status.is_client_error() {
                        let body = res.text().await.unwrap_or_default();
                        log::error!(
                            "failed to send message: {} {} {} {}",
                            message.phone,
                            message.summary(),
                            status,
                            body
                        );
                        return Err(DispatchError::Rejected {
                            status: status.as_u16(),
                            body,
                        });
                    } else {
                        let body = res.text().await.unwrap_or_default();
                        last_reason = format!("{} {}", status, body);
                        log::warn!(
                            "transient send failure (attempt {}/{}): {} {}",
                            attempt,
                            SEND_ATTEMPTS,
                            message.phone,
                            last_reason
                        );
                    }
                }
                Err(e) => {
                    last_reason = e.to_string();
                    log::warn!(
                        "transient send failure (attempt {}/{}): {} {}",
                        attempt,
                        SEND_ATTEMPTS,
                        message.phone,
                        last_reason
                    );
                }
            }
        }
        Err(DispatchError::Exhausted {
            attempts: SEND_ATTEMPTS,
            reason: last_reason,
        })
    }

    /// All devices connected to the account.
    pub async fn list_devices(&self) -> Result<Vec<Device>> {
        self.get_json("/devices").await
    }

    /// Team roster for a device, cached for the configured TTL.
    pub async fn team_members(&self, device_id: &str) -> Result<Vec<TeamMember>> {
        if let Some(cached) = self.members.get().await {
            return Ok((*cached).clone());
        }
        let members: Vec<TeamMember> = self
            .get_json(&format!("/devices/{}/team", device_id))
            .await?;
        self.members.put(members.clone()).await;
        Ok(members)
    }

    /// Labels defined on a device, cached for the configured TTL.
    /// `force` bypasses and refreshes the cache.
    pub async fn labels(&self, device_id: &str, force: bool) -> Result<Vec<Label>> {
        if !force {
            if let Some(cached) = self.labels.get().await {
                return Ok((*cached).clone());
            }
        }
        let labels: Vec<Label> = self
            .get_json(&format!("/devices/{}/labels", device_id))
            .await?;
        self.labels.put(labels.clone()).await;
        Ok(labels)
    }

    /// Create every label in `required` that the device does not have yet,
    /// then force-refresh the label cache. Creation failures are logged and
    /// skipped so one bad label cannot block startup.
    pub async fn create_missing_labels(&self, device_id: &str, required: &[String]) -> Result<()> {
        let existing = self.labels(device_id, false).await?;
        let missing: Vec<&String> = required
            .iter()
            .filter(|name| existing.iter().all(|l| &l.name != *name))
            .collect();
        for name in &missing {
            log::info!("creating missing label: {}", name);
            // Color picked from the palette by name hash; the platform only
            // needs it to be one of its known color names.
            let color_index =
                name.bytes().fold(0usize, |acc, b| acc + b as usize) % LABEL_COLORS.len();
            let body = NewLabel {
                name: clip(name, 30),
                color: LABEL_COLORS[color_index].to_string(),
                description: "Automatically created label for the chatbot".to_string(),
            };
            if let Err(e) = self
                .post_json::<_, serde_json::Value>(&format!("/devices/{}/labels", device_id), &body)
                .await
            {
                log::error!("failed to create label {}: {}", name, e);
            }
        }
        if !missing.is_empty() {
            self.labels(device_id, true).await?;
        }
        Ok(())
    }

    pub async fn list_webhooks(&self) -> Result<Vec<Webhook>> {
        self.get_json("/webhooks").await
    }

    pub async fn delete_webhook(&self, id: &str) -> Result<()> {
        self.delete(&format!("/webhooks/{}", id)).await
    }

    /// Ensure exactly one active subscription to `message:in:new` points at
    /// `<public_url>/webhook` for this device. An existing matching
    /// registration is kept; stale registrations under the same base URL are
    /// deleted before a new one is created.
    pub async fn ensure_webhook(&self, public_url: &str, device_id: &str) -> Result<Webhook> {
        let base = public_url.trim_end_matches('/');
        let webhook_url = format!("{}/webhook", base);

        let webhooks = self.list_webhooks().await?;
        if let Some(existing) = webhooks.iter().find(|w| {
            w.url == webhook_url
                && w.device.as_deref() == Some(device_id)
                && w.status.as_deref() == Some("active")
                && w.events.iter().any(|e| e == "message:in:new")
        }) {
            return Ok(existing.clone());
        }

        for webhook in &webhooks {
            if webhook.url.starts_with(base) {
                log::info!("removing stale webhook registration: {}", webhook.url);
                self.delete_webhook(&webhook.id).await?;
            }
        }

        // Give the platform a moment to settle deletions before re-creating.
        tokio::time::sleep(Duration::from_millis(500)).await;

        let body = NewWebhook {
            url: webhook_url,
            name: "Wakili chatbot".to_string(),
            events: vec!["message:in:new".to_string()],
            device: device_id.to_string(),
        };
        self.post_json("/webhooks", &body)
            .await
            .context("creating webhook subscription")
    }

    /// Add `labels` to the chat, keeping labels it already has. Labels the
    /// chat already carries are not re-sent.
    pub async fn update_chat_labels(
        &self,
        device_id: &str,
        chat: &Chat,
        labels: &[String],
    ) -> Result<()> {
        let mut merged = chat.labels.clone();
        for label in labels {
            if !merged.contains(label) {
                merged.push(label.clone());
            }
        }
        if merged.len() == chat.labels.len() {
            return Ok(());
        }
        log::info!("updating chat labels: {} {:?}", chat.id, merged);
        self.patch_json(
            &format!("/chat/{}/chats/{}/labels", device_id, chat.id),
            &merged,
        )
        .await
    }

    /// Patch resolved metadata entries onto the chat's contact, skipping
    /// entries already present with the same value. Keys clip to 30 chars,
    /// values to 1000.
    pub async fn update_chat_metadata(
        &self,
        device_id: &str,
        chat: &Chat,
        entries: &[(String, String)],
    ) -> Result<()> {
        let existing: &[ContactMetadata] = chat
            .contact
            .as_ref()
            .map(|c| c.metadata.as_slice())
            .unwrap_or(&[]);
        let payload: Vec<ContactMetadata> = entries
            .iter()
            .filter(|(key, value)| !key.is_empty() && !value.is_empty())
            .filter(|(key, value)| {
                !existing
                    .iter()
                    .any(|e| &e.key == key && &e.value == value)
            })
            .map(|(key, value)| ContactMetadata {
                key: clip(key, 30),
                value: clip(value, 1000),
            })
            .collect();
        if payload.is_empty() {
            return Ok(());
        }
        self.patch_json(
            &format!("/chat/{}/contacts/{}/metadata", device_id, chat.id),
            &payload,
        )
        .await
    }
}

#[async_trait]
impl Dispatcher for PlatformClient {
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt, DispatchError> {
        self.send_message(message).await
    }
}

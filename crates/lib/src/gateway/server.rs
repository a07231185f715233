//! Gateway HTTP server: webhook ingest, on-demand send, and sample routes.
//!
//! Inbound events are acknowledged at the HTTP edge and handed to a
//! background processor over an mpsc queue; processing failures are logged
//! and never surface to the (already sent) acknowledgment.

use crate::bootstrap;
use crate::config::Config;
use crate::error::{DispatchError, ProcessError};
use crate::gate::{self, ReplyRules};
use crate::machine;
use crate::platform::{
    Chat, Device, Dispatcher, MessageData, OutboundMessage, PlatformClient, WebhookEnvelope,
};
use crate::state::StateStore;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const ACCEPTED_EVENT: &str = "message:in:new";

/// Shared state for the gateway (config, gate rules, platform, conversation
/// states). Built once at startup and injected into every handler.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    pub rules: Arc<ReplyRules>,
    pub platform: Arc<PlatformClient>,
    /// Outbound delivery seam; the live gateway points it at `platform`.
    pub dispatcher: Arc<dyn Dispatcher>,
    pub device: Arc<Device>,
    pub states: Arc<StateStore>,
    /// Sender for acknowledged inbound events; the processor task receives.
    pub inbound_tx: mpsc::Sender<MessageData>,
}

/// Chat id and contact phone, validated up front so the pipeline never
/// dereferences absent fields mid-processing.
struct ConversationContext {
    chat_id: String,
    phone: String,
}

impl ConversationContext {
    fn from_chat(chat: &Chat) -> Result<Self, ProcessError> {
        let contact = chat
            .contact
            .as_ref()
            .ok_or_else(|| ProcessError::MalformedConversation("missing chat contact".to_string()))?;
        let phone = contact
            .phone
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| {
                ProcessError::MalformedConversation("missing contact phone".to_string())
            })?;
        Ok(Self {
            chat_id: chat.id.clone(),
            phone: phone.to_string(),
        })
    }
}

/// Process one acknowledged inbound message: gate, state transition under the
/// per-conversation lock, dispatch, then best-effort chat bookkeeping.
async fn process_inbound(state: &GatewayState, data: MessageData) -> Result<(), ProcessError> {
    let Some(chat) = data.chat.as_ref() else {
        return Err(ProcessError::MalformedConversation(
            "missing chat".to_string(),
        ));
    };

    if !gate::can_reply(chat, &state.rules) {
        log::info!(
            "skipping message: chat {} assigned or not eligible to reply",
            chat.id
        );
        return Ok(());
    }

    let ctx = ConversationContext::from_chat(chat)?;
    let body = data.body.as_deref().unwrap_or("").trim().to_string();
    log::info!(
        "new inbound message: {} {}",
        ctx.chat_id,
        if body.is_empty() { "<empty message>" } else { &body }
    );

    // Hold the per-conversation lock across the read-modify-write so two
    // events for the same chat cannot interleave their transitions.
    let entry = state.states.entry(&ctx.chat_id).await;
    let transition = {
        let mut current = entry.lock().await;
        let t = machine::transition(*current, &body);
        *current = t.next;
        t
    };

    let Some(reply) = transition.reply else {
        return Ok(());
    };
    let outbound = OutboundMessage::from_reply(&ctx.phone, &state.device.id, reply);
    state
        .dispatcher
        .send(&outbound)
        .await
        .map_err(ProcessError::Dispatch)?;

    tag_bot_chat(state, chat).await;
    Ok(())
}

/// Mark a chat the bot replied to with the configured labels and metadata.
/// Best-effort: both patches skip work already present and only log failures.
async fn tag_bot_chat(state: &GatewayState, chat: &Chat) {
    if !state.config.set_labels_on_bot_chats.is_empty() {
        if let Err(e) = state
            .platform
            .update_chat_labels(&state.device.id, chat, &state.config.set_labels_on_bot_chats)
            .await
        {
            log::warn!("failed to update chat labels for {}: {}", chat.id, e);
        }
    }
    let entries: Vec<(String, String)> = state
        .config
        .set_metadata_on_bot_chats
        .iter()
        .map(|t| (t.key.clone(), t.resolved_value()))
        .collect();
    if !entries.is_empty() {
        if let Err(e) = state
            .platform
            .update_chat_metadata(&state.device.id, chat, &entries)
            .await
        {
            log::warn!("failed to update chat metadata for {}: {}", chat.id, e);
        }
    }
}

/// Receive acknowledged events and process each in its own task: different
/// conversations run in parallel while the per-conversation state lock keeps
/// same-conversation events serialized.
fn spawn_processor(state: GatewayState, mut inbound_rx: mpsc::Receiver<MessageData>) {
    tokio::spawn(async move {
        while let Some(data) = inbound_rx.recv().await {
            let state = state.clone();
            tokio::spawn(async move {
                if let Err(e) = process_inbound(&state, data).await {
                    log::warn!("failed to process inbound message: {}", e);
                }
            });
        }
    });
}

fn invalid_payload() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "message": "Invalid payload body" })),
    )
}

fn dispatch_failure(err: &DispatchError) -> (StatusCode, Json<serde_json::Value>) {
    let status = err
        .upstream_status()
        .and_then(|s| StatusCode::from_u16(s).ok())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({ "message": err.to_string() })))
}

/// GET / — service description for probes and humans.
async fn index() -> Json<serde_json::Value> {
    Json(json!({
        "name": "wakili",
        "description": "WhatsApp chatbot gateway for Wakili Law Firm",
        "endpoints": {
            "webhook": { "path": "/webhook", "method": "POST" },
            "sendMessage": { "path": "/message", "method": "POST" },
            "sample": { "path": "/sample", "method": "GET" },
        },
    }))
}

/// POST /webhook — validate the envelope, acknowledge, queue for processing.
async fn webhook(
    State(state): State<GatewayState>,
    body: Bytes,
) -> (StatusCode, Json<serde_json::Value>) {
    let envelope: WebhookEnvelope = match serde_json::from_slice(&body) {
        Ok(e) => e,
        Err(_) => return invalid_payload(),
    };
    if envelope.event != ACCEPTED_EVENT {
        return (
            StatusCode::ACCEPTED,
            Json(json!({
                "message": "Ignoring webhook event: only message:in:new is accepted"
            })),
        );
    }
    let data: MessageData = match serde_json::from_value(envelope.data) {
        Ok(d) => d,
        Err(_) => return invalid_payload(),
    };
    if state.inbound_tx.send(data).await.is_err() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "message": "Processor unavailable" })),
        );
    }
    (StatusCode::OK, Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
struct SendRequest {
    phone: Option<String>,
    message: Option<String>,
}

/// POST /message — on-demand send, bypassing the state machine. Dispatcher
/// failures propagate here because the caller is synchronous.
async fn send_on_demand(
    State(state): State<GatewayState>,
    body: Bytes,
) -> (StatusCode, Json<serde_json::Value>) {
    let request: SendRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(_) => return invalid_payload(),
    };
    let (Some(phone), Some(message)) = (request.phone, request.message) else {
        return invalid_payload();
    };
    let outbound = OutboundMessage::text(phone, state.device.id.clone(), message);
    match state.dispatcher.send(&outbound).await {
        Ok(receipt) => (
            StatusCode::OK,
            Json(serde_json::to_value(&receipt).unwrap_or_else(|_| json!({}))),
        ),
        Err(e) => dispatch_failure(&e),
    }
}

#[derive(Debug, Deserialize)]
struct SampleQuery {
    phone: Option<String>,
    message: Option<String>,
}

/// GET /sample — send a sample text to the device's own number or the one in
/// the query string.
async fn sample(
    State(state): State<GatewayState>,
    Query(query): Query<SampleQuery>,
) -> (StatusCode, Json<serde_json::Value>) {
    let phone = query.phone.or_else(|| state.device.phone.clone());
    let Some(phone) = phone else {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "message": "No phone available for the sample message" })),
        );
    };
    let message = query
        .message
        .unwrap_or_else(|| "Hello World from Wakili!".to_string());
    let outbound = OutboundMessage::text(phone, state.device.id.clone(), message);
    match state.dispatcher.send(&outbound).await {
        Ok(receipt) => (
            StatusCode::OK,
            Json(serde_json::to_value(&receipt).unwrap_or_else(|_| json!({}))),
        ),
        Err(e) => dispatch_failure(&e),
    }
}

/// Run the gateway: validate config, bootstrap against the platform, register
/// the webhook, then serve until SIGINT/SIGTERM.
pub async fn run_gateway(config: Config) -> Result<()> {
    config.validate()?;

    let platform = Arc::new(PlatformClient::new(
        config.api_url.clone(),
        config.api_key.clone(),
        Duration::from_secs(config.cache_ttl_secs),
    ));
    let device = Arc::new(bootstrap::prepare(&config, &platform).await?);

    let (inbound_tx, inbound_rx) = mpsc::channel::<MessageData>(64);
    let state = GatewayState {
        config: Arc::new(config.clone()),
        rules: Arc::new(ReplyRules::from_config(&config)),
        platform: platform.clone(),
        dispatcher: platform.clone(),
        device: device.clone(),
        states: Arc::new(StateStore::new()),
        inbound_tx,
    };
    spawn_processor(state.clone(), inbound_rx);

    let app = Router::new()
        .route("/", get(index))
        .route("/webhook", post(webhook))
        .route("/message", post(send_on_demand))
        .route("/sample", get(sample))
        .with_state(state);

    let bind_addr = format!("{}:{}", config.bind, config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    match config.webhook_url.as_deref() {
        Some(url) => {
            let webhook = platform
                .ensure_webhook(url, &device.id)
                .await
                .context("registering webhook endpoint")?;
            log::info!("using webhook endpoint: {}", webhook.url);
        }
        None => {
            // validate() already required a URL in production mode.
            log::warn!("no webhook URL configured; register one manually to receive messages");
        }
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::ChatState;
    use crate::platform::{Contact, DeliveryReceipt};
    use tokio::sync::Mutex;

    struct RecordingDispatcher {
        sent: Mutex<Vec<OutboundMessage>>,
    }

    #[async_trait::async_trait]
    impl Dispatcher for RecordingDispatcher {
        async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt, DispatchError> {
            self.sent.lock().await.push(message.clone());
            Ok(DeliveryReceipt {
                id: "msg-1".to_string(),
                status: "queued".to_string(),
                attempts: 1,
            })
        }
    }

    fn test_state(dispatcher: Arc<RecordingDispatcher>) -> GatewayState {
        let mut config = Config::default();
        // Keep the pipeline off the network: no label/metadata bookkeeping.
        config.set_labels_on_bot_chats = Vec::new();
        config.set_metadata_on_bot_chats = Vec::new();
        let (inbound_tx, _inbound_rx) = mpsc::channel(1);
        GatewayState {
            rules: Arc::new(ReplyRules::from_config(&config)),
            config: Arc::new(config),
            platform: Arc::new(PlatformClient::new(
                "http://127.0.0.1:1",
                "k".repeat(80),
                Duration::from_secs(600),
            )),
            dispatcher,
            device: Arc::new(Device {
                id: "65cb53dc6c4e3c2d692a92c7".to_string(),
                phone: None,
                alias: None,
                status: None,
                session: None,
            }),
            states: Arc::new(StateStore::new()),
            inbound_tx,
        }
    }

    fn direct_message(chat_id: &str, phone: Option<&str>, body: &str) -> MessageData {
        MessageData {
            chat: Some(Chat {
                id: chat_id.to_string(),
                kind: Some("chat".to_string()),
                status: None,
                wa_status: None,
                labels: Vec::new(),
                owner: None,
                contact: phone.map(|p| Contact {
                    phone: Some(p.to_string()),
                    metadata: Vec::new(),
                }),
                from_number: phone.map(str::to_string),
            }),
            body: Some(body.to_string()),
            kind: Some("text".to_string()),
            from_number: phone.map(str::to_string),
            date: None,
        }
    }

    #[tokio::test]
    async fn pipeline_dispatches_through_the_seam_and_advances_state() {
        let dispatcher = Arc::new(RecordingDispatcher {
            sent: Mutex::new(Vec::new()),
        });
        let state = test_state(dispatcher.clone());

        process_inbound(&state, direct_message("chat-1", Some("+254700000001"), "hi"))
            .await
            .expect("first message processes");

        let sent = dispatcher.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message.as_deref(), Some("What is your name?"));
        assert_eq!(sent[0].phone, "+254700000001");
        drop(sent);
        assert_eq!(state.states.get("chat-1").await, ChatState::AwaitingName);
    }

    #[tokio::test]
    async fn missing_contact_aborts_as_malformed_without_sending() {
        let dispatcher = Arc::new(RecordingDispatcher {
            sent: Mutex::new(Vec::new()),
        });
        let state = test_state(dispatcher.clone());

        let err = process_inbound(&state, direct_message("chat-2", None, "hi"))
            .await
            .expect_err("no contact phone");
        assert!(matches!(err, ProcessError::MalformedConversation(_)));
        assert!(dispatcher.sent.lock().await.is_empty());
        assert_eq!(state.states.get("chat-2").await, ChatState::Unset);
    }

    #[tokio::test]
    async fn missing_chat_aborts_as_malformed() {
        let dispatcher = Arc::new(RecordingDispatcher {
            sent: Mutex::new(Vec::new()),
        });
        let state = test_state(dispatcher.clone());

        let mut data = direct_message("chat-3", Some("+254700000001"), "hi");
        data.chat = None;
        let err = process_inbound(&state, data)
            .await
            .expect_err("no chat at all");
        assert!(matches!(err, ProcessError::MalformedConversation(_)));
        assert!(dispatcher.sent.lock().await.is_empty());
    }
}

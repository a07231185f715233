//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (default `~/.wakili/config.json`) with
//! environment overrides (`API_KEY`, `API_URL`, `DEVICE`, `PORT`,
//! `WEBHOOK_URL`, `PRODUCTION`). Invalid values are fatal at startup, never
//! at runtime.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const MIN_API_KEY_LEN: usize = 60;

/// Top-level application config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Platform API key. Required; overridden by `API_KEY` env.
    #[serde(default)]
    pub api_key: String,

    /// Platform API base URL. Overridden by `API_URL` env.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Optional device id (24 hex chars) to serve from. When absent, the
    /// first operative device is used.
    #[serde(default)]
    pub device: Option<String>,

    /// HTTP server TCP port (default 8080). Overridden by `PORT` env.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bind address (default "0.0.0.0").
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Production mode: a webhook URL must be configured.
    #[serde(default)]
    pub production: bool,

    /// Public base URL for webhook self-registration. Overridden by
    /// `WEBHOOK_URL` env.
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Labels set on bot-managed chats.
    #[serde(default = "default_bot_labels")]
    pub set_labels_on_bot_chats: Vec<String>,

    /// Chats carrying any of these labels are skipped by the gate.
    #[serde(default)]
    pub skip_chat_with_labels: Vec<String>,

    /// When non-empty, only these numbers are replied to (E164, no symbols).
    #[serde(default)]
    pub numbers_whitelist: Vec<String>,

    /// Numbers never replied to (E164, no symbols).
    #[serde(default)]
    pub numbers_blacklist: Vec<String>,

    /// Skip chats the user archived.
    #[serde(default = "default_true")]
    pub skip_archived_chats: bool,

    /// Team member ids (24 hex chars) eligible for assignment; validated
    /// against the roster at startup.
    #[serde(default)]
    pub team_whitelist: Vec<String>,

    /// Team member ids never assigned; validated against the roster at startup.
    #[serde(default)]
    pub team_blacklist: Vec<String>,

    /// Metadata entries set on bot-managed chats.
    #[serde(default = "default_bot_metadata")]
    pub set_metadata_on_bot_chats: Vec<MetadataTemplate>,

    /// TTL for the team roster and label caches, in seconds (default 600).
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

/// A metadata entry template. The value `"$now"` resolves to the current UTC
/// time in RFC 3339; anything else is taken literally.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataTemplate {
    pub key: String,
    pub value: String,
}

impl MetadataTemplate {
    pub fn resolved_value(&self) -> String {
        if self.value == "$now" {
            chrono::Utc::now().to_rfc3339()
        } else {
            self.value.clone()
        }
    }
}

fn default_api_url() -> String {
    "https://api.whatsawa.com/v1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_true() -> bool {
    true
}

fn default_bot_labels() -> Vec<String> {
    vec!["bot".to_string()]
}

fn default_bot_metadata() -> Vec<MetadataTemplate> {
    vec![MetadataTemplate {
        key: "bot_start".to_string(),
        value: "$now".to_string(),
    }]
}

fn default_cache_ttl_secs() -> u64 {
    600
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_url: default_api_url(),
            device: None,
            port: default_port(),
            bind: default_bind(),
            production: false,
            webhook_url: None,
            set_labels_on_bot_chats: default_bot_labels(),
            skip_chat_with_labels: Vec::new(),
            numbers_whitelist: Vec::new(),
            numbers_blacklist: Vec::new(),
            skip_archived_chats: default_true(),
            team_whitelist: Vec::new(),
            team_blacklist: Vec::new(),
            set_metadata_on_bot_chats: default_bot_metadata(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

/// True for a 24-character hexadecimal platform id (devices, team members).
pub fn is_hex_id(s: &str) -> bool {
    s.len() == 24 && s.chars().all(|c| c.is_ascii_hexdigit())
}

impl Config {
    /// Startup validation. Violations are fatal before serving traffic.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().len() < MIN_API_KEY_LEN {
            anyhow::bail!(
                "missing or too-short platform API key (expected at least {} characters); \
                 set apiKey in the config file or the API_KEY environment variable",
                MIN_API_KEY_LEN
            );
        }
        if let Some(ref device) = self.device {
            if !is_hex_id(device) {
                anyhow::bail!(
                    "invalid device id {:?}: must be a 24 character hexadecimal value",
                    device
                );
            }
        }
        if self.production && self.webhook_url.as_deref().map_or(true, |u| u.trim().is_empty()) {
            anyhow::bail!("webhookUrl (or WEBHOOK_URL) must be set in production mode");
        }
        Ok(())
    }
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("WAKILI_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".wakili").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn apply_env_overrides(config: &mut Config) -> Result<()> {
    if let Some(key) = non_empty_env("API_KEY") {
        config.api_key = key;
    }
    if let Some(url) = non_empty_env("API_URL") {
        config.api_url = url;
    }
    if let Some(device) = non_empty_env("DEVICE") {
        config.device = Some(device);
    }
    if let Some(port) = non_empty_env("PORT") {
        config.port = port
            .parse()
            .with_context(|| format!("parsing PORT environment variable {:?}", port))?;
    }
    if let Some(url) = non_empty_env("WEBHOOK_URL") {
        config.webhook_url = Some(url);
    }
    if let Some(prod) = non_empty_env("PRODUCTION") {
        config.production = prod == "1" || prod.eq_ignore_ascii_case("true");
    }
    Ok(())
}

/// Load config from the given path (or the default). Missing file => default
/// config; env overrides apply either way.
pub fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let path = path.unwrap_or_else(default_config_path);
    let mut config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    apply_env_overrides(&mut config)?;
    Ok(config)
}

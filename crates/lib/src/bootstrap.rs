//! Startup orchestration against the platform API: device discovery, cache
//! preload, label creation, and team id validation. Every failure here is
//! fatal — the gateway must not serve traffic half-configured.

use crate::config::{is_hex_id, Config};
use crate::platform::{Device, PlatformClient, TeamMember};
use anyhow::{Context, Result};

/// Resolve the device to serve from and make sure the account is in a usable
/// state: roster and labels preloaded, required labels created, configured
/// team ids validated.
pub async fn prepare(config: &Config, platform: &PlatformClient) -> Result<Device> {
    let device = load_device(config, platform).await?;
    log::info!(
        "using connected number: {} {} (id = {})",
        device.phone.as_deref().unwrap_or("<unknown>"),
        device.alias.as_deref().unwrap_or(""),
        device.id
    );

    let members = platform
        .team_members(&device.id)
        .await
        .context("preloading team roster")?;
    platform
        .labels(&device.id, false)
        .await
        .context("preloading labels")?;
    platform
        .create_missing_labels(&device.id, &config.set_labels_on_bot_chats)
        .await
        .context("creating chatbot labels")?;
    validate_team_ids(config, &members)?;

    Ok(device)
}

/// Pick the configured device by id, or the first operative one. The device
/// session must be online for inbound messages to flow.
pub async fn load_device(config: &Config, platform: &PlatformClient) -> Result<Device> {
    let devices = platform.list_devices().await.context("listing devices")?;
    let device = match &config.device {
        Some(selector) => devices
            .into_iter()
            .find(|d| &d.id == selector)
            .with_context(|| format!("configured device {} not found in the account", selector))?,
        None => devices
            .into_iter()
            .find(|d| d.status.as_deref() == Some("operative"))
            .context(
                "no operative WhatsApp number in the account; connect a number before starting",
            )?,
    };

    if let Some(ref session) = device.session {
        if session.status.as_deref() != Some("online") {
            anyhow::bail!(
                "device {} is not online (session status: {}); reconnect the number first",
                device.id,
                session.status.as_deref().unwrap_or("unknown")
            );
        }
    }

    Ok(device)
}

/// Every id in the team whitelist/blacklist must be a 24-char hex value and
/// exist in the roster.
pub fn validate_team_ids(config: &Config, members: &[TeamMember]) -> Result<()> {
    for id in config.team_whitelist.iter().chain(&config.team_blacklist) {
        if !is_hex_id(id) {
            anyhow::bail!(
                "team id {:?} in teamWhitelist/teamBlacklist must be a 24 character hexadecimal value",
                id
            );
        }
        if !members.iter().any(|m| &m.id == id) {
            anyhow::bail!(
                "team id {:?} in teamWhitelist/teamBlacklist does not exist in the team roster",
                id
            );
        }
    }
    Ok(())
}

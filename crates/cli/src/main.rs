use clap::{Parser, Subcommand};
use lib::platform::{OutboundMessage, PlatformClient};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "wakili")]
#[command(about = "Wakili WhatsApp chatbot", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the webhook gateway and reply to incoming WhatsApp messages.
    Serve {
        /// Config file path (default: WAKILI_CONFIG_PATH or ~/.wakili/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default from config or 8080)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Send a one-off text message through the platform, without the gateway.
    Send {
        /// Config file path (default: WAKILI_CONFIG_PATH or ~/.wakili/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Destination phone number in E.164 format, e.g. +254700000001
        #[arg(long)]
        phone: String,

        /// Message text to send
        #[arg(long)]
        message: String,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("wakili {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Serve { config, port }) => {
            if let Err(e) = run_serve(config, port).await {
                log::error!("gateway failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Send {
            config,
            phone,
            message,
        }) => {
            if let Err(e) = run_send(config, phone, message).await {
                log::error!("send failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

async fn run_serve(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let mut config = lib::config::load_config(config_path)?;
    if let Some(p) = port {
        config.port = p;
    }
    log::info!("starting gateway on {}:{}", config.bind, config.port);
    lib::gateway::run_gateway(config).await
}

async fn run_send(
    config_path: Option<std::path::PathBuf>,
    phone: String,
    message: String,
) -> anyhow::Result<()> {
    let config = lib::config::load_config(config_path)?;
    config.validate()?;

    let platform = PlatformClient::new(
        config.api_url.clone(),
        config.api_key.clone(),
        Duration::from_secs(config.cache_ttl_secs),
    );
    let device = lib::bootstrap::load_device(&config, &platform).await?;
    let outbound = OutboundMessage::text(phone, device.id, message);
    let receipt = platform.send_message(&outbound).await?;
    println!("{}", serde_json::to_string_pretty(&receipt)?);
    Ok(())
}

mod gateway;

use clap::{Parser, Subcommand};
use courier_channels::{
    dispatch::{Dispatcher, TemplateIds},
    telegram::TelegramSource,
    twilio::TwilioClient,
};
use courier_core::{config, filter, traits::EventSource};
use courier_media::{host, retention};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "courier",
    version,
    about = "Relay Telegram messages to WhatsApp with local media hosting"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay.
    Start,
    /// Check the configuration and report per-subsystem health.
    Status,
    /// Run the retention sweep once and exit.
    Sweep,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match cli.command {
        Commands::Start => {
            let cfg = config::load(&cli.config)?;
            cfg.validate()?;

            let hosting_dir = PathBuf::from(&cfg.media.hosting_dir);
            std::fs::create_dir_all(&hosting_dir)?;

            // Media server and nightly retention sweep run for the life
            // of the process.
            let serve_dir = hosting_dir.clone();
            let route = cfg.media.route.clone();
            let port = cfg.media.port;
            tokio::spawn(async move {
                if let Err(e) = host::serve(serve_dir, port, &route).await {
                    tracing::error!("media server exited: {e}");
                }
            });
            tokio::spawn(retention::run(hosting_dir.clone()));
            info!(
                "media hosted at {}",
                host::public_url(&cfg.media.public_base_url, &cfg.media.route, "")
            );

            let source = Arc::new(TelegramSource::new(cfg.telegram.clone()));
            let rx = source.start().await?;

            let twilio = Arc::new(TwilioClient::new(cfg.twilio.clone()));
            let dispatcher = Dispatcher::new(
                twilio,
                cfg.twilio.recipients.clone(),
                TemplateIds {
                    text: cfg
                        .twilio
                        .text_template_sid
                        .clone()
                        .filter(|sid| !sid.is_empty()),
                    media: cfg
                        .twilio
                        .media_template_sid
                        .clone()
                        .filter(|sid| !sid.is_empty()),
                },
                cfg.twilio.max_body_len,
            );

            info!(
                "relaying from {} chat(s) to {} recipient(s)",
                cfg.telegram.chat_ids.len(),
                cfg.twilio.recipients.len()
            );

            let gw = gateway::Gateway::new(
                source,
                dispatcher,
                filter::parse_senders(&cfg.telegram.allowed_senders),
                hosting_dir,
                cfg.media.public_base_url.clone(),
                cfg.media.route.clone(),
            );
            gw.run(rx).await;
        }
        Commands::Status => {
            let cfg = config::load(&cli.config)?;
            println!("courier — status check\n");
            println!("Config: {}", cli.config);
            println!(
                "  telegram: {}",
                if cfg.telegram.bot_token.is_empty() {
                    "missing bot_token"
                } else if cfg.telegram.chat_ids.is_empty() {
                    "no chats configured"
                } else {
                    "configured"
                }
            );
            println!(
                "  twilio: {}",
                if cfg.twilio.account_sid.is_empty() || cfg.twilio.auth_token.is_empty() {
                    "missing credentials"
                } else if cfg.twilio.recipients.is_empty() {
                    "no recipients configured"
                } else {
                    "configured"
                }
            );
            println!(
                "  templates: text={} media={}",
                cfg.twilio.text_template_sid.as_deref().unwrap_or("-"),
                cfg.twilio.media_template_sid.as_deref().unwrap_or("-"),
            );
            match cfg.validate() {
                Ok(()) => println!("\nConfiguration is valid."),
                Err(e) => println!("\nConfiguration problems: {e}"),
            }
        }
        Commands::Sweep => {
            let cfg = config::load(&cli.config)?;
            let dir = PathBuf::from(&cfg.media.hosting_dir);
            let deleted = retention::sweep_once(&dir, chrono::Local::now());
            println!("retention sweep deleted {deleted} file(s)");
        }
    }

    Ok(())
}

//! # Main Entry Point
//!
//! Runs the bundled sections against a console transport:
//! - Domain: configuration
//! - Infrastructure: logging, console chat, in-memory user store
//! - Application: bot, background services
//! - Interface: sections

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use sectionkit::application::bot::Bot;
use sectionkit::application::services::ServiceManager;
use sectionkit::domain::config::AppConfig;
use sectionkit::domain::types::Sender;
use sectionkit::infrastructure::console::{ConsoleChat, parse_line};
use sectionkit::infrastructure::logging;
use sectionkit::infrastructure::memory_store::InMemoryUserStore;
use sectionkit::interface::sections;

#[derive(Parser, Debug)]
#[command(name = "sectionkit", about = "Section-routed bot on a console transport")]
struct Args {
    /// Path to config.yaml. Defaults to data/config.yaml or the user config directory.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// User id the console speaks as
    #[arg(long, default_value = "1")]
    user_id: String,

    #[arg(long, default_value = "console")]
    username: String,
}

fn load_config(path: Option<PathBuf>) -> Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load(&path),
        None => {
            let path = AppConfig::default_path();
            if path.exists() {
                AppConfig::load(&path)
            } else {
                Ok(AppConfig::default())
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Configuration
    let config = load_config(args.config).context("Failed to load configuration")?;

    // 2. Logging
    let _guard = logging::init(&config.logging, config.bot.debug)?;
    tracing::info!("Starting sectionkit...");

    // 3. Bot
    let chat = Arc::new(ConsoleChat::new());
    let bot = Arc::new(
        Bot::builder(config, chat.clone(), Arc::new(InMemoryUserStore::new()))
            .sections(sections::registry())
            .build()?,
    );

    // 4. Background services
    let mut services = ServiceManager::new();
    for service in bot.background_services() {
        services.register(service);
    }
    services.start_all().await?;

    // 5. Event loop
    let sender = Sender::new(args.user_id, args.username);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("Type /start to begin, /quit to exit.");

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        if line.trim() == "/quit" {
            break;
        }

        let last = chat.last_message_id().await;
        let Some(event) = parse_line(&line, &sender, last.as_deref()) else {
            continue;
        };

        // Awaiting methods suspend until a later line arrives, so events never block the reader
        let bot = bot.clone();
        tokio::spawn(async move {
            if let Err(e) = bot.handle_event(event).await {
                tracing::error!("Event handling failed: {:#}", e);
            }
        });
    }

    tracing::info!("Shutting down...");
    services.stop_all().await;
    Ok(())
}

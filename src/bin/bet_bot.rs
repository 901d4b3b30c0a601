use clap::Parser;
use colored::*;
use log::{error, info, warn};
use owobot::{
    bet::{BetEngine, BET_SEQUENCE},
    client::{DiscordClient, DiscordWebhook, FileStatusSink, NullWebhook, StatusSink, WebhookSink},
    farm::EngineDeps,
    session::{SessionRegistry, TaskRegistry},
};
use std::path::PathBuf;
use std::sync::Arc;

/// Bet engine runner: one martingale loop per channel.
#[derive(Parser)]
#[command(name = "bet-bot")]
struct Args {
    /// Discord user token.
    #[arg(long, env = "BOT_TOKEN")]
    token: String,

    /// Channel ids to bet in, comma separated.
    #[arg(long, env = "CHANNEL_IDS", value_delimiter = ',', required = true)]
    channels: Vec<u64>,

    /// Webhook URL for ban alerts.
    #[arg(long, env = "WEBHOOK_URL")]
    webhook_url: Option<String>,

    /// Directory for status snapshots.
    #[arg(long, env = "DATA_DIR", default_value = "data")]
    data_dir: String,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();

    println!("{}", "═══════════════════════════════════════".cyan());
    println!("{}", "  owobot bet runner".cyan().bold());
    println!("{}", "═══════════════════════════════════════".cyan());
    println!("  Channels: {}", format!("{:?}", args.channels).yellow());
    println!(
        "  Ladder:   {} steps up to {}",
        BET_SEQUENCE.len(),
        BET_SEQUENCE[BET_SEQUENCE.len() - 1]
    );

    let state = Arc::new(SessionRegistry::new());
    let tasks = Arc::new(TaskRegistry::new());
    let client = Arc::new(DiscordClient::new());

    let webhook: Arc<dyn WebhookSink> = match &args.webhook_url {
        Some(url) => Arc::new(DiscordWebhook::new(url.clone())),
        None => Arc::new(NullWebhook),
    };
    let status: Arc<dyn StatusSink> = Arc::new(FileStatusSink::new(PathBuf::from(&args.data_dir)));

    let deps = EngineDeps {
        state: state.clone(),
        tasks: tasks.clone(),
        messenger: client.clone(),
        history: client,
        status,
        webhook,
        solver: None,
    };

    for channel in args.channels {
        if state.is_bet_active(channel) {
            warn!("Channel {channel} already has an active bet engine, skipping");
            continue;
        }

        let engine = Arc::new(BetEngine::new(channel, args.token.clone(), deps.clone()));
        engine.activate();

        let handle = tokio::spawn(async move { engine.run().await });
        tasks.register(channel, handle);
        info!("Spawned bet engine for channel {channel}");
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Signal handler failed: {e}");
    }
    info!("Shutting down bet runner...");
    tasks.abort_all();
}

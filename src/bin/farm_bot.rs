use clap::Parser;
use colored::*;
use log::{error, info, warn};
use owobot::{
    captcha::TemplateSolver,
    client::{
        CaptchaSolver, DiscordClient, DiscordWebhook, FileStatusSink, NullWebhook, StatusSink,
        WebhookSink,
    },
    config::FarmConfig,
    farm::{EngineDeps, FarmEngine},
    session::{SessionRegistry, TaskRegistry},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Farm engine runner: one farm loop per channel.
#[derive(Parser)]
#[command(name = "farm-bot")]
struct Args {
    /// Discord user token.
    #[arg(long, env = "BOT_TOKEN")]
    token: String,

    /// Channel ids to farm in, comma separated.
    #[arg(long, env = "CHANNEL_IDS", value_delimiter = ',', required = true)]
    channels: Vec<u64>,

    /// Webhook URL for ban alerts and schedule notifications.
    #[arg(long, env = "WEBHOOK_URL")]
    webhook_url: Option<String>,

    /// Directory for the farm-history store and status snapshots.
    #[arg(long, env = "DATA_DIR", default_value = "data")]
    data_dir: String,

    /// Directory holding the captcha letter templates.
    #[arg(long, env = "TEMPLATE_DIR", default_value = "letters")]
    template_dir: String,

    /// Autohunt stake until the bot reports its optimum.
    #[arg(long, env = "FARM_MONEY", default_value_t = 20000)]
    money: u64,

    /// Disable the huntbot sub-manager.
    #[arg(long)]
    no_huntbot: bool,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();

    println!("{}", "═══════════════════════════════════════".cyan());
    println!("{}", "  owobot farm runner".cyan().bold());
    println!("{}", "═══════════════════════════════════════".cyan());
    println!("  Channels: {}", format!("{:?}", args.channels).yellow());
    println!(
        "  HuntBot:  {}",
        if args.no_huntbot { "off".red() } else { "on".green() }
    );

    let state = Arc::new(SessionRegistry::new());
    let tasks = Arc::new(TaskRegistry::new());
    let client = Arc::new(DiscordClient::new());

    let webhook: Arc<dyn WebhookSink> = match &args.webhook_url {
        Some(url) => Arc::new(DiscordWebhook::new(url.clone())),
        None => Arc::new(NullWebhook),
    };
    let status: Arc<dyn StatusSink> = Arc::new(FileStatusSink::new(PathBuf::from(&args.data_dir)));

    // A missing template directory degrades captcha handling to a failure
    // report instead of refusing to start.
    let solver: Option<Arc<dyn CaptchaSolver>> =
        match TemplateSolver::from_dir(Path::new(&args.template_dir)) {
            Ok(solver) => Some(Arc::new(solver)),
            Err(e) => {
                warn!("Captcha solver unavailable: {e}");
                None
            }
        };

    let deps = EngineDeps {
        state: state.clone(),
        tasks: tasks.clone(),
        messenger: client.clone(),
        history: client,
        status,
        webhook,
        solver,
    };

    let config = FarmConfig {
        money: args.money,
        huntbot: !args.no_huntbot,
    };

    for channel in args.channels {
        // One farm engine per channel: the runner, not the engine, enforces it.
        if state.is_farm_active(channel) {
            warn!("Channel {channel} already has an active farm engine, skipping");
            continue;
        }

        let engine = Arc::new(FarmEngine::new(
            channel,
            args.token.clone(),
            config.clone(),
            Path::new(&args.data_dir),
            deps.clone(),
        ));
        engine.activate();

        let handle = tokio::spawn(async move { engine.run().await });
        tasks.register(channel, handle);
        info!("Spawned farm engine for channel {channel}");
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Signal handler failed: {e}");
    }
    info!("Shutting down farm runner...");
    tasks.abort_all();
}

use crate::captcha::TemplateSolver;
use crate::error::{BotError, Result};
use crate::message::Message;
use async_trait::async_trait;
use log::{debug, error, info, warn};
use serde_json::json;
use std::path::PathBuf;

const DISCORD_API: &str = "https://discord.com/api/v10";

/// Fire-and-forget chat message send. Failures are reported to the caller,
/// which logs and moves on; the engines never retry a send.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_message(&self, channel_id: u64, text: &str, token: &str) -> Result<()>;
}

/// Most-recent-first channel history read plus raw byte fetch for captcha
/// attachments.
#[async_trait]
pub trait History: Send + Sync {
    async fn fetch_messages(&self, channel_id: u64, limit: u8, token: &str) -> Result<Vec<Message>>;
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>>;
}

/// Best-effort outward notification. Returns whether the notification was
/// delivered; failure is never fatal.
#[async_trait]
pub trait WebhookSink: Send + Sync {
    async fn notify(&self, event_kind: &str, embed: serde_json::Value) -> bool;
}

/// Idempotent upsert of a per-channel metrics record, persisted externally.
pub trait StatusSink: Send + Sync {
    fn update(&self, kind: &str, channel_id: u64, active: bool, metrics: serde_json::Value);
}

/// Pluggable captcha capability. Engines hold an `Option<Arc<dyn ...>>`;
/// absence degrades the dependent action to a failure report, not a crash.
#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    /// Fetch the image and run the matcher.
    async fn solve(&self, image_url: &str) -> Result<String>;
    /// Non-suspending fallback over already-fetched bytes. Must produce the
    /// same answer as `solve` for the same image.
    fn solve_bytes(&self, bytes: &[u8]) -> Result<String>;
}

#[async_trait]
impl CaptchaSolver for TemplateSolver {
    async fn solve(&self, image_url: &str) -> Result<String> {
        self.fetch_and_solve(image_url).await
    }

    fn solve_bytes(&self, bytes: &[u8]) -> Result<String> {
        TemplateSolver::solve_bytes(self, bytes)
    }
}

/// Discord REST v10 client authenticated per call with a user token, so one
/// client instance serves every engine/account pair.
pub struct DiscordClient {
    http: reqwest::Client,
}

impl DiscordClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for DiscordClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Messenger for DiscordClient {
    async fn send_message(&self, channel_id: u64, text: &str, token: &str) -> Result<()> {
        let url = format!("{DISCORD_API}/channels/{channel_id}/messages");
        let response = self
            .http
            .post(&url)
            .header("Authorization", token)
            .json(&json!({ "content": text }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BotError::Discord(format!(
                "send to {channel_id} failed with status {}",
                response.status()
            )));
        }
        debug!("→ [{channel_id}] {text}");
        Ok(())
    }
}

#[async_trait]
impl History for DiscordClient {
    async fn fetch_messages(&self, channel_id: u64, limit: u8, token: &str) -> Result<Vec<Message>> {
        let url = format!("{DISCORD_API}/channels/{channel_id}/messages?limit={limit}");
        let response = self
            .http
            .get(&url)
            .header("Authorization", token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BotError::Discord(format!(
                "history fetch for {channel_id} failed with status {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.http.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

/// Posts structured embeds to a configured Discord webhook URL.
pub struct DiscordWebhook {
    http: reqwest::Client,
    url: String,
}

impl DiscordWebhook {
    pub fn new(url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait]
impl WebhookSink for DiscordWebhook {
    async fn notify(&self, event_kind: &str, embed: serde_json::Value) -> bool {
        let result = self
            .http
            .post(&self.url)
            .json(&json!({ "embeds": [embed] }))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!("Webhook {event_kind} delivered");
                true
            }
            Ok(response) => {
                warn!("Webhook {event_kind} rejected: {}", response.status());
                false
            }
            Err(e) => {
                error!("Webhook {event_kind} failed: {e}");
                false
            }
        }
    }
}

/// Discarding webhook sink for setups without a configured webhook URL.
pub struct NullWebhook;

#[async_trait]
impl WebhookSink for NullWebhook {
    async fn notify(&self, event_kind: &str, _embed: serde_json::Value) -> bool {
        debug!("Webhook {event_kind} skipped: no URL configured");
        false
    }
}

/// Status sink that only logs. Useful for runs without a data directory.
pub struct LogStatusSink;

impl StatusSink for LogStatusSink {
    fn update(&self, kind: &str, channel_id: u64, active: bool, metrics: serde_json::Value) {
        info!("📊 {kind}[{channel_id}] active={active} {metrics}");
    }
}

/// Status sink that upserts one JSON snapshot file per (kind, channel).
pub struct FileStatusSink {
    dir: PathBuf,
}

impl FileStatusSink {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

impl StatusSink for FileStatusSink {
    fn update(&self, kind: &str, channel_id: u64, active: bool, metrics: serde_json::Value) {
        let snapshot = json!({
            "kind": kind,
            "channel_id": channel_id.to_string(),
            "active": active,
            "metrics": metrics,
            "updated_at": chrono::Utc::now().to_rfc3339(),
        });

        let path = self.dir.join(format!("status_{kind}_{channel_id}.json"));
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(&snapshot) {
            Ok(contents) => {
                if let Err(e) = std::fs::write(&path, contents) {
                    warn!("Status write failed for {kind}[{channel_id}]: {e}");
                }
            }
            Err(e) => warn!("Status serialize failed: {e}"),
        }
    }
}

/// Builds a webhook embed in the shape the alert channel expects.
pub fn webhook_embed(
    title: &str,
    description: String,
    color: u32,
    fields: Vec<(String, String)>,
) -> serde_json::Value {
    json!({
        "title": title,
        "description": description,
        "fields": fields
            .into_iter()
            .map(|(name, value)| json!({ "name": name, "value": value, "inline": true }))
            .collect::<Vec<_>>(),
        "color": color,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "footer": { "text": "owobot" },
    })
}

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Discord user token the engines authenticate with.
    pub token: String,

    /// Channels to run engines in, one engine task per channel.
    pub channels: Vec<u64>,

    /// Webhook URL for ban alerts and schedule notifications.
    pub webhook_url: Option<String>,

    /// Directory for the farm-history store and status snapshots.
    pub data_dir: String,

    /// Directory holding the captcha letter templates.
    pub template_dir: String,

    pub farm: FarmConfig,

    pub bet: BetConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FarmConfig {
    /// Cowoncy stake for autohunt until the bot reports its optimum.
    pub money: u64,

    /// Enable the huntbot sub-manager.
    pub huntbot: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetConfig {
    /// Enable the bet engine. The stake ladder and pacing are internal
    /// constants, not configuration.
    pub enabled: bool,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            channels: Vec::new(),
            webhook_url: None,
            data_dir: "data".to_string(),
            template_dir: "letters".to_string(),
            farm: FarmConfig::default(),
            bet: BetConfig::default(),
        }
    }
}

impl Default for FarmConfig {
    fn default() -> Self {
        Self {
            money: 20000,
            huntbot: true,
        }
    }
}

impl Default for BetConfig {
    fn default() -> Self {
        Self { enabled: false }
    }
}

impl BotConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: BotConfig = serde_json::from_str(&contents)?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Load config from environment variables (for headless deployment).
    pub fn from_env() -> Self {
        let channels = std::env::var("CHANNEL_IDS")
            .map(|v| {
                v.split(',')
                    .filter_map(|s| s.trim().parse().ok())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            token: std::env::var("BOT_TOKEN").unwrap_or_default(),
            channels,
            webhook_url: std::env::var("WEBHOOK_URL").ok(),
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()),
            template_dir: std::env::var("TEMPLATE_DIR").unwrap_or_else(|_| "letters".to_string()),
            farm: FarmConfig::from_env(),
            bet: BetConfig::from_env(),
        }
    }
}

impl FarmConfig {
    pub fn from_env() -> Self {
        Self {
            money: std::env::var("FARM_MONEY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20000),
            huntbot: std::env::var("HUNTBOT_MODE")
                .map(|v| v == "true")
                .unwrap_or(true),
        }
    }
}

impl BetConfig {
    pub fn from_env() -> Self {
        Self {
            enabled: std::env::var("BET_ENABLED")
                .map(|v| v == "true")
                .unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BotConfig::default();
        assert_eq!(config.farm.money, 20000);
        assert!(config.farm.huntbot);
        assert!(!config.bet.enabled);
        assert_eq!(config.data_dir, "data");
    }

    #[test]
    fn test_json_round_trip() {
        let mut config = BotConfig::default();
        config.channels = vec![1, 2, 3];
        config.webhook_url = Some("https://discord.com/api/webhooks/x".to_string());

        let raw = serde_json::to_string(&config).unwrap();
        let parsed: BotConfig = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.channels, vec![1, 2, 3]);
        assert_eq!(parsed.webhook_url, config.webhook_url);
    }
}

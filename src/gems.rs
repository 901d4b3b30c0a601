use crate::farm::FarmEngine;
use crate::message::OWO_BOT_ID;
use log::{debug, error};
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

/// Rarity alphabet, worst to best. The per-tier selection keeps the highest
/// index found.
const RARITY_ORDER: [char; 7] = ['f', 'm', 'e', 'r', 'l', 'u', 'c'];

/// Gem tiers as they appear in the inventory emotes: gem1..gem5 plus the
/// star tier.
const TIER_COUNT: usize = 6;

fn gem_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // `051`<:fgem3:123456> or the animated <a:...> variant.
        Regex::new(r"`(\d+)`<a?:([fmerluc])(?:gem([1-5])|(star)):\d+>").unwrap()
    })
}

fn box_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"`(\d+)`<:box:427352600476647425>.*(\d{3})").unwrap())
}

fn rarity_index(rarity: char) -> Option<usize> {
    RARITY_ORDER.iter().position(|&r| r == rarity)
}

/// Parses an inventory listing into the best gem id per tier (worst-to-best
/// rarity alphabet, last occurrence wins ties) and the lootbox count.
pub fn parse_gems(inventory: &str) -> (Vec<String>, u32) {
    let mut best: [Option<(usize, String)>; TIER_COUNT] = Default::default();
    let mut box_count = 0u32;

    for line in inventory.lines() {
        for caps in gem_regex().captures_iter(line) {
            let id = caps[1].to_string();
            let rarity = caps[2].chars().next().unwrap_or('f');
            let Some(rarity_idx) = rarity_index(rarity) else {
                continue;
            };

            // Tiers 1-5 map to slots 0-4, the star tier to slot 5.
            let slot = match caps.get(3) {
                Some(tier) => tier.as_str().parse::<usize>().unwrap_or(1) - 1,
                None => TIER_COUNT - 1,
            };

            // >= so a later listing of the same rarity replaces the earlier one.
            let better = match &best[slot] {
                Some((current, _)) => rarity_idx >= *current,
                None => true,
            };
            if better {
                best[slot] = Some((rarity_idx, id));
            }
        }

        if let Some(caps) = box_regex().captures(line) {
            box_count = caps[2].parse().unwrap_or(0);
        }
    }

    let selected = best.into_iter().flatten().map(|(_, id)| id).collect();
    (selected, box_count)
}

impl FarmEngine {
    /// Sends `owo inventory`, lets the reply settle, and uses the best gem
    /// per tier. Opens lootboxes when more than 5 are held. All failures are
    /// logged and swallowed.
    pub async fn check_and_use_gems(&self) {
        if let Err(e) = self
            .messenger
            .send_message(self.channel_id, "owo inventory", &self.token)
            .await
        {
            error!("Gem check send failed: {e}");
            return;
        }
        tokio::time::sleep(Duration::from_secs(3)).await;

        let messages = match self
            .history
            .fetch_messages(self.channel_id, 2, &self.token)
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                error!("Gem check fetch failed: {e}");
                return;
            }
        };

        for message in messages {
            if message.author.id != OWO_BOT_ID
                || !message.content.to_lowercase().contains("inventory")
            {
                continue;
            }

            let (selected, box_count) = parse_gems(&message.content);

            if !selected.is_empty() {
                let use_command = format!("owo use {}", selected.join(" "));
                if self
                    .messenger
                    .send_message(self.channel_id, &use_command, &self.token)
                    .await
                    .is_ok()
                {
                    let used = selected.len() as u64;
                    self.state.with_channel(self.channel_id, |ch| ch.gems_used += used);
                    debug!("💎 Used {used} gems");
                }
            }

            if box_count > 5 {
                if let Err(e) = self
                    .messenger
                    .send_message(self.channel_id, "owolb all", &self.token)
                    .await
                {
                    error!("Lootbox open failed: {e}");
                } else {
                    debug!("📦 Opening {box_count} lootboxes");
                }
            }

            tokio::time::sleep(Duration::from_secs(3)).await;
            break;
        }
    }
}

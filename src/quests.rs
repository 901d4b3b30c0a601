use crate::farm::FarmEngine;
use crate::message::Embed;
use log::{error, info, warn};
use std::time::Duration;

/// Splits the quest-log embed description into (quest number, quest text)
/// entries. Quests are `**N.`-prefixed headings followed by continuation
/// lines.
pub fn parse_quests_from_embed(embed: &Embed) -> Vec<(u32, String)> {
    let description = embed.description.as_deref().unwrap_or("");
    let mut quests = Vec::new();
    let mut current: Option<(u32, String)> = None;

    for line in description.lines() {
        let heads_quest =
            line.starts_with("**") && line.chars().take(5).any(|c| c.is_ascii_digit());
        if heads_quest {
            if let Some(done) = current.take() {
                quests.push(done);
            }
            let number = line
                .split('.')
                .next()
                .unwrap_or("")
                .replace('*', "")
                .trim()
                .parse()
                .unwrap_or(0);
            current = Some((number, line.to_string()));
        } else if let Some((_, text)) = current.as_mut() {
            text.push('\n');
            text.push_str(line);
        }
    }
    if let Some(done) = current {
        quests.push(done);
    }

    quests
}

/// Lowest-numbered quest mentioning friends, if any. Those quests need a
/// second account, so they get rerolled. Entries with number 0 come from
/// unparsable headings and are never reroll candidates.
pub fn find_friend_quest(quests: &[(u32, String)]) -> Option<u32> {
    let mut sorted: Vec<&(u32, String)> = quests.iter().collect();
    sorted.sort_by_key(|(number, _)| *number);

    sorted
        .into_iter()
        .filter(|(number, _)| *number != 0)
        .find(|(_, text)| {
            let lower = text.to_lowercase();
            lower.contains("friend")
        })
        .map(|(number, _)| *number)
}

impl FarmEngine {
    /// Claims the daily, pulls the quest log and rerolls a friend quest when
    /// one is present. Parsing or network failures are logged and swallowed.
    pub async fn check_and_reroll_quests(&self) {
        for (command, settle) in [("owo daily", 15u64), ("owoq", 3)] {
            if let Err(e) = self
                .messenger
                .send_message(self.channel_id, command, &self.token)
                .await
            {
                error!("Quest check send failed: {e}");
                return;
            }
            tokio::time::sleep(Duration::from_secs(settle)).await;
        }

        let messages = match self
            .history
            .fetch_messages(self.channel_id, 5, &self.token)
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                error!("Quest check fetch failed: {e}");
                return;
            }
        };

        for message in messages {
            if !message.is_from_owo() {
                continue;
            }
            let Some(embed) = message.embeds.first() else {
                continue;
            };

            let quests = parse_quests_from_embed(embed);
            if quests.is_empty() {
                warn!("⚠️ No quests found in quest log reply");
                break;
            }

            if let Some(number) = find_friend_quest(&quests) {
                info!("🔄 Rerolling friend quest #{number}");
                tokio::time::sleep(Duration::from_secs(1)).await;
                let reroll = format!("owoq rr {number}");
                if let Err(e) = self
                    .messenger
                    .send_message(self.channel_id, &reroll, &self.token)
                    .await
                {
                    error!("Quest reroll send failed: {e}");
                }
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quest_embed(description: &str) -> Embed {
        Embed {
            title: Some("Quest Log".to_string()),
            description: Some(description.to_string()),
            fields: vec![],
        }
    }

    #[test]
    fn test_parses_numbered_quests() {
        let embed = quest_embed(
            "**1.** Hunt 50 animals\nProgress: 10/50\n**2.** Have a friend pray to you\nProgress: 0/1\n**3.** Win owo cf 3 times",
        );

        let quests = parse_quests_from_embed(&embed);
        assert_eq!(quests.len(), 3);
        assert_eq!(quests[0].0, 1);
        assert!(quests[1].1.contains("Progress: 0/1"));
        assert_eq!(quests[2].0, 3);
    }

    #[test]
    fn test_finds_friend_quest_by_keyword() {
        let quests = vec![
            (3, "**3.** Say owo 100 times".to_string()),
            (2, "**2.** Have a FRIEND pray to you".to_string()),
        ];
        assert_eq!(find_friend_quest(&quests), Some(2));
    }

    #[test]
    fn test_plural_friends_matches_too() {
        let quests = vec![(1, "**1.** Battle with friends 5 times".to_string())];
        assert_eq!(find_friend_quest(&quests), Some(1));
    }

    #[test]
    fn test_no_friend_quest() {
        let quests = vec![(1, "**1.** Hunt 50 animals".to_string())];
        assert_eq!(find_friend_quest(&quests), None);
    }

    #[test]
    fn test_unnumbered_heading_is_never_rerolled() {
        // A mangled heading parses to number 0; `owoq rr 0` must not go out.
        let quests = vec![
            (0, "**?** Have a friend pray to you".to_string()),
            (2, "**2.** Hunt 50 animals".to_string()),
        ];
        assert_eq!(find_friend_quest(&quests), None);
    }

    #[test]
    fn test_empty_description() {
        let embed = quest_embed("");
        assert!(parse_quests_from_embed(&embed).is_empty());
    }
}

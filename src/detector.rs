use crate::message::Message;
use crate::normalize::normalize_text;
use log::warn;

/// Challenge/ban phrases watched by the farm engine. Matching happens on
/// normalized text, so casing, hidden characters and spacing in the bot's
/// reply do not matter.
pub const FARM_BAN_PHRASES: &[&str] = &[
    "are you a real human",
    "please complete this within 10 minutes",
    "it may result in a ban",
    "please use the link below",
    "verify that you are human",
];

/// Phrases watched by the bet engine. Broader than the farm list: a pending
/// captcha DM must stop betting immediately.
pub const BET_BAN_PHRASES: &[&str] = &[
    "captcha",
    "please complete this within 10 minutes",
    "please complete your captcha",
    "are you a real human?",
    "verification",
    "please dm me",
];

/// Scans a fetched message batch for any of the given challenge phrases.
/// Only messages authored by the game bot are considered; content and embed
/// text are flattened and normalized before the substring test.
pub fn messages_contain_phrase(messages: &[Message], phrases: &[&str]) -> bool {
    for message in messages {
        if !message.is_from_owo() {
            continue;
        }

        let text = normalize_text(&message.combined_text());
        if phrases.iter().any(|phrase| text.contains(phrase)) {
            let preview: String = text.chars().take(100).collect();
            warn!("⚠️ Ban/captcha phrase detected: {preview}...");
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Attachment, Author, Embed, Message, OWO_BOT_ID};

    fn owo_message(content: &str, embed: Option<Embed>) -> Message {
        Message {
            id: "1".to_string(),
            author: Author { id: OWO_BOT_ID.to_string() },
            content: content.to_string(),
            embeds: embed.into_iter().collect(),
            attachments: Vec::<Attachment>::new(),
        }
    }

    #[test]
    fn test_detects_phrase_in_embed_description() {
        let messages = vec![owo_message(
            "",
            Some(Embed {
                title: None,
                description: Some(
                    "Please  Complete this within 10 Minutes or you may be banned".to_string(),
                ),
                fields: vec![],
            }),
        )];

        assert!(messages_contain_phrase(&messages, FARM_BAN_PHRASES));
        assert!(messages_contain_phrase(&messages, BET_BAN_PHRASES));
    }

    #[test]
    fn test_no_phrase_means_no_ban() {
        let messages = vec![
            owo_message("you won 100 cowoncy!", None),
            owo_message("🌱 you found a gem", None),
        ];

        assert!(!messages_contain_phrase(&messages, FARM_BAN_PHRASES));
        assert!(!messages_contain_phrase(&messages, BET_BAN_PHRASES));
    }

    #[test]
    fn test_ignores_other_authors() {
        let mut msg = owo_message("are you a real human", None);
        msg.author.id = "999".to_string();

        assert!(!messages_contain_phrase(&[msg], FARM_BAN_PHRASES));
    }

    #[test]
    fn test_hidden_characters_do_not_evade() {
        let messages = vec![owo_message("are\u{200b} you a real\u{00A0}human", None)];
        assert!(messages_contain_phrase(&messages, FARM_BAN_PHRASES));
    }
}

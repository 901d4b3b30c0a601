use serde::{Deserialize, Serialize};

/// User id of the external OwO game bot. Every reply the engines parse is
/// authored by this account.
pub const OWO_BOT_ID: &str = "408785106942164992";

/// One message as returned by the Discord REST v10 channel history endpoint,
/// reduced to the fields the engines consume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub author: Author,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub embeds: Vec<Embed>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Embed {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<EmbedField>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
}

impl Message {
    pub fn is_from_owo(&self) -> bool {
        self.author.id == OWO_BOT_ID
    }

    /// Flattens the message into one searchable string. Plain content for
    /// bare messages; for embedded replies the first embed's description,
    /// title and field name/value pairs are concatenated, matching the order
    /// the ban detector scans them in.
    pub fn combined_text(&self) -> String {
        match self.embeds.first() {
            Some(embed) => embed.combined_text(),
            None => self.content.clone(),
        }
    }

    pub fn first_attachment_url(&self) -> Option<&str> {
        self.attachments.first().map(|a| a.url.as_str())
    }
}

impl Embed {
    pub fn combined_text(&self) -> String {
        let mut text = String::new();
        text.push_str(self.description.as_deref().unwrap_or(""));
        text.push_str(self.title.as_deref().unwrap_or(""));
        for field in &self.fields {
            text.push_str(&field.name);
            text.push('\n');
            text.push_str(&field.value);
        }
        text
    }
}

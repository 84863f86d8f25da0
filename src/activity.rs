//! Incoming activity model (Bot Framework wire format).

use serde::{Deserialize, Serialize};

/// Activity type as far as dispatch cares: a message or anything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityType {
    Message,
    Other(String),
}

impl<'de> Deserialize<'de> for ActivityType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "message" => Self::Message,
            _ => Self::Other(raw),
        })
    }
}

impl ActivityType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Message => "message",
            Self::Other(other) => other,
        }
    }
}

/// A file reference embedded in a message.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(default)]
    pub content_url: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// A participant reference (`from` / `recipient`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelAccount {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationAccount {
    #[serde(default)]
    pub id: String,
}

/// Snapshot of one incoming activity. Never mutated while it is handled.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingMessage {
    #[serde(rename = "type")]
    pub kind: ActivityType,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Channel the message came from (`skype`, `msteams`, `webchat`, ...).
    #[serde(default, rename = "channelId")]
    pub source_channel: String,
    #[serde(default)]
    pub service_url: String,
    #[serde(default)]
    pub conversation: ConversationAccount,
    #[serde(default)]
    pub from: ChannelAccount,
    #[serde(default)]
    pub recipient: ChannelAccount,
}

impl IncomingMessage {
    pub fn is_message(&self) -> bool {
        self.kind == ActivityType::Message
    }

    pub fn first_attachment(&self) -> Option<&Attachment> {
        self.attachments.first()
    }
}

#[cfg(test)]
impl IncomingMessage {
    /// Minimal message for a channel.
    pub fn text_message(channel: &str, text: &str) -> Self {
        Self {
            kind: ActivityType::Message,
            id: String::new(),
            text: text.to_string(),
            attachments: Vec::new(),
            source_channel: channel.to_string(),
            service_url: String::new(),
            conversation: ConversationAccount::default(),
            from: ChannelAccount::default(),
            recipient: ChannelAccount::default(),
        }
    }

    pub fn with_attachment(mut self, content_url: &str, content_type: &str) -> Self {
        self.attachments.push(Attachment {
            content_url: content_url.to_string(),
            content_type: content_type.to_string(),
            name: None,
        });
        self
    }
}

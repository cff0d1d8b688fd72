use std::fmt;

use serde::{Deserialize, Deserializer};

/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a sent message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Identifier of a configured bot. Also the top-level prefix of its objects.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct BotId(pub String);

impl fmt::Display for BotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Channel whose membership gates delivery: numeric id (`-100...`) or `@username`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelRef {
    Id(i64),
    Username(String),
}

impl ChannelRef {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(id) = raw.parse::<i64>() {
            return Some(ChannelRef::Id(id));
        }
        let name = raw.strip_prefix('@').unwrap_or(raw);
        if name.is_empty() {
            return None;
        }
        Some(ChannelRef::Username(format!("@{name}")))
    }
}

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelRef::Id(id) => write!(f, "{id}"),
            ChannelRef::Username(name) => f.write_str(name),
        }
    }
}

impl<'de> Deserialize<'de> for ChannelRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Num(i64),
            Str(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Num(id) => Ok(ChannelRef::Id(id)),
            Raw::Str(s) => ChannelRef::parse(&s)
                .ok_or_else(|| serde::de::Error::custom("channel_id must not be empty")),
        }
    }
}

/// Immutable per-bot configuration snapshot.
///
/// Field names follow the `bots.json` file written by the admin panel.
#[derive(Clone, Deserialize)]
pub struct BotIdentity {
    pub id: BotId,
    #[serde(default)]
    pub name: Option<String>,
    pub token: String,
    #[serde(rename = "channel_id")]
    pub channel: ChannelRef,
    #[serde(rename = "button_text")]
    pub button_label: String,
    #[serde(rename = "welcome_msg", default)]
    pub welcome_text: String,
    #[serde(rename = "welcome_img_key", default)]
    pub welcome_image: Option<String>,
    #[serde(rename = "not_sub_msg", default)]
    pub not_subscribed_text: String,
    #[serde(rename = "success_msg", default)]
    pub success_text: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl BotIdentity {
    /// Object-store prefix holding the files delivered to subscribers.
    pub fn docs_prefix(&self) -> String {
        format!("{}/docs/", self.id.0)
    }

    /// Configured welcome image key, if any (blank keys count as unset).
    pub fn welcome_image_key(&self) -> Option<&str> {
        self.welcome_image
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    /// Token safe for logs.
    pub fn token_masked(&self) -> String {
        mask_token(&self.token)
    }
}

impl fmt::Debug for BotIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotIdentity")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("token", &self.token_masked())
            .field("channel", &self.channel)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

pub fn mask_token(token: &str) -> String {
    if token.len() > 8 && token.is_char_boundary(4) && token.is_char_boundary(token.len() - 4) {
        format!("{}...{}", &token[..4], &token[token.len() - 4..])
    } else {
        "****".to_string()
    }
}

/// Result of a channel membership query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MembershipStatus {
    Member,
    Left,
    Kicked,
    Unknown,
}

impl MembershipStatus {
    /// Only an explicit "left" or "kicked" blocks delivery.
    pub fn is_absent(self) -> bool {
        matches!(self, MembershipStatus::Left | MembershipStatus::Kicked)
    }
}

/// One stored file under a bot's document prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetRef {
    pub key: String,
    pub size: u64,
}

impl AssetRef {
    /// Last path segment of the key, used as the attachment file name.
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

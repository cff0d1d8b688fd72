use std::fmt;

use crate::{
    domain::{ChatId, UserId},
    storage::ObjectBody,
};

/// Callback payload carried by the subscribe button.
pub const CHECK_SUBSCRIPTION: &str = "check_subscription";

/// Alternate spelling of [`CHECK_SUBSCRIPTION`] that is accepted on input.
pub const CHECK_SUBSCRIPTION_ALT: &str = "check-subscription";

/// Platform-neutral inbound event, consumed once by the worker that received it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundEvent {
    Command(Command),
    Callback(CallbackQuery),
}

impl InboundEvent {
    /// True when the event originates from a group, supergroup or channel.
    pub fn is_group(&self) -> bool {
        match self {
            InboundEvent::Command(c) => c.is_group,
            InboundEvent::Callback(q) => q.is_group,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    /// Command name without the leading `/` or `@botname` suffix.
    pub name: String,
    pub chat_id: ChatId,
    pub is_group: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallbackQuery {
    pub callback_id: String,
    pub data: String,
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub is_group: bool,
}

impl CallbackQuery {
    pub fn is_subscription_check(&self) -> bool {
        self.data == CHECK_SUBSCRIPTION || self.data == CHECK_SUBSCRIPTION_ALT
    }
}

/// Whether outbound text is rendered as MarkdownV2 or sent verbatim.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextFormat {
    Markup,
    Plain,
}

/// Inline keyboard (buttons) attached to a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub buttons: Vec<InlineButton>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineKeyboard {
    pub fn new(buttons: Vec<InlineButton>) -> Self {
        Self { buttons }
    }

    /// Single "check my subscription" button.
    pub fn subscribe_check(label: &str) -> Self {
        Self::new(vec![InlineButton {
            label: label.to_string(),
            callback_data: CHECK_SUBSCRIPTION.to_string(),
        }])
    }
}

/// A file streamed to the platform as a multipart upload.
///
/// The body is a one-shot reader; it is released when the upload is dropped.
pub struct Upload {
    pub file_name: String,
    pub body: ObjectBody,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, body: ObjectBody) -> Self {
        Self {
            file_name: file_name.into(),
            body,
        }
    }
}

impl fmt::Debug for Upload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upload")
            .field("file_name", &self.file_name)
            .field("size", &self.body.size)
            .finish()
    }
}

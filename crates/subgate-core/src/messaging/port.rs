use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    domain::{ChannelRef, ChatId, MembershipStatus, MessageRef, UserId},
    messaging::types::{InboundEvent, InlineKeyboard, TextFormat, Upload},
    Result,
};

/// Outbound side of one authenticated bot session.
///
/// Sends that fail because the platform could not parse MarkdownV2 must
/// return [`crate::Error::FormatRejected`]; every other failure may use any
/// other variant.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        format: TextFormat,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<MessageRef>;

    async fn send_photo(
        &self,
        chat_id: ChatId,
        photo: Upload,
        caption: &str,
        format: TextFormat,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<MessageRef>;

    async fn send_document(&self, chat_id: ChatId, document: Upload) -> Result<MessageRef>;

    async fn answer_callback_query(&self, callback_id: &str) -> Result<()>;

    async fn membership(&self, channel: &ChannelRef, user_id: UserId)
        -> Result<MembershipStatus>;
}

/// Inbound side of one authenticated bot session.
#[async_trait]
pub trait EventSource: Send {
    /// Wait for the next event. `None` means the stream is closed for good.
    ///
    /// Must be cancel-safe: the worker drops this future when it is told to stop.
    async fn next_event(&mut self) -> Option<InboundEvent>;
}

/// An authenticated bot: its outbound port plus its event stream.
pub struct PlatformSession {
    pub username: String,
    pub messenger: Arc<dyn MessagingPort>,
    pub events: Box<dyn EventSource>,
}

/// Creates sessions from bot tokens. Shared by every worker.
#[async_trait]
pub trait PlatformConnector: Send + Sync {
    /// Fails with [`crate::Error::Auth`] when the token is rejected.
    async fn connect(&self, token: &str) -> Result<PlatformSession>;
}

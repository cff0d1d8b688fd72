//! Long-polling event source.

use std::{collections::VecDeque, time::Duration};

use async_trait::async_trait;
use teloxide::{
    prelude::*,
    types::{AllowedUpdate, Update, UpdateKind},
    ApiError, RequestError,
};

use subgate_core::{
    domain::{ChatId, UserId},
    messaging::{
        port::EventSource,
        types::{CallbackQuery, Command, InboundEvent},
    },
};

const RETRY_MIN: Duration = Duration::from_secs(1);
const RETRY_MAX: Duration = Duration::from_secs(30);

/// Pulls updates with `getUpdates` and yields them one at a time.
///
/// The offset only advances once a batch has been buffered, so dropping a
/// pending `next_event` call loses nothing.
pub struct TelegramEventSource {
    bot: Bot,
    poll_timeout_secs: u32,
    offset: i32,
    buffer: VecDeque<InboundEvent>,
    backoff: Duration,
}

impl TelegramEventSource {
    pub fn new(bot: Bot, poll_timeout_secs: u32) -> Self {
        Self {
            bot,
            poll_timeout_secs,
            offset: 0,
            buffer: VecDeque::new(),
            backoff: RETRY_MIN,
        }
    }

    /// Fetch the next batch. `false` means the stream can't continue.
    async fn poll_once(&mut self) -> bool {
        let res = self
            .bot
            .get_updates()
            .offset(self.offset)
            .timeout(self.poll_timeout_secs)
            .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::CallbackQuery])
            .await;

        match res {
            Ok(updates) => {
                self.backoff = RETRY_MIN;
                for update in updates {
                    self.offset = self.offset.max(update.id + 1);
                    if let Some(ev) = to_inbound(update) {
                        self.buffer.push_back(ev);
                    }
                }
                true
            }
            Err(RequestError::Api(ApiError::NotFound)) => {
                tracing::error!("bot token revoked; closing event stream");
                false
            }
            Err(RequestError::Api(ApiError::TerminatedByOtherGetUpdates)) => {
                tracing::error!("another process is polling this bot; closing event stream");
                false
            }
            Err(RequestError::RetryAfter(wait)) => {
                tracing::warn!("getUpdates rate limited; waiting {wait:?}");
                tokio::time::sleep(wait).await;
                true
            }
            Err(e) => {
                tracing::warn!("getUpdates failed: {e}; retrying in {:?}", self.backoff);
                tokio::time::sleep(self.backoff).await;
                self.backoff = (self.backoff * 2).min(RETRY_MAX);
                true
            }
        }
    }
}

#[async_trait]
impl EventSource for TelegramEventSource {
    async fn next_event(&mut self) -> Option<InboundEvent> {
        loop {
            if let Some(ev) = self.buffer.pop_front() {
                return Some(ev);
            }
            if !self.poll_once().await {
                return None;
            }
        }
    }
}

/// `/start@my_bot payload` → `start`. `None` for anything but a command.
pub fn parse_command(text: &str) -> Option<String> {
    let first = text.trim_start().split_whitespace().next()?;
    let name = first.strip_prefix('/')?;
    let name = name.split('@').next().unwrap_or_default();
    if name.is_empty() {
        return None;
    }
    Some(name.to_string())
}

/// Translate one Telegram update into a core event. Updates the bots don't
/// react to (plain text, edits, media) yield `None`.
pub fn to_inbound(update: Update) -> Option<InboundEvent> {
    match update.kind {
        UpdateKind::Message(msg) => {
            let name = parse_command(msg.text()?)?;
            Some(InboundEvent::Command(Command {
                name,
                chat_id: ChatId(msg.chat.id.0),
                is_group: !msg.chat.is_private(),
            }))
        }
        UpdateKind::CallbackQuery(q) => {
            let user_id = UserId(q.from.id.0 as i64);
            let (chat_id, is_group) = match &q.message {
                Some(m) => (ChatId(m.chat.id.0), !m.chat.is_private()),
                None => (ChatId(user_id.0), false),
            };
            Some(InboundEvent::Callback(CallbackQuery {
                callback_id: q.id,
                data: q.data.unwrap_or_default(),
                chat_id,
                user_id,
                is_group,
            }))
        }
        _ => None,
    }
}

//! Telegram adapter (teloxide).
//!
//! Implements the `subgate-core` ports over the Telegram Bot API: the
//! messenger, the long-polling event source and the connector that
//! authenticates a token and wires both together.

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{
        ChatMemberKind, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, ParseMode,
        Recipient,
    },
    ApiError, RequestError,
};

pub mod connector;
pub mod updates;

pub use connector::TelegramConnector;
pub use updates::TelegramEventSource;

use subgate_core::{
    domain::{ChannelRef, ChatId, MembershipStatus, MessageId, MessageRef, UserId},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{InlineKeyboard, TextFormat, Upload},
    },
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_recipient(channel: &ChannelRef) -> Recipient {
        match channel {
            ChannelRef::Id(id) => Recipient::Id(teloxide::types::ChatId(*id)),
            ChannelRef::Username(name) => Recipient::ChannelUsername(name.clone()),
        }
    }

    fn tg_markup(keyboard: &InlineKeyboard) -> InlineKeyboardMarkup {
        let rows: Vec<Vec<InlineKeyboardButton>> = keyboard
            .buttons
            .iter()
            .map(|b| {
                vec![InlineKeyboardButton::callback(
                    b.label.clone(),
                    b.callback_data.clone(),
                )]
            })
            .collect();
        InlineKeyboardMarkup::new(rows)
    }

    fn tg_upload(upload: Upload) -> InputFile {
        InputFile::read(upload.body.reader).file_name(upload.file_name)
    }

    fn message_ref(chat_id: ChatId, msg: &Message) -> MessageRef {
        MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        }
    }
}

/// Map a request error onto the core error type.
///
/// Markup the server could not parse becomes [`Error::FormatRejected`] so the
/// caller can fall back to plain text.
///
/// teloxide only recognises the bare description; the Bot API appends the
/// offending character and offset, which arrives as `ApiError::Unknown`.
pub(crate) fn map_err(e: RequestError) -> Error {
    match e {
        RequestError::Api(ApiError::CantParseEntities) => {
            Error::FormatRejected(CANT_PARSE_ENTITIES.to_string())
        }
        RequestError::Api(ApiError::Unknown(desc)) if desc.starts_with(CANT_PARSE_ENTITIES) => {
            Error::FormatRejected(desc)
        }
        RequestError::Api(ApiError::NotFound) => {
            Error::Auth("telegram rejected the bot token".to_string())
        }
        other => Error::External(format!("telegram error: {other}")),
    }
}

const CANT_PARSE_ENTITIES: &str = "Bad Request: can't parse entities";

pub(crate) fn membership_of(kind: &ChatMemberKind) -> MembershipStatus {
    match kind {
        ChatMemberKind::Left => MembershipStatus::Left,
        ChatMemberKind::Banned(_) => MembershipStatus::Kicked,
        ChatMemberKind::Owner(_)
        | ChatMemberKind::Administrator(_)
        | ChatMemberKind::Member
        | ChatMemberKind::Restricted(_) => MembershipStatus::Member,
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        format: TextFormat,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<MessageRef> {
        let mut req = self.bot.send_message(Self::tg_chat(chat_id), text.to_string());
        if format == TextFormat::Markup {
            req = req.parse_mode(ParseMode::MarkdownV2);
        }
        if let Some(kb) = keyboard {
            req = req.reply_markup(Self::tg_markup(kb));
        }

        let msg = req.await.map_err(map_err)?;
        Ok(Self::message_ref(chat_id, &msg))
    }

    async fn send_photo(
        &self,
        chat_id: ChatId,
        photo: Upload,
        caption: &str,
        format: TextFormat,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<MessageRef> {
        let mut req = self
            .bot
            .send_photo(Self::tg_chat(chat_id), Self::tg_upload(photo))
            .caption(caption.to_string());
        if format == TextFormat::Markup {
            req = req.parse_mode(ParseMode::MarkdownV2);
        }
        if let Some(kb) = keyboard {
            req = req.reply_markup(Self::tg_markup(kb));
        }

        let msg = req.await.map_err(map_err)?;
        Ok(Self::message_ref(chat_id, &msg))
    }

    async fn send_document(&self, chat_id: ChatId, document: Upload) -> Result<MessageRef> {
        let msg = self
            .bot
            .send_document(Self::tg_chat(chat_id), Self::tg_upload(document))
            .await
            .map_err(map_err)?;
        Ok(Self::message_ref(chat_id, &msg))
    }

    async fn answer_callback_query(&self, callback_id: &str) -> Result<()> {
        self.bot
            .answer_callback_query(callback_id.to_string())
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn membership(&self, channel: &ChannelRef, user_id: UserId) -> Result<MembershipStatus> {
        let member = self
            .bot
            .get_chat_member(
                Self::tg_recipient(channel),
                teloxide::types::UserId(user_id.0 as u64),
            )
            .await
            .map_err(map_err)?;
        Ok(membership_of(&member.kind))
    }
}

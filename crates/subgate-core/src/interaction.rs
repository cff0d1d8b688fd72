//! Per-event subscription-gate flow for one bot.
//!
//! `/start` → welcome (photo or text) with the subscribe button; button press →
//! membership check → either the "not subscribed" prompt (same button) or the
//! content delivery. Nothing is remembered between events.

use std::sync::Arc;

use crate::{
    delivery::{Delivery, ImageOutcome},
    domain::{BotIdentity, ChatId},
    messaging::{
        port::MessagingPort,
        types::{CallbackQuery, InboundEvent, InlineKeyboard},
    },
    storage::ObjectStore,
};

const START_COMMAND: &str = "start";

/// What handling one event did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Group chat, unknown command or unknown callback payload.
    Ignored,
    WelcomeSent,
    NotSubscribed,
    ContentDelivered,
    /// The membership query failed; the user gets no reply.
    CheckFailed,
}

pub struct Interaction {
    identity: Arc<BotIdentity>,
    messenger: Arc<dyn MessagingPort>,
    delivery: Delivery,
    keyboard: InlineKeyboard,
}

impl Interaction {
    pub fn new(
        identity: Arc<BotIdentity>,
        messenger: Arc<dyn MessagingPort>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        let keyboard = InlineKeyboard::subscribe_check(&identity.button_label);
        Self {
            delivery: Delivery::new(messenger.clone(), store),
            identity,
            messenger,
            keyboard,
        }
    }

    pub async fn handle(&self, event: InboundEvent) -> Transition {
        if event.is_group() {
            tracing::trace!("ignoring group chat event");
            return Transition::Ignored;
        }

        match event {
            InboundEvent::Command(cmd) if cmd.name == START_COMMAND => {
                self.send_welcome(cmd.chat_id).await;
                Transition::WelcomeSent
            }
            InboundEvent::Command(cmd) => {
                tracing::debug!(command = %cmd.name, "ignoring unknown command");
                Transition::Ignored
            }
            InboundEvent::Callback(q) if q.is_subscription_check() => {
                self.check_subscription(&q).await
            }
            InboundEvent::Callback(q) => {
                tracing::debug!(data = %q.data, "ignoring unknown callback");
                self.acknowledge(&q).await;
                Transition::Ignored
            }
        }
    }

    async fn send_welcome(&self, chat_id: ChatId) {
        let text = &self.identity.welcome_text;

        if let Some(key) = self.identity.welcome_image_key() {
            match self
                .delivery
                .send_welcome_image(chat_id, key, text, &self.keyboard)
                .await
            {
                ImageOutcome::Sent | ImageOutcome::Abandoned => return,
                ImageOutcome::NeedsTextFallback => {}
            }
        }

        self.delivery
            .send_formatted(chat_id, text, Some(&self.keyboard))
            .await;
    }

    async fn check_subscription(&self, q: &CallbackQuery) -> Transition {
        self.acknowledge(q).await;

        let status = match self
            .messenger
            .membership(&self.identity.channel, q.user_id)
            .await
        {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(
                    user_id = q.user_id.0,
                    channel = %self.identity.channel,
                    "membership query failed: {e}"
                );
                return Transition::CheckFailed;
            }
        };

        if status.is_absent() {
            tracing::info!(user_id = q.user_id.0, ?status, "user is not subscribed");
            self.delivery
                .send_formatted(
                    q.chat_id,
                    &self.identity.not_subscribed_text,
                    Some(&self.keyboard),
                )
                .await;
            return Transition::NotSubscribed;
        }

        tracing::info!(user_id = q.user_id.0, ?status, "subscription confirmed");
        self.delivery.deliver_content(q.chat_id, &self.identity).await;
        Transition::ContentDelivered
    }

    async fn acknowledge(&self, q: &CallbackQuery) {
        if let Err(e) = self.messenger.answer_callback_query(&q.callback_id).await {
            tracing::warn!(callback_id = %q.callback_id, "answer callback failed: {e}");
        }
    }
}

//! Outbound delivery: formatted text with plain-text fallback, the welcome
//! photo, and the post-subscription file batch.

use std::sync::Arc;

use crate::{
    domain::{BotIdentity, ChatId},
    formatting::{normalize_newlines, to_markdown_v2},
    messaging::{
        port::MessagingPort,
        types::{InlineKeyboard, TextFormat, Upload},
    },
    storage::ObjectStore,
};

/// How the welcome photo attempt ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageOutcome {
    Sent,
    /// The photo could not be fetched or its first send failed; send text instead.
    NeedsTextFallback,
    /// The plain-caption retry failed after a fresh stream was obtained. Nothing more is sent.
    Abandoned,
}

/// Counters for one content delivery (used for logs and tests).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub text_sent: bool,
    pub files_sent: usize,
    pub files_failed: usize,
}

#[derive(Clone)]
pub struct Delivery {
    messenger: Arc<dyn MessagingPort>,
    store: Arc<dyn ObjectStore>,
}

impl Delivery {
    pub fn new(messenger: Arc<dyn MessagingPort>, store: Arc<dyn ObjectStore>) -> Self {
        Self { messenger, store }
    }

    /// Send `text` as MarkdownV2; if the platform cannot parse it, resend the
    /// unconverted (newline-normalized) text once without formatting.
    ///
    /// Returns whether a message was delivered. Failures are logged only.
    pub async fn send_formatted(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> bool {
        let markup = to_markdown_v2(text);
        let err = match self
            .messenger
            .send_text(chat_id, &markup, TextFormat::Markup, keyboard)
            .await
        {
            Ok(_) => return true,
            Err(e) => e,
        };

        if !err.is_format_rejection() {
            tracing::warn!(chat_id = chat_id.0, "send message failed: {err}");
            return false;
        }

        tracing::warn!(chat_id = chat_id.0, "markdown rejected, resending as plain text: {err}");
        let plain = normalize_newlines(text);
        match self
            .messenger
            .send_text(chat_id, &plain, TextFormat::Plain, keyboard)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(chat_id = chat_id.0, "send plain message failed: {e}");
                false
            }
        }
    }

    /// Send the welcome photo from the object store with `caption`.
    ///
    /// A format rejection re-fetches the image (the first stream is consumed)
    /// and resends it with the plain caption.
    pub async fn send_welcome_image(
        &self,
        chat_id: ChatId,
        image_key: &str,
        caption: &str,
        keyboard: &InlineKeyboard,
    ) -> ImageOutcome {
        let file_name = image_key.rsplit('/').next().unwrap_or(image_key);

        let body = match self.store.get(image_key).await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(key = image_key, "welcome image unavailable, sending text: {e}");
                return ImageOutcome::NeedsTextFallback;
            }
        };

        let markup = to_markdown_v2(caption);
        let err = match self
            .messenger
            .send_photo(
                chat_id,
                Upload::new(file_name, body),
                &markup,
                TextFormat::Markup,
                Some(keyboard),
            )
            .await
        {
            Ok(_) => return ImageOutcome::Sent,
            Err(e) => e,
        };

        if !err.is_format_rejection() {
            tracing::warn!(chat_id = chat_id.0, "send photo failed, sending text: {err}");
            return ImageOutcome::NeedsTextFallback;
        }

        tracing::warn!(chat_id = chat_id.0, "caption markdown rejected, resending photo as plain: {err}");
        let body = match self.store.get(image_key).await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(key = image_key, "welcome image re-fetch failed, sending text: {e}");
                return ImageOutcome::NeedsTextFallback;
            }
        };

        let plain = normalize_newlines(caption);
        match self
            .messenger
            .send_photo(
                chat_id,
                Upload::new(file_name, body),
                &plain,
                TextFormat::Plain,
                Some(keyboard),
            )
            .await
        {
            Ok(_) => ImageOutcome::Sent,
            Err(e) => {
                tracing::error!(chat_id = chat_id.0, "send plain photo failed: {e}");
                ImageOutcome::Abandoned
            }
        }
    }

    /// Deliver the post-subscription content of `identity` to `chat_id`.
    ///
    /// Sends the success text (unless empty), then every stored document in listing
    /// order. A failed file is logged and skipped. A failed listing is treated
    /// like an empty one.
    pub async fn deliver_content(&self, chat_id: ChatId, identity: &BotIdentity) -> DeliveryReport {
        let prefix = identity.docs_prefix();
        let assets = match self.store.list(&prefix).await {
            Ok(a) => a,
            Err(e) => {
                tracing::warn!(prefix = %prefix, "list documents failed, treating as none: {e}");
                Vec::new()
            }
        };

        let mut report = DeliveryReport::default();
        if !identity.success_text.is_empty() {
            report.text_sent = self
                .send_formatted(chat_id, &identity.success_text, None)
                .await;
        }

        if assets.is_empty() {
            tracing::debug!(prefix = %prefix, "no documents to deliver");
            return report;
        }

        for asset in &assets {
            let body = match self.store.get(&asset.key).await {
                Ok(b) => b,
                Err(e) => {
                    tracing::warn!(key = %asset.key, "get document failed: {e}");
                    report.files_failed += 1;
                    continue;
                }
            };

            let upload = Upload::new(asset.file_name(), body);
            match self.messenger.send_document(chat_id, upload).await {
                Ok(_) => report.files_sent += 1,
                Err(e) => {
                    tracing::warn!(key = %asset.key, "send document failed: {e}");
                    report.files_failed += 1;
                }
            }
        }

        tracing::info!(
            chat_id = chat_id.0,
            sent = report.files_sent,
            failed = report.files_failed,
            "documents delivered"
        );
        report
    }
}

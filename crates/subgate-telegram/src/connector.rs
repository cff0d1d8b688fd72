use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use teloxide::prelude::*;

use subgate_core::{
    errors::Error,
    messaging::port::{PlatformConnector, PlatformSession},
    Result,
};

use crate::{map_err, updates::TelegramEventSource, TelegramMessenger};

/// Authenticates bot tokens against the Bot API.
///
/// All bots share one HTTP client (and its connection pool).
#[derive(Clone)]
pub struct TelegramConnector {
    client: reqwest::Client,
    poll_timeout_secs: u32,
}

impl TelegramConnector {
    pub fn new(poll_timeout_secs: u32) -> Result<Self> {
        // The request timeout has to outlive the long poll.
        let client = teloxide::net::default_reqwest_settings()
            .timeout(Duration::from_secs(u64::from(poll_timeout_secs) + 10))
            .build()
            .map_err(|e| Error::Config(format!("cannot build http client: {e}")))?;
        Ok(Self {
            client,
            poll_timeout_secs,
        })
    }
}

#[async_trait]
impl PlatformConnector for TelegramConnector {
    async fn connect(&self, token: &str) -> Result<PlatformSession> {
        let bot = Bot::with_client(token, self.client.clone());

        let me = bot.get_me().await.map_err(|e| match map_err(e) {
            Error::External(msg) => Error::Auth(msg),
            other => other,
        })?;

        Ok(PlatformSession {
            username: me.username().to_string(),
            messenger: Arc::new(TelegramMessenger::new(bot.clone())),
            events: Box::new(TelegramEventSource::new(bot, self.poll_timeout_secs)),
        })
    }
}

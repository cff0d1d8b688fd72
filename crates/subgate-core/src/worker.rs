//! One bot's runtime: authenticate, then feed events to the interaction flow
//! one at a time until cancelled or the event stream ends.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::{
    domain::{BotId, BotIdentity},
    errors::Error,
    interaction::Interaction,
    messaging::port::PlatformConnector,
    storage::ObjectStore,
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkerState {
    Starting,
    Running { username: String },
    Stopped,
    Failed { reason: String },
}

#[derive(Clone, Debug)]
pub struct WorkerStatus {
    pub state: WorkerState,
    pub since: DateTime<Utc>,
}

/// Last reported state of every supervised bot.
#[derive(Clone, Default)]
pub struct StatusBoard {
    inner: Arc<Mutex<HashMap<BotId, WorkerStatus>>>,
}

impl StatusBoard {
    pub fn set(&self, id: &BotId, state: WorkerState) {
        let status = WorkerStatus {
            state,
            since: Utc::now(),
        };
        if let Ok(mut map) = self.inner.lock() {
            map.insert(id.clone(), status);
        }
    }

    pub fn get(&self, id: &BotId) -> Option<WorkerStatus> {
        self.inner.lock().ok()?.get(id).cloned()
    }

    /// Snapshot ordered by bot id.
    pub fn snapshot(&self) -> Vec<(BotId, WorkerStatus)> {
        let Ok(map) = self.inner.lock() else {
            return Vec::new();
        };
        let mut out: Vec<_> = map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

pub struct BotWorker {
    identity: Arc<BotIdentity>,
    connector: Arc<dyn PlatformConnector>,
    store: Arc<dyn ObjectStore>,
    status: StatusBoard,
}

impl BotWorker {
    pub fn new(
        identity: Arc<BotIdentity>,
        connector: Arc<dyn PlatformConnector>,
        store: Arc<dyn ObjectStore>,
        status: StatusBoard,
    ) -> Self {
        Self {
            identity,
            connector,
            store,
            status,
        }
    }

    /// Run until `cancel` fires (Ok) or the worker fails (auth, closed stream).
    ///
    /// Cancellation is only observed while waiting for the next event; an event
    /// already being handled runs to completion.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let id = self.identity.id.clone();
        self.status.set(&id, WorkerState::Starting);

        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.status.set(&id, WorkerState::Stopped);
                return Ok(());
            }
            res = self.connector.connect(&self.identity.token) => res,
        };

        let session = match connected {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(token = %self.identity.token_masked(), "bot failed to start: {e}");
                self.status.set(
                    &id,
                    WorkerState::Failed {
                        reason: e.to_string(),
                    },
                );
                return Err(e);
            }
        };

        tracing::info!(username = %session.username, "authorized");
        self.status.set(
            &id,
            WorkerState::Running {
                username: session.username.clone(),
            },
        );

        let interaction = Interaction::new(
            self.identity.clone(),
            session.messenger.clone(),
            self.store.clone(),
        );
        let mut events = session.events;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                ev = events.next_event() => ev,
            };

            let Some(event) = next else {
                tracing::error!("event stream closed");
                self.status.set(
                    &id,
                    WorkerState::Failed {
                        reason: Error::StreamClosed.to_string(),
                    },
                );
                return Err(Error::StreamClosed);
            };

            let transition = interaction.handle(event).await;
            tracing::debug!(?transition, "event handled");
        }

        tracing::info!("bot stopped");
        self.status.set(&id, WorkerState::Stopped);
        Ok(())
    }
}

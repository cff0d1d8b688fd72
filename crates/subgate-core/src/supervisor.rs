//! Owns one [`BotWorker`] per configured bot.

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::{sync::Mutex, task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::{
    domain::{BotId, BotIdentity},
    messaging::port::PlatformConnector,
    storage::ObjectStore,
    worker::{BotWorker, StatusBoard, WorkerState, WorkerStatus},
    Result,
};

struct WorkerHandle {
    cancel: CancellationToken,
    join: JoinHandle<Result<()>>,
}

/// Outcome of a bounded shutdown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StopReport {
    pub stopped: usize,
    pub abandoned: usize,
}

pub struct WorkerSupervisor {
    connector: Arc<dyn PlatformConnector>,
    store: Arc<dyn ObjectStore>,
    status: StatusBoard,
    workers: Mutex<HashMap<BotId, WorkerHandle>>,
}

impl WorkerSupervisor {
    pub fn new(connector: Arc<dyn PlatformConnector>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            connector,
            store,
            status: StatusBoard::default(),
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Spawn a worker for every enabled identity and return without waiting
    /// for them to authenticate. Returns the number of workers spawned.
    pub async fn start_all(&self, parent: &CancellationToken, bots: Vec<BotIdentity>) -> usize {
        let mut started = 0usize;
        for bot in bots {
            if !bot.enabled {
                tracing::info!(bot = %bot.id, "skipping disabled bot");
                continue;
            }
            if self.start(parent, bot).await {
                started += 1;
            }
        }
        tracing::info!(started, "bots started");
        started
    }

    /// Spawn a worker for `identity` unless one is already live for its id.
    pub async fn start(&self, parent: &CancellationToken, identity: BotIdentity) -> bool {
        let mut workers = self.workers.lock().await;
        if let Some(existing) = workers.get(&identity.id) {
            if !existing.join.is_finished() {
                tracing::warn!(bot = %identity.id, "bot already running; not starting twice");
                return false;
            }
        }

        let id = identity.id.clone();
        let cancel = parent.child_token();
        let worker = BotWorker::new(
            Arc::new(identity),
            self.connector.clone(),
            self.store.clone(),
            self.status.clone(),
        );
        let span = tracing::info_span!("bot", id = %id);
        let join = tokio::spawn(worker.run(cancel.clone()).instrument(span));

        workers.insert(id, WorkerHandle { cancel, join });
        true
    }

    /// Stop one worker, waiting at most `timeout`. Returns false if the id is unknown.
    pub async fn stop(&self, id: &BotId, timeout: Duration) -> bool {
        let Some(handle) = self.workers.lock().await.remove(id) else {
            return false;
        };
        handle.cancel.cancel();
        self.await_workers(vec![(id.clone(), handle)], Instant::now() + timeout)
            .await;
        true
    }

    /// Stop then start `identity` again.
    pub async fn restart(
        &self,
        parent: &CancellationToken,
        identity: BotIdentity,
        timeout: Duration,
    ) -> bool {
        self.stop(&identity.id, timeout).await;
        self.start(parent, identity).await
    }

    /// Cancel every worker and wait for all of them under one deadline.
    ///
    /// Workers still running when the deadline passes are abandoned.
    pub async fn stop_all(&self, timeout: Duration) -> StopReport {
        let handles: Vec<(BotId, WorkerHandle)> = self.workers.lock().await.drain().collect();
        for (_, h) in &handles {
            h.cancel.cancel();
        }

        let report = self.await_workers(handles, Instant::now() + timeout).await;
        tracing::info!(
            stopped = report.stopped,
            abandoned = report.abandoned,
            "all bots stopped"
        );
        report
    }

    async fn await_workers(
        &self,
        handles: Vec<(BotId, WorkerHandle)>,
        deadline: Instant,
    ) -> StopReport {
        let mut report = StopReport::default();
        for (id, mut handle) in handles {
            match tokio::time::timeout_at(deadline, &mut handle.join).await {
                Ok(Ok(_)) => report.stopped += 1,
                Ok(Err(e)) => {
                    tracing::error!(bot = %id, "worker task panicked: {e}");
                    self.status.set(
                        &id,
                        WorkerState::Failed {
                            reason: format!("worker panicked: {e}"),
                        },
                    );
                    report.stopped += 1;
                }
                Err(_) => {
                    tracing::warn!(bot = %id, "worker did not stop in time; abandoning it");
                    handle.join.abort();
                    self.status.set(
                        &id,
                        WorkerState::Failed {
                            reason: "abandoned after shutdown timeout".to_string(),
                        },
                    );
                    report.abandoned += 1;
                }
            }
        }
        report
    }

    /// True while the bot is authenticated and consuming events.
    pub fn is_running(&self, id: &BotId) -> bool {
        matches!(
            self.status.get(id).map(|s| s.state),
            Some(WorkerState::Running { .. })
        )
    }

    pub fn status(&self, id: &BotId) -> Option<WorkerStatus> {
        self.status.get(id)
    }

    pub fn statuses(&self) -> Vec<(BotId, WorkerStatus)> {
        self.status.snapshot()
    }
}

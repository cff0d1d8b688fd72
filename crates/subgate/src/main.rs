use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use subgate_core::{
    config::{load_bots, Config},
    storage::FsObjectStore,
    supervisor::WorkerSupervisor,
};
use subgate_telegram::TelegramConnector;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Request {
    Shutdown,
    Reload,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    subgate_core::logging::init("subgate")?;

    // Installed once: a signal arriving while nothing listens would be lost.
    let mut signals = Signals::install()?;

    let cfg = Config::load()?;
    let bots = load_bots(&cfg.bots_file)?;
    tracing::info!(
        bots = bots.len(),
        file = %cfg.bots_file.display(),
        storage = %cfg.storage_dir.display(),
        "configuration loaded"
    );

    let store = Arc::new(FsObjectStore::new(cfg.storage_dir.clone()));
    let connector = Arc::new(
        TelegramConnector::new(cfg.poll_timeout_secs).context("telegram connector")?,
    );
    let supervisor = WorkerSupervisor::new(connector, store);

    let root = CancellationToken::new();
    supervisor.start_all(&root, bots).await;

    'serve: loop {
        if signals.next().await == Request::Shutdown {
            break;
        }

        let bots = match load_bots(&cfg.bots_file) {
            Ok(bots) => bots,
            Err(e) => {
                tracing::error!("reload skipped, keeping current bots: {e}");
                continue;
            }
        };
        tracing::info!(bots = bots.len(), "reloading bots");

        let reload = async {
            supervisor.stop_all(cfg.shutdown_timeout).await;
            supervisor.start_all(&root, bots).await;
        };
        tokio::pin!(reload);
        loop {
            tokio::select! {
                _ = &mut reload => break,
                req = signals.next() => match req {
                    Request::Shutdown => break 'serve,
                    Request::Reload => tracing::info!("reload already in progress"),
                },
            }
        }
    }

    tracing::info!(timeout = ?cfg.shutdown_timeout, "shutting down");
    // Also reaches workers whose handles an interrupted reload dropped.
    root.cancel();
    let report = supervisor.stop_all(cfg.shutdown_timeout).await;
    if report.abandoned > 0 {
        tracing::warn!(abandoned = report.abandoned, "some bots did not stop in time");
    }
    Ok(())
}

#[cfg(unix)]
struct Signals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    hangup: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn install() -> anyhow::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt()).context("install SIGINT handler")?,
            terminate: signal(SignalKind::terminate()).context("install SIGTERM handler")?,
            hangup: signal(SignalKind::hangup()).context("install SIGHUP handler")?,
        })
    }

    async fn next(&mut self) -> Request {
        tokio::select! {
            _ = self.interrupt.recv() => Request::Shutdown,
            _ = self.terminate.recv() => Request::Shutdown,
            _ = self.hangup.recv() => Request::Reload,
        }
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn install() -> anyhow::Result<Self> {
        Ok(Self)
    }

    async fn next(&mut self) -> Request {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("listen for ctrl-c failed: {e}");
        }
        Request::Shutdown
    }
}

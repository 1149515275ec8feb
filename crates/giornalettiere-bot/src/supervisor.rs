//! Directory watcher supervision.
//!
//! Polls the watcher thread's liveness and rebuilds it when it has died,
//! until shutdown is signaled.

use anyhow::Result;
use giornalettiere::{DirectoryWatcher, WatcherConfig, WatcherHandle};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub struct WatcherSupervisor {
    config: WatcherConfig,
    settled: UnboundedSender<PathBuf>,
    handle: Option<WatcherHandle>,
    restarts: u64,
}

impl WatcherSupervisor {
    /// Start the first watcher. Failing here is fatal to the caller.
    pub fn start(config: WatcherConfig, settled: UnboundedSender<PathBuf>) -> Result<Self> {
        let handle = start_watcher(&config, &settled)?;
        Ok(Self {
            config,
            settled,
            handle: Some(handle),
            restarts: 0,
        })
    }

    pub fn is_alive(&self) -> bool {
        self.handle.as_ref().is_some_and(WatcherHandle::is_alive)
    }

    /// Watchers started after the first one.
    pub fn restarts(&self) -> u64 {
        self.restarts
    }

    /// Restart the watcher if it has died. Returns whether a new one runs.
    pub fn check(&mut self) -> bool {
        if self.is_alive() {
            return false;
        }
        error!("directory watcher is not running, restarting it");
        self.handle = None;
        match start_watcher(&self.config, &self.settled) {
            Ok(handle) => {
                self.handle = Some(handle);
                self.restarts += 1;
                info!("directory watcher restarted ({} restart(s) so far)", self.restarts);
                true
            }
            Err(e) => {
                error!("cannot restart directory watcher: {e}");
                false
            }
        }
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.stop();
        }
    }
}

fn start_watcher(
    config: &WatcherConfig,
    settled: &UnboundedSender<PathBuf>,
) -> Result<WatcherHandle> {
    let handle = DirectoryWatcher::new(config.clone())?.spawn(settled.clone())?;
    Ok(handle)
}

/// Spawn the liveness loop until shutdown is signaled.
pub fn spawn(
    mut supervisor: WatcherSupervisor,
    check_every: Duration,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "watcher supervisor started: liveness check every {}s",
            check_every.as_secs()
        );
        let mut ticker = tokio::time::interval(check_every);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("watcher supervisor stopping");
                    supervisor.stop();
                    break;
                }
                _ = ticker.tick() => {
                    supervisor.check();
                }
            }
        }
    })
}

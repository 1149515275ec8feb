//! Channel updater: publishes new downloads to the recipients.
//!
//! A pass walks the observed directory, keeps files with an accepted suffix
//! whose name is not yet in the sent-file list, and sends each one to every
//! active recipient. Passes are serialized: the scheduled refresh and the
//! watcher-driven consumer never publish concurrently.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::gateway::{GatewayError, MessagingGateway};
use crate::store::FileListStore;

/// Outcome of one channel-update pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// New files found in the observed directory.
    pub found: usize,
    /// Files delivered to at least one recipient and recorded as sent.
    pub published: usize,
}

struct UpdaterState {
    store: Box<dyn FileListStore>,
    recipients: Vec<String>,
}

pub struct ChannelUpdater {
    observed_dir: PathBuf,
    filetypes: Vec<String>,
    gateway: Arc<dyn MessagingGateway>,
    state: Mutex<UpdaterState>,
}

impl ChannelUpdater {
    pub fn new(
        observed_dir: PathBuf,
        filetypes: Vec<String>,
        recipients: Vec<String>,
        store: Box<dyn FileListStore>,
        gateway: Arc<dyn MessagingGateway>,
    ) -> Self {
        Self {
            observed_dir,
            filetypes,
            gateway,
            state: Mutex::new(UpdaterState { store, recipients }),
        }
    }

    /// Whether `path` has one of the accepted suffixes.
    pub fn accepts(&self, path: &Path) -> bool {
        path.file_name()
            .map(|n| n.to_string_lossy())
            .is_some_and(|name| self.filetypes.iter().any(|ext| name.ends_with(ext.as_str())))
    }

    /// Recipients still accepting documents.
    pub async fn recipients(&self) -> Vec<String> {
        self.state.lock().await.recipients.clone()
    }

    /// Files in the observed directory that were never published.
    pub async fn check_new_files(&self) -> Result<Vec<PathBuf>> {
        let state = self.state.lock().await;
        self.new_files(state.store.as_ref())
    }

    /// Forget a published file so the next pass sends it again.
    pub async fn remove_file(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.store.remove(name)?;
        info!("removed [{name}] from the file list");
        Ok(())
    }

    /// Run one channel-update pass.
    pub async fn update_channel(&self) -> Result<PassReport> {
        let mut state = self.state.lock().await;
        info!("start checking for new files");

        let new_files = self.new_files(state.store.as_ref())?;
        let mut report = PassReport {
            found: new_files.len(),
            published: 0,
        };
        info!("found {} new file(s)", report.found);

        'files: for file in &new_files {
            if state.recipients.is_empty() {
                warn!("no recipient left, {} file(s) not published", report.found - report.published);
                break;
            }
            let Some(name) = file_name(file) else { continue };
            info!("the new file is: {}", file.display());

            let mut delivered = false;
            for chat in state.recipients.clone() {
                match self.gateway.send_document(&chat, file, "").await {
                    Ok(()) => {
                        delivered = true;
                        debug!("sent [{name}] to {chat}");
                    }
                    Err(GatewayError::Unauthorized { description, .. }) => {
                        info!("bot blocked by chat [{chat}] ({description}), removing it");
                        state.recipients.retain(|c| c != &chat);
                    }
                    Err(GatewayError::BadRequest { description, .. }) => {
                        error!("cannot send [{name}] to chat [{chat}]: {description}, skipping");
                    }
                    Err(GatewayError::Cancelled) => {
                        warn!("upload of [{name}] cancelled, ending the pass");
                        break 'files;
                    }
                    Err(e) => error!("sending [{name}] to chat [{chat}] failed: {e}"),
                }
            }

            if delivered {
                state
                    .store
                    .add(&name)
                    .with_context(|| format!("cannot record [{name}] as sent"))?;
                report.published += 1;
            } else {
                warn!("[{name}] was not delivered, it will be retried");
            }
        }

        info!("channel update done ({} published)", report.published);
        Ok(report)
    }

    fn new_files(&self, store: &dyn FileListStore) -> Result<Vec<PathBuf>> {
        info!("checking new files in [{}]", self.observed_dir.display());
        let sent: HashSet<String> = store.list()?.into_iter().collect();

        let mut files = Vec::new();
        walk(&self.observed_dir, &mut files);

        let mut seen = HashSet::new();
        Ok(files
            .into_iter()
            .filter(|path| self.accepts(path))
            .filter(|path| {
                file_name(path).is_some_and(|name| !sent.contains(&name) && seen.insert(name))
            })
            .collect())
    }
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

/// Collect regular files below `dir`, depth first, in name order.
fn walk(dir: &Path, out: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("cannot read [{}]: {e}", dir.display());
            return;
        }
    };
    let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
    paths.sort();

    for path in paths {
        if path.is_dir() {
            walk(&path, out);
        } else if path.is_file() {
            out.push(path);
        }
    }
}

/// Run a pass whenever the watcher reports settled files.
///
/// Paths that arrive while a pass is pending are drained together, so a
/// burst of downloads costs a single pass.
pub fn spawn_consumer(
    updater: Arc<ChannelUpdater>,
    mut settled: UnboundedReceiver<PathBuf>,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!("settled-file consumer started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("settled-file consumer stopping");
                    break;
                }
                next = settled.recv() => {
                    let Some(first) = next else {
                        info!("watcher channel closed, consumer stopping");
                        break;
                    };
                    let mut batch = vec![first];
                    while let Ok(path) = settled.try_recv() {
                        batch.push(path);
                    }
                    let relevant = batch.iter().filter(|p| updater.accepts(p)).count();
                    if relevant == 0 {
                        debug!("ignoring {} settled path(s) with other suffixes", batch.len());
                        continue;
                    }
                    info!("{relevant} settled file(s), updating the channel");
                    if let Err(e) = updater.update_channel().await {
                        error!("channel update failed: {e:#}");
                    }
                }
            }
        }
    })
}

//! Directory watcher that reports files once they stop growing.
//!
//! The watcher owns a dedicated thread blocking on `notify` events. For each
//! event of a watched kind it polls [`StabilityProbe`] until the path settles
//! and then sends the absolute path on a channel. Any failure of the event
//! source ends the thread; restarting it is the owner's job
//! (see [`WatcherHandle::is_alive`]).

use crate::probe::StabilityProbe;
use crate::types::{GiornalettiereError, GiornalettiereResult};
use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

/// How often the event loop wakes up to check for a stop request.
const STOP_POLL: Duration = Duration::from_millis(250);

/// Settled fingerprints kept for duplicate suppression before the map is reset.
const MAX_REMEMBERED: usize = 4096;

/// Filesystem event kinds the watcher can react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchEventKind {
    /// A file or directory was created (`IN_CREATE`).
    Created,
    /// An entry was moved into a watched directory (`IN_MOVED_TO`).
    MovedIn,
    /// File content changed (`IN_MODIFY`).
    Modified,
    /// A file opened for writing was closed (`IN_CLOSE_WRITE`).
    ClosedWrite,
}

impl WatchEventKind {
    /// Map a `notify` event kind onto a watchable kind.
    pub fn classify(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(Self::Created),
            // `Both` accompanies a `To` for renames inside the tree.
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(Self::MovedIn),
            EventKind::Modify(ModifyKind::Name(_)) => None,
            EventKind::Modify(_) => Some(Self::Modified),
            EventKind::Access(AccessKind::Close(AccessMode::Write)) => Some(Self::ClosedWrite),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::MovedIn => "moved_in",
            Self::Modified => "modified",
            Self::ClosedWrite => "closed_write",
        }
    }
}

impl std::fmt::Display for WatchEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Watcher settings.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub roots: Vec<PathBuf>,
    pub events: HashSet<WatchEventKind>,
    pub recursive: bool,
    pub settle_interval: Duration,
    /// Probe rounds before a still-changing path is given up on.
    pub max_settle_attempts: u32,
}

impl WatcherConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            roots: vec![root.into()],
            events: [WatchEventKind::Created, WatchEventKind::MovedIn]
                .into_iter()
                .collect(),
            recursive: false,
            settle_interval: crate::probe::DEFAULT_SAMPLE_INTERVAL,
            max_settle_attempts: 3600,
        }
    }
}

/// A validated, not yet running directory watcher.
pub struct DirectoryWatcher {
    roots: Vec<PathBuf>,
    events: HashSet<WatchEventKind>,
    recursive: bool,
    probe: StabilityProbe,
    max_settle_attempts: u32,
}

impl DirectoryWatcher {
    /// Validate `config`, creating missing root directories.
    pub fn new(config: WatcherConfig) -> GiornalettiereResult<Self> {
        if config.events.is_empty() {
            error!("no events to monitor");
            return Err(GiornalettiereError::NoWatchedEvents);
        }
        if config.roots.is_empty() {
            return Err(GiornalettiereError::Config(
                "no directories to watch".to_string(),
            ));
        }

        let mut roots = Vec::with_capacity(config.roots.len());
        for root in &config.roots {
            roots.push(prepare_root(root)?);
        }

        let mut kinds: Vec<_> = config.events.iter().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        info!("monitoring the following events: {kinds:?}");

        Ok(Self {
            roots,
            events: config.events,
            recursive: config.recursive,
            probe: StabilityProbe::new(config.settle_interval),
            max_settle_attempts: config.max_settle_attempts.max(1),
        })
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Subscribe to the roots and start the watcher thread.
    ///
    /// Settled paths are sent on `settled`. Subscription errors are returned
    /// here, before the thread starts.
    pub fn spawn(self, settled: UnboundedSender<PathBuf>) -> GiornalettiereResult<WatcherHandle> {
        let (event_tx, event_rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(event_tx)?;

        let mode = if self.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        for root in &self.roots {
            watcher.watch(root, mode)?;
            if self.recursive {
                info!("starting a recursive monitoring on [{}]", root.display());
            } else {
                info!("starting a plain monitoring on [{}]", root.display());
            }
        }

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let thread = std::thread::Builder::new()
            .name("directory-watcher".to_string())
            .spawn(move || {
                // The notify watcher must live as long as the loop.
                let _watcher = watcher;
                EventLoop {
                    watcher: self,
                    settled,
                    stop: thread_stop,
                    reported: HashMap::new(),
                }
                .run(event_rx);
            })?;

        Ok(WatcherHandle {
            stop,
            thread: Some(thread),
        })
    }
}

fn prepare_root(root: &Path) -> GiornalettiereResult<PathBuf> {
    if !root.exists() {
        std::fs::create_dir_all(root)?;
        info!("created missing directory [{}]", root.display());
    }
    if !root.is_dir() {
        error!("the given directory [{}] is not a directory", root.display());
        return Err(GiornalettiereError::NotADirectory(root.to_path_buf()));
    }
    Ok(std::fs::canonicalize(root)?)
}

/// Handle to a running watcher thread.
pub struct WatcherHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl WatcherHandle {
    /// False once the watcher thread has exited for any reason.
    pub fn is_alive(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Ask the watcher thread to exit.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Stop the watcher and wait for its thread.
    pub fn join(mut self) {
        self.stop();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("directory watcher thread panicked");
            }
        }
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    len: u64,
    modified: Option<SystemTime>,
}

impl Fingerprint {
    fn of(path: &Path) -> Option<Self> {
        let meta = std::fs::metadata(path).ok()?;
        Some(Self {
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }
}

enum Settle {
    Stable,
    GaveUp,
    Stopped,
}

struct EventLoop {
    watcher: DirectoryWatcher,
    settled: UnboundedSender<PathBuf>,
    stop: Arc<AtomicBool>,
    /// Last reported fingerprint per path, so one transition reports once.
    reported: HashMap<PathBuf, Fingerprint>,
}

impl EventLoop {
    fn run(mut self, events: mpsc::Receiver<notify::Result<Event>>) {
        info!("directory watcher started");
        'events: loop {
            if self.stopping() {
                info!("directory watcher stopping");
                break;
            }
            let first = match events.recv_timeout(STOP_POLL) {
                Ok(event) => event,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    error!("directory watcher event source closed");
                    break;
                }
            };

            // Everything already queued is settled once per path.
            let mut pending: Vec<(WatchEventKind, PathBuf)> = Vec::new();
            for event in std::iter::once(first).chain(events.try_iter()) {
                let event = match event {
                    Ok(event) => event,
                    Err(e) => {
                        error!("directory watcher event source failed: {e}");
                        break 'events;
                    }
                };
                if event.need_rescan() {
                    error!("directory watcher lost events (queue overflow)");
                    break 'events;
                }
                if let Some((kind, path)) = self.watched(&event) {
                    if !pending.iter().any(|(_, p)| p == &path) {
                        pending.push((kind, path));
                    }
                }
            }

            for (kind, path) in pending {
                if !self.handle(kind, path) {
                    break 'events;
                }
            }
        }
        warn!("directory watcher stopped checking directories");
    }

    /// The watched kind and path of `event`, if it is one to react to.
    fn watched(&self, event: &Event) -> Option<(WatchEventKind, PathBuf)> {
        let kind = WatchEventKind::classify(&event.kind)?;
        if !self.watcher.events.contains(&kind) {
            return None;
        }
        let path = event.paths.last()?.clone();
        Some((kind, path))
    }

    /// Settle and report one path. Returns false when the loop must end.
    fn handle(&mut self, kind: WatchEventKind, path: PathBuf) -> bool {
        info!("registered event [{kind}] for file [{}]", path.display());
        if self.already_reported(&path) {
            debug!("[{}] unchanged since its last report", path.display());
            return true;
        }

        match self.settle(&path) {
            Ok(Settle::Stable) => self.report(path),
            Ok(Settle::GaveUp) => {
                warn!(
                    "file [{}] still changing after {} checks - skipping",
                    path.display(),
                    self.watcher.max_settle_attempts
                );
                true
            }
            Ok(Settle::Stopped) => true,
            Err(e) if e.is_missing() => {
                warn!("file missing [{}] - skipping callback", path.display());
                true
            }
            Err(e) => {
                warn!("cannot inspect [{}] - skipping callback: {e}", path.display());
                true
            }
        }
    }

    fn settle(&self, path: &Path) -> GiornalettiereResult<Settle> {
        for _ in 0..self.watcher.max_settle_attempts {
            if self.stopping() {
                return Ok(Settle::Stopped);
            }
            if self.watcher.probe.is_stable(path)? {
                return Ok(Settle::Stable);
            }
            info!("still writing on file [{}]", path.display());
        }
        Ok(Settle::GaveUp)
    }

    fn already_reported(&self, path: &Path) -> bool {
        self.reported
            .get(path)
            .is_some_and(|last| Fingerprint::of(path).as_ref() == Some(last))
    }

    fn report(&mut self, path: PathBuf) -> bool {
        let Some(fingerprint) = Fingerprint::of(&path) else {
            warn!("file missing [{}] - skipping callback", path.display());
            return true;
        };
        if self.reported.get(&path) == Some(&fingerprint) {
            debug!("[{}] already reported", path.display());
            return true;
        }
        if self.reported.len() >= MAX_REMEMBERED {
            self.reported.clear();
        }
        self.reported.insert(path.clone(), fingerprint);

        info!("file [{}] settled", path.display());
        if self.settled.send(path).is_err() {
            error!("settled-path receiver dropped");
            return false;
        }
        true
    }

    fn stopping(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange};

    #[test]
    fn test_classify_event_kinds() {
        assert_eq!(
            WatchEventKind::classify(&EventKind::Create(CreateKind::File)),
            Some(WatchEventKind::Created)
        );
        assert_eq!(
            WatchEventKind::classify(&EventKind::Modify(ModifyKind::Name(RenameMode::To))),
            Some(WatchEventKind::MovedIn)
        );
        assert_eq!(
            WatchEventKind::classify(&EventKind::Modify(ModifyKind::Name(RenameMode::Both))),
            None
        );
        assert_eq!(
            WatchEventKind::classify(&EventKind::Modify(ModifyKind::Data(DataChange::Any))),
            Some(WatchEventKind::Modified)
        );
        assert_eq!(
            WatchEventKind::classify(&EventKind::Access(AccessKind::Close(AccessMode::Write))),
            Some(WatchEventKind::ClosedWrite)
        );
        assert_eq!(
            WatchEventKind::classify(&EventKind::Remove(notify::event::RemoveKind::File)),
            None
        );
    }

    #[test]
    fn test_event_kind_serde_names() {
        let kinds: Vec<WatchEventKind> =
            serde_json::from_str(r#"["created", "moved_in", "closed_write"]"#).unwrap();
        assert_eq!(
            kinds,
            vec![
                WatchEventKind::Created,
                WatchEventKind::MovedIn,
                WatchEventKind::ClosedWrite
            ]
        );
    }

    #[test]
    fn test_empty_event_set_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = WatcherConfig::new(dir.path());
        config.events.clear();
        assert!(matches!(
            DirectoryWatcher::new(config),
            Err(GiornalettiereError::NoWatchedEvents)
        ));
    }

    #[test]
    fn test_missing_root_is_created() {
        let dir = tempfile::TempDir::new().unwrap();
        let root = dir.path().join("downloads").join("Giornali");
        let watcher = DirectoryWatcher::new(WatcherConfig::new(&root)).unwrap();
        assert!(root.is_dir());
        assert_eq!(watcher.roots()[0], std::fs::canonicalize(&root).unwrap());
    }

    #[test]
    fn test_file_root_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();
        assert!(matches!(
            DirectoryWatcher::new(WatcherConfig::new(&file)),
            Err(GiornalettiereError::NotADirectory(_))
        ));
    }
}

//! Directory watcher integration tests against a real temp directory.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use giornalettiere::{DirectoryWatcher, WatchEventKind, WatcherConfig};
use tempfile::TempDir;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::time::timeout;

// ─────────────────────── helpers ───────────────────────

fn fast_config(root: &std::path::Path) -> WatcherConfig {
    let mut config = WatcherConfig::new(root);
    config.settle_interval = Duration::from_millis(400);
    config.max_settle_attempts = 50;
    config
}

async fn next_path(rx: &mut UnboundedReceiver<PathBuf>, wait: Duration) -> Option<PathBuf> {
    timeout(wait, rx.recv()).await.ok().flatten()
}

/// Let the watcher thread register its inotify watches.
async fn warm_up() {
    tokio::time::sleep(Duration::from_millis(200)).await;
}

// ─────────────────────── scenarios ───────────────────────

#[tokio::test]
async fn growing_file_is_reported_once_after_it_settles() {
    let dir = TempDir::new().unwrap();
    let root = std::fs::canonicalize(dir.path()).unwrap();
    let (tx, mut rx) = unbounded_channel();
    let handle = DirectoryWatcher::new(fast_config(&root))
        .unwrap()
        .spawn(tx)
        .unwrap();
    warm_up().await;

    let target = root.join("report.pdf");
    let writer_target = target.clone();
    let writer = std::thread::spawn(move || {
        let mut f = std::fs::File::create(&writer_target).unwrap();
        for _ in 0..15 {
            f.write_all(&[0u8; 4096]).unwrap();
            f.flush().unwrap();
            std::thread::sleep(Duration::from_millis(100));
        }
    });

    // Still growing: nothing may be reported yet.
    assert!(next_path(&mut rx, Duration::from_millis(900)).await.is_none());

    let reported = next_path(&mut rx, Duration::from_secs(10)).await;
    writer.join().unwrap();
    assert_eq!(reported, Some(target.clone()));
    assert_eq!(std::fs::metadata(&target).unwrap().len(), 15 * 4096);

    assert!(next_path(&mut rx, Duration::from_secs(2)).await.is_none());
    assert!(handle.is_alive());
    handle.join();
}

#[tokio::test]
async fn file_moved_in_is_reported() {
    let dir = TempDir::new().unwrap();
    let outside = TempDir::new_in(dir.path()).unwrap();
    let root = std::fs::canonicalize(dir.path()).unwrap().join("inbox");
    let (tx, mut rx) = unbounded_channel();
    let handle = DirectoryWatcher::new(fast_config(&root))
        .unwrap()
        .spawn(tx)
        .unwrap();
    warm_up().await;

    let staged = outside.path().join("Il Mattino.pdf");
    std::fs::write(&staged, b"%PDF-1.7 done").unwrap();
    let target = root.join("Il Mattino.pdf");
    std::fs::rename(&staged, &target).unwrap();

    assert_eq!(next_path(&mut rx, Duration::from_secs(5)).await, Some(target));
    handle.join();
}

#[tokio::test]
async fn vanished_file_is_skipped_and_watcher_survives() {
    let dir = TempDir::new().unwrap();
    let root = std::fs::canonicalize(dir.path()).unwrap();
    let (tx, mut rx) = unbounded_channel();
    let handle = DirectoryWatcher::new(fast_config(&root))
        .unwrap()
        .spawn(tx)
        .unwrap();
    warm_up().await;

    let partial = root.join("cancelled.part");
    std::fs::write(&partial, b"partial").unwrap();
    std::fs::remove_file(&partial).unwrap();

    assert!(next_path(&mut rx, Duration::from_secs(2)).await.is_none());
    assert!(handle.is_alive());

    let good = root.join("after.pdf");
    std::fs::write(&good, b"complete").unwrap();
    assert_eq!(next_path(&mut rx, Duration::from_secs(5)).await, Some(good));
    handle.join();
}

#[tokio::test]
async fn recursive_watch_covers_new_subdirectories() {
    let dir = TempDir::new().unwrap();
    let root = std::fs::canonicalize(dir.path()).unwrap();
    let mut config = fast_config(&root);
    config.recursive = true;
    let (tx, mut rx) = unbounded_channel();
    let handle = DirectoryWatcher::new(config).unwrap().spawn(tx).unwrap();
    warm_up().await;

    let sub = root.join("2024-03-26");
    std::fs::create_dir(&sub).unwrap();
    assert_eq!(
        next_path(&mut rx, Duration::from_secs(5)).await,
        Some(sub.clone())
    );

    let nested = sub.join("Avvenire.pdf");
    std::fs::write(&nested, b"%PDF").unwrap();
    assert_eq!(next_path(&mut rx, Duration::from_secs(5)).await, Some(nested));
    handle.join();
}

#[tokio::test]
async fn unwatched_kinds_are_ignored() {
    let dir = TempDir::new().unwrap();
    let root = std::fs::canonicalize(dir.path()).unwrap();
    let existing = root.join("already-there.pdf");
    std::fs::write(&existing, b"old").unwrap();

    let mut config = fast_config(&root);
    config.events = [WatchEventKind::MovedIn].into_iter().collect();
    let (tx, mut rx) = unbounded_channel();
    let handle = DirectoryWatcher::new(config).unwrap().spawn(tx).unwrap();
    warm_up().await;

    std::fs::write(root.join("fresh.pdf"), b"new").unwrap();
    std::fs::write(&existing, b"rewritten").unwrap();
    assert!(next_path(&mut rx, Duration::from_secs(2)).await.is_none());
    handle.join();
}

#[tokio::test]
async fn dropped_receiver_ends_the_watcher() {
    let dir = TempDir::new().unwrap();
    let root = std::fs::canonicalize(dir.path()).unwrap();
    let (tx, rx) = unbounded_channel();
    let handle = DirectoryWatcher::new(fast_config(&root))
        .unwrap()
        .spawn(tx)
        .unwrap();
    warm_up().await;
    drop(rx);

    std::fs::write(root.join("nobody-listens.pdf"), b"x").unwrap();

    let mut alive = true;
    for _ in 0..40 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if !handle.is_alive() {
            alive = false;
            break;
        }
    }
    assert!(!alive);
}

#[tokio::test]
async fn stop_ends_the_watcher_thread() {
    let dir = TempDir::new().unwrap();
    let (tx, _rx) = unbounded_channel();
    let handle = DirectoryWatcher::new(fast_config(dir.path()))
        .unwrap()
        .spawn(tx)
        .unwrap();
    assert!(handle.is_alive());

    handle.stop();
    let mut alive = true;
    for _ in 0..20 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if !handle.is_alive() {
            alive = false;
            break;
        }
    }
    assert!(!alive);
}

#[tokio::test]
async fn modify_bursts_do_not_delay_other_files() {
    let dir = TempDir::new().unwrap();
    let root = std::fs::canonicalize(dir.path()).unwrap();
    let mut config = fast_config(&root);
    config.events.insert(WatchEventKind::Modified);
    let (tx, mut rx) = unbounded_channel();
    let handle = DirectoryWatcher::new(config).unwrap().spawn(tx).unwrap();
    warm_up().await;

    let big = root.join("Corriere.pdf");
    let writer_target = big.clone();
    let writer = std::thread::spawn(move || {
        let mut f = std::fs::File::create(&writer_target).unwrap();
        for _ in 0..40 {
            f.write_all(&[0u8; 1024]).unwrap();
            std::thread::sleep(Duration::from_millis(50));
        }
    });
    assert_eq!(next_path(&mut rx, Duration::from_secs(10)).await, Some(big));
    writer.join().unwrap();

    // The modify events still queued for the big file cost nothing once it
    // has been reported.
    let small = root.join("Avvenire.pdf");
    std::fs::write(&small, b"%PDF-1.7").unwrap();
    assert_eq!(next_path(&mut rx, Duration::from_secs(3)).await, Some(small));

    assert!(next_path(&mut rx, Duration::from_secs(1)).await.is_none());
    handle.join();
}

//! Spool Watcher with polling-based change detection
//!
//! Polls the spool directory instead of subscribing to inotify: the spool
//! usually sits behind an FTP server on a network filesystem, where inotify
//! events are not delivered reliably.
//!
//! # Design
//!
//! - List the directory (non-recursive) every poll interval
//! - Compare `(len, mtime)` against the previous snapshot
//! - Emit a file only once it is settled: unchanged across two polls
//! - Push events into a bounded channel; the dispatcher does the work

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpoolEventKind {
    Created,
    Modified,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpoolEvent {
    pub path: PathBuf,
    pub kind: SpoolEventKind,
}

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub poll_interval: Duration,
    /// Emit files that already exist when the watcher starts.
    pub scan_existing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Signature {
    len: u64,
    modified: Option<SystemTime>,
}

#[derive(Debug, Clone, Copy)]
struct FileState {
    signature: Signature,
    /// Event already emitted for this signature.
    emitted: bool,
    /// An event was emitted for an earlier signature of this path.
    seen_before: bool,
}

pub struct SpoolWatcher {
    dir: PathBuf,
    config: WatchConfig,
    snapshot: HashMap<PathBuf, FileState>,
    primed: bool,
}

impl SpoolWatcher {
    /// Fails if the directory cannot be listed.
    pub async fn open(dir: impl Into<PathBuf>, config: WatchConfig) -> io::Result<Self> {
        let dir = dir.into();
        let _listing = tokio::fs::read_dir(&dir).await?;
        Ok(Self {
            dir,
            config,
            snapshot: HashMap::new(),
            primed: false,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// One polling pass. Returns the settled files that changed since the
    /// last pass. A pass whose listing fails part way is abandoned with the
    /// snapshot untouched.
    pub async fn poll_once(&mut self) -> io::Result<Vec<SpoolEvent>> {
        let current = list_files(&self.dir).await?;
        Ok(self.apply(current))
    }

    fn apply(&mut self, current: HashMap<PathBuf, Signature>) -> Vec<SpoolEvent> {
        let priming = !self.primed;
        self.primed = true;
        let mut events = Vec::new();

        for (path, signature) in &current {
            match self.snapshot.get_mut(path) {
                None => {
                    // Files present at startup count as already handled
                    // unless a rescan was requested.
                    let handled = priming && !self.config.scan_existing;
                    self.snapshot.insert(
                        path.clone(),
                        FileState {
                            signature: *signature,
                            emitted: handled,
                            seen_before: handled,
                        },
                    );
                }
                Some(state) if state.signature != *signature => {
                    state.seen_before |= state.emitted;
                    state.signature = *signature;
                    state.emitted = false;
                }
                Some(state) if !state.emitted => {
                    state.emitted = true;
                    events.push(SpoolEvent {
                        path: path.clone(),
                        kind: if state.seen_before {
                            SpoolEventKind::Modified
                        } else {
                            SpoolEventKind::Created
                        },
                    });
                }
                Some(_) => {}
            }
        }

        self.snapshot.retain(|path, _| current.contains_key(path));
        events.sort_by(|a, b| a.path.cmp(&b.path));
        events
    }

    /// Poll until shutdown, forwarding events to `tx`.
    pub async fn run(mut self, tx: mpsc::Sender<SpoolEvent>, mut shutdown: watch::Receiver<bool>) {
        info!(
            dir = %self.dir.display(),
            interval_ms = self.config.poll_interval.as_millis() as u64,
            "Spool watcher started"
        );
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }

            let events = match self.poll_once().await {
                Ok(events) => events,
                Err(err) => {
                    warn!(dir = %self.dir.display(), "Spool poll failed: {}", err);
                    continue;
                }
            };
            for event in events {
                debug!(path = %event.path.display(), kind = ?event.kind, "Spool event");
                if tx.send(event).await.is_err() {
                    info!("Event channel closed, stopping spool watcher");
                    return;
                }
            }
        }
        info!("Spool watcher stopped");
    }
}

/// Regular, non-hidden files directly under `dir` with their signatures.
async fn list_files(dir: &Path) -> io::Result<HashMap<PathBuf, Signature>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut current = HashMap::new();

    while let Some(entry) = entries.next_entry().await? {
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %entry.path().display(), "Entry vanished during listing");
                continue;
            }
            Err(err) => return Err(err),
        };
        if !metadata.is_file() {
            continue;
        }
        current.insert(
            entry.path(),
            Signature {
                len: metadata.len(),
                modified: metadata.modified().ok(),
            },
        );
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(scan_existing: bool) -> WatchConfig {
        WatchConfig {
            poll_interval: Duration::from_millis(10),
            scan_existing,
        }
    }

    #[tokio::test]
    async fn emits_new_file_once_settled() {
        let temp = TempDir::new().unwrap();
        let mut watcher = SpoolWatcher::open(temp.path(), config(false)).await.unwrap();
        assert!(watcher.poll_once().await.unwrap().is_empty());

        std::fs::write(temp.path().join("job.sfc"), b"+1\ndoc.pdf\n").unwrap();
        // First sighting: not yet settled
        assert!(watcher.poll_once().await.unwrap().is_empty());

        let events = watcher.poll_once().await.unwrap();
        assert_eq!(
            events,
            vec![SpoolEvent {
                path: temp.path().join("job.sfc"),
                kind: SpoolEventKind::Created,
            }]
        );
        assert!(watcher.poll_once().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn growing_file_is_not_emitted_until_stable() {
        let temp = TempDir::new().unwrap();
        let mut watcher = SpoolWatcher::open(temp.path(), config(false)).await.unwrap();
        watcher.poll_once().await.unwrap();

        let path = temp.path().join("doc.pdf");
        std::fs::write(&path, b"%PDF").unwrap();
        assert!(watcher.poll_once().await.unwrap().is_empty());
        std::fs::write(&path, b"%PDF-1.4 more bytes").unwrap();
        assert!(watcher.poll_once().await.unwrap().is_empty());
        assert_eq!(watcher.poll_once().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn existing_files_respect_scan_existing() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("old.pdf"), b"x").unwrap();

        let mut quiet = SpoolWatcher::open(temp.path(), config(false)).await.unwrap();
        quiet.poll_once().await.unwrap();
        assert!(quiet.poll_once().await.unwrap().is_empty());

        let mut rescan = SpoolWatcher::open(temp.path(), config(true)).await.unwrap();
        rescan.poll_once().await.unwrap();
        assert_eq!(rescan.poll_once().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn skips_hidden_files_and_directories() {
        let temp = TempDir::new().unwrap();
        let mut watcher = SpoolWatcher::open(temp.path(), config(false)).await.unwrap();
        watcher.poll_once().await.unwrap();

        std::fs::write(temp.path().join(".tmp_123"), b"x").unwrap();
        std::fs::create_dir(temp.path().join("sub.pdf")).unwrap();
        watcher.poll_once().await.unwrap();
        assert!(watcher.poll_once().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_pass_does_not_reemit_known_files() {
        let temp = TempDir::new().unwrap();
        let spool = temp.path().join("spool");
        let parked = temp.path().join("parked");
        std::fs::create_dir(&spool).unwrap();

        let mut watcher = SpoolWatcher::open(&spool, config(false)).await.unwrap();
        watcher.poll_once().await.unwrap();
        std::fs::write(spool.join("job.sfc"), b"+1\ndoc.pdf\n").unwrap();
        std::fs::write(spool.join("doc.pdf"), b"%PDF").unwrap();
        watcher.poll_once().await.unwrap();
        assert_eq!(watcher.poll_once().await.unwrap().len(), 2);

        // Rename keeps mtimes, so only the failed pass could cause a rescan.
        std::fs::rename(&spool, &parked).unwrap();
        assert!(watcher.poll_once().await.is_err());
        std::fs::rename(&parked, &spool).unwrap();

        assert!(watcher.poll_once().await.unwrap().is_empty());
        assert!(watcher.poll_once().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn open_fails_for_missing_directory() {
        let temp = TempDir::new().unwrap();
        assert!(SpoolWatcher::open(temp.path().join("nope"), config(false))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn run_forwards_events_and_stops_on_shutdown() {
        let temp = TempDir::new().unwrap();
        let watcher = SpoolWatcher::open(temp.path(), config(false)).await.unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(watcher.run(tx, shutdown_rx));

        tokio::time::sleep(Duration::from_millis(30)).await;
        std::fs::write(temp.path().join("a.sfc"), b"+1\na.pdf\n").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.path, temp.path().join("a.sfc"));

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}

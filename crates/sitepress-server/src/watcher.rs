//! File watching for rebuild on change.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc as async_mpsc;

/// Events emitted by the file watcher.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    /// Template or config file was modified
    Modified(PathBuf),

    /// File was created
    Created(PathBuf),

    /// File was deleted
    Deleted(PathBuf),
}

impl WatchEvent {
    pub fn path(&self) -> &Path {
        match self {
            WatchEvent::Modified(p) | WatchEvent::Created(p) | WatchEvent::Deleted(p) => p,
        }
    }
}

/// Quiet period after the last relevant event before changes are reported.
const DEBOUNCE: Duration = Duration::from_millis(100);

/// Collects events until a quiet window passes, then releases them together.
///
/// Only events that survived filtering reach the debouncer, so scratch
/// files never hold back or swallow a real change.
#[derive(Debug)]
struct Debouncer {
    window: Duration,
    pending: Vec<WatchEvent>,
    last: Option<Instant>,
}

impl Debouncer {
    fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Vec::new(),
            last: None,
        }
    }

    /// Record an event; a later event for the same path replaces the earlier one.
    fn push(&mut self, event: WatchEvent, now: Instant) {
        self.pending.retain(|e| e.path() != event.path());
        self.pending.push(event);
        self.last = Some(now);
    }

    /// When the pending events become ready, if there are any.
    fn deadline(&self) -> Option<Instant> {
        if self.pending.is_empty() {
            return None;
        }
        self.last.map(|last| last + self.window)
    }

    /// Pending events, once the window has passed since the last one.
    fn ready(&mut self, now: Instant) -> Vec<WatchEvent> {
        match self.deadline() {
            Some(deadline) if now >= deadline => self.drain(),
            _ => Vec::new(),
        }
    }

    fn drain(&mut self) -> Vec<WatchEvent> {
        self.last = None;
        std::mem::take(&mut self.pending)
    }
}

/// File watcher for detecting changes.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Create a new file watcher for the given paths.
    ///
    /// Directories are watched recursively; missing paths are skipped.
    /// Returns the watcher and a channel to receive events.
    pub fn new(
        paths: &[PathBuf],
    ) -> Result<(Self, async_mpsc::Receiver<WatchEvent>), std::io::Error> {
        let (sync_tx, sync_rx) = mpsc::channel();
        let (async_tx, async_rx) = async_mpsc::channel(100);

        let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, _>| {
            if let Ok(event) = res {
                let _ = sync_tx.send(event);
            }
        })
        .map_err(std::io::Error::other)?;

        for path in paths {
            if path.exists() {
                watcher
                    .watch(path, RecursiveMode::Recursive)
                    .map_err(std::io::Error::other)?;
            }
        }

        std::thread::spawn(move || {
            let mut debouncer = Debouncer::new(DEBOUNCE);

            loop {
                let received = match debouncer.deadline() {
                    Some(deadline) => {
                        sync_rx.recv_timeout(deadline.saturating_duration_since(Instant::now()))
                    }
                    None => sync_rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
                };

                let disconnected = match received {
                    Ok(event) => {
                        for path in &event.paths {
                            if let Some(e) = classify_event(path, &event.kind) {
                                debouncer.push(e, Instant::now());
                            }
                        }
                        false
                    }
                    Err(RecvTimeoutError::Timeout) => false,
                    Err(RecvTimeoutError::Disconnected) => true,
                };

                let ready = if disconnected {
                    debouncer.drain()
                } else {
                    debouncer.ready(Instant::now())
                };

                for e in ready {
                    if async_tx.blocking_send(e).is_err() {
                        return;
                    }
                }

                if disconnected {
                    return;
                }
            }
        });

        Ok((Self { _watcher: watcher }, async_rx))
    }
}

/// Classify a notify event into a WatchEvent.
fn classify_event(path: &Path, kind: &notify::EventKind) -> Option<WatchEvent> {
    use notify::EventKind;

    if is_scratch_file(path) {
        return None;
    }

    match kind {
        EventKind::Create(_) => Some(WatchEvent::Created(path.to_path_buf())),
        EventKind::Remove(_) => Some(WatchEvent::Deleted(path.to_path_buf())),
        EventKind::Modify(_) => Some(WatchEvent::Modified(path.to_path_buf())),
        _ => None,
    }
}

/// Editor swap and backup files.
fn is_scratch_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    name.ends_with('~') || name.ends_with(".swp") || name.ends_with(".tmp") || name.starts_with(".#")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn ignores_editor_scratch_files() {
        let kind = notify::EventKind::Modify(notify::event::ModifyKind::Any);

        assert_eq!(classify_event(Path::new("templates/base.html~"), &kind), None);
        assert_eq!(classify_event(Path::new("templates/.base.html.swp"), &kind), None);
        assert_eq!(
            classify_event(Path::new("templates/base.html"), &kind),
            Some(WatchEvent::Modified(PathBuf::from("templates/base.html")))
        );
    }

    #[test]
    fn debouncer_releases_after_quiet_window() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(DEBOUNCE);

        debouncer.push(WatchEvent::Modified(PathBuf::from("a.html")), start);
        debouncer.push(
            WatchEvent::Modified(PathBuf::from("b.html")),
            start + Duration::from_millis(60),
        );
        assert!(debouncer.ready(start + Duration::from_millis(120)).is_empty());

        let ready = debouncer.ready(start + Duration::from_millis(160));
        assert_eq!(
            ready,
            vec![
                WatchEvent::Modified(PathBuf::from("a.html")),
                WatchEvent::Modified(PathBuf::from("b.html"))
            ]
        );
        assert!(debouncer.deadline().is_none());
    }

    #[test]
    fn debouncer_keeps_latest_event_per_path() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(DEBOUNCE);

        debouncer.push(WatchEvent::Created(PathBuf::from("a.html")), start);
        debouncer.push(WatchEvent::Modified(PathBuf::from("a.html")), start);

        assert_eq!(
            debouncer.ready(start + DEBOUNCE),
            vec![WatchEvent::Modified(PathBuf::from("a.html"))]
        );
    }

    #[tokio::test]
    async fn scratch_file_does_not_swallow_following_change() {
        let temp = tempdir().unwrap();

        let (watcher, mut rx) = FileWatcher::new(&[temp.path().to_path_buf()]).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;

        fs::write(temp.path().join(".base.html.swp"), "swap").unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        fs::write(temp.path().join("base.html"), "<html></html>").unwrap();

        let found = tokio::time::timeout(Duration::from_secs(3), async {
            while let Some(event) = rx.recv().await {
                if event.path().file_name() == Some(std::ffi::OsStr::new("base.html")) {
                    return true;
                }
            }
            false
        })
        .await;

        drop(watcher);

        assert!(matches!(found, Ok(true)), "no event for base.html");
    }

    #[tokio::test]
    async fn watches_file_changes() {
        let temp = tempdir().unwrap();
        let test_file = temp.path().join("home_content.html");

        let (watcher, mut rx) = FileWatcher::new(&[temp.path().to_path_buf()]).unwrap();

        // Give inotify time to set up
        tokio::time::sleep(Duration::from_millis(100)).await;

        fs::write(&test_file, "<p>Created</p>").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(3), rx.recv()).await;

        drop(watcher);

        assert!(event.is_ok(), "timeout waiting for file watch event");
        assert!(event.unwrap().is_some(), "channel should not be closed");
    }
}

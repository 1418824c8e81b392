//! Per-file watcher with debounce (spec §4.H), grounded on the pack's
//! `notify`-based watcher (`knhk-test-cache::watcher::FileWatcher`):
//! install an OS-level watch on the parent directory (notify has no
//! single-file mode on every platform), filter events down to the target
//! path, and collapse bursts behind a debounce window before invoking the
//! registered callback.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

pub type WatchCallback = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// A running (or degraded-to-no-op) watch on one file.
pub struct WatchHandle {
    _watcher: Option<RecommendedWatcher>,
    task: Option<JoinHandle<()>>,
}

impl WatchHandle {
    fn noop() -> Self {
        Self { _watcher: None, task: None }
    }

    pub fn is_active(&self) -> bool {
        self.task.is_some()
    }

    pub fn stop(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Install a watch on `target`'s parent directory and invoke `callback`
/// whenever `target` changes, debounced by `debounce`. If the OS refuses to
/// install the watch (e.g. resource exhaustion, missing parent directory),
/// this logs a warning and returns an inert handle rather than failing.
pub fn watch_file(target: impl Into<PathBuf>, debounce: Duration, callback: WatchCallback) -> WatchHandle {
    let target = target.into();
    let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) else {
        warn!(path = %target.display(), "watch target has no parent directory, degrading to no-op");
        return WatchHandle::noop();
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<notify::Result<Event>>();

    let watcher = match notify::recommended_watcher(move |res| {
        let _ = tx.send(res);
    }) {
        Ok(mut watcher) => match watcher.watch(parent, RecursiveMode::NonRecursive) {
            Ok(()) => watcher,
            Err(e) => {
                warn!(path = %target.display(), error = %e, "failed to install file watch, degrading to no-op");
                return WatchHandle::noop();
            }
        },
        Err(e) => {
            warn!(path = %target.display(), error = %e, "failed to create file watcher, degrading to no-op");
            return WatchHandle::noop();
        }
    };

    info!(path = %target.display(), "file watch installed");

    let watched_path = target.clone();
    let task = tokio::spawn(async move {
        let mut pending = false;
        loop {
            tokio::select! {
                event = rx.recv() => {
                    match event {
                        Some(Ok(ev)) if touches(&ev, &watched_path) => pending = true,
                        Some(_) => {}
                        None => break,
                    }
                }
                _ = tokio::time::sleep(debounce), if pending => {
                    pending = false;
                    callback().await;
                }
            }
        }
    });

    WatchHandle { _watcher: Some(watcher), task: Some(task) }
}

fn touches(event: &Event, target: &Path) -> bool {
    event.paths.iter().any(|p| p == target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn callback_fires_after_debounce_on_file_write() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("watched.txt");
        std::fs::write(&target, "initial").unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let count_cb = Arc::clone(&count);
        let callback: WatchCallback = Arc::new(move || {
            let count = Arc::clone(&count_cb);
            Box::pin(async move {
                count.fetch_add(1, Ordering::SeqCst);
            })
        });

        let handle = watch_file(&target, StdDuration::from_millis(100), callback);
        assert!(handle.is_active());

        tokio::time::sleep(StdDuration::from_millis(200)).await;
        std::fs::write(&target, "changed").unwrap();
        tokio::time::sleep(StdDuration::from_millis(600)).await;

        assert!(count.load(Ordering::SeqCst) >= 1);
        handle.stop();
    }

    #[tokio::test]
    async fn missing_parent_degrades_to_noop() {
        let callback: WatchCallback = Arc::new(|| Box::pin(async {}));
        let handle = watch_file(PathBuf::from("orphan.txt"), StdDuration::from_millis(100), callback);
        // A relative path with no parent component has nothing to install a
        // directory watch on; this must degrade rather than panic.
        assert!(!handle.is_active());
    }
}

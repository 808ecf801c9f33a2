//! File Watcher (4.L).
//!
//! Wraps `notify`'s OS filesystem watcher with reference-counted path
//! subscriptions: several actions can watch overlapping directories (a
//! Build's `include` globs, a Deploy's sync target) without registering
//! the same OS watch twice, and a path stops being watched only once its
//! last subscriber unsubscribes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::GardenError;

pub struct ChangeEvent {
    pub paths: Vec<PathBuf>,
}

struct Subscription {
    watcher: RecommendedWatcher,
    ref_count: usize,
}

/// Tracks one OS-level watch per root path and fans out change events to
/// every subscriber of that path via an unbounded channel.
pub struct FileWatcher {
    subscriptions: Mutex<HashMap<PathBuf, Subscription>>,
    sender: mpsc::UnboundedSender<ChangeEvent>,
}

impl FileWatcher {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ChangeEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Arc::new(FileWatcher { subscriptions: Mutex::new(HashMap::new()), sender }), receiver)
    }

    /// Subscribes to changes under `path`, starting an OS watch if this is
    /// the first subscriber for that exact path.
    pub fn subscribe(&self, path: &Path) -> Result<(), GardenError> {
        let mut subs = self.subscriptions.lock().expect("file watcher lock poisoned");
        if let Some(existing) = subs.get_mut(path) {
            existing.ref_count += 1;
            return Ok(());
        }

        let sender = self.sender.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                let _ = sender.send(ChangeEvent { paths: event.paths });
            }
        })
        .map_err(|e| GardenError::Filesystem(std::io::Error::other(e.to_string())))?;

        watcher.watch(path, RecursiveMode::Recursive).map_err(|e| GardenError::Filesystem(std::io::Error::other(e.to_string())))?;
        subs.insert(path.to_path_buf(), Subscription { watcher, ref_count: 1 });
        Ok(())
    }

    /// Drops one reference to `path`'s subscription, tearing down the OS
    /// watch once the count reaches zero.
    pub fn unsubscribe(&self, path: &Path) {
        let mut subs = self.subscriptions.lock().expect("file watcher lock poisoned");
        if let Some(existing) = subs.get_mut(path) {
            existing.ref_count -= 1;
            if existing.ref_count == 0 {
                subs.remove(path);
            }
        }
    }

    pub fn subscriber_count(&self, path: &Path) -> usize {
        self.subscriptions.lock().expect("file watcher lock poisoned").get(path).map(|s| s.ref_count).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribing_twice_increments_ref_count() {
        let dir = tempfile::tempdir().unwrap();
        let (watcher, _rx) = FileWatcher::new();
        watcher.subscribe(dir.path()).unwrap();
        watcher.subscribe(dir.path()).unwrap();
        assert_eq!(watcher.subscriber_count(dir.path()), 2);
    }

    #[test]
    fn unsubscribe_tears_down_after_last_reference() {
        let dir = tempfile::tempdir().unwrap();
        let (watcher, _rx) = FileWatcher::new();
        watcher.subscribe(dir.path()).unwrap();
        watcher.subscribe(dir.path()).unwrap();
        watcher.unsubscribe(dir.path());
        assert_eq!(watcher.subscriber_count(dir.path()), 1);
        watcher.unsubscribe(dir.path());
        assert_eq!(watcher.subscriber_count(dir.path()), 0);
    }
}

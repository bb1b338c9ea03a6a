//! In-memory storage backend
//!
//! Directories are implicit: a directory exists while some file lives below it.

use super::{Storage, StorageEvent, StorageEventKind, Watch, WatchGuard};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc::{self, UnboundedSender};

#[derive(Debug)]
struct Subscriber {
    root: PathBuf,
    tx: UnboundedSender<StorageEvent>,
}

#[derive(Debug, Default)]
struct Inner {
    files: BTreeMap<PathBuf, String>,
    subscribers: Vec<Subscriber>,
}

impl Inner {
    fn notify(&mut self, event: StorageEvent) {
        self.subscribers.retain(|sub| {
            if !event.paths.iter().any(|p| p.starts_with(&sub.root)) {
                return !sub.tx.is_closed();
            }
            sub.tx.send(event.clone()).is_ok()
        });
    }
}

/// Storage held entirely in memory. Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave the map half-updated
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of live watch registrations
    pub fn watcher_count(&self) -> usize {
        let mut inner = self.lock();
        inner.subscribers.retain(|sub| !sub.tx.is_closed());
        inner.subscribers.len()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(self.lock().files.contains_key(path))
    }

    async fn read(&self, path: &Path) -> Result<String> {
        self.lock()
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| Error::NotFound(path.to_path_buf()))
    }

    async fn write(&self, path: &Path, contents: &str) -> Result<()> {
        let mut inner = self.lock();
        let created = inner.files.insert(path.to_path_buf(), contents.to_string()).is_none();
        if created {
            inner.notify(StorageEvent::new(StorageEventKind::Created, vec![path.to_path_buf()]));
        }
        Ok(())
    }

    async fn remove(&self, path: &Path) -> Result<bool> {
        let mut inner = self.lock();
        let removed = inner.files.remove(path).is_some();
        if removed {
            inner.notify(StorageEvent::new(StorageEventKind::Removed, vec![path.to_path_buf()]));
        }
        Ok(removed)
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let mut inner = self.lock();
        let contents = inner
            .files
            .remove(from)
            .ok_or_else(|| Error::NotFound(from.to_path_buf()))?;
        inner.files.insert(to.to_path_buf(), contents);
        inner.notify(StorageEvent::new(
            StorageEventKind::Renamed,
            vec![from.to_path_buf(), to.to_path_buf()],
        ));
        Ok(())
    }

    async fn list_dir(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        Ok(self
            .lock()
            .files
            .keys()
            .filter(|path| path.parent() == Some(dir))
            .cloned()
            .collect())
    }

    async fn list_all(&self, root: &Path) -> Result<Vec<PathBuf>> {
        Ok(self
            .lock()
            .files
            .keys()
            .filter(|path| path.starts_with(root) && path.as_path() != root)
            .cloned()
            .collect())
    }

    async fn watch(&self, root: &Path) -> Result<Watch> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().subscribers.push(Subscriber {
            root: root.to_path_buf(),
            tx,
        });
        Ok(Watch {
            events: rx,
            guard: WatchGuard::new(()),
        })
    }
}

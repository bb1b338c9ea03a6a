//! Storage Layer - the capability set notes are persisted through
//!
//! Backends:
//! - `FsStorage`: the real filesystem (tokio fs, notify for watching)
//! - `MemoryStorage`: an in-process map, for tests and embedding hosts
//!
//! Every operation suspends at the storage call; callers never get a
//! cross-operation lock from this layer.

pub mod fs;
pub mod memory;

pub use fs::FsStorage;
pub use memory::MemoryStorage;

use crate::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::UnboundedReceiver;

/// Kind of change observed under a watched directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageEventKind {
    Created,
    Removed,
    Renamed,
}

/// A storage-level change. Renames carry both the old and the new path when known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub kind: StorageEventKind,
    pub paths: Vec<PathBuf>,
}

impl StorageEvent {
    pub fn new(kind: StorageEventKind, paths: Vec<PathBuf>) -> Self {
        Self { kind, paths }
    }
}

/// Keeps a watch registration alive; dropping it releases the watch.
pub struct WatchGuard {
    _inner: Box<dyn Send>,
}

impl WatchGuard {
    pub fn new<T: Send + 'static>(inner: T) -> Self {
        Self { _inner: Box::new(inner) }
    }
}

impl std::fmt::Debug for WatchGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WatchGuard")
    }
}

/// An active watch: the event stream plus the guard that keeps it flowing.
#[derive(Debug)]
pub struct Watch {
    pub events: UnboundedReceiver<StorageEvent>,
    pub guard: WatchGuard,
}

/// Async storage adapter used by the note store.
///
/// Paths are absolute. Missing entries are not errors for `exists`,
/// `remove` and the listing operations.
#[async_trait]
pub trait Storage: Send + Sync + std::fmt::Debug {
    /// Whether a file exists at `path`
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Read a file; `Error::NotFound` if it is absent
    async fn read(&self, path: &Path) -> Result<String>;

    /// Write a file, creating parent directories first
    async fn write(&self, path: &Path, contents: &str) -> Result<()>;

    /// Remove a file. Returns `false` if it was already gone.
    async fn remove(&self, path: &Path) -> Result<bool>;

    /// Move a file, creating the destination's parent directories first
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Files directly inside `dir`; empty if `dir` does not exist
    async fn list_dir(&self, dir: &Path) -> Result<Vec<PathBuf>>;

    /// Files anywhere below `root`; empty if `root` does not exist
    async fn list_all(&self, root: &Path) -> Result<Vec<PathBuf>>;

    /// Watch `root` recursively for create/remove/rename events
    async fn watch(&self, root: &Path) -> Result<Watch>;
}

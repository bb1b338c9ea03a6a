//! Filesystem storage backend

use super::{Storage, StorageEvent, StorageEventKind, Watch, WatchGuard};
use crate::{Error, Result};
use async_trait::async_trait;
use ignore::WalkBuilder;
use notify::event::ModifyKind;
use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use std::io;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Storage backed by the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct FsStorage;

impl FsStorage {
    pub fn new() -> Self {
        Self
    }
}

async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}

fn translate(event: notify::Event) -> Option<StorageEvent> {
    let kind = match event.kind {
        EventKind::Create(_) => StorageEventKind::Created,
        EventKind::Remove(_) => StorageEventKind::Removed,
        EventKind::Modify(ModifyKind::Name(_)) => StorageEventKind::Renamed,
        _ => return None,
    };
    Some(StorageEvent::new(kind, event.paths))
}

#[async_trait]
impl Storage for FsStorage {
    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(tokio::fs::try_exists(path).await?)
    }

    async fn read(&self, path: &Path) -> Result<String> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => Ok(contents),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(Error::NotFound(path.to_path_buf())),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, path: &Path, contents: &str) -> Result<()> {
        ensure_parent(path).await?;
        tokio::fs::write(path, contents).await?;
        Ok(())
    }

    async fn remove(&self, path: &Path) -> Result<bool> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        ensure_parent(to).await?;
        match tokio::fs::rename(from, to).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(Error::NotFound(from.to_path_buf())),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_dir(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            // Entries can vanish between listing and stat
            match entry.file_type().await {
                Ok(ft) if ft.is_file() => files.push(entry.path()),
                Ok(_) => {}
                Err(e) => tracing::debug!("Skipping {}: {}", entry.path().display(), e),
            }
        }
        Ok(files)
    }

    async fn list_all(&self, root: &Path) -> Result<Vec<PathBuf>> {
        if !tokio::fs::try_exists(root).await? {
            return Ok(Vec::new());
        }

        let root = root.to_path_buf();
        let files = tokio::task::spawn_blocking(move || {
            WalkBuilder::new(&root)
                .standard_filters(false)
                .follow_links(false)
                .build()
                .filter_map(|entry| match entry {
                    Ok(entry) => Some(entry),
                    Err(e) => {
                        tracing::debug!("Skipping entry during walk: {}", e);
                        None
                    }
                })
                .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
                .map(|entry| entry.into_path())
                .collect::<Vec<_>>()
        })
        .await
        .map_err(io::Error::other)?;

        Ok(files)
    }

    async fn watch(&self, root: &Path) -> Result<Watch> {
        tokio::fs::create_dir_all(root).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    if let Some(event) = translate(event) {
                        let _ = tx.send(event);
                    }
                }
                Err(e) => tracing::warn!("watch error: {:?}", e),
            },
            Config::default(),
        )?;
        watcher.watch(root, RecursiveMode::Recursive)?;
        tracing::debug!("Watching {}", root.display());

        Ok(Watch {
            events: rx,
            guard: WatchGuard::new(watcher),
        })
    }
}

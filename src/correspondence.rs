//! Correspondence - which notes belong to which source file
//!
//! Nothing is cached here. Every query reads through to storage, so results
//! reflect whatever other writers did in the meantime.

use crate::note::{Note, NoteStore};
use crate::storage::StorageEventKind;
use crate::watcher::Subscription;
use crate::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// What happened to a note of a watched source file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteChangeKind {
    Created,
    Removed,
    Renamed,
}

impl From<StorageEventKind> for NoteChangeKind {
    fn from(kind: StorageEventKind) -> Self {
        match kind {
            StorageEventKind::Created => NoteChangeKind::Created,
            StorageEventKind::Removed => NoteChangeKind::Removed,
            StorageEventKind::Renamed => NoteChangeKind::Renamed,
        }
    }
}

/// A change to the correspondence set of a source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteChange {
    pub kind: NoteChangeKind,
    pub source: PathBuf,
    /// Note paths touched by the change that belong to `source`
    pub note_paths: Vec<PathBuf>,
}

impl NoteStore {
    /// All notes of `source`, ordered by first line then uid.
    pub async fn corresponding_notes(&self, source: &Path) -> Result<Vec<Note>> {
        let dir = self.codec().note_dir(source)?;
        let prefix = self.codec().file_prefix(source)?;

        let mut notes: Vec<Note> = self
            .storage()
            .list_dir(&dir)
            .await?
            .into_iter()
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(&prefix))
            })
            .filter_map(|path| self.note_from_path(&path).ok())
            .filter(|note| note.source() == source)
            .collect();

        notes.sort_by(|a, b| {
            a.from_line()
                .cmp(&b.from_line())
                .then_with(|| a.uid().cmp(b.uid()))
        });
        Ok(notes)
    }

    /// Notes of `source` whose range intersects `from..=to`
    pub async fn notes_overlapping(&self, source: &Path, from: u32, to: u32) -> Result<Vec<Note>> {
        Ok(self
            .corresponding_notes(source)
            .await?
            .into_iter()
            .filter(|note| note.is_overlapped(from, to))
            .collect())
    }

    /// Remove every note whose source file no longer exists.
    ///
    /// Returns the number of notes this call actually removed. Notes that
    /// disappear while the scan runs are skipped.
    pub async fn remove_orphaned_notes(&self) -> Result<usize> {
        let candidates = self.storage().list_all(self.codec().root()).await?;
        let mut source_exists: HashMap<PathBuf, bool> = HashMap::new();
        let mut removed = 0;

        for path in candidates {
            let Ok(note) = self.note_from_path(&path) else {
                tracing::debug!("Ignoring non-note file {}", path.display());
                continue;
            };

            let exists = match source_exists.get(note.source()) {
                Some(exists) => *exists,
                None => {
                    let exists = self.storage().exists(note.source()).await?;
                    source_exists.insert(note.source().to_path_buf(), exists);
                    exists
                }
            };
            if exists {
                continue;
            }

            if note.remove().await? {
                tracing::info!("Removed orphaned note {}", note.key());
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::info!("Orphan sweep removed {} notes", removed);
        }
        Ok(removed)
    }

    /// Call `on_change` whenever a note of `source` is created, removed or renamed.
    ///
    /// Delivery stops once the returned subscription is unsubscribed or dropped.
    pub async fn watch_corresponding_notes<F>(&self, source: &Path, on_change: F) -> Result<Subscription>
    where
        F: Fn(NoteChange) + Send + Sync + 'static,
    {
        // Validates the source path before any watch is registered
        self.codec().note_dir(source)?;

        let watch = self.storage().watch(self.codec().root()).await?;
        let codec = self.codec().clone();
        let source = source.to_path_buf();

        Ok(Subscription::spawn(watch, move |event| {
            let note_paths: Vec<PathBuf> = event
                .paths
                .into_iter()
                .filter(|path| codec.decode(path).is_ok_and(|key| key.source == source))
                .collect();
            if note_paths.is_empty() {
                return;
            }
            on_change(NoteChange {
                kind: event.kind.into(),
                source: source.clone(),
                note_paths,
            });
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{NoteKey, PathCodec};
    use crate::storage::{FsStorage, MemoryStorage, Storage};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::tempdir;

    fn memory_store() -> (NoteStore, MemoryStorage) {
        let storage = MemoryStorage::new();
        let store = NoteStore::new(PathCodec::new("/notes"), Arc::new(storage.clone()));
        (store, storage)
    }

    async fn create(store: &NoteStore, source: &str, from: u32, to: u32) -> Note {
        let note = store.note_for_range(Path::new(source), from, to).await.unwrap();
        note.write("body").await.unwrap();
        note
    }

    #[tokio::test]
    async fn test_corresponding_notes_are_ordered() {
        let (store, _) = memory_store();
        create(&store, "/proj/app.ts", 5, 8).await;
        create(&store, "/proj/app.ts", 1, 1).await;
        create(&store, "/proj/app.tsx", 2, 2).await;
        create(&store, "/proj/other.ts", 1, 1).await;

        let notes = store.corresponding_notes(Path::new("/proj/app.ts")).await.unwrap();
        let ranges: Vec<_> = notes.iter().map(|n| (n.from_line(), n.to_line())).collect();
        assert_eq!(ranges, vec![(1, 1), (5, 8)]);
    }

    #[tokio::test]
    async fn test_ties_are_broken_by_uid() {
        let (store, _) = memory_store();
        for uid in ["ccc", "aaa", "bbb"] {
            store
                .note(NoteKey::new("/proj/app.ts", 3, 3, uid))
                .unwrap()
                .write("x")
                .await
                .unwrap();
        }
        let notes = store.corresponding_notes(Path::new("/proj/app.ts")).await.unwrap();
        let uids: Vec<_> = notes.iter().map(|n| n.uid().to_string()).collect();
        assert_eq!(uids, vec!["aaa", "bbb", "ccc"]);
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty() {
        let dir = tempdir().unwrap();
        let store = NoteStore::on_disk(dir.path().join("never-created"));
        assert!(store.corresponding_notes(Path::new("/proj/app.ts")).await.unwrap().is_empty());
        assert_eq!(store.remove_orphaned_notes().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_notes_overlapping() {
        let (store, _) = memory_store();
        create(&store, "/proj/app.ts", 1, 1).await;
        create(&store, "/proj/app.ts", 5, 8).await;
        let hits = store.notes_overlapping(Path::new("/proj/app.ts"), 8, 20).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].from_line(), 5);
    }

    #[tokio::test]
    async fn test_orphan_sweep_on_disk() {
        let dir = tempdir().unwrap();
        let project = dir.path().join("proj");
        std::fs::create_dir_all(&project).unwrap();
        let app = project.join("app.ts");
        let kept = project.join("kept.ts");
        std::fs::write(&app, "a\nb\n").unwrap();
        std::fs::write(&kept, "c\n").unwrap();

        let store = NoteStore::on_disk(dir.path().join("notes"));
        for (from, to) in [(1, 1), (5, 8)] {
            store.note_for_range(&app, from, to).await.unwrap().write("x").await.unwrap();
        }
        store.note_for_range(&kept, 1, 1).await.unwrap().write("y").await.unwrap();
        std::fs::write(dir.path().join("notes").join("README"), "not a note").unwrap();

        assert_eq!(store.remove_orphaned_notes().await.unwrap(), 0);

        std::fs::remove_file(&app).unwrap();
        assert_eq!(store.remove_orphaned_notes().await.unwrap(), 2);
        assert_eq!(store.remove_orphaned_notes().await.unwrap(), 0);

        assert!(store.corresponding_notes(&app).await.unwrap().is_empty());
        assert_eq!(store.corresponding_notes(&kept).await.unwrap().len(), 1);
        assert!(dir.path().join("notes").join("README").exists());
    }

    #[tokio::test]
    async fn test_orphan_sweep_in_memory() {
        let (store, storage) = memory_store();
        storage.write(Path::new("/proj/app.ts"), "x").await.unwrap();
        create(&store, "/proj/app.ts", 1, 1).await;
        create(&store, "/proj/gone.ts", 1, 1).await;
        create(&store, "/proj/gone.ts", 2, 3).await;

        assert_eq!(store.remove_orphaned_notes().await.unwrap(), 2);
        assert_eq!(store.remove_orphaned_notes().await.unwrap(), 0);
        assert_eq!(store.corresponding_notes(Path::new("/proj/app.ts")).await.unwrap().len(), 1);
    }

    /// Storage whose `list_all` lets another writer act right after the listing is taken
    #[derive(Debug)]
    struct RacingStorage {
        inner: MemoryStorage,
        vanish: PathBuf,
        appear: PathBuf,
    }

    #[async_trait::async_trait]
    impl Storage for RacingStorage {
        async fn exists(&self, path: &Path) -> crate::Result<bool> {
            self.inner.exists(path).await
        }
        async fn read(&self, path: &Path) -> crate::Result<String> {
            self.inner.read(path).await
        }
        async fn write(&self, path: &Path, contents: &str) -> crate::Result<()> {
            self.inner.write(path, contents).await
        }
        async fn remove(&self, path: &Path) -> crate::Result<bool> {
            self.inner.remove(path).await
        }
        async fn rename(&self, from: &Path, to: &Path) -> crate::Result<()> {
            self.inner.rename(from, to).await
        }
        async fn list_dir(&self, dir: &Path) -> crate::Result<Vec<PathBuf>> {
            self.inner.list_dir(dir).await
        }
        async fn list_all(&self, root: &Path) -> crate::Result<Vec<PathBuf>> {
            let listed = self.inner.list_all(root).await?;
            self.inner.remove(&self.vanish).await?;
            self.inner.write(&self.appear, "late").await?;
            Ok(listed)
        }
        async fn watch(&self, root: &Path) -> crate::Result<crate::storage::Watch> {
            self.inner.watch(root).await
        }
    }

    #[tokio::test]
    async fn test_orphan_sweep_skips_notes_changed_mid_scan() {
        let (seed, storage) = memory_store();
        let gone = Path::new("/proj/gone.ts");
        let vanish = create(&seed, "/proj/gone.ts", 1, 1).await;
        create(&seed, "/proj/gone.ts", 2, 2).await;
        let appear = seed.note(NoteKey::new(gone, 9, 9, "late")).unwrap();

        let racing = RacingStorage {
            inner: storage.clone(),
            vanish: vanish.note_path().to_path_buf(),
            appear: appear.note_path().to_path_buf(),
        };
        let store = NoteStore::new(PathCodec::new("/notes"), Arc::new(racing));

        // The vanished note is not counted and the late note is left for the next sweep
        assert_eq!(store.remove_orphaned_notes().await.unwrap(), 1);
        assert!(appear.exists().await.unwrap());

        assert_eq!(seed.remove_orphaned_notes().await.unwrap(), 1);
        assert!(seed.corresponding_notes(gone).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_watch_filters_to_source() {
        let (store, storage) = memory_store();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let sub = store
            .watch_corresponding_notes(Path::new("/proj/app.ts"), move |change| {
                sink.lock().unwrap().push(change);
            })
            .await
            .unwrap();

        create(&store, "/proj/other.ts", 1, 1).await;
        let note = create(&store, "/proj/app.ts", 2, 2).await;
        note.relocate(3, 3).await.unwrap();

        for _ in 0..50 {
            if seen.lock().unwrap().len() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        {
            let seen = seen.lock().unwrap();
            assert_eq!(seen.len(), 2);
            assert_eq!(seen[0].kind, NoteChangeKind::Created);
            assert_eq!(seen[0].note_paths, vec![note.note_path().to_path_buf()]);
            assert_eq!(seen[1].kind, NoteChangeKind::Renamed);
            assert_eq!(seen[1].note_paths.len(), 2);
        }

        sub.unsubscribe();
        create(&store, "/proj/app.ts", 9, 9).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.lock().unwrap().len(), 2);
        assert_eq!(storage.watcher_count(), 0);
    }

    #[tokio::test]
    async fn test_watch_on_disk_sees_new_note() {
        let dir = tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        let store = NoteStore::new(PathCodec::new(base.join("notes")), Arc::new(FsStorage::new()));
        let source = base.join("app.ts");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        // Directories created after the watch starts may miss their first events
        std::fs::create_dir_all(store.codec().note_dir(&source).unwrap()).unwrap();

        let sub = store
            .watch_corresponding_notes(&source, move |change| sink.lock().unwrap().push(change))
            .await
            .unwrap();

        store.note_for_range(&source, 1, 1).await.unwrap().write("x").await.unwrap();

        for _ in 0..200 {
            if !seen.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(seen.lock().unwrap().iter().any(|c| c.kind == NoteChangeKind::Created));
        sub.unsubscribe();
        sub.unsubscribe();
    }
}

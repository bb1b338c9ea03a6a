//! Notes - one side-car file per annotated line range
//!
//! A `Note` is a value: its identity (`NoteKey`) and the path derived from it.
//! All storage access goes through the `NoteStore` the note was obtained from.

use crate::codec::{NoteKey, PathCodec};
use crate::host::HostCommand;
use crate::storage::Storage;
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Entry point for everything that reads or writes notes.
#[derive(Debug, Clone)]
pub struct NoteStore {
    codec: PathCodec,
    storage: Arc<dyn Storage>,
}

impl NoteStore {
    pub fn new(codec: PathCodec, storage: Arc<dyn Storage>) -> Self {
        Self { codec, storage }
    }

    /// Store rooted at `notes_root` on the local filesystem
    pub fn on_disk(notes_root: impl Into<PathBuf>) -> Self {
        Self::new(PathCodec::new(notes_root), Arc::new(crate::storage::FsStorage::new()))
    }

    pub fn codec(&self) -> &PathCodec {
        &self.codec
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Note over `source` lines `from..=to`.
    ///
    /// Reuses the uid of an existing note over exactly that range, otherwise
    /// mints a new one. Nothing is written.
    pub async fn note_for_range(&self, source: &Path, from: u32, to: u32) -> Result<Note> {
        if from > to {
            return Err(Error::InvalidRange { from, to });
        }

        let existing = self
            .corresponding_notes(source)
            .await?
            .into_iter()
            .find(|note| note.key.from == from && note.key.to == to);

        if let Some(note) = existing {
            tracing::debug!("Reusing note {}", note.key);
            return Ok(note);
        }

        let key = NoteKey::new(source, from, to, NoteKey::mint_uid());
        self.note(key)
    }

    /// Note stored at `note_path`
    pub fn note_from_path(&self, note_path: &Path) -> Result<Note> {
        let key = self
            .codec
            .decode(note_path)
            .map_err(|_| Error::InvalidNotePath(note_path.to_path_buf()))?;
        Ok(Note {
            key,
            path: note_path.to_path_buf(),
            store: self.clone(),
        })
    }

    /// Note with an explicit identity
    pub fn note(&self, key: NoteKey) -> Result<Note> {
        let path = self.codec.encode(&key)?;
        Ok(Note {
            key,
            path,
            store: self.clone(),
        })
    }
}

/// A single note: identity plus the path its body is stored at.
#[derive(Debug, Clone)]
pub struct Note {
    key: NoteKey,
    path: PathBuf,
    store: NoteStore,
}

impl PartialEq for Note {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.path == other.path
    }
}

impl Eq for Note {}

impl Note {
    pub fn key(&self) -> &NoteKey {
        &self.key
    }

    pub fn source(&self) -> &Path {
        &self.key.source
    }

    pub fn from_line(&self) -> u32 {
        self.key.from
    }

    pub fn to_line(&self) -> u32 {
        self.key.to
    }

    pub fn uid(&self) -> &str {
        &self.key.uid
    }

    /// Path of the note file
    pub fn note_path(&self) -> &Path {
        &self.path
    }

    /// Whether the note file exists in storage
    pub async fn exists(&self) -> Result<bool> {
        self.store.storage.exists(&self.path).await
    }

    /// Read the note body
    pub async fn read(&self) -> Result<String> {
        self.store.storage.read(&self.path).await
    }

    /// Write the note body, replacing any previous body
    pub async fn write(&self, body: &str) -> Result<()> {
        self.store.storage.write(&self.path, body).await
    }

    /// Delete the note file. Returns `false` if it was already gone.
    pub async fn remove(&self) -> Result<bool> {
        let removed = self.store.storage.remove(&self.path).await?;
        if removed {
            tracing::debug!("Removed note {}", self.key);
        }
        Ok(removed)
    }

    /// Ask the host to show this note. Fails if the note file does not exist.
    pub async fn open(&self) -> Result<HostCommand> {
        if !self.exists().await? {
            return Err(Error::NotFound(self.path.clone()));
        }
        Ok(HostCommand::ShowNote {
            note_path: self.path.clone(),
        })
    }

    /// Whether `from..=to` intersects this note's range (inclusive on both ends)
    pub fn is_overlapped(&self, from: u32, to: u32) -> bool {
        from <= self.key.to && self.key.from <= to
    }

    /// Notes kept at line 0 after their whole range was deleted
    pub fn is_pinned(&self) -> bool {
        self.key.from == 0 && self.key.to == 0
    }

    /// Move the note to a new range, keeping uid and body.
    pub async fn relocate(&self, from: u32, to: u32) -> Result<Note> {
        let moved = self.store.note(self.key.with_range(from, to))?;
        if moved.path != self.path {
            self.store.storage.rename(&self.path, &moved.path).await?;
            tracing::debug!("Moved note {} -> {}-{}", self.key, from, to);
        }
        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FsStorage, MemoryStorage};
    use tempfile::tempdir;

    fn memory_store() -> NoteStore {
        NoteStore::new(PathCodec::new("/notes"), Arc::new(MemoryStorage::new()))
    }

    #[tokio::test]
    async fn test_create_note_for_selection() {
        let dir = tempdir().unwrap();
        let store = NoteStore::new(PathCodec::new(dir.path().join("notes")), Arc::new(FsStorage::new()));
        let source = Path::new("/proj/app.ts");

        let note = store.note_for_range(source, 12, 12).await.unwrap();
        assert!(!note.exists().await.unwrap());
        note.write("remember this").await.unwrap();
        assert!(note.exists().await.unwrap());

        let decoded = store.codec().decode(note.note_path()).unwrap();
        assert_eq!(decoded, NoteKey::new(source, 12, 12, note.uid()));
        assert!(note.is_overlapped(12, 12));
        assert!(!note.is_overlapped(13, 13));
        assert_eq!(note.read().await.unwrap(), "remember this");
    }

    #[tokio::test]
    async fn test_existing_uid_is_reused() {
        let store = memory_store();
        let source = Path::new("/proj/app.ts");

        let first = store.note_for_range(source, 3, 4).await.unwrap();
        first.write("body").await.unwrap();
        let second = store.note_for_range(source, 3, 4).await.unwrap();
        assert_eq!(first, second);

        let other = store.note_for_range(source, 3, 5).await.unwrap();
        assert_ne!(other.uid(), first.uid());
    }

    #[tokio::test]
    async fn test_recreated_note_gets_new_uid() {
        let store = memory_store();
        let source = Path::new("/proj/app.ts");

        let first = store.note_for_range(source, 1, 1).await.unwrap();
        first.write("a").await.unwrap();
        first.remove().await.unwrap();
        let second = store.note_for_range(source, 1, 1).await.unwrap();
        assert_ne!(first.uid(), second.uid());
    }

    #[tokio::test]
    async fn test_read_and_remove_missing() {
        let store = memory_store();
        let note = store.note_for_range(Path::new("/proj/app.ts"), 1, 2).await.unwrap();
        assert!(matches!(note.read().await, Err(Error::NotFound(_))));
        assert!(matches!(note.open().await, Err(Error::NotFound(_))));
        assert!(!note.remove().await.unwrap());
    }

    #[tokio::test]
    async fn test_open_returns_show_command() {
        let store = memory_store();
        let note = store.note_for_range(Path::new("/proj/app.ts"), 1, 2).await.unwrap();
        note.write("x").await.unwrap();
        assert_eq!(
            note.open().await.unwrap(),
            HostCommand::ShowNote {
                note_path: note.note_path().to_path_buf()
            }
        );
    }

    #[test]
    fn test_note_from_path() {
        let store = memory_store();
        let note = store
            .note_from_path(Path::new("/notes/proj/app.ts~5-8~abc.md"))
            .unwrap();
        assert_eq!(note.source(), Path::new("/proj/app.ts"));
        assert_eq!((note.from_line(), note.to_line()), (5, 8));
        assert_eq!(note.uid(), "abc");

        assert!(matches!(
            store.note_from_path(Path::new("/elsewhere/app.ts~5-8~abc.md")),
            Err(Error::InvalidNotePath(_))
        ));
    }

    #[test]
    fn test_is_overlapped() {
        let store = memory_store();
        let note = store.note(NoteKey::new("/proj/app.ts", 5, 5, "u")).unwrap();
        assert!(note.is_overlapped(5, 10));
        assert!(note.is_overlapped(1, 5));
        assert!(!note.is_overlapped(6, 10));
        assert!(!note.is_overlapped(1, 4));

        let wide = store.note(NoteKey::new("/proj/app.ts", 5, 10, "u")).unwrap();
        let narrow = store.note(NoteKey::new("/proj/app.ts", 8, 12, "v")).unwrap();
        assert_eq!(wide.is_overlapped(8, 12), narrow.is_overlapped(5, 10));
    }

    #[tokio::test]
    async fn test_relocate_keeps_uid_and_body() {
        let store = memory_store();
        let note = store.note_for_range(Path::new("/proj/app.ts"), 4, 6).await.unwrap();
        note.write("body").await.unwrap();

        let moved = note.relocate(7, 9).await.unwrap();
        assert_eq!(moved.uid(), note.uid());
        assert_eq!((moved.from_line(), moved.to_line()), (7, 9));
        assert_eq!(moved.read().await.unwrap(), "body");
        assert!(!note.exists().await.unwrap());
    }
}

//! # linenotes - line-anchored side-car notes
//!
//! Notes are small text files bound to a line range of a source file.
//!
//! linenotes provides:
//! - A reversible codec that encodes a note's identity in its file path
//! - Note storage over a pluggable async storage adapter
//! - Correspondence queries (which notes belong to which file) and orphan sweeps
//! - Range reconciliation that moves notes along with edits to their source
//! - A message-passing boundary for editor hosts

pub mod codec;
pub mod storage;
pub mod note;
pub mod correspondence;
pub mod watcher;
pub mod reconcile;
pub mod sweep;
pub mod host;
pub mod config;
pub mod logging;

// Re-exports for convenient access
pub use codec::{NoteKey, PathCodec};
pub use note::{Note, NoteStore};
pub use correspondence::{NoteChange, NoteChangeKind};
pub use watcher::Subscription;
pub use reconcile::{LineRange, OrphanPolicy, RangeOutcome, reconcile};
pub use storage::{FsStorage, MemoryStorage, Storage};
pub use host::{HostCommand, HostEvent, Session};
pub use config::NotesConfig;

use std::path::PathBuf;

/// Result type alias for linenotes operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for linenotes operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{} is not a note path under {}", .path.display(), .root.display())]
    NotADescendant { path: PathBuf, root: PathBuf },

    #[error("Invalid note path: {}", .0.display())]
    InvalidNotePath(PathBuf),

    #[error("Note not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Invalid source path: {}", .0.display())]
    InvalidSourcePath(PathBuf),

    #[error("Invalid line range: {from}-{to}")]
    InvalidRange { from: u32, to: u32 },

    #[error("Invalid note uid: {0}")]
    InvalidUid(String),
}

//! Host boundary - editor notifications in, editor actions out
//!
//! The editor adapter turns each host notification into a `HostEvent`, hands
//! it to `Session::handle`, and carries out the `HostCommand`s it gets back.
//! Nothing here calls into the editor.

use crate::config::NotesConfig;
use crate::note::{Note, NoteStore};
use crate::reconcile::LineRange;
use crate::sweep::OrphanSweeper;
use crate::{Error, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One inbound notification from the host
#[derive(Debug, Clone)]
pub enum HostEvent {
    DocumentOpened { path: PathBuf, text: String },
    DocumentChanged { path: PathBuf, text: String },
    DocumentClosed { path: PathBuf },
    /// The user closed the editor showing a note file
    NoteClosed { note_path: PathBuf },
    /// Create (or reuse) a note over a selection and show it
    CreateNote { path: PathBuf, from: u32, to: u32 },
    /// Show every note overlapping a selection
    OpenNotes { path: PathBuf, from: u32, to: u32 },
    /// Delete every note overlapping a selection
    RemoveNotes { path: PathBuf, from: u32, to: u32 },
    ConfigChanged(NotesConfig),
    /// Run an orphan sweep now
    SweepTick,
}

/// One outbound action for the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostCommand {
    /// Replace the note decorations of an open document
    Decorate { path: PathBuf, ranges: Vec<LineRange> },
    /// Make a note file visible and editable
    ShowNote { note_path: PathBuf },
    OrphansRemoved { count: usize },
}

/// Per-host state: open document snapshots, configuration and the sweeper.
#[derive(Debug)]
pub struct Session {
    store: NoteStore,
    config: NotesConfig,
    documents: HashMap<PathBuf, String>,
    sweeper: Option<OrphanSweeper>,
}

impl Session {
    /// Create a session. Starts the orphan sweeper when the configuration
    /// enables it, which requires a tokio runtime.
    pub fn new(store: NoteStore, config: NotesConfig) -> Self {
        let mut session = Self {
            store,
            config: NotesConfig::default(),
            documents: HashMap::new(),
            sweeper: None,
        };
        session.configure(config);
        session
    }

    pub fn store(&self) -> &NoteStore {
        &self.store
    }

    pub fn config(&self) -> &NotesConfig {
        &self.config
    }

    pub fn is_sweeping(&self) -> bool {
        self.sweeper.as_ref().is_some_and(OrphanSweeper::is_running)
    }

    /// Apply a new configuration. The notes root is fixed for the lifetime of the session.
    pub fn configure(&mut self, config: NotesConfig) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.stop();
        }
        if let Some(interval) = config.sweep_interval() {
            self.sweeper = Some(OrphanSweeper::spawn(self.store.clone(), interval));
        }
        self.config = config;
    }

    pub async fn handle(&mut self, event: HostEvent) -> Result<Vec<HostCommand>> {
        match event {
            HostEvent::DocumentOpened { path, text } => {
                self.documents.insert(path.clone(), text);
                Ok(vec![self.decorate(&path).await?])
            }

            HostEvent::DocumentChanged { path, text } => {
                if let Some(previous) = self.documents.get(&path) {
                    self.store
                        .reconcile_document(&path, previous, &text, self.config.orphan_policy)
                        .await?;
                }
                self.documents.insert(path.clone(), text);
                Ok(vec![self.decorate(&path).await?])
            }

            HostEvent::DocumentClosed { path } => {
                self.documents.remove(&path);
                Ok(Vec::new())
            }

            HostEvent::NoteClosed { note_path } => {
                let note = self.store.note_from_path(&note_path)?;
                let body = match note.read().await {
                    Ok(body) => body,
                    Err(Error::NotFound(_)) => String::new(),
                    Err(e) => return Err(e),
                };
                if body.trim().is_empty() && note.remove().await? {
                    tracing::info!("Removed empty note {}", note.key());
                }
                self.decorate_if_open(note.source()).await
            }

            HostEvent::CreateNote { path, from, to } => {
                let note = self.store.note_for_range(&path, from, to).await?;
                if !note.exists().await? {
                    note.write("").await?;
                    tracing::info!("Created note {}", note.key());
                }
                let mut commands = vec![note.open().await?];
                commands.extend(self.decorate_if_open(&path).await?);
                Ok(commands)
            }

            HostEvent::OpenNotes { path, from, to } => {
                let mut commands = Vec::new();
                for note in self.store.notes_overlapping(&path, from, to).await? {
                    match note.open().await {
                        Ok(command) => commands.push(command),
                        Err(Error::NotFound(_)) => {}
                        Err(e) => return Err(e),
                    }
                }
                Ok(commands)
            }

            HostEvent::RemoveNotes { path, from, to } => {
                for note in self.store.notes_overlapping(&path, from, to).await? {
                    note.remove().await?;
                }
                self.decorate_if_open(&path).await
            }

            HostEvent::ConfigChanged(config) => {
                self.configure(config);
                Ok(Vec::new())
            }

            HostEvent::SweepTick => {
                let count = self.store.remove_orphaned_notes().await?;
                let mut commands = vec![HostCommand::OrphansRemoved { count }];
                if count > 0 {
                    let open: Vec<PathBuf> = self.documents.keys().cloned().collect();
                    for path in open {
                        commands.push(self.decorate(&path).await?);
                    }
                }
                Ok(commands)
            }
        }
    }

    async fn decorate(&self, path: &Path) -> Result<HostCommand> {
        let ranges = self
            .store
            .corresponding_notes(path)
            .await?
            .iter()
            .filter(|note| !note.is_pinned())
            .map(LineRange::from)
            .collect();
        Ok(HostCommand::Decorate {
            path: path.to_path_buf(),
            ranges,
        })
    }

    async fn decorate_if_open(&self, path: &Path) -> Result<Vec<HostCommand>> {
        if self.documents.contains_key(path) {
            Ok(vec![self.decorate(path).await?])
        } else {
            Ok(Vec::new())
        }
    }

    /// Notes of an open document, for hover and listing
    pub async fn notes_of(&self, path: &Path) -> Result<Vec<Note>> {
        self.store.corresponding_notes(path).await
    }
}

use crate::reconcile::OrphanPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub enabled: bool,
    pub interval_ms: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NotesConfig {
    pub notes_root: Option<PathBuf>,
    pub orphan_policy: OrphanPolicy,
    pub orphan_sweep: SweepConfig,
}

impl NotesConfig {
    /// Notes root, with relative paths resolved against `base`
    pub fn notes_root_in(&self, base: &Path) -> PathBuf {
        match &self.notes_root {
            Some(root) if root.is_absolute() => root.clone(),
            Some(root) => base.join(root),
            None => default_notes_root_in(base),
        }
    }

    /// Interval of the periodic orphan sweep, if it should run at all
    pub fn sweep_interval(&self) -> Option<Duration> {
        if self.orphan_sweep.enabled && self.orphan_sweep.interval_ms > 0 {
            Some(Duration::from_millis(self.orphan_sweep.interval_ms))
        } else {
            None
        }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("linenotes.toml")
}

pub fn default_notes_root_in(base: &Path) -> PathBuf {
    base.join(".linenotes").join("notes")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<NotesConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: NotesConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &NotesConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (pass force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, contents)?;
    Ok(())
}

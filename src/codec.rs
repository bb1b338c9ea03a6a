//! Note path codec - identity of a note encoded in its file path
//!
//! Format: `<root>/<seg>/.../<file-seg>~<from>-<to>~<uid>.md`
//!
//! Examples:
//! - `/proj/app.ts` lines 12..12 -> `<root>/proj/app.ts~12-12~18f3a2b01c47d2e9a1.md`
//! - `/tmp/a~b.rs` lines 1..3 -> `<root>/tmp/a%7Eb.rs~1-3~18f3a2b01c47d2e9a1.md`
//!
//! Every segment of the source path is escaped so that the delimiter `~`
//! never appears in it, which keeps the encoding reversible.

use crate::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};

/// Separates the file segment, the line range and the uid in a note filename.
pub const DELIMITER: char = '~';

/// Extension of every note file.
pub const NOTE_EXTENSION: &str = "md";

static NOTE_FILE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<name>[^~]+)~(?P<from>\d+)-(?P<to>\d+)~(?P<uid>[0-9a-z]+)\.md$")
        .expect("note filename grammar is a valid regex")
});

/// Full identity of a note.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NoteKey {
    /// Absolute path of the annotated source file
    pub source: PathBuf,
    /// First annotated line (1-indexed, inclusive)
    pub from: u32,
    /// Last annotated line (1-indexed, inclusive)
    pub to: u32,
    /// Distinguishes notes created over the same literal range
    pub uid: String,
}

impl NoteKey {
    pub fn new(source: impl Into<PathBuf>, from: u32, to: u32, uid: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            from,
            to,
            uid: uid.into(),
        }
    }

    /// Mint a fresh uid: current time in milliseconds plus a random suffix, lowercase hex.
    pub fn mint_uid() -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        format!("{:x}{:08x}", millis, rand::random::<u32>())
    }

    /// Same note over another range.
    pub fn with_range(&self, from: u32, to: u32) -> Self {
        Self {
            source: self.source.clone(),
            from,
            to,
            uid: self.uid.clone(),
        }
    }
}

impl fmt::Display for NoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}#{}", self.source.display(), self.from, self.to, self.uid)
    }
}

/// Maps note identities to paths under a notes root and back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathCodec {
    root: PathBuf,
}

impl PathCodec {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory under which all notes live
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Encode a note identity into its note path
    pub fn encode(&self, key: &NoteKey) -> Result<PathBuf> {
        if key.from > key.to {
            return Err(Error::InvalidRange { from: key.from, to: key.to });
        }
        if !is_valid_uid(&key.uid) {
            return Err(Error::InvalidUid(key.uid.clone()));
        }
        let (dir, file_segment) = self.split_source(&key.source)?;
        Ok(dir.join(format!(
            "{file_segment}{DELIMITER}{}-{}{DELIMITER}{}.{NOTE_EXTENSION}",
            key.from, key.to, key.uid
        )))
    }

    /// Decode a note path back into the identity it was encoded from
    pub fn decode(&self, note_path: &Path) -> Result<NoteKey> {
        let not_descendant = || Error::NotADescendant {
            path: note_path.to_path_buf(),
            root: self.root.clone(),
        };

        let relative = note_path.strip_prefix(&self.root).map_err(|_| not_descendant())?;

        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => segments.push(part.to_str().ok_or_else(not_descendant)?),
                _ => return Err(not_descendant()),
            }
        }

        let file_name = segments.pop().ok_or_else(not_descendant)?;
        let caps = NOTE_FILE_NAME.captures(file_name).ok_or_else(not_descendant)?;

        let from: u32 = caps["from"].parse().map_err(|_| not_descendant())?;
        let to: u32 = caps["to"].parse().map_err(|_| not_descendant())?;
        if from > to {
            return Err(not_descendant());
        }

        let mut decoded = Vec::with_capacity(segments.len() + 1);
        for segment in segments.iter().copied().chain(std::iter::once(&caps["name"])) {
            decoded.push(unescape_segment(segment).ok_or_else(not_descendant)?);
        }

        let key = NoteKey {
            source: join_source(&decoded),
            from,
            to,
            uid: caps["uid"].to_string(),
        };
        // Only the canonical spelling of an identity is a note path
        if self.encode(&key).map_err(|_| not_descendant())? != note_path {
            return Err(not_descendant());
        }
        Ok(key)
    }

    /// Whether `path` is shaped like a note path under this root. Storage is not consulted.
    pub fn is_note_path(&self, path: &Path) -> bool {
        self.decode(path).is_ok()
    }

    /// Directory holding every note of `source`
    pub fn note_dir(&self, source: &Path) -> Result<PathBuf> {
        self.split_source(source).map(|(dir, _)| dir)
    }

    /// Filename prefix shared by every note of `source`
    pub fn file_prefix(&self, source: &Path) -> Result<String> {
        self.split_source(source)
            .map(|(_, file_segment)| format!("{file_segment}{DELIMITER}"))
    }

    fn split_source(&self, source: &Path) -> Result<(PathBuf, String)> {
        let invalid = || Error::InvalidSourcePath(source.to_path_buf());

        if !source.is_absolute() {
            return Err(invalid());
        }

        let mut segments = Vec::new();
        for component in source.components() {
            match component {
                Component::Prefix(prefix) => {
                    segments.push(escape_segment(prefix.as_os_str().to_str().ok_or_else(invalid)?))
                }
                Component::RootDir | Component::CurDir => {}
                Component::ParentDir => return Err(invalid()),
                Component::Normal(part) => segments.push(escape_segment(part.to_str().ok_or_else(invalid)?)),
            }
        }

        let file_segment = segments.pop().ok_or_else(invalid)?;
        let mut dir = self.root.clone();
        dir.extend(segments);
        Ok((dir, file_segment))
    }
}

fn is_valid_uid(uid: &str) -> bool {
    !uid.is_empty() && uid.bytes().all(|b| b.is_ascii_digit() || b.is_ascii_lowercase())
}

fn needs_escape(byte: u8) -> bool {
    matches!(byte, b'%' | b'~' | b'\\' | b'/' | b':' | b'*' | b'?' | b'"' | b'<' | b'>' | b'|') || byte.is_ascii_control()
}

/// Escape one path segment so it contains no delimiter and no separator.
pub fn escape_segment(segment: &str) -> String {
    let all_dots = !segment.is_empty() && segment.bytes().all(|b| b == b'.');
    let mut out = String::with_capacity(segment.len());
    for ch in segment.chars() {
        if ch.is_ascii() && (needs_escape(ch as u8) || (all_dots && ch == '.')) {
            out.push_str(&format!("%{:02X}", ch as u8));
        } else {
            out.push(ch);
        }
    }
    out
}

/// Reverse of [`escape_segment`]. `None` on a malformed escape or a segment
/// that would not be a single normal path component.
pub fn unescape_segment(segment: &str) -> Option<String> {
    let bytes = segment.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hex = segment.get(i + 1..i + 3)?;
                if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                    return None;
                }
                out.push(u8::from_str_radix(hex, 16).ok()?);
                i += 3;
            }
            b'~' => return None,
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    let decoded = String::from_utf8(out).ok()?;
    if decoded.is_empty() || decoded == "." || decoded == ".." || decoded.contains('/') {
        return None;
    }
    Some(decoded)
}

#[cfg(not(windows))]
fn join_source(segments: &[String]) -> PathBuf {
    let mut path = PathBuf::from("/");
    path.extend(segments);
    path
}

#[cfg(windows)]
fn join_source(segments: &[String]) -> PathBuf {
    let mut path = PathBuf::new();
    for (i, segment) in segments.iter().enumerate() {
        if i == 0 && segment.ends_with(':') {
            path.push(format!("{segment}\\"));
        } else if i == 0 {
            path.push(format!("\\{segment}"));
        } else {
            path.push(segment);
        }
    }
    path
}

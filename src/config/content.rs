//! File-backed text held by the registry: the announcement and lazily
//! cached scripts/templates.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use arc_swap::ArcSwapOption;
use serde::Serialize;

/// Announcement text shown to users, with the file's modification time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Announcement {
    pub text: String,
    pub modified: Option<SystemTime>,
}

impl Announcement {
    /// Read the announcement file.
    ///
    /// Any failure yields an empty announcement with no date.
    pub fn read(path: &Path) -> Self {
        let read = fs::read_to_string(path).and_then(|text| Ok((text, fs::metadata(path)?.modified()?)));
        match read {
            Ok((text, modified)) => Self {
                text,
                modified: Some(modified),
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No announcement file");
                Self::default()
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Error while reading announcement file");
                Self::default()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Lazily read file content.
///
/// The first access reads the file and caches the text. `invalidate` only
/// clears the cache; the next access reads the file again. Concurrent first
/// reads may both hit the disk, the last one stored wins.
#[derive(Debug)]
pub struct FileCache {
    path: PathBuf,
    cached: ArcSwapOption<String>,
}

impl FileCache {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            cached: ArcSwapOption::empty(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cached text, reading the file when nothing is cached.
    ///
    /// A read failure returns an empty string and leaves the cache empty.
    pub fn get(&self) -> Arc<String> {
        if let Some(text) = self.cached.load_full() {
            return text;
        }
        match fs::read_to_string(&self.path) {
            Ok(text) => {
                let text = Arc::new(text);
                self.cached.store(Some(Arc::clone(&text)));
                text
            }
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "Error while loading file content");
                Arc::new(String::new())
            }
        }
    }

    pub fn invalidate(&self) {
        self.cached.store(None);
    }

    pub fn is_cached(&self) -> bool {
        self.cached.load().is_some()
    }
}

//! Chapter store: the fixed set of reference texts loaded at startup.

use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::constants::{CHAPTER_EXTENSION, CHAPTER_PREFIXES};
use crate::error::{ChatError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Chapter {
    pub name: String,
    pub text: String,
}

/// Read-only collection of chapters keyed by file name, in sorted file-name order.
///
/// Never empty: [`ChapterStore::load`] and [`ChapterStore::from_chapters`] refuse
/// to build a store without at least one chapter.
#[derive(Debug, Clone)]
pub struct ChapterStore {
    chapters: Vec<Chapter>,
}

/// Whether a file name follows the `chapter_*.txt` / `Chapter_*.txt` convention.
pub fn is_chapter_file(name: &str) -> bool {
    name.ends_with(CHAPTER_EXTENSION) && CHAPTER_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}

impl ChapterStore {
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let entries = fs::read_dir(dir).map_err(|e| {
            ChatError::Configuration(format!(
                "cannot read chapter directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                ChatError::Configuration(format!(
                    "cannot list chapter directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str().map(str::to_owned) else {
                warn!(name = ?file_name, "Skipping file with non UTF-8 name");
                continue;
            };
            if !is_chapter_file(&name) {
                continue;
            }
            // Follows symlinks, so linked chapter texts are loaded.
            if !fs::metadata(entry.path()).map(|m| m.is_file()).unwrap_or(false) {
                debug!(%name, "Skipping non-file chapter match");
                continue;
            }
            paths.push((name, entry.path()));
        }
        paths.sort_by(|a, b| a.0.cmp(&b.0));

        let mut chapters = Vec::with_capacity(paths.len());
        for (name, path) in paths {
            let text = fs::read_to_string(&path)
                .map_err(|source| ChatError::ChapterRead { path: path.clone(), source })?;
            debug!(%name, bytes = text.len(), "Loaded chapter");
            chapters.push(Chapter { name, text });
        }

        let store = Self::from_chapters(chapters).map_err(|_| {
            ChatError::Configuration(format!(
                "no files matching 'chapter_*.txt' or 'Chapter_*.txt' found in {}",
                dir.display()
            ))
        })?;
        info!(count = store.len(), dir = %dir.display(), "Chapter store ready");
        Ok(store)
    }

    /// Builds a store from chapters already in memory. Order is kept as given.
    pub fn from_chapters(chapters: Vec<Chapter>) -> Result<Self> {
        if chapters.is_empty() {
            return Err(ChatError::Configuration("no chapters available".to_string()));
        }
        Ok(Self { chapters })
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.chapters
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.text.as_str())
    }

    pub fn names(&self) -> Vec<String> {
        self.chapters.iter().map(|c| c.name.clone()).collect()
    }

    pub fn default_chapter(&self) -> &str {
        // Non-empty by construction.
        &self.chapters[0].name
    }

    pub fn len(&self) -> usize {
        self.chapters.len()
    }

    /// Always false for a constructed store.
    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chapter> {
        self.chapters.iter()
    }
}

//! Word-list sources and the collaborators that produce them.
//!
//! The search core only ever reads [`EntrySource`] values. Where they come from
//! is the business of a [`SourceLoader`]; [`DictionaryDir`] is the filesystem
//! implementation, one dictionary per file in a single directory.

use ignore::WalkBuilder;
use memmap2::Mmap;
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::config::{EncodingMode, SearchConfig};
use crate::errors::{SearchError, SearchResult};

// Files at or above this size are memory-mapped instead of read
pub(crate) const LARGE_FILE_THRESHOLD: u64 = 10 * 1024 * 1024; // 10MB

/// One word list: an identifier plus its lines.
///
/// Lines live behind an `Arc`, so cloning a source to hand it to another task
/// never copies the content.
#[derive(Debug, Clone)]
pub struct EntrySource {
    id: String,
    lines: Arc<[String]>,
}

impl EntrySource {
    pub fn new<I, S>(id: impl Into<String>, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    /// Splits `text` into lines, accepting both `\n` and `\r\n` endings
    pub fn from_text(id: impl Into<String>, text: &str) -> Self {
        Self::new(id, text.lines())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// The set of source ids a caller wants searched.
///
/// Stored sorted so scanners are dispatched in a stable order; the order has
/// no other meaning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSelection {
    ids: BTreeSet<String>,
}

impl SourceSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `id`; returns false if it was already selected
    pub fn select(&mut self, id: impl Into<String>) -> bool {
        self.ids.insert(id.into())
    }

    /// Removes `id`; returns false if it was not selected
    pub fn deselect(&mut self, id: &str) -> bool {
        self.ids.remove(id)
    }

    /// Flips the selection state of `id`, returning the new state
    pub fn toggle(&mut self, id: &str) -> bool {
        if self.ids.remove(id) {
            false
        } else {
            self.ids.insert(id.to_string());
            true
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    /// Builds a selection from glob patterns matched against `available`.
    ///
    /// A pattern without glob metacharacters is taken literally even when no
    /// such source exists, so the search can report it as missing.
    pub fn from_patterns<P: AsRef<str>>(available: &[String], patterns: &[P]) -> SearchResult<Self> {
        let mut selection = Self::new();
        for raw in patterns {
            let raw = raw.as_ref();
            if glob::Pattern::escape(raw) == raw {
                selection.select(raw);
                continue;
            }
            let pattern = glob::Pattern::new(raw)
                .map_err(|e| SearchError::invalid_pattern(format!("{}: {}", raw, e)))?;
            for id in available.iter().filter(|id| pattern.matches(id)) {
                selection.select(id.clone());
            }
        }
        Ok(selection)
    }
}

impl<S: Into<String>> FromIterator<S> for SourceSelection {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Enumerates and loads word lists by id
pub trait SourceLoader: Send + Sync {
    /// Ids of every available source, sorted
    fn list(&self) -> SearchResult<Vec<String>>;

    /// Loads one source
    fn load(&self, id: &str) -> SearchResult<EntrySource>;
}

/// Dictionaries stored as plain files in one directory
#[derive(Debug, Clone)]
pub struct DictionaryDir {
    root: PathBuf,
    encoding_mode: EncodingMode,
}

impl DictionaryDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            encoding_mode: EncodingMode::default(),
        }
    }

    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(&config.dictionary_dir).with_encoding(config.encoding_mode)
    }

    pub fn with_encoding(mut self, encoding_mode: EncodingMode) -> Self {
        self.encoding_mode = encoding_mode;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rejects anything that is not a single plain file name
    fn resolve(&self, id: &str) -> SearchResult<PathBuf> {
        let mut components = Path::new(id).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) if name == id => Ok(self.root.join(id)),
            _ => Err(SearchError::invalid_source_id(id)),
        }
    }

    fn decode(&self, id: &str, path: &Path, bytes: &[u8]) -> SearchResult<EntrySource> {
        let text = match self.encoding_mode {
            EncodingMode::FailFast => Cow::Borrowed(
                std::str::from_utf8(bytes).map_err(|e| SearchError::encoding_error(path, e))?,
            ),
            EncodingMode::Lossy => {
                let cow = String::from_utf8_lossy(bytes);
                if let Cow::Owned(_) = cow {
                    warn!("Invalid UTF-8 replaced in dictionary: {}", path.display());
                }
                cow
            }
        };
        Ok(EntrySource::from_text(id, &text))
    }
}

impl SourceLoader for DictionaryDir {
    fn list(&self) -> SearchResult<Vec<String>> {
        if !self.root.is_dir() {
            return Err(SearchError::config_error(format!(
                "Dictionary directory not found: {}",
                self.root.display()
            )));
        }

        let mut walker = WalkBuilder::new(&self.root);
        walker.standard_filters(false).hidden(true).max_depth(Some(1));

        let mut ids: Vec<String> = walker
            .build()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping unreadable dictionary entry: {}", e);
                    None
                }
            })
            .filter(|entry| entry.depth() == 1)
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .collect();
        ids.sort();

        debug!("Found {} dictionaries in {}", ids.len(), self.root.display());
        Ok(ids)
    }

    fn load(&self, id: &str) -> SearchResult<EntrySource> {
        let path = self.resolve(id)?;
        trace!("Loading dictionary: {}", path.display());

        let metadata = fs::metadata(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SearchError::source_not_found(id),
            _ => SearchError::source_unreadable(id, e),
        })?;
        if !metadata.is_file() {
            return Err(SearchError::source_not_found(id));
        }

        if metadata.len() >= LARGE_FILE_THRESHOLD {
            let file = File::open(&path).map_err(|e| SearchError::source_unreadable(id, e))?;
            let mmap = unsafe { Mmap::map(&file) }.map_err(|e| SearchError::source_unreadable(id, e))?;
            self.decode(id, &path, &mmap)
        } else {
            let bytes = fs::read(&path).map_err(|e| SearchError::source_unreadable(id, e))?;
            self.decode(id, &path, &bytes)
        }
    }
}

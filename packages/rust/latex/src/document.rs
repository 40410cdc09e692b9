//! Manuscript buffer with a derived line index.
//!
//! A [`Document`] is the single owner of a manuscript's text during a run.
//! Every mutation rebuilds the line index; nothing touches the disk until
//! [`Document::persist`].

use std::ops::Range;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use citefill_shared::{CitefillError, Result};

// ---------------------------------------------------------------------------
// LineIndex
// ---------------------------------------------------------------------------

/// Byte offsets of every line start. Lines and columns are 1-based; columns count chars.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    /// Number of lines (a trailing newline opens an empty last line).
    pub fn line_count(&self) -> usize {
        self.starts.len()
    }

    /// Byte offset where `line` starts.
    pub fn line_start(&self, line: usize) -> Option<usize> {
        line.checked_sub(1).and_then(|i| self.starts.get(i)).copied()
    }

    /// Byte range of `line`, excluding its line break.
    pub fn line_range(&self, text: &str, line: usize) -> Option<Range<usize>> {
        let start = self.line_start(line)?;
        let end = match self.starts.get(line) {
            Some(next) => next - 1,
            None => text.len(),
        };
        Some(start..end)
    }

    /// 1-based `(line, column)` of a byte offset.
    pub fn locate(&self, text: &str, offset: usize) -> (usize, usize) {
        let offset = offset.min(text.len());
        let line = self.starts.partition_point(|&s| s <= offset);
        let start = self.starts[line - 1];
        let column = text.get(start..offset).map_or(1, |s| s.chars().count() + 1);
        (line, column)
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// Lines added to a document by one insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Insertion {
    /// First line of the inserted block (in post-insertion coordinates).
    pub line: usize,
    /// Number of line breaks added.
    pub count: usize,
}

/// A mutable manuscript.
#[derive(Debug, Clone)]
pub struct Document {
    path: Option<PathBuf>,
    text: String,
    index: LineIndex,
    /// SHA-256 of the on-disk text at load (or last persist).
    fingerprint: Option<String>,
    dirty: bool,
}

impl Document {
    /// Load a manuscript from disk.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn open(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| CitefillError::io(path, e))?;
        debug!(bytes = text.len(), "document loaded");
        Ok(Self {
            path: Some(path.to_path_buf()),
            fingerprint: Some(fingerprint(&text)),
            index: LineIndex::new(&text),
            text,
            dirty: false,
        })
    }

    /// In-memory document with no backing file.
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            path: None,
            fingerprint: None,
            index: LineIndex::new(&text),
            text,
            dirty: false,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn line_index(&self) -> &LineIndex {
        &self.index
    }

    pub fn line_count(&self) -> usize {
        self.index.line_count()
    }

    /// Whether the buffer has unpersisted edits.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Replace a byte range with new text.
    pub fn splice(&mut self, range: Range<usize>, replacement: &str) {
        self.text.replace_range(range, replacement);
        self.index = LineIndex::new(&self.text);
        self.dirty = true;
    }

    /// Insert `content` (which should end with a line break) before `line`.
    ///
    /// A `line` past the last line appends at end-of-file, adding a separating
    /// line break when the buffer does not end with one.
    pub fn insert_before_line(&mut self, line: usize, content: &str) -> Insertion {
        let count = content.matches('\n').count();

        let inserted_at = match self.index.line_start(line.max(1)) {
            Some(offset) if line <= self.line_count() => {
                self.text.insert_str(offset, content);
                line.max(1)
            }
            _ => {
                if !self.text.is_empty() && !self.text.ends_with('\n') {
                    self.text.push('\n');
                }
                let at = LineIndex::new(&self.text).line_count();
                self.text.push_str(content);
                at
            }
        };

        self.index = LineIndex::new(&self.text);
        self.dirty = true;
        Insertion {
            line: inserted_at,
            count,
        }
    }

    /// Write the buffer back to its file.
    ///
    /// Refuses to overwrite a file whose content changed since it was loaded.
    #[instrument(skip_all, fields(path = ?self.path))]
    pub fn persist(&mut self) -> Result<()> {
        let Some(path) = self.path.clone() else {
            return Err(CitefillError::validation(
                "cannot persist a document that has no backing file",
            ));
        };

        if let Some(expected) = &self.fingerprint {
            let on_disk = std::fs::read_to_string(&path).map_err(|e| CitefillError::io(&path, e))?;
            if &fingerprint(&on_disk) != expected {
                return Err(CitefillError::ConcurrentModification { path });
            }
        }

        std::fs::write(&path, &self.text).map_err(|e| CitefillError::io(&path, e))?;
        self.fingerprint = Some(fingerprint(&self.text));
        self.dirty = false;
        info!(bytes = self.text.len(), "document persisted");
        Ok(())
    }
}

/// SHA-256 hex digest of a document's text.
fn fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

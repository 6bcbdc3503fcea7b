//! Document mutation interface and the adapters shipped with the crate.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::app::locate::floor_char_boundary;

/// Mutable text store driven by the applicator and the review state machine.
///
/// Positions are 0-based UTF-8 byte offsets into the current value at call time. The engine
/// only passes offsets on character boundaries.
pub trait Document {
    /// Snapshot of the current text.
    fn value(&self) -> String;

    fn set_value(&mut self, text: &str);

    /// Replace `from..to` with `text`.
    fn replace_range(&mut self, text: &str, from: usize, to: usize);

    fn insert_text(&mut self, position: usize, text: &str) {
        self.replace_range(text, position, position);
    }

    fn delete_text(&mut self, position: usize, length: usize) {
        self.replace_range("", position, position.saturating_add(length));
    }
}

/// In-memory document backed by a `String`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextBuffer {
    text: String,
}

impl TextBuffer {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl From<&str> for TextBuffer {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TextBuffer {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl Document for TextBuffer {
    fn value(&self) -> String {
        self.text.clone()
    }

    fn set_value(&mut self, text: &str) {
        self.text = text.to_owned();
    }

    fn replace_range(&mut self, text: &str, from: usize, to: usize) {
        // Positions past the end clamp to the end.
        let from = floor_char_boundary(&self.text, from);
        let to = floor_char_boundary(&self.text, to.max(from));
        self.text.replace_range(from..to, text);
    }
}

/// A document loaded from disk. Mutations stay in memory until [`FileDocument::save`].
#[derive(Debug, Clone)]
pub struct FileDocument {
    path: PathBuf,
    buffer: TextBuffer,
    original: String,
}

impl FileDocument {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read document {}", path.display()))?;
        Ok(Self {
            path,
            buffer: TextBuffer::new(text.clone()),
            original: text,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns whether the in-memory text differs from what was loaded or last saved.
    pub fn is_dirty(&self) -> bool {
        self.buffer.as_str() != self.original
    }

    /// Write the current text back to the file when it changed. Returns whether it wrote.
    pub fn save(&mut self) -> Result<bool> {
        if !self.is_dirty() {
            return Ok(false);
        }
        fs::write(&self.path, self.buffer.as_str())
            .with_context(|| format!("failed to write document {}", self.path.display()))?;
        self.original = self.buffer.as_str().to_owned();
        Ok(true)
    }
}

impl Document for FileDocument {
    fn value(&self) -> String {
        self.buffer.value()
    }

    fn set_value(&mut self, text: &str) {
        self.buffer.set_value(text);
    }

    fn replace_range(&mut self, text: &str, from: usize, to: usize) {
        self.buffer.replace_range(text, from, to);
    }
}

// src/value.rs
//
// The payload carried by an auxiliary (destination-side) id in `id_map`.
// Most entity kinds (authors, tags, series, languages, publishers, ...)
// are plain display strings; a few carry structured data.

use serde::{Deserialize, Serialize};

/// A file-format record: one format file attached to a book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub filename: String,
    pub size: u64,
    /// Opaque, driver-owned location string (e.g. a filesystem path).
    pub location: String,
}

/// A cover-image record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverRecord {
    pub location: String,
}

/// The value side of an `id_map` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Text(String),
    Int(i64),
    Rating(u8),
    File(FileRecord),
    Cover(CoverRecord),
}

impl Value {
    /// The display string used for rename/merge case-fold matching and for
    /// sort-key construction. Returns `None` for values with no natural
    /// string form (the fallback-and-skip behaviour `rename_item` uses for
    /// entries it can't case-fold).
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn case_fold(&self) -> Option<String> {
        self.as_text().map(|s| s.to_lowercase())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

//! Decoded part and form values.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Backing storage of a decoded file part.
///
/// Exactly one representation is chosen before the value is yielded: bytes
/// stay buffered when the part's total size stayed at or below the configured
/// in-memory ceiling, and live in a storage file otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileBody {
    /// Content retained in memory.
    Buffered(Vec<u8>),
    /// Content written to a storage file.
    Spilled(PathBuf),
}

/// A decoded file part.
#[derive(Debug, Clone)]
pub struct FormFile {
    /// Field name from Content-Disposition.
    pub name: String,
    /// Original file name from the disposition's filename parameter.
    pub original_name: Option<String>,
    /// Declared content type of the part.
    pub content_type: String,
    /// Where the content ended up.
    pub body: FileBody,
}

impl FormFile {
    /// In-memory content, if the part never spilled to storage.
    #[must_use]
    pub fn content(&self) -> Option<&[u8]> {
        match &self.body {
            FileBody::Buffered(bytes) => Some(bytes),
            FileBody::Spilled(_) => None,
        }
    }

    /// Path of the storage file, if the part spilled.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match &self.body {
            FileBody::Buffered(_) => None,
            FileBody::Spilled(path) => Some(path),
        }
    }

    /// Returns true when the content lives in a storage file.
    #[must_use]
    pub fn is_spilled(&self) -> bool {
        matches!(self.body, FileBody::Spilled(_))
    }

    /// Size of the content in bytes.
    ///
    /// For spilled parts this consults the file system; an unreadable file
    /// reports 0.
    #[must_use]
    pub fn size(&self) -> usize {
        match &self.body {
            FileBody::Buffered(bytes) => bytes.len(),
            FileBody::Spilled(path) => std::fs::metadata(path)
                .map(|m| usize::try_from(m.len()).unwrap_or(usize::MAX))
                .unwrap_or(0),
        }
    }

    /// Read the full content regardless of backing.
    pub fn bytes(&self) -> std::io::Result<Vec<u8>> {
        match &self.body {
            FileBody::Buffered(bytes) => Ok(bytes.clone()),
            FileBody::Spilled(path) => std::fs::read(path),
        }
    }
}

/// Value of a single decoded part, decided at header-parse time.
#[derive(Debug)]
pub enum PartData {
    /// A text field (no content-type header on the part).
    Field(String),
    /// A file payload (content-type header present).
    File(FormFile),
}

/// One decoded part, as yielded by lazy consumption.
#[derive(Debug)]
pub struct FormPart {
    /// Field name from Content-Disposition.
    pub name: String,
    /// The part's decoded value.
    pub data: PartData,
}

/// Result of a buffering read: every field and file of the body.
///
/// Duplicate field names keep only the last observed value; file parts are
/// never deduplicated and appear in arrival order.
#[derive(Debug, Default)]
pub struct FormData {
    /// Field name to value.
    pub fields: HashMap<String, String>,
    /// File parts in arrival order.
    pub files: Vec<FormFile>,
}

impl FormData {
    /// Create an empty result.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a field value by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// All file parts, in arrival order.
    #[must_use]
    pub fn files(&self) -> &[FormFile] {
        &self.files
    }

    /// All file parts sharing a field name, in arrival order.
    pub fn files_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a FormFile> {
        self.files.iter().filter(move |f| f.name == name)
    }

    /// Total number of fields and files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len() + self.files.len()
    }

    /// Returns true if the body contained no parts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.files.is_empty()
    }

    /// Consume the result, returning fields and files.
    #[must_use]
    pub fn into_parts(self) -> (HashMap<String, String>, Vec<FormFile>) {
        (self.fields, self.files)
    }
}

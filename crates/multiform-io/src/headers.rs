//! Header block parsing.
//!
//! A part's header block is a run of colon-separated header lines terminated
//! by a blank line. Header names are case-insensitive; [`HeaderMap`] stores
//! them lowercased.

use std::collections::HashMap;

use crate::line_reader::{EolMode, LineReader};

/// Errors raised while parsing a header block.
#[derive(Debug)]
pub enum HeaderError {
    /// The stream ended before the blank line terminating the block.
    UnexpectedEof,
    /// A header line was not valid UTF-8.
    InvalidUtf8,
    /// I/O failure reading from the underlying source.
    Read {
        /// Description of the failure.
        detail: String,
    },
}

impl std::fmt::Display for HeaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnexpectedEof => write!(f, "unexpected end of stream in header block"),
            Self::InvalidUtf8 => write!(f, "invalid UTF-8 in header line"),
            Self::Read { detail } => write!(f, "header read error: {detail}"),
        }
    }
}

impl std::error::Error for HeaderError {}

/// Case-insensitive header collection.
#[derive(Debug, Default)]
pub struct HeaderMap {
    inner: HashMap<String, String>,
}

impl HeaderMap {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a header value by name (case-insensitive).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Returns true if the header is present (case-insensitive).
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(&name.to_ascii_lowercase())
    }

    /// Insert a header, lowercasing its name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.insert(name.into().to_ascii_lowercase(), value.into());
    }

    /// Iterate over all headers as (name, value) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Returns the number of headers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if there are no headers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Consume lines from the reader up to (and including) a blank line,
/// collecting colon-separated headers into a [`HeaderMap`].
///
/// Lines without a colon are skipped. Names and values are trimmed of
/// surrounding whitespace.
///
/// # Errors
///
/// Returns [`HeaderError::UnexpectedEof`] if the stream ends before the blank
/// line, and [`HeaderError::InvalidUtf8`] for non-UTF-8 header lines.
pub fn parse_header_block<R: std::io::Read>(
    reader: &mut LineReader<R>,
) -> Result<HeaderMap, HeaderError> {
    let mut headers = HeaderMap::new();

    loop {
        let line = reader
            .next_line(EolMode::Strip)
            .map_err(|e| HeaderError::Read {
                detail: e.to_string(),
            })?
            .ok_or(HeaderError::UnexpectedEof)?;

        if line.is_empty() {
            return Ok(headers);
        }

        let text = std::str::from_utf8(&line).map_err(|_| HeaderError::InvalidUtf8)?;
        if let Some((name, value)) = text.split_once(':') {
            headers.insert(name.trim(), value.trim());
        }
    }
}

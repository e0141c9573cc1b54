//! Decoder configuration.

use std::path::{Path, PathBuf};

pub use multiform_io::DEFAULT_BUFFER_SIZE;

/// Default maximum size of any single file part (10MB).
pub const DEFAULT_MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

/// Default in-memory ceiling per file part before spillover to storage (1MB).
pub const DEFAULT_MAX_SIZE: usize = 1024 * 1024;

/// Configuration for multipart decoding.
#[derive(Debug, Clone)]
pub struct FormConfig {
    /// Read chunk size for the underlying line source.
    buffer_size: usize,
    /// Hard cap on any single file part's byte count.
    max_file_size: usize,
    /// In-memory ceiling per file part; 0 disables in-memory retention.
    max_size: usize,
    /// Destination directory for spilled files.
    out_path: Option<PathBuf>,
    /// Prepended to generated file names.
    prefix: String,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_size: DEFAULT_MAX_SIZE,
            out_path: None,
            prefix: String::new(),
        }
    }
}

impl FormConfig {
    /// Create a new configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the read chunk size for the line source.
    #[must_use]
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Set the hard cap on any single file part's byte count.
    ///
    /// Exceeding it aborts the whole decode.
    #[must_use]
    pub fn max_file_size(mut self, size: usize) -> Self {
        self.max_file_size = size;
        self
    }

    /// Set the in-memory ceiling per file part before spillover to storage.
    ///
    /// A value of 0 disables in-memory retention entirely; every file part
    /// goes straight to storage.
    #[must_use]
    pub fn max_size(mut self, size: usize) -> Self {
        self.max_size = size;
        self
    }

    /// Set the destination directory for spilled files.
    ///
    /// When unset, a unique directory under the system temp dir is derived
    /// per decoder instance. The directory is created lazily, on first use.
    #[must_use]
    pub fn out_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.out_path = Some(path.into());
        self
    }

    /// Set the string prepended to generated file names.
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Get the read chunk size.
    #[must_use]
    pub fn get_buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Get the maximum file part size.
    #[must_use]
    pub fn get_max_file_size(&self) -> usize {
        self.max_file_size
    }

    /// Get the in-memory ceiling per file part.
    #[must_use]
    pub fn get_max_size(&self) -> usize {
        self.max_size
    }

    /// Get the configured output directory, if any.
    #[must_use]
    pub fn get_out_path(&self) -> Option<&Path> {
        self.out_path.as_deref()
    }

    /// Get the generated-file-name prefix.
    #[must_use]
    pub fn get_prefix(&self) -> &str {
        &self.prefix
    }
}

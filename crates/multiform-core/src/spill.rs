//! Spillover buffering for file parts.
//!
//! Each file part owns one [`SpillBuffer`]. Bytes accumulate in memory until
//! the configured ceiling would be exceeded, at which point the buffer is
//! flushed to a freshly created storage file and all further bytes append to
//! it directly. The transition is one-way and happens at most once per part.
//!
//! An unfinalized buffer removes its partially written file on drop, so a
//! decode aborted mid-part leaves no orphan behind. Finalized values own
//! their path; the decoder never deletes a yielded file.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::FormError;
use crate::form::FileBody;

static SPILL_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Derive a unique default output directory for one decoder instance.
pub(crate) fn default_out_dir() -> PathBuf {
    let ts_nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let counter = SPILL_COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!(
        "multiform-{}-{ts_nanos}-{counter}",
        std::process::id()
    ))
}

/// Create a uniquely named storage file in `dir`.
///
/// The name is `<prefix><pid>-<nanos>-<counter>.<ext>` with the extension
/// derived from the part's declared content type. `create_new` guards
/// against collisions when several decoders share an explicit directory.
fn create_spill_file(
    dir: &Path,
    prefix: &str,
    content_type: &str,
) -> Result<(PathBuf, File), FormError> {
    let ext = extension_for_mime(content_type);
    let ts_nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();

    for _ in 0..32 {
        let counter = SPILL_COUNTER.fetch_add(1, Ordering::Relaxed);
        let candidate = dir.join(format!(
            "{prefix}{}-{ts_nanos}-{counter}.{ext}",
            std::process::id()
        ));

        match OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&candidate)
        {
            Ok(file) => return Ok((candidate, file)),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(err) => return Err(FormError::storage("failed to create spill file", &err)),
        }
    }

    Err(FormError::Storage {
        detail: "failed to allocate unique spill file name".to_string(),
        kind: std::io::ErrorKind::AlreadyExists,
    })
}

/// Map a declared content type to a file extension for generated names.
fn extension_for_mime(content_type: &str) -> &'static str {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "text/plain" => "txt",
        "text/html" => "html",
        "text/css" => "css",
        "text/csv" => "csv",
        "text/xml" | "application/xml" => "xml",
        "application/json" => "json",
        "application/pdf" => "pdf",
        "application/zip" => "zip",
        "application/gzip" => "gz",
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        "audio/mpeg" => "mp3",
        "video/mp4" => "mp4",
        _ => "bin",
    }
}

#[derive(Debug)]
enum SpillState {
    Buffered(Vec<u8>),
    Spilled { path: PathBuf, file: File },
}

/// Growable byte accumulator for one file part, with one-way spillover.
#[derive(Debug)]
pub(crate) struct SpillBuffer {
    state: SpillState,
    size: usize,
    finalized: bool,
}

impl SpillBuffer {
    /// Start accumulating in memory.
    pub(crate) fn new() -> Self {
        Self {
            state: SpillState::Buffered(Vec::new()),
            size: 0,
            finalized: false,
        }
    }

    /// Bytes accumulated so far.
    pub(crate) fn size(&self) -> usize {
        self.size
    }

    /// Returns true once the buffer has transitioned to storage.
    pub(crate) fn is_spilled(&self) -> bool {
        matches!(self.state, SpillState::Spilled { .. })
    }

    /// Returns true if appending `incoming` more bytes would push the
    /// in-memory buffer past `max_size`.
    pub(crate) fn would_exceed(&self, incoming: usize, max_size: usize) -> bool {
        match &self.state {
            SpillState::Buffered(buf) => buf.len().saturating_add(incoming) > max_size,
            SpillState::Spilled { .. } => false,
        }
    }

    /// Transition to storage: create the file in `dir`, flush any buffered
    /// bytes to it as a single write, and discard the buffer.
    ///
    /// Must be called at most once.
    pub(crate) fn spill_to(
        &mut self,
        dir: &Path,
        prefix: &str,
        content_type: &str,
    ) -> Result<(), FormError> {
        let SpillState::Buffered(buf) = &mut self.state else {
            debug_assert!(false, "spill_to called twice");
            return Ok(());
        };
        let pending = std::mem::take(buf);

        let (path, mut file) = create_spill_file(dir, prefix, content_type)?;
        if !pending.is_empty() {
            if let Err(err) = file.write_all(&pending) {
                drop(file);
                let _ = std::fs::remove_file(&path);
                return Err(FormError::storage("failed to flush spill file", &err));
            }
        }
        self.state = SpillState::Spilled { path, file };
        Ok(())
    }

    /// Append a chunk to the current backing.
    pub(crate) fn append(&mut self, chunk: &[u8]) -> Result<(), FormError> {
        if chunk.is_empty() {
            return Ok(());
        }
        match &mut self.state {
            SpillState::Buffered(buf) => buf.extend_from_slice(chunk),
            SpillState::Spilled { file, .. } => file
                .write_all(chunk)
                .map_err(|e| FormError::storage("failed to append spill file", &e))?,
        }
        self.size = self.size.saturating_add(chunk.len());
        Ok(())
    }

    /// Finalize into the part's backing value, flushing and closing any open
    /// file handle.
    pub(crate) fn into_body(mut self) -> Result<FileBody, FormError> {
        self.finalized = true;
        let state = std::mem::replace(&mut self.state, SpillState::Buffered(Vec::new()));
        match state {
            SpillState::Buffered(bytes) => Ok(FileBody::Buffered(bytes)),
            SpillState::Spilled { path, mut file } => {
                file.flush()
                    .map_err(|e| FormError::storage("failed to flush spill file", &e))?;
                drop(file);
                Ok(FileBody::Spilled(path))
            }
        }
    }
}

impl Drop for SpillBuffer {
    fn drop(&mut self) {
        if self.finalized {
            return;
        }
        if let SpillState::Spilled { path, .. } = &self.state {
            let _ = std::fs::remove_file(path);
        }
    }
}

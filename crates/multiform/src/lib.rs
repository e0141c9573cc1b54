//! Streaming decoder for `multipart/form-data` bodies.
//!
//! multiform turns a sequential byte source plus a declared boundary token
//! into a sequence of named parts:
//!
//! - **Fields**: short text values, decoded with interior line breaks
//!   preserved
//! - **Files**: binary payloads held in memory up to a configured ceiling,
//!   then spilled to uniquely named storage files
//!
//! # Quick Start
//!
//! ```ignore
//! use multiform::{FormConfig, FormReader};
//!
//! let config = FormConfig::new()
//!     .max_size(512 * 1024)          // in-memory ceiling per file part
//!     .max_file_size(20 * 1024 * 1024)
//!     .out_path("/var/tmp/uploads");
//!
//! let mut reader = FormReader::new(content_type, body, config)?;
//! let form = futures_executor::block_on(reader.read_form())?;
//!
//! if let Some(name) = form.field("name") {
//!     println!("name = {name}");
//! }
//! for file in form.files() {
//!     println!("{} -> {} bytes", file.name, file.size());
//! }
//! ```
//!
//! For large bodies, [`FormReader::parts`] exposes the same sequence lazily,
//! one part at a time, under the same single-use guard.
//!
//! # Crate Structure
//!
//! - [`multiform_core`]: boundary handling, the part state machine,
//!   spillover buffering, and the two consumption modes
//! - [`multiform_io`]: the buffered line reader and header block parser the
//!   decoder reads through

#![forbid(unsafe_code)]

// Re-export crates
pub use multiform_core as core;
pub use multiform_io as io;

// Re-export commonly used types
pub use multiform_core::{
    BoundaryMatch, BoundaryTokens, FileBody, FormConfig, FormData, FormError, FormFile, FormPart,
    FormReader, PartData, Parts, parse_boundary,
};
pub use multiform_io::{CappedLine, EolMode, HeaderMap, LineReader, parse_header_block};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{
        FileBody, FormConfig, FormData, FormError, FormFile, FormPart, FormReader, PartData,
    };
}

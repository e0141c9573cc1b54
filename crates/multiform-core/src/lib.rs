//! Streaming decoder for `multipart/form-data` bodies.
//!
//! This crate turns a sequential byte source plus a declared boundary token
//! into a sequence of named parts. Each part is either a short text field or
//! a (possibly large) file payload whose bytes stay in memory up to a
//! configured ceiling and spill to a storage file beyond it.
//!
//! # Design Principles
//!
//! - Single pass: one decoder instance processes exactly one body, once
//! - Bounded memory: per-part size caps are enforced eagerly, before the
//!   part's boundary is found
//! - Explicit failure policy: every error kind is fatal for the whole decode
//!   except denied storage permissions during a buffering read, which degrade
//!   to a partial result
//!
//! # Example
//!
//! ```ignore
//! use multiform_core::{FormConfig, FormReader};
//!
//! let reader = body_stream; // impl std::io::Read
//! let mut form = FormReader::new(content_type, reader, FormConfig::default())?;
//! let data = futures_executor::block_on(form.read_form())?;
//!
//! for (name, value) in &data.fields {
//!     println!("{name} = {value}");
//! }
//! ```

#![forbid(unsafe_code)]

mod boundary;
mod config;
mod error;
mod form;
mod reader;
mod spill;

pub use boundary::{BoundaryMatch, BoundaryTokens, parse_boundary};
pub use config::{
    DEFAULT_BUFFER_SIZE, DEFAULT_MAX_FILE_SIZE, DEFAULT_MAX_SIZE, FormConfig,
};
pub use error::FormError;
pub use form::{FileBody, FormData, FormFile, FormPart, PartData};
pub use reader::{FormReader, Parts};

//! Line-oriented byte reading and header block parsing for multiform.
//!
//! This crate provides the two wire-level collaborators the multipart decoder
//! reads through:
//!
//! - [`LineReader`]: a buffered, line-oriented reader over any
//!   [`std::io::Read`], with a mode that either strips or preserves the
//!   trailing end-of-line bytes of each yielded line
//! - [`parse_header_block`]: consumes lines up to a blank line and returns a
//!   case-insensitive [`HeaderMap`]
//!
//! Neither layer knows anything about boundaries or parts; they see only a
//! sequential byte source.

#![forbid(unsafe_code)]

mod headers;
mod line_reader;

pub use headers::{HeaderError, HeaderMap, parse_header_block};
pub use line_reader::{CappedLine, DEFAULT_BUFFER_SIZE, EolMode, LineReader};

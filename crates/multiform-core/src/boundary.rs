//! Boundary extraction and matching.
//!
//! The boundary token is declared as a parameter of the body's content type:
//!
//! ```text
//! multipart/form-data; boundary=----WebKitFormBoundary7MA4YWxkTrZu0gW
//! ```
//!
//! From it the decoder derives the two byte patterns it must recognize, the
//! part marker `--<boundary>` and the final marker `--<boundary>--`.

use crate::error::FormError;

/// Extract the `boundary` parameter from a declared content-type value.
///
/// The parameter name is matched case-insensitively; the value may be bare or
/// quoted, and quoted values may contain backslash-escaped characters.
///
/// # Errors
///
/// Returns [`FormError::MalformedContentType`] if no usable boundary
/// parameter is present.
pub fn parse_boundary(content_type: &str) -> Result<String, FormError> {
    for param in content_type.split(';').skip(1) {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        if key.trim().eq_ignore_ascii_case("boundary") {
            let boundary = unquote(value.trim());
            if boundary.is_empty() {
                return Err(FormError::MalformedContentType);
            }
            return Ok(boundary);
        }
    }

    Err(FormError::MalformedContentType)
}

/// Remove surrounding quotes and collapse backslash escapes.
pub(crate) fn unquote(s: &str) -> String {
    let s = s.trim();
    let quoted = s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"'))
            || (s.starts_with('\'') && s.ends_with('\'')));
    if !quoted {
        return s.to_string();
    }

    let inner = &s[1..s.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Result of matching a candidate line against the boundary markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryMatch {
    /// The line is ordinary content.
    None,
    /// The line is a part marker; another part follows.
    Part,
    /// The line is the final marker; no further parts follow.
    Final,
}

/// The two byte patterns derived from a boundary token.
///
/// The final marker is always the part marker with `--` appended. Candidate
/// lines are compared byte-exactly after stripping leading linear whitespace,
/// which the format permits before boundary lines but nowhere else.
#[derive(Debug, Clone)]
pub struct BoundaryTokens {
    part: Vec<u8>,
    terminal: Vec<u8>,
}

impl BoundaryTokens {
    /// Derive the part and final markers from a boundary token.
    #[must_use]
    pub fn new(boundary: &str) -> Self {
        let part = format!("--{boundary}").into_bytes();
        let mut terminal = part.clone();
        terminal.extend_from_slice(b"--");
        Self { part, terminal }
    }

    /// The part marker, `--<boundary>`.
    #[must_use]
    pub fn part(&self) -> &[u8] {
        &self.part
    }

    /// The final marker, `--<boundary>--`.
    #[must_use]
    pub fn terminal(&self) -> &[u8] {
        &self.terminal
    }

    /// Classify a candidate line (end-of-line already stripped).
    #[must_use]
    pub fn classify(&self, line: &[u8]) -> BoundaryMatch {
        let candidate = trim_leading_lws(line);
        if candidate == self.terminal {
            BoundaryMatch::Final
        } else if candidate == self.part {
            BoundaryMatch::Part
        } else {
            BoundaryMatch::None
        }
    }
}

fn trim_leading_lws(line: &[u8]) -> &[u8] {
    let mut rest = line;
    while let [b' ' | b'\t', tail @ ..] = rest {
        rest = tail;
    }
    rest
}

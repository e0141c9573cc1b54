//! Decoder error taxonomy.

use multiform_io::HeaderError;

/// Errors that can occur while decoding a multipart body.
///
/// Every variant is terminal for the whole decode; the format offers no
/// resynchronization point once corrupted. The single exception is a
/// [`Storage`](Self::Storage) failure caused by denied permissions, which a
/// buffering read degrades to a partial result; see
/// [`degrades_to_partial`](Self::degrades_to_partial).
#[derive(Debug)]
pub enum FormError {
    /// Declared content type lacks a usable boundary parameter.
    MalformedContentType,
    /// Stream exhausted before any boundary line was found.
    MissingBoundary,
    /// A part's headers lack Content-Disposition.
    MissingDisposition,
    /// A part's Content-Disposition is not form-data.
    UnexpectedDisposition {
        /// The offending header value.
        found: String,
    },
    /// A part's Content-Disposition lacks a name parameter.
    MissingName,
    /// A file part's accumulated size exceeds the configured maximum.
    FileTooLarge { size: usize, max: usize },
    /// Stream exhausted mid-part, before a boundary line.
    UnexpectedEof,
    /// A second consumption attempt on a single-use decoder instance.
    AlreadyConsumed,
    /// Malformed part header block.
    InvalidHeaders {
        /// Description of the problem.
        detail: String,
    },
    /// I/O failure reading from the byte source.
    Read {
        /// Description of the failure.
        detail: String,
    },
    /// Failure creating the output directory, creating a spill file, or
    /// writing to one.
    Storage {
        /// Description of the failure.
        detail: String,
        /// The underlying I/O error kind, used by the propagation policy.
        kind: std::io::ErrorKind,
    },
}

impl FormError {
    /// Wrap an I/O error from the storage layer.
    pub(crate) fn storage(context: &str, err: &std::io::Error) -> Self {
        Self::Storage {
            detail: format!("{context}: {err}"),
            kind: err.kind(),
        }
    }

    /// Wrap an I/O error from the byte source.
    pub(crate) fn read(err: &std::io::Error) -> Self {
        Self::Read {
            detail: err.to_string(),
        }
    }

    /// Returns true if a buffering read may swallow this error, log it, and
    /// return the parts accumulated so far.
    ///
    /// Only denied storage permissions qualify; a request can still be
    /// partially usable when auxiliary storage is unavailable, but protocol
    /// violations never are. Lazy consumption propagates every error.
    #[must_use]
    pub fn degrades_to_partial(&self) -> bool {
        matches!(
            self,
            Self::Storage {
                kind: std::io::ErrorKind::PermissionDenied,
                ..
            }
        )
    }
}

impl std::fmt::Display for FormError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedContentType => {
                write!(f, "content type has no usable multipart boundary")
            }
            Self::MissingBoundary => {
                write!(f, "stream ended before the first multipart boundary")
            }
            Self::MissingDisposition => {
                write!(f, "missing Content-Disposition header in part")
            }
            Self::UnexpectedDisposition { found } => {
                write!(f, "unexpected Content-Disposition: {found}")
            }
            Self::MissingName => {
                write!(f, "Content-Disposition has no name parameter")
            }
            Self::FileTooLarge { size, max } => {
                write!(f, "file too large: {size} bytes exceeds limit of {max}")
            }
            Self::UnexpectedEof => write!(f, "unexpected end of multipart data"),
            Self::AlreadyConsumed => {
                write!(f, "multipart body has already been consumed")
            }
            Self::InvalidHeaders { detail } => write!(f, "invalid part headers: {detail}"),
            Self::Read { detail } => write!(f, "multipart read error: {detail}"),
            Self::Storage { detail, .. } => write!(f, "multipart storage error: {detail}"),
        }
    }
}

impl std::error::Error for FormError {}

impl From<HeaderError> for FormError {
    fn from(err: HeaderError) -> Self {
        match err {
            HeaderError::UnexpectedEof => Self::UnexpectedEof,
            HeaderError::InvalidUtf8 => Self::InvalidHeaders {
                detail: "invalid UTF-8 in header line".to_string(),
            },
            HeaderError::Read { detail } => Self::Read { detail },
        }
    }
}

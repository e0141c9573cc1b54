//! The streaming decoder: preamble skipping, the per-part state machine, and
//! the two consumption modes built on it.

use std::io::Read;
use std::path::{Path, PathBuf};

use multiform_io::{CappedLine, EolMode, LineReader, parse_header_block};

use crate::boundary::{BoundaryMatch, BoundaryTokens, parse_boundary, unquote};
use crate::config::FormConfig;
use crate::error::FormError;
use crate::form::{FormData, FormFile, FormPart, PartData};
use crate::spill::{SpillBuffer, default_out_dir};

/// Extra bytes allowed beyond the part's remaining byte budget when reading a
/// file-branch line, covering a boundary marker's leading whitespace and its
/// terminator.
const BOUNDARY_LINE_SLACK: usize = 16;

/// Single-use guard, checked at every consumption entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderState {
    Idle,
    Consuming,
    Done,
}

/// Position of the engine within the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    /// Before the first boundary line.
    Preamble,
    /// A part marker has been consumed; a part follows.
    NextPart,
    /// The final marker has been consumed.
    Finished,
}

/// Streaming decoder for one `multipart/form-data` body.
///
/// A reader processes exactly one body, once: the first call to
/// [`read_form`](Self::read_form) or [`parts`](Self::parts) claims the
/// instance, and any later consumption attempt fails with
/// [`FormError::AlreadyConsumed`] without touching the stream.
#[derive(Debug)]
pub struct FormReader<R> {
    source: LineReader<R>,
    tokens: BoundaryTokens,
    config: FormConfig,
    state: ReaderState,
    cursor: Cursor,
    out_dir: PathBuf,
    out_dir_ready: bool,
}

impl<R: Read> FormReader<R> {
    /// Create a decoder from a declared content-type value and a byte source.
    ///
    /// # Errors
    ///
    /// Returns [`FormError::MalformedContentType`] if the content type has no
    /// usable boundary parameter.
    pub fn new(content_type: &str, source: R, config: FormConfig) -> Result<Self, FormError> {
        let boundary = parse_boundary(content_type)?;
        Ok(Self::from_boundary(&boundary, source, config))
    }

    /// Create a decoder from an already-extracted boundary token.
    #[must_use]
    pub fn from_boundary(boundary: &str, source: R, config: FormConfig) -> Self {
        let out_dir = config
            .get_out_path()
            .map_or_else(default_out_dir, Path::to_path_buf);
        Self {
            source: LineReader::with_buffer_size(source, config.get_buffer_size()),
            tokens: BoundaryTokens::new(boundary),
            config,
            state: ReaderState::Idle,
            cursor: Cursor::Preamble,
            out_dir,
            out_dir_ready: false,
        }
    }

    /// The boundary markers this decoder recognizes.
    #[must_use]
    pub fn boundary(&self) -> &BoundaryTokens {
        &self.tokens
    }

    /// Consume the whole body into a [`FormData`].
    ///
    /// Duplicate field names keep the last observed value; file parts are
    /// appended in arrival order, never merged. A storage failure caused by
    /// denied permissions is logged and stops consumption early, returning
    /// the partial result accumulated so far; every other failure propagates
    /// and aborts the decode.
    ///
    /// # Errors
    ///
    /// Returns [`FormError::AlreadyConsumed`] if the instance was already
    /// consumed, or any fatal decode error.
    pub async fn read_form(&mut self) -> Result<FormData, FormError> {
        self.claim()?;

        let mut data = FormData::new();
        loop {
            match self.next_part_inner() {
                Ok(Some(part)) => match part.data {
                    PartData::Field(value) => {
                        data.fields.insert(part.name, value);
                    }
                    PartData::File(file) => data.files.push(file),
                },
                Ok(None) => break,
                Err(err) if err.degrades_to_partial() => {
                    log::warn!("multipart storage unavailable, returning partial form: {err}");
                    break;
                }
                Err(err) => {
                    self.state = ReaderState::Done;
                    return Err(err);
                }
            }
        }

        self.state = ReaderState::Done;
        Ok(data)
    }

    /// Claim the instance and expose the body as a lazy sequence of parts.
    ///
    /// Unlike [`read_form`](Self::read_form), no error class is swallowed
    /// and duplicate names are the caller's concern. The sequence is finite
    /// and not restartable.
    ///
    /// # Errors
    ///
    /// Returns [`FormError::AlreadyConsumed`] if the instance was already
    /// consumed.
    pub fn parts(&mut self) -> Result<Parts<'_, R>, FormError> {
        self.claim()?;
        Ok(Parts { reader: self })
    }

    fn claim(&mut self) -> Result<(), FormError> {
        match self.state {
            ReaderState::Idle => {
                self.state = ReaderState::Consuming;
                Ok(())
            }
            ReaderState::Consuming | ReaderState::Done => Err(FormError::AlreadyConsumed),
        }
    }

    fn next_part_inner(&mut self) -> Result<Option<FormPart>, FormError> {
        loop {
            match self.cursor {
                Cursor::Preamble => {
                    self.cursor = match self.skip_preamble()? {
                        BoundaryMatch::Final => Cursor::Finished,
                        _ => Cursor::NextPart,
                    };
                }
                Cursor::NextPart => return self.read_part().map(Some),
                Cursor::Finished => return Ok(None),
            }
        }
    }

    /// Discard everything preceding the first boundary line.
    fn skip_preamble(&mut self) -> Result<BoundaryMatch, FormError> {
        loop {
            let line = self
                .source
                .next_line(EolMode::Strip)
                .map_err(|e| FormError::read(&e))?
                .ok_or(FormError::MissingBoundary)?;
            match self.tokens.classify(&line) {
                BoundaryMatch::None => {}
                matched => return Ok(matched),
            }
        }
    }

    /// Decode one part: header block, then content up to a boundary line.
    fn read_part(&mut self) -> Result<FormPart, FormError> {
        let headers = parse_header_block(&mut self.source)?;

        let disposition = headers
            .get("content-disposition")
            .ok_or(FormError::MissingDisposition)?;
        ensure_form_data(disposition)?;
        let (name, original_name) = disposition_params(disposition)?;

        // Presence of a content type is the sole discriminator between a
        // file part and a text field.
        match headers.get("content-type") {
            Some(content_type) => {
                let content_type = content_type.to_string();
                self.read_file_part(name, original_name, content_type)
            }
            None => self.read_field_part(name),
        }
    }

    fn read_field_part(&mut self, name: String) -> Result<FormPart, FormError> {
        let mut lines: Vec<String> = Vec::new();
        loop {
            let line = self
                .source
                .next_line(EolMode::Strip)
                .map_err(|e| FormError::read(&e))?
                .ok_or(FormError::UnexpectedEof)?;
            match self.tokens.classify(&line) {
                BoundaryMatch::Part => break,
                BoundaryMatch::Final => {
                    self.cursor = Cursor::Finished;
                    break;
                }
                BoundaryMatch::None => lines.push(String::from_utf8_lossy(&line).into_owned()),
            }
        }
        Ok(FormPart {
            name,
            data: PartData::Field(lines.join("\n")),
        })
    }

    fn read_file_part(
        &mut self,
        name: String,
        original_name: Option<String>,
        content_type: String,
    ) -> Result<FormPart, FormError> {
        let max_size = self.config.get_max_size();
        let max_file_size = self.config.get_max_file_size();

        let mut spill = SpillBuffer::new();
        if max_size == 0 {
            // No in-memory retention: the storage file exists before the
            // first byte is written.
            let dir = self.ensure_out_dir()?;
            spill.spill_to(&dir, self.config.get_prefix(), &content_type)?;
        }

        let marker_allowance = self
            .tokens
            .terminal()
            .len()
            .saturating_add(BOUNDARY_LINE_SLACK);

        // The terminator of the line immediately preceding the boundary is
        // the delimiter, not content: hold each line's terminator back and
        // append it only once the following line proves to be payload.
        let mut pending_eol: Vec<u8> = Vec::new();
        loop {
            // A line longer than the remaining byte budget plus the marker
            // allowance can only end in FileTooLarge; capping the read keeps
            // a terminator-free byte run from buffering unbounded.
            let cap = max_file_size
                .saturating_sub(spill.size())
                .saturating_add(marker_allowance);
            let line = match self
                .source
                .next_line_capped(EolMode::Keep, cap)
                .map_err(|e| FormError::read(&e))?
                .ok_or(FormError::UnexpectedEof)?
            {
                CappedLine::Line(line) => line,
                CappedLine::Overflow(buffered) => {
                    return Err(FormError::FileTooLarge {
                        size: spill.size().saturating_add(buffered),
                        max: max_file_size,
                    });
                }
            };
            let content_end = line.len() - terminator_len(&line);

            let matched = self.tokens.classify(&line[..content_end]);
            if matched != BoundaryMatch::None {
                if matched == BoundaryMatch::Final {
                    self.cursor = Cursor::Finished;
                }
                let body = spill.into_body()?;
                return Ok(FormPart {
                    name: name.clone(),
                    data: PartData::File(FormFile {
                        name,
                        original_name,
                        content_type,
                        body,
                    }),
                });
            }

            let mut chunk = std::mem::take(&mut pending_eol);
            chunk.extend_from_slice(&line[..content_end]);
            pending_eol = line[content_end..].to_vec();

            // Enforced eagerly, before the boundary is found, so an
            // unbounded body cannot grow memory or disk use past the cap.
            // Dropping the spill buffer closes and removes any partial file.
            let next_size = spill.size().saturating_add(chunk.len());
            if next_size > max_file_size {
                return Err(FormError::FileTooLarge {
                    size: next_size,
                    max: max_file_size,
                });
            }

            if max_size > 0 && !spill.is_spilled() && spill.would_exceed(chunk.len(), max_size) {
                let dir = self.ensure_out_dir()?;
                spill.spill_to(&dir, self.config.get_prefix(), &content_type)?;
            }
            spill.append(&chunk)?;
        }
    }

    /// Create the output directory at most once per instance.
    fn ensure_out_dir(&mut self) -> Result<PathBuf, FormError> {
        if !self.out_dir_ready {
            std::fs::create_dir_all(&self.out_dir)
                .map_err(|e| FormError::storage("failed to create output directory", &e))?;
            self.out_dir_ready = true;
        }
        Ok(self.out_dir.clone())
    }
}

/// Lazy view over a claimed [`FormReader`]: parts are decoded one at a time,
/// on demand.
#[derive(Debug)]
pub struct Parts<'a, R> {
    reader: &'a mut FormReader<R>,
}

impl<R: Read> Parts<'_, R> {
    /// Decode and yield the next part, or `None` once the final boundary has
    /// been consumed.
    ///
    /// # Errors
    ///
    /// Any decode failure; all failures are terminal for the sequence.
    pub async fn try_next(&mut self) -> Result<Option<FormPart>, FormError> {
        match self.reader.next_part_inner() {
            Ok(Some(part)) => Ok(Some(part)),
            Ok(None) => {
                self.reader.state = ReaderState::Done;
                Ok(None)
            }
            Err(err) => {
                self.reader.state = ReaderState::Done;
                Err(err)
            }
        }
    }
}

fn terminator_len(line: &[u8]) -> usize {
    if line.ends_with(b"\r\n") {
        2
    } else if line.ends_with(b"\n") {
        1
    } else {
        0
    }
}

/// Require a Content-Disposition that starts with `form-data;`.
fn ensure_form_data(disposition: &str) -> Result<(), FormError> {
    let d = disposition.trim_start();
    let ok = d.len() > 9
        && d.is_char_boundary(9)
        && d[..9].eq_ignore_ascii_case("form-data")
        && d.as_bytes()[9] == b';';
    if ok {
        Ok(())
    } else {
        Err(FormError::UnexpectedDisposition {
            found: disposition.to_string(),
        })
    }
}

/// Extract the `name` (required) and `filename` (optional) parameters.
fn disposition_params(disposition: &str) -> Result<(String, Option<String>), FormError> {
    let mut name = None;
    let mut filename = None;

    for param in disposition.split(';').skip(1) {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.eq_ignore_ascii_case("name") {
            name = Some(unquote(value.trim()));
        } else if key.eq_ignore_ascii_case("filename") {
            filename = Some(unquote(value.trim()));
        }
    }

    let name = name.ok_or(FormError::MissingName)?;
    Ok((name, filename))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::FileBody;
    use futures_executor::block_on;
    use proptest::prelude::*;

    const CT: &str = "multipart/form-data; boundary=----boundary";

    fn reader(body: &[u8], config: FormConfig) -> FormReader<&[u8]> {
        FormReader::new(CT, body, config).expect("content type should parse")
    }

    fn test_out_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "multiform-reader-test-{}-{tag}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn cleanup(dir: &Path) {
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn decodes_simple_fields() {
        let body = concat!(
            "------boundary\r\n",
            "Content-Disposition: form-data; name=\"field1\"\r\n",
            "\r\n",
            "value1\r\n",
            "------boundary\r\n",
            "Content-Disposition: form-data; name=\"field2\"\r\n",
            "\r\n",
            "value2\r\n",
            "------boundary--\r\n"
        );

        let mut r = reader(body.as_bytes(), FormConfig::default());
        let data = block_on(r.read_form()).unwrap();
        assert_eq!(data.field("field1"), Some("value1"));
        assert_eq!(data.field("field2"), Some("value2"));
        assert!(data.files().is_empty());
    }

    #[test]
    fn preamble_is_discarded() {
        let body = concat!(
            "this is a preamble line\r\n",
            "and another one\r\n",
            "------boundary\r\n",
            "Content-Disposition: form-data; name=\"only\"\r\n",
            "\r\n",
            "kept\r\n",
            "------boundary--\r\n"
        );

        let mut r = reader(body.as_bytes(), FormConfig::default());
        let data = block_on(r.read_form()).unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data.field("only"), Some("kept"));
    }

    #[test]
    fn immediately_final_body_yields_empty_result() {
        let body = "------boundary--\r\n";
        let mut r = reader(body.as_bytes(), FormConfig::default());
        let data = block_on(r.read_form()).unwrap();
        assert!(data.is_empty());
    }

    #[test]
    fn body_without_any_boundary_is_missing_boundary() {
        let body = "no markers here\r\nat all\r\n";
        let mut r = reader(body.as_bytes(), FormConfig::default());
        let err = block_on(r.read_form()).unwrap_err();
        assert!(matches!(err, FormError::MissingBoundary));
    }

    #[test]
    fn field_preserves_interior_newlines() {
        let body = concat!(
            "------boundary\r\n",
            "Content-Disposition: form-data; name=\"text\"\r\n",
            "\r\n",
            "a\r\n",
            "b\r\n",
            "------boundary--\r\n"
        );

        let mut r = reader(body.as_bytes(), FormConfig::default());
        let data = block_on(r.read_form()).unwrap();
        assert_eq!(data.field("text"), Some("a\nb"));
    }

    #[test]
    fn leading_whitespace_before_boundary_lines_is_tolerated() {
        let body = concat!(
            "  ------boundary\r\n",
            "Content-Disposition: form-data; name=\"field\"\r\n",
            "\r\n",
            "value\r\n",
            "\t------boundary--\r\n"
        );

        let mut r = reader(body.as_bytes(), FormConfig::default());
        let data = block_on(r.read_form()).unwrap();
        assert_eq!(data.field("field"), Some("value"));
    }

    #[test]
    fn lf_only_bodies_decode() {
        let body = concat!(
            "------boundary\n",
            "Content-Disposition: form-data; name=\"field\"\n",
            "\n",
            "value\n",
            "------boundary--\n"
        );

        let mut r = reader(body.as_bytes(), FormConfig::default());
        let data = block_on(r.read_form()).unwrap();
        assert_eq!(data.field("field"), Some("value"));
    }

    #[test]
    fn small_file_stays_in_memory() {
        let body = concat!(
            "------boundary\r\n",
            "Content-Disposition: form-data; name=\"file\"; filename=\"note.txt\"\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "Hello, World!\r\n",
            "------boundary--\r\n"
        );

        let mut r = reader(body.as_bytes(), FormConfig::default());
        let data = block_on(r.read_form()).unwrap();
        assert_eq!(data.files().len(), 1);

        let file = &data.files()[0];
        assert_eq!(file.name, "file");
        assert_eq!(file.original_name.as_deref(), Some("note.txt"));
        assert_eq!(file.content_type, "text/plain");
        assert!(!file.is_spilled());
        assert_eq!(file.content(), Some(&b"Hello, World!"[..]));
        assert!(file.path().is_none());
    }

    #[test]
    fn file_content_is_byte_exact_across_interior_line_breaks() {
        // Interior CRLF and LF sequences belong to the payload; only the
        // terminator before the boundary is the delimiter.
        let body = concat!(
            "------boundary\r\n",
            "Content-Disposition: form-data; name=\"file\"; filename=\"data.bin\"\r\n",
            "Content-Type: application/octet-stream\r\n",
            "\r\n",
            "AB\r\n",
            "CD\nEF\r\n",
            "------boundary--\r\n"
        );

        let mut r = reader(body.as_bytes(), FormConfig::default());
        let data = block_on(r.read_form()).unwrap();
        assert_eq!(data.files()[0].content(), Some(&b"AB\r\nCD\nEF"[..]));
    }

    #[test]
    fn filename_is_optional_for_file_parts() {
        let body = concat!(
            "------boundary\r\n",
            "Content-Disposition: form-data; name=\"blob\"\r\n",
            "Content-Type: application/octet-stream\r\n",
            "\r\n",
            "payload\r\n",
            "------boundary--\r\n"
        );

        let mut r = reader(body.as_bytes(), FormConfig::default());
        let data = block_on(r.read_form()).unwrap();
        let file = &data.files()[0];
        assert!(file.original_name.is_none());
        assert_eq!(file.content(), Some(&b"payload"[..]));
    }

    #[test]
    fn empty_file_part_yields_empty_content() {
        let body = concat!(
            "------boundary\r\n",
            "Content-Disposition: form-data; name=\"file\"; filename=\"empty\"\r\n",
            "Content-Type: application/octet-stream\r\n",
            "\r\n",
            "------boundary--\r\n"
        );

        let mut r = reader(body.as_bytes(), FormConfig::default());
        let data = block_on(r.read_form()).unwrap();
        assert_eq!(data.files()[0].content(), Some(&b""[..]));
    }

    #[test]
    fn file_at_memory_ceiling_stays_buffered() {
        let payload = "x".repeat(32);
        let body = format!(
            "------boundary\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"edge\"\r\n\
             Content-Type: application/octet-stream\r\n\
             \r\n\
             {payload}\r\n\
             ------boundary--\r\n"
        );

        let dir = test_out_dir("ceiling");
        let config = FormConfig::new().max_size(32).out_path(&dir);
        let mut r = reader(body.as_bytes(), config);
        let data = block_on(r.read_form()).unwrap();
        assert!(!data.files()[0].is_spilled());
        assert!(!dir.exists(), "no storage should be touched below the ceiling");
        cleanup(&dir);
    }

    #[test]
    fn file_past_memory_ceiling_spills_to_storage() {
        let payload = "y".repeat(64);
        let body = format!(
            "------boundary\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"big.txt\"\r\n\
             Content-Type: text/plain\r\n\
             \r\n\
             {payload}\r\n\
             ------boundary--\r\n"
        );

        let dir = test_out_dir("spill");
        let config = FormConfig::new().max_size(16).out_path(&dir).prefix("up-");
        let mut r = reader(body.as_bytes(), config);
        let data = block_on(r.read_form()).unwrap();

        let file = &data.files()[0];
        assert!(file.is_spilled());
        assert!(file.content().is_none());
        let path = file.path().unwrap();
        assert_eq!(std::fs::read(path).unwrap(), payload.as_bytes());
        let file_name = path.file_name().unwrap().to_str().unwrap();
        assert!(file_name.starts_with("up-"));
        assert!(file_name.ends_with(".txt"));
        cleanup(&dir);
    }

    #[test]
    fn zero_max_size_spills_every_file_part() {
        let body = concat!(
            "------boundary\r\n",
            "Content-Disposition: form-data; name=\"file\"; filename=\"tiny\"\r\n",
            "Content-Type: application/json\r\n",
            "\r\n",
            "{}\r\n",
            "------boundary--\r\n"
        );

        let dir = test_out_dir("always");
        let config = FormConfig::new().max_size(0).out_path(&dir);
        let mut r = reader(body.as_bytes(), config);
        let data = block_on(r.read_form()).unwrap();

        let file = &data.files()[0];
        assert!(file.is_spilled());
        let path = file.path().unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"{}");
        assert_eq!(path.extension().unwrap(), "json");
        cleanup(&dir);
    }

    #[test]
    fn oversized_file_aborts_without_dangling_storage() {
        let payload = "z".repeat(256);
        let body = format!(
            "------boundary\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"huge\"\r\n\
             Content-Type: application/octet-stream\r\n\
             \r\n\
             {payload}\r\n\
             ------boundary--\r\n"
        );

        let dir = test_out_dir("toolarge");
        let config = FormConfig::new().max_file_size(100).max_size(16).out_path(&dir);
        let mut r = reader(body.as_bytes(), config);
        let err = block_on(r.read_form()).unwrap_err();
        assert!(matches!(err, FormError::FileTooLarge { max: 100, .. }));

        // The partial spill file must have been removed on abort.
        if dir.exists() {
            assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
        }
        cleanup(&dir);
    }

    #[test]
    fn oversized_file_closes_and_removes_an_open_spill_file() {
        // First line spills to storage, second pushes the part past the cap
        // while the storage handle is open.
        let line = "w".repeat(64);
        let body = format!(
            "------boundary\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"huge\"\r\n\
             Content-Type: application/octet-stream\r\n\
             \r\n\
             {line}\r\n\
             {line}\r\n\
             ------boundary--\r\n"
        );

        let dir = test_out_dir("toolarge-open");
        let config = FormConfig::new().max_file_size(100).max_size(16).out_path(&dir);
        let mut r = reader(body.as_bytes(), config);
        let err = block_on(r.read_form()).unwrap_err();
        assert!(matches!(err, FormError::FileTooLarge { max: 100, .. }));

        assert!(dir.exists());
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
        cleanup(&dir);
    }

    #[test]
    fn terminator_free_payload_fails_before_buffering_in_full() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct CountingSource<R> {
            inner: R,
            read: Arc<AtomicUsize>,
        }

        impl<R: Read> Read for CountingSource<R> {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                let n = self.inner.read(buf)?;
                self.read.fetch_add(n, Ordering::Relaxed);
                Ok(n)
            }
        }

        let payload = vec![b'a'; 1024 * 1024];
        let mut body = Vec::new();
        body.extend_from_slice(b"------boundary\r\n");
        body.extend_from_slice(
            b"Content-Disposition: form-data; name=\"file\"; filename=\"big\"\r\n",
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(&payload);
        body.extend_from_slice(b"\r\n------boundary--\r\n");

        let read = Arc::new(AtomicUsize::new(0));
        let source = CountingSource {
            inner: &body[..],
            read: Arc::clone(&read),
        };
        let config = FormConfig::new().max_file_size(100).buffer_size(64);
        let mut r = FormReader::new(CT, source, config).expect("content type should parse");
        let err = block_on(r.read_form()).unwrap_err();
        assert!(matches!(err, FormError::FileTooLarge { max: 100, .. }));
        assert!(
            read.load(Ordering::Relaxed) < 4096,
            "decode must fail without buffering the whole payload"
        );
    }

    #[test]
    fn duplicate_field_names_keep_the_last_value() {
        let body = concat!(
            "------boundary\r\n",
            "Content-Disposition: form-data; name=\"dup\"\r\n",
            "\r\n",
            "first\r\n",
            "------boundary\r\n",
            "Content-Disposition: form-data; name=\"dup\"\r\n",
            "\r\n",
            "second\r\n",
            "------boundary--\r\n"
        );

        let mut r = reader(body.as_bytes(), FormConfig::default());
        let data = block_on(r.read_form()).unwrap();
        assert_eq!(data.field("dup"), Some("second"));
        assert_eq!(data.fields.len(), 1);
    }

    #[test]
    fn duplicate_file_names_are_all_kept_in_order() {
        let body = concat!(
            "------boundary\r\n",
            "Content-Disposition: form-data; name=\"up\"; filename=\"a.txt\"\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "one\r\n",
            "------boundary\r\n",
            "Content-Disposition: form-data; name=\"up\"; filename=\"b.txt\"\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "two\r\n",
            "------boundary--\r\n"
        );

        let mut r = reader(body.as_bytes(), FormConfig::default());
        let data = block_on(r.read_form()).unwrap();
        assert_eq!(data.files().len(), 2);
        assert_eq!(data.files()[0].original_name.as_deref(), Some("a.txt"));
        assert_eq!(data.files()[1].original_name.as_deref(), Some("b.txt"));
        assert_eq!(data.files()[0].content(), Some(&b"one"[..]));
        assert_eq!(data.files()[1].content(), Some(&b"two"[..]));
    }

    #[test]
    fn lazy_mode_yields_duplicate_fields_in_order() {
        let body = concat!(
            "------boundary\r\n",
            "Content-Disposition: form-data; name=\"dup\"\r\n",
            "\r\n",
            "first\r\n",
            "------boundary\r\n",
            "Content-Disposition: form-data; name=\"dup\"\r\n",
            "\r\n",
            "second\r\n",
            "------boundary--\r\n"
        );

        let mut r = reader(body.as_bytes(), FormConfig::default());
        let mut parts = r.parts().unwrap();

        let first = block_on(parts.try_next()).unwrap().unwrap();
        assert_eq!(first.name, "dup");
        assert!(matches!(first.data, PartData::Field(ref v) if v == "first"));

        let second = block_on(parts.try_next()).unwrap().unwrap();
        assert!(matches!(second.data, PartData::Field(ref v) if v == "second"));

        assert!(block_on(parts.try_next()).unwrap().is_none());
    }

    #[test]
    fn lazy_mode_mixes_fields_and_files() {
        let body = concat!(
            "------boundary\r\n",
            "Content-Disposition: form-data; name=\"note\"\r\n",
            "\r\n",
            "hi\r\n",
            "------boundary\r\n",
            "Content-Disposition: form-data; name=\"file\"; filename=\"f.txt\"\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "body\r\n",
            "------boundary--\r\n"
        );

        let mut r = reader(body.as_bytes(), FormConfig::default());
        let mut parts = r.parts().unwrap();

        let field = block_on(parts.try_next()).unwrap().unwrap();
        assert!(matches!(field.data, PartData::Field(_)));

        let file = block_on(parts.try_next()).unwrap().unwrap();
        let PartData::File(file) = file.data else {
            panic!("expected a file part");
        };
        assert_eq!(file.body, FileBody::Buffered(b"body".to_vec()));

        assert!(block_on(parts.try_next()).unwrap().is_none());
    }

    #[cfg(target_os = "linux")]
    const DENIED_BODY: &str = concat!(
        "------boundary\r\n",
        "Content-Disposition: form-data; name=\"note\"\r\n",
        "\r\n",
        "kept\r\n",
        "------boundary\r\n",
        "Content-Disposition: form-data; name=\"file\"; filename=\"f.bin\"\r\n",
        "Content-Type: application/octet-stream\r\n",
        "\r\n",
        "payload\r\n",
        "------boundary--\r\n"
    );

    // Directory creation under sysfs fails with EPERM for any caller,
    // which maps to ErrorKind::PermissionDenied.
    #[cfg(target_os = "linux")]
    const DENIED_DIR: &str = "/sys/multiform-denied";

    #[cfg(target_os = "linux")]
    #[test]
    fn denied_storage_degrades_buffering_read_to_partial() {
        let config = FormConfig::new().max_size(0).out_path(DENIED_DIR);
        let mut r = reader(DENIED_BODY.as_bytes(), config);
        let data = block_on(r.read_form()).unwrap();
        assert_eq!(data.field("note"), Some("kept"));
        assert!(data.files().is_empty());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn denied_storage_propagates_in_lazy_mode() {
        let config = FormConfig::new().max_size(0).out_path(DENIED_DIR);
        let mut r = reader(DENIED_BODY.as_bytes(), config);
        let mut parts = r.parts().unwrap();

        let first = block_on(parts.try_next()).unwrap().unwrap();
        assert!(matches!(first.data, PartData::Field(ref v) if v == "kept"));

        let err = block_on(parts.try_next()).unwrap_err();
        assert!(err.degrades_to_partial());
        assert!(matches!(
            err,
            FormError::Storage {
                kind: std::io::ErrorKind::PermissionDenied,
                ..
            }
        ));
    }

    #[test]
    fn second_consumption_attempt_fails() {
        let body = "------boundary--\r\n";
        let mut r = reader(body.as_bytes(), FormConfig::default());
        block_on(r.read_form()).unwrap();

        let err = block_on(r.read_form()).unwrap_err();
        assert!(matches!(err, FormError::AlreadyConsumed));
        assert!(matches!(r.parts(), Err(FormError::AlreadyConsumed)));
    }

    #[test]
    fn lazy_claim_blocks_buffering_read() {
        let body = "------boundary--\r\n";
        let mut r = reader(body.as_bytes(), FormConfig::default());
        // Guard is claimed even before any part is pulled.
        let _ = r.parts().unwrap();
        assert!(matches!(
            block_on(r.read_form()),
            Err(FormError::AlreadyConsumed)
        ));
    }

    #[test]
    fn missing_disposition_is_rejected() {
        let body = concat!(
            "------boundary\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "value\r\n",
            "------boundary--\r\n"
        );

        let mut r = reader(body.as_bytes(), FormConfig::default());
        let err = block_on(r.read_form()).unwrap_err();
        assert!(matches!(err, FormError::MissingDisposition));
    }

    #[test]
    fn non_form_data_disposition_is_rejected() {
        let body = concat!(
            "------boundary\r\n",
            "Content-Disposition: attachment; name=\"field\"\r\n",
            "\r\n",
            "value\r\n",
            "------boundary--\r\n"
        );

        let mut r = reader(body.as_bytes(), FormConfig::default());
        let err = block_on(r.read_form()).unwrap_err();
        assert!(matches!(err, FormError::UnexpectedDisposition { .. }));
    }

    #[test]
    fn disposition_without_name_is_rejected() {
        let body = concat!(
            "------boundary\r\n",
            "Content-Disposition: form-data; filename=\"f.txt\"\r\n",
            "\r\n",
            "value\r\n",
            "------boundary--\r\n"
        );

        let mut r = reader(body.as_bytes(), FormConfig::default());
        let err = block_on(r.read_form()).unwrap_err();
        assert!(matches!(err, FormError::MissingName));
    }

    #[test]
    fn bare_form_data_disposition_is_rejected() {
        let body = concat!(
            "------boundary\r\n",
            "Content-Disposition: form-data\r\n",
            "\r\n",
            "value\r\n",
            "------boundary--\r\n"
        );

        let mut r = reader(body.as_bytes(), FormConfig::default());
        let err = block_on(r.read_form()).unwrap_err();
        assert!(matches!(err, FormError::UnexpectedDisposition { .. }));
    }

    #[test]
    fn disposition_params_are_case_insensitive() {
        let body = concat!(
            "------boundary\r\n",
            "Content-Disposition: Form-Data; Name=\"field\"; FileName=\"up.txt\"\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "v\r\n",
            "------boundary--\r\n"
        );

        let mut r = reader(body.as_bytes(), FormConfig::default());
        let data = block_on(r.read_form()).unwrap();
        let file = &data.files()[0];
        assert_eq!(file.name, "field");
        assert_eq!(file.original_name.as_deref(), Some("up.txt"));
    }

    #[test]
    fn truncated_part_is_unexpected_eof() {
        let body = concat!(
            "------boundary\r\n",
            "Content-Disposition: form-data; name=\"field\"\r\n",
            "\r\n",
            "value without a closing boundary\r\n"
        );

        let mut r = reader(body.as_bytes(), FormConfig::default());
        let err = block_on(r.read_form()).unwrap_err();
        assert!(matches!(err, FormError::UnexpectedEof));
    }

    #[test]
    fn truncated_header_block_is_unexpected_eof() {
        let body = concat!(
            "------boundary\r\n",
            "Content-Disposition: form-data; name=\"field\"\r\n"
        );

        let mut r = reader(body.as_bytes(), FormConfig::default());
        let err = block_on(r.read_form()).unwrap_err();
        assert!(matches!(err, FormError::UnexpectedEof));
    }

    #[test]
    fn boundary_like_content_line_is_not_a_delimiter() {
        let body = concat!(
            "------boundary\r\n",
            "Content-Disposition: form-data; name=\"file\"; filename=\"d.bin\"\r\n",
            "Content-Type: application/octet-stream\r\n",
            "\r\n",
            "line1\r\n",
            "------boundaryX\r\n",
            "line2\r\n",
            "------boundary--\r\n"
        );

        let mut r = reader(body.as_bytes(), FormConfig::default());
        let data = block_on(r.read_form()).unwrap();
        assert_eq!(
            data.files()[0].content(),
            Some(&b"line1\r\n------boundaryX\r\nline2"[..])
        );
    }

    #[test]
    fn round_trip_of_mixed_fields_and_files() {
        let file_bytes: &[u8] = b"\x00\x01binary\r\npayload\x02";
        let mut body = Vec::new();
        body.extend_from_slice(b"------boundary\r\n");
        body.extend_from_slice(b"Content-Disposition: form-data; name=\"who\"\r\n\r\n");
        body.extend_from_slice(b"Ada\r\n");
        body.extend_from_slice(b"------boundary\r\n");
        body.extend_from_slice(
            b"Content-Disposition: form-data; name=\"blob\"; filename=\"b.bin\"\r\n",
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(file_bytes);
        body.extend_from_slice(b"\r\n------boundary--\r\n");

        let mut r = reader(&body, FormConfig::default());
        let data = block_on(r.read_form()).unwrap();
        assert_eq!(data.field("who"), Some("Ada"));
        assert_eq!(data.files()[0].bytes().unwrap(), file_bytes);
    }

    proptest! {
        #[test]
        fn field_values_survive_assembly_and_decode(value in "[a-zA-Z0-9 .,!?-]{0,80}") {
            let body = format!(
                "------boundary\r\n\
                 Content-Disposition: form-data; name=\"v\"\r\n\
                 \r\n\
                 {value}\r\n\
                 ------boundary--\r\n"
            );
            let mut r = FormReader::new(CT, body.as_bytes(), FormConfig::default()).unwrap();
            let data = block_on(r.read_form()).unwrap();
            prop_assert_eq!(data.field("v"), Some(value.as_str()));
        }
    }
}

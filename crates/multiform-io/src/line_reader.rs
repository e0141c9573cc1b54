//! Buffered, line-oriented byte reading.
//!
//! [`LineReader`] wraps any [`Read`] source and yields one line at a time.
//! Lines are byte sequences terminated by `\n` (with or without a preceding
//! `\r`); the final line of a stream is yielded even when it has no
//! terminator. No UTF-8 assumption is made at this layer.

use std::io::Read;

use memchr::memchr;

/// Default read chunk size (8KB).
pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;

/// Controls whether a yielded line keeps its end-of-line bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EolMode {
    /// Remove the trailing `\r\n` or `\n`.
    Strip,
    /// Preserve the line's original terminator bytes.
    Keep,
}

/// A line produced by a length-capped read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CappedLine {
    /// A complete line within the cap.
    Line(Vec<u8>),
    /// The cap was exceeded before a terminator appeared; carries the number
    /// of bytes buffered when the read stopped. The bytes stay buffered and
    /// no further source reads are made.
    Overflow(usize),
}

/// A buffered, line-oriented reader over a sequential byte source.
#[derive(Debug)]
pub struct LineReader<R> {
    source: R,
    buffer: Vec<u8>,
    /// Consumed prefix of `buffer`.
    start: usize,
    chunk_size: usize,
    eof: bool,
}

impl<R: Read> LineReader<R> {
    /// Create a reader with the default chunk size.
    pub fn new(source: R) -> Self {
        Self::with_buffer_size(source, DEFAULT_BUFFER_SIZE)
    }

    /// Create a reader that refills its buffer in chunks of `chunk_size` bytes.
    pub fn with_buffer_size(source: R, chunk_size: usize) -> Self {
        Self {
            source,
            buffer: Vec::new(),
            start: 0,
            chunk_size: chunk_size.max(1),
            eof: false,
        }
    }

    /// Read the next line from the source.
    ///
    /// Returns `Ok(None)` once the source is exhausted.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors from the underlying source.
    pub fn next_line(&mut self, mode: EolMode) -> std::io::Result<Option<Vec<u8>>> {
        loop {
            if let Some(pos) = memchr(b'\n', &self.buffer[self.start..]) {
                let end = self.start + pos + 1;
                return Ok(Some(self.take_terminated(end, mode)));
            }

            if self.eof {
                if self.start >= self.buffer.len() {
                    return Ok(None);
                }
                return Ok(Some(self.take_tail()));
            }

            self.fill()?;
        }
    }

    /// Read the next line, refusing to buffer more than `cap` bytes for it.
    ///
    /// A line whose length (terminator included) exceeds `cap`, or an
    /// unterminated run that grows past `cap`, yields
    /// [`CappedLine::Overflow`] instead of a line.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors from the underlying source.
    pub fn next_line_capped(
        &mut self,
        mode: EolMode,
        cap: usize,
    ) -> std::io::Result<Option<CappedLine>> {
        loop {
            if let Some(pos) = memchr(b'\n', &self.buffer[self.start..]) {
                let len = pos + 1;
                if len > cap {
                    return Ok(Some(CappedLine::Overflow(len)));
                }
                let end = self.start + len;
                return Ok(Some(CappedLine::Line(self.take_terminated(end, mode))));
            }

            let pending = self.buffer.len() - self.start;
            if pending > cap {
                return Ok(Some(CappedLine::Overflow(pending)));
            }

            if self.eof {
                if pending == 0 {
                    return Ok(None);
                }
                return Ok(Some(CappedLine::Line(self.take_tail())));
            }

            self.fill()?;
        }
    }

    fn take_terminated(&mut self, end: usize, mode: EolMode) -> Vec<u8> {
        let mut line = self.buffer[self.start..end].to_vec();
        self.start = end;
        self.compact();
        if mode == EolMode::Strip {
            strip_eol(&mut line);
        }
        line
    }

    /// Final line without a terminator.
    fn take_tail(&mut self) -> Vec<u8> {
        let line = self.buffer[self.start..].to_vec();
        self.start = self.buffer.len();
        self.compact();
        line
    }

    /// Returns true once the source is exhausted and the buffer is drained.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.eof && self.start >= self.buffer.len()
    }

    fn fill(&mut self) -> std::io::Result<()> {
        let old_len = self.buffer.len();
        self.buffer.resize(old_len + self.chunk_size, 0);
        let n = self.source.read(&mut self.buffer[old_len..])?;
        self.buffer.truncate(old_len + n);
        if n == 0 {
            self.eof = true;
        }
        Ok(())
    }

    fn compact(&mut self) {
        if self.start >= self.buffer.len() {
            self.buffer.clear();
            self.start = 0;
        } else if self.start >= self.chunk_size {
            self.buffer.drain(..self.start);
            self.start = 0;
        }
    }
}

fn strip_eol(line: &mut Vec<u8>) {
    if line.last() == Some(&b'\n') {
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
    }
}

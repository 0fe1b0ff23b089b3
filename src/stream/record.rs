use std::io::{self, Read};

use crate::error::{Result, ZeppelinError};

/// Turns a forward-only source into fixed-width byte records.
pub trait RecordEncoder: Send {
    /// Width in bytes of every record this encoder produces.
    fn record_width(&self) -> usize;

    /// Move to the next record without decoding it. Returns `false` once the
    /// source is exhausted.
    fn advance(&mut self) -> Result<bool>;

    /// Append the current record to `buf`.
    fn encode(&mut self, buf: &mut Vec<u8>) -> Result<()>;
}

/// A `Read` over the records of one source.
///
/// Holds exactly one encoded record and serves bytes out of it, pulling the
/// next record when drained. A positioned stream starts mid-blob and stops
/// after a fixed number of bytes, which is what a multipart upload asks for.
pub struct RecordStream<E> {
    encoder: E,
    buffer: Vec<u8>,
    /// Next unread byte in `buffer`.
    position: usize,
    /// Bytes this stream may still return; `None` means unbounded.
    remaining: Option<u64>,
    exhausted: bool,
    closed: bool,
}

impl<E: RecordEncoder> RecordStream<E> {
    /// Stream every record of the source from the start.
    pub fn new(encoder: E) -> Self {
        let width = encoder.record_width();
        Self {
            encoder,
            buffer: Vec::with_capacity(width),
            position: 0,
            remaining: None,
            exhausted: false,
            closed: false,
        }
    }

    /// Stream `size` bytes starting at byte `start` of the logical blob.
    ///
    /// Whole records before `start` are skipped without decoding; the record
    /// containing `start` is decoded and its leading bytes discarded.
    /// `encoder` must wrap a source that has not been advanced yet.
    pub fn positioned(encoder: E, start: u64, size: u64) -> Result<Self> {
        let width = encoder.record_width() as u64;
        if width == 0 {
            return Err(ZeppelinError::Validation(
                "cannot position a stream of zero-width records".to_string(),
            ));
        }

        let mut stream = Self::new(encoder);
        stream.remaining = Some(size);

        for _ in 0..start / width {
            if !stream.encoder.advance()? {
                stream.exhausted = true;
                return Ok(stream);
            }
        }

        if stream.fill()? {
            stream.position = (start % width) as usize;
        }
        Ok(stream)
    }

    /// Arbitrary skipping is not supported: it could leave the stream in the
    /// middle of a partially consumed record. Position the stream at
    /// construction instead.
    pub fn skip(&mut self, n: u64) -> Result<u64> {
        Err(ZeppelinError::UnsupportedOperation(format!(
            "cannot skip {n} bytes of a record stream; use a positioned stream"
        )))
    }

    /// Release the record buffer. Every later read fails.
    pub fn close(&mut self) {
        self.closed = true;
        self.buffer = Vec::new();
        self.position = 0;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn record_width(&self) -> usize {
        self.encoder.record_width()
    }

    /// Load the next record into the buffer. Returns `false` at end of source.
    fn fill(&mut self) -> Result<bool> {
        if self.exhausted {
            return Ok(false);
        }
        self.buffer.clear();
        self.position = 0;
        if !self.encoder.advance()? {
            self.exhausted = true;
            return Ok(false);
        }
        self.encoder.encode(&mut self.buffer)?;
        let width = self.encoder.record_width();
        if self.buffer.len() != width {
            return Err(ZeppelinError::Internal(format!(
                "record encoded to {} bytes, expected {width}",
                self.buffer.len()
            )));
        }
        Ok(true)
    }
}

impl<E: RecordEncoder> std::fmt::Debug for RecordStream<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStream")
            .field("record_width", &self.encoder.record_width())
            .field("position", &self.position)
            .field("remaining", &self.remaining)
            .field("exhausted", &self.exhausted)
            .field("closed", &self.closed)
            .finish()
    }
}

impl<E: RecordEncoder> Read for RecordStream<E> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.closed {
            return Err(ZeppelinError::StreamClosed.into());
        }

        let mut written = 0;
        while written < out.len() {
            let budget = match self.remaining {
                Some(0) => break,
                Some(r) => usize::try_from(r).unwrap_or(usize::MAX),
                None => usize::MAX,
            };
            if self.position >= self.buffer.len() && !self.fill()? {
                break;
            }

            let n = (self.buffer.len() - self.position)
                .min(out.len() - written)
                .min(budget);
            out[written..written + n]
                .copy_from_slice(&self.buffer[self.position..self.position + n]);
            self.position += n;
            written += n;
            if let Some(r) = self.remaining.as_mut() {
                *r -= n as u64;
            }
        }
        Ok(written)
    }
}

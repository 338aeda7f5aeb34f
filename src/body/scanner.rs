//! Incremental delimiter scanner for multipart bodies.
//!
//! The scanner sees one byte at a time and keeps at most `delimiter.len()`
//! bytes of lookahead. Bytes that can no longer start a delimiter are handed
//! back for the destination; a complete delimiter is swallowed.

use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::http::request::BodyReader;

/// Destination writes are batched to this size.
const FLUSH_THRESHOLD: usize = 8 * 1024;

/// Scanner state after the latest byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// No delimiter prefix is buffered.
    Scanning,
    /// The last `k` bytes are a proper prefix of the delimiter.
    PartialMatch(usize),
    /// The full delimiter was just seen.
    Matched,
}

/// How a copy terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanEnd {
    /// The delimiter and the rest of its line were consumed.
    Delimiter,
    /// The body ended first.
    EndOfBody,
}

/// Finite-state matcher for one delimiter.
#[derive(Debug, Clone)]
pub struct BoundaryScanner {
    delimiter: Vec<u8>,
    window: Vec<u8>,
}

impl BoundaryScanner {
    /// `delimiter` must not be empty.
    pub fn new(delimiter: &[u8]) -> Self {
        debug_assert!(!delimiter.is_empty());
        Self {
            delimiter: delimiter.to_vec(),
            window: Vec::with_capacity(delimiter.len()),
        }
    }

    pub fn delimiter(&self) -> &[u8] {
        &self.delimiter
    }

    pub fn state(&self) -> ScanState {
        match self.window.len() {
            0 => ScanState::Scanning,
            k => ScanState::PartialMatch(k),
        }
    }

    /// Feed one byte. Bytes proven not to belong to a delimiter are appended
    /// to `flushed`, oldest first.
    pub fn push(&mut self, byte: u8, flushed: &mut Vec<u8>) -> ScanState {
        self.window.push(byte);
        while !self.delimiter.starts_with(&self.window) {
            flushed.push(self.window.remove(0));
        }
        if self.window.len() == self.delimiter.len() {
            self.window.clear();
            return ScanState::Matched;
        }
        self.state()
    }

    /// Forget any partial match.
    pub fn reset(&mut self) {
        self.window.clear();
    }
}

/// Copy `source` into `sink` until the scanner's delimiter, then skip to the
/// end of that line.
///
/// A partial match still buffered when the body ends is dropped.
pub async fn copy_until_delimiter<W>(
    source: &mut BodyReader,
    scanner: &mut BoundaryScanner,
    sink: &mut W,
) -> io::Result<ScanEnd>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    scanner.reset();
    let mut pending = Vec::with_capacity(FLUSH_THRESHOLD);

    while let Some(byte) = source.read_byte().await? {
        if scanner.push(byte, &mut pending) == ScanState::Matched {
            sink.write_all(&pending).await?;
            sink.flush().await?;
            while let Some(rest) = source.read_byte().await? {
                if rest == b'\n' {
                    break;
                }
            }
            return Ok(ScanEnd::Delimiter);
        }
        if pending.len() >= FLUSH_THRESHOLD {
            sink.write_all(&pending).await?;
            pending.clear();
        }
    }

    sink.write_all(&pending).await?;
    sink.flush().await?;
    Ok(ScanEnd::EndOfBody)
}

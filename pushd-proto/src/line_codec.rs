//! Incremental line reader for the client and S2S text protocols (§6).
//!
//! Both wire protocols are LF-framed `COMMAND ARG*` lines. `FORWARD`
//! additionally carries a raw binary payload immediately after its header
//! line, so the reader also exposes a fixed-length raw read that drains
//! whatever's already buffered before pulling more off the wire.
//!
//! Grounded on the teacher's `SocketBase::read_raw`/`read_frame` loop
//! (`monocoque-zmtp/src/base.rs`): accumulate into a buffer, try to decode,
//! read more only on a miss. The segmented zero-copy arena that loop used
//! is ZMTP-specific machinery for multipart framing; a line protocol's
//! messages are small and short-lived enough that a plain `BytesMut`
//! accumulator is the idiomatic choice here.

use bytes::{Bytes, BytesMut};
use compio::buf::BufResult;
use compio::io::AsyncRead;
use std::io;

/// Default chunk size for each underlying socket read.
pub const DEFAULT_READ_CHUNK: usize = 4096;

/// Buffers partial reads and yields complete lines (or raw byte runs) off
/// an `AsyncRead` stream. One instance per connection.
pub struct LineReader {
    buf: BytesMut,
    chunk_size: usize,
}

impl LineReader {
    #[must_use]
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_READ_CHUNK)
    }

    #[must_use]
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            chunk_size,
        }
    }

    /// Pulls one LF-terminated line out of the buffer if one is already
    /// present, stripping the trailing `\n` and an optional `\r`. Pure and
    /// synchronous so it's unit-testable without a stream.
    fn take_buffered_line(&mut self) -> Option<Bytes> {
        let pos = self.buf.iter().position(|&b| b == b'\n')?;
        let mut line = self.buf.split_to(pos + 1);
        line.truncate(line.len() - 1);
        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }
        Some(line.freeze())
    }

    /// Reads the next complete line, consuming buffered bytes first.
    /// Returns `Ok(None)` on a clean EOF with no partial line pending.
    pub async fn next_line<S>(&mut self, stream: &mut S) -> io::Result<Option<Bytes>>
    where
        S: AsyncRead + Unpin,
    {
        loop {
            if let Some(line) = self.take_buffered_line() {
                return Ok(Some(line));
            }

            let chunk = vec![0u8; self.chunk_size];
            let BufResult(res, chunk) = stream.read(chunk).await;
            let n = res?;
            if n == 0 {
                return if self.buf.is_empty() {
                    Ok(None)
                } else {
                    Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed mid-line"))
                };
            }
            self.buf.extend_from_slice(&chunk[..n.min(chunk.len())]);
        }
    }

    /// Reads exactly `n` raw bytes, used by `FORWARD <channel> <len>` to
    /// pull its binary payload off the same line-framed socket right after
    /// the header line (§6).
    pub async fn read_exact_n<S>(&mut self, stream: &mut S, n: usize) -> io::Result<Bytes>
    where
        S: AsyncRead + Unpin,
    {
        while self.buf.len() < n {
            let chunk = vec![0u8; self.chunk_size];
            let BufResult(res, chunk) = stream.read(chunk).await;
            let read = res?;
            if read == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed mid-frame"));
            }
            self.buf.extend_from_slice(&chunk[..read.min(chunk.len())]);
        }
        Ok(self.buf.split_to(n).freeze())
    }
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_buffered_line_strips_crlf_and_lf() {
        let mut r = LineReader::new();
        r.buf.extend_from_slice(b"SUB room1\r\nPING\n");
        assert_eq!(r.take_buffered_line().unwrap(), Bytes::from_static(b"SUB room1"));
        assert_eq!(r.take_buffered_line().unwrap(), Bytes::from_static(b"PING"));
        assert!(r.take_buffered_line().is_none());
    }

    #[test]
    fn partial_line_is_not_yielded() {
        let mut r = LineReader::new();
        r.buf.extend_from_slice(b"SUB roo");
        assert!(r.take_buffered_line().is_none());
        r.buf.extend_from_slice(b"m1\n");
        assert_eq!(r.take_buffered_line().unwrap(), Bytes::from_static(b"SUB room1"));
    }

    #[test]
    fn leftover_bytes_after_line_feed_raw_read() {
        let mut r = LineReader::new();
        r.buf.extend_from_slice(b"FORWARD room1 5\nhello");
        assert_eq!(r.take_buffered_line().unwrap(), Bytes::from_static(b"FORWARD room1 5"));
        assert_eq!(r.buf.len(), 5);
        let payload = r.buf.split_to(5).freeze();
        assert_eq!(payload, Bytes::from_static(b"hello"));
    }
}

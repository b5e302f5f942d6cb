//! Line framing for stream transports
//!
//! Client requests, device telemetry sessions and actuator commands all use
//! `\n`-terminated frames. Reads are bounded so a peer that never sends a
//! newline cannot grow a buffer without limit.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::TransportError;

/// Reads bounded `\n`-terminated frames from a stream
pub struct LineReader<R> {
    inner: BufReader<R>,
    max_len: usize,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(inner: R, max_len: usize) -> Self {
        Self {
            inner: BufReader::new(inner),
            max_len,
            buf: Vec::with_capacity(256),
        }
    }

    /// Next frame without its terminator, or `None` at end of stream
    ///
    /// A final unterminated frame is returned as-is. A frame longer than
    /// `max_len` is an error; the stream should be dropped afterwards since
    /// its position is mid-frame.
    pub async fn next_frame(&mut self) -> Result<Option<&[u8]>, TransportError> {
        self.buf.clear();
        let limit = self.max_len as u64 + 1;
        let n = (&mut self.inner)
            .take(limit)
            .read_until(b'\n', &mut self.buf)
            .await
            .map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;

        if n == 0 {
            return Ok(None);
        }

        if self.buf.last() != Some(&b'\n') && self.buf.len() > self.max_len {
            return Err(TransportError::FrameTooLarge(self.buf.len()));
        }

        while matches!(self.buf.last(), Some(b'\n' | b'\r')) {
            self.buf.pop();
        }
        Ok(Some(&self.buf))
    }

    /// Next frame decoded as UTF-8 text (invalid sequences are replaced)
    pub async fn next_line(&mut self) -> Result<Option<String>, TransportError> {
        Ok(self
            .next_frame()
            .await?
            .map(|frame| String::from_utf8_lossy(frame).into_owned()))
    }
}

/// Write one frame followed by `\n` and flush
pub async fn write_line<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &[u8],
) -> Result<(), TransportError> {
    writer
        .write_all(frame)
        .await
        .map_err(|e| TransportError::SendFailed(e.to_string()))?;
    if frame.last() != Some(&b'\n') {
        writer
            .write_all(b"\n")
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
    }
    writer
        .flush()
        .await
        .map_err(|e| TransportError::SendFailed(e.to_string()))
}

//! De-framer for multiplexed container log streams
//!
//! Container runtimes interleave stdout and stderr using 8-byte record
//! headers: `[selector 1|2][0 0 0][u32 big-endian length]`, followed by the
//! payload. Streams allocated with a TTY carry no framing at all, so the
//! decoder falls back to passing bytes through when the first header does not
//! have the expected shape.

use tokio::io::{AsyncRead, AsyncReadExt};

/// Size of a record header
pub const HEADER_LEN: usize = 8;

const RAW_READ_SIZE: usize = 4096;

/// Stateful record decoder, independent of any I/O source
#[derive(Debug, Default)]
pub struct LogFrameDecoder {
    /// Header bytes seen at the end of the previous chunk
    prev_header: Vec<u8>,
    /// Payload bytes still owed by the current record
    bytes_left: usize,
    /// Last payload byte of the current record, for line ending fix-up
    last_byte: Option<u8>,
    /// Framing was not recognised; everything passes through untouched
    passthrough: bool,
}

impl LogFrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the stream has been identified as unframed
    pub fn is_passthrough(&self) -> bool {
        self.passthrough
    }

    /// Decode one raw chunk, appending terminal output to `out`
    ///
    /// Headers and payloads may be split arbitrarily across calls; the output
    /// is the same regardless of how the input was chunked.
    pub fn decode(&mut self, chunk: &[u8], out: &mut Vec<u8>) {
        if self.passthrough {
            out.extend_from_slice(chunk);
            return;
        }

        let mut rest = chunk;

        if self.bytes_left > 0 {
            let take = self.bytes_left.min(rest.len());
            self.emit_payload(&rest[..take], out);
            self.bytes_left -= take;
            rest = &rest[take..];
            if self.bytes_left > 0 {
                return;
            }
            self.finish_record(out);
        }

        let joined;
        if !self.prev_header.is_empty() {
            let mut buf = std::mem::take(&mut self.prev_header);
            buf.extend_from_slice(rest);
            joined = buf;
            rest = &joined;
        }

        while !rest.is_empty() {
            if !header_shape_ok(rest) {
                out.extend_from_slice(rest);
                self.passthrough = true;
                return;
            }
            if rest.len() < HEADER_LEN {
                self.prev_header = rest.to_vec();
                return;
            }

            let len = u32::from_be_bytes([rest[4], rest[5], rest[6], rest[7]]) as usize;
            rest = &rest[HEADER_LEN..];

            let take = len.min(rest.len());
            self.emit_payload(&rest[..take], out);
            rest = &rest[take..];

            if take < len {
                self.bytes_left = len - take;
                return;
            }
            self.finish_record(out);
        }
    }

    fn emit_payload(&mut self, payload: &[u8], out: &mut Vec<u8>) {
        if let Some(&last) = payload.last() {
            self.last_byte = Some(last);
        }
        out.extend_from_slice(payload);
    }

    fn finish_record(&mut self, out: &mut Vec<u8>) {
        if self.last_byte.take() == Some(b'\n') {
            out.push(b'\r');
        }
    }
}

/// Checks the selector and reserved bytes present in `data`
fn header_shape_ok(data: &[u8]) -> bool {
    match data.first() {
        Some(1) | Some(2) => data.iter().skip(1).take(3).all(|&b| b == 0),
        _ => false,
    }
}

/// Async reader that yields de-framed log output
pub struct LogFrameReader<R> {
    inner: R,
    decoder: LogFrameDecoder,
    pending: Vec<u8>,
    offset: usize,
    raw: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LogFrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            decoder: LogFrameDecoder::new(),
            pending: Vec::new(),
            offset: 0,
            raw: vec![0; RAW_READ_SIZE],
        }
    }

    /// Read de-framed output into `buf`
    ///
    /// Returns `Ok(0)` at end of stream. Errors from the underlying stream
    /// are returned unchanged.
    pub async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.offset < self.pending.len() {
                let n = buf.len().min(self.pending.len() - self.offset);
                buf[..n].copy_from_slice(&self.pending[self.offset..self.offset + n]);
                self.offset += n;
                return Ok(n);
            }
            self.pending.clear();
            self.offset = 0;

            let n = self.inner.read(&mut self.raw).await?;
            if n == 0 {
                return Ok(0);
            }
            self.decoder.decode(&self.raw[..n], &mut self.pending);
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

//! Byte reader over a channel of chunks

use tokio::sync::mpsc;

/// Adapts a channel of byte chunks to `read(buf)` semantics
///
/// A chunk larger than the caller's buffer is served across several reads.
/// Once the channel closes and nothing is left over, reads return 0.
#[derive(Debug)]
pub struct ChunkReader<T> {
    rx: mpsc::Receiver<T>,
    leftover: Option<T>,
    offset: usize,
}

impl<T: AsRef<[u8]>> ChunkReader<T> {
    pub fn new(rx: mpsc::Receiver<T>) -> Self {
        Self {
            rx,
            leftover: None,
            offset: 0,
        }
    }

    /// Serve `initial` before anything from the channel
    pub fn with_initial(rx: mpsc::Receiver<T>, initial: T) -> Self {
        Self {
            rx,
            leftover: Some(initial),
            offset: 0,
        }
    }

    pub async fn read(&mut self, buf: &mut [u8]) -> usize {
        if buf.is_empty() {
            return 0;
        }
        loop {
            if let Some(chunk) = &self.leftover {
                let bytes = chunk.as_ref();
                if self.offset < bytes.len() {
                    let n = buf.len().min(bytes.len() - self.offset);
                    buf[..n].copy_from_slice(&bytes[self.offset..self.offset + n]);
                    self.offset += n;
                    return n;
                }
                self.leftover = None;
                self.offset = 0;
            }
            match self.rx.recv().await {
                Some(chunk) => self.leftover = Some(chunk),
                None => return 0,
            }
        }
    }

    /// Stop accepting new chunks; buffered ones remain readable
    pub fn close(&mut self) {
        self.rx.close();
    }
}

//! Log stream presented as a terminal

use std::io;

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio::sync::{Mutex, mpsc};

use super::terminal::Terminal;
use crate::error::ShellError;
use crate::logframe::LogFrameReader;

/// Serves a container log stream to a pump
///
/// Pressing enter inserts a blank line so readers can mark a spot in a
/// followed log. Other keystrokes and resizes are ignored.
pub struct LogTerminal<R> {
    reader: Mutex<LogFrameReader<R>>,
    echo_tx: mpsc::UnboundedSender<()>,
    echo_rx: Mutex<mpsc::UnboundedReceiver<()>>,
}

impl<R: AsyncRead + Unpin + Send> LogTerminal<R> {
    pub fn new(stream: R) -> Self {
        let (echo_tx, echo_rx) = mpsc::unbounded_channel();
        Self {
            reader: Mutex::new(LogFrameReader::new(stream)),
            echo_tx,
            echo_rx: Mutex::new(echo_rx),
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> Terminal for LogTerminal<R> {
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut echo = self.echo_rx.lock().await;
        let mut reader = self.reader.lock().await;
        tokio::select! {
            biased;
            Some(()) = echo.recv() => {
                let line = b"\r\n";
                let n = line.len().min(buf.len());
                buf[..n].copy_from_slice(&line[..n]);
                Ok(n)
            }
            result = reader.read(buf) => result,
        }
    }

    async fn write(&self, data: &[u8]) -> io::Result<usize> {
        if data.first() == Some(&b'\r') {
            let _ = self.echo_tx.send(());
        }
        Ok(data.len())
    }

    async fn resize(&self, _cols: u16, _rows: u16) -> Result<(), ShellError> {
        Ok(())
    }
}

//! What a pump drives: a session, a view, or a log stream

use std::io;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ShellError;

/// Terminal-shaped byte stream served to one connection
#[async_trait]
pub trait Terminal: Send + Sync {
    /// Read output; `Ok(0)` means the terminal side has ended
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write keystrokes; may silently drop them and still report success
    async fn write(&self, data: &[u8]) -> io::Result<usize>;

    async fn resize(&self, cols: u16, rows: u16) -> Result<(), ShellError>;

    /// Liveness pulses for the idle timer, if this terminal produces any
    fn activity(&self) -> Option<mpsc::Receiver<()>> {
        None
    }
}

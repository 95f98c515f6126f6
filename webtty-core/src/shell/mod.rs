//! Shell handle capability
//!
//! A shell handle is the duplex byte stream of a running remote command.
//! Backends produce them (local PTY, tunnel), sessions own them.

mod chunks;
mod mock;
mod pty;

pub use chunks::ChunkReader;
pub use mock::{MockShell, MockShellController};
pub use pty::{PtyShell, ShellCommand};

use std::io;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ShellError;

/// Depth of the activity pulse channel
const ACTIVITY_DEPTH: usize = 1;

/// A running command's terminal stream
#[async_trait]
pub trait ShellHandle: Send + Sync {
    /// Read output; `Ok(0)` means the command's output has ended
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write input to the command
    async fn write(&self, data: &[u8]) -> io::Result<usize>;

    async fn resize(&self, cols: u16, rows: u16) -> Result<(), ShellError>;

    /// Terminate the command; calling it more than once is harmless
    async fn exit(&self) -> Result<(), ShellError>;

    /// Liveness pulses, one per completed read
    ///
    /// The receiver can be taken once; later calls return `None`.
    fn activity(&self) -> Option<mpsc::Receiver<()>>;
}

/// Sending half of an activity channel
///
/// Pulses never block: when the receiver is behind, the pulse is dropped.
#[derive(Debug, Clone)]
pub struct Activity {
    tx: mpsc::Sender<()>,
}

impl Activity {
    pub fn channel() -> (Self, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel(ACTIVITY_DEPTH);
        (Self { tx }, rx)
    }

    pub fn pulse(&self) {
        let _ = self.tx.try_send(());
    }
}

/// Holds an activity receiver until someone takes it
#[derive(Debug, Default)]
pub(crate) struct ActivitySlot(std::sync::Mutex<Option<mpsc::Receiver<()>>>);

impl ActivitySlot {
    pub(crate) fn new(rx: mpsc::Receiver<()>) -> Self {
        Self(std::sync::Mutex::new(Some(rx)))
    }

    pub(crate) fn take(&self) -> Option<mpsc::Receiver<()>> {
        self.0.lock().ok().and_then(|mut slot| slot.take())
    }
}

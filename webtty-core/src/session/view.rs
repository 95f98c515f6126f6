//! Shared views of a session

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use super::arbiter::{Arbiter, ViewId, Writer};
use super::topic::{Chunk, SubscriberGuard, Subscription};
use crate::error::ShellError;
use crate::pump::Terminal;
use crate::shell::{Activity, ActivitySlot, ChunkReader, ShellHandle};

/// A spectator (or collaborator) attached to a [`super::Session`]
///
/// Reads serve the replay snapshot taken at fork time and then live output.
/// Dropping the view unsubscribes it without affecting the session.
pub struct View {
    id: ViewId,
    session_id: String,
    collaborate: bool,
    reader: Mutex<ChunkReader<Chunk>>,
    shell: Arc<dyn ShellHandle>,
    arbiter: Arc<Arbiter>,
    activity_tx: Activity,
    activity: ActivitySlot,
    _guard: SubscriberGuard,
}

impl View {
    pub(crate) fn new(
        id: ViewId,
        session_id: String,
        collaborate: bool,
        snapshot: Vec<u8>,
        subscription: Subscription,
        shell: Arc<dyn ShellHandle>,
        arbiter: Arc<Arbiter>,
    ) -> Self {
        let Subscription { rx, guard } = subscription;
        let (activity_tx, activity_rx) = Activity::channel();
        Self {
            id,
            session_id,
            collaborate,
            reader: Mutex::new(ChunkReader::with_initial(rx, Arc::from(snapshot))),
            shell,
            arbiter,
            activity_tx,
            activity: ActivitySlot::new(activity_rx),
            _guard: guard,
        }
    }

    pub fn id(&self) -> ViewId {
        self.id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn can_write(&self) -> bool {
        self.collaborate
    }

    /// Replayed then live output; `Ok(0)` once the session is closed
    pub async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.reader.lock().await.read(buf).await;
        if n > 0 {
            self.activity_tx.pulse();
        }
        Ok(n)
    }

    /// Attempt a write; read-only views and denied writes drop silently
    pub async fn write(&self, data: &[u8]) -> io::Result<usize> {
        if !self.collaborate {
            return Ok(data.len());
        }
        self.arbiter
            .write(Writer::View(self.id), &*self.shell, data)
            .await
    }
}

#[async_trait]
impl Terminal for View {
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        View::read(self, buf).await
    }

    async fn write(&self, data: &[u8]) -> io::Result<usize> {
        View::write(self, data).await
    }

    /// Only the master sizes the shared terminal
    async fn resize(&self, _cols: u16, _rows: u16) -> Result<(), ShellError> {
        Ok(())
    }

    fn activity(&self) -> Option<mpsc::Receiver<()>> {
        self.activity.take()
    }
}

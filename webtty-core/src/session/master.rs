//! The master side of a shared terminal session

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::arbiter::{Arbiter, Writer};
use super::config::SessionConfig;
use super::replay::ReplayBuffer;
use super::topic::{Chunk, Topic, TopicRegistry};
use super::view::View;
use crate::error::ShellError;
use crate::pump::Terminal;
use crate::shell::ShellHandle;

/// Owner of one live shell, fanning its output out to views
///
/// Output read through [`Session::read`] is handed to a background task that
/// appends it to the replay buffer and publishes it to the topic in one step.
/// [`Session::fork`] snapshots and subscribes under the same lock, so every
/// view sees each byte exactly once: either in its snapshot or live.
pub struct Session {
    id: String,
    shell: Arc<dyn ShellHandle>,
    topic: Arc<Topic>,
    replay: Arc<Mutex<ReplayBuffer>>,
    arbiter: Arc<Arbiter>,
    feed: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    next_view_id: AtomicU64,
}

impl Session {
    /// Take ownership of `shell` and start the replay feed
    ///
    /// Must be called inside a tokio runtime.
    pub fn create(
        shell: Arc<dyn ShellHandle>,
        id: impl Into<String>,
        topics: Arc<TopicRegistry>,
        config: SessionConfig,
    ) -> Self {
        let id = id.into();
        let topic = topics.open(&id);
        let replay = Arc::new(Mutex::new(ReplayBuffer::new(config.replay_capacity)));
        let (feed_tx, feed_rx) = mpsc::unbounded_channel();

        tokio::spawn(drain_feed(
            id.clone(),
            feed_rx,
            Arc::clone(&replay),
            Arc::clone(&topic),
            topics,
        ));

        tracing::info!(session_id = %id, "Session created");

        Self {
            id,
            shell,
            topic,
            replay,
            arbiter: Arc::new(Arbiter::new(config.quiet_window)),
            feed: Mutex::new(Some(feed_tx)),
            next_view_id: AtomicU64::new(1),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Read shell output, feeding views and the replay buffer
    pub async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.shell.read(buf).await?;
        if n > 0 {
            let feed = self.feed.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(tx) = feed.as_ref() {
                // Views are best-effort; the master's read never fails on them
                let _ = tx.send(buf[..n].to_vec());
            }
        }
        Ok(n)
    }

    /// Write as the master, subject to arbitration
    pub async fn write(&self, data: &[u8]) -> io::Result<usize> {
        self.arbiter.write(Writer::Master, &*self.shell, data).await
    }

    /// Attach a new view that replays recent output and then follows live
    pub fn fork(&self, collaborate: bool) -> View {
        let view_id = self.next_view_id.fetch_add(1, Ordering::Relaxed);
        let (snapshot, subscription) = {
            let replay = self.replay.lock().unwrap_or_else(PoisonError::into_inner);
            (replay.snapshot(), self.topic.subscribe())
        };

        tracing::debug!(
            session_id = %self.id,
            view_id,
            collaborate,
            replay_bytes = snapshot.len(),
            "Session forked"
        );

        View::new(
            view_id,
            self.id.clone(),
            collaborate,
            snapshot,
            subscription,
            Arc::clone(&self.shell),
            Arc::clone(&self.arbiter),
        )
    }

    /// Stop publishing; views finish once they drain what was already sent
    ///
    /// The shell itself is left running; call [`Session::exit`] for that.
    pub fn close(&self) {
        let taken = self
            .feed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if taken.is_some() {
            tracing::info!(session_id = %self.id, "Session closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.feed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    pub async fn exit(&self) -> Result<(), ShellError> {
        self.shell.exit().await
    }

    /// Number of views currently following live output
    pub fn view_count(&self) -> usize {
        self.topic.subscriber_count()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

async fn drain_feed(
    id: String,
    mut feed: mpsc::UnboundedReceiver<Vec<u8>>,
    replay: Arc<Mutex<ReplayBuffer>>,
    topic: Arc<Topic>,
    topics: Arc<TopicRegistry>,
) {
    while let Some(bytes) = feed.recv().await {
        let chunk: Chunk = Arc::from(bytes);
        let mut buffer = replay.lock().unwrap_or_else(PoisonError::into_inner);
        buffer.append(&chunk);
        topic.publish(chunk);
    }
    topics.close(&id);
    topic.close();
    tracing::debug!(session_id = %id, "Session feed drained");
}

#[async_trait]
impl Terminal for Session {
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        Session::read(self, buf).await
    }

    async fn write(&self, data: &[u8]) -> io::Result<usize> {
        Session::write(self, data).await
    }

    async fn resize(&self, cols: u16, rows: u16) -> Result<(), ShellError> {
        self.shell.resize(cols, rows).await
    }

    fn activity(&self) -> Option<mpsc::Receiver<()>> {
        self.shell.activity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::config::DEFAULT_SUBSCRIBER_CAPACITY;
    use crate::shell::{MockShell, MockShellController};
    use std::time::Duration;

    fn session() -> (Session, MockShellController, Arc<TopicRegistry>) {
        let (shell, controller) = MockShell::new();
        let topics = Arc::new(TopicRegistry::new(DEFAULT_SUBSCRIBER_CAPACITY));
        let session = Session::create(
            Arc::new(shell),
            "exec-1",
            Arc::clone(&topics),
            SessionConfig::default(),
        );
        (session, controller, topics)
    }

    async fn read_exact(terminal: &dyn Terminal, len: usize) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 64];
        while out.len() < len {
            let n = tokio::time::timeout(Duration::from_secs(1), terminal.read(&mut buf))
                .await
                .expect("read timed out")
                .unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        out
    }

    #[tokio::test]
    async fn read_returns_shell_bytes_unchanged() {
        let (session, controller, _topics) = session();
        controller.push_output(b"prompt$ ");
        assert_eq!(read_exact(&session, 8).await, b"prompt$ ");
    }

    #[tokio::test]
    async fn view_forked_before_read_gets_every_byte() {
        let (session, controller, _topics) = session();
        let view = session.fork(false);

        controller.push_output(b"one ");
        controller.push_output(b"two");
        assert_eq!(read_exact(&session, 7).await, b"one two");
        assert_eq!(read_exact(&view, 7).await, b"one two");
    }

    #[tokio::test]
    async fn late_view_replays_recent_output() {
        let (session, controller, _topics) = session();
        controller.push_output(b"history");
        read_exact(&session, 7).await;
        // Let the feed task publish before forking
        tokio::task::yield_now().await;

        let view = session.fork(false);
        controller.push_output(b"+live");
        read_exact(&session, 5).await;
        assert_eq!(read_exact(&view, 12).await, b"history+live");
    }

    #[tokio::test]
    async fn master_write_reaches_shell() {
        let (session, controller, _topics) = session();
        session.write(b"ls\n").await.unwrap();
        assert_eq!(controller.next_input().await.unwrap(), b"ls\n");
    }

    #[tokio::test]
    async fn close_is_idempotent_and_ends_views() {
        let (session, controller, topics) = session();
        let view = session.fork(false);
        session.close();
        session.close();
        assert!(session.is_closed());

        let mut buf = [0u8; 8];
        let n = tokio::time::timeout(Duration::from_secs(1), view.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n, 0);
        assert!(topics.get("exec-1").is_none());
        // The shell is not touched by close
        assert!(!controller.is_exited());
    }

    #[tokio::test]
    async fn fork_allocates_distinct_view_ids() {
        let (session, _controller, _topics) = session();
        let a = session.fork(true);
        let b = session.fork(true);
        assert_ne!(a.id(), b.id());
        assert_eq!(session.view_count(), 2);
    }
}

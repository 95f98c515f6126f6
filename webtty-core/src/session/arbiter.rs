//! Write arbitration between a session's master and its collaborating views
//!
//! Whoever typed last keeps the keyboard until they have been quiet for the
//! window. Denied writes are dropped but still report every byte as written.

use std::io;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::shell::ShellHandle;

/// Identifies a view forked from a session
pub type ViewId = u64;

/// Who is attempting a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Writer {
    Master,
    View(ViewId),
}

#[derive(Debug, Default)]
struct WriteState {
    last_master_write_at: Option<Instant>,
    last_slave_write_at: Option<Instant>,
    last_writer_view: Option<ViewId>,
}

impl WriteState {
    fn permits(&self, writer: Writer, now: Instant, window: Duration) -> bool {
        let quiet = |at: Option<Instant>| at.is_none_or(|t| now.duration_since(t) > window);
        match writer {
            Writer::Master => quiet(self.last_slave_write_at),
            Writer::View(id) => {
                quiet(self.last_master_write_at)
                    && (self.last_writer_view == Some(id) || quiet(self.last_slave_write_at))
            }
        }
    }

    fn record(&mut self, writer: Writer, now: Instant) {
        match writer {
            Writer::Master => self.last_master_write_at = Some(now),
            Writer::View(id) => {
                self.last_slave_write_at = Some(now);
                self.last_writer_view = Some(id);
            }
        }
    }
}

/// Serializes write decisions for one session
#[derive(Debug)]
pub struct Arbiter {
    window: Duration,
    state: Mutex<WriteState>,
}

impl Arbiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: Mutex::new(WriteState::default()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Write `data` to `shell` if `writer` currently holds the keyboard
    ///
    /// The lock is held across the shell write so two permitted writers can
    /// never interleave.
    pub async fn write(
        &self,
        writer: Writer,
        shell: &dyn ShellHandle,
        data: &[u8],
    ) -> io::Result<usize> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        if !state.permits(writer, now, self.window) {
            tracing::trace!(?writer, bytes = data.len(), "Write dropped by arbitration");
            return Ok(data.len());
        }
        let n = shell.write(data).await?;
        state.record(writer, now);
        Ok(n)
    }
}

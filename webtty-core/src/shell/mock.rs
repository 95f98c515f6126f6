//! In-memory shell handle for tests

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Activity, ActivitySlot, ChunkReader, ShellHandle};
use crate::error::ShellError;

/// Output chunks the controller can queue before pushes are dropped
const OUTPUT_DEPTH: usize = 1024;

#[derive(Debug, Default)]
struct MockState {
    resizes: Mutex<Vec<(u16, u16)>>,
    resize_failures: AtomicUsize,
    exited: AtomicBool,
    exit_calls: AtomicUsize,
}

/// Shell handle whose output is pushed by a [`MockShellController`]
pub struct MockShell {
    output: tokio::sync::Mutex<ChunkReader<Vec<u8>>>,
    input_tx: mpsc::UnboundedSender<Vec<u8>>,
    activity_tx: Activity,
    activity: ActivitySlot,
    state: Arc<MockState>,
}

/// Test-side handle driving a [`MockShell`]
pub struct MockShellController {
    output_tx: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    input_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    state: Arc<MockState>,
}

impl MockShell {
    pub fn new() -> (Self, MockShellController) {
        let (output_tx, output_rx) = mpsc::channel(OUTPUT_DEPTH);
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (activity_tx, activity_rx) = Activity::channel();
        let state = Arc::new(MockState::default());

        let shell = Self {
            output: tokio::sync::Mutex::new(ChunkReader::new(output_rx)),
            input_tx,
            activity_tx,
            activity: ActivitySlot::new(activity_rx),
            state: Arc::clone(&state),
        };
        let controller = MockShellController {
            output_tx: Mutex::new(Some(output_tx)),
            input_rx: tokio::sync::Mutex::new(input_rx),
            state,
        };
        (shell, controller)
    }
}

#[async_trait]
impl ShellHandle for MockShell {
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.output.lock().await.read(buf).await;
        if n > 0 {
            self.activity_tx.pulse();
        }
        Ok(n)
    }

    async fn write(&self, data: &[u8]) -> io::Result<usize> {
        if self.state.exited.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock shell exited"));
        }
        self.input_tx
            .send(data.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "mock input closed"))?;
        Ok(data.len())
    }

    async fn resize(&self, cols: u16, rows: u16) -> Result<(), ShellError> {
        let pending = self.state.resize_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.state.resize_failures.store(pending - 1, Ordering::SeqCst);
            return Err(ShellError::ResizeFailed("mock not ready".to_string()));
        }
        if let Ok(mut resizes) = self.state.resizes.lock() {
            resizes.push((cols, rows));
        }
        Ok(())
    }

    async fn exit(&self) -> Result<(), ShellError> {
        self.state.exit_calls.fetch_add(1, Ordering::SeqCst);
        self.state.exited.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn activity(&self) -> Option<mpsc::Receiver<()>> {
        self.activity.take()
    }
}

impl MockShellController {
    /// Make `data` available to the shell's readers
    pub fn push_output(&self, data: &[u8]) {
        if let Ok(guard) = self.output_tx.lock() {
            if let Some(tx) = guard.as_ref() {
                let _ = tx.try_send(data.to_vec());
            }
        }
    }

    /// End the output stream; pending chunks are still delivered
    pub fn close_output(&self) {
        if let Ok(mut guard) = self.output_tx.lock() {
            guard.take();
        }
    }

    /// Next chunk written to the shell, or `None` once the shell is dropped
    pub async fn next_input(&self) -> Option<Vec<u8>> {
        self.input_rx.lock().await.recv().await
    }

    /// Input written so far, without waiting
    pub async fn drain_input(&self) -> Vec<u8> {
        let mut rx = self.input_rx.lock().await;
        let mut all = Vec::new();
        while let Ok(chunk) = rx.try_recv() {
            all.extend(chunk);
        }
        all
    }

    /// Fail the next `count` resize calls
    pub fn fail_resizes(&self, count: usize) {
        self.state.resize_failures.store(count, Ordering::SeqCst);
    }

    pub fn resizes(&self) -> Vec<(u16, u16)> {
        self.state
            .resizes
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn is_exited(&self) -> bool {
        self.state.exited.load(Ordering::SeqCst)
    }

    pub fn exit_calls(&self) -> usize {
        self.state.exit_calls.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pushed_output_is_readable() {
        let (shell, controller) = MockShell::new();
        controller.push_output(b"hello");
        let mut buf = [0u8; 16];
        let n = shell.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello");
    }

    #[tokio::test]
    async fn close_output_ends_reads() {
        let (shell, controller) = MockShell::new();
        controller.push_output(b"last");
        controller.close_output();
        let mut buf = [0u8; 16];
        assert_eq!(shell.read(&mut buf).await.unwrap(), 4);
        assert_eq!(shell.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn writes_reach_controller() {
        let (shell, controller) = MockShell::new();
        shell.write(b"ls\n").await.unwrap();
        assert_eq!(controller.next_input().await.unwrap(), b"ls\n");
    }

    #[tokio::test]
    async fn write_after_exit_fails() {
        let (shell, controller) = MockShell::new();
        shell.exit().await.unwrap();
        assert!(controller.is_exited());
        assert!(shell.write(b"x").await.is_err());
    }

    #[tokio::test]
    async fn resize_failures_are_consumed() {
        let (shell, controller) = MockShell::new();
        controller.fail_resizes(1);
        assert!(shell.resize(80, 24).await.is_err());
        assert!(shell.resize(80, 24).await.is_ok());
        assert_eq!(controller.resizes(), vec![(80, 24)]);
    }

    #[tokio::test]
    async fn read_pulses_activity() {
        let (shell, controller) = MockShell::new();
        let mut activity = shell.activity().unwrap();
        controller.push_output(b"x");
        let mut buf = [0u8; 4];
        shell.read(&mut buf).await.unwrap();
        assert!(activity.try_recv().is_ok());
    }
}

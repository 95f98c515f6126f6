//! Local process in a pseudo-terminal

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use portable_pty::{Child, CommandBuilder, MasterPty, PtySize, native_pty_system};
use tokio::sync::mpsc;

use super::{Activity, ActivitySlot, ChunkReader, ShellHandle};
use crate::error::ShellError;

const READ_BUF_SIZE: usize = 4096;
const OUTPUT_DEPTH: usize = 64;

/// What to run inside the PTY
#[derive(Debug, Clone)]
pub struct ShellCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: HashMap<String, String>,
    pub cols: u16,
    pub rows: u16,
}

impl ShellCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: HashMap::new(),
            cols: 80,
            rows: 24,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn size(mut self, cols: u16, rows: u16) -> Self {
        self.cols = cols;
        self.rows = rows;
        self
    }
}

/// Shell handle backed by a local PTY
pub struct PtyShell {
    output: tokio::sync::Mutex<ChunkReader<Vec<u8>>>,
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
    master: Mutex<Box<dyn MasterPty + Send>>,
    child: Mutex<Box<dyn Child + Send + Sync>>,
    activity: ActivitySlot,
}

impl PtyShell {
    /// Spawn `command` in a new PTY
    ///
    /// Must be called inside a tokio runtime.
    pub fn spawn(command: &ShellCommand) -> Result<Self, ShellError> {
        tracing::info!(
            program = %command.program,
            args = ?command.args,
            cols = command.cols,
            rows = command.rows,
            "Spawning PTY shell"
        );

        let pair = native_pty_system()
            .openpty(PtySize {
                rows: command.rows,
                cols: command.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| ShellError::CreateFailed(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&command.program);
        cmd.args(&command.args);
        if let Some(dir) = &command.cwd {
            cmd.cwd(dir);
        }
        for (key, value) in &command.env {
            cmd.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| ShellError::SpawnFailed(e.to_string()))?;
        // Only the child keeps the slave side open, so reads end when it exits
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| ShellError::Io(io::Error::other(e)))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| ShellError::Io(io::Error::other(e)))?;

        let (tx, rx) = mpsc::channel(OUTPUT_DEPTH);
        let (activity, activity_rx) = Activity::channel();
        spawn_reader_thread(reader, tx, activity)?;

        Ok(Self {
            output: tokio::sync::Mutex::new(ChunkReader::new(rx)),
            writer: Arc::new(Mutex::new(writer)),
            master: Mutex::new(pair.master),
            child: Mutex::new(child),
            activity: ActivitySlot::new(activity_rx),
        })
    }
}

fn spawn_reader_thread(
    mut reader: Box<dyn Read + Send>,
    tx: mpsc::Sender<Vec<u8>>,
    activity: Activity,
) -> Result<(), ShellError> {
    std::thread::Builder::new()
        .name("pty-reader".to_string())
        .spawn(move || {
            let mut buf = [0u8; READ_BUF_SIZE];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        activity.pulse();
                        if tx.blocking_send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        // EIO is how Linux reports the child side closing
                        tracing::debug!(error = %e, "PTY reader stopped");
                        break;
                    }
                }
            }
        })
        .map(|_| ())
        .map_err(ShellError::Io)
}

fn poisoned() -> io::Error {
    io::Error::other("PTY lock poisoned")
}

#[async_trait]
impl ShellHandle for PtyShell {
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.output.lock().await.read(buf).await)
    }

    async fn write(&self, data: &[u8]) -> io::Result<usize> {
        let writer = Arc::clone(&self.writer);
        let data = data.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut writer = writer.lock().map_err(|_| poisoned())?;
            writer.write_all(&data)?;
            writer.flush()?;
            Ok(data.len())
        })
        .await
        .map_err(io::Error::other)?
    }

    async fn resize(&self, cols: u16, rows: u16) -> Result<(), ShellError> {
        let master = self
            .master
            .lock()
            .map_err(|_| ShellError::ResizeFailed("PTY lock poisoned".to_string()))?;
        master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| ShellError::ResizeFailed(e.to_string()))
    }

    async fn exit(&self) -> Result<(), ShellError> {
        let mut child = self.child.lock().map_err(|_| ShellError::Io(poisoned()))?;
        if let Ok(Some(_)) = child.try_wait() {
            return Ok(());
        }
        if let Err(e) = child.kill() {
            // Already gone between try_wait and kill
            tracing::debug!(error = %e, "PTY child kill failed");
        }
        let _ = child.try_wait();
        Ok(())
    }

    fn activity(&self) -> Option<mpsc::Receiver<()>> {
        self.activity.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn read_until(shell: &PtyShell, needle: &[u8]) -> Vec<u8> {
        let mut collected = Vec::new();
        let mut buf = [0u8; 256];
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !collected.windows(needle.len()).any(|w| w == needle) {
            let n = tokio::time::timeout_at(deadline, shell.read(&mut buf))
                .await
                .expect("timed out waiting for PTY output")
                .unwrap();
            if n == 0 {
                break;
            }
            collected.extend_from_slice(&buf[..n]);
        }
        collected
    }

    #[tokio::test]
    async fn cat_echoes_input() {
        let shell = PtyShell::spawn(&ShellCommand::new("cat")).unwrap();
        shell.write(b"hello pty\n").await.unwrap();
        let output = read_until(&shell, b"hello pty").await;
        assert!(String::from_utf8_lossy(&output).contains("hello pty"));
        shell.exit().await.unwrap();
    }

    #[tokio::test]
    async fn resize_succeeds_on_live_pty() {
        let shell = PtyShell::spawn(&ShellCommand::new("cat")).unwrap();
        shell.resize(132, 50).await.unwrap();
        shell.exit().await.unwrap();
    }

    #[tokio::test]
    async fn exit_is_idempotent() {
        let shell = PtyShell::spawn(&ShellCommand::new("cat")).unwrap();
        shell.exit().await.unwrap();
        shell.exit().await.unwrap();
    }

    #[tokio::test]
    async fn activity_pulses_on_output() {
        let shell = PtyShell::spawn(&ShellCommand::new("echo").arg("ping")).unwrap();
        let mut activity = shell.activity().unwrap();
        assert!(shell.activity().is_none());
        tokio::time::timeout(Duration::from_secs(5), activity.recv())
            .await
            .expect("no activity pulse");
    }

    #[tokio::test]
    async fn read_ends_when_process_exits() {
        let shell = PtyShell::spawn(&ShellCommand::new("echo").arg("done")).unwrap();
        let output = read_until(&shell, b"\0never").await;
        assert!(String::from_utf8_lossy(&output).contains("done"));
    }
}

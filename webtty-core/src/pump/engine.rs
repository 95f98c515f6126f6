//! Per-connection pump between a transport and a terminal

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use super::terminal::Terminal;
use super::transport::{Frame, FrameSink, FrameSource};
use crate::error::{PumpError, TransportError};
use crate::wire::{ClientMessage, ServerMessage};

/// Terminal output read per message
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Why a connection ended without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The browser side went away first
    MasterClosed,
    /// The terminal side ended first
    SlaveClosed,
    /// No terminal activity within the idle timeout
    IdleTimeout,
    /// The server is shutting down
    Cancelled,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CloseReason::MasterClosed => "tab closed",
            CloseReason::SlaveClosed => "backend closed",
            CloseReason::IdleTimeout => "time out",
            CloseReason::Cancelled => "cancelation",
        };
        f.write_str(text)
    }
}

/// Connection behaviour
#[derive(Debug, Clone)]
pub struct PumpOptions {
    /// Forward browser input to the terminal
    pub permit_write: bool,
    /// Close after this long without terminal activity
    pub idle_timeout: Option<Duration>,
    /// Sent once at start
    pub window_title: Vec<u8>,
    /// JSON preferences for the browser terminal
    pub preferences: Option<Vec<u8>>,
    /// Seconds the browser should wait before reconnecting
    pub reconnect: Option<u64>,
    pub buffer_size: usize,
}

impl Default for PumpOptions {
    fn default() -> Self {
        Self {
            permit_write: false,
            idle_timeout: None,
            window_title: Vec::new(),
            preferences: None,
            reconnect: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

/// Bridges one transport and one terminal until either side ends
pub struct Pump {
    terminal: Arc<dyn Terminal>,
    options: PumpOptions,
}

impl Pump {
    pub fn new(terminal: Arc<dyn Terminal>, options: PumpOptions) -> Self {
        Self { terminal, options }
    }

    /// Run until the transport closes, the terminal ends, the idle timer
    /// fires or `cancel` is triggered, whichever happens first
    pub async fn run<Src, Snk>(
        &self,
        source: &mut Src,
        sink: &mut Snk,
        cancel: CancellationToken,
    ) -> Result<CloseReason, PumpError>
    where
        Src: FrameSource + ?Sized,
        Snk: FrameSink + ?Sized,
    {
        let activity = self.terminal.activity();
        self.send_initial(sink).await?;

        let sink = Mutex::new(sink);
        let terminal = &*self.terminal;

        tokio::select! {
            result = pump_input(source, &sink, terminal, self.options.permit_write) => result,
            result = pump_output(&sink, terminal, self.options.buffer_size) => result,
            reason = watch_idle(activity, self.options.idle_timeout) => Ok(reason),
            _ = cancel.cancelled() => Ok(CloseReason::Cancelled),
        }
    }

    async fn send_initial<Snk>(&self, sink: &mut Snk) -> Result<(), PumpError>
    where
        Snk: FrameSink + ?Sized,
    {
        send(sink, ServerMessage::SetWindowTitle(self.options.window_title.clone())).await?;
        if let Some(secs) = self.options.reconnect {
            send(sink, ServerMessage::SetReconnect(secs)).await?;
        }
        if let Some(prefs) = &self.options.preferences {
            send(sink, ServerMessage::SetPreferences(prefs.clone())).await?;
        }
        Ok(())
    }
}

async fn send<Snk>(sink: &mut Snk, message: ServerMessage) -> Result<(), TransportError>
where
    Snk: FrameSink + ?Sized,
{
    sink.send_frame(Frame::from_bytes(message.encode())).await
}

async fn pump_input<Src, Snk>(
    source: &mut Src,
    sink: &Mutex<&mut Snk>,
    terminal: &dyn Terminal,
    permit_write: bool,
) -> Result<CloseReason, PumpError>
where
    Src: FrameSource + ?Sized,
    Snk: FrameSink + ?Sized,
{
    while let Some(frame) = source.next_frame().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(TransportError::Closed) => break,
            Err(e) => return Err(e.into()),
        };
        match ClientMessage::decode(frame.as_bytes())? {
            ClientMessage::Input(data) => {
                if permit_write {
                    match terminal.write(&data).await {
                        Ok(_) => {}
                        Err(e) if is_gone(&e) => {
                            tracing::debug!(error = %e, "Terminal write end closed");
                            return Ok(CloseReason::SlaveClosed);
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            }
            ClientMessage::Ping => {
                let mut sink = sink.lock().await;
                match send(&mut **sink, ServerMessage::Pong).await {
                    Ok(()) => {}
                    Err(TransportError::Closed) => return Ok(CloseReason::MasterClosed),
                    Err(e) => return Err(e.into()),
                }
            }
            ClientMessage::ResizeTerminal(size) => {
                let (cols, rows) = size.dimensions();
                if let Err(e) = terminal.resize(cols, rows).await {
                    tracing::warn!(cols, rows, error = %e, "Resize failed");
                }
            }
        }
    }
    Ok(CloseReason::MasterClosed)
}

async fn pump_output<Snk>(
    sink: &Mutex<&mut Snk>,
    terminal: &dyn Terminal,
    buffer_size: usize,
) -> Result<CloseReason, PumpError>
where
    Snk: FrameSink + ?Sized,
{
    let mut buf = vec![0u8; buffer_size.max(1)];
    loop {
        let n = match terminal.read(&mut buf).await {
            Ok(0) => return Ok(CloseReason::SlaveClosed),
            Ok(n) => n,
            Err(e) => {
                tracing::debug!(error = %e, "Terminal read failed");
                return Ok(CloseReason::SlaveClosed);
            }
        };
        let mut sink = sink.lock().await;
        match send(&mut **sink, ServerMessage::Output(buf[..n].to_vec())).await {
            Ok(()) => {}
            Err(TransportError::Closed) => return Ok(CloseReason::MasterClosed),
            Err(e) => return Err(e.into()),
        }
    }
}

/// Write errors meaning the terminal's input side has gone away
fn is_gone(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::BrokenPipe | io::ErrorKind::NotConnected | io::ErrorKind::ConnectionReset
    )
}

/// Resolves when no activity pulse arrives within `timeout`
///
/// Never resolves without a timeout, or once the activity source closes.
async fn watch_idle(activity: Option<mpsc::Receiver<()>>, timeout: Option<Duration>) -> CloseReason {
    let Some(timeout) = timeout else {
        return std::future::pending().await;
    };
    let Some(mut activity) = activity else {
        tokio::time::sleep(timeout).await;
        return CloseReason::IdleTimeout;
    };

    let sleep = tokio::time::sleep(timeout);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            () = &mut sleep => return CloseReason::IdleTimeout,
            pulse = activity.recv() => match pulse {
                Some(()) => sleep.as_mut().reset(tokio::time::Instant::now() + timeout),
                None => return std::future::pending().await,
            },
        }
    }
}

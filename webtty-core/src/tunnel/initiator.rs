//! Initiator side of the exec tunnel

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use super::frame::{CmdFrame, TunnelFrame, TunnelReply, TunnelRequest, WindowSize};
use crate::backend::{ByteStream, ContainerInfo, ExecOptions, LogOptions};
use crate::error::{ShellError, TunnelError};
use crate::pump::{FrameSink, FrameSource};
use crate::shell::{Activity, ActivitySlot, ChunkReader, ShellHandle};

const OUTPUT_DEPTH: usize = 64;

/// A freshly opened tunnel stream
pub type TunnelStream = (Box<dyn FrameSource>, Box<dyn FrameSink>);

/// Opens tunnel streams to one responder
#[async_trait]
pub trait TunnelConnector: Send + Sync {
    async fn connect(&self) -> Result<TunnelStream, TunnelError>;

    /// Address of the responder, used for logs and routing
    fn address(&self) -> &str;
}

/// Typed requests over a [`TunnelConnector`]
#[derive(Clone)]
pub struct TunnelClient {
    connector: Arc<dyn TunnelConnector>,
    auth: String,
}

impl TunnelClient {
    pub fn new(connector: Arc<dyn TunnelConnector>, auth: impl Into<String>) -> Self {
        Self {
            connector,
            auth: auth.into(),
        }
    }

    pub fn address(&self) -> &str {
        self.connector.address()
    }

    /// Open a stream, send hello and wait for the reply
    async fn open(&self, request: TunnelRequest) -> Result<(TunnelStream, TunnelReply), TunnelError> {
        let (mut source, mut sink) = self.connector.connect().await?;
        let hello = TunnelFrame::Hello {
            auth: self.auth.clone(),
            request,
        };
        sink.send_frame(hello.to_frame()?).await?;
        let reply = read_reply(&mut *source).await?;
        Ok(((source, sink), reply))
    }

    async fn call(&self, request: TunnelRequest) -> Result<TunnelReply, TunnelError> {
        let ((_source, mut sink), reply) = self.open(request).await?;
        let _ = sink.close().await;
        Ok(reply)
    }

    /// Name of the responder's backend
    pub async fn ping(&self) -> Result<String, TunnelError> {
        match self.call(TunnelRequest::Ping).await? {
            TunnelReply::Pong { backend } => Ok(backend),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn list(&self) -> Result<Vec<ContainerInfo>, TunnelError> {
        match self.call(TunnelRequest::List).await? {
            TunnelReply::Containers(list) => Ok(list),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn get_info(&self, id: &str) -> Result<ContainerInfo, TunnelError> {
        match self.call(TunnelRequest::GetInfo { id: id.to_string() }).await? {
            TunnelReply::Info(info) => Ok(info),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn start(&self, id: &str) -> Result<(), TunnelError> {
        self.expect_done(TunnelRequest::Start { id: id.to_string() }).await
    }

    pub async fn stop(&self, id: &str) -> Result<(), TunnelError> {
        self.expect_done(TunnelRequest::Stop { id: id.to_string() }).await
    }

    pub async fn restart(&self, id: &str) -> Result<(), TunnelError> {
        self.expect_done(TunnelRequest::Restart { id: id.to_string() }).await
    }

    async fn expect_done(&self, request: TunnelRequest) -> Result<(), TunnelError> {
        match self.call(request).await? {
            TunnelReply::Done => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    /// Exec into a remote container
    pub async fn exec(
        &self,
        container: ContainerInfo,
        opts: ExecOptions,
    ) -> Result<TunnelShell, TunnelError> {
        let ((source, sink), reply) = self
            .open(TunnelRequest::Exec { container, opts })
            .await?;
        match reply {
            TunnelReply::Ready => Ok(TunnelShell::new(source, sink)),
            other => Err(unexpected(&other)),
        }
    }

    /// Raw log bytes of a remote container
    pub async fn logs(&self, options: LogOptions) -> Result<ByteStream, TunnelError> {
        let ((source, sink), reply) = self.open(TunnelRequest::Logs { options }).await?;
        match reply {
            TunnelReply::Ready => Ok(Box::new(TunnelLogStream::new(source, sink))),
            other => Err(unexpected(&other)),
        }
    }
}

async fn read_reply(source: &mut dyn FrameSource) -> Result<TunnelReply, TunnelError> {
    let frame = source
        .next_frame()
        .await
        .ok_or_else(|| TunnelError::Handshake("stream closed before reply".to_string()))??;
    match TunnelFrame::from_frame(&frame)? {
        TunnelFrame::Reply(reply) => Ok(reply),
        TunnelFrame::Error { message } => Err(TunnelError::Remote(message)),
        other => Err(TunnelError::Handshake(format!("expected reply, got {other:?}"))),
    }
}

fn unexpected(reply: &TunnelReply) -> TunnelError {
    TunnelError::Handshake(format!("unexpected reply {reply:?}"))
}

/// Forward `out` payloads from `source` into `tx` until the stream ends
fn spawn_output_task(
    mut source: Box<dyn FrameSource>,
    tx: mpsc::Sender<Vec<u8>>,
    activity: Option<Activity>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = source.next_frame().await {
            let frame = match frame.map_err(TunnelError::from).and_then(|f| TunnelFrame::from_frame(&f)) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::debug!(error = %e, "Tunnel stream failed");
                    break;
                }
            };
            match frame {
                TunnelFrame::Cmd(CmdFrame::Out(data)) => {
                    if let Some(activity) = &activity {
                        activity.pulse();
                    }
                    if tx.send(data).await.is_err() {
                        break;
                    }
                }
                TunnelFrame::Error { message } => {
                    tracing::warn!(error = %message, "Tunnel responder reported an error");
                    break;
                }
                other => tracing::debug!(?other, "Ignoring unexpected tunnel frame"),
            }
        }
    })
}

/// Shell handle whose bytes travel through a tunnel stream
pub struct TunnelShell {
    output: Mutex<ChunkReader<Vec<u8>>>,
    // Taken on exit so the responder sees the stream end
    sink: Mutex<Option<Box<dyn FrameSink>>>,
    activity: ActivitySlot,
    output_task: JoinHandle<()>,
    exited: AtomicBool,
}

impl TunnelShell {
    pub fn new(source: Box<dyn FrameSource>, sink: Box<dyn FrameSink>) -> Self {
        let (tx, rx) = mpsc::channel(OUTPUT_DEPTH);
        let (activity, activity_rx) = Activity::channel();
        let output_task = spawn_output_task(source, tx, Some(activity));
        Self {
            output: Mutex::new(ChunkReader::new(rx)),
            sink: Mutex::new(Some(sink)),
            activity: ActivitySlot::new(activity_rx),
            output_task,
            exited: AtomicBool::new(false),
        }
    }

    async fn send(&self, frame: TunnelFrame) -> io::Result<()> {
        let frame = frame.to_frame().map_err(io::Error::other)?;
        let mut sink = self.sink.lock().await;
        let sink = sink
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "tunnel closed"))?;
        sink.send_frame(frame)
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::BrokenPipe, e))
    }
}

#[async_trait]
impl ShellHandle for TunnelShell {
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.output.lock().await.read(buf).await)
    }

    async fn write(&self, data: &[u8]) -> io::Result<usize> {
        if self.exited.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "tunnel closed"));
        }
        self.send(TunnelFrame::Cmd(CmdFrame::In(data.to_vec())))
            .await?;
        Ok(data.len())
    }

    async fn resize(&self, cols: u16, rows: u16) -> Result<(), ShellError> {
        self.send(TunnelFrame::Ws(WindowSize {
            width: cols,
            height: rows,
        }))
        .await
        .map_err(|e| ShellError::ResizeFailed(e.to_string()))
    }

    async fn exit(&self) -> Result<(), ShellError> {
        if self.exited.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(mut sink) = self.sink.lock().await.take() {
            if let Err(e) = sink.close().await {
                tracing::debug!(error = %e, "Tunnel close failed");
            }
        }
        self.output_task.abort();
        Ok(())
    }

    fn activity(&self) -> Option<mpsc::Receiver<()>> {
        self.activity.take()
    }
}

impl Drop for TunnelShell {
    fn drop(&mut self) {
        self.output_task.abort();
    }
}

/// Remote log bytes as an `AsyncRead`
struct TunnelLogStream {
    rx: mpsc::Receiver<Vec<u8>>,
    leftover: Vec<u8>,
    offset: usize,
    output_task: JoinHandle<()>,
    // Dropping the sink tells the responder to stop streaming
    _sink: Box<dyn FrameSink>,
}

impl TunnelLogStream {
    fn new(source: Box<dyn FrameSource>, sink: Box<dyn FrameSink>) -> Self {
        let (tx, rx) = mpsc::channel(OUTPUT_DEPTH);
        Self {
            rx,
            leftover: Vec::new(),
            offset: 0,
            output_task: spawn_output_task(source, tx, None),
            _sink: sink,
        }
    }
}

impl AsyncRead for TunnelLogStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        while this.offset >= this.leftover.len() {
            match this.rx.poll_recv(cx) {
                Poll::Ready(Some(chunk)) => {
                    this.leftover = chunk;
                    this.offset = 0;
                }
                Poll::Ready(None) => return Poll::Ready(Ok(())),
                Poll::Pending => return Poll::Pending,
            }
        }
        let n = buf.remaining().min(this.leftover.len() - this.offset);
        buf.put_slice(&this.leftover[this.offset..this.offset + n]);
        this.offset += n;
        Poll::Ready(Ok(()))
    }
}

impl Drop for TunnelLogStream {
    fn drop(&mut self) {
        self.output_task.abort();
    }
}

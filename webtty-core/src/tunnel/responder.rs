//! Responder side of the exec tunnel
//!
//! Runs next to the real backend. Each tunnel stream carries exactly one
//! request, authenticated by its first frame.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::frame::{CmdFrame, TunnelFrame, TunnelReply, TunnelRequest};
use super::retry::{RetryPolicy, resize_with_retry};
use crate::backend::{ByteStream, ContainerAction, ContainerBackend};
use crate::error::{BackendError, TunnelError};
use crate::pump::{FrameSink, FrameSource};
use crate::shell::ShellHandle;

const RELAY_BUFFER_SIZE: usize = 2048;

/// Serves tunnel streams against a local backend
pub struct TunnelResponder {
    backend: Arc<dyn ContainerBackend>,
    auth: Option<String>,
    resize_policy: RetryPolicy,
}

impl TunnelResponder {
    /// `auth` empty or `None` accepts every initiator
    pub fn new(backend: Arc<dyn ContainerBackend>, auth: Option<String>) -> Self {
        Self {
            backend,
            auth: auth.filter(|a| !a.is_empty()),
            resize_policy: RetryPolicy::resize_policy(),
        }
    }

    /// Handle one tunnel stream from hello to close
    pub async fn serve<Src, Snk>(
        &self,
        source: &mut Src,
        sink: &mut Snk,
        cancel: CancellationToken,
    ) -> Result<(), TunnelError>
    where
        Src: FrameSource + ?Sized,
        Snk: FrameSink + ?Sized,
    {
        let request = match self.handshake(source).await {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "Tunnel handshake rejected");
                let _ = sink.send_frame(TunnelFrame::error(e.to_string()).to_frame()?).await;
                let _ = sink.close().await;
                return Err(e);
            }
        };

        let result = self.dispatch(request, source, sink, cancel).await;
        if let Err(e) = &result {
            let _ = sink.send_frame(TunnelFrame::error(e.to_string()).to_frame()?).await;
        }
        let _ = sink.close().await;
        result
    }

    async fn handshake<Src>(&self, source: &mut Src) -> Result<TunnelRequest, TunnelError>
    where
        Src: FrameSource + ?Sized,
    {
        let frame = source
            .next_frame()
            .await
            .ok_or_else(|| TunnelError::Handshake("stream closed before hello".to_string()))??;
        let TunnelFrame::Hello { auth, request } = TunnelFrame::from_frame(&frame)? else {
            return Err(TunnelError::Handshake("first frame must be hello".to_string()));
        };
        if let Some(expected) = &self.auth {
            if &auth != expected {
                return Err(TunnelError::Auth);
            }
        }
        Ok(request)
    }

    async fn dispatch<Src, Snk>(
        &self,
        request: TunnelRequest,
        source: &mut Src,
        sink: &mut Snk,
        cancel: CancellationToken,
    ) -> Result<(), TunnelError>
    where
        Src: FrameSource + ?Sized,
        Snk: FrameSink + ?Sized,
    {
        let backend = &*self.backend;
        let reply = match request {
            TunnelRequest::Ping => TunnelReply::Pong {
                backend: backend.name().to_string(),
            },
            TunnelRequest::List => TunnelReply::Containers(backend.list().await.map_err(remote)?),
            TunnelRequest::GetInfo { id } => {
                TunnelReply::Info(backend.get_info(&id).await.map_err(remote)?)
            }
            TunnelRequest::Start { id } => action(backend, ContainerAction::Start, &id).await?,
            TunnelRequest::Stop { id } => action(backend, ContainerAction::Stop, &id).await?,
            TunnelRequest::Restart { id } => action(backend, ContainerAction::Restart, &id).await?,
            TunnelRequest::Exec { container, opts } => {
                let shell = backend.exec(&container, opts).await.map_err(remote)?;
                tracing::info!(container = %container.id, "Tunnel exec started");
                sink.send_frame(TunnelFrame::Reply(TunnelReply::Ready).to_frame()?)
                    .await?;
                let result = self.relay_shell(&*shell, source, sink, cancel).await;
                if let Err(e) = shell.exit().await {
                    tracing::warn!(container = %container.id, error = %e, "Failed to exit shell");
                }
                tracing::info!(container = %container.id, "Tunnel exec ended");
                return result;
            }
            TunnelRequest::Logs { options } => {
                let stream = backend.logs(options).await.map_err(remote)?;
                sink.send_frame(TunnelFrame::Reply(TunnelReply::Ready).to_frame()?)
                    .await?;
                return relay_logs(stream, source, sink, cancel).await;
            }
        };
        sink.send_frame(TunnelFrame::Reply(reply).to_frame()?).await?;
        Ok(())
    }

    /// Pump shell bytes both ways until either side closes
    async fn relay_shell<Src, Snk>(
        &self,
        shell: &dyn ShellHandle,
        source: &mut Src,
        sink: &mut Snk,
        cancel: CancellationToken,
    ) -> Result<(), TunnelError>
    where
        Src: FrameSource + ?Sized,
        Snk: FrameSink + ?Sized,
    {
        let inbound = async {
            while let Some(frame) = source.next_frame().await {
                match TunnelFrame::from_frame(&frame?)? {
                    TunnelFrame::Cmd(CmdFrame::In(data)) => {
                        shell
                            .write(&data)
                            .await
                            .map_err(|e| TunnelError::Remote(e.to_string()))?;
                    }
                    TunnelFrame::Ws(size) => {
                        resize_with_retry(shell, size.width, size.height, self.resize_policy).await;
                    }
                    other => tracing::debug!(?other, "Ignoring unexpected tunnel frame"),
                }
            }
            Ok::<(), TunnelError>(())
        };

        let outbound = async {
            let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
            loop {
                let n = shell
                    .read(&mut buf)
                    .await
                    .map_err(|e| TunnelError::Remote(e.to_string()))?;
                if n == 0 {
                    return Ok::<(), TunnelError>(());
                }
                let frame = TunnelFrame::Cmd(CmdFrame::Out(buf[..n].to_vec()));
                sink.send_frame(frame.to_frame()?).await?;
            }
        };

        tokio::select! {
            result = inbound => result,
            result = outbound => result,
            _ = cancel.cancelled() => Ok(()),
        }
    }
}

async fn relay_logs<Src, Snk>(
    mut stream: ByteStream,
    source: &mut Src,
    sink: &mut Snk,
    cancel: CancellationToken,
) -> Result<(), TunnelError>
where
    Src: FrameSource + ?Sized,
    Snk: FrameSink + ?Sized,
{
    use tokio::io::AsyncReadExt;

    let outbound = async {
        let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
        loop {
            let n = stream
                .read(&mut buf)
                .await
                .map_err(|e| TunnelError::Remote(e.to_string()))?;
            if n == 0 {
                return Ok::<(), TunnelError>(());
            }
            let frame = TunnelFrame::Cmd(CmdFrame::Out(buf[..n].to_vec()));
            sink.send_frame(frame.to_frame()?).await?;
        }
    };
    // Only watch for the initiator going away
    let closed = async { while let Some(Ok(_)) = source.next_frame().await {} };

    tokio::select! {
        result = outbound => result,
        () = closed => Ok(()),
        _ = cancel.cancelled() => Ok(()),
    }
}

async fn action(
    backend: &dyn ContainerBackend,
    action: ContainerAction,
    id: &str,
) -> Result<TunnelReply, TunnelError> {
    tracing::info!(container = %id, action = action.as_str(), "Tunnel container action");
    action.apply(backend, id).await.map_err(remote)?;
    Ok(TunnelReply::Done)
}

fn remote(err: BackendError) -> TunnelError {
    TunnelError::Remote(err.to_string())
}

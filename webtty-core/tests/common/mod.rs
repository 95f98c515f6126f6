//! Shared helpers for webtty-core integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use webtty_core::pump::transport::channel_pair;
use webtty_core::tunnel::TunnelStream;
use webtty_core::{
    ContainerBackend, Frame, FrameSource, MockBackend, ServerMessage, TunnelConnector,
    TunnelError, TunnelResponder,
};

pub const CONTAINER_ID: &str = "4f1c2d3e4a5b6c7d8e9f";

/// Backend with one running container named `web`
pub fn mock_backend() -> Arc<MockBackend> {
    Arc::new(MockBackend::single(CONTAINER_ID, "/web"))
}

/// Connector that serves every stream with an in-process responder
pub struct ChannelConnector {
    responder: Arc<TunnelResponder>,
    cancel: CancellationToken,
}

impl ChannelConnector {
    pub fn new(backend: Arc<dyn ContainerBackend>, auth: Option<&str>) -> Self {
        Self {
            responder: Arc::new(TunnelResponder::new(backend, auth.map(String::from))),
            cancel: CancellationToken::new(),
        }
    }
}

impl Drop for ChannelConnector {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[async_trait]
impl TunnelConnector for ChannelConnector {
    async fn connect(&self) -> Result<TunnelStream, TunnelError> {
        let ((local_rx, local_tx), (mut remote_rx, mut remote_tx)) = channel_pair(16);
        let responder = self.responder.clone();
        let cancel = self.cancel.child_token();
        tokio::spawn(async move {
            let _ = responder.serve(&mut remote_rx, &mut remote_tx, cancel).await;
        });
        Ok((Box::new(local_rx), Box::new(local_tx)))
    }

    fn address(&self) -> &str {
        "in-memory"
    }
}

/// Next frame from `source` decoded as a server message
pub async fn next_message<S: FrameSource + ?Sized>(source: &mut S) -> Option<ServerMessage> {
    let frame: Frame = tokio::time::timeout(Duration::from_secs(2), source.next_frame())
        .await
        .ok()??
        .ok()?;
    ServerMessage::decode(frame.as_bytes()).ok()
}

/// Collect output messages until `expected` bytes arrived
pub async fn read_output<S: FrameSource + ?Sized>(source: &mut S, expected: usize) -> Vec<u8> {
    let mut out = Vec::new();
    while out.len() < expected {
        match next_message(source).await {
            Some(ServerMessage::Output(data)) => out.extend(data),
            Some(_) => {}
            None => break,
        }
    }
    out
}

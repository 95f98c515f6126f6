//! Tunnel streams over outgoing WebSocket connections

use async_trait::async_trait;
use futures::StreamExt;
use webtty_core::tunnel::TunnelStream;
use webtty_core::{TransportError, TunnelConnector, TunnelError};

use crate::ws::{TungsteniteSink, TungsteniteSource};

/// Opens a new WebSocket to a remote `/tunnel` per stream
#[derive(Debug, Clone)]
pub struct WsConnector {
    address: String,
    url: String,
}

impl WsConnector {
    /// `address` is `host:port` or a full `ws://`/`wss://` base URL
    pub fn new(address: impl Into<String>) -> Self {
        let address = address.into();
        let base = if address.contains("://") {
            address.trim_end_matches('/').to_string()
        } else {
            format!("ws://{address}")
        };
        Self {
            url: format!("{base}/tunnel"),
            address,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TunnelConnector for WsConnector {
    async fn connect(&self) -> Result<TunnelStream, TunnelError> {
        let (socket, _response) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::Failed(format!("{}: {e}", self.url)))?;
        let (sink, stream) = socket.split();
        Ok((
            Box::new(TungsteniteSource(stream)),
            Box::new(TungsteniteSink(sink)),
        ))
    }

    fn address(&self) -> &str {
        &self.address
    }
}

//! Frame transport abstraction
//!
//! The pump and the tunnel speak in whole messages. WebSocket halves are
//! adapted to these traits by the server; in-memory channels implement them
//! here so everything above can be tested without sockets.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;

/// One transport message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    /// Text frame when `data` is valid UTF-8, binary otherwise
    pub fn from_bytes(data: Vec<u8>) -> Self {
        match String::from_utf8(data) {
            Ok(text) => Frame::Text(text),
            Err(e) => Frame::Binary(e.into_bytes()),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Frame::Text(text) => text.as_bytes(),
            Frame::Binary(data) => data,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Frame::Text(_))
    }
}

/// Receiving half of a transport
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame, or `None` once the peer has closed
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>>;
}

/// Sending half of a transport
#[async_trait]
pub trait FrameSink: Send {
    async fn send_frame(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Close the transport politely
    async fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

#[async_trait]
impl FrameSource for mpsc::Receiver<Frame> {
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        self.recv().await.map(Ok)
    }
}

#[async_trait]
impl FrameSink for mpsc::Sender<Frame> {
    async fn send_frame(&mut self, frame: Frame) -> Result<(), TransportError> {
        self.send(frame).await.map_err(|_| TransportError::Closed)
    }
}

/// Two connected in-memory transports
///
/// Frames sent on one end's sink arrive at the other end's source.
pub fn channel_pair(
    depth: usize,
) -> (
    (mpsc::Receiver<Frame>, mpsc::Sender<Frame>),
    (mpsc::Receiver<Frame>, mpsc::Sender<Frame>),
) {
    let (a_tx, a_rx) = mpsc::channel(depth);
    let (b_tx, b_rx) = mpsc::channel(depth);
    ((a_rx, b_tx), (b_rx, a_tx))
}

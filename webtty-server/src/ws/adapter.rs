//! Frame transport over WebSocket halves
//!
//! Browser sockets (axum) and outgoing tunnel sockets (tungstenite) both end
//! up as [`FrameSource`]/[`FrameSink`] pairs so the pump and the tunnel never
//! see a concrete socket type.

use std::borrow::Cow;

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite;
use webtty_core::{Frame, FrameSink, FrameSource, TransportError};

/// Close code for policy violations such as a bad token
pub const CLOSE_POLICY: u16 = 1008;

/// Close code for server-side failures
pub const CLOSE_ERROR: u16 = 1011;

/// Receiving half of a browser socket
pub struct AxumSource(SplitStream<WebSocket>);

/// Sending half of a browser socket
pub struct AxumSink(SplitSink<WebSocket, Message>);

/// Split an upgraded socket into frame halves
pub fn split_axum(socket: WebSocket) -> (AxumSource, AxumSink) {
    let (sink, stream) = socket.split();
    (AxumSource(stream), AxumSink(sink))
}

#[async_trait]
impl FrameSource for AxumSource {
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        loop {
            match self.0.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(Frame::Text(text.to_string()))),
                Ok(Message::Binary(data)) => return Some(Ok(Frame::Binary(data.to_vec()))),
                Ok(Message::Close(_)) => return None,
                // Control frames are answered by axum
                Ok(Message::Ping(_) | Message::Pong(_)) => continue,
                Err(e) => return Some(Err(TransportError::Failed(e.to_string()))),
            }
        }
    }
}

#[async_trait]
impl FrameSink for AxumSink {
    async fn send_frame(&mut self, frame: Frame) -> Result<(), TransportError> {
        let message = match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(data) => Message::Binary(data.into()),
        };
        self.0.send(message).await.map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.0.close().await.map_err(|_| TransportError::Closed)
    }
}

impl AxumSink {
    /// Send a close frame carrying `reason` to the browser
    pub async fn close_with(&mut self, code: u16, reason: &str) {
        let frame = CloseFrame {
            code,
            reason: Cow::Owned(reason.to_string()),
        };
        if let Err(e) = self.0.send(Message::Close(Some(frame))).await {
            tracing::debug!(error = %e, "Failed to send close frame");
        }
    }
}

/// Receiving half of an outgoing tunnel socket
pub struct TungsteniteSource<S>(pub S);

/// Sending half of an outgoing tunnel socket
pub struct TungsteniteSink<S>(pub S);

#[async_trait]
impl<S> FrameSource for TungsteniteSource<S>
where
    S: Stream<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin + Send,
{
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        loop {
            match self.0.next().await? {
                Ok(tungstenite::Message::Text(text)) => {
                    return Some(Ok(Frame::Text(text.as_str().to_owned())));
                }
                Ok(tungstenite::Message::Binary(data)) => {
                    return Some(Ok(Frame::Binary(data.to_vec())));
                }
                Ok(tungstenite::Message::Close(_)) => return None,
                Ok(_) => continue,
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return None;
                }
                Err(e) => return Some(Err(TransportError::Failed(e.to_string()))),
            }
        }
    }
}

#[async_trait]
impl<S> FrameSink for TungsteniteSink<S>
where
    S: Sink<tungstenite::Message, Error = tungstenite::Error> + Unpin + Send,
{
    async fn send_frame(&mut self, frame: Frame) -> Result<(), TransportError> {
        let message = match frame {
            Frame::Text(text) => tungstenite::Message::Text(text.into()),
            Frame::Binary(data) => tungstenite::Message::Binary(data.into()),
        };
        self.0.send(message).await.map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.0.close().await.map_err(|_| TransportError::Closed)
    }
}

//! WebSocket test client speaking the browser terminal protocol
//!
//! Note: Some methods may appear unused because they're only used in specific
//! test files and clippy checks each test independently.

use std::net::SocketAddr;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use webtty_core::{ClientMessage, ServerMessage};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How a terminal socket ended
#[derive(Debug, PartialEq, Eq)]
pub enum Closed {
    Clean,
    WithReason(u16, String),
}

/// Browser-side terminal connection
pub struct TerminalClient {
    sink: SplitSink<WsStream, Message>,
    stream: SplitStream<WsStream>,
}

impl TerminalClient {
    /// Connect to `path` and send the init message
    pub async fn connect(addr: SocketAddr, path: &str, arguments: &str, token: &str) -> Self {
        let url = format!("ws://{addr}{path}");
        let (ws, _) = tokio_tungstenite::connect_async(&url)
            .await
            .expect("Failed to connect");
        let (sink, stream) = ws.split();
        let mut client = Self { sink, stream };
        let init = serde_json::json!({ "Arguments": arguments, "AuthToken": token });
        client
            .sink
            .send(Message::Text(init.to_string().into()))
            .await
            .unwrap();
        client
    }

    #[allow(dead_code)]
    pub async fn send(&mut self, message: ClientMessage) {
        let text = String::from_utf8(message.encode()).unwrap();
        self.sink.send(Message::Text(text.into())).await.unwrap();
    }

    #[allow(dead_code)]
    pub async fn input(&mut self, data: &[u8]) {
        self.send(ClientMessage::Input(data.to_vec())).await;
    }

    /// Next decoded server message, `None` once the socket closes
    pub async fn recv(&mut self) -> Option<ServerMessage> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => {
                    return Some(ServerMessage::decode(text.as_bytes()).expect("bad message"));
                }
                Ok(Message::Binary(data)) => {
                    return Some(ServerMessage::decode(&data).expect("bad message"));
                }
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => continue,
            }
        }
    }

    /// Skip everything up to the window title and return it
    #[allow(dead_code)]
    pub async fn expect_title(&mut self) -> String {
        match self.recv_timeout(Duration::from_secs(2)).await {
            Some(ServerMessage::SetWindowTitle(title)) => String::from_utf8(title).unwrap(),
            other => panic!("expected window title, got {other:?}"),
        }
    }

    #[allow(dead_code)]
    pub async fn recv_timeout(&mut self, duration: Duration) -> Option<ServerMessage> {
        tokio::time::timeout(duration, self.recv()).await.ok().flatten()
    }

    /// Collect output until `expected` bytes arrived
    #[allow(dead_code)]
    pub async fn read_output(&mut self, expected: usize) -> Vec<u8> {
        let mut out = Vec::new();
        while out.len() < expected {
            match self.recv_timeout(Duration::from_secs(2)).await {
                Some(ServerMessage::Output(data)) => out.extend(data),
                Some(_) => {}
                None => break,
            }
        }
        out
    }

    /// Wait for the server to close the socket
    #[allow(dead_code)]
    pub async fn closed(&mut self) -> Closed {
        let wait = async {
            loop {
                match self.stream.next().await {
                    Some(Ok(Message::Close(Some(frame)))) => {
                        return Closed::WithReason(u16::from(frame.code), frame.reason.as_str().to_owned());
                    }
                    Some(Ok(Message::Close(None))) | None | Some(Err(_)) => return Closed::Clean,
                    Some(Ok(_)) => continue,
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(2), wait)
            .await
            .expect("socket was not closed")
    }

    #[allow(dead_code)]
    pub async fn close(mut self) {
        let _ = self.sink.send(Message::Close(None)).await;
    }
}

#[allow(dead_code)]
pub fn policy_code() -> u16 {
    u16::from(CloseCode::Policy)
}

//! Tunnel frame schema
//!
//! Each frame is one JSON text message. Byte payloads are base64 strings.

use serde::{Deserialize, Serialize};

use crate::backend::{ContainerInfo, ExecOptions, LogOptions};
use crate::error::TunnelError;
use crate::pump::Frame;

/// What the initiator wants from the responder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TunnelRequest {
    Ping,
    List,
    GetInfo {
        id: String,
    },
    Start {
        id: String,
    },
    Stop {
        id: String,
    },
    Restart {
        id: String,
    },
    Exec {
        container: ContainerInfo,
        #[serde(default)]
        opts: ExecOptions,
    },
    Logs {
        options: LogOptions,
    },
}

impl TunnelRequest {
    /// Whether the stream stays open for I/O after the reply
    pub fn is_streaming(&self) -> bool {
        matches!(self, TunnelRequest::Exec { .. } | TunnelRequest::Logs { .. })
    }
}

/// Successful answer to a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TunnelReply {
    Pong { backend: String },
    Containers(Vec<ContainerInfo>),
    Info(ContainerInfo),
    Done,
    /// The shell or log stream is open; I/O frames follow
    Ready,
}

/// Terminal bytes in one direction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmdFrame {
    /// Keystrokes, initiator to responder
    In(#[serde(with = "base64_bytes")] Vec<u8>),
    /// Output, responder to initiator
    Out(#[serde(with = "base64_bytes")] Vec<u8>),
}

/// Terminal size change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSize {
    pub width: u16,
    pub height: u16,
}

/// One message on a tunnel stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TunnelFrame {
    /// Always the first frame from the initiator
    Hello {
        auth: String,
        request: TunnelRequest,
    },
    Reply(TunnelReply),
    Cmd(CmdFrame),
    Ws(WindowSize),
    Error {
        message: String,
    },
}

impl TunnelFrame {
    pub fn to_frame(&self) -> Result<Frame, TunnelError> {
        Ok(Frame::Text(serde_json::to_string(self)?))
    }

    pub fn from_frame(frame: &Frame) -> Result<Self, TunnelError> {
        Ok(serde_json::from_slice(frame.as_bytes())?)
    }

    pub fn error(message: impl Into<String>) -> Self {
        TunnelFrame::Error {
            message: message.into(),
        }
    }
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

//! Error types for webtty-core

use thiserror::Error;

/// Top-level error type for webtty-core
#[derive(Error, Debug)]
pub enum WebTtyError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Shell error: {0}")]
    Shell(#[from] ShellError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Pump error: {0}")]
    Pump(#[from] PumpError),

    #[error("Tunnel error: {0}")]
    Tunnel(#[from] TunnelError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

/// Errors decoding browser-facing wire messages
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unexpected zero length message")]
    Empty,

    /// Message framing cannot be trusted after this
    #[error("unknown message tag: {0:#04x}")]
    UnknownTag(u8),

    #[error("invalid resize payload: {0}")]
    InvalidResize(String),

    #[error("invalid payload for message tag {tag:#04x}: {reason}")]
    InvalidPayload { tag: u8, reason: String },
}

/// Errors from a shell handle
#[derive(Error, Debug)]
pub enum ShellError {
    #[error("Failed to create PTY: {0}")]
    CreateFailed(String),

    #[error("Failed to spawn process: {0}")]
    SpawnFailed(String),

    #[error("Resize failed: {0}")]
    ResizeFailed(String),

    #[error("Shell closed")]
    Closed,

    #[error("Shell I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the session registry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("session already exists: {0}")]
    AlreadyExists(String),

    #[error("session not found: {0}")]
    NotFound(String),
}

/// Errors from a frame transport (WebSocket or in-memory channel)
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,

    #[error("transport failure: {0}")]
    Failed(String),
}

/// Fatal errors while running a terminal connection
///
/// Legitimate endings are reported as [`crate::pump::CloseReason`], not here.
#[derive(Error, Debug)]
pub enum PumpError {
    #[error("failed to authenticate websocket connection")]
    Auth,

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("terminal I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the cross-process exec tunnel
#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("tunnel authentication failed")]
    Auth,

    #[error("tunnel handshake failed: {0}")]
    Handshake(String),

    #[error("tunnel frame codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("tunnel transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("remote error: {0}")]
    Remote(String),
}

/// Errors from container backends
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("container not found: {0}")]
    NotFound(String),

    #[error("operation not supported by {backend} backend: {operation}")]
    Unsupported { backend: String, operation: String },

    #[error("exec failed: {0}")]
    Exec(String),

    #[error("remote backend error: {0}")]
    Remote(String),

    #[error("shell error: {0}")]
    Shell(#[from] ShellError),

    #[error("backend I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TunnelError> for BackendError {
    fn from(err: TunnelError) -> Self {
        BackendError::Remote(err.to_string())
    }
}

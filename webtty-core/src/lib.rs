//! webtty-core - terminal session engine for webtty
//!
//! This crate provides:
//! - The browser wire protocol ([`wire`])
//! - De-framing of multiplexed container log streams ([`logframe`])
//! - Shell handles for local PTYs and tests ([`shell`])
//! - Shared sessions with replay and write arbitration ([`session`])
//! - The per-connection pump ([`pump`])
//! - The cross-process exec tunnel ([`tunnel`])
//! - The container backend capability and a local process backend ([`backend`])
//! - Audit recording ([`audit`])

pub mod audit;
pub mod backend;
pub mod error;
pub mod logframe;
pub mod pump;
pub mod session;
pub mod shell;
pub mod tunnel;
pub mod wire;

pub use audit::AuditConfig;
pub use backend::{
    ByteStream, ContainerAction, ContainerBackend, ContainerCache, ContainerInfo, ExecOptions,
    LogOptions, MockBackend, ProcessBackend, ProcessBackendConfig, ProcessTarget,
};
pub use error::{
    BackendError, ProtocolError, PumpError, SessionError, ShellError, TransportError, TunnelError,
    WebTtyError,
};
pub use logframe::{LogFrameDecoder, LogFrameReader};
pub use pump::{
    CloseReason, Frame, FrameSink, FrameSource, InitMessage, LogTerminal, Pump, PumpOptions,
    Terminal,
};
pub use session::{ExecClaim, Session, SessionConfig, SessionRegistry, TopicRegistry, View};
pub use shell::{MockShell, MockShellController, PtyShell, ShellCommand, ShellHandle};
pub use tunnel::{TunnelClient, TunnelConnector, TunnelResponder, TunnelShell};
pub use wire::{ClientMessage, ServerMessage};

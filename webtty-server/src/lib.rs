//! webtty-server - HTTP and WebSocket server for webtty
//!
//! This crate serves browser terminals for the containers of one
//! [`ContainerBackend`]: REST endpoints for listing and controlling containers,
//! WebSocket endpoints for exec, shared views and logs, and the tunnel
//! endpoint that lets other instances drive the local backend.

mod error;
pub mod http;
pub mod remote;
mod state;
pub mod ws;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use webtty_core::pump::DEFAULT_TITLE_FORMAT;
use webtty_core::{AuditConfig, ContainerBackend, SessionConfig};

pub use error::ServerError;
pub use http::create_router;
pub use remote::{RemoteBackend, WsConnector};
pub use state::{AppState, ConnectionGuard};

/// The main webtty server
pub struct WebTtyServer {
    state: Arc<AppState>,
}

impl WebTtyServer {
    /// Create a server for `backend`
    pub fn new(config: ServerConfig, backend: Arc<dyn ContainerBackend>) -> Self {
        Self {
            state: Arc::new(AppState::new(config, backend)),
        }
    }

    /// Create a server with custom state (for testing)
    pub fn with_state(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Get the server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// Get the shared application state
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Run the server, binding to the configured address
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = self.config().addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.clone(),
                source: e,
            })?;
        self.run_with_listener(listener).await
    }

    /// Run the server on an already bound listener
    pub async fn run_with_listener(self, listener: TcpListener) -> Result<(), ServerError> {
        let local = listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_default();
        tracing::info!(
            addr = %local,
            backend = self.state.backend.name(),
            permit_write = self.state.config.permit_write,
            "webtty server listening"
        );

        let shutdown = self.state.shutdown.clone();
        let router = create_router(Arc::clone(&self.state));
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))?;

        tracing::info!("webtty server stopped");
        Ok(())
    }

    /// Stop accepting connections and end every running pump
    pub fn shutdown(&self) {
        self.state.shutdown.cancel();
    }
}

/// Which container lifecycle actions the HTTP API exposes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlConfig {
    /// Master switch; nothing below applies while off
    pub enable: bool,
    pub start: bool,
    pub stop: bool,
    pub restart: bool,
}

impl ControlConfig {
    /// Every action enabled
    pub fn all() -> Self {
        Self {
            enable: true,
            start: true,
            stop: true,
            restart: true,
        }
    }

    pub fn allows(&self, action: webtty_core::ContainerAction) -> bool {
        use webtty_core::ContainerAction;

        self.enable
            && match action {
                ContainerAction::Start => self.start,
                ContainerAction::Stop => self.stop,
                ContainerAction::Restart => self.restart,
            }
    }
}

/// Serving the local backend to other instances
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TunnelConfig {
    pub enabled: bool,
    /// Shared secret initiators must present
    pub auth: Option<String>,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Token browsers must send in the init message
    pub credential: Option<String>,
    /// Close terminals without output for this long
    pub idle_timeout: Option<Duration>,
    /// Concurrent terminal connections, 0 for unlimited
    pub max_connections: usize,
    /// Forward browser keystrokes to exec shells
    pub permit_write: bool,
    /// Expose `/ws/share/:exec_id`
    pub enable_share: bool,
    /// Shared views may type
    pub collaborate: bool,
    pub title_format: String,
    /// Browser terminal preferences sent at start
    pub preferences: Option<serde_json::Value>,
    /// Seconds the browser waits before reconnecting
    pub reconnect: Option<u64>,
    pub session: SessionConfig,
    pub control: ControlConfig,
    pub audit: AuditConfig,
    pub tunnel: TunnelConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            credential: None,
            idle_timeout: None,
            max_connections: 0,
            permit_write: true,
            enable_share: false,
            collaborate: false,
            title_format: DEFAULT_TITLE_FORMAT.to_string(),
            preferences: None,
            reconnect: None,
            session: SessionConfig::default(),
            control: ControlConfig::default(),
            audit: AuditConfig::default(),
            tunnel: TunnelConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create a new ServerConfig with the specified host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Returns the socket address string (e.g., "0.0.0.0:8080")
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

//! Shared application state for the webtty server

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use webtty_core::{ContainerBackend, SessionRegistry, TunnelResponder};

use crate::ServerConfig;

/// Shared application state accessible by all handlers
pub struct AppState {
    pub config: ServerConfig,
    /// Where containers come from
    pub backend: Arc<dyn ContainerBackend>,
    /// Live exec sessions keyed by exec id
    pub sessions: Arc<SessionRegistry>,
    /// Serves `/tunnel` when enabled
    pub responder: Option<Arc<TunnelResponder>>,
    /// Cancelled when the server shuts down
    pub shutdown: CancellationToken,
    /// When the server started
    pub started_at: DateTime<Utc>,
    connections: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(config: ServerConfig, backend: Arc<dyn ContainerBackend>) -> Self {
        let responder = config.tunnel.enabled.then(|| {
            Arc::new(TunnelResponder::new(
                Arc::clone(&backend),
                config.tunnel.auth.clone(),
            ))
        });
        Self {
            sessions: Arc::new(SessionRegistry::new(config.session)),
            config,
            backend,
            responder,
            shutdown: CancellationToken::new(),
            started_at: Utc::now(),
            connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns how long the server has been running
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }

    /// Terminal connections currently open
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Claim a terminal connection slot, honouring `max_connections`
    pub fn acquire_connection(&self) -> Option<ConnectionGuard> {
        let max = self.config.max_connections;
        let claimed = self
            .connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (max == 0 || current < max).then_some(current + 1)
            });
        claimed.ok().map(|_| ConnectionGuard {
            connections: Arc::clone(&self.connections),
        })
    }
}

/// Releases its connection slot on drop
pub struct ConnectionGuard {
    connections: Arc<AtomicUsize>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.connections.fetch_sub(1, Ordering::SeqCst);
    }
}

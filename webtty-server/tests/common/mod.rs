//! Shared test utilities for webtty-server integration tests

pub mod client;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use webtty_core::{ContainerBackend, MockBackend};
use webtty_server::{AppState, ServerConfig, WebTtyServer};

#[allow(dead_code)]
pub const CONTAINER_ID: &str = "0123456789abcdef0123";

/// Backend with one running container named `web`
#[allow(dead_code)]
pub fn mock_backend() -> Arc<MockBackend> {
    Arc::new(MockBackend::single(CONTAINER_ID, "/web"))
}

/// Creates a test server over `backend`, returns state and address
#[allow(dead_code)]
pub async fn create_test_server(
    config: ServerConfig,
    backend: Arc<dyn ContainerBackend>,
) -> (Arc<AppState>, SocketAddr) {
    let state = Arc::new(AppState::new(config, backend));
    let server = WebTtyServer::with_state(Arc::clone(&state));
    let addr = spawn_server(server).await;
    (state, addr)
}

/// Spawns server in background task, returns bound address
async fn spawn_server(server: WebTtyServer) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let _ = server.run_with_listener(listener).await;
    });

    // Brief delay to ensure server is accepting connections
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;

    addr
}

/// Ask the server for a fresh exec id
#[allow(dead_code)]
pub async fn allocate_exec(state: &AppState, container_id: &str) -> String {
    state.sessions.allocate(container_id).await
}

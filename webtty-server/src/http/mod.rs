//! HTTP server module

mod api;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::AppState;
use crate::ws;

pub use api::{ActionResponse, ContainerListResponse, ExecResponse, HealthResponse};

/// Create the HTTP router with all routes configured
///
/// Share and tunnel routes exist only when enabled in the config.
pub fn create_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/api/health", get(api::health))
        .route("/api/containers", get(api::list_containers))
        .route("/api/containers/:id", get(api::get_container))
        .route("/api/containers/:id/:action", post(api::container_action))
        .route("/api/exec/:container_id", post(api::allocate_exec))
        .route("/ws/exec/:exec_id", get(ws::exec_ws))
        .route("/ws/logs/:container_id", get(ws::logs_ws));

    if state.config.enable_share {
        router = router.route("/ws/share/:exec_id", get(ws::share_ws));
    }
    if state.config.tunnel.enabled {
        router = router.route("/tunnel", get(ws::tunnel_ws));
    }

    router
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ServerConfig;
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use webtty_core::MockBackend;

    fn server(config: ServerConfig) -> TestServer {
        let backend = Arc::new(MockBackend::single("0123456789abcdef", "/web"));
        let state = Arc::new(AppState::new(config, backend));
        TestServer::new(create_router(state)).unwrap()
    }

    #[tokio::test]
    async fn test_router_has_health_endpoint() {
        let response = server(ServerConfig::default()).get("/api/health").await;
        response.assert_status_ok();
    }

    #[tokio::test]
    async fn share_route_requires_enable_share() {
        let server = server(ServerConfig::default());
        server
            .get("/ws/share/abc")
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn tunnel_route_requires_tunnel_enabled() {
        let server = server(ServerConfig::default());
        server.get("/tunnel").await.assert_status(StatusCode::NOT_FOUND);
    }
}

//! REST API handlers

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use webtty_core::{ContainerAction, ContainerInfo};

use crate::AppState;
use crate::error::ServerError;

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status of the server
    pub status: String,
    /// Server version
    pub version: String,
    /// Seconds since server started
    pub uptime_seconds: i64,
    /// Number of live exec sessions
    pub active_sessions: usize,
    /// Open terminal connections
    pub connections: usize,
    pub backend: String,
}

/// Health check endpoint
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        active_sessions: state.sessions.len().await,
        connections: state.connection_count(),
        backend: state.backend.name().to_string(),
    })
}

/// Response for listing containers
#[derive(Debug, Serialize, Deserialize)]
pub struct ContainerListResponse {
    pub containers: Vec<ContainerInfo>,
}

/// GET /api/containers
pub async fn list_containers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ContainerListResponse>, ServerError> {
    let containers = state.backend.list().await?;
    Ok(Json(ContainerListResponse { containers }))
}

/// GET /api/containers/:id - full id, short id or unique prefix
pub async fn get_container(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ContainerInfo>, ServerError> {
    Ok(Json(state.backend.get_info(&id).await?))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActionResponse {
    pub id: String,
    pub action: ContainerAction,
}

/// POST /api/containers/:id/:action
pub async fn container_action(
    State(state): State<Arc<AppState>>,
    Path((id, action)): Path<(String, String)>,
) -> Result<Json<ActionResponse>, ServerError> {
    let action = ContainerAction::parse(&action)
        .ok_or_else(|| ServerError::BadRequest(format!("unknown action {action:?}")))?;
    if !state.config.control.allows(action) {
        return Err(ServerError::Forbidden(format!("{} is disabled", action.as_str())));
    }
    let info = state.backend.get_info(&id).await?;
    tracing::info!(container = %info.id, action = action.as_str(), "Container action");
    action.apply(&*state.backend, &info.id).await?;
    Ok(Json(ActionResponse { id: info.id, action }))
}

/// Response for a new exec id
#[derive(Debug, Serialize, Deserialize)]
pub struct ExecResponse {
    pub exec_id: String,
    pub container_id: String,
}

/// POST /api/exec/:container_id
///
/// The browser then opens `/ws/exec/:exec_id` to start the shell.
pub async fn allocate_exec(
    State(state): State<Arc<AppState>>,
    Path(container_id): Path<String>,
) -> Result<Json<ExecResponse>, ServerError> {
    let info = state.backend.get_info(&container_id).await?;
    let exec_id = state.sessions.allocate(&info.id).await;
    tracing::debug!(container = %info.id, exec_id = %exec_id, "Allocated exec id");
    Ok(Json(ExecResponse {
        exec_id,
        container_id: info.id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ControlConfig, ServerConfig, create_router};
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use webtty_core::MockBackend;

    const ID: &str = "0123456789abcdef";

    fn setup(config: ServerConfig) -> (TestServer, Arc<MockBackend>, Arc<AppState>) {
        let backend = Arc::new(MockBackend::single(ID, "/web"));
        let state = Arc::new(AppState::new(config, backend.clone()));
        let server = TestServer::new(create_router(Arc::clone(&state))).unwrap();
        (server, backend, state)
    }

    #[tokio::test]
    async fn health_reports_backend() {
        let (server, _, _) = setup(ServerConfig::default());
        let health: HealthResponse = server.get("/api/health").await.json();
        assert_eq!(health.status, "ok");
        assert_eq!(health.backend, "mock");
        assert_eq!(health.active_sessions, 0);
    }

    #[tokio::test]
    async fn lists_containers() {
        let (server, _, _) = setup(ServerConfig::default());
        let list: ContainerListResponse = server.get("/api/containers").await.json();
        assert_eq!(list.containers.len(), 1);
        assert_eq!(list.containers[0].id, ID);
    }

    #[tokio::test]
    async fn get_container_by_short_id() {
        let (server, _, _) = setup(ServerConfig::default());
        let info: ContainerInfo = server.get("/api/containers/0123456789ab").await.json();
        assert_eq!(info.id, ID);

        server
            .get("/api/containers/nope")
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn actions_are_forbidden_by_default() {
        let (server, backend, _) = setup(ServerConfig::default());
        server
            .post(&format!("/api/containers/{ID}/restart"))
            .await
            .assert_status(StatusCode::FORBIDDEN);
        assert!(backend.actions().is_empty());
    }

    #[tokio::test]
    async fn enabled_action_reaches_backend() {
        let config = ServerConfig {
            control: ControlConfig {
                enable: true,
                restart: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let (server, backend, _) = setup(config);

        let response: ActionResponse = server
            .post("/api/containers/0123/restart")
            .await
            .json();
        assert_eq!(response.id, ID);
        assert_eq!(backend.actions(), vec![(ContainerAction::Restart, ID.to_string())]);

        server
            .post(&format!("/api/containers/{ID}/stop"))
            .await
            .assert_status(StatusCode::FORBIDDEN);
        server
            .post(&format!("/api/containers/{ID}/kill"))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn allocate_exec_remembers_target() {
        let (server, _, state) = setup(ServerConfig::default());
        let response: ExecResponse = server.post("/api/exec/0123456789ab").await.json();
        assert_eq!(response.container_id, ID);
        assert_eq!(
            state.sessions.target(&response.exec_id).await.as_deref(),
            Some(ID)
        );
    }

    #[tokio::test]
    async fn allocate_exec_for_unknown_container() {
        let (server, _, _) = setup(ServerConfig::default());
        server
            .post("/api/exec/missing")
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
}

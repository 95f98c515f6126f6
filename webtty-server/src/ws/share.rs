//! `/ws/share/:exec_id`: watch or join someone else's exec session

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Path, State};
use axum::response::Response;
use webtty_core::pump::read_init_message;
use webtty_core::{CloseReason, ContainerInfo, FrameSink, FrameSource, Pump, Session};

use super::{PROTOCOL, client_label, finish, pump_options, reject_busy, split_axum};
use crate::AppState;
use crate::error::ServerError;

/// WebSocket upgrade handler for shared views
pub async fn share_ws(
    ws: WebSocketUpgrade,
    Path(exec_id): Path<String>,
    connect: Option<ConnectInfo<SocketAddr>>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let client = client_label(connect);
    ws.protocols([PROTOCOL])
        .on_upgrade(move |socket| handle_share(socket, state, exec_id, client))
}

async fn handle_share(socket: WebSocket, state: Arc<AppState>, exec_id: String, client: String) {
    let (mut source, mut sink) = split_axum(socket);
    let Some(_slot) = state.acquire_connection() else {
        reject_busy(&mut sink, &client, state.config.max_connections).await;
        return;
    };
    tracing::info!(client = %client, exec_id = %exec_id, "New share client connected");

    let result: Result<CloseReason, ServerError> = async {
        read_init_message(&mut source, state.config.credential.as_deref()).await?;
        let session = state
            .sessions
            .get(&exec_id)
            .await
            .ok_or_else(|| ServerError::SessionNotFound(exec_id.clone()))?;
        let collaborate = state.config.collaborate;
        attach(&state, &exec_id, &session, collaborate, &mut source, &mut sink).await
    }
    .await;
    finish(&mut sink, &client, result).await;
}

/// Run a pump over a fresh view of `session`
pub(super) async fn attach<Src, Snk>(
    state: &AppState,
    exec_id: &str,
    session: &Session,
    collaborate: bool,
    source: &mut Src,
    sink: &mut Snk,
) -> Result<CloseReason, ServerError>
where
    Src: FrameSource + ?Sized,
    Snk: FrameSink + ?Sized,
{
    let info = container_for(state, exec_id).await;
    let view = Arc::new(session.fork(collaborate));
    let permit_write = collaborate && state.config.permit_write;
    let pump = Pump::new(view, pump_options(&state.config, &info, permit_write));
    Ok(pump.run(source, sink, state.shutdown.child_token()).await?)
}

/// Container behind an exec id, for the window title
async fn container_for(state: &AppState, exec_id: &str) -> ContainerInfo {
    let Some(id) = state.sessions.target(exec_id).await else {
        return ContainerInfo::default();
    };
    match state.backend.get_info(&id).await {
        Ok(info) => info,
        Err(_) => ContainerInfo {
            id,
            ..Default::default()
        },
    }
}

//! `/ws/exec/:exec_id`: run or join an exec session

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Path, State};
use axum::response::Response;
use webtty_core::pump::read_init_message;
use webtty_core::{CloseReason, ExecClaim, ExecOptions, FrameSink, FrameSource, Pump, audit};

use super::{PROTOCOL, client_label, finish, pump_options, reject_busy, share, split_axum};
use crate::AppState;
use crate::error::ServerError;

/// WebSocket upgrade handler for exec terminals
pub async fn exec_ws(
    ws: WebSocketUpgrade,
    Path(exec_id): Path<String>,
    connect: Option<ConnectInfo<SocketAddr>>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let client = client_label(connect);
    ws.protocols([PROTOCOL])
        .on_upgrade(move |socket| handle_exec(socket, state, exec_id, client))
}

async fn handle_exec(socket: WebSocket, state: Arc<AppState>, exec_id: String, client: String) {
    let (mut source, mut sink) = split_axum(socket);
    let Some(_slot) = state.acquire_connection() else {
        reject_busy(&mut sink, &client, state.config.max_connections).await;
        return;
    };
    tracing::info!(
        client = %client,
        exec_id = %exec_id,
        connections = state.connection_count(),
        "New client connected"
    );

    let result = serve_exec(&state, &exec_id, &client, &mut source, &mut sink).await;
    finish(&mut sink, &client, result).await;
}

/// The first connection for an exec id owns the shell; later ones share it
async fn serve_exec<Src, Snk>(
    state: &AppState,
    exec_id: &str,
    client: &str,
    source: &mut Src,
    sink: &mut Snk,
) -> Result<CloseReason, ServerError>
where
    Src: FrameSource + ?Sized,
    Snk: FrameSink + ?Sized,
{
    let init = read_init_message(source, state.config.credential.as_deref()).await?;

    let (container_id, starting) = match state.sessions.claim(exec_id).await {
        Some(ExecClaim::Join(session)) => {
            let collaborate = state.config.collaborate;
            return share::attach(state, exec_id, &session, collaborate, source, sink).await;
        }
        Some(ExecClaim::Start {
            container_id,
            guard,
        }) => (container_id, guard),
        None => return Err(ServerError::SessionNotFound(exec_id.to_string())),
    };
    let info = state.backend.get_info(&container_id).await?;
    let opts = ExecOptions::from_query(&init.arguments);
    tracing::debug!(exec_id = %exec_id, container = %info.id, ?opts, "Starting exec");

    let shell = state.backend.exec(&info, opts).await?;
    let session = match state.sessions.create(Arc::clone(&shell), exec_id).await {
        Ok(session) => session,
        Err(e) => {
            let _ = shell.exit().await;
            return Err(e.into());
        }
    };
    drop(starting);

    if state.config.audit.enabled {
        audit::spawn_recorder(session.fork(false), &state.config.audit, &info.id, client);
    }

    let pump = Pump::new(
        session.clone(),
        pump_options(&state.config, &info, state.config.permit_write),
    );
    let result = pump.run(source, sink, state.shutdown.child_token()).await;

    state.sessions.remove(exec_id).await;
    if let Err(e) = session.exit().await {
        tracing::warn!(exec_id = %exec_id, error = %e, "Failed to exit shell");
    }
    Ok(result?)
}

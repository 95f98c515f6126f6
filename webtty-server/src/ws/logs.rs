//! `/ws/logs/:container_id`: follow a container's logs

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Path, State};
use axum::response::Response;
use webtty_core::pump::read_init_message;
use webtty_core::{CloseReason, FrameSink, FrameSource, LogOptions, LogTerminal, Pump};

use super::{PROTOCOL, client_label, finish, pump_options, reject_busy, split_axum};
use crate::AppState;
use crate::error::ServerError;

/// WebSocket upgrade handler for log terminals
pub async fn logs_ws(
    ws: WebSocketUpgrade,
    Path(container_id): Path<String>,
    connect: Option<ConnectInfo<SocketAddr>>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let client = client_label(connect);
    ws.protocols([PROTOCOL])
        .on_upgrade(move |socket| handle_logs(socket, state, container_id, client))
}

async fn handle_logs(socket: WebSocket, state: Arc<AppState>, container_id: String, client: String) {
    let (mut source, mut sink) = split_axum(socket);
    let Some(_slot) = state.acquire_connection() else {
        reject_busy(&mut sink, &client, state.config.max_connections).await;
        return;
    };
    tracing::info!(client = %client, container = %container_id, "New log client connected");

    let result = serve_logs(&state, &container_id, &mut source, &mut sink).await;
    finish(&mut sink, &client, result).await;
}

async fn serve_logs<Src, Snk>(
    state: &AppState,
    container_id: &str,
    source: &mut Src,
    sink: &mut Snk,
) -> Result<CloseReason, ServerError>
where
    Src: FrameSource + ?Sized,
    Snk: FrameSink + ?Sized,
{
    let init = read_init_message(source, state.config.credential.as_deref()).await?;
    let info = state.backend.get_info(container_id).await?;
    let opts = LogOptions::from_query(info.id.clone(), &init.arguments);
    tracing::debug!(container = %info.id, follow = opts.follow, tail = %opts.tail, "Streaming logs");

    let stream = state.backend.logs(opts).await?;
    let terminal = Arc::new(LogTerminal::new(stream));
    // Keystrokes only mark the log, and a quiet log is not idle
    let mut options = pump_options(&state.config, &info, true);
    options.idle_timeout = None;
    let pump = Pump::new(terminal, options);
    Ok(pump.run(source, sink, state.shutdown.child_token()).await?)
}

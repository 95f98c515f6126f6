//! `/tunnel`: serve the local backend to other instances

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use super::split_axum;
use crate::AppState;

/// WebSocket upgrade handler for tunnel streams
pub async fn tunnel_ws(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let Some(responder) = state.responder.clone() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    ws.on_upgrade(move |socket| async move {
        let (mut source, mut sink) = split_axum(socket);
        if let Err(e) = responder
            .serve(&mut source, &mut sink, state.shutdown.child_token())
            .await
        {
            tracing::debug!(error = %e, "Tunnel stream ended with an error");
        }
    })
}

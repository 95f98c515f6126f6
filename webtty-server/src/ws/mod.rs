//! WebSocket endpoints
//!
//! Terminal sockets (`exec`, `share`, `logs`) start with the init message,
//! then run a [`Pump`](webtty_core::Pump) until either side ends. The
//! `tunnel` socket serves one tunnel stream against the local backend.

mod adapter;
mod exec;
mod logs;
mod share;
mod tunnel;

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use webtty_core::pump::render_title;
use webtty_core::{CloseReason, ContainerInfo, FrameSink, PumpError, PumpOptions};

use crate::ServerConfig;
use crate::error::ServerError;

pub use adapter::{
    AxumSink, AxumSource, CLOSE_ERROR, CLOSE_POLICY, TungsteniteSink, TungsteniteSource,
    split_axum,
};
pub use exec::exec_ws;
pub use logs::logs_ws;
pub use share::share_ws;
pub use tunnel::tunnel_ws;

/// Sub-protocol spoken by the browser terminal
pub const PROTOCOL: &str = "webtty";

fn client_label(connect: Option<ConnectInfo<SocketAddr>>) -> String {
    connect
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Pump options for a terminal showing `container`
fn pump_options(config: &ServerConfig, container: &ContainerInfo, permit_write: bool) -> PumpOptions {
    PumpOptions {
        permit_write,
        idle_timeout: config.idle_timeout,
        window_title: render_title(&config.title_format, container).into_bytes(),
        preferences: config
            .preferences
            .as_ref()
            .map(|prefs| prefs.to_string().into_bytes()),
        reconnect: config.reconnect,
        ..Default::default()
    }
}

/// Log how a terminal connection ended and close the socket
async fn finish(sink: &mut AxumSink, client: &str, result: Result<CloseReason, ServerError>) {
    match result {
        Ok(reason) => {
            tracing::info!(client = %client, "Connection closed by {reason}");
            let _ = sink.close().await;
        }
        Err(e) => {
            tracing::warn!(client = %client, "Connection closed by an error: {e}");
            let code = match &e {
                ServerError::Pump(PumpError::Auth | PumpError::Handshake(_)) => CLOSE_POLICY,
                _ => CLOSE_ERROR,
            };
            sink.close_with(code, &e.to_string()).await;
        }
    }
}

/// Turn away a socket when no connection slot is free
async fn reject_busy(sink: &mut AxumSink, client: &str, max: usize) {
    tracing::warn!(client = %client, max_connections = max, "Reached max connections");
    sink.close_with(CLOSE_ERROR, "too many connections").await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_render_title_and_preferences() {
        let config = ServerConfig {
            preferences: Some(serde_json::json!({"fontSize": 14})),
            reconnect: Some(5),
            ..Default::default()
        };
        let container = ContainerInfo {
            id: "0123456789abcdef".into(),
            name: "/db".into(),
            ..Default::default()
        };
        let options = pump_options(&config, &container, false);
        assert_eq!(options.window_title, b"db - 0123456789ab@127.0.0.1");
        assert_eq!(options.preferences.as_deref(), Some(&br#"{"fontSize":14}"#[..]));
        assert_eq!(options.reconnect, Some(5));
        assert!(!options.permit_write);
    }

    #[test]
    fn missing_connect_info_is_unknown() {
        assert_eq!(client_label(None), "unknown");
        let addr: SocketAddr = "10.0.0.1:4000".parse().unwrap();
        assert_eq!(client_label(Some(ConnectInfo(addr))), "10.0.0.1:4000");
    }
}

//! Browser-facing terminal wire protocol
//!
//! Every message is a single tag byte followed by its payload. Tags are
//! ASCII digits so messages survive text-oriented transports.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Client to server: keystrokes written verbatim to the shell
pub const INPUT: u8 = b'1';
/// Client to server: liveness probe
pub const PING: u8 = b'2';
/// Client to server: JSON `{"columns": n, "rows": n}`
pub const RESIZE_TERMINAL: u8 = b'3';

/// Server to client: base64 encoded shell output
pub const OUTPUT: u8 = b'1';
/// Server to client: reply to a ping
pub const PONG: u8 = b'2';
/// Server to client: window or tab title
pub const SET_WINDOW_TITLE: u8 = b'3';
/// Server to client: terminal preferences (JSON)
pub const SET_PREFERENCES: u8 = b'4';
/// Server to client: reconnect interval in seconds
pub const SET_RECONNECT: u8 = b'5';

/// New terminal dimensions sent by the browser
///
/// xterm.js reports these as JSON numbers, hence `f64`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResizeRequest {
    pub columns: f64,
    pub rows: f64,
}

impl ResizeRequest {
    /// Dimensions clamped into the range a PTY accepts
    pub fn dimensions(&self) -> (u16, u16) {
        (clamp_dimension(self.columns), clamp_dimension(self.rows))
    }
}

fn clamp_dimension(value: f64) -> u16 {
    if value.is_nan() || value < 1.0 {
        1
    } else if value > f64::from(u16::MAX) {
        u16::MAX
    } else {
        value as u16
    }
}

/// Message sent by the browser
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Input(Vec<u8>),
    Ping,
    ResizeTerminal(ResizeRequest),
}

impl ClientMessage {
    /// Decode one complete wire message
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let (&tag, payload) = data.split_first().ok_or(ProtocolError::Empty)?;
        match tag {
            INPUT => Ok(ClientMessage::Input(payload.to_vec())),
            PING => Ok(ClientMessage::Ping),
            RESIZE_TERMINAL => serde_json::from_slice(payload)
                .map(ClientMessage::ResizeTerminal)
                .map_err(|e| ProtocolError::InvalidResize(e.to_string())),
            other => Err(ProtocolError::UnknownTag(other)),
        }
    }

    /// Encode as one complete wire message
    pub fn encode(&self) -> Vec<u8> {
        match self {
            ClientMessage::Input(data) => tagged(INPUT, data),
            ClientMessage::Ping => vec![PING],
            ClientMessage::ResizeTerminal(size) => {
                // Serializing two floats cannot fail
                let json = serde_json::to_vec(size).unwrap_or_default();
                tagged(RESIZE_TERMINAL, &json)
            }
        }
    }
}

/// Message sent to the browser
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Output(Vec<u8>),
    Pong,
    SetWindowTitle(Vec<u8>),
    SetPreferences(Vec<u8>),
    SetReconnect(u64),
}

impl ServerMessage {
    /// Encode as one complete wire message
    ///
    /// Nothing is buffered between calls.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            ServerMessage::Output(data) => {
                let mut out = Vec::with_capacity(1 + data.len().div_ceil(3) * 4);
                out.push(OUTPUT);
                out.extend_from_slice(STANDARD.encode(data).as_bytes());
                out
            }
            ServerMessage::Pong => vec![PONG],
            ServerMessage::SetWindowTitle(title) => tagged(SET_WINDOW_TITLE, title),
            ServerMessage::SetPreferences(prefs) => tagged(SET_PREFERENCES, prefs),
            ServerMessage::SetReconnect(secs) => tagged(SET_RECONNECT, secs.to_string().as_bytes()),
        }
    }

    /// Decode one complete wire message
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let (&tag, payload) = data.split_first().ok_or(ProtocolError::Empty)?;
        match tag {
            OUTPUT => STANDARD
                .decode(payload)
                .map(ServerMessage::Output)
                .map_err(|e| ProtocolError::InvalidPayload {
                    tag,
                    reason: e.to_string(),
                }),
            PONG => Ok(ServerMessage::Pong),
            SET_WINDOW_TITLE => Ok(ServerMessage::SetWindowTitle(payload.to_vec())),
            SET_PREFERENCES => Ok(ServerMessage::SetPreferences(payload.to_vec())),
            SET_RECONNECT => std::str::from_utf8(payload)
                .ok()
                .and_then(|s| s.parse().ok())
                .map(ServerMessage::SetReconnect)
                .ok_or_else(|| ProtocolError::InvalidPayload {
                    tag,
                    reason: "reconnect delay is not a number".to_string(),
                }),
            other => Err(ProtocolError::UnknownTag(other)),
        }
    }
}

fn tagged(tag: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(tag);
    out.extend_from_slice(payload);
    out
}

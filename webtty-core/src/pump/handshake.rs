//! Connection handshake

use serde::{Deserialize, Serialize};

use super::transport::{Frame, FrameSource};
use crate::error::PumpError;

/// First message a browser sends on a terminal socket
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitMessage {
    /// Query string with exec or log parameters
    #[serde(rename = "Arguments", default)]
    pub arguments: String,
    #[serde(rename = "AuthToken", default)]
    pub auth_token: String,
}

/// Read and check the init message
///
/// When `credential` is set, the token must match it exactly.
pub async fn read_init_message<S>(
    source: &mut S,
    credential: Option<&str>,
) -> Result<InitMessage, PumpError>
where
    S: FrameSource + ?Sized,
{
    let frame = match source.next_frame().await {
        Some(frame) => frame?,
        None => {
            return Err(PumpError::Handshake(
                "connection closed before init message".to_string(),
            ));
        }
    };
    let Frame::Text(text) = frame else {
        return Err(PumpError::Handshake(
            "init message must be a text frame".to_string(),
        ));
    };
    let init: InitMessage = serde_json::from_str(&text)
        .map_err(|e| PumpError::Handshake(format!("failed to parse init message: {e}")))?;

    if let Some(expected) = credential.filter(|c| !c.is_empty()) {
        if init.auth_token != expected {
            tracing::warn!("Rejected connection with bad auth token");
            return Err(PumpError::Auth);
        }
    }
    Ok(init)
}

//! Audit recording of exec sessions
//!
//! Each audited session gets a read-only view whose output is appended to
//! `{dir}/{short container id}/{client ip}-{unix time}.log`.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::backend::short_id;
use crate::session::View;

const AUDIT_BUFFER_SIZE: usize = 2048;

fn default_audit_dir() -> PathBuf {
    PathBuf::from("log")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Relative paths resolve against the working directory
    #[serde(default = "default_audit_dir")]
    pub dir: PathBuf,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: default_audit_dir(),
        }
    }
}

/// File an audit recording is written to
///
/// `client` may be `ip` or `ip:port`; only the address part is used.
pub fn audit_log_path(dir: &Path, container_id: &str, client: &str, unix_time: i64) -> PathBuf {
    let ip = client_ip(client);
    dir.join(short_id(container_id))
        .join(format!("{ip}-{unix_time}.log"))
}

fn client_ip(client: &str) -> &str {
    // [v6]:port
    if let Some(rest) = client.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match client.rsplit_once(':') {
        Some((ip, _port)) if !ip.contains(':') => ip,
        _ => client,
    }
}

/// Copy `view` output into a new audit file until the session ends
///
/// Returns the number of bytes recorded.
pub async fn record(view: View, path: PathBuf) -> io::Result<u64> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::File::create(&path).await?;
    tracing::debug!(path = %path.display(), session_id = %view.session_id(), "Audit recording started");

    let mut buf = vec![0u8; AUDIT_BUFFER_SIZE];
    let mut written = 0u64;
    loop {
        let n = view.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).await?;
        written += n as u64;
    }
    file.flush().await?;
    Ok(written)
}

/// Start recording `view` in the background
pub fn spawn_recorder(
    view: View,
    config: &AuditConfig,
    container_id: &str,
    client: &str,
) -> tokio::task::JoinHandle<()> {
    let dir = if config.dir.is_absolute() {
        config.dir.clone()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(&config.dir))
            .unwrap_or_else(|_| config.dir.clone())
    };
    let path = audit_log_path(&dir, container_id, client, chrono::Utc::now().timestamp());
    tokio::spawn(async move {
        match record(view, path.clone()).await {
            Ok(bytes) => tracing::debug!(path = %path.display(), bytes, "Audit recording finished"),
            Err(e) => tracing::error!(path = %path.display(), error = %e, "Audit recording failed"),
        }
    })
}

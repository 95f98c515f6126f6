//! Container backend capability
//!
//! A backend knows how to list containers, run lifecycle actions and open an
//! exec shell or a log stream for one of them.

mod cache;
mod mock;
mod process;

pub use cache::{ContainerCache, SHORT_ID_LEN};
pub use mock::MockBackend;
pub use process::{ProcessBackend, ProcessBackendConfig, ProcessTarget};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

use crate::error::BackendError;
use crate::shell::ShellHandle;

/// Raw log bytes from a backend, possibly multiplexed
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// Default location for containers served by this process
pub const LOCAL_LOCATION: &str = "127.0.0.1";

/// Description of one container
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub image: String,
    pub command: String,
    /// Machine state, e.g. `running`
    pub state: String,
    /// Human status, e.g. `Up 13 minutes`
    pub status: String,
    #[serde(default)]
    pub ips: Vec<String>,
    /// Shell used for exec when no command is given
    #[serde(default)]
    pub shell: String,
    /// Address of the instance that owns the container, empty when local
    #[serde(default)]
    pub location: String,
}

impl ContainerInfo {
    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }

    /// Where the container lives, falling back to the local address
    pub fn location_or_local(&self) -> &str {
        if self.location.is_empty() {
            LOCAL_LOCATION
        } else {
            &self.location
        }
    }
}

/// First [`SHORT_ID_LEN`] characters of a container id
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(SHORT_ID_LEN) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

/// How to exec into a container
///
/// Parsed from the handshake argument string:
/// `cmd=<command>&env=<KEY=VALUE>&user=<name>&p=1`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOptions {
    #[serde(default)]
    pub cmd: Option<String>,
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub privileged: bool,
}

impl ExecOptions {
    pub fn from_query(arguments: &str) -> Self {
        let mut opts = ExecOptions::default();
        for (key, value) in parse_query(arguments) {
            match key.as_str() {
                "cmd" if !value.is_empty() => opts.cmd = Some(value),
                "env" if !value.is_empty() => opts.env.push(value),
                "user" if !value.is_empty() => opts.user = Some(value),
                "p" => opts.privileged = !value.is_empty(),
                _ => {}
            }
        }
        opts
    }
}

/// Default number of log lines shown before following
pub const DEFAULT_LOG_TAIL: &str = "10";

/// Which logs to stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogOptions {
    pub id: String,
    pub follow: bool,
    pub tail: String,
}

impl LogOptions {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            follow: true,
            tail: DEFAULT_LOG_TAIL.to_string(),
        }
    }

    /// Apply `follow=1` and `tail=N` from a handshake argument string
    ///
    /// Following stays on unless `follow` is present with a value other than `1`.
    pub fn from_query(id: impl Into<String>, arguments: &str) -> Self {
        let mut opts = LogOptions::new(id);
        for (key, value) in parse_query(arguments) {
            match key.as_str() {
                "follow" if !value.is_empty() => opts.follow = value == "1",
                "tail" if !value.is_empty() => opts.tail = value,
                _ => {}
            }
        }
        opts
    }
}

fn parse_query(arguments: &str) -> Vec<(String, String)> {
    let trimmed = arguments.trim();
    let trimmed = trimmed.strip_prefix('?').unwrap_or(trimmed);
    url::form_urlencoded::parse(trimmed.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// Source of containers and their terminals
#[async_trait]
pub trait ContainerBackend: Send + Sync {
    /// Short name used in logs and errors
    fn name(&self) -> &str;

    async fn list(&self) -> Result<Vec<ContainerInfo>, BackendError>;

    /// Look up by full id, short id or unique prefix
    async fn get_info(&self, id: &str) -> Result<ContainerInfo, BackendError>;

    async fn start(&self, id: &str) -> Result<(), BackendError>;

    async fn stop(&self, id: &str) -> Result<(), BackendError>;

    async fn restart(&self, id: &str) -> Result<(), BackendError>;

    async fn exec(
        &self,
        container: &ContainerInfo,
        opts: ExecOptions,
    ) -> Result<Arc<dyn ShellHandle>, BackendError>;

    async fn logs(&self, opts: LogOptions) -> Result<ByteStream, BackendError>;
}

/// A lifecycle action on a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerAction {
    Start,
    Stop,
    Restart,
}

impl ContainerAction {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "start" => Some(ContainerAction::Start),
            "stop" => Some(ContainerAction::Stop),
            "restart" => Some(ContainerAction::Restart),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerAction::Start => "start",
            ContainerAction::Stop => "stop",
            ContainerAction::Restart => "restart",
        }
    }

    /// Run this action against `backend`
    pub async fn apply(&self, backend: &dyn ContainerBackend, id: &str) -> Result<(), BackendError> {
        match self {
            ContainerAction::Start => backend.start(id).await,
            ContainerAction::Stop => backend.stop(id).await,
            ContainerAction::Restart => backend.restart(id).await,
        }
    }
}

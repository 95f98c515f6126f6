//! Backend serving configured local processes as containers

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::process::{Child, ChildStdout, Command};

use super::{ByteStream, ContainerBackend, ContainerCache, ContainerInfo, ExecOptions, LogOptions};
use crate::error::BackendError;
use crate::shell::{PtyShell, ShellCommand, ShellHandle};

const BACKEND_NAME: &str = "process";

fn default_shell() -> String {
    "/bin/sh".to_string()
}

fn default_cols() -> u16 {
    80
}

fn default_rows() -> u16 {
    24
}

/// One local process exposed as a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessTarget {
    pub id: String,
    pub name: String,
    #[serde(default = "default_shell")]
    pub shell: String,
    /// Arguments for an interactive session with no command
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Shell command whose stdout is served as this target's logs
    #[serde(default)]
    pub log_command: Option<String>,
}

impl ProcessTarget {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            shell: default_shell(),
            args: Vec::new(),
            cwd: None,
            env: HashMap::new(),
            log_command: None,
        }
    }

    fn info(&self) -> ContainerInfo {
        let mut command = self.shell.clone();
        for arg in &self.args {
            command.push(' ');
            command.push_str(arg);
        }
        ContainerInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            image: "local".to_string(),
            command,
            state: "running".to_string(),
            status: "local process".to_string(),
            ips: Vec::new(),
            shell: self.shell.clone(),
            location: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessBackendConfig {
    #[serde(default)]
    pub targets: Vec<ProcessTarget>,
    #[serde(default = "default_cols")]
    pub initial_cols: u16,
    #[serde(default = "default_rows")]
    pub initial_rows: u16,
}

impl Default for ProcessBackendConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            initial_cols: default_cols(),
            initial_rows: default_rows(),
        }
    }
}

/// Local process backend
///
/// Exec spawns the target's shell in a PTY. Lifecycle actions are not
/// available for plain processes.
pub struct ProcessBackend {
    config: ProcessBackendConfig,
    cache: ContainerCache,
}

impl ProcessBackend {
    pub fn new(config: ProcessBackendConfig) -> Self {
        let cache = ContainerCache::new();
        cache.replace(config.targets.iter().map(ProcessTarget::info).collect());
        tracing::info!(targets = config.targets.len(), "Process backend ready");
        Self { config, cache }
    }

    fn target(&self, id: &str) -> Result<&ProcessTarget, BackendError> {
        let info = self
            .cache
            .find(id)
            .ok_or_else(|| BackendError::NotFound(id.to_string()))?;
        self.config
            .targets
            .iter()
            .find(|t| t.id == info.id)
            .ok_or_else(|| BackendError::NotFound(id.to_string()))
    }

    fn command_for(&self, target: &ProcessTarget, opts: &ExecOptions) -> ShellCommand {
        let mut command = ShellCommand::new(&target.shell)
            .size(self.config.initial_cols, self.config.initial_rows);
        match &opts.cmd {
            Some(cmd) => command.args = vec!["-c".to_string(), cmd.clone()],
            None => command.args = target.args.clone(),
        }
        command.cwd = target.cwd.clone();
        command.env = target.env.clone();
        for pair in &opts.env {
            if let Some((key, value)) = pair.split_once('=') {
                command.env.insert(key.to_string(), value.to_string());
            }
        }
        command
    }

    fn unsupported(operation: &str) -> BackendError {
        BackendError::Unsupported {
            backend: BACKEND_NAME.to_string(),
            operation: operation.to_string(),
        }
    }
}

#[async_trait]
impl ContainerBackend for ProcessBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    async fn list(&self) -> Result<Vec<ContainerInfo>, BackendError> {
        Ok(self.cache.list())
    }

    async fn get_info(&self, id: &str) -> Result<ContainerInfo, BackendError> {
        self.cache
            .find(id)
            .ok_or_else(|| BackendError::NotFound(id.to_string()))
    }

    async fn start(&self, _id: &str) -> Result<(), BackendError> {
        Err(Self::unsupported("start"))
    }

    async fn stop(&self, _id: &str) -> Result<(), BackendError> {
        Err(Self::unsupported("stop"))
    }

    async fn restart(&self, _id: &str) -> Result<(), BackendError> {
        Err(Self::unsupported("restart"))
    }

    async fn exec(
        &self,
        container: &ContainerInfo,
        opts: ExecOptions,
    ) -> Result<Arc<dyn ShellHandle>, BackendError> {
        let target = self.target(&container.id)?;
        if opts.user.is_some() || opts.privileged {
            tracing::debug!(
                container = %container.id,
                user = ?opts.user,
                privileged = opts.privileged,
                "Ignoring user and privilege options for local process"
            );
        }
        let command = self.command_for(target, &opts);
        let shell = PtyShell::spawn(&command)?;
        Ok(Arc::new(shell))
    }

    async fn logs(&self, opts: LogOptions) -> Result<ByteStream, BackendError> {
        let target = self.target(&opts.id)?;
        let log_command = target
            .log_command
            .as_deref()
            .ok_or_else(|| Self::unsupported("logs"))?;

        let mut child = Command::new(&target.shell)
            .arg("-c")
            .arg(log_command)
            .env("WEBTTY_LOG_TAIL", &opts.tail)
            .env("WEBTTY_LOG_FOLLOW", if opts.follow { "1" } else { "0" })
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BackendError::Exec("log command has no stdout".to_string()))?;

        tracing::debug!(container = %target.id, command = %log_command, "Streaming logs");
        Ok(Box::new(ChildOutput {
            _child: child,
            stdout,
        }))
    }
}

/// Child stdout that keeps the child alive, and kills it when dropped
struct ChildOutput {
    _child: Child,
    stdout: ChildStdout,
}

impl AsyncRead for ChildOutput {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stdout).poll_read(cx, buf)
    }
}

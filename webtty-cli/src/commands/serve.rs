//! webtty serve command
//!
//! Loads the layered config file, applies command-line flags on top and runs
//! the server over either configured local processes or remote instances.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tracing::{info, warn};
use webtty_core::{
    AuditConfig, ContainerBackend, ProcessBackend, ProcessBackendConfig, ProcessTarget,
    SessionConfig,
};
use webtty_server::{ControlConfig, RemoteBackend, ServerConfig, TunnelConfig, WebTtyServer};

use crate::config::{ConfigLoader, WebTtyConfig};

/// Arguments for the serve command
///
/// Every flag is optional so unset flags keep the config file value.
#[derive(Debug, Default, Args)]
pub struct ServeArgs {
    /// Host to bind to
    #[arg(long, env = "WEB_TTY_HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "WEB_TTY_PORT")]
    pub port: Option<u16>,

    /// Token browsers must present
    #[arg(long, env = "WEB_TTY_CREDENTIAL", hide_env_values = true)]
    pub credential: Option<String>,

    /// Forward browser keystrokes to the shell
    #[arg(long, env = "WEB_TTY_PERMIT_WRITE", num_args = 0..=1, default_missing_value = "true")]
    pub permit_write: Option<bool>,

    /// Expose read-only share links
    #[arg(long, env = "WEB_TTY_ENABLE_SHARE", num_args = 0..=1, default_missing_value = "true")]
    pub enable_share: Option<bool>,

    /// Let shared views type as well
    #[arg(long, env = "WEB_TTY_COLLABORATE", num_args = 0..=1, default_missing_value = "true")]
    pub collaborate: Option<bool>,

    /// Seconds without output before a terminal is closed, 0 to disable
    #[arg(long, env = "WEB_TTY_IDLE_TIMEOUT")]
    pub idle_timeout: Option<u64>,

    /// Concurrent terminal connections, 0 for unlimited
    #[arg(long, env = "WEB_TTY_MAX_CONNECTIONS")]
    pub max_connections: Option<usize>,

    /// Window title template ({name}, {short_id}, {location}, ...)
    #[arg(long, env = "WEB_TTY_TITLE_FORMAT")]
    pub title_format: Option<String>,

    /// Seconds the browser waits before reconnecting
    #[arg(long, env = "WEB_TTY_RECONNECT")]
    pub reconnect: Option<u64>,

    /// Remote webtty instances to serve containers from (comma separated)
    #[arg(long, env = "WEB_TTY_SERVERS", value_delimiter = ',')]
    pub servers: Vec<String>,

    /// Shared secret for connecting to remote instances
    #[arg(long, env = "WEB_TTY_REMOTE_AUTH", hide_env_values = true)]
    pub remote_auth: Option<String>,

    /// Serve the local backend to other instances on /tunnel
    #[arg(long, env = "WEB_TTY_TUNNEL", num_args = 0..=1, default_missing_value = "true")]
    pub tunnel: Option<bool>,

    /// Shared secret other instances must present on /tunnel
    #[arg(long, env = "WEB_TTY_TUNNEL_AUTH", hide_env_values = true)]
    pub tunnel_auth: Option<String>,

    /// Enable the container start/stop/restart API
    #[arg(long, env = "WEB_TTY_CONTROL", num_args = 0..=1, default_missing_value = "true")]
    pub control: Option<bool>,

    /// Record exec sessions to the audit directory
    #[arg(long, env = "WEB_TTY_AUDIT", num_args = 0..=1, default_missing_value = "true")]
    pub audit: Option<bool>,

    /// Directory for audit recordings
    #[arg(long, env = "WEB_TTY_AUDIT_DIR")]
    pub audit_dir: Option<PathBuf>,
}

impl ServeArgs {
    /// Overlay the flags that were given onto `config`
    pub fn apply(self, mut config: WebTtyConfig) -> WebTtyConfig {
        let server = &mut config.server;
        if let Some(host) = self.host {
            server.host = host;
        }
        if let Some(port) = self.port {
            server.port = port;
        }
        if self.credential.is_some() {
            server.credential = self.credential;
        }
        if let Some(v) = self.permit_write {
            server.permit_write = v;
        }
        if let Some(v) = self.enable_share {
            server.enable_share = v;
        }
        if let Some(v) = self.collaborate {
            server.collaborate = v;
        }
        if let Some(v) = self.idle_timeout {
            server.idle_timeout_secs = v;
        }
        if let Some(v) = self.max_connections {
            server.max_connections = v;
        }
        if let Some(v) = self.title_format {
            server.title_format = v;
        }
        if self.reconnect.is_some() {
            server.reconnect = self.reconnect;
        }

        if !self.servers.is_empty() {
            config.remote.servers = self.servers;
        }
        if self.remote_auth.is_some() {
            config.remote.auth = self.remote_auth;
        }
        if let Some(v) = self.tunnel {
            config.tunnel.enabled = v;
        }
        if self.tunnel_auth.is_some() {
            config.tunnel.auth = self.tunnel_auth;
        }
        if let Some(v) = self.control {
            config.control.enable = v;
        }
        if let Some(v) = self.audit {
            config.audit.enabled = v;
        }
        if let Some(dir) = self.audit_dir {
            config.audit.dir = dir;
        }
        config
    }
}

/// Run the serve command
pub async fn run(args: ServeArgs) -> Result<()> {
    let config = args.apply(ConfigLoader::load()?);
    let backend = build_backend(&config).await;
    let server_config = server_config(&config)?;

    info!(
        "Starting webtty server on {}:{}",
        server_config.host, server_config.port
    );

    let server = WebTtyServer::new(server_config, backend);
    let state = server.state();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down");
            state.shutdown.cancel();
        }
    });

    server.run().await.map_err(Into::into)
}

/// Translate the merged config into the server's settings
fn server_config(config: &WebTtyConfig) -> Result<ServerConfig> {
    let preferences = config
        .preferences
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .context("converting terminal preferences to JSON")?;

    let server = &config.server;
    Ok(ServerConfig {
        host: server.host.clone(),
        port: server.port,
        credential: server.credential.clone(),
        idle_timeout: (server.idle_timeout_secs > 0)
            .then(|| Duration::from_secs(server.idle_timeout_secs)),
        max_connections: server.max_connections,
        permit_write: server.permit_write,
        enable_share: server.enable_share,
        collaborate: server.collaborate,
        title_format: server.title_format.clone(),
        preferences,
        reconnect: server.reconnect,
        session: SessionConfig {
            replay_capacity: config.session.replay_capacity,
            quiet_window: Duration::from_millis(config.session.quiet_window_ms),
            subscriber_capacity: config.session.subscriber_capacity,
            exec_id_ttl: Duration::from_secs(config.session.exec_id_ttl_secs),
        },
        control: ControlConfig {
            enable: config.control.enable,
            start: config.control.start,
            stop: config.control.stop,
            restart: config.control.restart,
        },
        audit: AuditConfig {
            enabled: config.audit.enabled,
            dir: config.audit.dir.clone(),
        },
        tunnel: TunnelConfig {
            enabled: config.tunnel.enabled,
            auth: config.tunnel.auth.clone(),
        },
    })
}

/// Remote instances when any are configured, local processes otherwise
async fn build_backend(config: &WebTtyConfig) -> Arc<dyn ContainerBackend> {
    if !config.remote.servers.is_empty() {
        let auth = config.remote.auth.clone().unwrap_or_default();
        let remote = RemoteBackend::connect(&config.remote.servers, &auth);
        let alive = remote.check_health().await;
        if alive == 0 {
            warn!("No remote servers reachable");
        } else {
            info!(servers = alive, "Remote backend ready");
        }
        return Arc::new(remote);
    }

    let mut targets = config.targets.clone();
    if targets.is_empty() {
        targets.push(default_target());
    }
    Arc::new(ProcessBackend::new(ProcessBackendConfig {
        targets,
        ..Default::default()
    }))
}

/// The user's login shell on this machine
fn default_target() -> ProcessTarget {
    let mut target = ProcessTarget::new("localhost", "local");
    if let Ok(shell) = std::env::var("SHELL")
        && !shell.is_empty()
    {
        target.shell = shell;
    }
    target
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: ServeArgs,
    }

    fn parse(args: &[&str]) -> ServeArgs {
        let mut argv = vec!["webtty"];
        argv.extend_from_slice(args);
        TestCli::try_parse_from(argv).unwrap().args
    }

    #[test]
    fn test_no_flags_keep_config() {
        let mut config = WebTtyConfig::default();
        config.server.port = 9000;
        config.server.permit_write = false;

        let merged = ServeArgs::default().apply(config);

        assert_eq!(merged.server.port, 9000);
        assert!(!merged.server.permit_write);
    }

    #[test]
    fn test_flags_override_config() {
        let args = parse(&[
            "--port",
            "7681",
            "--permit-write=false",
            "--enable-share",
            "--servers",
            "10.0.0.2:8080,10.0.0.3:8080",
            "--idle-timeout",
            "60",
        ]);

        let merged = args.apply(WebTtyConfig::default());

        assert_eq!(merged.server.port, 7681);
        assert!(!merged.server.permit_write);
        assert!(merged.server.enable_share);
        assert_eq!(merged.server.idle_timeout_secs, 60);
        assert_eq!(
            merged.remote.servers,
            vec!["10.0.0.2:8080".to_string(), "10.0.0.3:8080".to_string()]
        );
    }

    #[test]
    fn test_server_config_translation() {
        let mut config = WebTtyConfig::default();
        config.server.idle_timeout_secs = 30;
        config.session.quiet_window_ms = 250;
        config.session.exec_id_ttl_secs = 5;
        config.control.enable = true;
        config.tunnel.enabled = true;
        config.tunnel.auth = Some("s3cret".to_string());
        config.preferences = Some(toml::from_str("fontSize = 14").unwrap());

        let server = server_config(&config).unwrap();

        assert_eq!(server.idle_timeout, Some(Duration::from_secs(30)));
        assert_eq!(server.session.quiet_window, Duration::from_millis(250));
        assert_eq!(server.session.exec_id_ttl, Duration::from_secs(5));
        assert!(server.control.allows(webtty_core::ContainerAction::Restart));
        assert_eq!(server.tunnel.auth.as_deref(), Some("s3cret"));
        assert_eq!(
            server.preferences,
            Some(serde_json::json!({ "fontSize": 14 }))
        );
    }

    #[test]
    fn test_zero_idle_timeout_disables() {
        let server = server_config(&WebTtyConfig::default()).unwrap();
        assert_eq!(server.idle_timeout, None);
        assert_eq!(server.preferences, None);
    }

    #[tokio::test]
    async fn test_local_backend_gets_default_target() {
        let backend = build_backend(&WebTtyConfig::default()).await;
        assert_eq!(backend.name(), "process");
        let containers = backend.list().await.unwrap();
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0].id, "localhost");
    }

    #[tokio::test]
    async fn test_configured_targets_are_served() {
        let mut config = WebTtyConfig::default();
        config.targets = vec![ProcessTarget::new("a1", "one"), ProcessTarget::new("b2", "two")];

        let backend = build_backend(&config).await;
        let ids: Vec<String> = backend.list().await.unwrap().into_iter().map(|c| c.id).collect();

        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"a1".to_string()));
    }
}

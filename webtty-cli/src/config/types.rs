use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use webtty_core::ProcessTarget;

/// Configuration as stored in TOML files (with optional fields for merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawWebTtyConfig {
    #[serde(default)]
    pub server: RawServerConfig,

    #[serde(default)]
    pub session: RawSessionConfig,

    #[serde(default)]
    pub control: RawControlConfig,

    #[serde(default)]
    pub audit: RawAuditConfig,

    #[serde(default)]
    pub tunnel: RawTunnelConfig,

    #[serde(default)]
    pub remote: RawRemoteConfig,

    /// Terminal preferences passed to the browser as JSON
    #[serde(default)]
    pub preferences: Option<toml::Table>,

    /// Local processes served when no remote servers are configured
    #[serde(default)]
    pub targets: Vec<ProcessTarget>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub credential: Option<String>,
    pub permit_write: Option<bool>,
    pub enable_share: Option<bool>,
    pub collaborate: Option<bool>,
    pub idle_timeout_secs: Option<u64>,
    pub max_connections: Option<usize>,
    pub title_format: Option<String>,
    pub reconnect: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawSessionConfig {
    pub replay_capacity: Option<usize>,
    pub quiet_window_ms: Option<u64>,
    pub subscriber_capacity: Option<usize>,
    pub exec_id_ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawControlConfig {
    pub enable: Option<bool>,
    pub start: Option<bool>,
    pub stop: Option<bool>,
    pub restart: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawAuditConfig {
    pub enabled: Option<bool>,
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawTunnelConfig {
    pub enabled: Option<bool>,
    pub auth: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawRemoteConfig {
    pub servers: Option<Vec<String>>,
    pub auth: Option<String>,
}

/// Final configuration with defaults applied
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WebTtyConfig {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub session: SessionSection,

    #[serde(default)]
    pub control: ControlSection,

    #[serde(default)]
    pub audit: AuditSection,

    #[serde(default)]
    pub tunnel: TunnelSection,

    #[serde(default)]
    pub remote: RemoteSection,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<toml::Table>,

    #[serde(default)]
    pub targets: Vec<ProcessTarget>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    pub permit_write: bool,
    pub enable_share: bool,
    pub collaborate: bool,
    /// 0 disables the idle timeout
    pub idle_timeout_secs: u64,
    /// 0 for unlimited
    pub max_connections: usize,
    pub title_format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnect: Option<u64>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            credential: None,
            permit_write: true,
            enable_share: false,
            collaborate: false,
            idle_timeout_secs: 0,
            max_connections: 0,
            title_format: webtty_core::pump::DEFAULT_TITLE_FORMAT.to_string(),
            reconnect: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSection {
    pub replay_capacity: usize,
    pub quiet_window_ms: u64,
    pub subscriber_capacity: usize,
    /// Seconds an exec id waits for its first terminal
    pub exec_id_ttl_secs: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        let defaults = webtty_core::SessionConfig::default();
        Self {
            replay_capacity: defaults.replay_capacity,
            quiet_window_ms: defaults.quiet_window.as_millis() as u64,
            subscriber_capacity: defaults.subscriber_capacity,
            exec_id_ttl_secs: defaults.exec_id_ttl.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlSection {
    pub enable: bool,
    pub start: bool,
    pub stop: bool,
    pub restart: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditSection {
    pub enabled: bool,
    pub dir: PathBuf,
}

impl Default for AuditSection {
    fn default() -> Self {
        let defaults = webtty_core::AuditConfig::default();
        Self {
            enabled: defaults.enabled,
            dir: defaults.dir,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TunnelSection {
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteSection {
    /// Instances serving `/tunnel`; when set, their containers replace local targets
    #[serde(default)]
    pub servers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
}

/// Default port for the webtty server
pub const DEFAULT_PORT: u16 = 8080;

/// Default host for the webtty server
pub const DEFAULT_HOST: &str = "0.0.0.0";

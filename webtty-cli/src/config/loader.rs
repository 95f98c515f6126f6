use super::types::{
    AuditSection, ControlSection, RawAuditConfig, RawControlConfig, RawRemoteConfig,
    RawServerConfig, RawSessionConfig, RawTunnelConfig, RawWebTtyConfig, RemoteSection,
    ServerSection, SessionSection, TunnelSection, WebTtyConfig,
};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Env var that moves the project config directory
pub const PROJECT_CONFIG_DIR_ENV: &str = "WEBTTY_PROJECT_CONFIG_DIR";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (user + project)
    pub fn load() -> Result<WebTtyConfig> {
        let mut raw = RawWebTtyConfig::default();

        // Layer 1: User config
        if let Some(user_path) = Self::user_config_path()
            && user_path.exists()
        {
            raw = Self::merge_raw(raw, Self::read_raw(&user_path)?);
        }

        // Layer 2: Project config
        let project_path = Self::project_config_path();
        if project_path.exists() {
            raw = Self::merge_raw(raw, Self::read_raw(&project_path)?);
        }

        Ok(Self::finalize(raw))
    }

    /// Get user config path (platform-specific)
    pub fn user_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "webtty").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get project config path
    ///
    /// Can be overridden with `WEBTTY_PROJECT_CONFIG_DIR`.
    pub fn project_config_path() -> PathBuf {
        if let Ok(dir) = std::env::var(PROJECT_CONFIG_DIR_ENV) {
            PathBuf::from(dir).join("config.toml")
        } else {
            PathBuf::from(".webtty/config.toml")
        }
    }

    fn read_raw(path: &Path) -> Result<RawWebTtyConfig> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
    }

    /// Merge two raw configs (overlay values override base only if explicitly set)
    fn merge_raw(base: RawWebTtyConfig, overlay: RawWebTtyConfig) -> RawWebTtyConfig {
        RawWebTtyConfig {
            server: RawServerConfig {
                host: overlay.server.host.or(base.server.host),
                port: overlay.server.port.or(base.server.port),
                credential: overlay.server.credential.or(base.server.credential),
                permit_write: overlay.server.permit_write.or(base.server.permit_write),
                enable_share: overlay.server.enable_share.or(base.server.enable_share),
                collaborate: overlay.server.collaborate.or(base.server.collaborate),
                idle_timeout_secs: overlay
                    .server
                    .idle_timeout_secs
                    .or(base.server.idle_timeout_secs),
                max_connections: overlay
                    .server
                    .max_connections
                    .or(base.server.max_connections),
                title_format: overlay.server.title_format.or(base.server.title_format),
                reconnect: overlay.server.reconnect.or(base.server.reconnect),
            },
            session: RawSessionConfig {
                replay_capacity: overlay
                    .session
                    .replay_capacity
                    .or(base.session.replay_capacity),
                quiet_window_ms: overlay
                    .session
                    .quiet_window_ms
                    .or(base.session.quiet_window_ms),
                subscriber_capacity: overlay
                    .session
                    .subscriber_capacity
                    .or(base.session.subscriber_capacity),
                exec_id_ttl_secs: overlay
                    .session
                    .exec_id_ttl_secs
                    .or(base.session.exec_id_ttl_secs),
            },
            control: RawControlConfig {
                enable: overlay.control.enable.or(base.control.enable),
                start: overlay.control.start.or(base.control.start),
                stop: overlay.control.stop.or(base.control.stop),
                restart: overlay.control.restart.or(base.control.restart),
            },
            audit: RawAuditConfig {
                enabled: overlay.audit.enabled.or(base.audit.enabled),
                dir: overlay.audit.dir.or(base.audit.dir),
            },
            tunnel: RawTunnelConfig {
                enabled: overlay.tunnel.enabled.or(base.tunnel.enabled),
                auth: overlay.tunnel.auth.or(base.tunnel.auth),
            },
            remote: RawRemoteConfig {
                servers: overlay.remote.servers.or(base.remote.servers),
                auth: overlay.remote.auth.or(base.remote.auth),
            },
            preferences: overlay.preferences.or(base.preferences),
            targets: if overlay.targets.is_empty() {
                base.targets
            } else {
                overlay.targets
            },
        }
    }

    /// Convert raw config to final config with defaults applied
    fn finalize(raw: RawWebTtyConfig) -> WebTtyConfig {
        let server = ServerSection::default();
        let session = SessionSection::default();
        let audit = AuditSection::default();
        WebTtyConfig {
            server: ServerSection {
                host: raw.server.host.unwrap_or(server.host),
                port: raw.server.port.unwrap_or(server.port),
                credential: raw.server.credential,
                permit_write: raw.server.permit_write.unwrap_or(server.permit_write),
                enable_share: raw.server.enable_share.unwrap_or(server.enable_share),
                collaborate: raw.server.collaborate.unwrap_or(server.collaborate),
                idle_timeout_secs: raw
                    .server
                    .idle_timeout_secs
                    .unwrap_or(server.idle_timeout_secs),
                max_connections: raw.server.max_connections.unwrap_or(server.max_connections),
                title_format: raw.server.title_format.unwrap_or(server.title_format),
                reconnect: raw.server.reconnect,
            },
            session: SessionSection {
                replay_capacity: raw.session.replay_capacity.unwrap_or(session.replay_capacity),
                quiet_window_ms: raw.session.quiet_window_ms.unwrap_or(session.quiet_window_ms),
                subscriber_capacity: raw
                    .session
                    .subscriber_capacity
                    .unwrap_or(session.subscriber_capacity),
                exec_id_ttl_secs: raw
                    .session
                    .exec_id_ttl_secs
                    .unwrap_or(session.exec_id_ttl_secs),
            },
            // Individual actions default to on once control is enabled
            control: ControlSection {
                enable: raw.control.enable.unwrap_or(false),
                start: raw.control.start.unwrap_or(true),
                stop: raw.control.stop.unwrap_or(true),
                restart: raw.control.restart.unwrap_or(true),
            },
            audit: AuditSection {
                enabled: raw.audit.enabled.unwrap_or(audit.enabled),
                dir: raw.audit.dir.unwrap_or(audit.dir),
            },
            tunnel: TunnelSection {
                enabled: raw.tunnel.enabled.unwrap_or(false),
                auth: raw.tunnel.auth,
            },
            remote: RemoteSection {
                servers: raw.remote.servers.unwrap_or_default(),
                auth: raw.remote.auth,
            },
            preferences: raw.preferences,
            targets: raw.targets,
        }
    }

    /// Load config from a specific path (for testing)
    #[cfg(test)]
    pub fn load_from_path(path: &Path) -> Result<WebTtyConfig> {
        if path.exists() {
            Ok(Self::finalize(Self::read_raw(path)?))
        } else {
            Ok(Self::finalize(RawWebTtyConfig::default()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_load_nonexistent_returns_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nonexistent.toml");

        let config = ConfigLoader::load_from_path(&path).unwrap();

        assert_eq!(config.server.port, 8080);
        assert!(config.server.permit_write);
        assert!(!config.control.enable);
        assert!(config.control.restart);
    }

    #[test]
    fn test_load_from_valid_toml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9999
permit_write = false
idle_timeout_secs = 300

[control]
enable = true
stop = false

[preferences]
fontSize = 14

[[targets]]
id = "4f1c2d3e4a5b"
name = "dev"
"#
        )
        .unwrap();

        let config = ConfigLoader::load_from_path(&path).unwrap();

        assert_eq!(config.server.port, 9999);
        assert!(!config.server.permit_write);
        assert_eq!(config.server.idle_timeout_secs, 300);
        assert!(config.control.enable);
        assert!(!config.control.stop);
        assert!(config.control.start);
        assert_eq!(
            config.preferences.unwrap().get("fontSize"),
            Some(&toml::Value::Integer(14))
        );
        assert_eq!(config.targets[0].name, "dev");
    }

    #[test]
    fn test_load_invalid_toml_returns_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("invalid.toml");
        std::fs::write(&path, "this is not valid toml {{").unwrap();

        let result = ConfigLoader::load_from_path(&path);
        assert!(result.is_err());
    }

    #[test]
    fn test_merge_raw_overlay_overrides_base() {
        let base: RawWebTtyConfig = toml::from_str(
            r#"
[server]
host = "127.0.0.1"
port = 7000
credential = "base"

[remote]
servers = ["10.0.0.2:8080"]
auth = "base-auth"
"#,
        )
        .unwrap();
        let overlay: RawWebTtyConfig = toml::from_str(
            r#"
[server]
port = 8081

[remote]
auth = "overlay-auth"
"#,
        )
        .unwrap();

        let merged = ConfigLoader::merge_raw(base, overlay);

        assert_eq!(merged.server.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(merged.server.port, Some(8081));
        assert_eq!(merged.server.credential.as_deref(), Some("base"));
        assert_eq!(
            merged.remote.servers,
            Some(vec!["10.0.0.2:8080".to_string()])
        );
        assert_eq!(merged.remote.auth.as_deref(), Some("overlay-auth"));
    }

    #[test]
    fn test_merge_raw_targets_replace_whole_list() {
        let base: RawWebTtyConfig = toml::from_str(
            r#"
[[targets]]
id = "a"
name = "a"

[[targets]]
id = "b"
name = "b"
"#,
        )
        .unwrap();
        let overlay: RawWebTtyConfig = toml::from_str(
            r#"
[[targets]]
id = "c"
name = "c"
"#,
        )
        .unwrap();

        let merged = ConfigLoader::merge_raw(base.clone(), overlay);
        assert_eq!(merged.targets.len(), 1);
        assert_eq!(merged.targets[0].id, "c");

        let kept = ConfigLoader::merge_raw(base, RawWebTtyConfig::default());
        assert_eq!(kept.targets.len(), 2);
    }

    #[test]
    fn test_user_config_path_returns_some() {
        let path = ConfigLoader::user_config_path().unwrap();
        assert!(path.to_string_lossy().contains("webtty"));
        assert!(path.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    #[serial]
    fn test_project_config_path() {
        // SAFETY: serialized with the other tests touching this variable
        unsafe { std::env::remove_var(PROJECT_CONFIG_DIR_ENV) };
        let path = ConfigLoader::project_config_path();
        assert_eq!(path, PathBuf::from(".webtty/config.toml"));
    }

    #[test]
    #[serial]
    fn test_project_config_dir_override() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join("config.toml"),
            "[server]\nport = 7777\n[tunnel]\nenabled = true\n",
        )
        .unwrap();

        // SAFETY: serialized with the other tests touching this variable
        unsafe { std::env::set_var(PROJECT_CONFIG_DIR_ENV, temp_dir.path()) };
        let path = ConfigLoader::project_config_path();
        let config = ConfigLoader::load();
        unsafe { std::env::remove_var(PROJECT_CONFIG_DIR_ENV) };

        assert_eq!(path, temp_dir.path().join("config.toml"));
        let config = config.unwrap();
        assert!(config.tunnel.enabled);
    }
}

//! Containers owned by other webtty instances
//!
//! Each remote instance serves its backend on `/tunnel`. The
//! [`RemoteBackend`] merges their container lists and routes every call to
//! the instance named in the container's `location`.

mod connector;

pub use connector::WsConnector;

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use webtty_core::{
    BackendError, ByteStream, ContainerBackend, ContainerCache, ContainerInfo, ExecOptions,
    LogOptions, ShellHandle, TunnelClient,
};

/// How long a health ping may take before the instance is dropped
pub const PING_TIMEOUT: Duration = Duration::from_secs(1);

/// Backend over a set of remote instances
pub struct RemoteBackend {
    servers: RwLock<Vec<TunnelClient>>,
    cache: ContainerCache,
    ping_timeout: Duration,
}

impl RemoteBackend {
    pub fn new(servers: Vec<TunnelClient>) -> Self {
        Self {
            servers: RwLock::new(servers),
            cache: ContainerCache::new(),
            ping_timeout: PING_TIMEOUT,
        }
    }

    /// Backend over WebSocket tunnels to `addresses`, all sharing `auth`
    pub fn connect(addresses: &[String], auth: &str) -> Self {
        let servers = addresses
            .iter()
            .map(|address| TunnelClient::new(Arc::new(WsConnector::new(address)), auth))
            .collect();
        Self::new(servers)
    }

    pub fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    /// Addresses of the instances still considered alive
    pub fn addresses(&self) -> Vec<String> {
        self.servers()
            .iter()
            .map(|s| s.address().to_string())
            .collect()
    }

    fn servers(&self) -> Vec<TunnelClient> {
        self.servers.read().map(|s| s.clone()).unwrap_or_default()
    }

    /// Ping every instance and forget those that fail or time out
    ///
    /// Returns how many instances remain.
    pub async fn check_health(&self) -> usize {
        let servers = self.servers();
        let pings = servers.iter().map(|server| async move {
            match tokio::time::timeout(self.ping_timeout, server.ping()).await {
                Ok(Ok(_)) => None,
                Ok(Err(e)) => {
                    tracing::warn!(server = server.address(), error = %e, "Dropping unhealthy server");
                    Some(server.address().to_string())
                }
                Err(_) => {
                    tracing::warn!(server = server.address(), "Dropping server after ping timeout");
                    Some(server.address().to_string())
                }
            }
        });
        let dead: Vec<String> = join_all(pings).await.into_iter().flatten().collect();

        let Ok(mut servers) = self.servers.write() else {
            return 0;
        };
        servers.retain(|s| !dead.iter().any(|d| d == s.address()));
        servers.len()
    }

    fn server_for(&self, location: &str) -> Result<TunnelClient, BackendError> {
        self.servers()
            .into_iter()
            .find(|s| s.address() == location)
            .ok_or_else(|| BackendError::Remote(format!("no live server at {location:?}")))
    }

    async fn locate(&self, id: &str) -> Result<ContainerInfo, BackendError> {
        if let Some(info) = self.cache.find(id) {
            return Ok(info);
        }
        self.list().await?;
        self.cache
            .find(id)
            .ok_or_else(|| BackendError::NotFound(id.to_string()))
    }
}

#[async_trait]
impl ContainerBackend for RemoteBackend {
    fn name(&self) -> &str {
        "remote"
    }

    async fn list(&self) -> Result<Vec<ContainerInfo>, BackendError> {
        self.check_health().await;
        let servers = self.servers();
        let lists = servers.iter().map(|server| async move {
            match server.list().await {
                Ok(mut containers) => {
                    for info in &mut containers {
                        info.location = server.address().to_string();
                    }
                    containers
                }
                Err(e) => {
                    tracing::warn!(server = server.address(), error = %e, "Failed to list containers");
                    Vec::new()
                }
            }
        });
        let all: Vec<ContainerInfo> = join_all(lists).await.into_iter().flatten().collect();
        self.cache.replace(all);
        Ok(self.cache.list())
    }

    async fn get_info(&self, id: &str) -> Result<ContainerInfo, BackendError> {
        self.locate(id).await
    }

    async fn start(&self, id: &str) -> Result<(), BackendError> {
        let info = self.locate(id).await?;
        Ok(self.server_for(&info.location)?.start(&info.id).await?)
    }

    async fn stop(&self, id: &str) -> Result<(), BackendError> {
        let info = self.locate(id).await?;
        Ok(self.server_for(&info.location)?.stop(&info.id).await?)
    }

    async fn restart(&self, id: &str) -> Result<(), BackendError> {
        let info = self.locate(id).await?;
        Ok(self.server_for(&info.location)?.restart(&info.id).await?)
    }

    async fn exec(
        &self,
        container: &ContainerInfo,
        opts: ExecOptions,
    ) -> Result<Arc<dyn ShellHandle>, BackendError> {
        let server = self.server_for(&container.location)?;
        let shell = server.exec(container.clone(), opts).await?;
        Ok(Arc::new(shell))
    }

    async fn logs(&self, opts: LogOptions) -> Result<ByteStream, BackendError> {
        let info = self.locate(&opts.id).await?;
        let server = self.server_for(&info.location)?;
        let opts = LogOptions { id: info.id, ..opts };
        Ok(server.logs(opts).await?)
    }
}

//! In-memory backend for tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{
    ByteStream, ContainerAction, ContainerBackend, ContainerCache, ContainerInfo, ExecOptions,
    LogOptions,
};
use crate::error::BackendError;
use crate::shell::{MockShell, MockShellController, ShellHandle};

/// Backend whose exec shells are [`MockShell`]s
///
/// Each exec hands its controller to the test through [`MockBackend::next_shell`].
pub struct MockBackend {
    cache: ContainerCache,
    logs: Mutex<HashMap<String, Vec<u8>>>,
    actions: Mutex<Vec<(ContainerAction, String)>>,
    exec_calls: AtomicUsize,
    exec_options: Mutex<Vec<ExecOptions>>,
    shells_tx: mpsc::UnboundedSender<Arc<MockShellController>>,
    shells_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Arc<MockShellController>>>,
}

impl MockBackend {
    pub fn new(containers: Vec<ContainerInfo>) -> Self {
        let cache = ContainerCache::new();
        cache.replace(containers);
        let (shells_tx, shells_rx) = mpsc::unbounded_channel();
        Self {
            cache,
            logs: Mutex::new(HashMap::new()),
            actions: Mutex::new(Vec::new()),
            exec_calls: AtomicUsize::new(0),
            exec_options: Mutex::new(Vec::new()),
            shells_tx,
            shells_rx: tokio::sync::Mutex::new(shells_rx),
        }
    }

    /// Backend with a single running container
    pub fn single(id: &str, name: &str) -> Self {
        Self::new(vec![ContainerInfo {
            id: id.to_string(),
            name: name.to_string(),
            image: "mock".to_string(),
            state: "running".to_string(),
            status: "Up".to_string(),
            shell: "/bin/sh".to_string(),
            ..Default::default()
        }])
    }

    /// Raw bytes served by `logs` for `id`
    pub fn set_logs(&self, id: &str, data: &[u8]) {
        if let Ok(mut logs) = self.logs.lock() {
            logs.insert(id.to_string(), data.to_vec());
        }
    }

    pub fn exec_calls(&self) -> usize {
        self.exec_calls.load(Ordering::SeqCst)
    }

    pub fn exec_options(&self) -> Vec<ExecOptions> {
        self.exec_options.lock().map(|o| o.clone()).unwrap_or_default()
    }

    pub fn actions(&self) -> Vec<(ContainerAction, String)> {
        self.actions.lock().map(|a| a.clone()).unwrap_or_default()
    }

    /// Controller of the next shell handed out by `exec`
    pub async fn next_shell(&self) -> Option<Arc<MockShellController>> {
        self.shells_rx.lock().await.recv().await
    }

    fn record(&self, action: ContainerAction, id: &str) -> Result<(), BackendError> {
        let info = self
            .cache
            .find(id)
            .ok_or_else(|| BackendError::NotFound(id.to_string()))?;
        if let Ok(mut actions) = self.actions.lock() {
            actions.push((action, info.id));
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn list(&self) -> Result<Vec<ContainerInfo>, BackendError> {
        Ok(self.cache.list())
    }

    async fn get_info(&self, id: &str) -> Result<ContainerInfo, BackendError> {
        self.cache
            .find(id)
            .ok_or_else(|| BackendError::NotFound(id.to_string()))
    }

    async fn start(&self, id: &str) -> Result<(), BackendError> {
        self.record(ContainerAction::Start, id)
    }

    async fn stop(&self, id: &str) -> Result<(), BackendError> {
        self.record(ContainerAction::Stop, id)
    }

    async fn restart(&self, id: &str) -> Result<(), BackendError> {
        self.record(ContainerAction::Restart, id)
    }

    async fn exec(
        &self,
        container: &ContainerInfo,
        opts: ExecOptions,
    ) -> Result<Arc<dyn ShellHandle>, BackendError> {
        self.exec_calls.fetch_add(1, Ordering::SeqCst);
        if self.cache.find(&container.id).is_none() {
            return Err(BackendError::NotFound(container.id.clone()));
        }
        if let Ok(mut all) = self.exec_options.lock() {
            all.push(opts);
        }
        let (shell, controller) = MockShell::new();
        let _ = self.shells_tx.send(Arc::new(controller));
        Ok(Arc::new(shell))
    }

    async fn logs(&self, opts: LogOptions) -> Result<ByteStream, BackendError> {
        let info = self
            .cache
            .find(&opts.id)
            .ok_or_else(|| BackendError::NotFound(opts.id.clone()))?;
        let data = self
            .logs
            .lock()
            .ok()
            .and_then(|logs| logs.get(&info.id).cloned())
            .unwrap_or_default();
        Ok(Box::new(std::io::Cursor::new(data)))
    }
}

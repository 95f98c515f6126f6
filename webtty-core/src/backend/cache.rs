//! Container lookup cache

use std::collections::HashMap;
use std::sync::RwLock;

use super::{ContainerInfo, short_id};

/// Length of a short container id
pub const SHORT_ID_LEN: usize = 12;

/// Index of known containers by full and short id
#[derive(Debug, Default)]
pub struct ContainerCache {
    containers: RwLock<HashMap<String, ContainerInfo>>,
}

impl ContainerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached set, keeping shells already resolved
    pub fn replace(&self, containers: Vec<ContainerInfo>) {
        let Ok(mut cached) = self.containers.write() else {
            return;
        };
        let mut fresh = HashMap::with_capacity(containers.len());
        for mut info in containers {
            if info.shell.is_empty() {
                if let Some(old) = cached.get(&info.id) {
                    info.shell = old.shell.clone();
                }
            }
            fresh.insert(info.id.clone(), info);
        }
        *cached = fresh;
    }

    pub fn insert(&self, info: ContainerInfo) {
        if let Ok(mut cached) = self.containers.write() {
            cached.insert(info.id.clone(), info);
        }
    }

    /// Find by full id, short id, or a prefix matching exactly one container
    pub fn find(&self, id: &str) -> Option<ContainerInfo> {
        if id.is_empty() {
            return None;
        }
        let cached = self.containers.read().ok()?;
        if let Some(info) = cached.get(id) {
            return Some(info.clone());
        }
        let mut matches = cached
            .values()
            .filter(|info| short_id(&info.id) == id || info.id.starts_with(id));
        let first = matches.next()?;
        if matches.next().is_some() {
            return None;
        }
        Some(first.clone())
    }

    /// Record the shell found for a container
    pub fn set_shell(&self, id: &str, shell: &str) {
        if let Ok(mut cached) = self.containers.write() {
            if let Some(info) = cached.get_mut(id) {
                info.shell = shell.to_string();
            }
        }
    }

    pub fn list(&self) -> Vec<ContainerInfo> {
        let mut all: Vec<_> = self
            .containers
            .read()
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn len(&self) -> usize {
        self.containers.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! Registry of live exec sessions
//!
//! Exec ids are allocated when a client asks to exec into a container and are
//! bound to a [`Session`] once the first terminal connection arrives. Ids
//! nobody connects to expire after [`SessionConfig::exec_id_ttl`].

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::time::Instant;
use uuid::Uuid;

use super::config::SessionConfig;
use super::master::Session;
use super::topic::TopicRegistry;
use crate::error::SessionError;
use crate::shell::ShellHandle;

/// An allocated exec id
struct Target {
    container_id: String,
    allocated_at: Instant,
    /// Held by the connection starting the session
    starting: Arc<Mutex<()>>,
}

/// What a terminal connecting to an exec id should do
pub enum ExecClaim {
    /// A session is running; attach to it
    Join(Arc<Session>),
    /// Start the session; other connections wait until `guard` is dropped
    Start {
        container_id: String,
        guard: OwnedMutexGuard<()>,
    },
}

/// Owns every live session and the topics they publish on
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    targets: RwLock<HashMap<String, Target>>,
    topics: Arc<TopicRegistry>,
    config: SessionConfig,
}

impl SessionRegistry {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            targets: RwLock::new(HashMap::new()),
            topics: Arc::new(TopicRegistry::new(config.subscriber_capacity)),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn topics(&self) -> &Arc<TopicRegistry> {
        &self.topics
    }

    /// Allocate a fresh exec id targeting `container_id`
    ///
    /// Expired ids are pruned first.
    pub async fn allocate(&self, container_id: &str) -> String {
        let exec_id = Uuid::new_v4().to_string();
        let mut targets = self.targets.write().await;
        self.prune_expired(&mut targets).await;
        targets.insert(
            exec_id.clone(),
            Target {
                container_id: container_id.to_string(),
                allocated_at: Instant::now(),
                starting: Arc::new(Mutex::new(())),
            },
        );
        tracing::debug!(exec_id = %exec_id, container = %container_id, "Exec id allocated");
        exec_id
    }

    async fn prune_expired(&self, targets: &mut HashMap<String, Target>) {
        let ttl = self.config.exec_id_ttl;
        let sessions = self.sessions.read().await;
        let before = targets.len();
        targets.retain(|id, target| {
            target.allocated_at.elapsed() < ttl
                || sessions.contains_key(id)
                || target.starting.try_lock().is_err()
        });
        let pruned = before - targets.len();
        if pruned > 0 {
            tracing::debug!(pruned, "Expired exec ids pruned");
        }
    }

    /// Container an exec id was allocated for
    pub async fn target(&self, exec_id: &str) -> Option<String> {
        self.targets
            .read()
            .await
            .get(exec_id)
            .map(|t| t.container_id.clone())
    }

    /// Decide whether a new connection to `exec_id` starts or joins its session
    ///
    /// Concurrent first connections are serialized so only one of them
    /// starts a shell. `None` when the id is unknown or expired.
    pub async fn claim(&self, exec_id: &str) -> Option<ExecClaim> {
        if let Some(session) = self.get(exec_id).await {
            return Some(ExecClaim::Join(session));
        }
        let starting = self
            .targets
            .read()
            .await
            .get(exec_id)
            .map(|t| Arc::clone(&t.starting))?;
        let guard = starting.lock_owned().await;
        if let Some(session) = self.get(exec_id).await {
            return Some(ExecClaim::Join(session));
        }
        let container_id = self.target(exec_id).await?;
        Some(ExecClaim::Start {
            container_id,
            guard,
        })
    }

    /// Start a session for `id` around `shell`
    pub async fn create(
        &self,
        shell: Arc<dyn ShellHandle>,
        id: &str,
    ) -> Result<Arc<Session>, SessionError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(id) {
            return Err(SessionError::AlreadyExists(id.to_string()));
        }
        let session = Arc::new(Session::create(
            shell,
            id,
            Arc::clone(&self.topics),
            self.config,
        ));
        sessions.insert(id.to_string(), Arc::clone(&session));
        Ok(session)
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Close and forget a session and its exec id
    pub async fn remove(&self, id: &str) -> Option<Arc<Session>> {
        self.targets.write().await.remove(id);
        let session = self.sessions.write().await.remove(id);
        if let Some(session) = &session {
            session.close();
        }
        session
    }

    pub async fn ids(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

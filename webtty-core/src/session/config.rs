//! Session configuration

use std::time::Duration;

use super::replay::DEFAULT_REPLAY_CAPACITY;

/// Default quiet window for write arbitration
pub const DEFAULT_QUIET_WINDOW: Duration = Duration::from_secs(1);

/// Default per-subscriber queue depth, in chunks
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

/// Default lifetime of an exec id that no terminal has connected to
pub const DEFAULT_EXEC_ID_TTL: Duration = Duration::from_secs(60);

/// Tunables shared by every session a registry creates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Bytes of recent output replayed to new views
    pub replay_capacity: usize,
    /// How long a writer keeps the keyboard after typing
    pub quiet_window: Duration,
    /// Chunks a slow view may fall behind before it is dropped
    pub subscriber_capacity: usize,
    /// Unclaimed exec ids older than this are forgotten
    pub exec_id_ttl: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            replay_capacity: DEFAULT_REPLAY_CAPACITY,
            quiet_window: DEFAULT_QUIET_WINDOW,
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
            exec_id_ttl: DEFAULT_EXEC_ID_TTL,
        }
    }
}

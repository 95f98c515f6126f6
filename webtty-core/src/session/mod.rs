//! Shared terminal sessions
//!
//! A [`Session`] owns one shell and is driven by the connection that started
//! it. Any number of [`View`]s can be forked from it to watch, and optionally
//! type into, the same shell.

mod arbiter;
mod config;
mod master;
mod registry;
mod replay;
mod topic;
mod view;

pub use arbiter::{Arbiter, ViewId, Writer};
pub use config::{DEFAULT_QUIET_WINDOW, DEFAULT_SUBSCRIBER_CAPACITY, SessionConfig};
pub use master::Session;
pub use registry::{ExecClaim, SessionRegistry};
pub use replay::{DEFAULT_REPLAY_CAPACITY, ReplayBuffer};
pub use topic::{Chunk, SubscriberGuard, Subscription, Topic, TopicRegistry};
pub use view::View;

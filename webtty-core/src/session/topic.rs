//! Output fan-out
//!
//! A [`Topic`] delivers every published chunk to each subscriber through its
//! own bounded FIFO channel, so per-subscriber order matches publish order.
//! A subscriber that falls a whole channel behind is evicted instead of
//! stalling the publisher.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, Weak};

use tokio::sync::mpsc;

/// One published output chunk, shared by all subscribers
pub type Chunk = Arc<[u8]>;

#[derive(Debug, Default)]
struct Subscribers {
    senders: HashMap<u64, mpsc::Sender<Chunk>>,
    next_id: u64,
    closed: bool,
}

/// Broadcast topic for one session's output
#[derive(Debug)]
pub struct Topic {
    name: String,
    capacity: usize,
    subscribers: Mutex<Subscribers>,
}

/// Live feed from a topic
///
/// `rx` yields `None` once the topic closes or this subscriber is evicted.
/// Dropping `guard` unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    pub rx: mpsc::Receiver<Chunk>,
    pub guard: SubscriberGuard,
}

/// Removes its subscriber from the topic when dropped
#[derive(Debug)]
pub struct SubscriberGuard {
    topic: Weak<Topic>,
    id: u64,
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        if let Some(topic) = self.topic.upgrade() {
            topic.unsubscribe(self.id);
        }
    }
}

impl Topic {
    pub fn new(name: impl Into<String>, capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            capacity: capacity.max(1),
            subscribers: Mutex::new(Subscribers::default()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = match self.subscribers.lock() {
            Ok(mut subs) => {
                let id = subs.next_id;
                subs.next_id += 1;
                // A closed topic hands out a feed that is already finished
                if !subs.closed {
                    subs.senders.insert(id, tx);
                }
                id
            }
            Err(_) => 0,
        };
        Subscription {
            rx,
            guard: SubscriberGuard {
                topic: Arc::downgrade(self),
                id,
            },
        }
    }

    /// Deliver `chunk` to every subscriber, returning how many received it
    pub fn publish(&self, chunk: Chunk) -> usize {
        let Ok(mut subs) = self.subscribers.lock() else {
            return 0;
        };
        let mut delivered = 0;
        subs.senders.retain(|id, tx| match tx.try_send(Arc::clone(&chunk)) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(topic = %self.name, subscriber = id, "Evicting slow subscriber");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
        delivered
    }

    /// Finish every subscriber's feed after its queued chunks
    pub fn close(&self) {
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.closed = true;
            subs.senders.clear();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.subscribers.lock().map(|s| s.closed).unwrap_or(true)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.senders.len()).unwrap_or(0)
    }

    fn unsubscribe(&self, id: u64) {
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.senders.remove(&id);
        }
    }
}

/// Process-wide set of topics keyed by session id
#[derive(Debug)]
pub struct TopicRegistry {
    topics: RwLock<HashMap<String, Arc<Topic>>>,
    capacity: usize,
}

impl TopicRegistry {
    /// `capacity` is the per-subscriber queue depth of topics it opens
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Open the topic for `id`, returning the existing one if already open
    pub fn open(&self, id: &str) -> Arc<Topic> {
        if let Ok(mut topics) = self.topics.write() {
            return Arc::clone(
                topics
                    .entry(id.to_string())
                    .or_insert_with(|| Topic::new(id, self.capacity)),
            );
        }
        Topic::new(id, self.capacity)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Topic>> {
        self.topics.read().ok()?.get(id).cloned()
    }

    /// Close and forget the topic for `id`
    pub fn close(&self, id: &str) {
        let removed = self.topics.write().ok().and_then(|mut t| t.remove(id));
        if let Some(topic) = removed {
            topic.close();
        }
    }

    pub fn len(&self) -> usize {
        self.topics.read().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(data: &[u8]) -> Chunk {
        Arc::from(data)
    }

    #[tokio::test]
    async fn each_subscriber_receives_in_order() {
        let topic = Topic::new("s1", 8);
        let mut a = topic.subscribe();
        let mut b = topic.subscribe();

        assert_eq!(topic.publish(chunk(b"one")), 2);
        assert_eq!(topic.publish(chunk(b"two")), 2);

        for sub in [&mut a, &mut b] {
            assert_eq!(&*sub.rx.recv().await.unwrap(), b"one");
            assert_eq!(&*sub.rx.recv().await.unwrap(), b"two");
        }
    }

    #[tokio::test]
    async fn dropping_guard_unsubscribes() {
        let topic = Topic::new("s1", 8);
        let sub = topic.subscribe();
        assert_eq!(topic.subscriber_count(), 1);
        drop(sub);
        assert_eq!(topic.subscriber_count(), 0);
        assert_eq!(topic.publish(chunk(b"x")), 0);
    }

    #[tokio::test]
    async fn full_subscriber_is_evicted() {
        let topic = Topic::new("s1", 1);
        let mut slow = topic.subscribe();
        assert_eq!(topic.publish(chunk(b"a")), 1);
        assert_eq!(topic.publish(chunk(b"b")), 0);
        assert_eq!(topic.subscriber_count(), 0);

        assert_eq!(&*slow.rx.recv().await.unwrap(), b"a");
        assert!(slow.rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn close_ends_feeds_after_queued_chunks() {
        let topic = Topic::new("s1", 8);
        let mut sub = topic.subscribe();
        topic.publish(chunk(b"last"));
        topic.close();
        assert!(topic.is_closed());
        assert_eq!(&*sub.rx.recv().await.unwrap(), b"last");
        assert!(sub.rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn subscribing_to_closed_topic_yields_finished_feed() {
        let topic = Topic::new("s1", 8);
        topic.close();
        let mut sub = topic.subscribe();
        assert!(sub.rx.recv().await.is_none());
    }

    #[test]
    fn registry_open_is_idempotent() {
        let registry = TopicRegistry::new(8);
        let first = registry.open("abc");
        let second = registry.open("abc");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn registry_close_removes_and_closes() {
        let registry = TopicRegistry::new(8);
        let topic = registry.open("abc");
        registry.close("abc");
        assert!(registry.get("abc").is_none());
        assert!(topic.is_closed());
        assert!(registry.is_empty());
    }
}

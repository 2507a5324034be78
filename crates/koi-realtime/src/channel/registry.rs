//! Subscription registry — maps topics to ordered callback lists.
//!
//! At most one live entry exists per topic string: a second subscribe to
//! the same topic appends a callback to the existing entry instead of
//! opening a duplicate channel. Opens issued while disconnected are
//! deferred and flushed once the transport comes up; after a reconnect
//! only the currently-live topics are replayed.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::{debug, trace};

use crate::connection::transport::FrameSender;
use crate::event::bus::{ClientEvent, EventCallback};
use crate::message::types::OutboundFrame;

use super::subscription::{CallbackId, SubscriptionHandle};

/// One live topic entry.
#[derive(Default)]
struct TopicEntry {
    /// Ordered callback list.
    callbacks: Vec<(CallbackId, EventCallback)>,
}

/// Registry of all live topic subscriptions.
pub struct SubscriptionRegistry {
    sender: FrameSender,
    topics: DashMap<String, TopicEntry>,
    next_callback_id: AtomicU64,
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("topics", &self.topics.len())
            .finish()
    }
}

impl SubscriptionRegistry {
    /// Creates a new registry sending opens through the given sender.
    pub fn new(sender: FrameSender) -> Self {
        Self {
            sender,
            topics: DashMap::new(),
            next_callback_id: AtomicU64::new(1),
        }
    }

    /// Registers a callback on a topic.
    ///
    /// Opens the topic against the live transport on first subscribe. If
    /// the transport is not connected the open is deferred and sent by
    /// the next [`flush`](Self::flush).
    pub fn subscribe(
        self: &Arc<Self>,
        topic: impl Into<String>,
        callback: impl Fn(&ClientEvent) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        let topic = topic.into();
        let id = self.next_callback_id.fetch_add(1, Ordering::Relaxed);
        let mut opened = false;

        self.topics
            .entry(topic.clone())
            .or_insert_with(|| {
                opened = true;
                TopicEntry::default()
            })
            .callbacks
            .push((id, Arc::new(callback)));

        if opened {
            match self.sender.send(&OutboundFrame::Subscribe {
                topic: topic.clone(),
            }) {
                Ok(()) => debug!(topic = %topic, "Subscribed to topic"),
                // Deferred, not an error: flushed on connect.
                Err(_) => debug!(topic = %topic, "Subscribe deferred until connected"),
            }
        }

        SubscriptionHandle {
            topic,
            id,
            registry: Arc::downgrade(self),
        }
    }

    /// Tears down a topic entry and releases its channel.
    pub fn unsubscribe(&self, topic: &str) {
        if self.topics.remove(topic).is_some() {
            let _ = self.sender.send(&OutboundFrame::Unsubscribe {
                topic: topic.to_string(),
            });
            debug!(topic = %topic, "Unsubscribed from topic");
        }
    }

    /// Tears down every topic entry.
    pub fn unsubscribe_all(&self) {
        let topics: Vec<String> = self.topics.iter().map(|e| e.key().clone()).collect();
        for topic in &topics {
            self.unsubscribe(topic);
        }
    }

    /// Re-opens every live topic against the transport.
    ///
    /// Called after a (re)connect; the replay set is exactly the topics
    /// live right now, bounding reconnect cost.
    pub fn flush(&self) {
        for entry in self.topics.iter() {
            let topic = entry.key().clone();
            match self.sender.send(&OutboundFrame::Subscribe {
                topic: topic.clone(),
            }) {
                Ok(()) => debug!(topic = %topic, "Replayed topic subscription"),
                Err(e) => debug!(topic = %topic, error = %e, "Topic replay failed"),
            }
        }
    }

    /// Invokes every callback registered on a topic.
    pub fn dispatch(&self, topic: &str, event: &ClientEvent) {
        // Clone the list so callbacks run without holding the shard lock.
        let callbacks: Vec<EventCallback> = match self.topics.get(topic) {
            Some(entry) => entry.callbacks.iter().map(|(_, cb)| cb.clone()).collect(),
            None => return,
        };

        trace!(topic = %topic, count = callbacks.len(), "Dispatching to topic callbacks");
        for callback in callbacks {
            callback(event);
        }
    }

    /// Whether an entry exists for a topic.
    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }

    /// Number of live topics.
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    /// Number of callbacks on one topic.
    pub fn callback_count(&self, topic: &str) -> usize {
        self.topics
            .get(topic)
            .map(|entry| entry.callbacks.len())
            .unwrap_or(0)
    }

    pub(crate) fn remove_callback(&self, topic: &str, id: CallbackId) {
        let now_empty = match self.topics.get_mut(topic) {
            Some(mut entry) => {
                entry.callbacks.retain(|(callback_id, _)| *callback_id != id);
                entry.callbacks.is_empty()
            }
            None => return,
        };

        if now_empty {
            self.unsubscribe(topic);
        }
    }
}

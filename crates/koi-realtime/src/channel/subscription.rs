//! Subscription handles.

use std::sync::Weak;

use super::registry::SubscriptionRegistry;

/// Identifier of one callback within a topic entry.
pub type CallbackId = u64;

/// Handle to one callback registered on a topic.
///
/// `cancel` removes only this callback; the topic's underlying channel
/// stays open while other callbacks remain.
#[derive(Debug)]
pub struct SubscriptionHandle {
    pub(crate) topic: String,
    pub(crate) id: CallbackId,
    pub(crate) registry: Weak<SubscriptionRegistry>,
}

impl SubscriptionHandle {
    /// The topic this handle refers to.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Removes this callback. If it was the last one on the topic, the
    /// topic itself is closed.
    pub fn cancel(self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove_callback(&self.topic, self.id);
        }
    }
}

//! Presence tracker — the set of currently-online peers.
//!
//! Updated incrementally from connect/disconnect broadcasts; rebuilt
//! wholesale only from the full snapshot received right after connect.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use koi_core::types::UserId;

/// Tracks which peers are online.
#[derive(Debug)]
pub struct PresenceTracker {
    /// User ID → when they came online.
    online: DashMap<UserId, DateTime<Utc>>,
}

impl PresenceTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self {
            online: DashMap::new(),
        }
    }

    /// Replaces the whole set from a snapshot.
    pub fn set_all(&self, user_ids: Vec<UserId>) {
        self.online.clear();
        let now = Utc::now();
        for user_id in user_ids {
            self.online.insert(user_id, now);
        }
    }

    /// Marks a peer online. Returns `false` if they already were.
    pub fn mark_online(&self, user_id: UserId) -> bool {
        self.online.insert(user_id, Utc::now()).is_none()
    }

    /// Marks a peer offline. Returns `false` if they already were.
    pub fn mark_offline(&self, user_id: UserId) -> bool {
        self.online.remove(&user_id).is_some()
    }

    /// Whether a peer is online. Unknown identifiers are offline.
    pub fn is_online(&self, user_id: UserId) -> bool {
        self.online.contains_key(&user_id)
    }

    /// Number of online peers.
    pub fn online_count(&self) -> usize {
        self.online.len()
    }

    /// All online peer IDs.
    pub fn snapshot(&self) -> Vec<UserId> {
        self.online.iter().map(|entry| *entry.key()).collect()
    }
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_users_are_offline() {
        let tracker = PresenceTracker::new();
        assert!(!tracker.is_online(UserId::new()));
    }

    #[test]
    fn marks_are_idempotent() {
        let tracker = PresenceTracker::new();
        let user = UserId::new();

        assert!(tracker.mark_online(user));
        assert!(!tracker.mark_online(user));
        assert_eq!(tracker.online_count(), 1);

        assert!(tracker.mark_offline(user));
        assert!(!tracker.mark_offline(user));
        assert_eq!(tracker.online_count(), 0);
    }

    #[test]
    fn snapshot_replaces_the_set() {
        let tracker = PresenceTracker::new();
        let stale = UserId::new();
        tracker.mark_online(stale);

        let fresh = vec![UserId::new(), UserId::new()];
        tracker.set_all(fresh.clone());

        assert!(!tracker.is_online(stale));
        assert!(fresh.iter().all(|u| tracker.is_online(*u)));
        assert_eq!(tracker.online_count(), 2);
    }
}

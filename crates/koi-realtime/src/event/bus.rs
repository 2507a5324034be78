//! Global event bus.
//!
//! Every inbound frame and every local state change is published here as
//! a typed [`ClientEvent`]. Consumers either register a callback for one
//! [`EventKind`] category or take a broadcast receiver for the full
//! stream. Topic-scoped delivery is handled separately by the
//! subscription registry; a frame reaches each listener exactly once.

use std::sync::Arc;
use std::sync::Weak;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::trace;

use koi_core::types::{ConversationId, MessageId, UserId};

use crate::call::session::CallSnapshot;
use crate::connection::state::ConnectionState;
use crate::message::types::{ChatMessage, MessageStatus};

/// Event category, used for per-category listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Connection lifecycle changes.
    Connection,
    /// Transport, send, and server errors.
    Error,
    /// Chat messages.
    Message,
    /// Typing indicators.
    Typing,
    /// Read receipts.
    Read,
    /// Message deletions.
    Delete,
    /// Message status updates.
    Status,
    /// Presence changes.
    Presence,
    /// Call session state changes.
    Call,
}

/// A typed event published on the bus.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// The connection state changed.
    ConnectionChanged {
        /// New state.
        state: ConnectionState,
    },
    /// A connection-level failure occurred; a reconnect is scheduled
    /// unless the policy is exhausted.
    TransportError {
        /// Failure description.
        message: String,
    },
    /// The reconnect policy gave up. Fired exactly once per exhaustion.
    ReconnectExhausted {
        /// Attempts made before giving up.
        attempts: u32,
    },
    /// The backend reported an error frame.
    ServerError {
        /// Error code.
        code: String,
        /// Error description.
        message: String,
    },
    /// A message failed on both the transport and the REST fallback.
    SendFailed {
        /// Conversation of the failed message.
        conversation_id: ConversationId,
        /// The failed message.
        message_id: MessageId,
    },
    /// A new or updated chat message.
    Message {
        /// Conversation.
        conversation_id: ConversationId,
        /// The message as merged into the visible log.
        message: ChatMessage,
    },
    /// A peer started or stopped typing.
    Typing {
        /// Conversation.
        conversation_id: ConversationId,
        /// Typing peer.
        user_id: UserId,
        /// Whether the peer is typing.
        is_typing: bool,
    },
    /// A peer read a message.
    Read {
        /// Conversation.
        conversation_id: ConversationId,
        /// Reading peer.
        user_id: UserId,
        /// Message that was read.
        message_id: MessageId,
    },
    /// A message was deleted.
    Delete {
        /// Conversation.
        conversation_id: ConversationId,
        /// Deleted message.
        message_id: MessageId,
    },
    /// A message status changed.
    MessageStatus {
        /// Conversation.
        conversation_id: ConversationId,
        /// Affected message.
        message_id: MessageId,
        /// New status.
        status: MessageStatus,
    },
    /// A peer's online state changed.
    PresenceChanged {
        /// The peer.
        user_id: UserId,
        /// New online state.
        online: bool,
    },
    /// The full presence set was replaced by a snapshot.
    PresenceSnapshot {
        /// All currently-online peers.
        online: Vec<UserId>,
    },
    /// The call session changed state.
    CallStateChanged {
        /// Snapshot of the session after the change.
        snapshot: CallSnapshot,
    },
}

impl ClientEvent {
    /// The category this event belongs to.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ConnectionChanged { .. } => EventKind::Connection,
            Self::TransportError { .. }
            | Self::ReconnectExhausted { .. }
            | Self::ServerError { .. }
            | Self::SendFailed { .. } => EventKind::Error,
            Self::Message { .. } => EventKind::Message,
            Self::Typing { .. } => EventKind::Typing,
            Self::Read { .. } => EventKind::Read,
            Self::Delete { .. } => EventKind::Delete,
            Self::MessageStatus { .. } => EventKind::Status,
            Self::PresenceChanged { .. } | Self::PresenceSnapshot { .. } => EventKind::Presence,
            Self::CallStateChanged { .. } => EventKind::Call,
        }
    }
}

/// Callback invoked for events of one category.
pub type EventCallback = Arc<dyn Fn(&ClientEvent) + Send + Sync>;

/// The global event bus.
pub struct EventBus {
    /// Category → ordered listener list.
    listeners: DashMap<EventKind, Vec<(u64, EventCallback)>>,
    /// Broadcast channel for stream-style consumers.
    broadcast: broadcast::Sender<ClientEvent>,
    /// Listener ID source.
    next_id: AtomicU64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("categories", &self.listeners.len())
            .finish()
    }
}

impl EventBus {
    /// Creates a new event bus with the given broadcast buffer size.
    pub fn new(buffer_size: usize) -> Self {
        let (broadcast, _) = broadcast::channel(buffer_size.max(1));
        Self {
            listeners: DashMap::new(),
            broadcast,
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a callback for one event category.
    pub fn on(
        self: &Arc<Self>,
        kind: EventKind,
        callback: impl Fn(&ClientEvent) + Send + Sync + 'static,
    ) -> ListenerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .entry(kind)
            .or_default()
            .push((id, Arc::new(callback)));
        ListenerHandle {
            kind,
            id,
            bus: Arc::downgrade(self),
        }
    }

    /// Returns a receiver for the full event stream.
    ///
    /// Slow receivers lag rather than block the dispatch path.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.broadcast.subscribe()
    }

    /// Publishes an event to category listeners and stream subscribers.
    pub fn emit(&self, event: ClientEvent) {
        trace!(kind = ?event.kind(), "Emitting client event");

        // Clone the callback list so listeners run without holding the
        // map shard lock.
        let callbacks: Vec<EventCallback> = self
            .listeners
            .get(&event.kind())
            .map(|entry| entry.iter().map(|(_, cb)| cb.clone()).collect())
            .unwrap_or_default();

        for callback in callbacks {
            callback(&event);
        }

        // No stream subscribers is fine.
        let _ = self.broadcast.send(event);
    }

    fn remove(&self, kind: EventKind, id: u64) {
        if let Some(mut entry) = self.listeners.get_mut(&kind) {
            entry.retain(|(listener_id, _)| *listener_id != id);
        }
    }
}

/// Handle to a registered category listener.
#[derive(Debug)]
pub struct ListenerHandle {
    kind: EventKind,
    id: u64,
    bus: Weak<EventBus>,
}

impl ListenerHandle {
    /// Removes the listener this handle refers to.
    pub fn cancel(self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.kind, self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn message_event() -> ClientEvent {
        ClientEvent::Typing {
            conversation_id: ConversationId::new(),
            user_id: UserId::new(),
            is_typing: true,
        }
    }

    #[test]
    fn listeners_fire_in_registration_order() {
        let bus = Arc::new(EventBus::new(8));
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = order.clone();
        let _a = bus.on(EventKind::Typing, move |_| first.lock().unwrap().push(1));
        let second = order.clone();
        let _b = bus.on(EventKind::Typing, move |_| second.lock().unwrap().push(2));

        bus.emit(message_event());
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn cancelled_listener_stops_firing() {
        let bus = Arc::new(EventBus::new(8));
        let count = Arc::new(Mutex::new(0u32));

        let counter = count.clone();
        let handle = bus.on(EventKind::Typing, move |_| *counter.lock().unwrap() += 1);

        bus.emit(message_event());
        handle.cancel();
        bus.emit(message_event());

        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn events_only_reach_their_category() {
        let bus = Arc::new(EventBus::new(8));
        let count = Arc::new(Mutex::new(0u32));

        let counter = count.clone();
        let _handle = bus.on(EventKind::Message, move |_| *counter.lock().unwrap() += 1);

        bus.emit(message_event());
        assert_eq!(*count.lock().unwrap(), 0);
    }
}

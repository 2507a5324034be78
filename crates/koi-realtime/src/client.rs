//! Client facade — wires the engine together and exposes its API.
//!
//! Construction is pure wiring: nothing connects until
//! [`RealtimeClient::connect`] is called. The transport, REST, and media
//! collaborators are trait objects so tests can swap in mocks.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{broadcast, watch};
use tracing::info;

use koi_core::config::ClientConfig;
use koi_core::result::ClientResult;
use koi_core::types::{ConversationId, MessageId, UserId};

use crate::call::machine::CallMachine;
use crate::call::negotiator::MediaNegotiator;
use crate::call::session::{CallSnapshot, CallType};
use crate::channel::registry::SubscriptionRegistry;
use crate::channel::subscription::SubscriptionHandle;
use crate::channel::topic;
use crate::connection::manager::ConnectionManager;
use crate::connection::state::{ConnectionState, ConnectionStatus};
use crate::connection::transport::{FrameSender, Transport, TransportEndpoint, WsTransport};
use crate::event::bus::{ClientEvent, EventBus, EventCallback, EventKind, ListenerHandle};
use crate::message::log::MessageLog;
use crate::message::router::MessageRouter;
use crate::message::types::{ChatMessage, MessageBody};
use crate::message::typing::TypingNotifier;
use crate::presence::tracker::PresenceTracker;
use crate::rest::api::RestApi;
use crate::rest::http::HttpRestApi;

/// The real-time client engine.
///
/// One instance owns one logical session: a persistent transport, its
/// topic subscriptions, the visible message log, presence, and the call
/// session.
pub struct RealtimeClient {
    identity: UserId,
    bus: Arc<EventBus>,
    presence: Arc<PresenceTracker>,
    registry: Arc<SubscriptionRegistry>,
    calls: Arc<CallMachine>,
    router: Arc<MessageRouter>,
    manager: Arc<ConnectionManager>,
    /// Keeps the global presence topic open. `disconnect` tears every
    /// topic down, so `connect` re-opens this one for the new session.
    presence_topic: Mutex<SubscriptionHandle>,
}

impl std::fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeClient")
            .field("identity", &self.identity)
            .field("connected", &self.manager.is_connected())
            .finish()
    }
}

impl RealtimeClient {
    /// Builds a client from explicit collaborators.
    pub fn new(
        identity: UserId,
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        rest: Arc<dyn RestApi>,
        negotiator: Arc<dyn MediaNegotiator>,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let sender = FrameSender::new(state_rx);

        let bus = Arc::new(EventBus::new(config.realtime.event_buffer_size));
        let presence = Arc::new(PresenceTracker::new());
        let registry = Arc::new(SubscriptionRegistry::new(sender.clone()));
        let calls = Arc::new(CallMachine::new(
            config.call.clone(),
            sender.clone(),
            bus.clone(),
            negotiator,
            identity,
        ));

        let log = MessageLog::new(config.realtime.max_messages_per_conversation);
        let typing = TypingNotifier::new(sender.clone(), identity, config.realtime.typing_debounce());
        let router = Arc::new(MessageRouter::new(
            identity,
            sender.clone(),
            registry.clone(),
            bus.clone(),
            presence.clone(),
            calls.clone(),
            rest.clone(),
            log,
            typing,
        ));

        let manager = Arc::new(ConnectionManager::new(
            config.realtime.clone(),
            transport,
            registry.clone(),
            presence.clone(),
            rest,
            router.clone(),
            bus.clone(),
            sender,
            state_tx,
        ));

        // Presence flows on a global topic; keep it open so every
        // (re)connect replays it. Consumers read it off the bus.
        let presence_topic = registry.subscribe(topic::PRESENCE_GLOBAL, |_| {});

        info!(identity = %identity, "Realtime client built");
        Self {
            identity,
            bus,
            presence,
            registry,
            calls,
            router,
            manager,
            presence_topic: Mutex::new(presence_topic),
        }
    }

    /// Builds a client with the WebSocket transport, the HTTP REST
    /// collaborator, and no media negotiation.
    pub fn with_defaults(
        identity: UserId,
        config: ClientConfig,
        bearer_token: impl Into<String>,
    ) -> ClientResult<Self> {
        let transport = Arc::new(WsTransport::new(config.realtime.send_buffer_size));
        let rest = Arc::new(HttpRestApi::new(&config.rest, bearer_token)?);
        let negotiator = Arc::new(crate::call::negotiator::NullNegotiator);
        Ok(Self::new(identity, config, transport, rest, negotiator))
    }

    /// The local user this client acts as.
    pub fn identity(&self) -> UserId {
        self.identity
    }

    // --- Connection ---

    /// Connects to the messaging backend. Idempotent.
    pub async fn connect(&self, url: impl Into<String>, bearer_token: impl Into<String>) {
        {
            // A prior disconnect unsubscribed every topic; re-open the
            // client-owned presence topic so the new session replays it.
            let mut slot = self
                .presence_topic
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if !self.registry.is_subscribed(topic::PRESENCE_GLOBAL) {
                *slot = self.registry.subscribe(topic::PRESENCE_GLOBAL, |_| {});
            }
        }

        self.manager
            .connect(TransportEndpoint {
                url: url.into(),
                bearer_token: bearer_token.into(),
                user_id: Some(self.identity),
            })
            .await;
    }

    /// Disconnects and cancels all pending timers. Idempotent.
    pub async fn disconnect(&self) {
        self.router.cancel_typing();
        self.manager.disconnect().await;
    }

    /// Whether the transport is currently connected.
    pub fn is_connected(&self) -> bool {
        self.manager.is_connected()
    }

    /// Snapshot of connection health.
    pub fn connection_status(&self) -> ConnectionStatus {
        self.manager.status()
    }

    // --- Events ---

    /// Registers a callback for one event category.
    pub fn on(
        &self,
        kind: EventKind,
        callback: impl Fn(&ClientEvent) + Send + Sync + 'static,
    ) -> ListenerHandle {
        self.bus.on(kind, callback)
    }

    /// Returns a receiver for the full event stream.
    pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
        self.bus.subscribe()
    }

    // --- Subscriptions ---

    /// Opens the four per-conversation topics (messages, typing, read
    /// receipts, deletions) with one shared callback.
    ///
    /// Dropping or cancelling every returned handle closes the topics.
    pub fn subscribe_conversation(
        &self,
        conversation_id: ConversationId,
        callback: impl Fn(&ClientEvent) + Send + Sync + 'static,
    ) -> Vec<SubscriptionHandle> {
        let callback: EventCallback = Arc::new(callback);
        [
            topic::conversation_messages(&conversation_id),
            topic::conversation_typing(&conversation_id),
            topic::conversation_read(&conversation_id),
            topic::conversation_deletions(&conversation_id),
        ]
        .into_iter()
        .map(|name| {
            let callback = callback.clone();
            self.registry.subscribe(name, move |event| callback(event))
        })
        .collect()
    }

    /// Registers a callback on the global presence topic.
    pub fn subscribe_presence(
        &self,
        callback: impl Fn(&ClientEvent) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        self.registry.subscribe(topic::PRESENCE_GLOBAL, callback)
    }

    // --- Messaging ---

    /// Sends a chat message; see [`MessageRouter::send_message`].
    pub async fn send_message(
        &self,
        conversation_id: ConversationId,
        body: MessageBody,
    ) -> ClientResult<ChatMessage> {
        self.router.send_message(conversation_id, body).await
    }

    /// Sends a plain-text message.
    pub async fn send_text(
        &self,
        conversation_id: ConversationId,
        text: impl Into<String>,
    ) -> ClientResult<ChatMessage> {
        self.send_message(conversation_id, MessageBody::Text { text: text.into() })
            .await
    }

    /// Sends a read receipt.
    pub fn mark_read(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
    ) -> ClientResult<()> {
        self.router.mark_read(conversation_id, message_id)
    }

    /// Signals a local keystroke in a conversation.
    pub fn notify_typing(&self, conversation_id: ConversationId) {
        self.router.notify_typing(conversation_id);
    }

    /// The visible messages of a conversation, oldest first.
    pub fn visible_messages(&self, conversation_id: &ConversationId) -> Vec<ChatMessage> {
        self.router.visible_messages(conversation_id)
    }

    /// Drops a conversation's visible log.
    pub fn clear_conversation(&self, conversation_id: &ConversationId) {
        self.router.clear_conversation(conversation_id);
    }

    // --- Presence ---

    /// Whether a peer is currently online.
    pub fn is_online(&self, user_id: UserId) -> bool {
        self.presence.is_online(user_id)
    }

    /// All currently-online peers.
    pub fn online_users(&self) -> Vec<UserId> {
        self.presence.snapshot()
    }

    // --- Calls ---

    /// Places an outgoing call.
    pub fn initiate_call(
        &self,
        remote: UserId,
        call_type: CallType,
        is_group: bool,
    ) -> ClientResult<CallSnapshot> {
        self.calls.initiate_call(remote, call_type, is_group)
    }

    /// Answers the ringing incoming call.
    pub fn accept_call(&self) -> ClientResult<CallSnapshot> {
        self.calls.accept()
    }

    /// Declines the ringing incoming call.
    pub fn decline_call(&self) -> ClientResult<CallSnapshot> {
        self.calls.decline()
    }

    /// Hangs up the active call.
    pub fn end_call(&self) -> ClientResult<CallSnapshot> {
        self.calls.end()
    }

    /// Flips the microphone mute flag.
    pub fn toggle_mute(&self) -> CallSnapshot {
        self.calls.toggle_mute()
    }

    /// Flips the camera flag.
    pub fn toggle_video(&self) -> CallSnapshot {
        self.calls.toggle_video()
    }

    /// Flips the speakerphone flag.
    pub fn toggle_speaker(&self) -> CallSnapshot {
        self.calls.toggle_speaker()
    }

    /// Flips the call-UI minimized flag.
    pub fn toggle_minimized(&self) -> CallSnapshot {
        self.calls.toggle_minimized()
    }

    /// Snapshot of the current call session.
    pub fn call_snapshot(&self) -> CallSnapshot {
        self.calls.snapshot()
    }
}

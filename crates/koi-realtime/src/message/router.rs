//! Message router — the single consumer of the inbound frame stream.
//!
//! Every raw frame from the transport lands here exactly once, in
//! arrival order. The router parses it, applies it to local state (the
//! visible log, the presence tracker, the call machine) and publishes
//! the resulting event to the topic callbacks and the global bus.
//! Malformed frames are logged and dropped, never fatal.
//!
//! Outbound message publishing also lives here: sends are optimistic,
//! with a REST fallback when the live transport cannot carry the frame.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, trace, warn};

use koi_core::error::ClientError;
use koi_core::result::ClientResult;
use koi_core::types::{ConversationId, MessageId, UserId};

use crate::call::machine::CallMachine;
use crate::channel::registry::SubscriptionRegistry;
use crate::channel::topic;
use crate::connection::transport::{FrameDispatcher, FrameSender};
use crate::event::bus::{ClientEvent, EventBus};
use crate::presence::tracker::PresenceTracker;
use crate::rest::api::RestApi;

use super::log::MessageLog;
use super::types::{ChatMessage, InboundFrame, MessageBody, MessageStatus, OutboundFrame};
use super::typing::TypingNotifier;

/// Routes inbound frames and publishes outbound messages.
pub struct MessageRouter {
    identity: UserId,
    sender: FrameSender,
    registry: Arc<SubscriptionRegistry>,
    bus: Arc<EventBus>,
    presence: Arc<PresenceTracker>,
    calls: Arc<CallMachine>,
    rest: Arc<dyn RestApi>,
    log: MessageLog,
    typing: TypingNotifier,
}

impl std::fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRouter")
            .field("identity", &self.identity)
            .finish()
    }
}

impl MessageRouter {
    /// Creates a router for the local user.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        identity: UserId,
        sender: FrameSender,
        registry: Arc<SubscriptionRegistry>,
        bus: Arc<EventBus>,
        presence: Arc<PresenceTracker>,
        calls: Arc<CallMachine>,
        rest: Arc<dyn RestApi>,
        log: MessageLog,
        typing: TypingNotifier,
    ) -> Self {
        Self {
            identity,
            sender,
            registry,
            bus,
            presence,
            calls,
            rest,
            log,
            typing,
        }
    }

    /// Sends a chat message, optimistically.
    ///
    /// The message appears in the visible log with status `Sending`
    /// before any network traffic; the backend echo later replaces it by
    /// `id`. If the live transport cannot carry the frame the message
    /// goes through the REST fallback instead; only when both paths fail
    /// is the local copy marked `Failed` and an error returned.
    pub async fn send_message(
        &self,
        conversation_id: ConversationId,
        body: MessageBody,
    ) -> ClientResult<ChatMessage> {
        let message = ChatMessage {
            id: MessageId::new(),
            conversation_id,
            sender_id: self.identity,
            body,
            status: MessageStatus::Sending,
            created_at: Utc::now(),
        };

        self.log.merge(message.clone());
        self.publish_message(message.clone());

        match self.sender.send(&OutboundFrame::Message {
            message: message.clone(),
        }) {
            Ok(()) => {
                trace!(message_id = %message.id, "Message published on transport");
                Ok(message)
            }
            Err(transport_err) => {
                debug!(
                    message_id = %message.id,
                    error = %transport_err,
                    "Transport unavailable, falling back to REST"
                );
                match self.rest.create_message(&message).await {
                    Ok(mut persisted) => {
                        if persisted.status == MessageStatus::Sending {
                            persisted.status = MessageStatus::Sent;
                        }
                        self.log.merge(persisted.clone());
                        self.publish_message(persisted.clone());
                        Ok(persisted)
                    }
                    Err(rest_err) => {
                        warn!(
                            message_id = %message.id,
                            error = %rest_err,
                            "Message failed on transport and REST"
                        );
                        self.log
                            .set_status(conversation_id, message.id, MessageStatus::Failed);
                        self.bus.emit(ClientEvent::SendFailed {
                            conversation_id,
                            message_id: message.id,
                        });
                        Err(ClientError::send_failed(format!(
                            "message {} undeliverable: {rest_err}",
                            message.id
                        )))
                    }
                }
            }
        }
    }

    /// Sends a read receipt for one message.
    pub fn mark_read(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
    ) -> ClientResult<()> {
        self.sender.send(&OutboundFrame::Read {
            conversation_id,
            user_id: self.identity,
            message_id,
        })
    }

    /// Signals a local keystroke; the stop indicator is debounced.
    pub fn notify_typing(&self, conversation_id: ConversationId) {
        self.typing.keystroke(conversation_id);
    }

    /// The visible messages of a conversation, oldest first.
    pub fn visible_messages(&self, conversation_id: &ConversationId) -> Vec<ChatMessage> {
        self.log.visible(conversation_id)
    }

    /// Looks up one visible message.
    pub fn message(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
    ) -> Option<ChatMessage> {
        self.log.get(conversation_id, message_id)
    }

    /// Drops a conversation's visible log.
    pub fn clear_conversation(&self, conversation_id: &ConversationId) {
        self.log.clear(conversation_id);
    }

    /// Cancels all armed typing stop-timers. Called on disconnect.
    pub(crate) fn cancel_typing(&self) {
        self.typing.cancel_all();
    }

    fn publish_message(&self, message: ChatMessage) {
        let conversation_id = message.conversation_id;
        let event = ClientEvent::Message {
            conversation_id,
            message,
        };
        self.registry
            .dispatch(&topic::conversation_messages(&conversation_id), &event);
        self.bus.emit(event);
    }

    fn route(&self, topic: String, event: ClientEvent) {
        self.registry.dispatch(&topic, &event);
        self.bus.emit(event);
    }

    async fn apply(&self, frame: InboundFrame) {
        match frame {
            InboundFrame::Message { message } => {
                self.log.merge(message.clone());
                self.publish_message(message);
            }
            InboundFrame::Typing {
                conversation_id,
                user_id,
                is_typing,
            } => {
                // Our own indicator can be echoed back by the fan-out.
                if user_id == self.identity {
                    return;
                }
                self.route(
                    topic::conversation_typing(&conversation_id),
                    ClientEvent::Typing {
                        conversation_id,
                        user_id,
                        is_typing,
                    },
                );
            }
            InboundFrame::Read {
                conversation_id,
                user_id,
                message_id,
            } => {
                self.log
                    .set_status(conversation_id, message_id, MessageStatus::Read);
                self.route(
                    topic::conversation_read(&conversation_id),
                    ClientEvent::Read {
                        conversation_id,
                        user_id,
                        message_id,
                    },
                );
            }
            InboundFrame::Delete {
                conversation_id,
                message_id,
            } => {
                // Deletions keep a tombstone in the visible list.
                self.log
                    .set_status(conversation_id, message_id, MessageStatus::Deleted);
                self.route(
                    topic::conversation_deletions(&conversation_id),
                    ClientEvent::Delete {
                        conversation_id,
                        message_id,
                    },
                );
            }
            InboundFrame::Status {
                conversation_id,
                message_id,
                status,
            } => {
                self.log.set_status(conversation_id, message_id, status);
                self.route(
                    topic::conversation_messages(&conversation_id),
                    ClientEvent::MessageStatus {
                        conversation_id,
                        message_id,
                        status,
                    },
                );
            }
            InboundFrame::PresenceSnapshot { user_ids } => {
                self.presence.set_all(user_ids.clone());
                self.route(
                    topic::PRESENCE_GLOBAL.to_string(),
                    ClientEvent::PresenceSnapshot { online: user_ids },
                );
            }
            InboundFrame::PresenceOnline { user_id } => {
                // Only actual transitions are published.
                if self.presence.mark_online(user_id) {
                    self.route(
                        topic::PRESENCE_GLOBAL.to_string(),
                        ClientEvent::PresenceChanged {
                            user_id,
                            online: true,
                        },
                    );
                }
            }
            InboundFrame::PresenceOffline { user_id } => {
                if self.presence.mark_offline(user_id) {
                    self.route(
                        topic::PRESENCE_GLOBAL.to_string(),
                        ClientEvent::PresenceChanged {
                            user_id,
                            online: false,
                        },
                    );
                }
            }
            InboundFrame::CallSignal { signal } => {
                self.calls.handle_signal(signal).await;
            }
            InboundFrame::Pong { timestamp } => {
                trace!(timestamp, "Pong received");
            }
            InboundFrame::Error { code, message } => {
                warn!(code = %code, message = %message, "Server reported an error");
                self.bus.emit(ClientEvent::ServerError { code, message });
            }
        }
    }
}

#[async_trait]
impl FrameDispatcher for MessageRouter {
    async fn dispatch(&self, raw: &str) {
        match serde_json::from_str::<InboundFrame>(raw) {
            Ok(frame) => self.apply(frame).await,
            Err(e) => warn!(error = %e, "Dropping malformed inbound frame"),
        }
    }
}

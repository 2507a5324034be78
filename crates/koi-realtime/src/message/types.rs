//! Inbound and outbound frame type definitions.
//!
//! Frames are internally-tagged JSON. The shape is client-defined; any
//! backend protocol carrying the same information can be adapted to it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use koi_core::types::{ConversationId, MessageId, UserId};

use crate::call::signal::CallSignal;

/// Delivery status of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Composed locally, not yet confirmed by the backend.
    Sending,
    /// Accepted by the backend.
    Sent,
    /// Delivered to the recipient's device.
    Delivered,
    /// Read by the recipient.
    Read,
    /// Deleted; kept as a tombstone in the visible list.
    Deleted,
    /// Both the transport publish and the REST fallback failed.
    /// Client-local only; never sent on the wire.
    Failed,
}

/// Content of a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageBody {
    /// Plain text.
    Text {
        /// Message text.
        text: String,
    },
    /// An image attachment.
    Image {
        /// Download URL.
        url: String,
    },
    /// An arbitrary file attachment.
    File {
        /// Download URL.
        url: String,
        /// Original file name.
        name: String,
        /// File size in bytes.
        size_bytes: u64,
    },
}

/// A single chat message as held in the visible conversation log.
///
/// `id` is unique within a conversation; a later message with the same
/// `id` replaces the earlier one (idempotent merge).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique message ID.
    pub id: MessageId,
    /// Conversation this message belongs to.
    pub conversation_id: ConversationId,
    /// Author.
    pub sender_id: UserId,
    /// Message content.
    pub body: MessageBody,
    /// Delivery status.
    pub status: MessageStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Frames received from the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    /// A new or updated chat message.
    Message {
        /// The message payload.
        message: ChatMessage,
    },
    /// A peer started or stopped typing.
    Typing {
        /// Conversation.
        conversation_id: ConversationId,
        /// Typing peer.
        user_id: UserId,
        /// Whether the peer is currently typing.
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
    /// A message status changed (e.g. delivered).
    Status {
        /// Conversation.
        conversation_id: ConversationId,
        /// Affected message.
        message_id: MessageId,
        /// New status.
        status: MessageStatus,
    },
    /// Full presence snapshot, pushed right after connect.
    PresenceSnapshot {
        /// All currently-online user IDs.
        user_ids: Vec<UserId>,
    },
    /// A peer came online.
    PresenceOnline {
        /// The peer.
        user_id: UserId,
    },
    /// A peer went offline.
    PresenceOffline {
        /// The peer.
        user_id: UserId,
    },
    /// Call signaling event.
    CallSignal {
        /// The signal payload.
        signal: CallSignal,
    },
    /// Pong response to a client ping.
    Pong {
        /// Echoed timestamp.
        timestamp: i64,
    },
    /// Server-reported error.
    Error {
        /// Error code.
        code: String,
        /// Error description.
        message: String,
    },
}

/// Frames sent to the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// Open a topic.
    Subscribe {
        /// Topic name.
        topic: String,
    },
    /// Close a topic.
    Unsubscribe {
        /// Topic name.
        topic: String,
    },
    /// Publish a chat message.
    Message {
        /// The message payload.
        message: ChatMessage,
    },
    /// Typing indicator.
    Typing {
        /// Conversation.
        conversation_id: ConversationId,
        /// Local user.
        user_id: UserId,
        /// Whether the local user is typing.
        is_typing: bool,
    },
    /// Read receipt.
    Read {
        /// Conversation.
        conversation_id: ConversationId,
        /// Local user.
        user_id: UserId,
        /// Message that was read.
        message_id: MessageId,
    },
    /// Keepalive ping.
    Ping {
        /// Client timestamp.
        timestamp: i64,
    },
    /// Call signaling event.
    CallSignal {
        /// The signal payload.
        signal: CallSignal,
    },
}

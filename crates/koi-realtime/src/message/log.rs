//! Visible conversation log with idempotent merge.
//!
//! Messages are merged by `id`: a later message with the same `id`
//! replaces the earlier one in place. This is the reconciliation rule
//! for optimistic sends and the deduplication rule for inbound frames.

use dashmap::DashMap;

use koi_core::types::{ConversationId, MessageId};

use super::types::{ChatMessage, MessageStatus};

/// Per-conversation visible message lists.
#[derive(Debug)]
pub struct MessageLog {
    conversations: DashMap<ConversationId, Vec<ChatMessage>>,
    max_per_conversation: usize,
}

impl MessageLog {
    /// Creates a log retaining at most `max_per_conversation` messages
    /// per conversation.
    pub fn new(max_per_conversation: usize) -> Self {
        Self {
            conversations: DashMap::new(),
            max_per_conversation: max_per_conversation.max(1),
        }
    }

    /// Merges a message into its conversation's visible list.
    ///
    /// Replaces in place when the `id` is already present, otherwise
    /// appends, trimming the oldest entries past the retention cap.
    pub fn merge(&self, message: ChatMessage) {
        let mut list = self
            .conversations
            .entry(message.conversation_id)
            .or_default();

        match list.iter_mut().find(|m| m.id == message.id) {
            Some(existing) => *existing = message,
            None => {
                list.push(message);
                if list.len() > self.max_per_conversation {
                    let excess = list.len() - self.max_per_conversation;
                    list.drain(..excess);
                }
            }
        }
    }

    /// Updates the status of one message. Returns `false` if the message
    /// is not in the visible list.
    pub fn set_status(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
        status: MessageStatus,
    ) -> bool {
        match self.conversations.get_mut(&conversation_id) {
            Some(mut list) => match list.iter_mut().find(|m| m.id == message_id) {
                Some(message) => {
                    message.status = status;
                    true
                }
                None => false,
            },
            None => false,
        }
    }

    /// The visible messages of a conversation, oldest first.
    pub fn visible(&self, conversation_id: &ConversationId) -> Vec<ChatMessage> {
        self.conversations
            .get(conversation_id)
            .map(|list| list.clone())
            .unwrap_or_default()
    }

    /// Looks up one message by id.
    pub fn get(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
    ) -> Option<ChatMessage> {
        self.conversations
            .get(conversation_id)
            .and_then(|list| list.iter().find(|m| m.id == *message_id).cloned())
    }

    /// Drops a conversation's visible list entirely.
    pub fn clear(&self, conversation_id: &ConversationId) {
        self.conversations.remove(conversation_id);
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use koi_core::types::UserId;

    use crate::message::types::MessageBody;

    use super::*;

    fn text_message(conversation_id: ConversationId, text: &str) -> ChatMessage {
        ChatMessage {
            id: MessageId::new(),
            conversation_id,
            sender_id: UserId::new(),
            body: MessageBody::Text {
                text: text.to_string(),
            },
            status: MessageStatus::Sent,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn duplicate_id_replaces_instead_of_duplicating() {
        let log = MessageLog::new(100);
        let conversation = ConversationId::new();

        let mut message = text_message(conversation, "hello");
        message.status = MessageStatus::Sent;
        log.merge(message.clone());

        message.status = MessageStatus::Delivered;
        log.merge(message.clone());

        let visible = log.visible(&conversation);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].status, MessageStatus::Delivered);
    }

    #[test]
    fn merge_keeps_position_on_replace() {
        let log = MessageLog::new(100);
        let conversation = ConversationId::new();

        let first = text_message(conversation, "one");
        let second = text_message(conversation, "two");
        log.merge(first.clone());
        log.merge(second);

        let mut updated = first.clone();
        updated.status = MessageStatus::Read;
        log.merge(updated);

        let visible = log.visible(&conversation);
        assert_eq!(visible[0].id, first.id);
        assert_eq!(visible[0].status, MessageStatus::Read);
    }

    #[test]
    fn set_status_only_touches_known_messages() {
        let log = MessageLog::new(100);
        let conversation = ConversationId::new();
        let message = text_message(conversation, "hi");
        log.merge(message.clone());

        assert!(log.set_status(conversation, message.id, MessageStatus::Deleted));
        assert!(!log.set_status(conversation, MessageId::new(), MessageStatus::Read));
        assert_eq!(
            log.get(&conversation, &message.id).map(|m| m.status),
            Some(MessageStatus::Deleted)
        );
    }

    #[test]
    fn trims_oldest_past_the_cap() {
        let log = MessageLog::new(3);
        let conversation = ConversationId::new();

        for i in 0..5 {
            log.merge(text_message(conversation, &format!("m{i}")));
        }

        let visible = log.visible(&conversation);
        assert_eq!(visible.len(), 3);
        assert_eq!(
            visible[0].body,
            MessageBody::Text {
                text: "m2".to_string()
            }
        );
    }
}

//! Logical topic naming.
//!
//! One topic carries one category of event. The names are
//! protocol-agnostic strings; the backend maps them onto whatever its
//! channel primitive is.

use koi_core::types::ConversationId;

/// The global presence topic.
pub const PRESENCE_GLOBAL: &str = "presence:global";

/// Per-conversation message topic.
pub fn conversation_messages(id: &ConversationId) -> String {
    format!("conversation:{id}:messages")
}

/// Per-conversation typing topic.
pub fn conversation_typing(id: &ConversationId) -> String {
    format!("conversation:{id}:typing")
}

/// Per-conversation read-receipt topic.
pub fn conversation_read(id: &ConversationId) -> String {
    format!("conversation:{id}:read")
}

/// Per-conversation deletion topic.
pub fn conversation_deletions(id: &ConversationId) -> String {
    format!("conversation:{id}:deletions")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_topics_embed_the_id() {
        let id = ConversationId::new();
        assert_eq!(
            conversation_messages(&id),
            format!("conversation:{id}:messages")
        );
        assert!(conversation_typing(&id).ends_with(":typing"));
        assert!(conversation_read(&id).ends_with(":read"));
        assert!(conversation_deletions(&id).ends_with(":deletions"));
    }
}

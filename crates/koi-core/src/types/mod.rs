//! Shared type definitions.

pub mod id;

pub use id::{CallId, ConversationId, MessageId, UserId};

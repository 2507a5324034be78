//! REST API trait.

use async_trait::async_trait;

use koi_core::result::ClientResult;
use koi_core::types::UserId;

use crate::message::types::ChatMessage;

/// The synchronous request/response channel to the backend.
///
/// Used only when the live transport cannot carry a message (send
/// fallback) and for the presence snapshot bootstrap after connect.
#[async_trait]
pub trait RestApi: Send + Sync {
    /// Persists a message through the message-creation endpoint.
    ///
    /// Returns the persisted message as the backend recorded it; its `id`
    /// matches the optimistic copy so the echo merges instead of
    /// duplicating.
    async fn create_message(&self, message: &ChatMessage) -> ClientResult<ChatMessage>;

    /// Fetches the IDs of all currently-online peers.
    async fn presence_snapshot(&self) -> ClientResult<Vec<UserId>>;
}

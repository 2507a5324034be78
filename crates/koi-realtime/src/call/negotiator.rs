//! Media negotiation collaborator seam.

use async_trait::async_trait;

use koi_core::types::CallId;

/// Turns `Connected`-state signaling payloads into actual audio/video
/// streams. The media pipeline itself lives outside this crate; the call
/// machine only forwards the opaque payload.
#[async_trait]
pub trait MediaNegotiator: Send + Sync {
    /// Handle a negotiation payload attached to an offer or accept signal.
    async fn handle_payload(&self, call_id: CallId, payload: serde_json::Value);
}

/// A negotiator that discards every payload. Useful for tests and for
/// signaling-only deployments.
#[derive(Debug, Default)]
pub struct NullNegotiator;

#[async_trait]
impl MediaNegotiator for NullNegotiator {
    async fn handle_payload(&self, _call_id: CallId, _payload: serde_json::Value) {}
}

//! Connection state machine types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of the persistent transport connection.
///
/// The retry counter is plain state next to this enum, not hidden in
/// timer closures, so the backoff policy is testable without a real
/// transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No transport; nothing scheduled.
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// The transport is live.
    Connected,
    /// The transport dropped; a reconnect is scheduled.
    Failing,
}

/// Snapshot of connection health for the embedding application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionStatus {
    /// Current lifecycle state.
    pub state: ConnectionState,
    /// Consecutive failed reconnect attempts. Resets to 0 only on a
    /// successful `Connected` transition.
    pub retry_count: u32,
    /// Most recent transport error, if any.
    pub last_error: Option<String>,
    /// When the last heartbeat check passed.
    pub last_heartbeat_at: Option<DateTime<Utc>>,
}

//! Real-time transport configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Real-time transport and routing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Base reconnect backoff delay in milliseconds.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Maximum reconnect backoff delay in milliseconds.
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    /// Maximum consecutive reconnect attempts before giving up.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Heartbeat check interval in seconds.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_seconds: u64,
    /// Outbound frame buffer size.
    #[serde(default = "default_send_buffer")]
    pub send_buffer_size: usize,
    /// Event bus broadcast buffer size.
    #[serde(default = "default_event_buffer")]
    pub event_buffer_size: usize,
    /// Typing debounce window in seconds.
    #[serde(default = "default_typing_debounce")]
    pub typing_debounce_seconds: u64,
    /// Maximum visible messages retained per conversation.
    #[serde(default = "default_max_messages")]
    pub max_messages_per_conversation: usize,
}

impl RealtimeConfig {
    /// Base backoff delay as a [`Duration`].
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    /// Maximum backoff delay as a [`Duration`].
    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    /// Heartbeat interval as a [`Duration`].
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }

    /// Typing debounce window as a [`Duration`].
    pub fn typing_debounce(&self) -> Duration {
        Duration::from_secs(self.typing_debounce_seconds)
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            heartbeat_interval_seconds: default_heartbeat_interval(),
            send_buffer_size: default_send_buffer(),
            event_buffer_size: default_event_buffer(),
            typing_debounce_seconds: default_typing_debounce(),
            max_messages_per_conversation: default_max_messages(),
        }
    }
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_send_buffer() -> usize {
    256
}

fn default_event_buffer() -> usize {
    256
}

fn default_typing_debounce() -> u64 {
    3
}

fn default_max_messages() -> usize {
    200
}

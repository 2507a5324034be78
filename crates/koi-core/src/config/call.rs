//! Call session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Call session state machine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallConfig {
    /// Ring window for an unanswered incoming call, in seconds.
    #[serde(default = "default_ring_timeout")]
    pub ring_timeout_seconds: u64,
    /// Delay between `Ended` and the automatic reset to `Idle`, in
    /// milliseconds. Allows the UI to observe the terminal state.
    #[serde(default = "default_teardown_delay_ms")]
    pub teardown_delay_ms: u64,
}

impl CallConfig {
    /// Ring window as a [`Duration`].
    pub fn ring_timeout(&self) -> Duration {
        Duration::from_secs(self.ring_timeout_seconds)
    }

    /// Teardown delay as a [`Duration`].
    pub fn teardown_delay(&self) -> Duration {
        Duration::from_millis(self.teardown_delay_ms)
    }
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            ring_timeout_seconds: default_ring_timeout(),
            teardown_delay_ms: default_teardown_delay_ms(),
        }
    }
}

fn default_ring_timeout() -> u64 {
    15
}

fn default_teardown_delay_ms() -> u64 {
    1_000
}

//! Connection lifecycle: transport seam, backoff policy, manager, heartbeat.

pub mod backoff;
pub mod heartbeat;
pub mod manager;
pub mod state;
pub mod transport;

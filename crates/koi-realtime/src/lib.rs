//! # koi-realtime
//!
//! Real-time client engine for the Koi social client. Provides:
//!
//! - Persistent WebSocket connection with heartbeat monitoring and
//!   capped exponential-backoff reconnection
//! - Topic subscription registry with deduplicated channels and
//!   post-reconnect replay
//! - Message routing with optimistic send and REST fallback
//! - User presence tracking (online/offline)
//! - Voice/video call session state machine
//!
//! All state is process-local and single-writer: inbound frames are
//! dispatched one at a time in arrival order, and every timer is owned
//! by exactly one component and cancelled on the relevant state exit.

pub mod call;
pub mod channel;
pub mod client;
pub mod connection;
pub mod event;
pub mod message;
pub mod presence;
pub mod rest;

pub use call::machine::CallMachine;
pub use channel::registry::SubscriptionRegistry;
pub use client::RealtimeClient;
pub use connection::manager::ConnectionManager;
pub use event::bus::EventBus;
pub use message::router::MessageRouter;
pub use presence::tracker::PresenceTracker;

//! Typed client events and the global event bus.

pub mod bus;

pub use bus::{ClientEvent, EventBus, EventKind, ListenerHandle};

//! Message types, routing, and the visible conversation log.

pub mod log;
pub mod router;
pub mod types;
pub mod typing;

//! Call session state machine and signaling types.

pub mod machine;
pub mod negotiator;
pub mod session;
pub mod signal;

//! User presence tracking.

pub mod tracker;

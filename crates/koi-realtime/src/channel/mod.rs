//! Topic naming and the subscription registry.

pub mod registry;
pub mod subscription;
pub mod topic;

//! # koi-core
//!
//! Core crate for the Koi social client. Contains configuration schemas,
//! typed identifiers, the unified error system, and the logging bootstrap.
//!
//! This crate has **no** internal dependencies on other Koi crates.

pub mod config;
pub mod error;
pub mod logging;
pub mod result;
pub mod types;

pub use error::ClientError;
pub use result::ClientResult;

//! Convenience result type alias for Koi.

use crate::error::ClientError;

/// A specialized `Result` type for Koi client operations.
///
/// Defined as a convenience so that every crate does not need to write
/// `Result<T, ClientError>` explicitly.
pub type ClientResult<T> = Result<T, ClientError>;

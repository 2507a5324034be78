//! Client configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section.

pub mod call;
pub mod logging;
pub mod realtime;
pub mod rest;

use serde::{Deserialize, Serialize};

use self::call::CallConfig;
use self::logging::LoggingConfig;
use self::realtime::RealtimeConfig;
use self::rest::RestConfig;

use crate::error::ClientError;

/// Root client configuration.
///
/// This struct is the top-level deserialization target for the merged
/// TOML configuration files (default.toml + environment overlay).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Real-time transport settings.
    #[serde(default)]
    pub realtime: RealtimeConfig,
    /// Call session settings.
    #[serde(default)]
    pub call: CallConfig,
    /// REST backend settings.
    #[serde(default)]
    pub rest: RestConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ClientConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges the default configuration with an environment-specific overlay
    /// and environment variables prefixed with `KOI__`.
    pub fn load(env: &str) -> Result<Self, ClientError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("KOI")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ClientError::configuration(format!("Failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| ClientError::configuration(format!("Failed to deserialize config: {e}")))
    }
}

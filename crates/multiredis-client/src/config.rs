use multiredis_common::{FanoutError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default per-child command timeout in milliseconds.
pub const DEFAULT_CHILD_TIMEOUT_MS: i64 = 10_000;

/// Options handed through to the backend connections this client creates.
///
/// Only used on the endpoint-descriptor construction path.
///
/// # Fields
///
/// - `enable_offline_queue`: Whether a child buffers commands issued while it
///   is disconnected. The fan-out client always forces this off so stale
///   commands are never replayed after an asymmetric reconnect.
/// - `extra`: Any other backend-specific options, passed through untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionOptions {
    pub enable_offline_queue: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Fan-out client configuration.
///
/// # Default Configuration
///
/// - `child_timeout_ms`: 10000 (10 seconds)
/// - `merge_duplicate_endpoints`: true
/// - `force_parallel`: false
///
/// # Example
///
/// ```rust
/// use multiredis_client::FanoutConfig;
///
/// let config = FanoutConfig {
///     child_timeout_ms: 250,
///     force_parallel: true,
///     ..Default::default()
/// };
/// assert_eq!(config.child_timeout().as_millis(), 250);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FanoutConfig {
    /// Per-child command timeout in milliseconds
    ///
    /// Zero or negative values fall back to the 10 second default.
    pub child_timeout_ms: i64,
    /// Drop endpoint descriptors repeating an earlier `(host, port)` pair
    pub merge_duplicate_endpoints: bool,
    /// Issue every command to all children at once
    ///
    /// Reads still resolve on the first non-empty reply.
    pub force_parallel: bool,
    /// Options passed to connections created from endpoint descriptors
    pub connection: ConnectionOptions,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            child_timeout_ms: DEFAULT_CHILD_TIMEOUT_MS,
            merge_duplicate_endpoints: true,
            force_parallel: false,
            connection: ConnectionOptions::default(),
        }
    }
}

impl FanoutConfig {
    /// Parses a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(FanoutError::from)
    }

    /// Effective per-child timeout, with non-positive values clamped to the default.
    pub fn child_timeout(&self) -> Duration {
        let ms = if self.child_timeout_ms > 0 {
            self.child_timeout_ms
        } else {
            DEFAULT_CHILD_TIMEOUT_MS
        };
        Duration::from_millis(ms as u64)
    }

    /// Connection options with the offline queue forced off.
    pub fn child_connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            enable_offline_queue: false,
            ..self.connection.clone()
        }
    }
}

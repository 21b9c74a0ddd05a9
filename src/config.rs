//! Connection configuration.
//!
//! Defaults suit most brokers. Values can be set through
//! [`ConnectionBuilder`](crate::ConnectionBuilder) or loaded from JSON:
//!
//! ```
//! use stompwire::ClientConfig;
//!
//! let config = ClientConfig::from_json(r#"{ "subscription_capacity": 16 }"#).unwrap();
//! assert_eq!(config.subscription_capacity, 16);
//! assert_eq!(config.catch_all_capacity, stompwire::config::DEFAULT_CATCH_ALL_CAPACITY);
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::error::Result;

/// Default capacity of each subscription delivery queue.
pub const DEFAULT_SUBSCRIPTION_CAPACITY: usize = 100;

/// Default capacity of the connection-wide catch-all queue.
pub const DEFAULT_CATCH_ALL_CAPACITY: usize = 100;

/// Default writer channel capacity.
pub const DEFAULT_WRITER_CAPACITY: usize = 1024;

/// Default time Disconnect waits for a requested receipt.
pub const DEFAULT_DISCONNECT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default multiplier applied to the negotiated receive heartbeat interval
/// before a heartbeat counts as missed.
pub const DEFAULT_HEARTBEAT_TOLERANCE: f64 = 2.0;

/// Default transport read chunk size.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub subscription_capacity: usize,
    pub catch_all_capacity: usize,
    pub writer_capacity: usize,
    #[serde(with = "millis")]
    pub disconnect_receipt_timeout: Duration,
    pub heartbeat_tolerance: f64,
    pub read_buffer_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            subscription_capacity: DEFAULT_SUBSCRIPTION_CAPACITY,
            catch_all_capacity: DEFAULT_CATCH_ALL_CAPACITY,
            writer_capacity: DEFAULT_WRITER_CAPACITY,
            disconnect_receipt_timeout: DEFAULT_DISCONNECT_RECEIPT_TIMEOUT,
            heartbeat_tolerance: DEFAULT_HEARTBEAT_TOLERANCE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl ClientConfig {
    /// Parse a JSON document. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Durations are written as integer milliseconds.
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

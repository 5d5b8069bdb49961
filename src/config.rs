//! Connection configuration.
//!
//! [`ConnectionConfig`] collects everything negotiated or tuned per
//! connection. It can be built in code through the connector/server builders
//! or loaded from JSON (durations are given in milliseconds):
//!
//! ```
//! use rsocket_mux::ConnectionConfig;
//!
//! let config = ConnectionConfig::from_json_str(r#"{
//!     "keep_alive": { "interval_ms": 100, "max_lifetime_ms": 1000 },
//!     "data_mime_type": "application/json",
//!     "prefetch": { "request_size": 8, "request_on": 2 }
//! }"#).unwrap();
//!
//! assert_eq!(config.keep_alive.interval.as_millis(), 100);
//! assert_eq!(config.metadata_mime_type, "application/binary");
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RSocketError, Result};
use crate::protocol::{MAX_REQUEST_N, MIN_FRAGMENT_SIZE};
use crate::writer::WriterConfig;

/// Default mime type for both data and metadata.
pub const DEFAULT_MIME_TYPE: &str = "application/binary";

/// Default upper bound on a reassembled payload.
pub const DEFAULT_MAX_REASSEMBLY_SIZE: usize = 16 * 1024 * 1024;

/// Keepalive timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeepAlive {
    /// Interval between KEEPALIVE frames sent by the client.
    #[serde(rename = "interval_ms", with = "duration_ms")]
    pub interval: Duration,
    /// Time without any keepalive after which the connection is failed.
    #[serde(rename = "max_lifetime_ms", with = "duration_ms")]
    pub max_lifetime: Duration,
}

impl KeepAlive {
    /// Create keepalive timing.
    pub fn new(interval: Duration, max_lifetime: Duration) -> Self {
        Self {
            interval,
            max_lifetime,
        }
    }

    /// Interval in wire representation (milliseconds, clamped to 31 bits).
    pub(crate) fn interval_millis(&self) -> u32 {
        millis_u31(self.interval)
    }

    /// Max lifetime in wire representation.
    pub(crate) fn max_lifetime_millis(&self) -> u32 {
        millis_u31(self.max_lifetime)
    }
}

impl Default for KeepAlive {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(20),
            max_lifetime: Duration::from_secs(90),
        }
    }
}

fn millis_u31(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis())
        .unwrap_or(u32::MAX)
        .min(MAX_REQUEST_N)
}

/// Requester-side replenishment policy for streamed responses.
///
/// The initial request asks for `request_size` items. Whenever the credit
/// still outstanding at the responder drops to `request_on`, a REQUEST_N tops
/// it back up to `request_size`. The local buffer therefore never holds more
/// than `request_size` undelivered items.
///
/// `request_size = 1, request_on = 0` requests one item at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefetchStrategy {
    pub request_size: u32,
    pub request_on: u32,
}

impl PrefetchStrategy {
    /// Create a strategy.
    pub fn new(request_size: u32, request_on: u32) -> Self {
        Self {
            request_size,
            request_on,
        }
    }

    /// One item at a time.
    pub fn one_by_one() -> Self {
        Self::new(1, 0)
    }

    /// Credit to request next, given how many requested items are still
    /// outstanding. `None` while above the threshold.
    pub fn replenish(&self, outstanding: u32) -> Option<u32> {
        if outstanding <= self.request_on && outstanding < self.request_size {
            Some(self.request_size - outstanding)
        } else {
            None
        }
    }
}

impl Default for PrefetchStrategy {
    fn default() -> Self {
        Self::new(64, 16)
    }
}

/// Per-connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Keepalive interval and max lifetime.
    pub keep_alive: KeepAlive,
    /// Mime type of payload metadata.
    pub metadata_mime_type: String,
    /// Mime type of payload data.
    pub data_mime_type: String,
    /// Request (client) or require (server) lease semantics.
    pub honor_lease: bool,
    /// Maximum frame size before payloads are fragmented; 0 disables.
    pub max_fragment_size: usize,
    /// Maximum size of a reassembled inbound payload.
    pub max_reassembly_size: usize,
    /// Stream prefetch policy for requesters.
    pub prefetch: PrefetchStrategy,
    /// Writer task tuning.
    pub writer: WriterConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            keep_alive: KeepAlive::default(),
            metadata_mime_type: DEFAULT_MIME_TYPE.to_string(),
            data_mime_type: DEFAULT_MIME_TYPE.to_string(),
            honor_lease: false,
            max_fragment_size: 0,
            max_reassembly_size: DEFAULT_MAX_REASSEMBLY_SIZE,
            prefetch: PrefetchStrategy::default(),
            writer: WriterConfig::default(),
        }
    }
}

impl ConnectionConfig {
    /// Parse and validate a JSON document. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: ConnectionConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.keep_alive.interval.is_zero() {
            return Err(RSocketError::Config(
                "keepalive interval must be non-zero".to_string(),
            ));
        }
        if self.keep_alive.max_lifetime.is_zero() {
            return Err(RSocketError::Config(
                "keepalive max lifetime must be non-zero".to_string(),
            ));
        }
        if self.max_fragment_size != 0 && self.max_fragment_size < MIN_FRAGMENT_SIZE {
            return Err(RSocketError::Config(format!(
                "max_fragment_size must be 0 or at least {MIN_FRAGMENT_SIZE}, got {}",
                self.max_fragment_size
            )));
        }
        if self.prefetch.request_size == 0 {
            return Err(RSocketError::Config(
                "prefetch request_size must be positive".to_string(),
            ));
        }
        if self.prefetch.request_on >= self.prefetch.request_size {
            return Err(RSocketError::Config(format!(
                "prefetch request_on ({}) must be below request_size ({})",
                self.prefetch.request_on, self.prefetch.request_size
            )));
        }
        if !self.metadata_mime_type.is_ascii() || !self.data_mime_type.is_ascii() {
            return Err(RSocketError::Config("mime types must be ASCII".to_string()));
        }
        if self.metadata_mime_type.len() > 255 || self.data_mime_type.len() > 255 {
            return Err(RSocketError::Config(
                "mime types must be at most 255 bytes".to_string(),
            ));
        }
        Ok(())
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

//! Event hub configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use postpulse_core::policy::ReconnectConfig;

/// Configuration for the upstream SSE connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// SSE endpoint, e.g. "https://stream.upfluence.co/stream"
    pub server_url: String,
    /// Connection failures tolerated over the hub lifetime
    #[serde(default = "default_max_reconnection_attempts")]
    pub max_reconnection_attempts: u32,
    /// Reset the failure count after a connection stays up this long (unset = never reset)
    #[serde(default)]
    pub reset_attempts_after_ms: Option<u64>,
    /// Per-subscriber delivery buffer; a full buffer drops events for that subscriber
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
    /// TCP/TLS connect timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Longest accepted line; longer lines fail the stream
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
}

fn default_max_reconnection_attempts() -> u32 { 5 }
fn default_subscriber_buffer() -> usize { 16 }
fn default_connect_timeout_ms() -> u64 { 10_000 }
fn default_max_line_bytes() -> usize { 64 * 1024 }

impl HubConfig {
    /// Config with defaults for everything but the URL.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            max_reconnection_attempts: default_max_reconnection_attempts(),
            reset_attempts_after_ms: None,
            subscriber_buffer: default_subscriber_buffer(),
            connect_timeout_ms: default_connect_timeout_ms(),
            max_line_bytes: default_max_line_bytes(),
        }
    }

    pub fn with_max_reconnection_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnection_attempts = attempts;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Reconnect policy settings derived from this config.
    pub fn reconnect(&self) -> ReconnectConfig {
        ReconnectConfig {
            max_attempts: self.max_reconnection_attempts,
            reset_after: self.reset_attempts_after_ms.map(Duration::from_millis),
            ..ReconnectConfig::default()
        }
    }
}

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::codec::DEFAULT_MAX_MESSAGE;

/// Default bound on every blocking wait of a session.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default readiness poll granularity.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default send buffer size: 1 MiB.
pub const DEFAULT_BUFFER_SIZE: usize = 1 << 20;

/// Delivery guarantee of outbound messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reliability {
    /// Every message waits for a 2-byte acknowledgment before the send
    /// buffer is reused.
    #[default]
    Confirmed,
    /// Fire-and-forget. Lossy if the receiver falls behind on large transfers.
    BestEffort,
}

/// Configuration for a [`TransportSession`](crate::session::TransportSession).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Bound on every blocking wait.
    pub wait_timeout: Duration,
    /// Readiness poll granularity.
    pub poll_interval: Duration,
    /// Send buffer size; also the largest message this side produces.
    pub buffer_size: usize,
    /// Largest inbound message accepted.
    pub max_message_size: usize,
    pub reliability: Reliability,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_message_size: DEFAULT_MAX_MESSAGE,
            reliability: Reliability::default(),
        }
    }
}

impl SessionConfig {
    /// Override the wait bound, in whole seconds.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.wait_timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_reliability(mut self, reliability: Reliability) -> Self {
        self.reliability = reliability;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_session_level_bounds() {
        let config = SessionConfig::default();
        assert_eq!(config.wait_timeout, Duration::from_secs(120));
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.buffer_size, 1 << 20);
        assert_eq!(config.reliability, Reliability::Confirmed);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"reliability":"best_effort","buffer_size":4096}"#).unwrap();
        assert_eq!(config.reliability, Reliability::BestEffort);
        assert_eq!(config.buffer_size, 4096);
        assert_eq!(config.wait_timeout, DEFAULT_WAIT_TIMEOUT);
    }

    #[test]
    fn builder_overrides() {
        let config = SessionConfig::default()
            .with_timeout_secs(30)
            .with_reliability(Reliability::BestEffort)
            .with_buffer_size(64);
        assert_eq!(config.wait_timeout, Duration::from_secs(30));
        assert_eq!(config.reliability, Reliability::BestEffort);
        assert_eq!(config.buffer_size, 64);
    }
}

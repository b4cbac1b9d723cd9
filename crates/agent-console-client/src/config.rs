//! Connection tuning knobs.

use std::time::Duration;

/// Timing parameters for the connection lifecycle.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Delay between reconnect attempts.
    pub reconnect_delay: Duration,
    /// Consecutive failed attempts tolerated before the link gives up.
    pub max_reconnect_attempts: u32,
    /// Interval between heartbeat pings while live.
    pub heartbeat_interval: Duration,
    /// How long a fresh connection may wait for its first liveness
    /// acknowledgment before being dropped and retried.
    pub handshake_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(2),
            max_reconnect_attempts: 10,
            heartbeat_interval: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    /// Build a config from the environment, falling back to defaults.
    ///
    /// Recognized variables: `AGENT_CONSOLE_RECONNECT_DELAY_MS`,
    /// `AGENT_CONSOLE_MAX_RECONNECT_ATTEMPTS`,
    /// `AGENT_CONSOLE_HEARTBEAT_INTERVAL_SECS` and
    /// `AGENT_CONSOLE_HANDSHAKE_TIMEOUT_SECS`. Unparseable values are
    /// logged and ignored.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(ms) = env_u64("AGENT_CONSOLE_RECONNECT_DELAY_MS") {
            config.reconnect_delay = Duration::from_millis(ms);
        }
        if let Some(count) = env_u64("AGENT_CONSOLE_MAX_RECONNECT_ATTEMPTS") {
            config.max_reconnect_attempts = u32::try_from(count).unwrap_or(u32::MAX);
        }
        if let Some(secs) = env_u64("AGENT_CONSOLE_HEARTBEAT_INTERVAL_SECS") {
            config.heartbeat_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("AGENT_CONSOLE_HANDSHAKE_TIMEOUT_SECS") {
            config.handshake_timeout = Duration::from_secs(secs);
        }
        config
    }
}

fn env_u64(name: &str) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(%name, %raw, "Ignoring unparseable override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_expectations() {
        let config = ClientConfig::default();
        assert_eq!(config.reconnect_delay, Duration::from_secs(2));
        assert_eq!(config.max_reconnect_attempts, 10);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.handshake_timeout, Duration::from_secs(10));
    }
}

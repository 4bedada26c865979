//! Session tunables.

use std::time::Duration;

use tracing::warn;

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_RECONNECT_BASE_DELAY: Duration = Duration::from_millis(1_000);
pub const DEFAULT_RECONNECT_MAX_DELAY: Duration = Duration::from_millis(30_000);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_REJOIN_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_SESSION_MAX_AGE: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_MAX_CLOCK_SKEW: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_ORIGIN: &str = "pairlink";

#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Relay used when a pairing code carries none, and by the dApp when
    /// creating sessions.
    pub relay_address: String,
    pub heartbeat_interval: Duration,
    pub max_reconnect_attempts: u32,
    pub reconnect_base_delay: Duration,
    pub reconnect_max_delay: Duration,
    pub connect_timeout: Duration,
    /// How long a reconnected link waits for the peer's SESSION_ACK before
    /// it counts as another failed attempt.
    pub rejoin_timeout: Duration,
    /// A persisted session idle for longer than this is not restored.
    pub session_max_age: Duration,
    /// Envelopes stamped further than this from local time are dropped.
    pub max_clock_skew: Duration,
    /// Sent as `origin` on dApp requests.
    pub origin: String,
}

impl SessionConfig {
    pub fn new(relay_address: impl Into<String>) -> Self {
        Self {
            relay_address: relay_address.into(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_base_delay: DEFAULT_RECONNECT_BASE_DELAY,
            reconnect_max_delay: DEFAULT_RECONNECT_MAX_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            rejoin_timeout: DEFAULT_REJOIN_TIMEOUT,
            session_max_age: DEFAULT_SESSION_MAX_AGE,
            max_clock_skew: DEFAULT_MAX_CLOCK_SKEW,
            origin: DEFAULT_ORIGIN.to_string(),
        }
    }

    /// Defaults overridden by `PAIRLINK_RELAY_URL`, `PAIRLINK_HEARTBEAT_SECS`
    /// and `PAIRLINK_MAX_RECONNECTS`. Unparseable values are ignored.
    pub fn from_env(default_relay: &str) -> Self {
        let relay =
            std::env::var("PAIRLINK_RELAY_URL").unwrap_or_else(|_| default_relay.to_string());
        let mut config = Self::new(relay);
        if let Some(secs) = env_number("PAIRLINK_HEARTBEAT_SECS") {
            config.heartbeat_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(attempts) = env_number("PAIRLINK_MAX_RECONNECTS") {
            config.max_reconnect_attempts = u32::try_from(attempts).unwrap_or(u32::MAX);
        }
        config
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub(crate) fn session_max_age_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.session_max_age).unwrap_or_else(|_| chrono::Duration::weeks(52))
    }
}

fn env_number(name: &str) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var = name, value = %raw, "ignoring non-numeric setting");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SessionConfig::new("wss://relay.example");
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.reconnect_base_delay, Duration::from_millis(1_000));
        assert_eq!(config.reconnect_max_delay, Duration::from_millis(30_000));
        assert_eq!(config.rejoin_timeout, Duration::from_secs(30));
        assert_eq!(config.session_max_age_chrono(), chrono::Duration::minutes(10));
    }
}

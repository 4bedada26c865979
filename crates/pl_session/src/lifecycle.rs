//! Session lifecycle state machine.
//!
//! Pure bookkeeping: the driver task feeds it transport events and asks it
//! what to do next. No I/O happens here.
//!
//! ```text
//! Idle -> Connecting -> Joined -> Active
//!                         ^         |
//!                         |    transport lost
//!                         |         v
//!                    Reconnecting <- Disconnected
//!                         |
//!                 attempts > max -> Terminated
//! ```
//!
//! The attempt counter only resets when the session reaches Active again,
//! so a link that keeps dropping right after opening still runs out.

use std::time::Duration;

use serde::Serialize;

use crate::config::SessionConfig;
use crate::error::SessionError;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Connecting,
    /// Transport open, hello sent, waiting for SESSION_ACK.
    Joined,
    Active,
    Disconnected,
    Reconnecting,
    Terminated,
}

#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl From<&SessionConfig> for ReconnectPolicy {
    fn from(config: &SessionConfig) -> Self {
        Self {
            max_attempts: config.max_reconnect_attempts,
            base_delay: config.reconnect_base_delay,
            max_delay: config.reconnect_max_delay,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    Retry { attempt: u32, delay: Duration },
    GiveUp,
}

/// `min(base * 2^attempt, max)`.
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    2u32.checked_pow(attempt)
        .and_then(|factor| base.checked_mul(factor))
        .map_or(max, |delay| delay.min(max))
}

#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: SessionState,
    attempts: u32,
    policy: ReconnectPolicy,
}

impl Lifecycle {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: SessionState::Idle,
            attempts: 0,
            policy,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Joined on a reconnected link and still waiting for the peer's ACK.
    /// The first join after pairing is not bounded: the peer may not have
    /// scanned the code yet.
    pub fn awaiting_rejoin(&self) -> bool {
        self.state == SessionState::Joined && self.attempts > 0
    }

    pub fn begin_connect(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Idle => {
                self.state = SessionState::Connecting;
                Ok(())
            }
            other => Err(SessionError::Protocol(format!(
                "cannot connect from state {other:?}"
            ))),
        }
    }

    pub fn transport_opened(&mut self) {
        if matches!(
            self.state,
            SessionState::Connecting | SessionState::Reconnecting
        ) {
            self.state = SessionState::Joined;
        }
    }

    /// Returns true when this ACK completed the handshake.
    pub fn ack_received(&mut self) -> bool {
        if self.state == SessionState::Joined {
            self.state = SessionState::Active;
            self.attempts = 0;
            true
        } else {
            false
        }
    }

    pub fn transport_lost(&mut self) {
        if matches!(
            self.state,
            SessionState::Connecting | SessionState::Joined | SessionState::Active
        ) {
            self.state = SessionState::Disconnected;
        }
    }

    /// Called after a loss and after every failed attempt.
    pub fn next_attempt(&mut self) -> NextStep {
        if self.state == SessionState::Terminated {
            return NextStep::GiveUp;
        }
        self.attempts += 1;
        if self.attempts > self.policy.max_attempts {
            self.state = SessionState::Terminated;
            return NextStep::GiveUp;
        }
        self.state = SessionState::Reconnecting;
        NextStep::Retry {
            attempt: self.attempts,
            delay: backoff_delay(
                self.attempts,
                self.policy.base_delay,
                self.policy.max_delay,
            ),
        }
    }

    pub fn terminate(&mut self) {
        self.state = SessionState::Terminated;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lifecycle() -> Lifecycle {
        Lifecycle::new(ReconnectPolicy::from(&SessionConfig::new("wss://r")))
    }

    fn active() -> Lifecycle {
        let mut lc = lifecycle();
        lc.begin_connect().unwrap();
        lc.transport_opened();
        assert!(lc.ack_received());
        lc
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_millis(1_000);
        let max = Duration::from_millis(30_000);
        let delays: Vec<u64> = (0..7)
            .map(|n| backoff_delay(n, base, max).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 16_000, 30_000, 30_000]);
        assert_eq!(backoff_delay(64, base, max), max);
    }

    #[test]
    fn handshake_reaches_active() {
        let mut lc = lifecycle();
        assert_eq!(lc.state(), SessionState::Idle);
        lc.begin_connect().unwrap();
        assert_eq!(lc.state(), SessionState::Connecting);
        lc.transport_opened();
        assert_eq!(lc.state(), SessionState::Joined);
        assert!(lc.ack_received());
        assert!(lc.is_active());
        assert!(!lc.ack_received());
    }

    #[test]
    fn connect_twice_is_rejected() {
        let mut lc = active();
        assert!(matches!(lc.begin_connect(), Err(SessionError::Protocol(_))));
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let mut lc = active();
        lc.transport_lost();
        assert_eq!(lc.state(), SessionState::Disconnected);

        for expected in 1..=5 {
            match lc.next_attempt() {
                NextStep::Retry { attempt, .. } => assert_eq!(attempt, expected),
                NextStep::GiveUp => panic!("gave up early at {expected}"),
            }
            assert_eq!(lc.state(), SessionState::Reconnecting);
        }
        assert_eq!(lc.next_attempt(), NextStep::GiveUp);
        assert_eq!(lc.state(), SessionState::Terminated);
        assert_eq!(lc.next_attempt(), NextStep::GiveUp);
    }

    #[test]
    fn counter_resets_only_on_active() {
        let mut lc = active();
        lc.transport_lost();
        lc.next_attempt();
        lc.next_attempt();
        lc.transport_opened();
        assert_eq!(lc.state(), SessionState::Joined);

        // dropped again before the ACK: the count carries on
        lc.transport_lost();
        assert!(matches!(lc.next_attempt(), NextStep::Retry { attempt: 3, .. }));

        lc.transport_opened();
        assert!(lc.ack_received());
        assert_eq!(lc.attempts(), 0);
    }

    #[test]
    fn only_reconnected_links_wait_on_a_deadline() {
        let mut lc = lifecycle();
        lc.begin_connect().unwrap();
        lc.transport_opened();
        assert!(!lc.awaiting_rejoin());
        lc.ack_received();

        lc.transport_lost();
        lc.next_attempt();
        assert!(!lc.awaiting_rejoin());
        lc.transport_opened();
        assert!(lc.awaiting_rejoin());
        lc.ack_received();
        assert!(!lc.awaiting_rejoin());
    }
}

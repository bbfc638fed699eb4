//! Timing policy for a card session.

use std::time::Duration;

/// How refresh completion is awaited. Both ceilings always apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    /// Pause between poll commands.
    pub interval: Duration,
    /// Poll command ceiling; zero is treated as one.
    pub max_attempts: u32,
    /// Wall-clock ceiling measured from the first poll.
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            max_attempts: 120,
            timeout: Duration::from_secs(30),
        }
    }
}

impl PollPolicy {
    pub fn effective_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Configuration for a [`ProtocolSession`](super::ProtocolSession).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Deadline for one command/response exchange.
    pub command_timeout: Duration,
    /// Deadline for re-establishing the physical link.
    pub reconnect_timeout: Duration,
    pub poll: PollPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(2),
            reconnect_timeout: Duration::from_secs(5),
            poll: PollPolicy::default(),
        }
    }
}

//! Reconnection utilities with exponential backoff, used by the S2S peer
//! connector (§4.7) to redial a configured peer after a dropped or
//! refused connection.
//!
//! # Example
//!
//! ```rust
//! use pushd_core::reconnect::ReconnectState;
//! use std::time::Duration;
//!
//! let mut reconnect = ReconnectState::new(Duration::from_millis(100), Duration::from_secs(10));
//!
//! assert_eq!(reconnect.next_delay(), Duration::from_millis(100));
//! assert_eq!(reconnect.next_delay(), Duration::from_millis(200));
//! assert_eq!(reconnect.next_delay(), Duration::from_millis(400));
//!
//! reconnect.reset();
//! assert_eq!(reconnect.next_delay(), Duration::from_millis(100));
//! ```
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ReconnectState {
    base_interval: Duration,
    max_interval: Duration,
    attempt: u32,
    current_interval: Duration,
}

impl ReconnectState {
    #[must_use]
    pub const fn new(base_interval: Duration, max_interval: Duration) -> Self {
        Self {
            base_interval,
            max_interval,
            attempt: 0,
            current_interval: base_interval,
        }
    }

    /// Delay for the next reconnection attempt; doubles each call until
    /// capped at `max_interval`.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current_interval;

        self.attempt += 1;
        self.current_interval = self.base_interval * (1_u32 << self.attempt.min(10));
        if self.current_interval > self.max_interval {
            self.current_interval = self.max_interval;
        }

        delay
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
        self.current_interval = self.base_interval;
    }

    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    #[must_use]
    pub const fn current_interval(&self) -> Duration {
        self.current_interval
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectError {
    MaxAttemptsReached { attempts: u32 },
    ConnectionFailed { message: String },
    Cancelled,
}

impl std::fmt::Display for ReconnectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MaxAttemptsReached { attempts } => {
                write!(f, "maximum reconnection attempts reached: {attempts}")
            }
            Self::ConnectionFailed { message } => write!(f, "connection failed: {message}"),
            Self::Cancelled => write!(f, "reconnection cancelled"),
        }
    }
}

impl std::error::Error for ReconnectError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_doubles_until_capped() {
        let mut state = ReconnectState::new(Duration::from_millis(100), Duration::from_millis(500));

        assert_eq!(state.next_delay(), Duration::from_millis(100));
        assert_eq!(state.next_delay(), Duration::from_millis(200));
        assert_eq!(state.next_delay(), Duration::from_millis(400));
        assert_eq!(state.next_delay(), Duration::from_millis(500));
        assert_eq!(state.next_delay(), Duration::from_millis(500));
    }

    #[test]
    fn reset_returns_to_base_interval() {
        let mut state = ReconnectState::new(Duration::from_millis(100), Duration::from_secs(10));
        state.next_delay();
        state.next_delay();
        assert_eq!(state.attempt(), 2);

        state.reset();
        assert_eq!(state.attempt(), 0);
        assert_eq!(state.next_delay(), Duration::from_millis(100));
    }
}

use std::time::Duration;

use crate::{Error, Result};

/// Timing knobs of the daemon loops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerSettings {
    /// Interval between supervisor polls and status publications
    pub poll_interval: Duration,

    /// Interval between PING broadcasts; zero disables heartbeats
    pub ping_interval: Duration,

    /// Upper bound on waiting for the socket and poll loops at shutdown
    pub shutdown_timeout: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            ping_interval: Duration::from_secs(2),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl ServerSettings {
    /// # Errors
    ///
    /// Returns `Error::Config` if the poll interval is zero.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(Error::Config("poll interval must be positive".to_string()));
        }
        Ok(())
    }

    /// Number of poll ticks between heartbeats, `0` when heartbeats are disabled.
    #[must_use]
    pub fn ping_ticks(&self) -> u32 {
        if self.poll_interval.is_zero() || self.ping_interval.is_zero() {
            return 0;
        }
        let ticks = self.ping_interval.as_nanos() / self.poll_interval.as_nanos();
        u32::try_from(ticks).unwrap_or(u32::MAX)
    }

    /// Heartbeat interval advertised to subscribers, in milliseconds
    #[must_use]
    pub fn keepalive_ms(&self) -> u32 {
        u32::try_from(self.ping_interval.as_millis()).unwrap_or(u32::MAX)
    }
}

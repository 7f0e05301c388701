use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for one [`MarketStreamClient`](crate::MarketStreamClient) connection.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Protocol-level ping cadence.
    pub ping_interval_s: u64,

    /// Base reconnection delay - scaled linearly by the attempt number.
    pub reconnect_delay_s: u64,

    /// Hard budget of consecutive reconnection attempts before the client stays Closed.
    pub max_reconnect_attempts: u32,

    /// Per-frame read timeout; also the granularity at which the read loop observes shutdown.
    pub frame_timeout_s: u64,

    /// Consecutive frame errors tolerated before the connection is considered lost.
    pub consecutive_error_limit: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            ping_interval_s: 30,
            reconnect_delay_s: 5,
            max_reconnect_attempts: 5,
            frame_timeout_s: 1,
            consecutive_error_limit: 5,
        }
    }
}

impl ConnectionConfig {
    pub fn validate(&self) -> Result<(), crate::error::DataError> {
        if self.frame_timeout_s == 0 {
            return Err(crate::error::DataError::InvalidConfig(
                "frame_timeout_s must be non-zero".to_string(),
            ));
        }
        if self.consecutive_error_limit == 0 {
            return Err(crate::error::DataError::InvalidConfig(
                "consecutive_error_limit must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_s)
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_secs(self.frame_timeout_s)
    }

    /// Linear backoff: `reconnect_delay × attempt`.
    pub fn reconnect_backoff(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.reconnect_delay_s * attempt as u64)
    }

    pub fn attempts_exhausted(&self, attempt: u32) -> bool {
        attempt > self.max_reconnect_attempts
    }
}

//! Tunables of the discovery engine

use std::time::Duration;
use thiserror::Error;

/// Upper bound for `max_retries`; the last backoff is 2^32 seconds
pub const MAX_RETRIES_LIMIT: u32 = 32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("at least one port offset is required")]
    NoPortOffsets,
    #[error("max retries ({0}) exceeds the limit of {limit}", limit = MAX_RETRIES_LIMIT)]
    TooManyRetries(u32),
    #[error("revival scope ({scope:?}) is shorter than the revival interval ({interval:?})")]
    RevivalScope { scope: Duration, interval: Duration },
    #[error("revival countdown ({countdown:?}) must be shorter than the revival interval ({interval:?})")]
    RevivalCountdown {
        countdown: Duration,
        interval: Duration,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// How often servers with a known query port get their details refreshed
    pub refresh_interval: Duration,
    /// How often servers that lost their query port are re-probed
    pub revival_interval: Duration,
    /// How far back a server must have been seen alive to be revived
    pub revival_scope: Duration,
    /// Upper bound of the random delay before a revival probe
    pub revival_countdown: Duration,
    /// Offsets from the game port tried by the port prober
    pub port_offsets: Vec<u16>,
    pub probe_timeout: Duration,
    pub max_retries: u32,
    /// Number of concurrent probe workers
    pub concurrency: usize,
    /// How often the worker pool pulls targets off the queue
    pub poll_interval: Duration,
    /// Maximum number of queued targets, unbounded when `None`
    pub queue_capacity: Option<usize>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        let revival_interval = Duration::from_secs(600);
        Self {
            refresh_interval: Duration::from_secs(5),
            revival_interval,
            revival_scope: Duration::from_secs(3600),
            revival_countdown: revival_interval / 2,
            port_offsets: vec![1, 2, 3, 4],
            probe_timeout: Duration::from_secs(1),
            max_retries: 4,
            concurrency: 25,
            poll_interval: Duration::from_millis(100),
            queue_capacity: None,
        }
    }
}

impl DiscoveryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("refresh interval", self.refresh_interval),
            ("revival interval", self.revival_interval),
            ("probe timeout", self.probe_timeout),
            ("poll interval", self.poll_interval),
        ];
        for (name, duration) in durations {
            if duration.is_zero() {
                return Err(ConfigError::Zero(name));
            }
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Zero("concurrency"));
        }
        if self.queue_capacity == Some(0) {
            return Err(ConfigError::Zero("queue capacity"));
        }
        if self.port_offsets.is_empty() {
            return Err(ConfigError::NoPortOffsets);
        }
        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(ConfigError::TooManyRetries(self.max_retries));
        }
        if self.revival_scope < self.revival_interval {
            return Err(ConfigError::RevivalScope {
                scope: self.revival_scope,
                interval: self.revival_interval,
            });
        }
        if self.revival_countdown >= self.revival_interval {
            return Err(ConfigError::RevivalCountdown {
                countdown: self.revival_countdown,
                interval: self.revival_interval,
            });
        }
        Ok(())
    }
}

//! Queue configuration.
//!
//! All options have defaults and are resolved once, when the queue is built.
//! Durations are written in milliseconds in the serialized form.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Configuration Constants
// =============================================================================

/// Default sliding-window length for rate limiting.
pub const DEFAULT_SPEED_WINDOW: Duration = Duration::from_millis(100);

/// Default bound on the retained (in-flight) set.
pub const DEFAULT_MAX_RETAIN: usize = 10_000;

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("max_retain must be positive when retention is enabled")]
    ZeroMaxRetain,

    #[error("speed_limit.window_ms must be positive when speed limiting is enabled")]
    ZeroWindow,

    #[error("time_limit_ms must be positive")]
    ZeroTimeLimit,

    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Speed Limit
// =============================================================================

/// Sliding-window rate limits for put and get.
///
/// At most `max_puts` puts (resp. `max_gets` gets) are admitted within any
/// `window`. A limit of 0 disables that side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedLimit {
    pub enabled: bool,

    #[serde(rename = "window_ms", with = "millis")]
    pub window: Duration,

    pub max_puts: usize,

    pub max_gets: usize,
}

impl SpeedLimit {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn new(window: Duration, max_puts: usize, max_gets: usize) -> Self {
        Self {
            enabled: true,
            window,
            max_puts,
            max_gets,
        }
    }

    /// Window to apply to puts, if puts are limited.
    pub fn put_window(&self) -> Option<Duration> {
        (self.enabled && self.max_puts > 0).then_some(self.window)
    }

    /// Window to apply to gets, if gets are limited.
    pub fn get_window(&self) -> Option<Duration> {
        (self.enabled && self.max_gets > 0).then_some(self.window)
    }
}

impl Default for SpeedLimit {
    fn default() -> Self {
        Self {
            enabled: false,
            window: DEFAULT_SPEED_WINDOW,
            max_puts: 0,
            max_gets: 0,
        }
    }
}

// =============================================================================
// Queue Configuration
// =============================================================================

/// Flat option set of a task queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Capacity of the queued set; 0 means unbounded.
    pub max_size: usize,

    pub speed_limit: SpeedLimit,

    /// Generate keys instead of requiring them from callers.
    pub auto_key: bool,

    /// Keep retrieved items until acknowledged.
    pub use_retain: bool,

    /// Record a per-task operation log.
    pub use_trace: bool,

    pub max_retain: usize,

    /// Re-queue a retained item after this long without acknowledgment.
    /// Zero disables retries.
    #[serde(rename = "retry_after_ms", with = "millis")]
    pub retry_after: Duration,

    /// Default time limit for every admitted task.
    #[serde(rename = "time_limit_ms", with = "opt_millis")]
    pub time_limit: Option<Duration>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: 0,
            speed_limit: SpeedLimit::default(),
            auto_key: true,
            use_retain: true,
            use_trace: true,
            max_retain: DEFAULT_MAX_RETAIN,
            retry_after: Duration::ZERO,
            time_limit: None,
        }
    }
}

impl QueueConfig {
    /// Parse and validate a JSON document. Missing fields take their defaults.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: QueueConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.use_retain && self.max_retain == 0 {
            return Err(ConfigError::ZeroMaxRetain);
        }
        if self.speed_limit.enabled && self.speed_limit.window.is_zero() {
            return Err(ConfigError::ZeroWindow);
        }
        if self.time_limit.is_some_and(|limit| limit.is_zero()) {
            return Err(ConfigError::ZeroTimeLimit);
        }
        Ok(())
    }

    /// Retry delay, or `None` when retries are disabled.
    pub fn retry_delay(&self) -> Option<Duration> {
        (!self.retry_after.is_zero()).then_some(self.retry_after)
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

mod opt_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(d).map(|ms| ms.map(Duration::from_millis))
    }
}

//! Outbox dispatcher configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

const fn default_enabled() -> bool {
    true
}

const fn default_interval_secs() -> u64 {
    5
}

const fn default_batch_size() -> u32 {
    50
}

const fn default_max_attempts() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutboxConfig {
    /// Whether the server runs the background dispatcher.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Seconds between dispatcher passes.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Maximum events delivered per pass.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Delivery attempts before an event is marked failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval_secs: default_interval_secs(),
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl OutboxConfig {
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(if self.interval_secs == 0 {
            1
        } else {
            self.interval_secs
        })
    }
}

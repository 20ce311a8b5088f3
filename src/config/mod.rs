//! Configuration management for the crosspost service
//!
//! Settings load from environment variables or a TOML file and are
//! validated before the server starts.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::platforms::PollPolicy;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Publish pipeline configuration
    #[serde(default)]
    pub publisher: PublisherConfig,

    /// Media validation configuration
    #[serde(default)]
    pub media: MediaConfig,

    /// Scheduled-post poller configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Publish pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherConfig {
    /// Remote media processing poll schedule
    pub poll: PollPolicy,

    /// Job age threshold before eviction, in minutes
    pub job_max_age_minutes: u64,

    /// Interval between job eviction sweeps, in seconds
    pub job_cleanup_interval_secs: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            poll: PollPolicy::default(),
            job_max_age_minutes: 60,
            job_cleanup_interval_secs: 300,
        }
    }
}

/// Media validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Absolute aspect-ratio tolerance for carousel items
    pub ratio_tolerance: f64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ratio_tolerance: crate::media::DEFAULT_TOLERANCE,
        }
    }
}

/// Scheduled-post poller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Whether the poller runs at all
    pub enabled: bool,

    /// Seconds between scans for due posts
    pub interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(minutes) = env_parse::<u64>("CROSSPOST_JOB_MAX_AGE_MINUTES") {
            config.publisher.job_max_age_minutes = minutes;
        }
        if let Some(secs) = env_parse::<u64>("CROSSPOST_JOB_CLEANUP_INTERVAL") {
            config.publisher.job_cleanup_interval_secs = secs;
        }
        if let Some(attempts) = env_parse::<u32>("CROSSPOST_POLL_MAX_ATTEMPTS") {
            config.publisher.poll.max_attempts = attempts;
        }
        if let Some(secs) = env_parse::<u64>("CROSSPOST_POLL_INITIAL_WAIT") {
            config.publisher.poll.initial_wait_secs = secs;
        }
        if let Some(secs) = env_parse::<u64>("CROSSPOST_POLL_WAIT_INCREMENT") {
            config.publisher.poll.wait_increment_secs = secs;
        }
        if let Some(tolerance) = env_parse::<f64>("CROSSPOST_RATIO_TOLERANCE") {
            config.media.ratio_tolerance = tolerance;
        }
        if let Some(enabled) = env_parse::<bool>("CROSSPOST_SCHEDULER_ENABLED") {
            config.scheduler.enabled = enabled;
        }
        if let Some(secs) = env_parse::<u64>("CROSSPOST_SCHEDULER_INTERVAL") {
            config.scheduler.interval_secs = secs;
        }
        if let Ok(level) = std::env::var("CROSSPOST_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("CROSSPOST_LOG_FORMAT") {
            config.logging.format = format;
        }

        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.publisher.poll.max_attempts == 0 {
            anyhow::bail!("poll.max_attempts must be greater than 0");
        }

        if self.publisher.job_max_age_minutes == 0 {
            anyhow::bail!("job_max_age_minutes must be greater than 0");
        }

        if self.media.ratio_tolerance <= 0.0 {
            anyhow::bail!("ratio_tolerance must be positive");
        }

        if self.scheduler.interval_secs == 0 {
            anyhow::bail!("scheduler interval_secs must be greater than 0");
        }

        Ok(())
    }

    /// Get the job cleanup sweep interval as Duration
    #[must_use]
    pub fn job_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.publisher.job_cleanup_interval_secs)
    }

    /// Get the job age threshold as chrono Duration
    #[must_use]
    pub fn job_max_age(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.publisher.job_max_age_minutes as i64)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

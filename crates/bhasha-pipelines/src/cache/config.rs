//! Configuration for the resource cache.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Configuration for the resource cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheConfig {
    /// Whether loaded resources are kept between calls.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Seconds an unused entry stays valid (default: 1800 = 30 minutes).
    #[serde(default = "default_cache_duration_secs")]
    pub cache_duration_secs: u64,

    /// Maximum number of entries to keep in memory (default: 2).
    #[serde(default = "default_max_cache_size")]
    pub max_cache_size: usize,

    /// Seconds a single load may take before it is abandoned (default: 60).
    #[serde(default = "default_load_timeout_secs")]
    pub load_timeout_secs: u64,

    /// Seconds a failed key is refused before it may be retried (default: 60).
    #[serde(default = "default_error_cooldown_secs")]
    pub error_cooldown_secs: u64,

    /// How often the background sweeper runs in seconds (default: 300 = 5 minutes).
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_cache_duration_secs() -> u64 {
    1800 // 30 minutes
}

fn default_max_cache_size() -> usize {
    2
}

fn default_load_timeout_secs() -> u64 {
    60
}

fn default_error_cooldown_secs() -> u64 {
    60
}

fn default_cleanup_interval_secs() -> u64 {
    300 // 5 minutes
}

/// Errors that can occur during cache configuration validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheConfigError {
    /// Invalid cache duration (must be > 0).
    #[error("Invalid cache duration: must be greater than 0")]
    InvalidCacheDuration,

    /// Invalid max cache size (must be > 0).
    #[error("Invalid max cache size: must be greater than 0")]
    InvalidMaxCacheSize,

    /// Invalid load timeout (must be > 0).
    #[error("Invalid load timeout: must be greater than 0")]
    InvalidLoadTimeout,

    /// Invalid cleanup interval (must be > 0).
    #[error("Invalid cleanup interval: must be greater than 0")]
    InvalidCleanupInterval,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            cache_duration_secs: default_cache_duration_secs(),
            max_cache_size: default_max_cache_size(),
            load_timeout_secs: default_load_timeout_secs(),
            error_cooldown_secs: default_error_cooldown_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl CacheConfig {
    /// Validate the cache configuration.
    ///
    /// A zero error cooldown is allowed and disables the cooldown entirely.
    ///
    /// # Errors
    /// Returns `CacheConfigError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), CacheConfigError> {
        if self.cache_duration_secs == 0 {
            return Err(CacheConfigError::InvalidCacheDuration);
        }

        if self.max_cache_size == 0 {
            return Err(CacheConfigError::InvalidMaxCacheSize);
        }

        if self.load_timeout_secs == 0 {
            return Err(CacheConfigError::InvalidLoadTimeout);
        }

        if self.cleanup_interval_secs == 0 {
            return Err(CacheConfigError::InvalidCleanupInterval);
        }

        Ok(())
    }

    /// Get the entry time-to-live as a Duration.
    #[must_use]
    pub fn cache_duration(&self) -> Duration {
        Duration::from_secs(self.cache_duration_secs)
    }

    /// Get the default load timeout as a Duration.
    #[must_use]
    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }

    /// Get the error cooldown as a Duration.
    #[must_use]
    pub fn error_cooldown(&self) -> Duration {
        Duration::from_secs(self.error_cooldown_secs)
    }

    /// Get the cleanup interval as a Duration.
    #[must_use]
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

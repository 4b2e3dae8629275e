//! Dispatcher configuration

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::limits::Limit;

/// Queue depth above which priority ordering is suspended.
pub const DEFAULT_PRIORITY_UPPER_THRESHOLD: usize = 512;

/// Queue depth below which priority ordering is restored.
pub const DEFAULT_PRIORITY_LOWER_THRESHOLD: usize = 64;

/// Configuration for the [`crate::Dispatcher`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Number of workers. `None` (or `0`) uses the available parallelism.
    pub pool_size: Option<usize>,

    /// When more than this many tasks are queued, ordering degrades to FIFO
    pub priority_upper_threshold: usize,

    /// Once the queue drains below this depth, priority ordering resumes
    pub priority_lower_threshold: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            pool_size: None,
            priority_upper_threshold: DEFAULT_PRIORITY_UPPER_THRESHOLD,
            priority_lower_threshold: DEFAULT_PRIORITY_LOWER_THRESHOLD,
        }
    }
}

impl DispatcherConfig {
    /// Create a new dispatcher configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of workers
    pub fn with_pool_size(mut self, pool_size: usize) -> ConfigResult<Self> {
        if pool_size == 0 {
            return Err(ConfigError::invalid_pool_size(pool_size));
        }
        self.pool_size = Some(pool_size);
        Ok(self)
    }

    /// Set the hysteresis thresholds for priority degradation
    pub fn with_priority_thresholds(mut self, upper: usize, lower: usize) -> ConfigResult<Self> {
        if lower >= upper {
            return Err(ConfigError::invalid_thresholds(upper, lower));
        }
        self.priority_upper_threshold = upper;
        self.priority_lower_threshold = lower;
        Ok(self)
    }

    /// The configured pool size as a [`Limit`]
    pub fn pool_limit(&self) -> Limit {
        Limit::from(self.pool_size)
    }

    /// The concrete number of workers that will be spawned
    pub fn resolved_pool_size(&self) -> usize {
        self.pool_limit().resolve()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.priority_lower_threshold >= self.priority_upper_threshold {
            return Err(ConfigError::invalid_thresholds(
                self.priority_upper_threshold,
                self.priority_lower_threshold,
            ));
        }
        Ok(())
    }

    /// Create a configuration optimized for testing
    pub fn for_testing() -> Self {
        Self {
            pool_size: Some(2),
            priority_upper_threshold: DEFAULT_PRIORITY_UPPER_THRESHOLD,
            priority_lower_threshold: DEFAULT_PRIORITY_LOWER_THRESHOLD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DispatcherConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.priority_upper_threshold, 512);
        assert_eq!(config.priority_lower_threshold, 64);
        assert!(config.resolved_pool_size() >= 1);
    }

    #[test]
    fn test_config_builder() {
        let config = DispatcherConfig::new()
            .with_pool_size(4)
            .unwrap()
            .with_priority_thresholds(10, 2)
            .unwrap();
        assert_eq!(config.resolved_pool_size(), 4);
        assert_eq!(config.priority_upper_threshold, 10);
        assert_eq!(config.priority_lower_threshold, 2);
    }

    #[test]
    fn test_invalid_config() {
        assert!(DispatcherConfig::new().with_pool_size(0).is_err());
        assert!(DispatcherConfig::new().with_priority_thresholds(8, 8).is_err());

        let config = DispatcherConfig {
            priority_upper_threshold: 4,
            priority_lower_threshold: 16,
            ..DispatcherConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidThresholds { upper: 4, lower: 16 })
        );
    }
}

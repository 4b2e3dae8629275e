//! Configuration of the import controller

use std::path::Path;
use std::time::Duration;

use harvest_tasks::{DispatcherConfig, TaskPriority};
use serde::{Deserialize, Serialize};

use crate::error::ImportConfigError;

/// Configuration for the [`crate::ImportOperationController`]
///
/// ```toml
/// max_retries = 5
/// retry_delay_ms = 250
/// task_priority = "HIGH"
///
/// [dispatcher]
/// pool_size = 4
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Consecutive transient failures after which an operation fails
    pub max_retries: u32,

    /// Delay before a retried fetch starts, `0` disables it
    pub retry_delay_ms: u64,

    /// Priority of fetch tasks
    pub task_priority: TaskPriority,

    /// Priority of downstream enrichment tasks
    pub enrichment_priority: TaskPriority,

    /// Worker pool shared by fetch and enrichment tasks
    pub dispatcher: DispatcherConfig,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 1000,
            task_priority: TaskPriority::Default,
            enrichment_priority: TaskPriority::Low,
            dispatcher: DispatcherConfig::default(),
        }
    }
}

impl ImportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(source: &str) -> Result<Self, ImportConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ImportConfigError> {
        let source = fs_err::read_to_string(path.as_ref())?;
        Self::from_toml_str(&source)
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Result<Self, ImportConfigError> {
        if max_retries == 0 {
            return Err(ImportConfigError::InvalidMaxRetries { value: max_retries });
        }
        self.max_retries = max_retries;
        Ok(self)
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: DispatcherConfig) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn validate(&self) -> Result<(), ImportConfigError> {
        if self.max_retries == 0 {
            return Err(ImportConfigError::InvalidMaxRetries {
                value: self.max_retries,
            });
        }
        self.dispatcher.validate()?;
        Ok(())
    }

    /// Create a configuration optimized for testing: no retry delay and a
    /// small worker pool
    pub fn for_testing() -> Self {
        Self {
            retry_delay_ms: 0,
            dispatcher: DispatcherConfig::for_testing(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ImportConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay(), Duration::from_secs(1));
        assert_eq!(config.task_priority, TaskPriority::Default);
        assert_eq!(config.enrichment_priority, TaskPriority::Low);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_str() {
        let config = ImportConfig::from_toml_str(
            r#"
            max_retries = 5
            retry_delay_ms = 250
            task_priority = "HIGH"

            [dispatcher]
            pool_size = 4
            priority_upper_threshold = 100
            "#,
        )
        .unwrap();

        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_delay(), Duration::from_millis(250));
        assert_eq!(config.task_priority, TaskPriority::High);
        assert_eq!(config.enrichment_priority, TaskPriority::Low);
        assert_eq!(config.dispatcher.resolved_pool_size(), 4);
        assert_eq!(config.dispatcher.priority_upper_threshold, 100);
        assert_eq!(config.dispatcher.priority_lower_threshold, 64);
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(ImportConfig::from_toml_str("").unwrap(), ImportConfig::default());
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(matches!(
            ImportConfig::from_toml_str("max_retries = 0"),
            Err(ImportConfigError::InvalidMaxRetries { value: 0 })
        ));
        assert!(matches!(
            ImportConfig::from_toml_str(
                "[dispatcher]\npriority_upper_threshold = 8\npriority_lower_threshold = 16"
            ),
            Err(ImportConfigError::Dispatcher(_))
        ));
        assert!(matches!(
            ImportConfig::from_toml_str("max_retries = \"three\""),
            Err(ImportConfigError::Parse(_))
        ));
        assert!(ImportConfig::new().with_max_retries(0).is_err());
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harvest.toml");
        fs_err::write(&path, "retry_delay_ms = 0").unwrap();

        let config = ImportConfig::from_path(&path).unwrap();
        assert_eq!(config.retry_delay(), Duration::ZERO);

        assert!(matches!(
            ImportConfig::from_path(dir.path().join("missing.toml")),
            Err(ImportConfigError::Io(_))
        ));
    }
}

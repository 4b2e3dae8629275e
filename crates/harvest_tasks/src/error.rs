//! Error types for the harvest task engine

use std::sync::Arc;

use thiserror::Error;

use crate::task::TaskId;

/// Main error type for engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Failure captured by a task, returned from [`crate::Task::get`].
///
/// The execution error is shared behind an [`Arc`] so that every caller
/// awaiting the same task observes the same failure.
#[derive(Error, Debug)]
pub enum TaskError<E> {
    #[error("Task execution failed: {0}")]
    Execution(Arc<E>),

    #[error("Task panicked: {0}")]
    Panicked(String),

    #[error("Task was cancelled")]
    Cancelled,

    #[error("Task was interrupted")]
    Interrupted,
}

impl<E> Clone for TaskError<E> {
    fn clone(&self) -> Self {
        match self {
            TaskError::Execution(err) => TaskError::Execution(Arc::clone(err)),
            TaskError::Panicked(message) => TaskError::Panicked(message.clone()),
            TaskError::Cancelled => TaskError::Cancelled,
            TaskError::Interrupted => TaskError::Interrupted,
        }
    }
}

impl<E> TaskError<E> {
    /// Wrap an execution error
    pub fn execution(error: E) -> Self {
        TaskError::Execution(Arc::new(error))
    }

    /// Returns the execution error if this failure came from the task itself
    pub fn as_execution(&self) -> Option<&E> {
        match self {
            TaskError::Execution(err) => Some(&**err),
            _ => None,
        }
    }

    /// Check if this error indicates an external stop request
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskError::Cancelled | TaskError::Interrupted)
    }
}

/// Errors raised when handing work to the dispatcher
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Dispatcher is shut down")]
    ShutDown,

    #[error("Task {0} was cancelled before it could be submitted")]
    TaskCancelled(TaskId),
}

/// Errors related to configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid pool size: {value} (must be > 0)")]
    InvalidPoolSize { value: usize },

    #[error("Invalid priority thresholds: lower={lower} must be below upper={upper}")]
    InvalidThresholds { upper: usize, lower: usize },
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Result type alias for dispatch operations
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

impl ConfigError {
    /// Create an invalid pool size error
    pub fn invalid_pool_size(value: usize) -> Self {
        ConfigError::InvalidPoolSize { value }
    }

    /// Create an invalid thresholds error
    pub fn invalid_thresholds(upper: usize, lower: usize) -> Self {
        ConfigError::InvalidThresholds { upper, lower }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Boom;

    impl std::fmt::Display for Boom {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "boom")
        }
    }

    #[test]
    fn test_task_error_helpers() {
        let err: TaskError<Boom> = TaskError::execution(Boom);
        assert_eq!(err.as_execution(), Some(&Boom));
        assert!(!err.is_cancelled());
        assert_eq!(err.to_string(), "Task execution failed: boom");

        let cloned = err.clone();
        assert_eq!(cloned.as_execution(), Some(&Boom));

        assert!(TaskError::<Boom>::Cancelled.is_cancelled());
        assert!(TaskError::<Boom>::Interrupted.is_cancelled());
        assert!(TaskError::<Boom>::Panicked("x".into()).as_execution().is_none());
    }

    #[test]
    fn test_config_error_helpers() {
        let invalid = ConfigError::invalid_pool_size(0);
        assert_eq!(invalid, ConfigError::InvalidPoolSize { value: 0 });

        let thresholds = ConfigError::invalid_thresholds(10, 20);
        if let ConfigError::InvalidThresholds { upper, lower } = thresholds {
            assert_eq!(upper, 10);
            assert_eq!(lower, 20);
        } else {
            panic!("Expected invalid thresholds error");
        }
    }

    #[test]
    fn test_engine_error_from() {
        let err: EngineError = DispatchError::ShutDown.into();
        assert!(matches!(err, EngineError::Dispatch(DispatchError::ShutDown)));
    }
}

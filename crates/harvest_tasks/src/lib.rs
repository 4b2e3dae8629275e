//! Harvest tasks - a priority task engine on top of tokio
//!
//! The engine is built from three layers:
//! - [`Task`] wraps one unit of [`TaskWork`] with a lifecycle, a captured
//!   result or failure, and cancellation
//! - [`Dispatcher`] runs tasks on a fixed number of workers, highest priority
//!   first and FIFO within a priority. When the ready queue is saturated the
//!   ordering degrades to plain submission order until it drains again
//! - [`TaskManager`] tracks pending and running tasks, routes their outcome
//!   to a [`CompletionHandler`] and implements repeat, chaining and cancel
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use harvest_tasks::{DispatcherConfig, Task, TaskManager, TaskWork};
//!
//! struct AddTask {
//!     a: i32,
//!     b: i32,
//! }
//!
//! #[async_trait::async_trait]
//! impl TaskWork for AddTask {
//!     type Output = i32;
//!     type Error = String;
//!
//!     async fn execute(&self) -> Result<Self::Output, Self::Error> {
//!         Ok(self.a + self.b)
//!     }
//!
//!     fn name(&self) -> String {
//!         format!("add({}, {})", self.a, self.b)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = TaskManager::new(DispatcherConfig::default())?;
//!     let task = Arc::new(Task::new(AddTask { a: 1, b: 2 }));
//!     manager.submit(task.clone())?;
//!
//!     assert_eq!(task.get().await?, 3);
//!     manager.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod limits;
pub mod manager;
pub mod reporter;
pub mod task;

pub use config::DispatcherConfig;
pub use dispatcher::{Dispatcher, DispatcherStats, Job};
pub use error::{
    ConfigError, ConfigResult, DispatchError, DispatchResult, EngineError, EngineResult, TaskError,
};
pub use limits::Limit;
pub use manager::{CompletionHandler, TaskManager};
pub use reporter::{
    ExecutionReporter, MultiReporter, NoOpReporter, TaskExecutionEvent, TracingReporter,
};
pub use task::{Task, TaskId, TaskPriority, TaskState, TaskWork};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

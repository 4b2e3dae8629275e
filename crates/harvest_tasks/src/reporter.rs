//! Progress reporting for tasks handled by the [`crate::TaskManager`]
//!
//! Reporters receive lifecycle events for every monitored task. They are
//! shared between workers, so implementations take `&self` and use interior
//! mutability where they need state.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::task::{TaskId, TaskPriority};

/// Event types that can be reported during task execution
#[derive(Debug, Clone, PartialEq)]
pub enum TaskExecutionEvent {
    /// Task was handed to the dispatcher
    Queued {
        task_id: TaskId,
        task_name: String,
        priority: TaskPriority,
    },
    /// A worker picked up the task
    Started { task_id: TaskId, task_name: String },
    /// Task execution completed successfully
    Completed {
        task_id: TaskId,
        task_name: String,
        duration: Duration,
    },
    /// Task execution failed
    Failed {
        task_id: TaskId,
        task_name: String,
        error: String,
        duration: Duration,
    },
    /// Task was cancelled or interrupted
    Cancelled { task_id: TaskId, task_name: String },
}

impl TaskExecutionEvent {
    pub fn task_id(&self) -> TaskId {
        match self {
            TaskExecutionEvent::Queued { task_id, .. }
            | TaskExecutionEvent::Started { task_id, .. }
            | TaskExecutionEvent::Completed { task_id, .. }
            | TaskExecutionEvent::Failed { task_id, .. }
            | TaskExecutionEvent::Cancelled { task_id, .. } => *task_id,
        }
    }
}

/// Trait for reporting task execution progress
pub trait ExecutionReporter: Send + Sync {
    /// Report a task execution event
    fn report_event(&self, event: TaskExecutionEvent);

    /// Called when the reporter is no longer needed
    fn finish(&self) {}
}

/// A no-op reporter that discards all events
#[derive(Debug, Default)]
pub struct NoOpReporter;

impl ExecutionReporter for NoOpReporter {
    fn report_event(&self, _event: TaskExecutionEvent) {}
}

/// Writes every event to the `tracing` subscriber
#[derive(Debug, Default)]
pub struct TracingReporter;

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() > 0 {
        format!("{:.1}s", duration.as_secs_f32())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

impl ExecutionReporter for TracingReporter {
    fn report_event(&self, event: TaskExecutionEvent) {
        match event {
            TaskExecutionEvent::Queued {
                task_id,
                task_name,
                priority,
            } => debug!(%task_id, ?priority, "queued {task_name}"),
            TaskExecutionEvent::Started { task_id, task_name } => debug!(%task_id, "started {task_name}"),
            TaskExecutionEvent::Completed {
                task_id,
                task_name,
                duration,
            } => info!(
                %task_id,
                "completed {task_name} in {}",
                format_duration(duration)
            ),
            TaskExecutionEvent::Failed {
                task_id,
                task_name,
                error,
                duration,
            } => warn!(
                %task_id,
                "failed {task_name} after {} - {error}",
                format_duration(duration)
            ),
            TaskExecutionEvent::Cancelled { task_id, task_name } => info!(%task_id, "cancelled {task_name}"),
        }
    }
}

/// A multi-reporter that broadcasts events to multiple reporters
#[derive(Default)]
pub struct MultiReporter {
    reporters: Vec<Arc<dyn ExecutionReporter>>,
}

impl MultiReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_reporter<R: ExecutionReporter + 'static>(mut self, reporter: R) -> Self {
        self.reporters.push(Arc::new(reporter));
        self
    }

    pub fn with_reporter(&mut self, reporter: Arc<dyn ExecutionReporter>) {
        self.reporters.push(reporter);
    }
}

impl ExecutionReporter for MultiReporter {
    fn report_event(&self, event: TaskExecutionEvent) {
        for reporter in &self.reporters {
            reporter.report_event(event.clone());
        }
    }

    fn finish(&self) {
        for reporter in &self.reporters {
            reporter.finish();
        }
    }
}

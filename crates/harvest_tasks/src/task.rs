//! Core task abstractions and lifecycle

use std::any::Any;
use std::fmt::{Debug, Display};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::TaskError;

/// Unique identifier for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Generate a new unique task ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Priority levels for task execution, lowest first
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskPriority {
    Low = 0,
    #[default]
    Default = 1,
    High = 2,
    Urgent = 3,
    Asap = 4,
}

impl TaskPriority {
    /// Numeric rank used by the ready queue (higher runs first)
    pub fn rank(self) -> u8 {
        self as u8
    }
}

/// Lifecycle state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Constructed but never submitted
    Created,
    /// Submitted for the first time and waiting for a worker
    Pending,
    /// Re-submitted (repeat or chain) and waiting for a worker
    Paused,
    /// Currently executing
    Running,
    /// Finished with a result
    Completed,
    /// Finished with a captured failure
    Failed,
    /// Stopped by the dispatcher (shutdown)
    Interrupted,
    /// Stopped by an explicit cancel request
    Cancelled,
}

impl TaskState {
    /// Check if the task is in a final state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Interrupted | TaskState::Cancelled
        )
    }

    /// Check if the task is currently running
    pub fn is_running(&self) -> bool {
        matches!(self, TaskState::Running)
    }

    /// Check if the task is waiting in a queue
    pub fn is_queued(&self) -> bool {
        matches!(self, TaskState::Pending | TaskState::Paused)
    }
}

/// The unit of work carried by a [`Task`].
///
/// Implementations are usually small enums: a closed set of variants that
/// share this one capability interface.
#[async_trait::async_trait]
pub trait TaskWork: Send + Sync + 'static {
    /// The type of output produced by this work
    type Output: Clone + Send + Sync + 'static;

    /// The type of error this work can produce
    type Error: Debug + Display + Send + Sync + 'static;

    /// Execute the work
    async fn execute(&self) -> Result<Self::Output, Self::Error>;

    /// Get a human-readable name for this work (used for logging)
    fn name(&self) -> String;

    /// Priority used when the task is queued
    fn priority(&self) -> TaskPriority {
        TaskPriority::Default
    }

    /// Whether the same task should be submitted again after it completed
    fn should_repeat(&self, _output: &Self::Output) -> bool {
        false
    }

    /// Work that should be submitted after this one completed
    fn next_task(&self, _output: &Self::Output) -> Option<Self>
    where
        Self: Sized,
    {
        None
    }
}

type Outcome<W> = Result<<W as TaskWork>::Output, TaskError<<W as TaskWork>::Error>>;

struct TaskInner<W: TaskWork> {
    state: TaskState,
    output: Option<W::Output>,
    failure: Option<TaskError<W::Error>>,
    submissions: u32,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
}

/// A cancellable, one-shot unit of asynchronous work.
///
/// A task can run more than once when it is repeated, but never
/// concurrently with itself.
pub struct Task<W: TaskWork> {
    id: TaskId,
    work: W,
    priority: TaskPriority,
    created_at: Instant,
    cancel: CancellationToken,
    in_flight: AtomicBool,
    inner: Mutex<TaskInner<W>>,
    state_tx: watch::Sender<TaskState>,
}

impl<W: TaskWork> Task<W> {
    /// Create a task using the priority declared by the work
    pub fn new(work: W) -> Self {
        let priority = work.priority();
        Self::with_priority(work, priority)
    }

    /// Create a task with an explicit priority
    pub fn with_priority(work: W, priority: TaskPriority) -> Self {
        let (state_tx, _) = watch::channel(TaskState::Created);
        Self {
            id: TaskId::new(),
            work,
            priority,
            created_at: Instant::now(),
            cancel: CancellationToken::new(),
            in_flight: AtomicBool::new(false),
            inner: Mutex::new(TaskInner {
                state: TaskState::Created,
                output: None,
                failure: None,
                submissions: 0,
                started_at: None,
                finished_at: None,
            }),
            state_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, TaskInner<W>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, inner: &mut TaskInner<W>, state: TaskState) {
        inner.state = state;
        self.state_tx.send_replace(state);
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> String {
        self.work.name()
    }

    pub fn work(&self) -> &W {
        &self.work
    }

    pub fn priority(&self) -> TaskPriority {
        self.priority
    }

    pub fn state(&self) -> TaskState {
        self.lock().state
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.lock().started_at
    }

    /// Number of times the task has been submitted
    pub fn submissions(&self) -> u32 {
        self.lock().submissions
    }

    /// The cancellation token observed while the task executes
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Time spent in the most recent execution (still growing while running)
    pub fn duration(&self) -> Duration {
        let inner = self.lock();
        match (inner.started_at, inner.finished_at) {
            (Some(started), Some(finished)) => finished.saturating_duration_since(started),
            (Some(started), None) => started.elapsed(),
            _ => Duration::ZERO,
        }
    }

    /// Time since creation, frozen once the task reached a terminal state
    pub fn lifetime(&self) -> Duration {
        let inner = self.lock();
        match inner.finished_at {
            Some(finished) if inner.state.is_terminal() => {
                finished.saturating_duration_since(self.created_at)
            }
            _ => self.created_at.elapsed(),
        }
    }

    /// The result, readable only once the task completed
    pub fn result(&self) -> Option<W::Output> {
        let inner = self.lock();
        match inner.state {
            TaskState::Completed => inner.output.clone(),
            _ => None,
        }
    }

    /// The captured failure, readable only once the task failed
    pub fn failure(&self) -> Option<TaskError<W::Error>> {
        let inner = self.lock();
        match inner.state {
            TaskState::Failed => inner.failure.clone(),
            _ => None,
        }
    }

    /// The final outcome, or `None` while the task has not finished
    pub fn outcome(&self) -> Option<Outcome<W>> {
        let inner = self.lock();
        match inner.state {
            TaskState::Completed => inner.output.clone().map(Ok),
            TaskState::Failed => inner.failure.clone().map(Err),
            TaskState::Cancelled => Some(Err(TaskError::Cancelled)),
            TaskState::Interrupted => Some(Err(TaskError::Interrupted)),
            _ => None,
        }
    }

    /// Mark the task as submitted.
    ///
    /// The first submission moves the task to `Pending`, any later one (repeat
    /// or chain) to `Paused`. Returns `false` if the task was stopped and must
    /// not be queued.
    pub fn on_submit(&self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        let mut inner = self.lock();
        if matches!(inner.state, TaskState::Cancelled | TaskState::Interrupted) {
            return false;
        }
        let state = if inner.submissions == 0 {
            TaskState::Pending
        } else {
            TaskState::Paused
        };
        inner.submissions += 1;
        self.set_state(&mut inner, state);
        true
    }

    /// Execute the work once.
    ///
    /// Only one execution is in flight per task; a concurrent second call
    /// returns immediately. A panic inside the work is captured as a failure.
    pub async fn run(&self) {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            warn!(task = %self.name(), id = %self.id, "task is already running, ignoring");
            return;
        }

        {
            let mut inner = self.lock();
            if self.cancel.is_cancelled()
                || matches!(inner.state, TaskState::Cancelled | TaskState::Interrupted)
            {
                drop(inner);
                self.in_flight.store(false, Ordering::Release);
                return;
            }
            inner.output = None;
            inner.failure = None;
            inner.started_at = Some(Instant::now());
            inner.finished_at = None;
            self.set_state(&mut inner, TaskState::Running);
        }

        debug!(task = %self.name(), id = %self.id, "task started");

        let execution = AssertUnwindSafe(self.work.execute()).catch_unwind();
        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = execution => Some(result),
        };

        {
            let mut inner = self.lock();
            if inner.state == TaskState::Running {
                inner.finished_at = Some(Instant::now());
                match outcome {
                    Some(Ok(Ok(output))) => {
                        inner.output = Some(output);
                        self.set_state(&mut inner, TaskState::Completed);
                    }
                    Some(Ok(Err(err))) => {
                        debug!(task = %self.name(), error = %err, "task failed");
                        inner.failure = Some(TaskError::execution(err));
                        self.set_state(&mut inner, TaskState::Failed);
                    }
                    Some(Err(panic)) => {
                        let message = panic_message(&*panic);
                        warn!(task = %self.name(), panic = %message, "task panicked");
                        inner.failure = Some(TaskError::Panicked(message));
                        self.set_state(&mut inner, TaskState::Failed);
                    }
                    None => self.set_state(&mut inner, TaskState::Interrupted),
                }
            }
        }

        self.in_flight.store(false, Ordering::Release);
    }

    /// Wait until the task reaches a terminal state and return its outcome.
    ///
    /// Returns immediately when the task already finished. There is no
    /// timeout; cancelling the task is the only way to unblock early.
    pub async fn get(&self) -> Outcome<W> {
        let mut rx = self.state_tx.subscribe();
        loop {
            if let Some(outcome) = self.outcome() {
                return outcome;
            }
            if rx.wait_for(TaskState::is_terminal).await.is_err() {
                return Err(TaskError::Interrupted);
            }
        }
    }

    /// Request cancellation. Returns `true` if this call stopped the task.
    pub fn cancel(&self) -> bool {
        self.stop(TaskState::Cancelled)
    }

    /// Interrupt the task (used on dispatcher shutdown).
    pub fn interrupt(&self) -> bool {
        self.stop(TaskState::Interrupted)
    }

    fn stop(&self, to: TaskState) -> bool {
        let stopped = {
            let mut inner = self.lock();
            if inner.state.is_terminal() {
                false
            } else {
                inner.output = None;
                inner.failure = None;
                inner.finished_at = Some(Instant::now());
                self.set_state(&mut inner, to);
                true
            }
        };
        // Also prevents a completed task from being repeated.
        self.cancel.cancel();
        stopped
    }
}

impl<W: TaskWork> Debug for Task<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("priority", &self.priority)
            .field("state", &self.state())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

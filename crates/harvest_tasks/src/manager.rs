//! Task tracking, completion callbacks, chaining and repeat on top of the
//! [`Dispatcher`].

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, warn};

use crate::config::DispatcherConfig;
use crate::dispatcher::{Dispatcher, DispatcherStats, Job};
use crate::error::{ConfigResult, DispatchResult, TaskError};
use crate::reporter::{ExecutionReporter, NoOpReporter, TaskExecutionEvent};
use crate::task::{Task, TaskId, TaskPriority, TaskState, TaskWork};

/// Callbacks invoked by the [`TaskManager`] once a monitored task finished.
#[async_trait::async_trait]
pub trait CompletionHandler<W: TaskWork>: Send + Sync {
    async fn on_completed(&self, task: &Arc<Task<W>>);

    async fn on_failed(&self, task: &Arc<Task<W>>, error: &TaskError<W::Error>);

    /// Called when the task was cancelled or interrupted while running
    async fn on_cancelled(&self, _task: &Arc<Task<W>>) {}
}

#[derive(Default)]
struct Registry {
    pending: HashSet<TaskId>,
    running: HashSet<TaskId>,
    wrappers: HashMap<TaskId, Arc<dyn Job>>,
}

struct Inner {
    dispatcher: Dispatcher,
    registry: Mutex<Registry>,
    reporter: Arc<dyn ExecutionReporter>,
}

impl Inner {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn submit_job(&self, job: Arc<dyn Job>) -> DispatchResult<TaskId> {
        let id = job.id();
        {
            let mut registry = self.registry();
            registry.pending.insert(id);
            registry.wrappers.insert(id, Arc::clone(&job));
        }

        if let Err(err) = self.dispatcher.submit(Arc::clone(&job)) {
            self.untrack(id);
            return Err(err);
        }

        self.reporter.report_event(TaskExecutionEvent::Queued {
            task_id: id,
            task_name: job.name(),
            priority: job.priority(),
        });
        Ok(id)
    }

    /// Move a task from pending to running. Returns `false` if it is no
    /// longer tracked, i.e. it was cancelled after being dequeued.
    fn mark_running(&self, id: TaskId) -> bool {
        let mut registry = self.registry();
        if registry.pending.remove(&id) {
            registry.running.insert(id);
            true
        } else {
            false
        }
    }

    fn untrack(&self, id: TaskId) -> Option<Arc<dyn Job>> {
        let mut registry = self.registry();
        registry.pending.remove(&id);
        registry.running.remove(&id);
        registry.wrappers.remove(&id)
    }
}

/// Wraps a task with monitoring and its optional completion handler
struct MonitoredTask<W: TaskWork> {
    task: Arc<Task<W>>,
    handler: Option<Arc<dyn CompletionHandler<W>>>,
    manager: Weak<Inner>,
}

impl<W: TaskWork> MonitoredTask<W> {
    async fn follow_up(self: Arc<Self>, inner: &Inner) {
        let Some(output) = self.task.result() else {
            return;
        };
        let work = self.task.work();

        if work.should_repeat(&output) {
            debug!(task = %self.task.name(), "repeating task");
            if let Err(err) = inner.submit_job(self.clone()) {
                debug!(task = %self.task.name(), "could not repeat task: {err}");
            }
        } else if let Some(next) = work.next_task(&output) {
            let next = Arc::new(Task::new(next));
            debug!(task = %self.task.name(), next = %next.name(), "submitting successor");
            let wrapper = Arc::new(MonitoredTask {
                task: next,
                handler: self.handler.clone(),
                manager: self.manager.clone(),
            });
            if let Err(err) = inner.submit_job(wrapper) {
                debug!(task = %self.task.name(), "could not submit successor: {err}");
            }
        }
    }
}

#[async_trait::async_trait]
impl<W: TaskWork> Job for MonitoredTask<W> {
    fn id(&self) -> TaskId {
        self.task.id()
    }

    fn name(&self) -> String {
        self.task.name()
    }

    fn priority(&self) -> TaskPriority {
        self.task.priority()
    }

    fn on_submit(&self) -> bool {
        self.task.on_submit()
    }

    async fn run(self: Arc<Self>) {
        let Some(inner) = self.manager.upgrade() else {
            self.task.interrupt();
            return;
        };
        let id = self.task.id();
        if !inner.mark_running(id) {
            debug!(task = %self.task.name(), "task is no longer tracked, skipping");
            return;
        }

        let task_name = self.task.name();
        inner.reporter.report_event(TaskExecutionEvent::Started {
            task_id: id,
            task_name: task_name.clone(),
        });

        // Inherent run; `Job::run` would take the Arc by value
        Task::run(&self.task).await;
        inner.untrack(id);

        match self.task.state() {
            TaskState::Completed => {
                inner.reporter.report_event(TaskExecutionEvent::Completed {
                    task_id: id,
                    task_name,
                    duration: self.task.duration(),
                });
                if let Some(handler) = &self.handler {
                    handler.on_completed(&self.task).await;
                }
                Arc::clone(&self).follow_up(&inner).await;
            }
            TaskState::Failed => {
                let failure = self.task.failure().unwrap_or(TaskError::Interrupted);
                inner.reporter.report_event(TaskExecutionEvent::Failed {
                    task_id: id,
                    task_name,
                    error: failure.to_string(),
                    duration: self.task.duration(),
                });
                if let Some(handler) = &self.handler {
                    handler.on_failed(&self.task, &failure).await;
                }
            }
            TaskState::Cancelled | TaskState::Interrupted => {
                inner.reporter.report_event(TaskExecutionEvent::Cancelled {
                    task_id: id,
                    task_name,
                });
                if let Some(handler) = &self.handler {
                    handler.on_cancelled(&self.task).await;
                }
            }
            state => warn!(task = %task_name, ?state, "task left run in a non-terminal state"),
        }
    }

    fn cancel(&self) {
        self.task.cancel();
    }

    fn interrupt(&self) {
        self.task.interrupt();
    }
}

/// Tracks submitted tasks and implements chaining, repeat and cancel on top
/// of a [`Dispatcher`].
///
/// Cloning is cheap; all clones share the same dispatcher.
#[derive(Clone)]
pub struct TaskManager {
    inner: Arc<Inner>,
}

impl TaskManager {
    /// Create a manager with its own dispatcher. Must be called from within a
    /// tokio runtime.
    pub fn new(config: DispatcherConfig) -> ConfigResult<Self> {
        Self::with_reporter(config, Arc::new(NoOpReporter))
    }

    /// Create a manager that reports task lifecycle events to `reporter`
    pub fn with_reporter(
        config: DispatcherConfig,
        reporter: Arc<dyn ExecutionReporter>,
    ) -> ConfigResult<Self> {
        let dispatcher = Dispatcher::new(config)?;
        Ok(Self {
            inner: Arc::new(Inner {
                dispatcher,
                registry: Mutex::new(Registry::default()),
                reporter,
            }),
        })
    }

    /// Submit a task without a completion handler
    pub fn submit<W: TaskWork>(&self, task: Arc<Task<W>>) -> DispatchResult<TaskId> {
        self.submit_monitored(task, None)
    }

    /// Submit a task whose outcome is routed to `handler`
    pub fn submit_with_handler<W: TaskWork>(
        &self,
        task: Arc<Task<W>>,
        handler: Arc<dyn CompletionHandler<W>>,
    ) -> DispatchResult<TaskId> {
        self.submit_monitored(task, Some(handler))
    }

    fn submit_monitored<W: TaskWork>(
        &self,
        task: Arc<Task<W>>,
        handler: Option<Arc<dyn CompletionHandler<W>>>,
    ) -> DispatchResult<TaskId> {
        let wrapper = Arc::new(MonitoredTask {
            task,
            handler,
            manager: Arc::downgrade(&self.inner),
        });
        self.inner.submit_job(wrapper)
    }

    /// Cancel a tracked task.
    ///
    /// A queued task is removed from the dispatcher and never runs; a running
    /// task is signalled and stops at its next await point. Returns `false`
    /// if the task is not tracked.
    pub fn cancel(&self, id: TaskId) -> bool {
        let wrapper = self.inner.registry().wrappers.get(&id).cloned();
        let Some(wrapper) = wrapper else {
            return false;
        };

        let dequeued = self.inner.dispatcher.cancel(id);
        wrapper.cancel();
        self.inner.untrack(id);

        if dequeued {
            self.inner
                .reporter
                .report_event(TaskExecutionEvent::Cancelled {
                    task_id: id,
                    task_name: wrapper.name(),
                });
        }
        debug!(task = %wrapper.name(), dequeued, "task cancelled");
        true
    }

    pub fn pending_count(&self) -> usize {
        self.inner.registry().pending.len()
    }

    pub fn running_count(&self) -> usize {
        self.inner.registry().running.len()
    }

    pub fn is_tracked(&self, id: TaskId) -> bool {
        self.inner.registry().wrappers.contains_key(&id)
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    pub fn stats(&self) -> DispatcherStats {
        self.inner.dispatcher.stats()
    }

    /// Shut down the dispatcher, interrupting everything still tracked
    pub async fn shutdown(&self) {
        self.inner.dispatcher.shutdown().await;
        {
            let mut registry = self.inner.registry();
            registry.pending.clear();
            registry.running.clear();
            registry.wrappers.clear();
        }
        self.inner.reporter.finish();
    }
}

impl std::fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskManager")
            .field("pending", &self.pending_count())
            .field("running", &self.running_count())
            .field("dispatcher", &self.inner.dispatcher)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use tokio::sync::{mpsc, Notify};

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Outcome {
        Completed(TaskId, u32),
        Failed(TaskId, String),
        Cancelled(TaskId),
    }

    struct ChannelHandler {
        tx: mpsc::UnboundedSender<Outcome>,
    }

    fn channel_handler() -> (Arc<ChannelHandler>, mpsc::UnboundedReceiver<Outcome>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(ChannelHandler { tx }), rx)
    }

    #[async_trait::async_trait]
    impl<W: TaskWork<Output = u32>> CompletionHandler<W> for ChannelHandler {
        async fn on_completed(&self, task: &Arc<Task<W>>) {
            let output = task.result().unwrap();
            let _ = self.tx.send(Outcome::Completed(task.id(), output));
        }

        async fn on_failed(&self, task: &Arc<Task<W>>, error: &TaskError<W::Error>) {
            let _ = self.tx.send(Outcome::Failed(task.id(), error.to_string()));
        }

        async fn on_cancelled(&self, task: &Arc<Task<W>>) {
            let _ = self.tx.send(Outcome::Cancelled(task.id()));
        }
    }

    /// Produces its own value and chains to `value - 1` until zero
    struct Countdown {
        value: u32,
    }

    #[async_trait::async_trait]
    impl TaskWork for Countdown {
        type Output = u32;
        type Error = String;

        async fn execute(&self) -> Result<u32, String> {
            if self.value == 99 {
                return Err("refusing 99".to_string());
            }
            Ok(self.value)
        }

        fn name(&self) -> String {
            format!("countdown({})", self.value)
        }

        fn next_task(&self, output: &u32) -> Option<Self> {
            (*output > 0 && *output != 99).then(|| Countdown { value: output - 1 })
        }
    }

    /// Counts its runs and repeats until `until` is reached
    struct Repeating {
        runs: Arc<AtomicU32>,
        until: u32,
    }

    #[async_trait::async_trait]
    impl TaskWork for Repeating {
        type Output = u32;
        type Error = String;

        async fn execute(&self) -> Result<u32, String> {
            Ok(self.runs.fetch_add(1, Ordering::SeqCst) + 1)
        }

        fn name(&self) -> String {
            "repeating".to_string()
        }

        fn should_repeat(&self, output: &u32) -> bool {
            *output < self.until
        }
    }

    struct Blocking {
        gate: Arc<Notify>,
    }

    #[async_trait::async_trait]
    impl TaskWork for Blocking {
        type Output = u32;
        type Error = String;

        async fn execute(&self) -> Result<u32, String> {
            self.gate.notified().await;
            Ok(7)
        }

        fn name(&self) -> String {
            "blocking".to_string()
        }
    }

    fn manager() -> TaskManager {
        TaskManager::new(DispatcherConfig::new().with_pool_size(1).unwrap()).unwrap()
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Outcome>) -> Outcome {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for a task outcome")
            .expect("handler channel closed")
    }

    #[tokio::test]
    async fn test_completion_handler_and_chaining() {
        let manager = manager();
        let (handler, mut rx) = channel_handler();

        let task = Arc::new(Task::new(Countdown { value: 2 }));
        let id = manager.submit_with_handler(task.clone(), handler).unwrap();
        assert_eq!(id, task.id());

        let mut values = Vec::new();
        for _ in 0..3 {
            match next(&mut rx).await {
                Outcome::Completed(_, value) => values.push(value),
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert_eq!(values, vec![2, 1, 0]);
        assert_eq!(task.get().await.unwrap(), 2);
        assert!(!manager.is_tracked(task.id()));
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_failure_is_routed_to_handler() {
        let manager = manager();
        let (handler, mut rx) = channel_handler();

        let task = Arc::new(Task::new(Countdown { value: 99 }));
        manager.submit_with_handler(task.clone(), handler).unwrap();

        match next(&mut rx).await {
            Outcome::Failed(id, message) => {
                assert_eq!(id, task.id());
                assert!(message.contains("refusing 99"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(manager.pending_count(), 0);
        assert_eq!(manager.running_count(), 0);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_repeat_resubmits_same_instance() {
        let manager = manager();
        let (handler, mut rx) = channel_handler();
        let runs = Arc::new(AtomicU32::new(0));

        let task = Arc::new(Task::new(Repeating {
            runs: runs.clone(),
            until: 3,
        }));
        manager.submit_with_handler(task.clone(), handler).unwrap();

        for expected in 1..=3 {
            assert_eq!(next(&mut rx).await, Outcome::Completed(task.id(), expected));
        }
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert_eq!(task.submissions(), 3);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_cancel_queued_task_never_runs() {
        let manager = manager();
        let (handler, mut rx) = channel_handler();
        let gate = Arc::new(Notify::new());

        let blocker = Arc::new(Task::new(Blocking { gate: gate.clone() }));
        manager.submit_with_handler(blocker.clone(), handler.clone()).unwrap();
        while manager.running_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let queued = Arc::new(Task::new(Countdown { value: 0 }));
        manager.submit_with_handler(queued.clone(), handler).unwrap();
        assert_eq!(manager.pending_count(), 1);

        assert!(manager.cancel(queued.id()));
        assert!(!manager.cancel(queued.id()));
        assert!(!manager.is_tracked(queued.id()));
        assert_eq!(queued.state(), TaskState::Cancelled);

        gate.notify_one();
        assert_eq!(next(&mut rx).await, Outcome::Completed(blocker.id(), 7));

        // Only the blocker ever reports back
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_cancel_running_task() {
        let manager = manager();
        let (handler, mut rx) = channel_handler();
        let gate = Arc::new(Notify::new());

        let task = Arc::new(Task::new(Blocking { gate }));
        manager.submit_with_handler(task.clone(), handler).unwrap();
        while task.state() != TaskState::Running {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert!(manager.cancel(task.id()));
        assert_eq!(next(&mut rx).await, Outcome::Cancelled(task.id()));
        assert!(matches!(task.get().await, Err(TaskError::Cancelled)));
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_reporter_receives_lifecycle_events() {
        #[derive(Default)]
        struct Collect(Mutex<Vec<&'static str>>);

        impl ExecutionReporter for Collect {
            fn report_event(&self, event: TaskExecutionEvent) {
                let kind = match event {
                    TaskExecutionEvent::Queued { .. } => "queued",
                    TaskExecutionEvent::Started { .. } => "started",
                    TaskExecutionEvent::Completed { .. } => "completed",
                    TaskExecutionEvent::Failed { .. } => "failed",
                    TaskExecutionEvent::Cancelled { .. } => "cancelled",
                };
                self.0.lock().unwrap().push(kind);
            }
        }

        let reporter = Arc::new(Collect::default());
        let manager =
            TaskManager::with_reporter(DispatcherConfig::for_testing(), reporter.clone()).unwrap();
        let task = Arc::new(Task::new(Countdown { value: 0 }));
        manager.submit(task.clone()).unwrap();
        task.get().await.unwrap();
        manager.shutdown().await;

        let events = reporter.0.lock().unwrap().clone();
        assert_eq!(events, vec!["queued", "started", "completed"]);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_rejected() {
        let manager = manager();
        manager.shutdown().await;

        let task = Arc::new(Task::new(Countdown { value: 1 }));
        assert!(manager.submit(task.clone()).is_err());
        assert!(!manager.is_tracked(task.id()));
    }
}

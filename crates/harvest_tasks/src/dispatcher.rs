//! Fixed-size worker pool draining a shared priority queue

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::DispatcherConfig;
use crate::error::{ConfigResult, DispatchError, DispatchResult};
use crate::task::{Task, TaskId, TaskPriority, TaskWork};

/// Type-erased unit the dispatcher can queue and run.
#[async_trait::async_trait]
pub trait Job: Send + Sync + 'static {
    fn id(&self) -> TaskId;

    fn name(&self) -> String;

    fn priority(&self) -> TaskPriority;

    /// Called once per submission. Returning `false` rejects the submission.
    fn on_submit(&self) -> bool;

    async fn run(self: Arc<Self>);

    /// Stop the job on an explicit request
    fn cancel(&self);

    /// Stop the job because the dispatcher is shutting down
    fn interrupt(&self);
}

#[async_trait::async_trait]
impl<W: TaskWork> Job for Task<W> {
    fn id(&self) -> TaskId {
        Task::id(self)
    }

    fn name(&self) -> String {
        Task::name(self)
    }

    fn priority(&self) -> TaskPriority {
        Task::priority(self)
    }

    fn on_submit(&self) -> bool {
        Task::on_submit(self)
    }

    async fn run(self: Arc<Self>) {
        Task::run(&self).await
    }

    fn cancel(&self) {
        Task::cancel(self);
    }

    fn interrupt(&self) {
        Task::interrupt(self);
    }
}

/// Snapshot of the dispatcher counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatcherStats {
    pub pool_size: usize,
    pub queued: usize,
    pub running: usize,
    pub submitted: u64,
    pub executed: u64,
    pub priorities_enabled: bool,
}

/// An entry in the ready queue.
///
/// Ordered by effective rank first and submission sequence second, so that
/// equal ranks are served in FIFO order.
struct QueuedJob {
    rank: u8,
    sequence: u64,
    job: Arc<dyn Job>,
}

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.rank == other.rank && self.sequence == other.sequence
    }
}

impl Eq for QueuedJob {}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedJob {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.rank
            .cmp(&other.rank)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

struct ReadyQueue {
    heap: BinaryHeap<QueuedJob>,
    priorities_enabled: bool,
    upper_threshold: usize,
    lower_threshold: usize,
}

impl ReadyQueue {
    fn new(upper_threshold: usize, lower_threshold: usize) -> Self {
        Self {
            heap: BinaryHeap::new(),
            priorities_enabled: true,
            upper_threshold,
            lower_threshold,
        }
    }

    fn effective_rank(&self, job: &dyn Job) -> u8 {
        if self.priorities_enabled {
            job.priority().rank()
        } else {
            0
        }
    }

    fn len(&self) -> usize {
        self.heap.len()
    }

    fn push(&mut self, job: Arc<dyn Job>, sequence: u64) {
        let rank = self.effective_rank(job.as_ref());
        self.heap.push(QueuedJob {
            rank,
            sequence,
            job,
        });
        self.rebalance();
    }

    fn pop(&mut self) -> Option<Arc<dyn Job>> {
        let job = self.heap.pop().map(|queued| queued.job);
        self.rebalance();
        job
    }

    fn remove(&mut self, id: TaskId) -> Option<Arc<dyn Job>> {
        let job = self
            .heap
            .iter()
            .find(|queued| queued.job.id() == id)
            .map(|queued| Arc::clone(&queued.job))?;
        self.heap.retain(|queued| queued.job.id() != id);
        self.rebalance();
        Some(job)
    }

    fn drain(&mut self) -> Vec<Arc<dyn Job>> {
        self.heap.drain().map(|queued| queued.job).collect()
    }

    /// Suspend priority ordering when the queue grows past the upper
    /// threshold and restore it once it drains below the lower one.
    fn rebalance(&mut self) {
        let len = self.heap.len();
        if self.priorities_enabled && len > self.upper_threshold {
            info!(queued = len, "ready queue saturated, suspending task priorities");
            self.priorities_enabled = false;
            self.rekey();
        } else if !self.priorities_enabled && len < self.lower_threshold {
            info!(queued = len, "ready queue drained, restoring task priorities");
            self.priorities_enabled = true;
            self.rekey();
        }
    }

    fn rekey(&mut self) {
        let mut entries = std::mem::take(&mut self.heap).into_vec();
        for entry in &mut entries {
            entry.rank = self.effective_rank(entry.job.as_ref());
        }
        self.heap = BinaryHeap::from(entries);
    }
}

struct Shared {
    queue: Mutex<ReadyQueue>,
    notify: Notify,
    in_flight: Mutex<HashMap<TaskId, Arc<dyn Job>>>,
    shutdown: CancellationToken,
    sequence: AtomicU64,
    executed: AtomicU64,
}

impl Shared {
    fn new(config: &DispatcherConfig) -> Self {
        Self {
            queue: Mutex::new(ReadyQueue::new(
                config.priority_upper_threshold,
                config.priority_lower_threshold,
            )),
            notify: Notify::new(),
            in_flight: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
            sequence: AtomicU64::new(0),
            executed: AtomicU64::new(0),
        }
    }

    /// Pop the next job and mark it in flight under the queue lock, so a
    /// concurrent shutdown sees it either queued or running
    fn take_next(&self) -> Option<Arc<dyn Job>> {
        let mut queue = self.queue();
        let job = queue.pop()?;
        self.in_flight().insert(job.id(), Arc::clone(&job));
        Some(job)
    }

    /// Reject further work and interrupt everything queued or running.
    /// Returns the number of interrupted jobs.
    fn interrupt_outstanding(&self) -> usize {
        self.shutdown.cancel();

        let queued = self.queue().drain();
        let running: Vec<_> = self.in_flight().values().cloned().collect();
        if !queued.is_empty() || !running.is_empty() {
            info!(
                queued = queued.len(),
                running = running.len(),
                "interrupting outstanding tasks"
            );
        }
        for job in queued.iter().chain(running.iter()) {
            job.interrupt();
        }
        queued.len() + running.len()
    }

    fn queue(&self) -> MutexGuard<'_, ReadyQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn in_flight(&self) -> MutexGuard<'_, HashMap<TaskId, Arc<dyn Job>>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Executes submitted jobs on a fixed number of workers.
///
/// Jobs are served highest priority first, FIFO within a priority. Once
/// shut down the dispatcher rejects all further submissions.
pub struct Dispatcher {
    config: DispatcherConfig,
    pool_size: usize,
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Create a dispatcher and spawn its workers.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: DispatcherConfig) -> ConfigResult<Self> {
        config.validate()?;
        let pool_size = config.resolved_pool_size();
        let shared = Arc::new(Shared::new(&config));

        let workers = (0..pool_size)
            .map(|index| tokio::spawn(worker_loop(Arc::clone(&shared), index)))
            .collect();

        debug!(pool_size, "dispatcher started");
        Ok(Self {
            config,
            pool_size,
            shared,
            workers: Mutex::new(workers),
        })
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Queue a job. Returns the submission sequence number.
    pub fn submit(&self, job: Arc<dyn Job>) -> DispatchResult<u64> {
        if self.shared.shutdown.is_cancelled() {
            return Err(DispatchError::ShutDown);
        }
        if !job.on_submit() {
            return Err(DispatchError::TaskCancelled(job.id()));
        }

        let sequence = self.shared.sequence.fetch_add(1, Ordering::Relaxed);
        debug!(task = %job.name(), id = %job.id(), priority = ?job.priority(), "task queued");
        self.shared.queue().push(job, sequence);
        self.shared.notify.notify_one();
        Ok(sequence)
    }

    /// Remove a job that is still waiting in the queue.
    ///
    /// Returns `false` if the job already started or was never queued.
    pub fn cancel(&self, id: TaskId) -> bool {
        self.shared.queue().remove(id).is_some()
    }

    pub fn queued_len(&self) -> usize {
        self.shared.queue().len()
    }

    pub fn running_len(&self) -> usize {
        self.shared.in_flight().len()
    }

    pub fn priorities_enabled(&self) -> bool {
        self.shared.queue().priorities_enabled
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    pub fn stats(&self) -> DispatcherStats {
        let (queued, priorities_enabled) = {
            let queue = self.shared.queue();
            (queue.len(), queue.priorities_enabled)
        };
        DispatcherStats {
            pool_size: self.pool_size,
            queued,
            running: self.running_len(),
            submitted: self.shared.sequence.load(Ordering::Relaxed),
            executed: self.shared.executed.load(Ordering::Relaxed),
            priorities_enabled,
        }
    }

    /// Stop the dispatcher.
    ///
    /// New submissions are rejected, queued and running jobs are interrupted
    /// and the workers are joined.
    pub async fn shutdown(&self) {
        self.shared.interrupt_outstanding();

        let workers = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for worker in workers {
            if let Err(err) = worker.await {
                error!("dispatcher worker terminated abnormally: {err}");
            }
        }
        debug!("dispatcher shut down");
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

async fn worker_loop(shared: Arc<Shared>, index: usize) {
    loop {
        if shared.shutdown.is_cancelled() {
            break;
        }

        let Some(job) = shared.take_next() else {
            tokio::select! {
                _ = shared.shutdown.cancelled() => break,
                _ = shared.notify.notified() => {}
            }
            continue;
        };

        let id = job.id();
        if AssertUnwindSafe(Arc::clone(&job).run())
            .catch_unwind()
            .await
            .is_err()
        {
            error!(worker = index, task = %job.name(), "task panicked outside of its work");
        }
        shared.in_flight().remove(&id);
        shared.executed.fetch_add(1, Ordering::Relaxed);
    }
    debug!(worker = index, "worker stopped");
}

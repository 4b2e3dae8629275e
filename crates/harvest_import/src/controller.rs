//! The import operation state machine.
//!
//! Every operation moves `PENDING -> RUNNING -> {CANCELLED, FAILED,
//! TERMINATED}`. While running, the controller submits one fetch task at a
//! time through the [`TaskManager`]; the completion callback applies the
//! fetched batch, persists the operation and submits the next fetch. All
//! operation state and the registry of active tasks live behind one lock.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use harvest_tasks::{CompletionHandler, DispatchError, Task, TaskError, TaskId, TaskManager};
use serde::Serialize;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ImportConfig;
use crate::conversion::{ConversionOutcome, DocumentConverter, DocumentStore, DocumentVersion};
use crate::enrichment::{EnrichmentLogger, EnrichmentServices, EnrichmentTask};
use crate::error::{FetchError, ImportConfigError, ImportError, ImportResult};
use crate::operation::{ImporterOperation, NewOperation, OperationId, OperationStatus};
use crate::reporter::{NoOpOperationReporter, OperationReporter};
use crate::response::ImportStatus;
use crate::source::ImportSource;
use crate::store::OperationStore;
use crate::tasks::{select_task_kind, ImportBatch, ImportTask, ImportTaskKind};

/// Outcome of [`ImportOperationController::recover_running_operations`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryStats {
    pub recovered: usize,
    pub failed: usize,
}

#[derive(Default)]
struct ControllerState {
    operations: HashMap<OperationId, ImporterOperation>,
    /// At most one active fetch task per operation
    active: HashMap<OperationId, Arc<Task<ImportTask>>>,
}

impl ControllerState {
    fn is_registered(&self, id: OperationId, task: &Arc<Task<ImportTask>>) -> bool {
        self.active
            .get(&id)
            .is_some_and(|active| Arc::ptr_eq(active, task))
    }
}

fn is_shut_down(err: &ImportError) -> bool {
    matches!(err, ImportError::Dispatch(DispatchError::ShutDown))
}

struct ConversionParams {
    source_name: String,
    force_update: bool,
    update_citations: bool,
    citations_only: bool,
}

#[derive(Default)]
struct IntegrationSummary {
    integrated: u64,
    duplicates: u64,
    failed: u64,
    versions: Vec<DocumentVersion>,
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Applies a successfully fetched and integrated batch to the operation
fn apply_batch(operation: &mut ImporterOperation, batch: &ImportBatch, summary: &IntegrationSummary) {
    let metadata = &batch.response.metadata;
    let received = batch.response.data.len() as u64;

    if let Some(next_cursor) = &metadata.next_cursor {
        let previous = metadata
            .previous_cursor
            .clone()
            .or_else(|| operation.cursor.take());
        operation.last_cursor = previous;
        operation.cursor = Some(next_cursor.clone());
    }

    if operation.reimport_all {
        operation.documents_received += received;
        operation.total_document_count += received;
    } else {
        operation.documents_received = metadata
            .current_count
            .unwrap_or(operation.documents_received + received);
        if let Some(total) = metadata.total_count {
            operation.total_document_count = total;
        }
    }

    operation.documents_integrated += summary.integrated;
    operation.retry_count = 0;

    let watermark = summary.versions.iter().map(|version| version.id).max();
    if watermark > operation.last_imported_document_version_id {
        operation.last_imported_document_version_id = watermark;
    }
    if let Some(reimported) = batch.reimported {
        operation.last_reimport_document_version_id = Some(reimported);
    }
}

/// Routes fetch task outcomes back into the controller
struct OperationCallbacks {
    controller: Weak<ImportOperationController>,
}

#[async_trait::async_trait]
impl CompletionHandler<ImportTask> for OperationCallbacks {
    async fn on_completed(&self, task: &Arc<Task<ImportTask>>) {
        if let Some(controller) = self.controller.upgrade() {
            controller.on_completed(task).await;
        }
    }

    async fn on_failed(&self, task: &Arc<Task<ImportTask>>, error: &TaskError<FetchError>) {
        if let Some(controller) = self.controller.upgrade() {
            controller.on_failed(task, error).await;
        }
    }
}

/// Logs the outcome of best-effort cursor releases
struct CursorReleaseLogger;

#[async_trait::async_trait]
impl CompletionHandler<ImportTask> for CursorReleaseLogger {
    async fn on_completed(&self, task: &Arc<Task<ImportTask>>) {
        debug!(operation = %task.work().operation_id(), "released import cursor");
    }

    async fn on_failed(&self, task: &Arc<Task<ImportTask>>, error: &TaskError<FetchError>) {
        warn!(operation = %task.work().operation_id(), "failed to release import cursor: {error}");
    }
}

/// Builder for an [`ImportOperationController`]
pub struct ImportOperationControllerBuilder {
    config: ImportConfig,
    store: Arc<dyn OperationStore>,
    converter: Arc<dyn DocumentConverter>,
    documents: Arc<dyn DocumentStore>,
    sources: HashMap<String, Arc<dyn ImportSource>>,
    enrichment: EnrichmentServices,
    reporter: Arc<dyn OperationReporter>,
    tasks: Option<TaskManager>,
}

impl ImportOperationControllerBuilder {
    pub fn with_config(mut self, config: ImportConfig) -> Self {
        self.config = config;
        self
    }

    /// Register an import source under its [`ImportSource::name`]
    pub fn with_source(mut self, source: Arc<dyn ImportSource>) -> Self {
        self.sources.insert(source.name().to_string(), source);
        self
    }

    pub fn with_enrichment(mut self, enrichment: EnrichmentServices) -> Self {
        self.enrichment = enrichment;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn OperationReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Share an existing task manager instead of creating one from the
    /// dispatcher configuration
    pub fn with_task_manager(mut self, tasks: TaskManager) -> Self {
        self.tasks = Some(tasks);
        self
    }

    /// Build the controller. Must be called from within a tokio runtime.
    pub fn build(self) -> ImportResult<Arc<ImportOperationController>> {
        self.config.validate()?;
        let tasks = match self.tasks {
            Some(tasks) => tasks,
            None => TaskManager::new(self.config.dispatcher.clone())
                .map_err(ImportConfigError::from)?,
        };

        Ok(Arc::new_cyclic(|controller| ImportOperationController {
            this: controller.clone(),
            config: self.config,
            tasks,
            store: self.store,
            sources: self.sources,
            converter: self.converter,
            documents: self.documents,
            enrichment: self.enrichment,
            reporter: self.reporter,
            callbacks: Arc::new(OperationCallbacks {
                controller: controller.clone(),
            }),
            enrichment_logger: Arc::new(EnrichmentLogger),
            state: Mutex::new(ControllerState::default()),
            changed: Notify::new(),
            shutdown: CancellationToken::new(),
        }))
    }
}

/// Drives one state machine per import operation
pub struct ImportOperationController {
    this: Weak<ImportOperationController>,
    config: ImportConfig,
    tasks: TaskManager,
    store: Arc<dyn OperationStore>,
    sources: HashMap<String, Arc<dyn ImportSource>>,
    converter: Arc<dyn DocumentConverter>,
    documents: Arc<dyn DocumentStore>,
    enrichment: EnrichmentServices,
    reporter: Arc<dyn OperationReporter>,
    callbacks: Arc<dyn CompletionHandler<ImportTask>>,
    enrichment_logger: Arc<dyn CompletionHandler<EnrichmentTask>>,
    state: Mutex<ControllerState>,
    /// Woken whenever an operation is created or finishes
    changed: Notify,
    /// Aborts retries that are still waiting out their delay
    shutdown: CancellationToken,
}

impl ImportOperationController {
    pub fn builder(
        store: Arc<dyn OperationStore>,
        converter: Arc<dyn DocumentConverter>,
        documents: Arc<dyn DocumentStore>,
    ) -> ImportOperationControllerBuilder {
        ImportOperationControllerBuilder {
            config: ImportConfig::default(),
            store,
            converter,
            documents,
            sources: HashMap::new(),
            enrichment: EnrichmentServices::default(),
            reporter: Arc::new(NoOpOperationReporter),
            tasks: None,
        }
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    pub fn task_manager(&self) -> &TaskManager {
        &self.tasks
    }

    /// Create a `PENDING` operation. It is persisted before it is returned.
    pub async fn create_operation(&self, request: NewOperation) -> ImportResult<ImporterOperation> {
        if !self.sources.contains_key(&request.importer) {
            return Err(ImportError::UnknownImporter(request.importer));
        }
        let operation = ImporterOperation::new(request);
        self.store.save(&operation).await?;

        info!(operation = %operation.id, importer = %operation.importer, "import operation created");
        self.state
            .lock()
            .await
            .operations
            .insert(operation.id, operation.clone());
        self.changed.notify_waiters();
        Ok(operation)
    }

    /// Start (or resume) an operation.
    ///
    /// Fails without touching the operation if it already has an active task
    /// or is finished.
    pub async fn perform_import(&self, id: OperationId) -> ImportResult<()> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state, id).await?;

        if state.active.contains_key(&id) {
            return Err(ImportError::AlreadyActive(id));
        }
        if let Some(operation) = state.operations.get(&id) {
            if operation.is_terminal() {
                return Err(ImportError::Terminal {
                    id,
                    status: operation.status,
                });
            }
        }

        let task = self.prepare_next(&mut state, id).await?;
        self.submit_next(&mut state, id, task)
    }

    /// Cancel an operation. Returns `false` if it was already finished.
    ///
    /// When the operation holds a live cursor, the source is asked to release
    /// it in the background.
    pub async fn cancel(&self, id: OperationId) -> ImportResult<bool> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state, id).await?;
        let (cursor, importer) = match state.operations.get(&id) {
            Some(operation) => (operation.cursor.clone(), operation.importer.clone()),
            None => return Err(ImportError::UnknownOperation(id)),
        };

        let cancelled = self
            .finish(
                &mut state,
                id,
                OperationStatus::Cancelled,
                Some("cancelled by operator".to_string()),
            )
            .await;

        if let (true, Some(cursor), Some(source)) = (cancelled, cursor, self.sources.get(&importer)) {
            let work = ImportTask::new(
                id,
                ImportTaskKind::Cancel { cursor },
                Arc::clone(source),
                Arc::clone(&self.documents),
            );
            let task = Arc::new(Task::with_priority(work, self.config.task_priority));
            if let Err(err) = self
                .tasks
                .submit_with_handler(task, Arc::new(CursorReleaseLogger))
            {
                warn!(operation = %id, "could not submit cursor release: {err}");
            }
        }
        Ok(cancelled)
    }

    /// Fail an operation permanently. Returns `false` if it was already
    /// finished.
    pub async fn fail(&self, id: OperationId, reason: impl Into<String>) -> ImportResult<bool> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state, id).await?;
        Ok(self
            .finish(&mut state, id, OperationStatus::Failed, Some(reason.into()))
            .await)
    }

    /// End an operation cleanly. Returns `false` if it was already finished.
    pub async fn terminate(&self, id: OperationId) -> ImportResult<bool> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state, id).await?;
        Ok(self
            .finish(&mut state, id, OperationStatus::Terminated, None)
            .await)
    }

    /// Resume every operation whose stored status is `RUNNING`.
    ///
    /// Called once on process start; each operation continues at its stored
    /// cursor.
    pub async fn recover_running_operations(&self) -> ImportResult<RecoveryStats> {
        let running = self.store.find_by_status(OperationStatus::Running).await?;
        let mut stats = RecoveryStats::default();

        for operation in running {
            let id = operation.id;
            self.state
                .lock()
                .await
                .operations
                .entry(id)
                .or_insert(operation);

            match self.perform_import(id).await {
                Ok(()) => {
                    info!(operation = %id, "recovered running import operation");
                    stats.recovered += 1;
                }
                Err(err) => {
                    warn!(operation = %id, "could not recover import operation: {err}");
                    stats.failed += 1;
                }
            }
        }

        info!(
            recovered = stats.recovered,
            failed = stats.failed,
            "import recovery finished"
        );
        Ok(stats)
    }

    /// A snapshot of an operation, loaded from the store if needed
    pub async fn operation(&self, id: OperationId) -> ImportResult<ImporterOperation> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state, id).await?;
        state
            .operations
            .get(&id)
            .cloned()
            .ok_or(ImportError::UnknownOperation(id))
    }

    /// Snapshots of all operations known to this controller, oldest first
    pub async fn operations(&self) -> Vec<ImporterOperation> {
        let state = self.state.lock().await;
        let mut operations: Vec<_> = state.operations.values().cloned().collect();
        operations.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        operations
    }

    pub async fn operations_for(&self, importer: &str) -> Vec<ImporterOperation> {
        let mut operations = self.operations().await;
        operations.retain(|operation| operation.importer == importer);
        operations
    }

    pub async fn is_active(&self, id: OperationId) -> bool {
        self.state.lock().await.active.contains_key(&id)
    }

    /// The task currently registered for an operation
    pub async fn active_task(&self, id: OperationId) -> Option<TaskId> {
        self.state.lock().await.active.get(&id).map(|task| task.id())
    }

    /// Wait until an operation reaches a terminal status
    pub async fn wait_until_finished(&self, id: OperationId) -> ImportResult<ImporterOperation> {
        loop {
            let mut notified = std::pin::pin!(self.changed.notified());
            notified.as_mut().enable();
            {
                let mut state = self.state.lock().await;
                self.ensure_loaded(&mut state, id).await?;
                if let Some(operation) = state.operations.get(&id) {
                    if operation.is_terminal() {
                        return Ok(operation.clone());
                    }
                }
            }
            notified.await;
        }
    }

    /// Stop the task manager. Running operations keep their stored `RUNNING`
    /// status and are picked up by the next recovery.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tasks.shutdown().await;
    }

    async fn ensure_loaded(&self, state: &mut ControllerState, id: OperationId) -> ImportResult<()> {
        if state.operations.contains_key(&id) {
            return Ok(());
        }
        match self.store.load(id).await? {
            Some(operation) => {
                state.operations.insert(id, operation);
                Ok(())
            }
            None => Err(ImportError::UnknownOperation(id)),
        }
    }

    /// Persist the operation as `RUNNING` and register its next fetch as the
    /// active task, without submitting it yet
    async fn prepare_next(
        &self,
        state: &mut ControllerState,
        id: OperationId,
    ) -> ImportResult<Arc<Task<ImportTask>>> {
        let current = state
            .operations
            .get(&id)
            .ok_or(ImportError::UnknownOperation(id))?;
        let source = self
            .sources
            .get(&current.importer)
            .cloned()
            .ok_or_else(|| ImportError::UnknownImporter(current.importer.clone()))?;
        let kind = select_task_kind(current);

        let mut next = current.clone();
        next.status = OperationStatus::Running;
        next.touch();
        self.store.save(&next).await?;
        state.operations.insert(id, next);

        let work = ImportTask::new(id, kind, source, Arc::clone(&self.documents));
        let task = Arc::new(Task::with_priority(work, self.config.task_priority));
        state.active.insert(id, Arc::clone(&task));
        Ok(task)
    }

    /// Hand the registered task to the task manager
    fn submit_next(
        &self,
        state: &mut ControllerState,
        id: OperationId,
        task: Arc<Task<ImportTask>>,
    ) -> ImportResult<()> {
        debug!(operation = %id, task = %task.name(), "dispatching import task");
        if let Err(err) = self
            .tasks
            .submit_with_handler(task, Arc::clone(&self.callbacks))
        {
            state.active.remove(&id);
            return Err(err.into());
        }
        if let Some(operation) = state.operations.get(&id) {
            self.reporter.on_dispatched(operation);
        }
        Ok(())
    }

    /// Continue an operation from a completion callback. With a non-zero
    /// `delay` the fetch is submitted once the delay has passed, so that no
    /// worker sits idle meanwhile.
    async fn continue_with(&self, state: &mut ControllerState, id: OperationId, delay: Duration) {
        let result = match self.prepare_next(state, id).await {
            Ok(task) if delay.is_zero() => self.submit_next(state, id, task),
            Ok(task) => {
                self.submit_after(id, task, delay);
                Ok(())
            }
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            self.abandon_dispatch(state, id, err).await;
        }
    }

    fn submit_after(&self, id: OperationId, task: Arc<Task<ImportTask>>, delay: Duration) {
        let controller = self.this.clone();
        let shutdown = self.shutdown.clone();
        debug!(operation = %id, delay_ms = millis(delay), "delaying import task");

        tokio::spawn(async move {
            let cancelled = task.cancellation_token().clone();
            let elapsed = tokio::select! {
                _ = cancelled.cancelled() => return,
                _ = shutdown.cancelled() => false,
                _ = tokio::time::sleep(delay) => true,
            };
            let Some(controller) = controller.upgrade() else {
                return;
            };

            let mut state = controller.state.lock().await;
            if !state.is_registered(id, &task) {
                return;
            }
            let result = if elapsed {
                controller.submit_next(&mut state, id, task)
            } else {
                Err(ImportError::from(DispatchError::ShutDown))
            };
            if let Err(err) = result {
                controller.abandon_dispatch(&mut state, id, err).await;
            }
        });
    }

    /// Drop the active task of an operation whose next fetch could not be
    /// submitted. After shutdown the operation stays `RUNNING` so that the
    /// next recovery resumes it, otherwise it fails.
    async fn abandon_dispatch(&self, state: &mut ControllerState, id: OperationId, err: ImportError) {
        state.active.remove(&id);
        if is_shut_down(&err) || self.shutdown.is_cancelled() {
            info!(operation = %id, "task manager is shut down, operation stays running");
            return;
        }
        error!(operation = %id, "could not dispatch next import task: {err}");
        self.finish(state, id, OperationStatus::Failed, Some(err.to_string()))
            .await;
    }

    async fn on_completed(&self, task: &Arc<Task<ImportTask>>) {
        let id = task.work().operation_id();
        let Some(batch) = task.result() else {
            return;
        };
        let status = batch.response.status();

        let params = {
            let mut state = self.state.lock().await;
            if !state.is_registered(id, task) {
                debug!(operation = %id, "ignoring completion of an inactive task");
                return;
            }
            let Some(operation) = state.operations.get_mut(&id) else {
                return;
            };
            operation.run_time_millis += millis(task.duration());
            if let Some(message) = &batch.response.metadata.message {
                operation.message = Some(message.clone());
            }
            let params = ConversionParams {
                source_name: batch
                    .source_name
                    .clone()
                    .unwrap_or_else(|| operation.importer.clone()),
                force_update: operation.update_existing,
                update_citations: operation.update_citations,
                citations_only: operation.is_citations_only(),
            };

            match status {
                ImportStatus::Busy | ImportStatus::Error => {
                    let reason = batch
                        .response
                        .metadata
                        .message
                        .clone()
                        .unwrap_or_else(|| format!("import source reported {status:?}"));
                    self.retry(&mut state, id, reason).await;
                    return;
                }
                ImportStatus::NotSupported => {
                    self.finish(
                        &mut state,
                        id,
                        OperationStatus::Failed,
                        Some("import source does not support this operation".to_string()),
                    )
                    .await;
                    return;
                }
                ImportStatus::NotFound => {
                    self.finish(&mut state, id, OperationStatus::Terminated, None)
                        .await;
                    return;
                }
                ImportStatus::Working | ImportStatus::Done => params,
            }
        };

        // Conversion can be slow, the lock is not held meanwhile
        let summary = self.integrate(id, &batch.response.data, &params).await;

        let mut state = self.state.lock().await;
        if !state.is_registered(id, task) {
            info!(
                operation = %id,
                integrated = summary.integrated,
                "operation stopped while its batch was integrated"
            );
            return;
        }
        let snapshot = match state.operations.get_mut(&id) {
            Some(operation) => {
                apply_batch(operation, &batch, &summary);
                operation.touch();
                operation.clone()
            }
            None => return,
        };

        if let Err(err) = self.store.save(&snapshot).await {
            error!(operation = %id, "failed to persist import progress: {err}");
            self.retry(&mut state, id, format!("failed to persist progress: {err}"))
                .await;
            return;
        }
        self.reporter.on_progress(&snapshot);

        if !params.citations_only {
            self.enrich(&summary.versions, snapshot.download_files);
        }

        let reimport_in_progress = snapshot.reimport_all && batch.reimported.is_some();
        if status == ImportStatus::Working || reimport_in_progress {
            self.continue_with(&mut state, id, Duration::ZERO).await;
        } else {
            self.finish(&mut state, id, OperationStatus::Terminated, None)
                .await;
        }
    }

    async fn on_failed(&self, task: &Arc<Task<ImportTask>>, error: &TaskError<FetchError>) {
        let id = task.work().operation_id();
        let mut state = self.state.lock().await;
        if !state.is_registered(id, task) {
            debug!(operation = %id, "ignoring failure of an inactive task");
            return;
        }
        if let Some(operation) = state.operations.get_mut(&id) {
            operation.run_time_millis += millis(task.duration());
        }
        self.retry(&mut state, id, error.to_string()).await;
    }

    /// Count a transient failure and either re-dispatch at the unchanged
    /// cursor or fail the operation once `max_retries` is reached
    async fn retry(&self, state: &mut ControllerState, id: OperationId, reason: String) {
        let Some(operation) = state.operations.get_mut(&id) else {
            return;
        };
        operation.retry_count += 1;
        operation.message = Some(reason.clone());
        let retry_count = operation.retry_count;
        let max_retries = self.config.max_retries;

        if retry_count < max_retries {
            warn!(operation = %id, retry_count, max_retries, "import attempt failed, retrying: {reason}");
            self.continue_with(state, id, self.config.retry_delay())
                .await;
        } else {
            error!(operation = %id, retry_count, "import failed permanently: {reason}");
            self.finish(state, id, OperationStatus::Failed, Some(reason))
                .await;
        }
    }

    /// Move an operation into a terminal status. Returns `false` (and does
    /// nothing) if it already is in one.
    async fn finish(
        &self,
        state: &mut ControllerState,
        id: OperationId,
        status: OperationStatus,
        message: Option<String>,
    ) -> bool {
        let Some(operation) = state.operations.get_mut(&id) else {
            return false;
        };
        if operation.is_terminal() {
            return false;
        }
        operation.status = status;
        if message.is_some() {
            operation.message = message;
        }
        operation.touch();
        let snapshot = operation.clone();

        if let Err(err) = self.store.save(&snapshot).await {
            error!(operation = %id, %status, "failed to persist final operation status: {err}");
        }
        if let Some(task) = state.active.remove(&id) {
            // A retry waiting out its delay is not tracked by the manager yet
            if !self.tasks.cancel(task.id()) {
                task.cancel();
            }
        }

        info!(
            operation = %id,
            %status,
            received = snapshot.documents_received,
            integrated = snapshot.documents_integrated,
            "import operation finished"
        );
        self.reporter.on_finished(&snapshot);
        self.changed.notify_waiters();
        true
    }

    /// Convert every raw document, isolating per-document failures
    async fn integrate(
        &self,
        id: OperationId,
        data: &[serde_json::Value],
        params: &ConversionParams,
    ) -> IntegrationSummary {
        let mut summary = IntegrationSummary::default();
        for (index, raw) in data.iter().enumerate() {
            let outcome = self
                .converter
                .convert(
                    raw,
                    &params.source_name,
                    params.force_update,
                    params.update_citations,
                )
                .await;
            match outcome {
                Ok(ConversionOutcome::Integrated(version)) => {
                    summary.integrated += 1;
                    summary.versions.push(version);
                }
                Ok(ConversionOutcome::Duplicate) => summary.duplicates += 1,
                Err(err) => {
                    warn!(operation = %id, index, "skipping document that failed to convert: {err}");
                    summary.failed += 1;
                }
            }
        }
        debug!(
            operation = %id,
            integrated = summary.integrated,
            duplicates = summary.duplicates,
            failed = summary.failed,
            "batch integrated"
        );
        summary
    }

    /// Submit enrichment for new versions without waiting for it
    fn enrich(&self, versions: &[DocumentVersion], download_files: bool) {
        if self.enrichment.is_empty() {
            return;
        }
        for version in versions {
            let work = EnrichmentTask::new(version.clone(), self.enrichment.clone(), download_files);
            let task = Arc::new(Task::with_priority(work, self.config.enrichment_priority));
            if let Err(err) = self
                .tasks
                .submit_with_handler(task, Arc::clone(&self.enrichment_logger))
            {
                warn!(version = %version.id, "could not submit enrichment: {err}");
            }
        }
    }
}

impl std::fmt::Debug for ImportOperationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportOperationController")
            .field("config", &self.config)
            .field("sources", &self.sources.keys().collect::<Vec<_>>())
            .field("enrichment", &self.enrichment)
            .finish_non_exhaustive()
    }
}

#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use harvest_import::{
    CacheService, ConversionError, ConversionOutcome, ConversionResult, DocumentConverter,
    DocumentStore, DocumentVersion, DocumentVersionId, EnrichmentResult, ImportConfig,
    ImportOperationController, ImportResponse, ImportSource, ImporterOperation,
    InMemoryDocumentStore, InMemoryOperationStore, OperationReporter, OperationStatus,
    OperationStore, SourceError, SourceResult,
};
use serde_json::Value;
use tokio::sync::Notify;

pub const SOURCE: &str = "scripted";

/// Install a test subscriber once; `RUST_LOG` controls the output
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn doc(id: u64) -> Value {
    serde_json::json!({ "id": id })
}

/// Poll `condition` until it holds, panicking after five seconds
pub async fn eventually<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub async fn wait_finished(
    controller: &ImportOperationController,
    operation: &ImporterOperation,
) -> ImporterOperation {
    tokio::time::timeout(
        Duration::from_secs(5),
        controller.wait_until_finished(operation.id),
    )
    .await
    .expect("operation did not finish in time")
    .expect("operation is known")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Search(Option<String>),
    Next(String),
}

pub enum Step {
    Respond(ImportResponse),
    Fail(String),
    /// Block until the gate is notified, then respond
    Wait(Arc<Notify>, ImportResponse),
}

/// An import source replaying a fixed script; an exhausted script answers
/// `DONE` without documents
pub struct ScriptedSource {
    name: String,
    steps: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<Call>>,
    released: Mutex<Vec<String>>,
}

impl ScriptedSource {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Self::named(SOURCE, steps)
    }

    pub fn named(name: &str, steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            steps: Mutex::new(steps.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
            released: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn released(&self) -> Vec<String> {
        self.released.lock().unwrap().clone()
    }

    async fn play(&self, call: Call) -> SourceResult<ImportResponse> {
        self.calls.lock().unwrap().push(call);
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            None => Ok(ImportResponse::done()),
            Some(Step::Respond(response)) => Ok(response),
            Some(Step::Fail(reason)) => Err(SourceError::Unavailable(reason)),
            Some(Step::Wait(gate, response)) => {
                gate.notified().await;
                Ok(response)
            }
        }
    }
}

#[async_trait::async_trait]
impl ImportSource for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, query: Option<&str>) -> SourceResult<ImportResponse> {
        self.play(Call::Search(query.map(str::to_string))).await
    }

    async fn next(&self, cursor: &str) -> SourceResult<ImportResponse> {
        self.play(Call::Next(cursor.to_string())).await
    }

    async fn cancel(&self, cursor: &str) -> SourceResult<()> {
        self.released.lock().unwrap().push(cursor.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConvertCall {
    pub raw: Value,
    pub source_name: String,
    pub force_update: bool,
    pub update_citations: bool,
}

/// Integrates every document as a new version, except `{"duplicate": true}`
/// (a duplicate) and `{"malformed": true}` (an error). With a gate, every
/// conversion waits for a notification after it was recorded.
#[derive(Default)]
pub struct MockConverter {
    next_id: AtomicU64,
    calls: Mutex<Vec<ConvertCall>>,
    gate: Option<Arc<Notify>>,
}

impl MockConverter {
    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<ConvertCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl DocumentConverter for MockConverter {
    async fn convert(
        &self,
        raw: &Value,
        source_name: &str,
        force_update: bool,
        update_citations: bool,
    ) -> ConversionResult<ConversionOutcome> {
        self.calls.lock().unwrap().push(ConvertCall {
            raw: raw.clone(),
            source_name: source_name.to_string(),
            force_update,
            update_citations,
        });
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if raw.get("malformed").is_some() {
            return Err(ConversionError::Malformed("missing title".into()));
        }
        if raw.get("duplicate").is_some() {
            return Ok(ConversionOutcome::Duplicate);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ConversionOutcome::Integrated(DocumentVersion {
            id: DocumentVersionId(id),
            document_id: id * 10,
            source_name: source_name.to_string(),
            file_urls: Vec::new(),
        }))
    }
}

/// Records the versions handed to the cache service
#[derive(Default)]
pub struct RecordingCache {
    versions: Mutex<Vec<DocumentVersionId>>,
}

impl RecordingCache {
    pub fn versions(&self) -> Vec<DocumentVersionId> {
        let mut versions = self.versions.lock().unwrap().clone();
        versions.sort();
        versions
    }
}

#[async_trait::async_trait]
impl CacheService for RecordingCache {
    async fn copy_cached_files(&self, version: &DocumentVersion) -> EnrichmentResult<()> {
        self.versions.lock().unwrap().push(version.id);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Dispatched,
    Progress,
    Finished(OperationStatus),
}

#[derive(Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<Event>>,
}

impl RecordingReporter {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

impl OperationReporter for RecordingReporter {
    fn on_dispatched(&self, _operation: &ImporterOperation) {
        self.events.lock().unwrap().push(Event::Dispatched);
    }

    fn on_progress(&self, _operation: &ImporterOperation) {
        self.events.lock().unwrap().push(Event::Progress);
    }

    fn on_finished(&self, operation: &ImporterOperation) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Finished(operation.status));
    }
}

/// Everything a controller test needs to observe
pub struct Harness {
    pub controller: Arc<ImportOperationController>,
    pub source: Arc<ScriptedSource>,
    pub converter: Arc<MockConverter>,
    pub store: Arc<dyn OperationStore>,
    pub cache: Arc<RecordingCache>,
    pub reporter: Arc<RecordingReporter>,
}

pub struct HarnessBuilder {
    source: Arc<ScriptedSource>,
    store: Arc<dyn OperationStore>,
    documents: Arc<dyn DocumentStore>,
    config: ImportConfig,
    converter_gate: Option<Arc<Notify>>,
}

impl HarnessBuilder {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        init_tracing();
        Self {
            source: ScriptedSource::new(steps),
            store: Arc::new(InMemoryOperationStore::new()),
            documents: Arc::new(InMemoryDocumentStore::new()),
            config: ImportConfig::for_testing(),
            converter_gate: None,
        }
    }

    pub fn store(mut self, store: Arc<dyn OperationStore>) -> Self {
        self.store = store;
        self
    }

    pub fn documents(mut self, documents: Arc<dyn DocumentStore>) -> Self {
        self.documents = documents;
        self
    }

    pub fn config(mut self, config: ImportConfig) -> Self {
        self.config = config;
        self
    }

    /// Block every conversion until `gate` is notified
    pub fn converter_gate(mut self, gate: Arc<Notify>) -> Self {
        self.converter_gate = Some(gate);
        self
    }

    pub fn build(self) -> Harness {
        let converter = Arc::new(match self.converter_gate {
            Some(gate) => MockConverter::gated(gate),
            None => MockConverter::default(),
        });
        let cache = Arc::new(RecordingCache::default());
        let reporter = Arc::new(RecordingReporter::default());

        let controller = ImportOperationController::builder(
            Arc::clone(&self.store),
            converter.clone(),
            self.documents,
        )
        .with_config(self.config)
        .with_source(self.source.clone())
        .with_enrichment(harvest_import::EnrichmentServices::new().with_cache(cache.clone()))
        .with_reporter(reporter.clone())
        .build()
        .expect("valid controller configuration");

        Harness {
            controller,
            source: self.source,
            converter,
            store: self.store,
            cache,
            reporter,
        }
    }
}

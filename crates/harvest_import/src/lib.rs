//! Harvest import - resumable import operations on top of `harvest_tasks`
//!
//! An [`ImporterOperation`] pulls documents from an [`ImportSource`] one page
//! at a time. The [`ImportOperationController`] submits a fetch task per
//! page, converts the fetched documents through a [`DocumentConverter`],
//! persists progress in an [`OperationStore`] and schedules best-effort
//! enrichment of every new document version. Transient source failures are
//! retried at the same cursor up to [`ImportConfig::max_retries`] times, and
//! operations that were running when the process stopped are resumed by
//! [`ImportOperationController::recover_running_operations`].

pub mod config;
pub mod controller;
pub mod conversion;
pub mod enrichment;
pub mod error;
pub mod operation;
pub mod reporter;
pub mod response;
pub mod source;
pub mod store;
pub mod tasks;

pub use config::ImportConfig;
pub use controller::{ImportOperationController, ImportOperationControllerBuilder, RecoveryStats};
pub use conversion::{
    ConversionOutcome, DocumentConverter, DocumentStore, DocumentVersion, DocumentVersionId,
    InMemoryDocumentStore, StoredDocument,
};
pub use enrichment::{
    CacheService, EnrichmentLogger, EnrichmentServices, EnrichmentTask, FileDownloader,
    HttpFileDownloader, UrlResolver,
};
pub use error::{
    ConversionError, ConversionResult, EnrichmentError, EnrichmentResult, FetchError,
    ImportConfigError, ImportError, ImportResult, SourceError, SourceResult, StoreError,
    StoreResult,
};
pub use operation::{ImporterOperation, NewOperation, OperationId, OperationStatus};
pub use reporter::{NoOpOperationReporter, OperationReporter};
pub use response::{ImportMetadata, ImportResponse, ImportStatus};
pub use source::{HttpImportSource, ImportSource};
pub use store::{InMemoryOperationStore, JsonFileOperationStore, OperationStore};
pub use tasks::{select_task_kind, ImportBatch, ImportTask, ImportTaskKind};

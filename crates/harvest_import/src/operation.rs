//! The import operation model

use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::conversion::DocumentVersionId;

/// Unique identifier for an import operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(pub Uuid);

impl OperationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for OperationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of an import operation.
///
/// `Cancelled`, `Failed` and `Terminated` are terminal: an operation in one
/// of those states is never mutated again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    Pending,
    Running,
    Cancelled,
    Failed,
    Terminated,
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationStatus::Cancelled | OperationStatus::Failed | OperationStatus::Terminated
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "PENDING",
            OperationStatus::Running => "RUNNING",
            OperationStatus::Cancelled => "CANCELLED",
            OperationStatus::Failed => "FAILED",
            OperationStatus::Terminated => "TERMINATED",
        }
    }
}

impl Display for OperationStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator request for a new import operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewOperation {
    /// Name of the import source to fetch from
    pub importer: String,
    /// Search query used by the initial fetch
    pub query: Option<String>,
    pub update_existing: bool,
    pub update_citations: bool,
    pub reimport_all: bool,
    pub download_files: bool,
}

impl NewOperation {
    pub fn new(importer: impl Into<String>) -> Self {
        Self {
            importer: importer.into(),
            ..Self::default()
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_update_existing(mut self, update_existing: bool) -> Self {
        self.update_existing = update_existing;
        self
    }

    pub fn with_update_citations(mut self, update_citations: bool) -> Self {
        self.update_citations = update_citations;
        self
    }

    pub fn with_reimport_all(mut self, reimport_all: bool) -> Self {
        self.reimport_all = reimport_all;
        self
    }

    pub fn with_download_files(mut self, download_files: bool) -> Self {
        self.download_files = download_files;
        self
    }
}

/// One long-lived, resumable import against one import source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImporterOperation {
    pub id: OperationId,
    pub importer: String,
    pub status: OperationStatus,
    pub query: Option<String>,

    /// Where the next fetch continues
    pub cursor: Option<String>,
    /// Kept for audit; never read back when resuming
    pub last_cursor: Option<String>,

    pub retry_count: u32,
    pub run_time_millis: u64,

    pub documents_received: u64,
    pub documents_integrated: u64,
    pub total_document_count: u64,

    pub update_existing: bool,
    pub update_citations: bool,
    pub reimport_all: bool,
    pub download_files: bool,

    /// Highest document version integrated so far (the watermark)
    pub last_imported_document_version_id: Option<DocumentVersionId>,
    /// Last stored document processed by a reimport scan
    pub last_reimport_document_version_id: Option<DocumentVersionId>,

    /// Latest message reported by the importer or the controller
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ImporterOperation {
    /// Create a `PENDING` operation from an operator request
    pub fn new(request: NewOperation) -> Self {
        let now = Utc::now();
        Self {
            id: OperationId::new(),
            importer: request.importer,
            status: OperationStatus::Pending,
            query: request.query,
            cursor: None,
            last_cursor: None,
            retry_count: 0,
            run_time_millis: 0,
            documents_received: 0,
            documents_integrated: 0,
            total_document_count: 0,
            update_existing: request.update_existing,
            update_citations: request.update_citations,
            reimport_all: request.reimport_all,
            download_files: request.download_files,
            last_imported_document_version_id: None,
            last_reimport_document_version_id: None,
            message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// A reimport pass that only refreshes citations. Such a pass skips
    /// downstream enrichment.
    pub fn is_citations_only(&self) -> bool {
        self.reimport_all && self.update_citations && !self.update_existing
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

//! Fetch tasks submitted for import operations

use std::sync::Arc;

use harvest_tasks::TaskWork;
use tracing::debug;

use crate::conversion::{DocumentStore, DocumentVersionId, StoredDocument};
use crate::error::FetchError;
use crate::operation::{ImporterOperation, OperationId};
use crate::response::ImportResponse;
use crate::source::ImportSource;

/// What a fetch task does, chosen from the shape of an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportTaskKind {
    /// Initial fetch of a new import
    Search { query: Option<String> },
    /// Continue at a cursor returned by an earlier fetch
    Continue { cursor: String },
    /// Re-process the next stored document after `after`
    Reimport { after: Option<DocumentVersionId> },
    /// Release the remote cursor of a cancelled operation
    Cancel { cursor: String },
}

impl ImportTaskKind {
    pub fn label(&self) -> &'static str {
        match self {
            ImportTaskKind::Search { .. } => "search",
            ImportTaskKind::Continue { .. } => "continue",
            ImportTaskKind::Reimport { .. } => "reimport",
            ImportTaskKind::Cancel { .. } => "cancel",
        }
    }
}

/// Choose the next fetch for an operation.
///
/// A live cursor always wins, then a reimport scan, then a fresh search.
pub fn select_task_kind(operation: &ImporterOperation) -> ImportTaskKind {
    if let Some(cursor) = &operation.cursor {
        ImportTaskKind::Continue {
            cursor: cursor.clone(),
        }
    } else if operation.reimport_all {
        ImportTaskKind::Reimport {
            after: operation.last_reimport_document_version_id,
        }
    } else {
        ImportTaskKind::Search {
            query: operation.query.clone(),
        }
    }
}

/// Output of a fetch task
#[derive(Debug, Clone, PartialEq)]
pub struct ImportBatch {
    pub response: ImportResponse,
    /// The stored document a reimport scan picked up
    pub reimported: Option<DocumentVersionId>,
    /// Source the reimported document was originally imported from
    pub source_name: Option<String>,
}

impl ImportBatch {
    pub fn fetched(response: ImportResponse) -> Self {
        Self {
            response,
            reimported: None,
            source_name: None,
        }
    }

    /// A single stored document, converted again under its own source
    pub fn reimport(document: StoredDocument) -> Self {
        Self {
            response: ImportResponse::working(vec![document.raw]),
            reimported: Some(document.id),
            source_name: Some(document.source_name),
        }
    }
}

/// Fetches one page for an import operation
pub struct ImportTask {
    operation_id: OperationId,
    kind: ImportTaskKind,
    source: Arc<dyn ImportSource>,
    documents: Arc<dyn DocumentStore>,
}

impl ImportTask {
    pub fn new(
        operation_id: OperationId,
        kind: ImportTaskKind,
        source: Arc<dyn ImportSource>,
        documents: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            operation_id,
            kind,
            source,
            documents,
        }
    }

    pub fn operation_id(&self) -> OperationId {
        self.operation_id
    }

    pub fn kind(&self) -> &ImportTaskKind {
        &self.kind
    }
}

#[async_trait::async_trait]
impl TaskWork for ImportTask {
    type Output = ImportBatch;
    type Error = FetchError;

    async fn execute(&self) -> Result<Self::Output, Self::Error> {
        let batch = match &self.kind {
            ImportTaskKind::Search { query } => {
                ImportBatch::fetched(self.source.search(query.as_deref()).await?)
            }
            ImportTaskKind::Continue { cursor } => {
                ImportBatch::fetched(self.source.next(cursor).await?)
            }
            ImportTaskKind::Cancel { cursor } => {
                self.source.cancel(cursor).await?;
                ImportBatch::fetched(ImportResponse::done())
            }
            ImportTaskKind::Reimport { after } => {
                match self.documents.next_version_after(*after).await? {
                    Some(document) => {
                        debug!(operation = %self.operation_id, version = %document.id, "reimporting stored document");
                        ImportBatch::reimport(document)
                    }
                    None => ImportBatch::fetched(ImportResponse::done()),
                }
            }
        };
        Ok(batch)
    }

    fn name(&self) -> String {
        format!(
            "{} {} ({})",
            self.kind.label(),
            self.source.name(),
            self.operation_id
        )
    }
}

//! Contracts of the document conversion/integration service and the
//! document store used by reimport scans.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::ops::Bound;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ConversionResult, StoreResult};

/// Identifier of a stored document version, ascending in creation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentVersionId(pub u64);

impl Display for DocumentVersionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A document version produced by integrating a raw document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentVersion {
    pub id: DocumentVersionId,
    pub document_id: u64,
    pub source_name: String,
    /// Files attached to the document, fetched by the file downloader
    #[serde(default)]
    pub file_urls: Vec<Url>,
}

/// Result of converting one raw document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    /// A new version was stored
    Integrated(DocumentVersion),
    /// The document already exists; no new version was produced
    Duplicate,
}

/// Converts raw importer records and merges them into the document store
#[async_trait::async_trait]
pub trait DocumentConverter: Send + Sync {
    /// Convert and integrate one raw document.
    ///
    /// Fails with a [`crate::ConversionError`] for malformed input.
    async fn convert(
        &self,
        raw: &serde_json::Value,
        source_name: &str,
        force_update: bool,
        update_citations: bool,
    ) -> ConversionResult<ConversionOutcome>;
}

/// A stored document together with the raw record it was built from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: DocumentVersionId,
    pub source_name: String,
    pub raw: serde_json::Value,
}

/// Read access to stored documents for reimport scans
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// The first stored document with an id strictly greater than `after`,
    /// or the very first one when `after` is `None`.
    async fn next_version_after(
        &self,
        after: Option<DocumentVersionId>,
    ) -> StoreResult<Option<StoredDocument>>;
}

/// A [`DocumentStore`] kept in memory, ordered by version id
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    documents: Mutex<BTreeMap<DocumentVersionId, StoredDocument>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, document: StoredDocument) {
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(document.id, document);
    }

    pub fn len(&self) -> usize {
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<StoredDocument> for InMemoryDocumentStore {
    fn from_iter<T: IntoIterator<Item = StoredDocument>>(iter: T) -> Self {
        Self {
            documents: Mutex::new(iter.into_iter().map(|doc| (doc.id, doc)).collect()),
        }
    }
}

#[async_trait::async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn next_version_after(
        &self,
        after: Option<DocumentVersionId>,
    ) -> StoreResult<Option<StoredDocument>> {
        let lower = match after {
            Some(id) => Bound::Excluded(id),
            None => Bound::Unbounded,
        };
        let documents = self.documents.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(documents
            .range((lower, Bound::Unbounded))
            .next()
            .map(|(_, doc)| doc.clone()))
    }
}

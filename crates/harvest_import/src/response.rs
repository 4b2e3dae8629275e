//! The response contract of an import fetch

use serde::{Deserialize, Serialize};

/// Status reported by an importer for one fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportStatus {
    /// Temporarily unable to serve, retry later
    Busy,
    /// Transient importer error, retry later
    Error,
    /// More data is available
    Working,
    /// The importer cannot serve this kind of operation
    NotSupported,
    /// Nothing (more) to import
    NotFound,
    /// The import finished. Any status this client does not know decodes here.
    #[serde(other)]
    Done,
}

impl ImportStatus {
    /// Whether the status asks for a retry of the same fetch
    pub fn is_transient(&self) -> bool {
        matches!(self, ImportStatus::Busy | ImportStatus::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportMetadata {
    pub status: ImportStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_cursor: Option<String>,
    /// Documents delivered so far for this operation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ImportMetadata {
    pub fn new(status: ImportStatus) -> Self {
        Self {
            status,
            next_cursor: None,
            previous_cursor: None,
            current_count: None,
            total_count: None,
            message: None,
        }
    }
}

/// One page of raw documents plus its metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportResponse {
    pub metadata: ImportMetadata,
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
}

impl ImportResponse {
    pub fn new(status: ImportStatus) -> Self {
        Self {
            metadata: ImportMetadata::new(status),
            data: Vec::new(),
        }
    }

    /// A page of documents with more to come
    pub fn working(data: Vec<serde_json::Value>) -> Self {
        Self {
            data,
            ..Self::new(ImportStatus::Working)
        }
    }

    /// The final (possibly empty) page
    pub fn done() -> Self {
        Self::new(ImportStatus::Done)
    }

    pub fn with_data(mut self, data: Vec<serde_json::Value>) -> Self {
        self.data = data;
        self
    }

    pub fn with_next_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.metadata.next_cursor = Some(cursor.into());
        self
    }

    pub fn with_previous_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.metadata.previous_cursor = Some(cursor.into());
        self
    }

    pub fn with_counts(mut self, current: Option<u64>, total: Option<u64>) -> Self {
        self.metadata.current_count = current;
        self.metadata.total_count = total;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.metadata.message = Some(message.into());
        self
    }

    pub fn status(&self) -> ImportStatus {
        self.metadata.status
    }
}

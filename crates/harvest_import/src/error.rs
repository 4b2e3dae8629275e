//! Error types for import operations

use thiserror::Error;

use crate::conversion::DocumentVersionId;
use crate::operation::{OperationId, OperationStatus};

/// Main error type for controller operations
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Unknown import operation {0}")]
    UnknownOperation(OperationId),

    #[error("No import source registered under '{0}'")]
    UnknownImporter(String),

    #[error("Import operation {0} already has an active task")]
    AlreadyActive(OperationId),

    #[error("Import operation {id} is already finished ({status})")]
    Terminal {
        id: OperationId,
        status: OperationStatus,
    },

    #[error("Operation store error: {0}")]
    Store(#[from] StoreError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] harvest_tasks::DispatchError),

    #[error("Configuration error: {0}")]
    Config(#[from] ImportConfigError),
}

/// Errors raised by an import source
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Import source responded with HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Invalid import source URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Import source unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised while fetching a batch for an operation
#[derive(Error, Debug)]
pub enum FetchError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("Document store error: {0}")]
    Documents(#[from] StoreError),
}

/// Errors raised by the conversion/integration service for one document
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    #[error("Malformed document: {0}")]
    Malformed(String),

    #[error("Failed to integrate document: {0}")]
    Integration(String),
}

/// Errors raised by operation and document stores
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Errors raised by downstream enrichment services
#[derive(Error, Debug)]
pub enum EnrichmentError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download of {url} failed with HTTP {status}")]
    Status { status: u16, url: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Enrichment service error: {0}")]
    Service(String),

    #[error("Enrichment of version {version} incomplete: {}", failures.join("; "))]
    Incomplete {
        version: DocumentVersionId,
        failures: Vec<String>,
    },
}

/// Errors related to loading and validating the import configuration
#[derive(Error, Debug)]
pub enum ImportConfigError {
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid max_retries: {value} (must be > 0)")]
    InvalidMaxRetries { value: u32 },

    #[error("Invalid dispatcher configuration: {0}")]
    Dispatcher(#[from] harvest_tasks::ConfigError),
}

/// Result type alias for controller operations
pub type ImportResult<T> = Result<T, ImportError>;

/// Result type alias for import sources
pub type SourceResult<T> = Result<T, SourceError>;

/// Result type alias for document conversion
pub type ConversionResult<T> = Result<T, ConversionError>;

/// Result type alias for stores
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type alias for enrichment services
pub type EnrichmentResult<T> = Result<T, EnrichmentError>;

impl SourceError {
    /// Create an unexpected-status error
    pub fn status(status: u16, url: impl Into<String>) -> Self {
        SourceError::Status {
            status,
            url: url.into(),
        }
    }
}

impl StoreError {
    /// Create a backend error from any displayable cause
    pub fn backend(cause: impl std::fmt::Display) -> Self {
        StoreError::Backend(cause.to_string())
    }
}

impl EnrichmentError {
    /// Create a service error from any displayable cause
    pub fn service(cause: impl std::fmt::Display) -> Self {
        EnrichmentError::Service(cause.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let id = OperationId::new();
        let err = ImportError::Terminal {
            id,
            status: OperationStatus::Cancelled,
        };
        assert_eq!(
            err.to_string(),
            format!("Import operation {id} is already finished (CANCELLED)")
        );

        let err = EnrichmentError::Incomplete {
            version: DocumentVersionId(4),
            failures: vec!["cache: gone".into(), "download: 404".into()],
        };
        assert_eq!(
            err.to_string(),
            "Enrichment of version 4 incomplete: cache: gone; download: 404"
        );
    }

    #[test]
    fn test_from_conversions() {
        let err: ImportError = harvest_tasks::DispatchError::ShutDown.into();
        assert!(matches!(err, ImportError::Dispatch(_)));

        let err: FetchError = SourceError::status(503, "http://source/search").into();
        assert_eq!(
            err.to_string(),
            "Import source responded with HTTP 503 for http://source/search"
        );

        let err: ImportError = StoreError::backend("disk full").into();
        assert!(matches!(err, ImportError::Store(StoreError::Backend(msg)) if msg == "disk full"));
    }
}

//! Downstream enrichment of integrated document versions.
//!
//! Enrichment runs as low-priority tasks next to the import loop. Every step
//! is best-effort: a failure is logged and never stalls an operation.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use harvest_tasks::{CompletionHandler, Task, TaskError, TaskWork};
use reqwest::Client;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use url::Url;

use crate::conversion::{DocumentVersion, DocumentVersionId};
use crate::error::{EnrichmentError, EnrichmentResult};

/// Copies files that are already cached for a document version
#[async_trait::async_trait]
pub trait CacheService: Send + Sync {
    async fn copy_cached_files(&self, version: &DocumentVersion) -> EnrichmentResult<()>;
}

/// Downloads the files attached to a document version
#[async_trait::async_trait]
pub trait FileDownloader: Send + Sync {
    async fn download_files(&self, version: &DocumentVersion) -> EnrichmentResult<()>;
}

/// Resolves identifiers of a document version to URLs
#[async_trait::async_trait]
pub trait UrlResolver: Send + Sync {
    async fn resolve_urls(&self, version: &DocumentVersion) -> EnrichmentResult<()>;
}

/// The enrichment services available to the controller; any may be absent
#[derive(Clone, Default)]
pub struct EnrichmentServices {
    pub cache: Option<Arc<dyn CacheService>>,
    pub downloader: Option<Arc<dyn FileDownloader>>,
    pub resolver: Option<Arc<dyn UrlResolver>>,
}

impl EnrichmentServices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheService>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_downloader(mut self, downloader: Arc<dyn FileDownloader>) -> Self {
        self.downloader = Some(downloader);
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn UrlResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_none() && self.downloader.is_none() && self.resolver.is_none()
    }
}

impl std::fmt::Debug for EnrichmentServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrichmentServices")
            .field("cache", &self.cache.is_some())
            .field("downloader", &self.downloader.is_some())
            .field("resolver", &self.resolver.is_some())
            .finish()
    }
}

/// Enriches one document version: cache copy, optional file download and
/// URL resolution. All configured steps run even when an earlier one fails.
pub struct EnrichmentTask {
    version: DocumentVersion,
    services: EnrichmentServices,
    download_files: bool,
}

impl EnrichmentTask {
    pub fn new(version: DocumentVersion, services: EnrichmentServices, download_files: bool) -> Self {
        Self {
            version,
            services,
            download_files,
        }
    }

    pub fn version(&self) -> &DocumentVersion {
        &self.version
    }
}

#[async_trait::async_trait]
impl TaskWork for EnrichmentTask {
    type Output = DocumentVersionId;
    type Error = EnrichmentError;

    async fn execute(&self) -> Result<Self::Output, Self::Error> {
        let mut failures = Vec::new();

        if let Some(cache) = &self.services.cache {
            if let Err(err) = cache.copy_cached_files(&self.version).await {
                failures.push(format!("cache: {err}"));
            }
        }
        if self.download_files {
            if let Some(downloader) = &self.services.downloader {
                if let Err(err) = downloader.download_files(&self.version).await {
                    failures.push(format!("download: {err}"));
                }
            }
        }
        if let Some(resolver) = &self.services.resolver {
            if let Err(err) = resolver.resolve_urls(&self.version).await {
                failures.push(format!("resolve: {err}"));
            }
        }

        if failures.is_empty() {
            Ok(self.version.id)
        } else {
            Err(EnrichmentError::Incomplete {
                version: self.version.id,
                failures,
            })
        }
    }

    fn name(&self) -> String {
        format!("enrich version {}", self.version.id)
    }
}

/// Logs the outcome of enrichment tasks
#[derive(Debug, Default)]
pub struct EnrichmentLogger;

#[async_trait::async_trait]
impl CompletionHandler<EnrichmentTask> for EnrichmentLogger {
    async fn on_completed(&self, task: &Arc<Task<EnrichmentTask>>) {
        debug!(version = %task.work().version().id, "document version enriched");
    }

    async fn on_failed(&self, task: &Arc<Task<EnrichmentTask>>, error: &TaskError<EnrichmentError>) {
        warn!(version = %task.work().version().id, "enrichment failed: {error}");
    }
}

/// A [`FileDownloader`] fetching files over HTTP into a cache directory.
///
/// Files land in `<cache_dir>/doc-<document id>/<sha256 of the url>`; a file
/// that is already cached is not downloaded again.
#[derive(Debug, Clone)]
pub struct HttpFileDownloader {
    client: Client,
    cache_dir: PathBuf,
}

impl HttpFileDownloader {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self::with_client(Client::new(), cache_dir)
    }

    pub fn with_client(client: Client, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            cache_dir: cache_dir.into(),
        }
    }

    /// Where the file for `url` of `version` is cached
    pub fn cache_path(&self, version: &DocumentVersion, url: &Url) -> PathBuf {
        let digest = Sha256::digest(url.as_str().as_bytes());
        self.cache_dir
            .join(format!("doc-{}", version.document_id))
            .join(format!("{digest:x}"))
    }

    /// Download every file of `version`, returning the cached paths
    pub async fn download(&self, version: &DocumentVersion) -> EnrichmentResult<Vec<PathBuf>> {
        let mut paths = Vec::with_capacity(version.file_urls.len());
        for url in &version.file_urls {
            let target = self.cache_path(version, url);
            if target.exists() {
                debug!(%url, "file already cached");
                paths.push(target);
                continue;
            }

            let response = self.client.get(url.clone()).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(EnrichmentError::Status {
                    status: status.as_u16(),
                    url: url.to_string(),
                });
            }
            let bytes = response.bytes().await?;

            let destination = target.clone();
            tokio::task::spawn_blocking(move || persist_file(&destination, &bytes))
                .await
                .map_err(EnrichmentError::service)??;
            debug!(%url, path = %target.display(), "file downloaded");
            paths.push(target);
        }
        Ok(paths)
    }
}

fn persist_file(target: &Path, contents: &[u8]) -> EnrichmentResult<()> {
    let dir = target
        .parent()
        .ok_or_else(|| EnrichmentError::service("cache path has no parent directory"))?;
    fs_err::create_dir_all(dir)?;
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(contents)?;
    file.persist(target).map_err(|err| EnrichmentError::Io(err.error))?;
    Ok(())
}

#[async_trait::async_trait]
impl FileDownloader for HttpFileDownloader {
    async fn download_files(&self, version: &DocumentVersion) -> EnrichmentResult<()> {
        self.download(version).await.map(|_| ())
    }
}

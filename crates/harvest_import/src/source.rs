//! Import sources: where raw documents are fetched from

use reqwest::{Client, Method, RequestBuilder};
use tracing::debug;
use url::Url;

use crate::error::{SourceError, SourceResult};
use crate::response::ImportResponse;

/// An external source of raw documents, fetched page by page
#[async_trait::async_trait]
pub trait ImportSource: Send + Sync {
    /// The name operations use to refer to this source
    fn name(&self) -> &str;

    /// Start a new fetch, optionally narrowed by a query
    async fn search(&self, query: Option<&str>) -> SourceResult<ImportResponse>;

    /// Continue a fetch at `cursor`
    async fn next(&self, cursor: &str) -> SourceResult<ImportResponse>;

    /// Release the remote state held for `cursor`
    async fn cancel(&self, _cursor: &str) -> SourceResult<()> {
        Ok(())
    }
}

/// An [`ImportSource`] speaking JSON over HTTP.
///
/// Routes, relative to the base URL:
/// - `GET search?query=...` starts a fetch
/// - `GET records?cursor=...` continues a fetch
/// - `DELETE records?cursor=...` releases a cursor
#[derive(Debug, Clone)]
pub struct HttpImportSource {
    name: String,
    base_url: Url,
    client: Client,
}

impl HttpImportSource {
    pub fn new(name: impl Into<String>, base_url: Url) -> Self {
        Self::with_client(name, base_url, Client::new())
    }

    pub fn with_client(name: impl Into<String>, mut base_url: Url, client: Client) -> Self {
        // `Url::join` replaces the last path segment unless the base ends in `/`
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            name: name.into(),
            base_url,
            client,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn request(&self, method: Method, route: &str) -> SourceResult<RequestBuilder> {
        let url = self.base_url.join(route)?;
        Ok(self.client.request(method, url))
    }

    async fn fetch(&self, request: RequestBuilder) -> SourceResult<ImportResponse> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::status(status.as_u16(), response.url().as_str()));
        }
        let response = response.json::<ImportResponse>().await?;
        debug!(
            source = %self.name,
            status = ?response.status(),
            documents = response.data.len(),
            "fetched import page"
        );
        Ok(response)
    }
}

#[async_trait::async_trait]
impl ImportSource for HttpImportSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, query: Option<&str>) -> SourceResult<ImportResponse> {
        let mut request = self.request(Method::GET, "search")?;
        if let Some(query) = query {
            request = request.query(&[("query", query)]);
        }
        self.fetch(request).await
    }

    async fn next(&self, cursor: &str) -> SourceResult<ImportResponse> {
        let request = self
            .request(Method::GET, "records")?
            .query(&[("cursor", cursor)]);
        self.fetch(request).await
    }

    async fn cancel(&self, cursor: &str) -> SourceResult<()> {
        let response = self
            .request(Method::DELETE, "records")?
            .query(&[("cursor", cursor)])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::status(status.as_u16(), response.url().as_str()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let source =
            HttpImportSource::new("crossref", Url::parse("http://localhost:8080/api").unwrap());
        assert_eq!(source.base_url().as_str(), "http://localhost:8080/api/");
        assert_eq!(
            source.base_url().join("records").unwrap().as_str(),
            "http://localhost:8080/api/records"
        );
        assert_eq!(source.name(), "crossref");
    }
}

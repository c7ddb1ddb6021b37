use std::io::Write;
use std::time::Duration;

use prim_sync::{
    ConditionalHeaders, FetchOutcome, FetchRequest, Fetcher, HashingWriter, Replacement, SyncError,
};
use reqwest::StatusCode;
use reqwest::header::{ETAG, HeaderMap, HeaderName, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use tracing::debug;

use crate::discovery::extract_spec_url;

/// Settings for [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Whole-request timeout, body included.
    pub timeout: Duration,
    /// Bearer token for resources that require it.
    pub token: Option<String>,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            token: None,
            user_agent: concat!("prim-sync/", env!("CARGO_PKG_VERSION")).to_owned(),
        }
    }
}

/// Conditional-GET transport over `reqwest`. Redirects are followed and the
/// final URL is reported as the source URL.
pub struct HttpFetcher {
    client: reqwest::Client,
    token: Option<String>,
}

impl HttpFetcher {
    pub fn new(config: HttpConfig) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent)
            .build()
            .map_err(|e| SyncError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            token: config.token.filter(|t| !t.is_empty()),
        })
    }

    fn get(&self, url: &str, authorize: bool) -> reqwest::RequestBuilder {
        let request = self.client.get(url);
        if !authorize {
            return request;
        }
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => {
                debug!(url = %url, "no token configured, sending unauthenticated");
                request
            }
        }
    }

    /// GET a JSON document. Used for schemas and portal metadata.
    pub async fn get_json(
        &self,
        url: &str,
        authorize: bool,
    ) -> Result<serde_json::Value, SyncError> {
        let response = self
            .get(url, authorize)
            .send()
            .await
            .map_err(network_error)?;
        let response = require_success(response)?;
        response
            .json()
            .await
            .map_err(|e| SyncError::Network(format!("invalid JSON from {url}: {e}")))
    }

    async fn try_fetch(
        &self,
        request: FetchRequest<'_>,
        sink: &mut (dyn Write + Send),
    ) -> Result<FetchOutcome, SyncError> {
        let conditional = ConditionalHeaders::from_prior(request.prior);
        let mut builder = self.get(request.url, request.authorize);
        if let Some(etag) = &conditional.if_none_match {
            builder = builder.header(IF_NONE_MATCH, etag.as_str());
        }
        if let Some(since) = &conditional.if_modified_since {
            builder = builder.header(IF_MODIFIED_SINCE, since.as_str());
        }

        debug!(url = %request.url, conditional = conditional.is_conditional(), "GET");
        let response = builder.send().await.map_err(network_error)?;

        if response.status() == StatusCode::NOT_MODIFIED {
            return Ok(FetchOutcome::Unchanged);
        }
        let mut response = require_success(response)?;

        let source_url = response.url().to_string();
        let etag = header_value(response.headers(), &ETAG);
        let last_modified = header_value(response.headers(), &LAST_MODIFIED);

        let mut writer = HashingWriter::new(sink);
        while let Some(chunk) = response.chunk().await.map_err(network_error)? {
            writer
                .write_chunked(&chunk)
                .map_err(|e| SyncError::storage("failed to write payload", e))?;
        }
        let (_, content_hash, bytes) = writer
            .finish()
            .map_err(|e| SyncError::storage("failed to flush payload", e))?;

        debug!(url = %source_url, bytes, "body received");
        Ok(FetchOutcome::Replaced(Replacement {
            source_url,
            etag,
            last_modified,
            content_hash,
            bytes,
        }))
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        request: FetchRequest<'_>,
        sink: &mut (dyn Write + Send),
    ) -> FetchOutcome {
        match self.try_fetch(request, sink).await {
            Ok(outcome) => outcome,
            Err(e) => FetchOutcome::Failed(e),
        }
    }

    async fn discover_spec_url(
        &self,
        page_url: &str,
        authorize: bool,
    ) -> Result<Option<String>, SyncError> {
        let response = self
            .get(page_url, authorize)
            .send()
            .await
            .map_err(network_error)?;
        let html = require_success(response)?
            .text()
            .await
            .map_err(network_error)?;
        Ok(extract_spec_url(&html))
    }
}

fn require_success(response: reqwest::Response) -> Result<reqwest::Response, SyncError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(SyncError::UnexpectedStatus {
            status: status.as_u16(),
        })
    }
}

fn header_value(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

fn network_error(e: reqwest::Error) -> SyncError {
    if e.is_timeout() {
        SyncError::Network(format!("request timed out: {e}"))
    } else {
        SyncError::Network(e.to_string())
    }
}

use std::io::Write;

use crate::metadata::CacheMetadata;
use crate::sync::SyncError;

/// A single conditional GET to perform.
#[derive(Debug, Clone, Copy)]
pub struct FetchRequest<'a> {
    pub url: &'a str,
    /// Sidecar from the previous successful fetch, if any.
    pub prior: Option<&'a CacheMetadata>,
    /// Attach the bearer token to this request.
    pub authorize: bool,
}

/// Cache validators to send with a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionalHeaders {
    pub if_none_match: Option<String>,
    pub if_modified_since: Option<String>,
}

impl ConditionalHeaders {
    /// Both validators are sent when both are known; none without a prior record.
    pub fn from_prior(prior: Option<&CacheMetadata>) -> Self {
        match prior {
            Some(meta) => Self {
                if_none_match: meta.etag.clone().filter(|v| !v.is_empty()),
                if_modified_since: meta.last_modified.clone().filter(|v| !v.is_empty()),
            },
            None => Self::default(),
        }
    }

    pub fn is_conditional(&self) -> bool {
        self.if_none_match.is_some() || self.if_modified_since.is_some()
    }
}

/// What a 2xx response left in the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    /// Final URL after redirects.
    pub source_url: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    /// Digest of the streamed bytes, computed while streaming.
    pub content_hash: String,
    pub bytes: u64,
}

/// Classification of one fetch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// 304: nothing was transferred.
    Unchanged,
    /// 2xx: the full body was streamed into the sink.
    Replaced(Replacement),
    /// Transport error, timeout, or any other status.
    Failed(SyncError),
}

/// Transport used by the synchronizer. One network attempt per call, no retries.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Perform a conditional GET, streaming a 2xx body into `sink`.
    ///
    /// The sink may have received partial data when the outcome is `Failed`;
    /// callers must discard it in that case.
    async fn fetch(
        &self,
        request: FetchRequest<'_>,
        sink: &mut (dyn Write + Send),
    ) -> FetchOutcome;

    /// Look for an API spec URL inside a portal page.
    /// `Ok(None)` means the page loaded but nothing matched.
    async fn discover_spec_url(
        &self,
        page_url: &str,
        authorize: bool,
    ) -> Result<Option<String>, SyncError>;
}

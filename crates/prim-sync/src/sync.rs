use std::fmt;
use std::io::{self, Write};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::digest;
use crate::fetch::{FetchOutcome, FetchRequest, Fetcher};
use crate::metadata::{CacheMetadata, MetadataStore};
use crate::payload::{PayloadStore, StagedPayload};
use crate::resource::{ResourceDescriptor, SourceLocator};

/// Errors that can occur during sync operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("network error: {0}")]
    Network(String),

    #[error("unexpected HTTP status {status}")]
    UnexpectedStatus { status: u16 },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("manifest error: {0}")]
    Manifest(String),

    #[error("could not resolve URL: {0}")]
    Resolve(String),

    #[error("invalid schema: {0}")]
    InvalidSchema(String),
}

impl SyncError {
    pub fn storage(context: impl fmt::Display, err: impl fmt::Display) -> Self {
        Self::Storage(format!("{context}: {err}"))
    }
}

/// Terminal state of one sync attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    /// Dry run: target resolved and logged, nothing fetched or written.
    DryRun,
    /// Server answered 304; only the sidecar timestamp moved.
    NotModified,
    /// Server sent bytes identical to the stored payload; payload untouched.
    Deduplicated,
    /// New bytes were committed and the sidecar rewritten.
    Written,
    Failed(SyncError),
}

impl SyncState {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DryRun => write!(f, "dry run"),
            Self::NotModified => write!(f, "not modified"),
            Self::Deduplicated => write!(f, "unchanged (digest match)"),
            Self::Written => write!(f, "written"),
            Self::Failed(e) => write!(f, "failed: {e}"),
        }
    }
}

/// Verdict for one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub resource_id: String,
    /// URL that was (or would have been) fetched, when one was determined.
    pub url: Option<String>,
    pub state: SyncState,
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        self.state.is_success()
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.is_success() { "ok" } else { "FAILED" };
        write!(f, "[{mark}] {}: {}", self.resource_id, self.state)
    }
}

/// Runs the per-resource state machine:
/// `Start -> Fetching -> {NotModified, Deduplicated, Written, Failed}`.
pub struct ResourceSynchronizer<'a> {
    fetcher: &'a dyn Fetcher,
    metadata: &'a dyn MetadataStore,
    payloads: &'a dyn PayloadStore,
    dry_run: bool,
}

impl<'a> ResourceSynchronizer<'a> {
    pub fn new(
        fetcher: &'a dyn Fetcher,
        metadata: &'a dyn MetadataStore,
        payloads: &'a dyn PayloadStore,
    ) -> Self {
        Self {
            fetcher,
            metadata,
            payloads,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Bring the local copy of `resource` up to date. Never panics or
    /// propagates: every failure becomes a `Failed` verdict.
    pub async fn sync(&self, resource: &ResourceDescriptor) -> SyncOutcome {
        if self.dry_run {
            let target = resource.display_target();
            let path = self.payloads.payload_path(resource);
            info!(
                resource = %resource.id,
                target = %target,
                path = %path.display(),
                "dry run: would fetch"
            );
            return SyncOutcome {
                resource_id: resource.id.clone(),
                url: resource.static_url(),
                state: SyncState::DryRun,
            };
        }

        let url = match self.resolve_url(resource).await {
            Ok(url) => url,
            Err(e) => {
                warn!(resource = %resource.id, error = %e, "could not resolve URL");
                return SyncOutcome {
                    resource_id: resource.id.clone(),
                    url: None,
                    state: SyncState::Failed(e),
                };
            }
        };

        let state = match self.fetch_and_store(resource, &url).await {
            Ok(state) => state,
            Err(e) => {
                warn!(resource = %resource.id, url = %url, error = %e, "sync failed");
                SyncState::Failed(e)
            }
        };

        SyncOutcome {
            resource_id: resource.id.clone(),
            url: Some(url),
            state,
        }
    }

    async fn resolve_url(&self, resource: &ResourceDescriptor) -> Result<String, SyncError> {
        let SourceLocator::PortalPage {
            page_url,
            fallback_url,
        } = &resource.locator
        else {
            return resource
                .static_url()
                .ok_or_else(|| SyncError::Resolve(format!("no URL for {}", resource.id)));
        };

        debug!(resource = %resource.id, page = %page_url, "discovering spec URL");
        let discovered = self
            .fetcher
            .discover_spec_url(page_url, resource.requires_auth)
            .await;

        match (discovered, fallback_url) {
            (Ok(Some(url)), _) => Ok(url),
            (Ok(None), Some(fallback)) => {
                warn!(resource = %resource.id, "no spec URL found in page, using override");
                Ok(fallback.clone())
            }
            (Ok(None), None) => Err(SyncError::Resolve(format!(
                "no spec URL found in {page_url}"
            ))),
            (Err(e), Some(fallback)) => {
                warn!(resource = %resource.id, error = %e, "page fetch failed, using override");
                Ok(fallback.clone())
            }
            (Err(e), None) => Err(e),
        }
    }

    async fn fetch_and_store(
        &self,
        resource: &ResourceDescriptor,
        url: &str,
    ) -> Result<SyncState, SyncError> {
        let prior = self.metadata.load(&resource.id);
        if prior.is_some() {
            debug!(resource = %resource.id, "using conditional GET with stored metadata");
        }

        let mut sink = LazyStage::new(self.payloads, resource);
        let request = FetchRequest {
            url,
            prior: prior.as_ref(),
            authorize: resource.requires_auth,
        };

        let outcome = self.fetcher.fetch(request, &mut sink).await;

        match outcome {
            FetchOutcome::Unchanged => {
                if let Some(prior) = &prior {
                    self.metadata
                        .save(&resource.id, &prior.refreshed(Utc::now()))?;
                }
                info!(resource = %resource.id, "not modified (304)");
                Ok(SyncState::NotModified)
            }
            FetchOutcome::Replaced(replacement) => {
                let now = Utc::now();
                match prior.as_ref() {
                    Some(prior)
                        if digest::is_unchanged(Some(prior), &replacement.content_hash) =>
                    {
                        drop(sink);
                        self.metadata
                            .save(&resource.id, &prior.revalidated(&replacement, now))?;
                        info!(resource = %resource.id, "content unchanged (digest match)");
                        Ok(SyncState::Deduplicated)
                    }
                    _ => {
                        let path = sink.into_staged()?.commit()?;
                        self.metadata.save(
                            &resource.id,
                            &CacheMetadata::from_replacement(&resource.id, &replacement, now),
                        )?;
                        info!(
                            resource = %resource.id,
                            bytes = replacement.bytes,
                            sha256 = %replacement.content_hash,
                            path = %path.display(),
                            "downloaded"
                        );
                        Ok(SyncState::Written)
                    }
                }
            }
            FetchOutcome::Failed(e) => Err(sink.error.unwrap_or(e)),
        }
    }
}

/// Sink that opens the staging area on the first write, so a 304 or an
/// error status never touches payload storage.
struct LazyStage<'a> {
    payloads: &'a dyn PayloadStore,
    resource: &'a ResourceDescriptor,
    staged: Option<Box<dyn StagedPayload>>,
    /// Staging failure, kept so it is reported instead of the I/O wrapper.
    error: Option<SyncError>,
}

impl<'a> LazyStage<'a> {
    fn new(payloads: &'a dyn PayloadStore, resource: &'a ResourceDescriptor) -> Self {
        Self {
            payloads,
            resource,
            staged: None,
            error: None,
        }
    }

    fn writer(&mut self) -> io::Result<&mut (dyn Write + Send)> {
        let staged = match self.staged.take() {
            Some(staged) => staged,
            None => self.payloads.stage(self.resource).map_err(|e| {
                let err = io::Error::other(e.to_string());
                self.error = Some(e);
                err
            })?,
        };
        Ok(self.staged.insert(staged).writer())
    }

    /// The staged payload, opened now if the body was empty.
    fn into_staged(self) -> Result<Box<dyn StagedPayload>, SyncError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        match self.staged {
            Some(staged) => Ok(staged),
            None => self.payloads.stage(self.resource),
        }
    }
}

impl Write for LazyStage<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.staged {
            Some(staged) => staged.writer().flush(),
            None => Ok(()),
        }
    }
}

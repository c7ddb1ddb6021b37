use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::digest::HashingWriter;
use crate::fetch::{ConditionalHeaders, FetchOutcome, FetchRequest, Fetcher, Replacement};
use crate::metadata::{CacheMetadata, MetadataStore};
use crate::payload::{PayloadStore, StagedPayload};
use crate::resource::ResourceDescriptor;
use crate::sync::SyncError;

/// Canned answer for one call to [`ScriptedFetcher::fetch`].
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    NotModified,
    Ok {
        body: Vec<u8>,
        etag: Option<String>,
        last_modified: Option<String>,
    },
    Status(u16),
    NetworkError(String),
    /// Streams some bytes into the sink, then fails mid-body.
    PartialThenFail(Vec<u8>, SyncError),
}

impl ScriptedResponse {
    pub fn ok(body: impl Into<Vec<u8>>, etag: Option<&str>) -> Self {
        Self::Ok {
            body: body.into(),
            etag: etag.map(str::to_owned),
            last_modified: None,
        }
    }
}

/// What the synchronizer asked the fetcher for.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub url: String,
    pub if_none_match: Option<String>,
    pub if_modified_since: Option<String>,
    pub authorize: bool,
}

/// Fetcher that replays scripted responses in order and records requests.
/// Running out of script yields a network failure.
pub struct ScriptedFetcher {
    responses: Mutex<VecDeque<ScriptedResponse>>,
    requests: Mutex<Vec<RecordedRequest>>,
    discovered_url: Option<String>,
}

impl ScriptedFetcher {
    pub fn new(responses: Vec<ScriptedResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            discovered_url: None,
        }
    }

    pub fn with_discovered_url(mut self, url: impl Into<String>) -> Self {
        self.discovered_url = Some(url.into());
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(
        &self,
        request: FetchRequest<'_>,
        sink: &mut (dyn Write + Send),
    ) -> FetchOutcome {
        let headers = ConditionalHeaders::from_prior(request.prior);
        self.requests.lock().unwrap().push(RecordedRequest {
            url: request.url.to_owned(),
            if_none_match: headers.if_none_match,
            if_modified_since: headers.if_modified_since,
            authorize: request.authorize,
        });

        let next = self.responses.lock().unwrap().pop_front();
        match next {
            Some(ScriptedResponse::NotModified) => FetchOutcome::Unchanged,
            Some(ScriptedResponse::Ok {
                body,
                etag,
                last_modified,
            }) => {
                let mut writer = HashingWriter::new(sink);
                if let Err(e) = writer.write_chunked(&body) {
                    return FetchOutcome::Failed(SyncError::storage("write", e));
                }
                match writer.finish() {
                    Ok((_, content_hash, bytes)) => FetchOutcome::Replaced(Replacement {
                        source_url: request.url.to_owned(),
                        etag,
                        last_modified,
                        content_hash,
                        bytes,
                    }),
                    Err(e) => FetchOutcome::Failed(SyncError::storage("flush", e)),
                }
            }
            Some(ScriptedResponse::Status(status)) => {
                FetchOutcome::Failed(SyncError::UnexpectedStatus { status })
            }
            Some(ScriptedResponse::NetworkError(msg)) => {
                FetchOutcome::Failed(SyncError::Network(msg))
            }
            Some(ScriptedResponse::PartialThenFail(body, error)) => match sink.write_all(&body) {
                Ok(()) => FetchOutcome::Failed(error),
                Err(e) => FetchOutcome::Failed(SyncError::storage("write", e)),
            },
            None => FetchOutcome::Failed(SyncError::Network("no scripted response".into())),
        }
    }

    async fn discover_spec_url(
        &self,
        _page_url: &str,
        _authorize: bool,
    ) -> Result<Option<String>, SyncError> {
        Ok(self.discovered_url.clone())
    }
}

/// In-memory sidecar store for testing.
#[derive(Default)]
pub struct InMemoryMetadataStore {
    records: Mutex<HashMap<String, CacheMetadata>>,
    saves: AtomicUsize,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record without counting it as a save.
    pub fn insert(&self, metadata: CacheMetadata) {
        self.records
            .lock()
            .unwrap()
            .insert(metadata.resource_id.clone(), metadata);
    }

    pub fn get(&self, resource_id: &str) -> Option<CacheMetadata> {
        self.records.lock().unwrap().get(resource_id).cloned()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl MetadataStore for InMemoryMetadataStore {
    fn load(&self, resource_id: &str) -> Option<CacheMetadata> {
        self.get(resource_id)
    }

    fn save(&self, resource_id: &str, metadata: &CacheMetadata) -> Result<(), SyncError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.records
            .lock()
            .unwrap()
            .insert(resource_id.to_owned(), metadata.clone());
        Ok(())
    }
}

/// In-memory payload store for testing. Committed payloads are keyed by id.
#[derive(Default)]
pub struct InMemoryPayloadStore {
    payloads: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    stages: AtomicUsize,
    commits: Arc<AtomicUsize>,
}

impl InMemoryPayloadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, resource_id: &str) -> Option<Vec<u8>> {
        self.payloads.lock().unwrap().get(resource_id).cloned()
    }

    pub fn stage_count(&self) -> usize {
        self.stages.load(Ordering::SeqCst)
    }

    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }
}

struct InMemoryStaged {
    resource_id: String,
    buffer: Vec<u8>,
    payloads: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    commits: Arc<AtomicUsize>,
}

impl StagedPayload for InMemoryStaged {
    fn writer(&mut self) -> &mut (dyn Write + Send) {
        &mut self.buffer
    }

    fn commit(self: Box<Self>) -> Result<PathBuf, SyncError> {
        let this = *self;
        this.commits.fetch_add(1, Ordering::SeqCst);
        let path = PathBuf::from(&this.resource_id);
        this.payloads
            .lock()
            .unwrap()
            .insert(this.resource_id, this.buffer);
        Ok(path)
    }
}

impl PayloadStore for InMemoryPayloadStore {
    fn payload_path(&self, resource: &ResourceDescriptor) -> PathBuf {
        PathBuf::from(resource.payload_file_name())
    }

    fn stage(&self, resource: &ResourceDescriptor) -> Result<Box<dyn StagedPayload>, SyncError> {
        self.stages.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InMemoryStaged {
            resource_id: resource.id.clone(),
            buffer: Vec::new(),
            payloads: Arc::clone(&self.payloads),
            commits: Arc::clone(&self.commits),
        }))
    }
}

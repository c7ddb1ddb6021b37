pub mod batch;
pub mod digest;
pub mod fetch;
pub mod manifest;
pub mod metadata;
pub mod payload;
pub mod pipeline;
pub mod refresh;
pub mod resource;
pub mod sync;
pub mod validate;

pub use batch::{BatchReport, run_all};
pub use digest::{CHUNK_SIZE, HashingWriter, digest, is_unchanged};
pub use fetch::{ConditionalHeaders, FetchOutcome, FetchRequest, Fetcher, Replacement};
pub use manifest::{ManifestError, load_api_manifest, load_dataset_manifest};
pub use metadata::{CacheMetadata, MetadataStore};
pub use payload::{PayloadStore, StagedPayload};
pub use pipeline::{PipelineReport, Stage, StageRunner, StageStatus, run_pipeline};
pub use refresh::PeriodicRefresher;
pub use resource::{Domain, ResourceDescriptor, SourceLocator};
pub use sync::{ResourceSynchronizer, SyncError, SyncOutcome, SyncState};
pub use validate::{
    DatasetSchema, FieldType, IssueKind, MAX_COLLECTED_ERRORS, RecordSchema, SchemaField,
    ValidationIssue, ValidationReport, validate_lines,
};

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

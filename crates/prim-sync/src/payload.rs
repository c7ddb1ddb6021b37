use std::io::Write;
use std::path::PathBuf;

use crate::resource::ResourceDescriptor;
use crate::sync::SyncError;

/// Bytes being received for a resource, not yet visible to readers.
///
/// Dropping a staged payload without committing discards it.
pub trait StagedPayload: Send {
    /// Destination for streamed bytes.
    fn writer(&mut self) -> &mut (dyn Write + Send);

    /// Atomically replace the resource's payload with the staged bytes.
    fn commit(self: Box<Self>) -> Result<PathBuf, SyncError>;
}

/// Storage for payload files, owned by the synchronizer.
pub trait PayloadStore: Send + Sync {
    /// Deterministic location of the committed payload for `resource`.
    fn payload_path(&self, resource: &ResourceDescriptor) -> PathBuf;

    /// Open a staging area for a new version of the payload.
    fn stage(&self, resource: &ResourceDescriptor) -> Result<Box<dyn StagedPayload>, SyncError>;
}

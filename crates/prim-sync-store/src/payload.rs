use std::io::Write;
use std::path::{Path, PathBuf};

use prim_sync::{PayloadStore, ResourceDescriptor, StagedPayload, SyncError};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::sidecar::StoreError;

/// Payload files stored under one directory, named by
/// [`ResourceDescriptor::payload_file_name`].
///
/// Bytes are staged in a temporary file in the same directory and renamed
/// over the destination on commit, so a reader never sees a partial payload
/// and an abandoned stage leaves the previous file untouched.
#[derive(Debug, Clone)]
pub struct FsPayloadStore {
    dir: PathBuf,
}

impl FsPayloadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl PayloadStore for FsPayloadStore {
    fn payload_path(&self, resource: &ResourceDescriptor) -> PathBuf {
        self.dir.join(resource.payload_file_name())
    }

    fn stage(&self, resource: &ResourceDescriptor) -> Result<Box<dyn StagedPayload>, SyncError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;
        let file = NamedTempFile::new_in(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;
        Ok(Box::new(FsStaged {
            file,
            destination: self.payload_path(resource),
        }))
    }
}

struct FsStaged {
    file: NamedTempFile,
    destination: PathBuf,
}

impl StagedPayload for FsStaged {
    fn writer(&mut self) -> &mut (dyn Write + Send) {
        self.file.as_file_mut()
    }

    fn commit(self: Box<Self>) -> Result<PathBuf, SyncError> {
        let FsStaged {
            mut file,
            destination,
        } = *self;

        file.flush()
            .map_err(|e| StoreError::io(&destination, e))?;
        file.persist(&destination)
            .map_err(|e| StoreError::io(&destination, e.error))?;

        debug!(path = %destination.display(), "payload committed");
        Ok(destination)
    }
}

#[cfg(test)]
mod tests {
    use prim_sync::SourceLocator;

    use super::*;

    #[test]
    fn paths_follow_the_descriptor() {
        let store = FsPayloadStore::new("/data/raw");
        let dataset = ResourceDescriptor::dataset("lignes", "https://p");
        assert_eq!(
            store.payload_path(&dataset),
            PathBuf::from("/data/raw/lignes.jsonl")
        );

        let spec = ResourceDescriptor::api_spec(
            "passages",
            SourceLocator::Direct {
                url: "https://api/openapi.json".into(),
            },
        );
        assert_eq!(
            store.payload_path(&spec),
            PathBuf::from("/data/raw/passages.json")
        );
    }

    #[test]
    fn commit_replaces_existing_payload() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPayloadStore::new(dir.path().join("raw"));
        let resource = ResourceDescriptor::dataset("lignes", "https://p");

        for body in [&b"first\n"[..], &b"second\n"[..]] {
            let mut staged = store.stage(&resource).unwrap();
            staged.writer().write_all(body).unwrap();
            let path = staged.commit().unwrap();
            assert_eq!(std::fs::read(&path).unwrap(), body);
        }

        let entries: Vec<_> = std::fs::read_dir(store.dir()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn dropped_stage_leaves_previous_payload_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPayloadStore::new(dir.path());
        let resource = ResourceDescriptor::dataset("lignes", "https://p");
        let path = store.payload_path(&resource);
        std::fs::write(&path, "original\n").unwrap();

        {
            let mut staged = store.stage(&resource).unwrap();
            staged.writer().write_all(b"partial").unwrap();
        }

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "original\n");
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}

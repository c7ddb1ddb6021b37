pub mod payload;
pub mod sidecar;

pub use payload::FsPayloadStore;
pub use sidecar::{SIDECAR_SUFFIX, SidecarStore, StoreError};

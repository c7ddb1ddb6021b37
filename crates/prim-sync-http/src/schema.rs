use prim_sync::resource::dataset_metadata_url;
use prim_sync::{DatasetSchema, RecordSchema, ResourceDescriptor, SourceLocator, SyncError};
use tracing::info;

use crate::fetcher::HttpFetcher;

/// Retrieve the schema a dataset is validated against.
///
/// A `schema_url_override` is used as a complete JSON Schema document.
/// Otherwise the portal's dataset metadata is fetched and its field list mapped.
pub async fn fetch_dataset_schema(
    fetcher: &HttpFetcher,
    resource: &ResourceDescriptor,
) -> Result<RecordSchema, SyncError> {
    if let Some(url) = &resource.schema_url_override {
        info!(resource = %resource.id, url = %url, "fetching schema override");
        let document = fetcher.get_json(url, resource.requires_auth).await?;
        return RecordSchema::document(document);
    }

    let SourceLocator::DatasetExport { portal_base } = &resource.locator else {
        return Err(SyncError::Resolve(format!(
            "{} has no portal to read a schema from",
            resource.id
        )));
    };

    let url = dataset_metadata_url(portal_base, &resource.id);
    info!(resource = %resource.id, url = %url, "fetching dataset metadata");
    let metadata = fetcher.get_json(&url, resource.requires_auth).await?;
    Ok(DatasetSchema::from_portal_metadata(&metadata).into())
}

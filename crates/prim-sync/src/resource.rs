use std::fmt;

/// Export format used when a dataset declaration does not name one.
pub const DEFAULT_EXPORT_FORMAT: &str = "jsonl";

/// Which family of remote resources a descriptor belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    Dataset,
    ApiSpec,
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dataset => write!(f, "dataset"),
            Self::ApiSpec => write!(f, "api-spec"),
        }
    }
}

/// Where the bytes of a resource come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocator {
    /// An open-data portal exposing the Explore v2.1 exports endpoint.
    DatasetExport { portal_base: String },
    /// A document served at a known URL.
    Direct { url: String },
    /// A portal page that embeds the spec URL somewhere in its HTML.
    PortalPage {
        page_url: String,
        fallback_url: Option<String>,
    },
}

/// One syncable thing, as declared in a manifest. Immutable for a sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub id: String,
    pub domain: Domain,
    pub locator: SourceLocator,
    pub export_format: String,
    pub validate: bool,
    pub requires_auth: bool,
    pub schema_url_override: Option<String>,
}

impl ResourceDescriptor {
    pub fn dataset(id: impl Into<String>, portal_base: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            domain: Domain::Dataset,
            locator: SourceLocator::DatasetExport {
                portal_base: portal_base.into(),
            },
            export_format: DEFAULT_EXPORT_FORMAT.to_owned(),
            validate: false,
            requires_auth: false,
            schema_url_override: None,
        }
    }

    pub fn api_spec(id: impl Into<String>, locator: SourceLocator) -> Self {
        Self {
            id: id.into(),
            domain: Domain::ApiSpec,
            locator,
            export_format: "json".to_owned(),
            validate: false,
            requires_auth: false,
            schema_url_override: None,
        }
    }

    /// The URL to fetch when it can be known without touching the network.
    /// Portal pages need discovery first and return `None`.
    pub fn static_url(&self) -> Option<String> {
        match &self.locator {
            SourceLocator::DatasetExport { portal_base } => Some(dataset_export_url(
                portal_base,
                &self.id,
                &self.export_format,
            )),
            SourceLocator::Direct { url } => Some(url.clone()),
            SourceLocator::PortalPage { .. } => None,
        }
    }

    /// Human-readable target for logging: the fetch URL if known, else the page.
    pub fn display_target(&self) -> String {
        match &self.locator {
            SourceLocator::PortalPage { page_url, .. } => format!("page {page_url}"),
            _ => self.static_url().unwrap_or_default(),
        }
    }

    /// File name of the payload, relative to the domain's storage directory.
    pub fn payload_file_name(&self) -> String {
        match self.domain {
            Domain::Dataset => format!("{}.{}", self.id, self.export_format),
            Domain::ApiSpec => format!("{}.json", self.id),
        }
    }
}

fn trim_base(portal_base: &str) -> &str {
    portal_base.trim_end_matches('/')
}

/// Explore API v2.1 export endpoint: the full dataset, no pagination.
pub fn dataset_export_url(portal_base: &str, dataset_id: &str, export_format: &str) -> String {
    format!(
        "{}/api/explore/v2.1/catalog/datasets/{dataset_id}/exports/{export_format}",
        trim_base(portal_base)
    )
}

/// Explore API v2.1 dataset metadata endpoint (field names and types).
pub fn dataset_metadata_url(portal_base: &str, dataset_id: &str) -> String {
    format!(
        "{}/api/explore/v2.1/catalog/datasets/{dataset_id}",
        trim_base(portal_base)
    )
}

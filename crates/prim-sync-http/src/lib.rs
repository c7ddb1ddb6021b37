pub mod discovery;
pub mod fetcher;
pub mod schema;

pub use discovery::extract_spec_url;
pub use fetcher::{HttpConfig, HttpFetcher};

//! Fetching, discovery, pagination and product extraction.

pub mod config;
pub mod discovery;
pub mod extract;
pub mod fetcher;
mod http_client;
pub mod pagination;

pub use config::{ProfileError, SiteProfile};
pub use discovery::CategoryDiscoverer;
pub use extract::{ExtractionDispatcher, RawFieldMap};
pub use fetcher::{Document, DocumentFormat, FetchError, FetchErrorKind, PageFetcher};
pub use http_client::{ladder_for, AttemptDescriptor, HttpClient, ESCALATION_LADDER};
pub use pagination::Paginator;

//! Discovered category and page links (bookkeeping only).

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A category listing URL found by discovery.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryLink {
    pub url: String,
    pub site: String,
    pub discovered_at: DateTime<Utc>,
}

/// A paginated listing page, optionally tied to the category it came from.
#[derive(Debug, Clone, Serialize)]
pub struct PageLink {
    pub url: String,
    pub category_url: Option<String>,
    pub site: String,
    pub discovered_at: DateTime<Utc>,
}

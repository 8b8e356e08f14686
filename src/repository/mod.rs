//! Repository layer for database persistence.
//!
//! All database access uses Diesel with diesel-async's SQLite wrapper.
//! Timestamps are stored as RFC 3339 text in UTC with fixed microsecond
//! precision, so text comparison orders them chronologically.

pub mod diesel_context;
pub mod diesel_link;
pub mod diesel_models;
pub mod diesel_pool;
pub mod diesel_product;

pub use diesel_context::DieselDbContext;
pub use diesel_link::DieselLinkRepository;
pub use diesel_pool::{to_diesel_error, AsyncSqlitePool, DieselError};
pub use diesel_product::{DieselProductRepository, PriceSummary};

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a timestamp for storage.
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a datetime string from the database, defaulting to Unix epoch on error.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamps_sort_as_text() {
        let a = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z").unwrap().with_timezone(&Utc);
        let b = a + chrono::Duration::milliseconds(500);
        assert!(format_timestamp(a) < format_timestamp(b));
        assert_eq!(parse_datetime(&format_timestamp(b)), b);
        assert_eq!(parse_datetime("garbage"), DateTime::UNIX_EPOCH);
    }
}

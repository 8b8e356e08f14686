//! Diesel database context: the entry point for storage access.

use std::path::Path;

use diesel_async::SimpleAsyncConnection;

use super::diesel_link::DieselLinkRepository;
use super::diesel_pool::{AsyncSqlitePool, DieselError};
use super::diesel_product::DieselProductRepository;

/// Owns the connection factory and hands out repositories.
///
/// Create one context per command or run. Profiles running concurrently
/// should each have their own context.
///
/// # Example
/// ```ignore
/// let ctx = DieselDbContext::new(&db_path);
/// ctx.init_schema().await?;
/// let product = ctx.products().get("sku-1", "shop").await?;
/// ```
#[derive(Clone)]
pub struct DieselDbContext {
    pool: AsyncSqlitePool,
}

impl DieselDbContext {
    /// Create a context for a SQLite file.
    pub fn new(db_path: &Path) -> Self {
        Self {
            pool: AsyncSqlitePool::from_path(db_path),
        }
    }

    /// Create a context from a URL such as `sqlite:path/to/db.sqlite` or a plain path.
    pub fn from_url(database_url: &str) -> Self {
        Self {
            pool: AsyncSqlitePool::new(database_url),
        }
    }

    pub fn pool(&self) -> &AsyncSqlitePool {
        &self.pool
    }

    pub fn products(&self) -> DieselProductRepository {
        DieselProductRepository::new(self.pool.clone())
    }

    pub fn links(&self) -> DieselLinkRepository {
        DieselLinkRepository::new(self.pool.clone())
    }

    /// Create tables and indexes if they don't exist.
    pub async fn init_schema(&self) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;

        conn.batch_execute(
            r#"
            PRAGMA journal_mode=WAL;

            -- Current snapshot per product
            CREATE TABLE IF NOT EXISTS products (
                id TEXT NOT NULL,
                site TEXT NOT NULL,
                name TEXT NOT NULL DEFAULT '',
                url TEXT NOT NULL DEFAULT '',
                price REAL NOT NULL,
                first_seen_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (id, site)
            );

            -- Append-only price observations
            CREATE TABLE IF NOT EXISTS price_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                product_id TEXT NOT NULL,
                site TEXT NOT NULL,
                price REAL NOT NULL,
                recorded_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS category_links (
                url TEXT PRIMARY KEY,
                site TEXT NOT NULL,
                discovered_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS page_links (
                url TEXT PRIMARY KEY,
                category_url TEXT,
                site TEXT NOT NULL,
                discovered_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_products_site ON products(site);
            CREATE INDEX IF NOT EXISTS idx_price_history_product ON price_history(site, product_id, recorded_at);
            CREATE INDEX IF NOT EXISTS idx_price_history_recorded ON price_history(recorded_at);
            CREATE INDEX IF NOT EXISTS idx_category_links_site ON category_links(site);
            CREATE INDEX IF NOT EXISTS idx_page_links_site ON page_links(site);
            "#,
        )
        .await
    }

    /// Get list of all tables in the database.
    pub async fn list_tables(&self) -> Result<Vec<String>, DieselError> {
        let mut conn = self.pool.get().await?;

        let rows: Vec<TableName> = diesel_async::RunQueryDsl::load(
            diesel::sql_query(
                "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            ),
            &mut conn,
        )
        .await?;
        Ok(rows.into_iter().map(|r| r.name).collect())
    }
}

#[derive(diesel::QueryableByName)]
struct TableName {
    #[diesel(sql_type = diesel::sql_types::Text)]
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_init_schema_is_idempotent() {
        let dir = tempdir().unwrap();
        let ctx = DieselDbContext::new(&dir.path().join("test.db"));

        ctx.init_schema().await.unwrap();
        ctx.init_schema().await.unwrap();

        let tables = ctx.list_tables().await.unwrap();
        assert_eq!(
            tables,
            vec!["category_links", "page_links", "price_history", "products"]
        );
        assert_eq!(ctx.products().count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_from_url_strips_prefix() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("url.db");
        let ctx = DieselDbContext::from_url(&format!("sqlite:{}", path.display()));
        assert_eq!(ctx.pool().database_url(), path.display().to_string());
        ctx.init_schema().await.unwrap();
        assert!(path.exists());
    }
}

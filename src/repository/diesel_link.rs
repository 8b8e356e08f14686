//! Bookkeeping for discovered category and page URLs.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::diesel_models::{CategoryLinkRow, NewCategoryLink, NewPageLink, PageLinkRow};
use super::diesel_pool::{AsyncSqlitePool, DieselError};
use super::{format_timestamp, parse_datetime};
use crate::models::{CategoryLink, PageLink};
use crate::schema::{category_links, page_links};

impl From<CategoryLinkRow> for CategoryLink {
    fn from(row: CategoryLinkRow) -> Self {
        CategoryLink {
            url: row.url,
            site: row.site,
            discovered_at: parse_datetime(&row.discovered_at),
        }
    }
}

impl From<PageLinkRow> for PageLink {
    fn from(row: PageLinkRow) -> Self {
        PageLink {
            url: row.url,
            category_url: row.category_url,
            site: row.site,
            discovered_at: parse_datetime(&row.discovered_at),
        }
    }
}

#[derive(Clone)]
pub struct DieselLinkRepository {
    pool: AsyncSqlitePool,
}

impl DieselLinkRepository {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    /// Record a category URL; returns false when it was already known.
    pub async fn record_category(
        &self,
        url: &str,
        site: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, DieselError> {
        let mut conn = self.pool.get().await?;
        let ts = format_timestamp(at);

        let rows = diesel::insert_or_ignore_into(category_links::table)
            .values(&NewCategoryLink {
                url,
                site,
                discovered_at: &ts,
            })
            .execute(&mut conn)
            .await?;
        Ok(rows > 0)
    }

    /// Record a listing page URL under its category.
    pub async fn record_page(
        &self,
        url: &str,
        category_url: Option<&str>,
        site: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, DieselError> {
        let mut conn = self.pool.get().await?;
        let ts = format_timestamp(at);

        let rows = diesel::insert_or_ignore_into(page_links::table)
            .values(&NewPageLink {
                url,
                category_url,
                site,
                discovered_at: &ts,
            })
            .execute(&mut conn)
            .await?;
        Ok(rows > 0)
    }

    /// Known categories for a site, in URL order.
    pub async fn categories(&self, site: &str) -> Result<Vec<CategoryLink>, DieselError> {
        let mut conn = self.pool.get().await?;

        category_links::table
            .filter(category_links::site.eq(site))
            .order(category_links::url.asc())
            .load::<CategoryLinkRow>(&mut conn)
            .await
            .map(|rows| rows.into_iter().map(CategoryLink::from).collect())
    }

    /// Known listing pages for a site, optionally limited to one category.
    pub async fn pages(
        &self,
        site: &str,
        category_url: Option<&str>,
    ) -> Result<Vec<PageLink>, DieselError> {
        let mut conn = self.pool.get().await?;

        let mut query = page_links::table
            .filter(page_links::site.eq(site))
            .order(page_links::url.asc())
            .into_boxed();
        if let Some(category_url) = category_url {
            query = query.filter(page_links::category_url.eq(category_url));
        }
        query
            .load::<PageLinkRow>(&mut conn)
            .await
            .map(|rows| rows.into_iter().map(PageLink::from).collect())
    }

    pub async fn count_categories(&self, site: Option<&str>) -> Result<i64, DieselError> {
        let mut conn = self.pool.get().await?;

        use diesel::dsl::count_star;
        let mut query = category_links::table.select(count_star()).into_boxed();
        if let Some(site) = site {
            query = query.filter(category_links::site.eq(site));
        }
        query.first(&mut conn).await
    }

    pub async fn count_pages(&self, site: Option<&str>) -> Result<i64, DieselError> {
        let mut conn = self.pool.get().await?;

        use diesel::dsl::count_star;
        let mut query = page_links::table.select(count_star()).into_boxed();
        if let Some(site) = site {
            query = query.filter(page_links::site.eq(site));
        }
        query.first(&mut conn).await
    }
}

//! Products and their append-only price history.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncConnection, RunQueryDsl};

use super::diesel_models::{NewPriceHistory, NewProduct, PriceHistoryRow, ProductRow};
use super::diesel_pool::{AsyncSqlitePool, DieselError};
use super::{format_timestamp, parse_datetime};
use crate::models::{Price, PriceDrop, PriceHistoryEntry, Product, ProductRecord};
use crate::schema::{price_history, products};

/// Prices are stored as REAL; read them back to the nearest minor unit.
fn stored_price(value: f64) -> Price {
    Price::from_f64(value).unwrap_or(Price::ZERO)
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            site: row.site,
            name: row.name,
            url: row.url,
            price: stored_price(row.price),
            first_seen_at: parse_datetime(&row.first_seen_at),
            updated_at: parse_datetime(&row.updated_at),
        }
    }
}

impl From<PriceHistoryRow> for PriceHistoryEntry {
    fn from(row: PriceHistoryRow) -> Self {
        PriceHistoryEntry {
            product_id: row.product_id,
            site: row.site,
            price: stored_price(row.price),
            recorded_at: parse_datetime(&row.recorded_at),
        }
    }
}

/// Aggregate price figures over products with a positive price.
#[derive(Debug, Clone, Default)]
pub struct PriceSummary {
    pub min: Option<Price>,
    pub max: Option<Price>,
    pub avg: Option<f64>,
}

/// Product persistence. Every price write also appends to `price_history`
/// in the same transaction.
#[derive(Clone)]
pub struct DieselProductRepository {
    pool: AsyncSqlitePool,
}

impl DieselProductRepository {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    /// Get a product by `(id, site)`.
    pub async fn get(&self, id: &str, site: &str) -> Result<Option<Product>, DieselError> {
        let mut conn = self.pool.get().await?;

        products::table
            .find((id, site))
            .first::<ProductRow>(&mut conn)
            .await
            .optional()
            .map(|opt| opt.map(Product::from))
    }

    /// Insert a first sighting and its history entry.
    pub async fn insert_with_history(
        &self,
        record: &ProductRecord,
        at: DateTime<Utc>,
    ) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        let ts = format_timestamp(at);
        let price = record.price.as_f64();

        conn.transaction(|conn| {
            Box::pin(async move {
                diesel::insert_into(products::table)
                    .values(&NewProduct {
                        id: &record.id,
                        site: &record.site,
                        name: &record.name,
                        url: &record.url,
                        price,
                        first_seen_at: &ts,
                        updated_at: &ts,
                    })
                    .execute(conn)
                    .await?;

                diesel::insert_into(price_history::table)
                    .values(&NewPriceHistory {
                        product_id: &record.id,
                        site: &record.site,
                        price,
                        recorded_at: &ts,
                    })
                    .execute(conn)
                    .await?;

                Ok(())
            })
        })
        .await
    }

    /// Store a lower price (with the latest name and URL) and its history entry.
    pub async fn lower_price_with_history(
        &self,
        record: &ProductRecord,
        at: DateTime<Utc>,
    ) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        let ts = format_timestamp(at);
        let price = record.price.as_f64();

        conn.transaction(|conn| {
            Box::pin(async move {
                let rows = diesel::update(products::table.find((&record.id, &record.site)))
                    .set((
                        products::price.eq(price),
                        products::name.eq(&record.name),
                        products::url.eq(&record.url),
                        products::updated_at.eq(&ts),
                    ))
                    .execute(conn)
                    .await?;
                if rows == 0 {
                    return Err(DieselError::NotFound);
                }

                diesel::insert_into(price_history::table)
                    .values(&NewPriceHistory {
                        product_id: &record.id,
                        site: &record.site,
                        price,
                        recorded_at: &ts,
                    })
                    .execute(conn)
                    .await?;

                Ok(())
            })
        })
        .await
    }

    /// Number of products, optionally for one site.
    pub async fn count(&self, site: Option<&str>) -> Result<i64, DieselError> {
        let mut conn = self.pool.get().await?;

        use diesel::dsl::count_star;
        let mut query = products::table.select(count_star()).into_boxed();
        if let Some(site) = site {
            query = query.filter(products::site.eq(site));
        }
        query.first(&mut conn).await
    }

    /// Product counts per site, ordered by site name.
    pub async fn counts_by_site(&self) -> Result<Vec<(String, i64)>, DieselError> {
        let mut conn = self.pool.get().await?;

        use diesel::dsl::count_star;
        products::table
            .group_by(products::site)
            .select((products::site, count_star()))
            .order(products::site.asc())
            .load::<(String, i64)>(&mut conn)
            .await
    }

    /// Minimum, maximum and average over products priced above zero.
    pub async fn price_summary(&self, site: Option<&str>) -> Result<PriceSummary, DieselError> {
        let mut conn = self.pool.get().await?;

        use diesel::dsl::{avg, max, min};
        let mut query = products::table
            .select((
                min(products::price),
                max(products::price),
                avg(products::price),
            ))
            .filter(products::price.gt(0.0))
            .into_boxed();
        if let Some(site) = site {
            query = query.filter(products::site.eq(site));
        }

        let (lo, hi, mean) = query
            .first::<(Option<f64>, Option<f64>, Option<f64>)>(&mut conn)
            .await?;
        Ok(PriceSummary {
            min: lo.map(stored_price),
            max: hi.map(stored_price),
            avg: mean,
        })
    }

    /// History entries recorded at or after `since`.
    pub async fn history_count_since(
        &self,
        site: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<i64, DieselError> {
        let mut conn = self.pool.get().await?;
        let since = format_timestamp(since);

        use diesel::dsl::count_star;
        let mut query = price_history::table
            .select(count_star())
            .filter(price_history::recorded_at.ge(since))
            .into_boxed();
        if let Some(site) = site {
            query = query.filter(price_history::site.eq(site));
        }
        query.first(&mut conn).await
    }

    /// Full history of one product, oldest first.
    pub async fn history(&self, id: &str, site: &str) -> Result<Vec<PriceHistoryEntry>, DieselError> {
        let mut conn = self.pool.get().await?;

        price_history::table
            .filter(price_history::product_id.eq(id))
            .filter(price_history::site.eq(site))
            .order((price_history::recorded_at.asc(), price_history::id.asc()))
            .load::<PriceHistoryRow>(&mut conn)
            .await
            .map(|rows| rows.into_iter().map(PriceHistoryEntry::from).collect())
    }

    /// Drops between consecutive history entries recorded since `since`,
    /// newest first.
    pub async fn recent_drops(
        &self,
        site: Option<&str>,
        since: DateTime<Utc>,
        min_percent: f64,
    ) -> Result<Vec<PriceDrop>, DieselError> {
        let mut conn = self.pool.get().await?;

        let mut history = price_history::table
            .order((
                price_history::site.asc(),
                price_history::product_id.asc(),
                price_history::recorded_at.asc(),
                price_history::id.asc(),
            ))
            .into_boxed();
        if let Some(site) = site {
            history = history.filter(price_history::site.eq(site));
        }
        let rows = history.load::<PriceHistoryRow>(&mut conn).await?;

        let mut catalogue = products::table.into_boxed();
        if let Some(site) = site {
            catalogue = catalogue.filter(products::site.eq(site));
        }
        let names: HashMap<(String, String), (String, String)> = catalogue
            .load::<ProductRow>(&mut conn)
            .await?
            .into_iter()
            .map(|p| ((p.id, p.site), (p.name, p.url)))
            .collect();

        let entries: Vec<PriceHistoryEntry> = rows.into_iter().map(PriceHistoryEntry::from).collect();
        let mut drops: Vec<PriceDrop> = entries
            .windows(2)
            .filter_map(|pair| {
                let (prev, next) = (&pair[0], &pair[1]);
                if prev.product_id != next.product_id || prev.site != next.site {
                    return None;
                }
                if next.recorded_at < since || next.price >= prev.price {
                    return None;
                }
                let percent = next.price.percent_below(prev.price);
                if percent < min_percent {
                    return None;
                }
                let (name, url) = names
                    .get(&(next.product_id.clone(), next.site.clone()))
                    .cloned()
                    .unwrap_or_default();
                Some(PriceDrop {
                    product_id: next.product_id.clone(),
                    site: next.site.clone(),
                    name,
                    url,
                    old_price: prev.price,
                    new_price: next.price,
                    percent_decrease: percent,
                    recorded_at: next.recorded_at,
                })
            })
            .collect();

        drops.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        Ok(drops)
    }
}

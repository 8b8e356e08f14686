//! Diesel row types for the database tables.

use diesel::prelude::*;

use crate::schema;

/// Product row from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::products)]
#[diesel(primary_key(id, site))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ProductRow {
    pub id: String,
    pub site: String,
    pub name: String,
    pub url: String,
    pub price: f64,
    pub first_seen_at: String,
    pub updated_at: String,
}

/// New product for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::products)]
pub struct NewProduct<'a> {
    pub id: &'a str,
    pub site: &'a str,
    pub name: &'a str,
    pub url: &'a str,
    pub price: f64,
    pub first_seen_at: &'a str,
    pub updated_at: &'a str,
}

/// Price history row from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::price_history)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PriceHistoryRow {
    pub id: i32,
    pub product_id: String,
    pub site: String,
    pub price: f64,
    pub recorded_at: String,
}

/// New price history entry for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::price_history)]
pub struct NewPriceHistory<'a> {
    pub product_id: &'a str,
    pub site: &'a str,
    pub price: f64,
    pub recorded_at: &'a str,
}

/// Category link row from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::category_links)]
#[diesel(primary_key(url))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CategoryLinkRow {
    pub url: String,
    pub site: String,
    pub discovered_at: String,
}

/// New category link for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::category_links)]
pub struct NewCategoryLink<'a> {
    pub url: &'a str,
    pub site: &'a str,
    pub discovered_at: &'a str,
}

/// Page link row from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::page_links)]
#[diesel(primary_key(url))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PageLinkRow {
    pub url: String,
    pub category_url: Option<String>,
    pub site: String,
    pub discovered_at: String,
}

/// New page link for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::page_links)]
pub struct NewPageLink<'a> {
    pub url: &'a str,
    pub category_url: Option<&'a str>,
    pub site: &'a str,
    pub discovered_at: &'a str,
}

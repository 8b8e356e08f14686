//! Product reconciliation.
//!
//! Turns raw extracted records into canonical products, compares them with
//! the stored snapshot and records first sightings and price decreases.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::{PriceChangeEvent, ProductRecord};
use crate::repository::{DieselError, DieselProductRepository};
use crate::scrapers::extract::price::price_from_value;
use crate::scrapers::extract::value_to_string;
use crate::scrapers::RawFieldMap;

use super::notify::Notifier;

/// Why a raw record was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordRejection {
    MissingId,
    MissingPrice,
    UnparseablePrice(String),
    SentinelPrice,
}

impl fmt::Display for RecordRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingId => write!(f, "missing id"),
            Self::MissingPrice => write!(f, "missing price"),
            Self::UnparseablePrice(raw) => write!(f, "unparseable price {:?}", raw),
            Self::SentinelPrice => write!(f, "price marked unavailable"),
        }
    }
}

/// Counts and alerts produced by one reconciliation.
#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub rejected: usize,
    pub change_events: Vec<PriceChangeEvent>,
}

impl ReconcileOutcome {
    pub fn seen(&self) -> usize {
        self.inserted + self.updated + self.unchanged
    }
}

/// Coerce a raw field map into a canonical record for `site`.
pub fn normalize_record(raw: &RawFieldMap, site: &str) -> Result<ProductRecord, RecordRejection> {
    let id = raw
        .get("id")
        .and_then(value_to_string)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or(RecordRejection::MissingId)?;

    let raw_price = match raw.get("price") {
        None | Some(Value::Null) => return Err(RecordRejection::MissingPrice),
        Some(value) => value,
    };
    let price = price_from_value(raw_price)
        .ok_or_else(|| RecordRejection::UnparseablePrice(raw_price.to_string()))?;
    if price.is_sentinel() {
        return Err(RecordRejection::SentinelPrice);
    }

    let text = |key: &str| {
        raw.get(key)
            .and_then(value_to_string)
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    };

    Ok(ProductRecord {
        id,
        name: text("name"),
        price,
        url: text("url"),
        site: site.to_string(),
    })
}

/// Sole writer of products and price history.
#[derive(Clone)]
pub struct Reconciler {
    products: DieselProductRepository,
    notifier: Arc<dyn Notifier>,
    site: String,
    threshold_percent: f64,
}

impl Reconciler {
    pub fn new(
        products: DieselProductRepository,
        notifier: Arc<dyn Notifier>,
        site: &str,
        threshold_percent: f64,
    ) -> Self {
        Self {
            products,
            notifier,
            site: site.to_string(),
            threshold_percent,
        }
    }

    /// Same reconciler with a different alert threshold.
    pub fn with_threshold(&self, threshold_percent: f64) -> Self {
        Self {
            threshold_percent,
            ..self.clone()
        }
    }

    pub fn threshold_percent(&self) -> f64 {
        self.threshold_percent
    }

    /// Reconcile every record from one page.
    ///
    /// A storage error stops the page; records already written stay written.
    pub async fn reconcile(&self, raw_records: &[RawFieldMap]) -> Result<ReconcileOutcome, DieselError> {
        let mut outcome = ReconcileOutcome::default();

        for raw in raw_records {
            let record = match normalize_record(raw, &self.site) {
                Ok(record) => record,
                Err(reason) => {
                    debug!("Skipping record from {}: {}", self.site, reason);
                    outcome.rejected += 1;
                    continue;
                }
            };

            let now = Utc::now();
            match self.products.get(&record.id, &record.site).await? {
                None => {
                    self.products.insert_with_history(&record, now).await?;
                    debug!("New product {} at {}", record.id, record.price);
                    outcome.inserted += 1;
                }
                Some(stored) if record.price < stored.price => {
                    let event = PriceChangeEvent::new(&stored, &record);
                    debug!(
                        "Price of {} fell {} → {} ({:.1}%)",
                        record.id, stored.price, record.price, event.percent_decrease
                    );
                    if event.percent_decrease >= self.threshold_percent {
                        if let Err(e) = self.notifier.notify(&event).await {
                            warn!("Could not deliver alert for {}: {}", record.id, e);
                        }
                        outcome.change_events.push(event);
                    }
                    self.products.lower_price_with_history(&record, now).await?;
                    outcome.updated += 1;
                }
                Some(_) => outcome.unchanged += 1,
            }
        }

        Ok(outcome)
    }
}

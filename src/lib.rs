//! pricewatch - configuration-driven product extraction and price tracking.
//!
//! Discovers category pages on e-commerce sites described by declarative
//! site profiles, extracts product records through one of several
//! extraction strategies, and tracks price history to report drops.

pub mod cli;
pub mod config;
pub mod models;
pub mod repository;
pub mod schema;
pub mod scrapers;
pub mod services;

//! Featurestore - relational core of an OGC-style feature service
//!
//! This crate provides the relational core of a SQL-backed feature store:
//! - Feature type mappings onto tables, columns and join chains
//! - Translation of filter property paths into alias-qualified columns and joins
//! - Exclusive feature locks with expiry, partial success and release
//!
//! Request parsing, response encoding and SQL statement assembly live in the
//! surrounding service; it calls into this crate with parsed inputs.

pub mod config;
pub mod feature_catalog;
pub mod locking;
pub mod query_translator;
pub mod store;

pub use config::StoreConfig;
pub use store::{FeatureStore, StoreError};

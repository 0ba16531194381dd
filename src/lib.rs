//! Tradie Leads API Library
//!
//! Lead scoring, customer quality and market price benchmarking for a
//! tradie marketplace, backed by Postgres and served over HTTP.
//!
//! # Modules
//!
//! - `api`: API-layer namespace.
//! - `core`: Scoring and benchmarking logic.
//! - `data`: Data access layer.
//! - `config`: Configuration management.
//! - `customer_quality`: Customer history aggregation.
//! - `db`: Database connection and pool management.
//! - `db_storage`: Database storage operations.
//! - `errors`: Error handling types.
//! - `geo`: Great-circle distance.
//! - `handlers`: HTTP request handlers.
//! - `lead_scoring`: Five-factor lead scoring engine.
//! - `models`: Core data models.
//! - `presence`: Live session registry.
//! - `price_benchmark`: Market price statistics and quote comparison.
//! - `services`: Transactional recalculation and lookup services.

pub mod api;
pub mod core;
pub mod data;

// Re-export primary modules for shared use in tests and other binaries
pub mod config;
pub mod customer_quality;
pub mod db;
pub mod db_storage;
pub mod errors;
pub mod geo;
pub mod handlers;
pub mod lead_scoring;
pub mod models;
pub mod presence;
pub mod price_benchmark;
pub mod services;

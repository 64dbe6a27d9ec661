//! # Spotledger - hourly electricity cost ledger
//!
//! Joins metered hourly consumption with hourly spot prices and keeps the
//! result cached per calendar year.
//!
//! ## Features
//!
//! - **Exact joins**: local and UTC timestamps fold into one canonical UTC key,
//!   including across daylight-saving transitions
//! - **Resilient fetching**: bounded exponential backoff on transient upstream failures
//! - **Fixed-precision money**: decimal rounding for prices and costs
//! - **Year cache**: JSON blob per year with staleness rules and stale fallback
//! - **Configuration**: YAML-based configuration with validation
//!
//! ## Architecture
//!
//! - `timestamp`: canonical UTC hour keys
//! - `fetch`: HTTP client with retry and backoff
//! - `providers`: consumption, price and credential collaborators
//! - `price_index`: VAT-inclusive price lookup
//! - `reconcile`: consumption/price join and monthly roll-up
//! - `ledger`: output records and money rounding
//! - `cache`: per-year dataset cache
//! - `service`: public API used by the presentation layer
//! - `clock`: injectable time source
//! - `config`: Configuration management and validation
//! - `logging`: Structured logging and tracing

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod fetch;
pub mod ledger;
pub mod logging;
pub mod price_index;
pub mod providers;
pub mod reconcile;
pub mod service;
pub mod timestamp;

// Re-export commonly used types
pub use config::Config;
pub use error::{LedgerError, Result};
pub use ledger::{CombinedRecord, MonthlySummary, YearlyDataset};
pub use service::LedgerService;

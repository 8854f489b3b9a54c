//! # tally-lookup: Barcode Resolution Engine for Tally
//!
//! Turns a scanned barcode into a product record by asking, in order, the
//! crowdsourced cloud store, a race of public catalogs and a backup catalog.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Resolution Pipeline                             │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                 ScanService (front-end facing)                   │  │
//! │  │  local history hit? ── confirm ── background cloud publish       │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │  ┌────────────────────────────▼─────────────────────────────────────┐  │
//! │  │                 SearchCoordinator (single-flight)                │  │
//! │  │                                                                  │  │
//! │  │   CloudStore ──► classify ──► N-way catalog race ──► backup      │  │
//! │  │                   (books                (first Found wins,       │  │
//! │  │                    stop here)            others cancelled)       │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ RestCloudStore │  │OpenFactsClient │  │   UpcItemDbClient      │    │
//! │  │ GET / PATCH    │  │ ×N (food,      │  │   backup catalog       │    │
//! │  │ + backoff      │  │ beauty, prod.) │  │                        │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`coordinator`] - `SearchCoordinator` phase machine
//! - [`service`] - `ScanService` (history, confirm, publish, tax)
//! - [`source`] - client traits and the cancellable `LookupHandle`
//! - [`catalog`] - Open*Facts client
//! - [`backup`] - UPCitemdb client
//! - [`cloud`] - crowdsourced document store client
//! - [`config`] - TOML + environment configuration
//! - [`error`] - Lookup error types
//!
//! ## Usage Example
//! ```rust,ignore
//! use tally_lookup::{LookupConfig, ScanResult, ScanService};
//! use tally_db::{Database, DbConfig};
//!
//! let config = LookupConfig::load_or_default(None);
//! let db = Database::new(DbConfig::new(config.database_path())).await?;
//! let service = ScanService::from_config(&config, db, None)?;
//!
//! match service.scan(&barcode).await? {
//!     ScanResult::Known(stored) => println!("{}", stored.name),
//!     ScanResult::Resolved(outcome) => println!("{}", outcome.kind()),
//!     ScanResult::Busy => {}
//! }
//! ```

pub mod backup;
pub mod catalog;
pub mod cloud;
pub mod config;
pub mod coordinator;
pub mod error;
mod http;
pub mod service;
pub mod source;

#[cfg(test)]
pub(crate) mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use backup::UpcItemDbClient;
pub use catalog::OpenFactsClient;
pub use cloud::RestCloudStore;
pub use config::LookupConfig;
pub use coordinator::{
    NoOpObserver, SearchCoordinator, SearchCoordinatorBuilder, SearchObserver, SearchPhase,
    SearchSettings,
};
pub use error::{LookupError, Result};
pub use service::{ConfirmReceipt, ScanResult, ScanService};
pub use source::{
    BackupCatalogClient, CatalogClient, CloudLookup, CloudStore, LookupHandle, LookupResult,
};

//! # Repository Module
//!
//! Database repository implementations for Tally.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ScanService                                                           │
//! │       │                                                                 │
//! │       │  db.products().find_by_barcode(&barcode)                       │
//! │       ▼                                                                 │
//! │  ProductRepository                                                     │
//! │  ├── find_by_barcode(&self, barcode)                                   │
//! │  ├── insert(&self, record, rate)                                       │
//! │  ├── list_recent(&self, limit)                                         │
//! │  ├── delete_all(&self)                                                 │
//! │  └── count(&self)                                                      │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`](product::ProductRepository) - Scan history

pub mod product;

//! # parley-store
//!
//! Durable snapshots of batch state on `SQLite`.
//!
//! The scheduler writes a full [`parley_core::batch::BatchRecord`] snapshot
//! on every significant transition (created, each scenario completion,
//! completed); [`store::BatchStore::load_all`] reconstructs the catalog at
//! startup so a restarted process can still answer "what batches exist and
//! what was their last known state".
//!
//! Sessions that were running at crash time are not resumed — their batch
//! loads back exactly as last snapshotted and reads as incomplete.
//!
//! ## Crate Position
//!
//! Persistence layer. Depends on parley-core. Depended on by parley-runtime.

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;
pub mod migrations;
pub mod store;

pub use connection::{ConnectionConfig, ConnectionPool, new_file, new_in_memory};
pub use errors::{Result, StoreError};
pub use migrations::run_migrations;
pub use store::BatchStore;

//! Storage abstraction and implementations for paceline.
//!
//! This crate provides the two read interfaces the derivation engines
//! consume - the content catalog and the progress-record store - plus the
//! write path that populates them, with JSON-file and SQLite backends.

#![warn(missing_docs)]

pub mod trait_;

#[cfg(feature = "json")]
pub mod json_store;

#[cfg(feature = "sqlite")]
pub mod sqlite_store;

pub use trait_::{CatalogStore, ProgressAggregateRow, ProgressStore, Result, StorageError};

#[cfg(feature = "json")]
pub use json_store::JsonStore;

#[cfg(feature = "sqlite")]
pub use sqlite_store::SqliteStore;

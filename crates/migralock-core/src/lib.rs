//! Change log lock protocol for serializing schema migrations.
//!
//! This crate implements the table-backed mutual-exclusion protocol that migration
//! runners use to make sure only one process applies changes to a database at a time.
//! The `TableLockService` drives the probe → read → conditional write → commit state
//! machine over any `ChangelogDatabase`, `GatedLockService` bypasses it entirely when
//! locking is disabled in `LockConfig`, and `sql` renders the lock statements for the
//! supported dialects. An in-memory `mock` database is provided for tests.

pub mod concurrency;
pub mod config;
pub mod database;
pub mod gated;
pub mod mock;
pub mod probe;
pub mod quoting;
pub mod service;
pub mod sql;
pub mod table;

pub use concurrency::{install_signal_handler, request_shutdown, shutdown_requested};
pub use config::{ConfigError, DatabaseSection, LockConfig, LockSection, TableSection};
pub use database::{ChangelogDatabase, DatabaseError, LockGrant, ProbeConnection, TableRef};
pub use gated::GatedLockService;
pub use probe::{probe_lock_table, table_exists, TableProbe};
pub use quoting::{QuotingScope, QuotingStrategy};
pub use service::{LockInfo, LockService, LockState, ReleaseOutcome};
pub use sql::{LockStatement, SqlDialect};
pub use table::TableLockService;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("could not acquire change log lock after {waited_secs}s; currently locked by {holder}")]
    Timeout { waited_secs: u64, holder: String },
    #[error("interrupted while waiting for change log lock")]
    Interrupted,
}

use crate::quoting::QuotingStrategy;
use crate::service::LockInfo;
use crate::sql::{LockStatement, SqlDialect};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Default name of the shared lock table.
pub const DEFAULT_LOCK_TABLE: &str = "DATABASECHANGELOGLOCK";

/// Failures reported by a database backend.
///
/// The split matters to the lock table prober: a `Sql` failure on the probe
/// query means the table is absent, a `Connection` failure means the probe
/// could not be performed at all. `LockTaken` is contention, not failure: the
/// lock write found the row already locked by someone else.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DatabaseError {
    #[error("SQL error: {0}")]
    Sql(String),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("lock row already taken: {0}")]
    LockTaken(String),
}

/// Location of the lock table, before escaping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    pub catalog: Option<String>,
    pub schema: Option<String>,
    pub name: String,
}

impl TableRef {
    pub fn new(name: &str) -> Self {
        Self {
            catalog: None,
            schema: None,
            name: name.to_owned(),
        }
    }

    #[must_use]
    pub fn with_schema(mut self, schema: &str) -> Self {
        self.schema = Some(schema.to_owned());
        self
    }

    #[must_use]
    pub fn with_catalog(mut self, catalog: &str) -> Self {
        self.catalog = Some(catalog.to_owned());
        self
    }
}

impl Default for TableRef {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_TABLE)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(catalog) = &self.catalog {
            write!(f, "{catalog}.")?;
        }
        if let Some(schema) = &self.schema {
            write!(f, "{schema}.")?;
        }
        write!(f, "{}", self.name)
    }
}

/// Who took the lock and when; written into the lock row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockGrant {
    pub locked_by: String,
    pub granted: DateTime<Utc>,
}

impl LockGrant {
    pub fn now(locked_by: &str) -> Self {
        Self {
            locked_by: locked_by.to_owned(),
            granted: Utc::now(),
        }
    }
}

/// A short-lived connection used only to probe for the lock table.
pub trait ProbeConnection {
    /// Run a query and discard its rows.
    fn query(&mut self, sql: &str) -> Result<(), DatabaseError>;
}

/// The database session a lock service drives.
///
/// Writes are transactional: `execute` may open a transaction that stays open
/// until `commit` or `rollback`. Both must be safe to call with no transaction
/// open. Escaping honours the current quoting strategy.
pub trait ChangelogDatabase {
    type Probe: ProbeConnection;

    fn dialect(&self) -> SqlDialect;

    fn lock_table(&self) -> &TableRef;

    fn quoting_strategy(&self) -> QuotingStrategy;

    fn set_quoting_strategy(&mut self, strategy: QuotingStrategy);

    /// Allow or forbid caching of change log table metadata across calls.
    fn set_can_cache_table_info(&mut self, enabled: bool);

    /// Open a separate connection for probing.
    fn connect(&self) -> Result<Self::Probe, DatabaseError>;

    fn execute(&mut self, statement: &LockStatement) -> Result<(), DatabaseError>;

    /// Read the LOCKED column of the lock row. `None` when the row is missing
    /// or the column is NULL.
    fn query_locked(&mut self) -> Result<Option<bool>, DatabaseError>;

    /// All rows currently marked as locked.
    fn query_locks(&mut self) -> Result<Vec<LockInfo>, DatabaseError>;

    fn commit(&mut self) -> Result<(), DatabaseError>;

    fn rollback(&mut self) -> Result<(), DatabaseError>;

    fn escape_table_name(&self, table: &TableRef) -> String {
        self.dialect()
            .escape_table_name(table, self.quoting_strategy())
    }

    fn escaped_lock_table(&self) -> String {
        self.escape_table_name(self.lock_table())
    }

    fn probe_query(&self) -> String {
        self.dialect().probe_query(&self.escaped_lock_table())
    }

    /// Render a statement against the lock table.
    fn render(&self, statement: &LockStatement) -> String {
        self.dialect()
            .render(statement, &self.escaped_lock_table())
    }
}

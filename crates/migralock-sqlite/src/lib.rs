//! SQLite change log database for migralock.
//!
//! `SqliteDatabase` keeps one long-lived connection for lock writes and opens a
//! separate short-lived connection for every lock table probe. The first write
//! after a commit or rollback starts a `BEGIN IMMEDIATE` transaction, so two
//! processes racing for the lock serialize on SQLite's write lock. The lock
//! write is an upsert that only takes an unlocked row, so the loser's write
//! changes nothing and comes back as `LockTaken`.

use chrono::{DateTime, Utc};
use migralock_core::{
    ChangelogDatabase, DatabaseError, LockInfo, LockStatement, ProbeConnection, QuotingStrategy,
    SqlDialect, TableRef,
};
use rusqlite::{Connection, ErrorCode, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, trace};

/// How long a statement waits on another connection's write lock.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Map a driver error onto the backend-neutral split.
///
/// Errors that mean the database file itself could not be reached are
/// connection failures; everything else, including constraint violations and
/// missing tables, is an SQL failure.
#[allow(clippy::needless_pass_by_value)]
pub fn classify(err: rusqlite::Error) -> DatabaseError {
    let unreachable = match &err {
        rusqlite::Error::SqliteFailure(e, _) => matches!(
            e.code,
            ErrorCode::CannotOpen
                | ErrorCode::NotADatabase
                | ErrorCode::PermissionDenied
                | ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::SystemIoFailure
        ),
        rusqlite::Error::InvalidPath(_) => true,
        _ => false,
    };
    if unreachable {
        DatabaseError::Connection(err.to_string())
    } else {
        DatabaseError::Sql(err.to_string())
    }
}

pub struct SqliteDatabase {
    conn: Connection,
    path: PathBuf,
    table: TableRef,
    quoting: QuotingStrategy,
    can_cache_table_info: bool,
    busy_timeout: Duration,
}

impl SqliteDatabase {
    /// Open (creating if needed) the database file at `path`.
    pub fn open(path: &Path, table: TableRef) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(classify)?;
        conn.busy_timeout(DEFAULT_BUSY_TIMEOUT).map_err(classify)?;
        debug!("opened change log database {}", path.display());
        Ok(Self {
            conn,
            path: path.to_path_buf(),
            table,
            quoting: QuotingStrategy::default(),
            can_cache_table_info: false,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        })
    }

    #[must_use]
    pub fn with_quoting(mut self, quoting: QuotingStrategy) -> Self {
        self.quoting = quoting;
        self
    }

    pub fn set_busy_timeout(&mut self, timeout: Duration) -> Result<(), DatabaseError> {
        self.conn.busy_timeout(timeout).map_err(classify)?;
        self.busy_timeout = timeout;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    pub fn can_cache_table_info(&self) -> bool {
        self.can_cache_table_info
    }

    fn begin_if_needed(&mut self) -> Result<(), DatabaseError> {
        if self.conn.is_autocommit() {
            trace!("BEGIN IMMEDIATE");
            self.conn
                .execute_batch("BEGIN IMMEDIATE")
                .map_err(classify)?;
        }
        Ok(())
    }
}

pub struct SqliteProbe {
    conn: Connection,
}

impl ProbeConnection for SqliteProbe {
    fn query(&mut self, sql: &str) -> Result<(), DatabaseError> {
        let mut stmt = self.conn.prepare(sql).map_err(classify)?;
        let mut rows = stmt.query([]).map_err(classify)?;
        while rows.next().map_err(classify)?.is_some() {}
        Ok(())
    }
}

impl ChangelogDatabase for SqliteDatabase {
    type Probe = SqliteProbe;

    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }

    fn lock_table(&self) -> &TableRef {
        &self.table
    }

    fn quoting_strategy(&self) -> QuotingStrategy {
        self.quoting
    }

    fn set_quoting_strategy(&mut self, strategy: QuotingStrategy) {
        self.quoting = strategy;
    }

    fn set_can_cache_table_info(&mut self, enabled: bool) {
        trace!("table info caching {}", if enabled { "on" } else { "off" });
        self.can_cache_table_info = enabled;
    }

    fn connect(&self) -> Result<SqliteProbe, DatabaseError> {
        // No CREATE flag: probing must never bring a database into existence.
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(classify)?;
        conn.busy_timeout(self.busy_timeout).map_err(classify)?;
        Ok(SqliteProbe { conn })
    }

    fn execute(&mut self, statement: &LockStatement) -> Result<(), DatabaseError> {
        let sql = self.render(statement);
        self.begin_if_needed()?;
        trace!("{sql}");
        match statement {
            LockStatement::Lock(grant) => {
                let changed = self.conn.execute(&sql, []).map_err(classify)?;
                if changed == 0 {
                    return Err(DatabaseError::LockTaken(format!(
                        "{} found the row locked",
                        grant.locked_by
                    )));
                }
                Ok(())
            }
            _ => self.conn.execute_batch(&sql).map_err(classify),
        }
    }

    fn query_locked(&mut self) -> Result<Option<bool>, DatabaseError> {
        let sql = self.render(&LockStatement::SelectLocked);
        trace!("{sql}");
        let locked: Option<Option<bool>> = self
            .conn
            .query_row(&sql, [], |row| row.get(0))
            .optional()
            .map_err(classify)?;
        Ok(locked.flatten())
    }

    fn query_locks(&mut self) -> Result<Vec<LockInfo>, DatabaseError> {
        let sql = self.render(&LockStatement::SelectLocks);
        trace!("{sql}");
        let mut stmt = self.conn.prepare(&sql).map_err(classify)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(LockInfo {
                    id: row.get(0)?,
                    granted: row.get::<_, Option<String>>(2)?.and_then(|s| parse_granted(&s)),
                    locked_by: row.get(3)?,
                })
            })
            .map_err(classify)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(classify)
    }

    fn commit(&mut self) -> Result<(), DatabaseError> {
        if self.in_transaction() {
            trace!("COMMIT");
            self.conn.execute_batch("COMMIT").map_err(classify)?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DatabaseError> {
        if self.in_transaction() {
            trace!("ROLLBACK");
            self.conn.execute_batch("ROLLBACK").map_err(classify)?;
        }
        Ok(())
    }
}

fn parse_granted(value: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(value) {
        Ok(t) => Some(t.with_timezone(&Utc)),
        Err(e) => {
            debug!("ignoring unparseable LOCKGRANTED '{value}': {e}");
            None
        }
    }
}

//! In-memory `ChangelogDatabase` for tests.
//!
//! Handles created with [`MockDatabase::session`] share committed state, so two
//! handles behave like two processes pointed at the same database. Every call is
//! recorded in a journal and any operation can be made to fail.

use crate::database::{ChangelogDatabase, DatabaseError, ProbeConnection, TableRef};
use crate::quoting::QuotingStrategy;
use crate::service::LockInfo;
use crate::sql::{LockStatement, SqlDialect};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    Connect,
    Probe,
    CreateLockTable,
    Lock,
    Unlock,
    DropLockTable,
    QueryLocked,
    QueryLocks,
    Commit,
    Rollback,
}

impl MockOp {
    fn for_statement(statement: &LockStatement) -> Self {
        match statement {
            LockStatement::CreateLockTable => MockOp::CreateLockTable,
            LockStatement::Lock(_) => MockOp::Lock,
            LockStatement::Unlock => MockOp::Unlock,
            LockStatement::DropLockTable => MockOp::DropLockTable,
            LockStatement::SelectLocked => MockOp::QueryLocked,
            LockStatement::SelectLocks => MockOp::QueryLocks,
        }
    }
}

#[derive(Debug, Clone)]
struct MockRow {
    locked: Option<bool>,
    locked_by: Option<String>,
    granted: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
struct TableState {
    exists: bool,
    row: Option<MockRow>,
}

#[derive(Debug, Default)]
struct Shared {
    committed: TableState,
    /// Remaining successful calls before an operation starts failing.
    failures: HashMap<MockOp, usize>,
    journal: Vec<String>,
    statements: Vec<String>,
    /// Owner whose lock is committed right after the next LOCKED read.
    lock_after_read: Option<String>,
}

impl Shared {
    fn trip(&mut self, op: MockOp) -> bool {
        match self.failures.get_mut(&op) {
            Some(0) => true,
            Some(remaining) => {
                *remaining -= 1;
                false
            }
            None => false,
        }
    }
}

pub struct MockDatabase {
    shared: Arc<Mutex<Shared>>,
    pending: Option<TableState>,
    table: TableRef,
    dialect: SqlDialect,
    quoting: QuotingStrategy,
    can_cache_table_info: bool,
}

impl Default for MockDatabase {
    fn default() -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared::default())),
            pending: None,
            table: TableRef::default(),
            dialect: SqlDialect::Sqlite,
            quoting: QuotingStrategy::Legacy,
            can_cache_table_info: false,
        }
    }
}

impl MockDatabase {
    /// A database without a lock table.
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_lock_table(self) -> Self {
        self.shared().committed.exists = true;
        self
    }

    /// Create the lock table holding one row with the given LOCKED value.
    #[must_use]
    pub fn with_remote_locked(self, locked: Option<bool>) -> Self {
        {
            let mut shared = self.shared();
            shared.committed.exists = true;
            shared.committed.row = Some(MockRow {
                locked,
                locked_by: Some("other@host".to_owned()),
                granted: Some(Utc::now()),
            });
        }
        self
    }

    #[must_use]
    pub fn with_table(mut self, table: TableRef) -> Self {
        self.table = table;
        self
    }

    #[must_use]
    pub fn with_dialect(mut self, dialect: SqlDialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Another session on the same database.
    pub fn session(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            pending: None,
            table: self.table.clone(),
            dialect: self.dialect,
            quoting: QuotingStrategy::Legacy,
            can_cache_table_info: false,
        }
    }

    pub fn fail(&self, op: MockOp) {
        self.fail_after(op, 0);
    }

    /// Let `op` succeed `successes` more times, then fail on every call.
    pub fn fail_after(&self, op: MockOp, successes: usize) {
        self.shared().failures.insert(op, successes);
    }

    /// Let a rival commit its lock between the next LOCKED read and the lock
    /// write, as when two processes both read "unlocked".
    pub fn lock_after_next_read(&self, owner: &str) {
        self.shared().lock_after_read = Some(owner.to_owned());
    }

    pub fn heal(&self, op: MockOp) {
        self.shared().failures.remove(&op);
    }

    pub fn journal(&self) -> Vec<String> {
        self.shared().journal.clone()
    }

    /// Number of journal entries equal to `entry`.
    pub fn count(&self, entry: &str) -> usize {
        self.shared().journal.iter().filter(|e| *e == entry).count()
    }

    /// Rendered SQL of every executed statement, in order.
    pub fn statements(&self) -> Vec<String> {
        self.shared().statements.clone()
    }

    pub fn clear_journal(&self) {
        let mut shared = self.shared();
        shared.journal.clear();
        shared.statements.clear();
    }

    /// Committed LOCKED value, `None` when there is no row or no table.
    pub fn remote_locked(&self) -> Option<bool> {
        self.shared()
            .committed
            .row
            .as_ref()
            .and_then(|row| row.locked)
    }

    pub fn lock_table_exists(&self) -> bool {
        self.shared().committed.exists
    }

    pub fn has_open_transaction(&self) -> bool {
        self.pending.is_some()
    }

    pub fn can_cache_table_info(&self) -> bool {
        self.can_cache_table_info
    }

    fn shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Journal the call and fail it if requested.
    fn record(&self, entry: String, op: MockOp) -> Result<(), DatabaseError> {
        let mut shared = self.shared();
        shared.journal.push(entry);
        if shared.trip(op) {
            return Err(match op {
                MockOp::Connect | MockOp::Probe => {
                    DatabaseError::Connection("injected connection failure".to_owned())
                }
                other => DatabaseError::Sql(format!("injected failure on {other:?}")),
            });
        }
        Ok(())
    }

    fn visible_state(&self) -> TableState {
        match &self.pending {
            Some(pending) => pending.clone(),
            None => self.shared().committed.clone(),
        }
    }
}

pub struct MockProbe {
    shared: Arc<Mutex<Shared>>,
}

impl ProbeConnection for MockProbe {
    fn query(&mut self, sql: &str) -> Result<(), DatabaseError> {
        let mut shared = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        shared.journal.push(format!("probe {sql}"));
        if shared.trip(MockOp::Probe) {
            return Err(DatabaseError::Connection("connection reset".to_owned()));
        }
        if shared.committed.exists {
            Ok(())
        } else {
            Err(DatabaseError::Sql("no such table".to_owned()))
        }
    }
}

impl ChangelogDatabase for MockDatabase {
    type Probe = MockProbe;

    fn dialect(&self) -> SqlDialect {
        self.dialect
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
        self.can_cache_table_info = enabled;
    }

    fn connect(&self) -> Result<MockProbe, DatabaseError> {
        self.record("connect".to_owned(), MockOp::Connect)?;
        Ok(MockProbe {
            shared: Arc::clone(&self.shared),
        })
    }

    fn execute(&mut self, statement: &LockStatement) -> Result<(), DatabaseError> {
        let sql = self.render(statement);
        self.record(
            format!("execute {}", statement.kind()),
            MockOp::for_statement(statement),
        )?;
        self.shared().statements.push(sql);

        let committed_locked = self
            .shared()
            .committed
            .row
            .as_ref()
            .is_some_and(|row| row.locked == Some(true));
        let mut working = self.visible_state();

        match statement {
            LockStatement::CreateLockTable => working.exists = true,
            LockStatement::Lock(grant) => {
                if !working.exists {
                    return Err(DatabaseError::Sql("no such table".to_owned()));
                }
                let pending_locked = working
                    .row
                    .as_ref()
                    .is_some_and(|row| row.locked == Some(true));
                if committed_locked || pending_locked {
                    return Err(DatabaseError::LockTaken("LOCKED = 1".to_owned()));
                }
                working.row = Some(MockRow {
                    locked: Some(true),
                    locked_by: Some(grant.locked_by.clone()),
                    granted: Some(grant.granted),
                });
            }
            LockStatement::Unlock => {
                if !working.exists {
                    return Err(DatabaseError::Sql("no such table".to_owned()));
                }
                working.row = None;
            }
            LockStatement::DropLockTable => working = TableState::default(),
            LockStatement::SelectLocked | LockStatement::SelectLocks => {}
        }

        self.pending = Some(working);
        Ok(())
    }

    fn query_locked(&mut self) -> Result<Option<bool>, DatabaseError> {
        self.record("query locked".to_owned(), MockOp::QueryLocked)?;
        let state = self.visible_state();
        if !state.exists {
            return Err(DatabaseError::Sql("no such table".to_owned()));
        }
        let mut shared = self.shared();
        if let Some(owner) = shared.lock_after_read.take() {
            shared.committed.row = Some(MockRow {
                locked: Some(true),
                locked_by: Some(owner),
                granted: Some(Utc::now()),
            });
        }
        Ok(state.row.and_then(|row| row.locked))
    }

    fn query_locks(&mut self) -> Result<Vec<LockInfo>, DatabaseError> {
        self.record("query locks".to_owned(), MockOp::QueryLocks)?;
        let state = self.visible_state();
        if !state.exists {
            return Err(DatabaseError::Sql("no such table".to_owned()));
        }
        Ok(state
            .row
            .filter(|row| row.locked == Some(true))
            .map(|row| LockInfo {
                id: 1,
                locked_by: row.locked_by,
                granted: row.granted,
            })
            .into_iter()
            .collect())
    }

    fn commit(&mut self) -> Result<(), DatabaseError> {
        self.record("commit".to_owned(), MockOp::Commit)?;
        if let Some(pending) = self.pending.take() {
            self.shared().committed = pending;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DatabaseError> {
        self.pending = None;
        self.record("rollback".to_owned(), MockOp::Rollback)
    }
}

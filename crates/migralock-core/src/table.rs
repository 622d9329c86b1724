//! The table-backed change log lock.
//!
//! Acquisition is probe → read LOCKED → conditional lock write → commit, with a
//! rollback before and after so that no transaction is left open whichever step
//! fails. The read is only a fast path: two processes can both read "unlocked",
//! and it is the lock write itself (an insert that only takes an unlocked row)
//! that lets exactly one of them commit. The others see `LockTaken` and report
//! plain contention.
//!
//! Release is forgiving. Local state is reset and the quoting strategy restored
//! even when the remote unlock fails, so a broken connection cannot leave the
//! process believing it still holds the lock.

use crate::config::{default_owner, LockConfig};
use crate::database::{ChangelogDatabase, DatabaseError, LockGrant};
use crate::probe::{probe_lock_table, table_exists, TableProbe};
use crate::quoting::{QuotingScope, QuotingStrategy};
use crate::service::{LockInfo, LockService, LockState, ReleaseOutcome};
use crate::sql::LockStatement;
use crate::{concurrency, LockError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const DEFAULT_WAIT_TIME: Duration = Duration::from_secs(300);
const DEFAULT_RECHECK_TIME: Duration = Duration::from_secs(10);
/// Longest stretch `wait_for_lock` sleeps before looking at the interrupt flag.
const INTERRUPT_POLL: Duration = Duration::from_millis(100);

#[derive(Debug)]
struct Bookkeeping {
    state: LockState,
    /// Quoting strategy in effect when the lock was last acquired.
    stashed_quoting: Option<QuotingStrategy>,
    table_initialized: bool,
    wait_time: Duration,
    recheck_time: Duration,
    locked_by: String,
    interrupted: fn() -> bool,
}

pub struct TableLockService<D: ChangelogDatabase> {
    database: D,
    book: Bookkeeping,
}

impl<D: ChangelogDatabase> TableLockService<D> {
    pub fn new(database: D) -> Self {
        Self {
            database,
            book: Bookkeeping {
                state: LockState::Unknown,
                stashed_quoting: None,
                table_initialized: false,
                wait_time: DEFAULT_WAIT_TIME,
                recheck_time: DEFAULT_RECHECK_TIME,
                locked_by: default_owner(),
                interrupted: concurrency::shutdown_requested,
            },
        }
    }

    pub fn from_config(database: D, config: &LockConfig) -> Self {
        let mut service = Self::new(database);
        service.book.wait_time = config.wait_time();
        service.book.recheck_time = config.recheck_time();
        service.book.locked_by = config.locked_by();
        service
    }

    #[must_use]
    pub fn with_locked_by(mut self, owner: &str) -> Self {
        owner.clone_into(&mut self.book.locked_by);
        self
    }

    /// Replace the check that aborts `wait_for_lock` (the Ctrl-C flag by default).
    #[must_use]
    pub fn with_interrupt(mut self, interrupted: fn() -> bool) -> Self {
        self.book.interrupted = interrupted;
        self
    }

    pub fn state(&self) -> LockState {
        self.book.state
    }

    pub fn wait_time(&self) -> Duration {
        self.book.wait_time
    }

    pub fn recheck_time(&self) -> Duration {
        self.book.recheck_time
    }

    pub fn locked_by(&self) -> &str {
        &self.book.locked_by
    }

    pub fn database(&self) -> &D {
        &self.database
    }

    pub fn database_mut(&mut self) -> &mut D {
        &mut self.database
    }

    pub fn into_database(self) -> D {
        self.database
    }

    pub fn probe(&self) -> TableProbe {
        probe_lock_table(&self.database)
    }

    pub fn table_exists(&self) -> bool {
        table_exists(&self.database)
    }
}

fn rollback_quietly<D: ChangelogDatabase>(database: &mut D) {
    if let Err(e) = database.rollback() {
        warn!("rollback failed: {e}");
    }
}

fn initialize<D: ChangelogDatabase>(
    database: &mut D,
    book: &mut Bookkeeping,
) -> Result<(), LockError> {
    if book.table_initialized {
        return Ok(());
    }
    if !table_exists(database) {
        info!("creating change log lock table '{}'", database.lock_table());
        database.execute(&LockStatement::CreateLockTable)?;
        database.commit()?;
    }
    book.table_initialized = true;
    Ok(())
}

fn try_acquire<D: ChangelogDatabase>(
    database: &mut D,
    book: &mut Bookkeeping,
) -> Result<bool, LockError> {
    database.rollback()?;
    initialize(database, book)?;

    if database.query_locked()? == Some(true) {
        debug!("change log lock is held by another process");
        book.state = LockState::NotHeld;
        return Ok(false);
    }

    let statement = LockStatement::Lock(LockGrant::now(&book.locked_by));
    debug!("lock change log: {}", database.render(&statement));
    match database.execute(&statement) {
        Ok(()) => {}
        Err(DatabaseError::LockTaken(e)) => {
            debug!("lost the race for the change log lock: {e}");
            book.state = LockState::NotHeld;
            return Ok(false);
        }
        Err(e) => return Err(e.into()),
    }
    database.commit()?;
    info!("change log lock has been successfully acquired");

    book.state = LockState::HeldBySelf;
    database.set_can_cache_table_info(true);
    Ok(true)
}

/// Sleep for `duration`, waking every `INTERRUPT_POLL` to check `interrupted`.
/// Returns `true` if the sleep was cut short.
fn sleep_unless_interrupted(duration: Duration, interrupted: fn() -> bool) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        thread::sleep(INTERRUPT_POLL.min(deadline - now));
        if interrupted() {
            return true;
        }
    }
}

fn try_release<D: ChangelogDatabase>(database: &mut D) -> Result<ReleaseOutcome, LockError> {
    if !table_exists(database) {
        debug!("no change log lock table, nothing to unlock");
        return Ok(ReleaseOutcome::TableAbsent);
    }
    database.rollback()?;
    debug!("release change log lock: {}", database.render(&LockStatement::Unlock));
    database.execute(&LockStatement::Unlock)?;
    database.commit()?;
    Ok(ReleaseOutcome::Released)
}

impl<D: ChangelogDatabase> LockService for TableLockService<D> {
    fn init(&mut self) -> Result<(), LockError> {
        let result = initialize(&mut self.database, &mut self.book);
        if result.is_err() {
            rollback_quietly(&mut self.database);
        }
        result
    }

    fn acquire(&mut self) -> Result<bool, LockError> {
        if self.book.state == LockState::HeldBySelf {
            return Ok(true);
        }

        let incoming = self.database.quoting_strategy();
        self.book.stashed_quoting = Some(incoming);

        let mut database = QuotingScope::enter(&mut self.database, Some(incoming));
        let outcome = try_acquire(&mut *database, &mut self.book);
        rollback_quietly(&mut *database);
        outcome
    }

    fn release(&mut self) -> ReleaseOutcome {
        let mut database = QuotingScope::enter(&mut self.database, self.book.stashed_quoting);

        let outcome = try_release(&mut *database).unwrap_or_else(|e| {
            error!("failed to release change log lock: {e}");
            ReleaseOutcome::Failed(e)
        });

        self.book.state = LockState::NotHeld;
        database.set_can_cache_table_info(false);
        if !outcome.is_failed() {
            info!("change log lock has been successfully released");
        }
        rollback_quietly(&mut *database);
        outcome
    }

    fn has_lock(&self) -> bool {
        self.book.state == LockState::HeldBySelf
    }

    fn wait_for_lock(&mut self) -> Result<(), LockError> {
        let started = Instant::now();
        loop {
            if self.acquire()? {
                return Ok(());
            }
            if (self.book.interrupted)() {
                return Err(LockError::Interrupted);
            }
            let elapsed = started.elapsed();
            if elapsed >= self.book.wait_time {
                break;
            }
            info!("waiting for change log lock...");
            let pause = self.book.recheck_time.min(self.book.wait_time - elapsed);
            if sleep_unless_interrupted(pause, self.book.interrupted) {
                return Err(LockError::Interrupted);
            }
        }

        let holder = self
            .list_locks()?
            .first()
            .map_or_else(|| "UNKNOWN".to_owned(), LockInfo::describe);
        Err(LockError::Timeout {
            waited_secs: self.book.wait_time.as_secs(),
            holder,
        })
    }

    fn list_locks(&mut self) -> Result<Vec<LockInfo>, LockError> {
        if !self.table_exists() {
            return Ok(Vec::new());
        }
        Ok(self.database.query_locks()?)
    }

    fn force_release(&mut self) -> Result<ReleaseOutcome, LockError> {
        self.init()?;
        Ok(self.release())
    }

    fn reset(&mut self) {
        self.book.state = LockState::Unknown;
        self.book.table_initialized = false;
        self.book.stashed_quoting = None;
    }

    fn destroy(&mut self) -> Result<(), LockError> {
        if self.table_exists() {
            info!("dropping change log lock table '{}'", self.database.lock_table());
            let result = self
                .database
                .execute(&LockStatement::DropLockTable)
                .and_then(|()| self.database.commit());
            if let Err(e) = result {
                rollback_quietly(&mut self.database);
                return Err(e.into());
            }
        }
        self.reset();
        Ok(())
    }

    fn set_wait_time(&mut self, wait: Duration) {
        self.book.wait_time = wait;
    }

    fn set_recheck_time(&mut self, recheck: Duration) {
        self.book.recheck_time = recheck;
    }
}

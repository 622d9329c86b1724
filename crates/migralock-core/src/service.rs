use crate::LockError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Process-local view of the change log lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    #[default]
    Unknown,
    HeldBySelf,
    NotHeld,
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockState::Unknown => write!(f, "unknown"),
            LockState::HeldBySelf => write!(f, "held"),
            LockState::NotHeld => write!(f, "not held"),
        }
    }
}

/// A row of the lock table that is currently locked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub id: i64,
    pub locked_by: Option<String>,
    pub granted: Option<DateTime<Utc>>,
}

impl LockInfo {
    /// "<owner> since <time>", with `UNKNOWN` for missing parts.
    pub fn describe(&self) -> String {
        let owner = self.locked_by.as_deref().unwrap_or("UNKNOWN");
        match self.granted {
            Some(granted) => format!("{owner} since {}", granted.to_rfc3339()),
            None => owner.to_owned(),
        }
    }
}

/// What a release did. Release never fails outward; a failed remote unlock is
/// reported here after local cleanup has already run.
#[derive(Debug)]
#[must_use]
pub enum ReleaseOutcome {
    /// The unlock statement was executed and committed.
    Released,
    /// There was no lock table, so nothing remote to release.
    TableAbsent,
    /// Locking is disabled.
    Skipped,
    /// The remote unlock failed; local state was reset anyway.
    Failed(LockError),
}

impl ReleaseOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, ReleaseOutcome::Failed(_))
    }

    /// Convert into a `Result`, surfacing a failed remote unlock.
    pub fn into_result(self) -> Result<(), LockError> {
        match self {
            ReleaseOutcome::Failed(e) => Err(e),
            _ => Ok(()),
        }
    }
}

/// Lifecycle surface a migration runner expects from a lock backend.
pub trait LockService {
    /// Create the lock table if it does not exist yet.
    fn init(&mut self) -> Result<(), LockError>;

    /// Try once to take the lock. `Ok(false)` means another process holds it.
    fn acquire(&mut self) -> Result<bool, LockError>;

    fn release(&mut self) -> ReleaseOutcome;

    fn has_lock(&self) -> bool;

    /// Retry `acquire` until it succeeds or the wait time runs out.
    fn wait_for_lock(&mut self) -> Result<(), LockError>;

    fn list_locks(&mut self) -> Result<Vec<LockInfo>, LockError>;

    /// Release regardless of who holds the lock.
    fn force_release(&mut self) -> Result<ReleaseOutcome, LockError>;

    /// Forget all local state.
    fn reset(&mut self);

    /// Drop the lock table.
    fn destroy(&mut self) -> Result<(), LockError>;

    fn set_wait_time(&mut self, wait: Duration);

    fn set_recheck_time(&mut self, recheck: Duration);
}

use crate::config::LockConfig;
use crate::service::{LockInfo, LockService, ReleaseOutcome};
use crate::LockError;
use std::time::Duration;
use tracing::debug;

/// Wraps a lock service behind the "locking enabled" toggle.
///
/// The toggle is read once at construction. While disabled, nothing reaches
/// the inner service and every call returns the value a caller would see if
/// it always held the lock: acquire succeeds, `has_lock` is true, there are
/// no locks to list, and release, wait and destroy do nothing.
pub struct GatedLockService<S> {
    inner: S,
    enabled: bool,
}

impl<S: LockService> GatedLockService<S> {
    pub fn new(inner: S, enabled: bool) -> Self {
        if !enabled {
            debug!("change log locking is disabled");
        }
        Self { inner, enabled }
    }

    pub fn from_config(inner: S, config: &LockConfig) -> Self {
        Self::new(inner, config.lock.enabled)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: LockService> LockService for GatedLockService<S> {
    fn init(&mut self) -> Result<(), LockError> {
        if self.enabled {
            self.inner.init()
        } else {
            Ok(())
        }
    }

    fn acquire(&mut self) -> Result<bool, LockError> {
        if self.enabled {
            self.inner.acquire()
        } else {
            Ok(true)
        }
    }

    fn release(&mut self) -> ReleaseOutcome {
        if self.enabled {
            self.inner.release()
        } else {
            ReleaseOutcome::Skipped
        }
    }

    fn has_lock(&self) -> bool {
        !self.enabled || self.inner.has_lock()
    }

    fn wait_for_lock(&mut self) -> Result<(), LockError> {
        if self.enabled {
            self.inner.wait_for_lock()
        } else {
            Ok(())
        }
    }

    fn list_locks(&mut self) -> Result<Vec<LockInfo>, LockError> {
        if self.enabled {
            self.inner.list_locks()
        } else {
            Ok(Vec::new())
        }
    }

    fn force_release(&mut self) -> Result<ReleaseOutcome, LockError> {
        if self.enabled {
            self.inner.force_release()
        } else {
            Ok(ReleaseOutcome::Skipped)
        }
    }

    fn reset(&mut self) {
        if self.enabled {
            self.inner.reset();
        }
    }

    fn destroy(&mut self) -> Result<(), LockError> {
        if self.enabled {
            self.inner.destroy()
        } else {
            Ok(())
        }
    }

    fn set_wait_time(&mut self, wait: Duration) {
        if self.enabled {
            self.inner.set_wait_time(wait);
        }
    }

    fn set_recheck_time(&mut self, recheck: Duration) {
        if self.enabled {
            self.inner.set_recheck_time(recheck);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDatabase;
    use crate::table::TableLockService;

    fn gated(db: MockDatabase, enabled: bool) -> GatedLockService<TableLockService<MockDatabase>> {
        GatedLockService::new(
            TableLockService::new(db)
                .with_locked_by("me@test")
                .with_interrupt(|| false),
            enabled,
        )
    }

    #[test]
    fn disabled_service_never_touches_database() {
        let db = MockDatabase::new().with_remote_locked(Some(true));
        let probe = db.session();
        let mut svc = gated(db, false);

        assert!(svc.acquire().unwrap());
        assert!(svc.has_lock());
        svc.wait_for_lock().unwrap();
        assert!(svc.list_locks().unwrap().is_empty());
        assert!(matches!(svc.release(), ReleaseOutcome::Skipped));
        assert!(svc.has_lock());
        assert!(matches!(
            svc.force_release().unwrap(),
            ReleaseOutcome::Skipped
        ));
        svc.init().unwrap();
        svc.reset();
        svc.destroy().unwrap();

        assert!(probe.journal().is_empty());
        assert_eq!(probe.remote_locked(), Some(true));
        assert!(probe.lock_table_exists());
    }

    #[test]
    fn disabled_service_ignores_timing_changes() {
        let mut svc = gated(MockDatabase::new(), false);
        svc.set_wait_time(Duration::from_secs(1));
        svc.set_recheck_time(Duration::from_secs(1));
        assert_eq!(svc.inner().wait_time(), Duration::from_secs(300));
        assert_eq!(svc.inner().recheck_time(), Duration::from_secs(10));
    }

    #[test]
    fn enabled_service_forwards() {
        let db = MockDatabase::new();
        let probe = db.session();
        let mut svc = gated(db, true);
        assert!(svc.is_enabled());

        assert!(!svc.has_lock());
        assert!(svc.acquire().unwrap());
        assert!(svc.has_lock());
        assert_eq!(probe.remote_locked(), Some(true));

        svc.set_recheck_time(Duration::from_secs(1));
        assert_eq!(svc.inner().recheck_time(), Duration::from_secs(1));

        assert!(matches!(svc.release(), ReleaseOutcome::Released));
        assert!(!svc.has_lock());
    }

    #[test]
    fn enabled_service_reports_contention() {
        let mut svc = gated(MockDatabase::new().with_remote_locked(Some(true)), true);
        assert!(!svc.acquire().unwrap());
        assert!(!svc.has_lock());
        assert_eq!(svc.list_locks().unwrap().len(), 1);
    }

    #[test]
    fn from_config_reads_toggle() {
        let mut config = LockConfig::default();
        config.lock.enabled = false;
        let svc = GatedLockService::from_config(TableLockService::new(MockDatabase::new()), &config);
        assert!(!svc.is_enabled());
    }
}

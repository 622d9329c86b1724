use super::{report_release, Service};
use migralock_core::LockService;
use tracing::warn;

/// Clear the lock whoever holds it. For recovering from a runner that died
/// without releasing.
pub fn run(svc: &mut Service, json: bool) -> Result<u8, String> {
    let previous = svc.list_locks().map_err(|e| e.to_string())?;
    for lock in &previous {
        warn!("forcing release of lock held by {}", lock.describe());
    }
    let outcome = svc.force_release().map_err(|e| e.to_string())?;
    report_release(&outcome, json)
}

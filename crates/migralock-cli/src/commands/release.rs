use super::{report_release, Service};
use migralock_core::LockService;

pub fn run(svc: &mut Service, json: bool) -> Result<u8, String> {
    let outcome = svc.release();
    report_release(&outcome, json)
}

use super::{spin_fail, spin_ok, spinner, wait_failure, Service, EXIT_FAILURE};
use migralock_core::LockService;
use std::process::Command;
use tracing::debug;

/// Hold the change log lock for the duration of `command`.
///
/// Exits with the command's own status. The lock is released even when the
/// command cannot be started; a failed release turns a zero exit into
/// `EXIT_FAILURE`.
pub fn run(svc: &mut Service, command: &[String], json: bool) -> Result<u8, String> {
    let Some((program, args)) = command.split_first() else {
        return Err("no command given; pass it after --".to_owned());
    };

    let pb = (!json).then(|| spinner("waiting for change log lock..."));
    if let Err(e) = svc.wait_for_lock() {
        if let Some(pb) = &pb {
            spin_fail(pb, &e.to_string());
        } else {
            eprintln!("error: {e}");
        }
        return Ok(wait_failure(&e));
    }
    if let Some(pb) = &pb {
        spin_ok(pb, "change log lock acquired");
    }

    debug!("running {program} {}", args.join(" "));
    let status = Command::new(program).args(args).status();
    let outcome = svc.release();

    let status = status.map_err(|e| format!("failed to run '{program}': {e}"))?;
    let code = status
        .code()
        .and_then(|c| u8::try_from(c).ok())
        .unwrap_or(EXIT_FAILURE);

    if outcome.is_failed() && code == 0 {
        return Ok(EXIT_FAILURE);
    }
    Ok(code)
}

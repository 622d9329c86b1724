use super::{
    json_pretty, spin_fail, spin_ok, spinner, wait_failure, Service, EXIT_LOCK_HELD, EXIT_SUCCESS,
};
use migralock_core::{LockInfo, LockService};

pub fn run(svc: &mut Service, wait: bool, json: bool) -> Result<u8, String> {
    if wait {
        return acquire_waiting(svc, json);
    }

    let acquired = svc.acquire().map_err(|e| e.to_string())?;
    let holder = if acquired {
        None
    } else {
        svc.list_locks()
            .map_err(|e| e.to_string())?
            .first()
            .map(LockInfo::describe)
    };

    if json {
        let payload = serde_json::json!({
            "acquired": acquired,
            "holder": holder,
        });
        println!("{}", json_pretty(&payload)?);
    } else if acquired {
        println!("change log lock acquired");
    } else {
        println!(
            "change log lock is held by {}",
            holder.as_deref().unwrap_or("UNKNOWN")
        );
    }
    Ok(if acquired { EXIT_SUCCESS } else { EXIT_LOCK_HELD })
}

fn acquire_waiting(svc: &mut Service, json: bool) -> Result<u8, String> {
    let pb = (!json).then(|| spinner("waiting for change log lock..."));
    match svc.wait_for_lock() {
        Ok(()) => {
            if let Some(pb) = &pb {
                spin_ok(pb, "change log lock acquired");
            } else {
                println!("{}", json_pretty(&serde_json::json!({ "acquired": true }))?);
            }
            Ok(EXIT_SUCCESS)
        }
        Err(e) => {
            if let Some(pb) = &pb {
                spin_fail(pb, &e.to_string());
            } else {
                let payload = serde_json::json!({
                    "acquired": false,
                    "error": e.to_string(),
                });
                println!("{}", json_pretty(&payload)?);
            }
            Ok(wait_failure(&e))
        }
    }
}

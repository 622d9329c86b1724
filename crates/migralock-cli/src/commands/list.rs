use super::{json_pretty, Service, EXIT_SUCCESS};
use migralock_core::LockService;

pub fn run(svc: &mut Service, json: bool) -> Result<u8, String> {
    let locks = svc.list_locks().map_err(|e| e.to_string())?;
    if json {
        println!("{}", json_pretty(&locks)?);
    } else if locks.is_empty() {
        println!("no locks held");
    } else {
        println!("{:<4} {:<32} GRANTED", "ID", "LOCKED_BY");
        for lock in &locks {
            let granted = lock.granted.map(|g| g.to_rfc3339()).unwrap_or_default();
            println!(
                "{:<4} {:<32} {granted}",
                lock.id,
                lock.locked_by.as_deref().unwrap_or("UNKNOWN")
            );
        }
    }
    Ok(EXIT_SUCCESS)
}

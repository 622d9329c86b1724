use super::{colorize_holder, json_pretty, Service, EXIT_SUCCESS};
use migralock_core::{ChangelogDatabase, LockService};
use std::path::Path;

pub fn run(svc: &mut Service, database: &Path, json: bool) -> Result<u8, String> {
    let table = svc.inner().database().lock_table().to_string();
    let enabled = svc.is_enabled();
    let table_exists = enabled && svc.inner().table_exists();
    let locks = svc.list_locks().map_err(|e| e.to_string())?;

    let holder = if !enabled {
        "disabled"
    } else if locks.is_empty() {
        "free"
    } else {
        "locked"
    };

    if json {
        let payload = serde_json::json!({
            "database": database,
            "table": table,
            "enabled": enabled,
            "table_exists": table_exists,
            "state": holder,
            "locks": locks,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("database:  {}", database.display());
        println!("table:     {table}");
        if enabled {
            println!("present:   {}", if table_exists { "yes" } else { "no" });
        }
        println!("state:     {}", colorize_holder(holder));
        for lock in &locks {
            println!("held by:   {}", lock.describe());
        }
    }
    Ok(EXIT_SUCCESS)
}

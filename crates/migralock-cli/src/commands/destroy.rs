use super::{json_pretty, Service, EXIT_SUCCESS};
use migralock_core::LockService;

pub fn run(svc: &mut Service, json: bool) -> Result<u8, String> {
    svc.destroy().map_err(|e| e.to_string())?;
    if json {
        println!("{}", json_pretty(&serde_json::json!({ "destroyed": true }))?);
    } else {
        println!("lock table dropped");
    }
    Ok(EXIT_SUCCESS)
}

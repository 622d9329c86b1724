pub mod acquire;
pub mod completions;
pub mod destroy;
pub mod force_release;
pub mod list;
pub mod man_pages;
pub mod release;
pub mod run;
pub mod status;

use indicatif::{ProgressBar, ProgressStyle};
use migralock_core::{GatedLockService, LockConfig, LockError, ReleaseOutcome, TableLockService};
use migralock_sqlite::SqliteDatabase;
use std::path::Path;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_LOCK_HELD: u8 = 2;
pub const EXIT_CONFIG_ERROR: u8 = 3;

pub type Service = GatedLockService<TableLockService<SqliteDatabase>>;

pub fn open_service(config: &LockConfig, database: &Path) -> Result<Service, String> {
    let db = SqliteDatabase::open(database, config.table_ref())
        .map_err(|e| format!("failed to open database {}: {e}", database.display()))?
        .with_quoting(config.table.quoting);
    Ok(GatedLockService::from_config(
        TableLockService::from_config(db, config),
        config,
    ))
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_spinner())
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        style("{spinner:.cyan} {msg}")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(style("{msg}"));
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(style("{msg}"));
    pb.finish_with_message(format!("✗ {msg}"));
}

pub fn colorize_holder(state: &str) -> String {
    use console::Style;
    match state {
        "free" => Style::new().green().apply_to(state).to_string(),
        "locked" => Style::new().yellow().bold().apply_to(state).to_string(),
        "disabled" => Style::new().dim().apply_to(state).to_string(),
        other => other.to_owned(),
    }
}

/// Short label for a release outcome, used in JSON output.
pub fn outcome_label(outcome: &ReleaseOutcome) -> &'static str {
    match outcome {
        ReleaseOutcome::Released => "released",
        ReleaseOutcome::TableAbsent => "table_absent",
        ReleaseOutcome::Skipped => "skipped",
        ReleaseOutcome::Failed(_) => "failed",
    }
}

/// Print a release outcome and pick the exit code.
pub fn report_release(outcome: &ReleaseOutcome, json: bool) -> Result<u8, String> {
    let code = if outcome.is_failed() {
        EXIT_FAILURE
    } else {
        EXIT_SUCCESS
    };
    if json {
        let payload = serde_json::json!({
            "outcome": outcome_label(outcome),
            "error": match outcome {
                ReleaseOutcome::Failed(e) => Some(e.to_string()),
                _ => None,
            },
        });
        println!("{}", json_pretty(&payload)?);
        return Ok(code);
    }
    match outcome {
        ReleaseOutcome::Released => println!("change log lock released"),
        ReleaseOutcome::TableAbsent => println!("no lock table; nothing to release"),
        ReleaseOutcome::Skipped => println!("locking is disabled; nothing to release"),
        ReleaseOutcome::Failed(e) => eprintln!("error: failed to release change log lock: {e}"),
    }
    Ok(code)
}

/// Exit code for a failed wait; a timeout means someone else still holds it.
pub fn wait_failure(e: &LockError) -> u8 {
    match e {
        LockError::Timeout { .. } => EXIT_LOCK_HELD,
        _ => EXIT_FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use migralock_core::DatabaseError;

    #[test]
    fn json_pretty_serializes_object() {
        let val = serde_json::json!({"outcome": "released"});
        let result = json_pretty(&val).unwrap();
        assert!(result.contains("\"outcome\""));
        assert!(result.contains("\"released\""));
    }

    #[test]
    fn colorize_holder_keeps_text() {
        assert!(colorize_holder("free").contains("free"));
        assert!(colorize_holder("locked").contains("locked"));
        assert!(colorize_holder("disabled").contains("disabled"));
        assert_eq!(colorize_holder("other"), "other");
    }

    #[test]
    fn exit_codes_are_distinct() {
        assert_ne!(EXIT_SUCCESS, EXIT_FAILURE);
        assert_ne!(EXIT_FAILURE, EXIT_LOCK_HELD);
        assert_ne!(EXIT_LOCK_HELD, EXIT_CONFIG_ERROR);
    }

    #[test]
    fn failed_release_exits_with_failure() {
        let outcome = ReleaseOutcome::Failed(DatabaseError::Sql("boom".to_owned()).into());
        assert_eq!(outcome_label(&outcome), "failed");
        assert_eq!(report_release(&outcome, true).unwrap(), EXIT_FAILURE);
        assert_eq!(
            report_release(&ReleaseOutcome::Released, true).unwrap(),
            EXIT_SUCCESS
        );
    }

    #[test]
    fn timeout_maps_to_lock_held() {
        let timeout = LockError::Timeout {
            waited_secs: 1,
            holder: "UNKNOWN".to_owned(),
        };
        assert_eq!(wait_failure(&timeout), EXIT_LOCK_HELD);
        assert_eq!(wait_failure(&LockError::Interrupted), EXIT_FAILURE);
    }

    #[test]
    fn open_service_honours_enabled_toggle() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = LockConfig::default();
        config.lock.enabled = false;
        let svc = open_service(&config, &dir.path().join("app.db")).unwrap();
        assert!(!svc.is_enabled());
    }

    #[test]
    fn open_service_reports_bad_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_service(&LockConfig::default(), &dir.path().join("no/such/app.db"))
            .err()
            .unwrap();
        assert!(err.contains("failed to open database"));
    }

    #[test]
    fn spinner_finishes() {
        let pb = spinner("testing...");
        spin_ok(&pb, "done");
        let pb = spinner("testing...");
        spin_fail(&pb, "failed");
    }
}

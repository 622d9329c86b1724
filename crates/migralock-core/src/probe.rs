use crate::database::{ChangelogDatabase, DatabaseError, ProbeConnection};
use tracing::{info, warn};

/// Result of looking for the lock table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableProbe {
    Exists,
    /// The probe query failed at the SQL level; the table is not there yet.
    Absent,
    /// The probe could not be run at all.
    ProbeError(String),
}

impl TableProbe {
    /// Lossy view: anything but a successful probe counts as absent.
    pub fn exists(&self) -> bool {
        matches!(self, TableProbe::Exists)
    }
}

/// Probe for the lock table over a fresh short-lived connection.
pub fn probe_lock_table<D: ChangelogDatabase>(database: &D) -> TableProbe {
    let table = database.lock_table().to_string();
    let mut conn = match database.connect() {
        Ok(conn) => conn,
        Err(e) => {
            warn!("can't perform lock table probe: {e}");
            return TableProbe::ProbeError(e.to_string());
        }
    };

    info!("looking for table '{table}'");
    let query = database.probe_query();
    match conn.query(&query) {
        Ok(()) => {
            info!("found table '{table}'");
            TableProbe::Exists
        }
        Err(e @ DatabaseError::Connection(_)) => {
            warn!("can't perform lock table probe: {e}");
            TableProbe::ProbeError(e.to_string())
        }
        Err(e) => {
            info!("table '{table}' doesn't exist: {e}");
            TableProbe::Absent
        }
    }
}

/// Whether the lock table exists. Never fails; probe errors read as `false`.
pub fn table_exists<D: ChangelogDatabase>(database: &D) -> bool {
    probe_lock_table(database).exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDatabase, MockOp};

    #[test]
    fn missing_table_is_absent() {
        let db = MockDatabase::new();
        assert_eq!(probe_lock_table(&db), TableProbe::Absent);
        assert!(!table_exists(&db));
    }

    #[test]
    fn existing_table_is_found() {
        let db = MockDatabase::new().with_lock_table();
        assert_eq!(probe_lock_table(&db), TableProbe::Exists);
        assert!(table_exists(&db));
    }

    #[test]
    fn connect_failure_is_probe_error() {
        let db = MockDatabase::new().with_lock_table();
        db.fail(MockOp::Connect);
        assert!(matches!(probe_lock_table(&db), TableProbe::ProbeError(_)));
        assert!(!table_exists(&db));
    }

    #[test]
    fn connection_drop_during_probe_is_probe_error() {
        let db = MockDatabase::new().with_lock_table();
        db.fail(MockOp::Probe);
        assert!(matches!(probe_lock_table(&db), TableProbe::ProbeError(_)));
    }

    #[test]
    fn probe_uses_escaped_table_name() {
        let db = MockDatabase::new().with_lock_table();
        probe_lock_table(&db);
        assert!(db
            .journal()
            .contains(&"probe SELECT id FROM DATABASECHANGELOGLOCK".to_owned()));
    }
}

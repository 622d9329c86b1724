//! SQL text for the lock table, per dialect.
//!
//! Statements are typed (`LockStatement`) so that backends and tests can
//! reason about *what* is executed; `SqlDialect::render` turns them into the
//! literal SQL a backend sends. Unlocking truncates the lock table instead of
//! updating the row, because engines such as Hive have no row-level UPDATE.
//! After an unlock the LOCKED read therefore comes back as NULL.

use crate::database::{LockGrant, TableRef};
use crate::quoting::QuotingStrategy;
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Words that must be quoted when used as identifiers.
const RESERVED_WORDS: &[&str] = &[
    "ALL", "ALTER", "AND", "AS", "BY", "CASE", "CHECK", "COLUMN", "CREATE", "DATABASE", "DATE",
    "DEFAULT", "DELETE", "DISTINCT", "DROP", "ELSE", "EXISTS", "FROM", "GROUP", "HAVING", "IN",
    "INDEX", "INSERT", "INTO", "IS", "JOIN", "KEY", "LIKE", "LIMIT", "LOCK", "NOT", "NULL", "ON",
    "OR", "ORDER", "PRIMARY", "REFERENCES", "SCHEMA", "SELECT", "SET", "TABLE", "THEN",
    "TIMESTAMP", "TO", "TRUNCATE", "UNION", "UNIQUE", "UPDATE", "USER", "VALUES", "WHERE",
];

/// Statements issued against the lock table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockStatement {
    CreateLockTable,
    Lock(LockGrant),
    Unlock,
    DropLockTable,
    SelectLocked,
    SelectLocks,
}

impl LockStatement {
    /// Short name used in logs and mock journals.
    pub fn kind(&self) -> &'static str {
        match self {
            LockStatement::CreateLockTable => "create-lock-table",
            LockStatement::Lock(_) => "lock",
            LockStatement::Unlock => "unlock",
            LockStatement::DropLockTable => "drop-lock-table",
            LockStatement::SelectLocked => "select-locked",
            LockStatement::SelectLocks => "select-locks",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    #[default]
    Sqlite,
    Hive,
}

impl fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlDialect::Sqlite => write!(f, "sqlite"),
            SqlDialect::Hive => write!(f, "hive"),
        }
    }
}

impl FromStr for SqlDialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(SqlDialect::Sqlite),
            "hive" => Ok(SqlDialect::Hive),
            other => Err(format!("unknown SQL dialect '{other}'")),
        }
    }
}

impl SqlDialect {
    fn quote_char(self) -> char {
        match self {
            SqlDialect::Sqlite => '"',
            SqlDialect::Hive => '`',
        }
    }

    pub fn escape_identifier(self, ident: &str, strategy: QuotingStrategy) -> String {
        if !needs_quoting(ident, strategy) {
            return ident.to_owned();
        }
        let q = self.quote_char();
        let doubled = format!("{q}{q}");
        format!("{q}{}{q}", ident.replace(q, &doubled))
    }

    pub fn escape_table_name(self, table: &TableRef, strategy: QuotingStrategy) -> String {
        [&table.catalog, &table.schema]
            .into_iter()
            .flatten()
            .map(|part| self.escape_identifier(part, strategy))
            .chain(std::iter::once(
                self.escape_identifier(&table.name, strategy),
            ))
            .collect::<Vec<_>>()
            .join(".")
    }

    pub fn string_literal(self, value: &str) -> String {
        match self {
            SqlDialect::Sqlite => format!("'{}'", value.replace('\'', "''")),
            SqlDialect::Hive => format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'")),
        }
    }

    /// Minimal query whose failure means the lock table does not exist.
    pub fn probe_query(self, escaped_table: &str) -> String {
        format!("SELECT id FROM {escaped_table}")
    }

    pub fn truncate(self, escaped_table: &str) -> String {
        match self {
            SqlDialect::Sqlite => format!("DELETE FROM {escaped_table}"),
            SqlDialect::Hive => format!("TRUNCATE TABLE {escaped_table}"),
        }
    }

    pub fn render(self, statement: &LockStatement, escaped_table: &str) -> String {
        let t = escaped_table;
        match (self, statement) {
            (SqlDialect::Sqlite, LockStatement::CreateLockTable) => format!(
                "CREATE TABLE IF NOT EXISTS {t} (ID INTEGER NOT NULL PRIMARY KEY, \
                 LOCKED BOOLEAN NOT NULL, LOCKGRANTED TEXT, LOCKEDBY TEXT)"
            ),
            (SqlDialect::Hive, LockStatement::CreateLockTable) => format!(
                "CREATE TABLE IF NOT EXISTS {t} (ID INT, LOCKED BOOLEAN, \
                 LOCKGRANTED TIMESTAMP, LOCKEDBY STRING)"
            ),
            // Takes a missing or unlocked row; a locked row is left alone and
            // the write changes nothing.
            (SqlDialect::Sqlite, LockStatement::Lock(grant)) => format!(
                "INSERT INTO {t} (ID, LOCKED, LOCKGRANTED, LOCKEDBY) VALUES (1, 1, {}, {}) \
                 ON CONFLICT(ID) DO UPDATE SET LOCKED = 1, \
                 LOCKGRANTED = excluded.LOCKGRANTED, LOCKEDBY = excluded.LOCKEDBY \
                 WHERE LOCKED = 0 OR LOCKED IS NULL",
                self.string_literal(&grant.granted.to_rfc3339_opts(SecondsFormat::Millis, true)),
                self.string_literal(&grant.locked_by)
            ),
            (SqlDialect::Hive, LockStatement::Lock(grant)) => format!(
                "INSERT INTO TABLE {t} VALUES (1, true, {}, {})",
                self.string_literal(&grant.granted.format("%Y-%m-%d %H:%M:%S%.3f").to_string()),
                self.string_literal(&grant.locked_by)
            ),
            (_, LockStatement::Unlock) => self.truncate(t),
            (_, LockStatement::DropLockTable) => format!("DROP TABLE IF EXISTS {t}"),
            (_, LockStatement::SelectLocked) => format!("SELECT LOCKED FROM {t} WHERE ID = 1"),
            (SqlDialect::Sqlite, LockStatement::SelectLocks) => format!(
                "SELECT ID, LOCKED, LOCKGRANTED, LOCKEDBY FROM {t} WHERE LOCKED = 1 ORDER BY ID"
            ),
            (SqlDialect::Hive, LockStatement::SelectLocks) => format!(
                "SELECT ID, LOCKED, LOCKGRANTED, LOCKEDBY FROM {t} WHERE LOCKED = true ORDER BY ID"
            ),
        }
    }
}

fn is_plain_identifier(ident: &str) -> bool {
    let mut chars = ident.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_reserved_word(ident: &str) -> bool {
    RESERVED_WORDS
        .iter()
        .any(|word| word.eq_ignore_ascii_case(ident))
}

fn needs_quoting(ident: &str, strategy: QuotingStrategy) -> bool {
    match strategy {
        QuotingStrategy::QuoteAllObjects => true,
        QuotingStrategy::QuoteOnlyReservedWords => is_reserved_word(ident),
        QuotingStrategy::Legacy => is_reserved_word(ident) || !is_plain_identifier(ident),
    }
}

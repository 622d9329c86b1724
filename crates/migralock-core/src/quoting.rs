use crate::database::ChangelogDatabase;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::str::FromStr;

/// How identifiers are escaped in generated SQL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuotingStrategy {
    /// Quote reserved words and identifiers that are not plain names.
    #[default]
    Legacy,
    /// Quote every identifier.
    QuoteAllObjects,
    /// Quote reserved words only.
    QuoteOnlyReservedWords,
}

impl fmt::Display for QuotingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuotingStrategy::Legacy => write!(f, "legacy"),
            QuotingStrategy::QuoteAllObjects => write!(f, "quote-all-objects"),
            QuotingStrategy::QuoteOnlyReservedWords => write!(f, "quote-only-reserved-words"),
        }
    }
}

impl FromStr for QuotingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "legacy" => Ok(QuotingStrategy::Legacy),
            "quote-all-objects" => Ok(QuotingStrategy::QuoteAllObjects),
            "quote-only-reserved-words" => Ok(QuotingStrategy::QuoteOnlyReservedWords),
            other => Err(format!("unknown quoting strategy '{other}'")),
        }
    }
}

/// Scoped quoting-strategy override on a database session.
///
/// Entering the scope remembers the session's current strategy and optionally
/// swaps in another one. Dropping the scope puts the remembered strategy back,
/// on success, error and unwinding alike. The scope derefs to the database so
/// the lock protocol runs through it.
pub struct QuotingScope<'a, D: ChangelogDatabase> {
    database: &'a mut D,
    restore: QuotingStrategy,
}

impl<'a, D: ChangelogDatabase> QuotingScope<'a, D> {
    pub fn enter(database: &'a mut D, strategy: Option<QuotingStrategy>) -> Self {
        let restore = database.quoting_strategy();
        if let Some(strategy) = strategy {
            database.set_quoting_strategy(strategy);
        }
        Self { database, restore }
    }

    /// The strategy that will be restored on drop.
    pub fn restores_to(&self) -> QuotingStrategy {
        self.restore
    }
}

impl<D: ChangelogDatabase> Deref for QuotingScope<'_, D> {
    type Target = D;

    fn deref(&self) -> &D {
        self.database
    }
}

impl<D: ChangelogDatabase> DerefMut for QuotingScope<'_, D> {
    fn deref_mut(&mut self) -> &mut D {
        self.database
    }
}

impl<D: ChangelogDatabase> Drop for QuotingScope<'_, D> {
    fn drop(&mut self) {
        self.database.set_quoting_strategy(self.restore);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDatabase;

    #[test]
    fn parse_and_display_roundtrip() {
        for strategy in [
            QuotingStrategy::Legacy,
            QuotingStrategy::QuoteAllObjects,
            QuotingStrategy::QuoteOnlyReservedWords,
        ] {
            assert_eq!(strategy.to_string().parse::<QuotingStrategy>(), Ok(strategy));
        }
        assert_eq!(
            "QUOTE_ALL_OBJECTS".parse::<QuotingStrategy>(),
            Ok(QuotingStrategy::QuoteAllObjects)
        );
        assert!("shout".parse::<QuotingStrategy>().is_err());
    }

    #[test]
    fn scope_swaps_and_restores() {
        let mut db = MockDatabase::new();
        db.set_quoting_strategy(QuotingStrategy::Legacy);
        {
            let scope = QuotingScope::enter(&mut db, Some(QuotingStrategy::QuoteAllObjects));
            assert_eq!(scope.quoting_strategy(), QuotingStrategy::QuoteAllObjects);
            assert_eq!(scope.restores_to(), QuotingStrategy::Legacy);
        }
        assert_eq!(db.quoting_strategy(), QuotingStrategy::Legacy);
    }

    #[test]
    fn scope_without_override_reverts_inner_changes() {
        let mut db = MockDatabase::new();
        db.set_quoting_strategy(QuotingStrategy::QuoteOnlyReservedWords);
        {
            let mut scope = QuotingScope::enter(&mut db, None);
            scope.set_quoting_strategy(QuotingStrategy::Legacy);
        }
        assert_eq!(
            db.quoting_strategy(),
            QuotingStrategy::QuoteOnlyReservedWords
        );
    }

    #[test]
    fn scope_restores_on_unwind() {
        let mut db = MockDatabase::new();
        db.set_quoting_strategy(QuotingStrategy::Legacy);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _scope = QuotingScope::enter(&mut db, Some(QuotingStrategy::QuoteAllObjects));
            panic!("boom");
        }));
        assert!(result.is_err());
        assert_eq!(db.quoting_strategy(), QuotingStrategy::Legacy);
    }
}

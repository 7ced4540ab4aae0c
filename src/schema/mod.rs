//! Schema Manager
//!
//! Versioned schema with forward-only migrations v1 -> v5 (spec §4.2, §6,
//! §7, §8 P6/B3). On a brand-new database (`schema_version` absent ⇒
//! version 0) every migration is applied inside a single transaction
//! ("full initialization"). On an existing database each pending migration
//! runs in its own transaction, in order, so a crash between two
//! migrations leaves the database at a valid intermediate version rather
//! than a half-applied one.

mod migrations;

pub use migrations::{Migration, CURRENT_VERSION, MIGRATIONS};

use rusqlite::Connection;
use tokio_util::sync::CancellationToken;

use crate::engine::StorageEngine;
use crate::error::{Error, Result};

/// Reads `schema_version`, running migrations as needed, and fails the
/// open if the stored version is newer than this build supports (I7, B3).
pub fn open_and_migrate(engine: &StorageEngine) -> Result<()> {
    let cancel = CancellationToken::new();
    let stored = engine.with_connection(current_version)?;

    if stored > CURRENT_VERSION {
        return Err(Error::SchemaTooNew {
            stored,
            supported: CURRENT_VERSION,
        });
    }

    if stored == CURRENT_VERSION {
        return Ok(());
    }

    if stored == 0 {
        // Full initialization: every migration applied atomically.
        engine.with_transaction(&cancel, |tx| {
            for migration in MIGRATIONS {
                tracing::info!(version = migration.version, description = migration.description, "applying migration (full init)");
                apply_migration_statements(tx, migration)?;
            }
            Ok(())
        })?;
    } else {
        for migration in MIGRATIONS {
            if migration.version <= stored {
                continue;
            }
            engine.with_transaction(&cancel, |tx| {
                tracing::info!(version = migration.version, description = migration.description, "applying migration");
                apply_migration_statements(tx, migration)
            })?;
        }
    }

    let final_version = engine.with_connection(current_version)?;
    if final_version != CURRENT_VERSION {
        return Err(Error::ConstraintViolation(format!(
            "expected schema version {CURRENT_VERSION} after migration, found {final_version}"
        )));
    }

    Ok(())
}

/// Reads `schema_version`. Absent table or empty table ⇒ 0.
fn current_version(conn: &Connection) -> Result<u32> {
    let table_exists: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'",
            [],
            |_| Ok(true),
        )
        .unwrap_or(false);

    if !table_exists {
        return Ok(0);
    }

    let version: Option<u32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .ok();

    Ok(version.unwrap_or(0))
}

/// Executes a migration's statements one at a time so `ALTER TABLE ... ADD
/// COLUMN` can tolerate "duplicate column" from a previously half-applied
/// run without treating it as a failure, per the idempotence requirement
/// in spec §4.2.
fn apply_migration_statements(conn: &Connection, migration: &Migration) -> Result<()> {
    for statement in split_statements(migration.up) {
        let statement = statement.trim();
        if statement.is_empty() {
            continue;
        }
        if let Err(err) = conn.execute_batch(statement) {
            if is_duplicate_column_error(&err) {
                tracing::debug!(version = migration.version, "tolerating duplicate column on replay");
                continue;
            }
            return Err(Error::MigrationFailed {
                version: migration.version,
                source: err,
            });
        }
    }
    Ok(())
}

fn is_duplicate_column_error(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.contains("duplicate column name"))
}

#[cfg(test)]
mod duplicate_column_tests {
    use super::is_duplicate_column_error;

    #[test]
    fn recognizes_duplicate_column_message() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
            Some("duplicate column name: foo".to_string()),
        );
        assert!(is_duplicate_column_error(&err));
    }
}

/// Splits a migration's SQL text into individually executable statements,
/// treating `BEGIN ... END;` trigger bodies as one statement rather than
/// splitting on the semicolons inside them.
fn split_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut trigger_depth: i32 = 0;

    for line in sql.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("--") {
            continue;
        }
        current.push_str(line);
        current.push('\n');

        let upper = trimmed.to_ascii_uppercase();
        if upper.contains("BEGIN") {
            trigger_depth += 1;
        }
        if upper.starts_with("END;") || upper == "END;" {
            trigger_depth = trigger_depth.saturating_sub(1);
        }

        if trigger_depth == 0 && trimmed.ends_with(';') {
            statements.push(std::mem::take(&mut current));
        }
    }
    if !current.trim().is_empty() {
        statements.push(current);
    }
    statements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_database_reaches_current_version() {
        let engine = StorageEngine::open_in_memory().expect("open");
        let version = engine.with_connection(|conn| current_version(conn)).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn schema_too_new_is_rejected() {
        let engine = StorageEngine::open_in_memory().expect("open");
        engine
            .with_connection(|conn| {
                conn.execute("UPDATE schema_version SET version = ?1", [CURRENT_VERSION + 1])?;
                Ok(())
            })
            .unwrap();

        let err = open_and_migrate(&engine).unwrap_err();
        assert!(matches!(err, Error::SchemaTooNew { .. }));
    }

    #[test]
    fn split_statements_keeps_trigger_body_whole() {
        let sql = "CREATE TABLE t (a INT);\nCREATE TRIGGER tr AFTER INSERT ON t BEGIN\n  SELECT 1;\n  SELECT 2;\nEND;\nUPDATE schema_version SET version = 9;\n";
        let parts = split_statements(sql);
        assert_eq!(parts.len(), 3);
        assert!(parts[1].contains("BEGIN") && parts[1].contains("END;"));
    }
}

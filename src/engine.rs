//! Storage Engine
//!
//! Opens the embedded single-file database, applies pragmas, and exposes a
//! scoped-acquisition transaction primitive. The engine owns the sole
//! database handle for a repository root; callers never open their own
//! connection.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::Connection;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Busy-wait window applied via `PRAGMA busy_timeout` (§4.1).
pub const BUSY_TIMEOUT_MS: u64 = 5_000;

/// Relational directory created under a repository root.
pub const CKB_DIR: &str = ".ckb";

/// Database filename within `CKB_DIR`.
pub const DB_FILENAME: &str = "ckb.db";

/// Owns the process-wide database handle for one repository root.
///
/// Encapsulated behind this type so a handle can never be accidentally
/// shared across two repository roots (§9 "Global writable state").
pub struct StorageEngine {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl StorageEngine {
    /// Open (creating if absent) the database at `<repo_root>/.ckb/ckb.db`,
    /// configure pragmas, and run schema migrations.
    pub fn open(repo_root: &Path) -> Result<Self> {
        let dir = repo_root.join(CKB_DIR);
        std::fs::create_dir_all(&dir)?;

        let db_path = dir.join(DB_FILENAME);
        let conn = Connection::open(&db_path)?;
        Self::configure_connection(&conn)?;

        let engine = Self {
            conn: Mutex::new(conn),
            db_path,
        };

        crate::schema::open_and_migrate(&engine)?;

        Ok(engine)
    }

    /// Open an in-memory database, used by tests that don't need a
    /// filesystem footprint.
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure_connection(&conn)?;
        let engine = Self {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
        };
        crate::schema::open_and_migrate(&engine)?;
        Ok(engine)
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -65536;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = {BUSY_TIMEOUT_MS};
             PRAGMA mmap_size = 268435456;"
        ))?;
        Ok(())
    }

    /// Path to the database file (or `:memory:` for in-memory engines).
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Run `f` against the raw connection without a transaction wrapper.
    /// Used by read paths that don't need atomicity across statements.
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock().map_err(|_| Error::Init("connection lock poisoned".into()))?;
        f(&conn)
    }

    /// Begin a transaction, run `f`, and commit on success / roll back on
    /// failure, with guaranteed release on all exit paths. Checks `cancel`
    /// before starting; operations expected to run long (bulk rebuild,
    /// migrations) re-check `cancel.is_cancelled()` at their own internal
    /// checkpoints and bail out with `Error::Cancelled`, which this method
    /// then turns into a rollback like any other error.
    pub fn with_transaction<T>(
        &self,
        cancel: &CancellationToken,
        f: impl FnOnce(&rusqlite::Transaction) -> Result<T>,
    ) -> Result<T> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let conn = self
            .conn
            .lock()
            .map_err(|_| Error::Init("connection lock poisoned".into()))?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| Error::from_sqlite_busy(e, BUSY_TIMEOUT_MS))?;

        match f(&tx) {
            Ok(value) => {
                tx.commit().map_err(|e| Error::from_sqlite_busy(e, BUSY_TIMEOUT_MS))?;
                Ok(value)
            }
            Err(err) => {
                // Rollback also happens implicitly on `Transaction::drop`;
                // calling it explicitly makes a rollback failure observable.
                let _ = tx.rollback();
                Err(err)
            }
        }
    }
}

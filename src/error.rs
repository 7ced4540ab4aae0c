//! Error Taxonomy
//!
//! A single crate-wide error type covering every kind named in the storage
//! contract: absent results are modeled as `Ok(None)`, not an error variant.

/// Store-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds surfaced by the store. The store never retries and never
/// swallows an error except for opportunistic expired-cache cleanup, which
/// is logged and ignored because the expiry itself is the authoritative
/// result.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Underlying database error not otherwise classified below.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// `Update` / `MarkAsDeleted` touched zero rows.
    #[error("no row affected for {entity} {id}")]
    NotAffected {
        /// Entity kind, e.g. "symbol mapping".
        entity: &'static str,
        /// Identifier that was targeted.
        id: String,
    },

    /// Invariant I1-I4 breached, or a uniqueness collision.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// The write-lock busy-wait window elapsed.
    #[error("contention timeout after {millis}ms")]
    ContentionTimeout {
        /// Configured busy-wait window, in milliseconds.
        millis: u64,
    },

    /// An unparseable stored timestamp, invalid JSON payload read back, or
    /// an FTS integrity-check failure.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// The stored schema version exceeds the code's current version.
    #[error("schema version {stored} is newer than supported version {supported}")]
    SchemaTooNew {
        /// Version found in the database.
        stored: u32,
        /// Highest version this build knows how to open.
        supported: u32,
    },

    /// A migration failed partway through its transaction.
    #[error("migration to v{version} failed: {source}")]
    MigrationFailed {
        /// Target version of the failed migration.
        version: u32,
        /// Underlying database error.
        source: rusqlite::Error,
    },

    /// The operation observed its cancellation token.
    #[error("operation cancelled")]
    Cancelled,

    /// I/O failure (disk full, permission denied, etc). Caller decides
    /// whether to retry.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Initialization failure outside the database itself (e.g. resolving
    /// or creating `.ckb/`).
    #[error("initialization error: {0}")]
    Init(String),
}

impl Error {
    /// True if this error originated from the SQLite busy-wait elapsing.
    pub(crate) fn from_sqlite_busy(err: rusqlite::Error, busy_millis: u64) -> Error {
        match &err {
            rusqlite::Error::SqliteFailure(sqlite_err, _)
                if sqlite_err.code == rusqlite::ErrorCode::DatabaseBusy =>
            {
                Error::ContentionTimeout {
                    millis: busy_millis,
                }
            }
            _ => Error::Database(err),
        }
    }
}

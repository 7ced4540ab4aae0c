use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A symbol's name, kind, signature, and enclosing containers. Stored as a
/// JSON blob (`fingerprint_json`) but never leaked to callers in that form
/// (§9 "Serialized structured fields").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Symbol name as it appears in source.
    pub name: String,
    /// Symbol kind, e.g. "function", "struct", "trait".
    pub kind: String,
    /// Full signature, when available.
    #[serde(default)]
    pub signature: Option<String>,
    /// Enclosing containers, outermost first (module path, class, etc).
    #[serde(default)]
    pub containers: Vec<String>,
}

/// A source location, stored as a JSON blob (`location_json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Repository-relative file path.
    pub path: String,
    /// 1-based line number.
    pub line: u32,
    /// 0-based column, when known.
    #[serde(default)]
    pub column: Option<u32>,
}

/// The tombstone state machine (I1): `Deleted` carries its own provenance
/// so the pairing between the `deleted` tag and `(deleted_at,
/// deleted_in_state_id)` is enforced at compile time, matching the
/// database's `CHECK` constraint.
#[derive(Debug, Clone, PartialEq)]
pub enum SymbolState {
    /// The symbol was observed in the most recent resync.
    Active,
    /// The symbol was tombstoned; it is never re-activated in place.
    Deleted {
        /// When the tombstone was recorded.
        deleted_at: DateTime<Utc>,
        /// Repository state identifier that last saw this symbol missing.
        deleted_in_state_id: String,
    },
    /// State could not be determined (e.g. pre-existing row from a source
    /// that doesn't distinguish active/deleted).
    Unknown,
}

impl SymbolState {
    pub(crate) fn as_db_str(&self) -> &'static str {
        match self {
            SymbolState::Active => "active",
            SymbolState::Deleted { .. } => "deleted",
            SymbolState::Unknown => "unknown",
        }
    }
}

/// A stable-identity mapping from a logical code symbol to its current
/// location and fingerprint (spec §3).
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolMapping {
    /// Opaque, long-lived primary key.
    pub stable_id: String,
    /// Tombstone state machine.
    pub state: SymbolState,
    /// Indexer-local identifier at last sync, if the backend exposes one.
    pub backend_stable_id: Option<String>,
    /// Name/kind/signature/containers.
    pub fingerprint: Fingerprint,
    /// File/line/column.
    pub location: Location,
    /// Optional definition-version identity, when the indexer tracks one.
    pub definition_version_id: Option<String>,
    /// Free-text semantics attached to `definition_version_id`.
    pub definition_version_semantics: Option<String>,
    /// When this mapping was last confirmed present.
    pub last_verified_at: DateTime<Utc>,
    /// Repository state identifier that last confirmed this mapping.
    pub last_verified_state_id: String,
}

/// A directed `old -> new` redirection produced across a refactor (spec §3,
/// §4.3). Aliases are immutable once created; only their endpoints may be
/// removed, which cascades the alias away (I3, P2).
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolAlias {
    /// The identifier being redirected away from.
    pub old_stable_id: String,
    /// The identifier being redirected to.
    pub new_stable_id: String,
    /// Free-text reason, e.g. "refactored".
    pub reason: Option<String>,
    /// Confidence in this alias, in `[0, 1]` (I2/P7).
    pub confidence: f64,
    /// When the alias was created.
    pub created_at: DateTime<Utc>,
    /// Repository state identifier at creation.
    pub created_state_id: String,
}

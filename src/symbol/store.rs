use std::sync::Arc;

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use tokio_util::sync::CancellationToken;

use crate::engine::StorageEngine;
use crate::error::{Error, Result};
use crate::util::{check_confidence, parse_timestamp};

use super::types::{Fingerprint, Location, SymbolAlias, SymbolMapping, SymbolState};

/// Filter for `ListByState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateFilter {
    /// Only mappings currently `active`.
    Active,
    /// Only tombstoned mappings.
    Deleted,
    /// Only mappings in the `unknown` state.
    Unknown,
}

impl StateFilter {
    fn as_db_str(self) -> &'static str {
        match self {
            StateFilter::Active => "active",
            StateFilter::Deleted => "deleted",
            StateFilter::Unknown => "unknown",
        }
    }
}

/// Tombstoned symbol mappings and alias chains (spec §4.3).
pub struct SymbolStore {
    engine: Arc<StorageEngine>,
}

impl SymbolStore {
    /// Construct a store bound to a single repository's storage engine.
    pub fn new(engine: Arc<StorageEngine>) -> Self {
        Self { engine }
    }

    /// Insert a new mapping, active at first sight.
    pub fn create(&self, mapping: &SymbolMapping, cancel: &CancellationToken) -> Result<()> {
        let fingerprint_json = serde_json::to_string(&mapping.fingerprint)
            .map_err(|e| Error::ConstraintViolation(format!("invalid fingerprint: {e}")))?;
        let location_json = serde_json::to_string(&mapping.location)
            .map_err(|e| Error::ConstraintViolation(format!("invalid location: {e}")))?;

        let (deleted_at, deleted_in_state_id) = match &mapping.state {
            SymbolState::Deleted { deleted_at, deleted_in_state_id } => {
                (Some(deleted_at.to_rfc3339()), Some(deleted_in_state_id.clone()))
            }
            _ => (None, None),
        };

        self.engine.with_transaction(cancel, |tx| {
            tx.execute(
                "INSERT INTO symbol_mappings (
                    stable_id, state, backend_stable_id, fingerprint_json, location_json,
                    definition_version_id, definition_version_semantics,
                    last_verified_at, last_verified_state_id, deleted_at, deleted_in_state_id
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    mapping.stable_id,
                    mapping.state.as_db_str(),
                    mapping.backend_stable_id,
                    fingerprint_json,
                    location_json,
                    mapping.definition_version_id,
                    mapping.definition_version_semantics,
                    mapping.last_verified_at.to_rfc3339(),
                    mapping.last_verified_state_id,
                    deleted_at,
                    deleted_in_state_id,
                ],
            )?;
            Ok(())
        })
    }

    /// Returns `Ok(None)` for an unknown `stable_id` rather than an error
    /// (spec §7 NotFound).
    pub fn get_by_stable_id(&self, stable_id: &str) -> Result<Option<SymbolMapping>> {
        self.engine.with_connection(|conn| {
            conn.query_row(
                "SELECT stable_id, state, backend_stable_id, fingerprint_json, location_json,
                        definition_version_id, definition_version_semantics,
                        last_verified_at, last_verified_state_id, deleted_at, deleted_in_state_id
                 FROM symbol_mappings WHERE stable_id = ?1",
                params![stable_id],
                row_to_mapping,
            )
            .optional()
            .map_err(Error::from)?
            .transpose()
        })
    }

    /// Updates fingerprint/location/verification timestamps for an
    /// existing mapping. Fails with `NotAffected` if the row doesn't exist.
    pub fn update(&self, mapping: &SymbolMapping, cancel: &CancellationToken) -> Result<SymbolMapping> {
        let fingerprint_json = serde_json::to_string(&mapping.fingerprint)
            .map_err(|e| Error::ConstraintViolation(format!("invalid fingerprint: {e}")))?;
        let location_json = serde_json::to_string(&mapping.location)
            .map_err(|e| Error::ConstraintViolation(format!("invalid location: {e}")))?;

        self.engine.with_transaction(cancel, |tx| {
            let affected = tx.execute(
                "UPDATE symbol_mappings SET
                    backend_stable_id = ?2,
                    fingerprint_json = ?3,
                    location_json = ?4,
                    definition_version_id = ?5,
                    definition_version_semantics = ?6,
                    last_verified_at = ?7,
                    last_verified_state_id = ?8
                 WHERE stable_id = ?1",
                params![
                    mapping.stable_id,
                    mapping.backend_stable_id,
                    fingerprint_json,
                    location_json,
                    mapping.definition_version_id,
                    mapping.definition_version_semantics,
                    mapping.last_verified_at.to_rfc3339(),
                    mapping.last_verified_state_id,
                ],
            )?;

            if affected == 0 {
                return Err(Error::NotAffected {
                    entity: "symbol mapping",
                    id: mapping.stable_id.clone(),
                });
            }

            fetch_mapping(tx, &mapping.stable_id)
        })
    }

    /// Tombstones a mapping (state -> `deleted`). On an already-deleted
    /// mapping this re-stamps `last_verified_*` (audit drift, OQ-2) but
    /// never re-stamps `deleted_at`/`deleted_in_state_id` and never flips
    /// `state` away from `deleted` (B1).
    pub fn mark_as_deleted(
        &self,
        stable_id: &str,
        state_id: &str,
        cancel: &CancellationToken,
    ) -> Result<SymbolMapping> {
        let now = Utc::now().to_rfc3339();
        self.engine.with_transaction(cancel, |tx| {
            let affected = tx.execute(
                "UPDATE symbol_mappings SET
                    state = 'deleted',
                    last_verified_at = ?2,
                    last_verified_state_id = ?3,
                    deleted_at = COALESCE(deleted_at, ?2),
                    deleted_in_state_id = COALESCE(deleted_in_state_id, ?3)
                 WHERE stable_id = ?1",
                params![stable_id, now, state_id],
            )?;

            if affected == 0 {
                return Err(Error::NotAffected {
                    entity: "symbol mapping",
                    id: stable_id.to_string(),
                });
            }

            fetch_mapping(tx, stable_id)
        })
    }

    /// Lists mappings in a given state, most recently verified first.
    pub fn list_by_state(&self, state: StateFilter, limit: i64) -> Result<Vec<SymbolMapping>> {
        self.engine.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT stable_id, state, backend_stable_id, fingerprint_json, location_json,
                        definition_version_id, definition_version_semantics,
                        last_verified_at, last_verified_state_id, deleted_at, deleted_in_state_id
                 FROM symbol_mappings WHERE state = ?1
                 ORDER BY last_verified_at DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![state.as_db_str(), limit], row_to_mapping)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row??);
            }
            Ok(out)
        })
    }

    /// Permanently removes a mapping (administrative operation). Cascades
    /// to any aliases referencing it (I3).
    pub fn delete(&self, stable_id: &str, cancel: &CancellationToken) -> Result<bool> {
        self.engine.with_transaction(cancel, |tx| {
            let affected = tx.execute("DELETE FROM symbol_mappings WHERE stable_id = ?1", params![stable_id])?;
            Ok(affected > 0)
        })
    }

    /// Creates an alias edge. Both endpoints must already exist (I3); the
    /// foreign keys enforce this and a violation surfaces as
    /// `ConstraintViolation`.
    pub fn create_alias(&self, alias: &SymbolAlias, cancel: &CancellationToken) -> Result<()> {
        check_confidence(alias.confidence)?;

        self.engine.with_transaction(cancel, |tx| {
            tx.execute(
                "INSERT INTO symbol_aliases (old_stable_id, new_stable_id, reason, confidence, created_at, created_state_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    alias.old_stable_id,
                    alias.new_stable_id,
                    alias.reason,
                    alias.confidence,
                    alias.created_at.to_rfc3339(),
                    alias.created_state_id,
                ],
            )
            .map_err(|e| match &e {
                rusqlite::Error::SqliteFailure(sqlite_err, _)
                    if sqlite_err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Error::ConstraintViolation(format!(
                        "alias endpoint does not exist: {} -> {}",
                        alias.old_stable_id, alias.new_stable_id
                    ))
                }
                _ => Error::Database(e),
            })?;
            Ok(())
        })
    }

    /// Returns the direct alias edges out of `old_stable_id`. Chain
    /// resolution (walking multiple hops, bounding depth, detecting
    /// revisits) is the caller's responsibility (§4.3).
    pub fn get_by_old_stable_id(&self, old_stable_id: &str) -> Result<Vec<SymbolAlias>> {
        self.engine.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT old_stable_id, new_stable_id, reason, confidence, created_at, created_state_id
                 FROM symbol_aliases WHERE old_stable_id = ?1",
            )?;
            let rows = stmt.query_map(params![old_stable_id], row_to_alias)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row??);
            }
            Ok(out)
        })
    }
}

fn fetch_mapping(tx: &rusqlite::Transaction, stable_id: &str) -> Result<SymbolMapping> {
    tx.query_row(
        "SELECT stable_id, state, backend_stable_id, fingerprint_json, location_json,
                definition_version_id, definition_version_semantics,
                last_verified_at, last_verified_state_id, deleted_at, deleted_in_state_id
         FROM symbol_mappings WHERE stable_id = ?1",
        params![stable_id],
        row_to_mapping,
    )?
}

fn row_to_mapping(row: &Row) -> rusqlite::Result<Result<SymbolMapping>> {
    Ok((|| {
        let stable_id: String = row.get(0)?;
        let state_str: String = row.get(1)?;
        let backend_stable_id: Option<String> = row.get(2)?;
        let fingerprint_json: String = row.get(3)?;
        let location_json: String = row.get(4)?;
        let definition_version_id: Option<String> = row.get(5)?;
        let definition_version_semantics: Option<String> = row.get(6)?;
        let last_verified_at_raw: String = row.get(7)?;
        let last_verified_state_id: String = row.get(8)?;
        let deleted_at_raw: Option<String> = row.get(9)?;
        let deleted_in_state_id: Option<String> = row.get(10)?;

        let fingerprint: Fingerprint = serde_json::from_str(&fingerprint_json)
            .map_err(|e| Error::DataCorruption(format!("fingerprint_json: {e}")))?;
        let location: Location = serde_json::from_str(&location_json)
            .map_err(|e| Error::DataCorruption(format!("location_json: {e}")))?;
        let last_verified_at = parse_timestamp("last_verified_at", &last_verified_at_raw)?;

        let state = match (state_str.as_str(), deleted_at_raw, deleted_in_state_id) {
            ("deleted", Some(deleted_at_raw), Some(deleted_in_state_id)) => {
                let deleted_at = parse_timestamp("deleted_at", &deleted_at_raw)?;
                SymbolState::Deleted { deleted_at, deleted_in_state_id }
            }
            ("active", None, None) => SymbolState::Active,
            ("unknown", None, None) => SymbolState::Unknown,
            (other, _, _) => {
                return Err(Error::DataCorruption(format!(
                    "symbol_mappings row for {stable_id} has inconsistent state {other}"
                )))
            }
        };

        Ok(SymbolMapping {
            stable_id,
            state,
            backend_stable_id,
            fingerprint,
            location,
            definition_version_id,
            definition_version_semantics,
            last_verified_at,
            last_verified_state_id,
        })
    })())
}

fn row_to_alias(row: &Row) -> rusqlite::Result<Result<SymbolAlias>> {
    Ok((|| {
        let old_stable_id: String = row.get(0)?;
        let new_stable_id: String = row.get(1)?;
        let reason: Option<String> = row.get(2)?;
        let confidence: f64 = row.get(3)?;
        let created_at_raw: String = row.get(4)?;
        let created_state_id: String = row.get(5)?;

        let created_at = parse_timestamp("created_at", &created_at_raw)?;

        Ok(SymbolAlias {
            old_stable_id,
            new_stable_id,
            reason,
            confidence,
            created_at,
            created_state_id,
        })
    })())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::StorageEngine;

    fn new_store() -> SymbolStore {
        let engine = Arc::new(StorageEngine::open_in_memory().expect("open"));
        SymbolStore::new(engine)
    }

    fn sample_mapping(stable_id: &str) -> SymbolMapping {
        SymbolMapping {
            stable_id: stable_id.to_string(),
            state: SymbolState::Active,
            backend_stable_id: None,
            fingerprint: Fingerprint {
                name: "f".to_string(),
                kind: "function".to_string(),
                signature: None,
                containers: vec![],
            },
            location: Location { path: "a.go".to_string(), line: 1, column: None },
            definition_version_id: None,
            definition_version_semantics: None,
            last_verified_at: Utc::now(),
            last_verified_state_id: "st-1".to_string(),
        }
    }

    #[test]
    fn tombstone_round_trip() {
        let store = new_store();
        let cancel = CancellationToken::new();
        store.create(&sample_mapping("sym-1"), &cancel).unwrap();

        let updated = store.mark_as_deleted("sym-1", "st-2", &cancel).unwrap();
        match updated.state {
            SymbolState::Deleted { deleted_in_state_id, .. } => {
                assert_eq!(deleted_in_state_id, "st-2");
            }
            other => panic!("expected deleted, got {other:?}"),
        }

        let fetched = store.get_by_stable_id("sym-1").unwrap().unwrap();
        assert!(matches!(fetched.state, SymbolState::Deleted { .. }));
    }

    #[test]
    fn mark_as_deleted_twice_keeps_first_tombstone_state_id() {
        let store = new_store();
        let cancel = CancellationToken::new();
        store.create(&sample_mapping("sym-1"), &cancel).unwrap();
        store.mark_as_deleted("sym-1", "st-2", &cancel).unwrap();
        let second = store.mark_as_deleted("sym-1", "st-3", &cancel).unwrap();

        match second.state {
            SymbolState::Deleted { deleted_in_state_id, .. } => {
                assert_eq!(deleted_in_state_id, "st-2", "deleted_in_state_id must not move once set");
            }
            other => panic!("expected deleted, got {other:?}"),
        }
        assert_eq!(second.last_verified_state_id, "st-3", "last_verified_* should still advance");
    }

    #[test]
    fn mark_as_deleted_missing_row_is_not_affected() {
        let store = new_store();
        let cancel = CancellationToken::new();
        let err = store.mark_as_deleted("missing", "st-1", &cancel).unwrap_err();
        assert!(matches!(err, Error::NotAffected { .. }));
    }

    #[test]
    fn alias_referential_integrity() {
        let store = new_store();
        let cancel = CancellationToken::new();
        store.create(&sample_mapping("sym-old"), &cancel).unwrap();
        store.create(&sample_mapping("sym-new"), &cancel).unwrap();
        store.mark_as_deleted("sym-old", "st-2", &cancel).unwrap();

        store
            .create_alias(
                &SymbolAlias {
                    old_stable_id: "sym-old".to_string(),
                    new_stable_id: "sym-new".to_string(),
                    reason: Some("refactored".to_string()),
                    confidence: 0.95,
                    created_at: Utc::now(),
                    created_state_id: "st-2".to_string(),
                },
                &cancel,
            )
            .unwrap();

        store.delete("sym-old", &cancel).unwrap();
        assert!(store.get_by_old_stable_id("sym-old").unwrap().is_empty());
    }

    #[test]
    fn alias_rejects_missing_endpoint() {
        let store = new_store();
        let cancel = CancellationToken::new();
        store.create(&sample_mapping("sym-new"), &cancel).unwrap();

        let err = store
            .create_alias(
                &SymbolAlias {
                    old_stable_id: "does-not-exist".to_string(),
                    new_stable_id: "sym-new".to_string(),
                    reason: None,
                    confidence: 0.5,
                    created_at: Utc::now(),
                    created_state_id: "st-1".to_string(),
                },
                &cancel,
            )
            .unwrap_err();
        assert!(matches!(err, Error::ConstraintViolation(_)));
    }

    #[test]
    fn update_missing_row_is_not_affected() {
        let store = new_store();
        let cancel = CancellationToken::new();
        let err = store.update(&sample_mapping("missing"), &cancel).unwrap_err();
        assert!(matches!(err, Error::NotAffected { .. }));
    }
}

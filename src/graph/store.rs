use std::sync::Arc;

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use tokio_util::sync::CancellationToken;

use crate::engine::StorageEngine;
use crate::error::{Error, Result};
use crate::util::{check_confidence, escape_like, parse_timestamp};

use super::types::{
    AnnotationSource, Boundaries, Decision, DecisionStatus, DependencyEdge, HotspotSnapshot,
    Module, ModuleRename, OwnershipEvent, OwnershipHistoryEntry, OwnershipRule, OwnershipScope,
    OwnershipSource, Responsibility, ResponsibilitySource, TargetType,
};

/// Modules, dependency edges, module renames, and the architectural
/// annotation tables layered on top of them (spec §4.4).
pub struct GraphStore {
    engine: Arc<StorageEngine>,
}

impl GraphStore {
    /// Construct a store bound to a single repository's storage engine.
    pub fn new(engine: Arc<StorageEngine>) -> Self {
        Self { engine }
    }

    // ------------------------------------------------------------------
    // Modules
    // ------------------------------------------------------------------

    /// Inserts a new module.
    pub fn create_module(&self, module: &Module, cancel: &CancellationToken) -> Result<()> {
        if let Some(confidence) = module.confidence {
            check_confidence(confidence)?;
        }
        let boundaries_json = module
            .boundaries
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| Error::ConstraintViolation(format!("invalid boundaries: {e}")))?;
        let tags_json = serde_json::to_string(&module.tags)
            .map_err(|e| Error::ConstraintViolation(format!("invalid tags: {e}")))?;

        self.engine.with_transaction(cancel, |tx| {
            tx.execute(
                "INSERT INTO modules (
                    module_id, name, root_path, manifest_type, detected_at, state_id,
                    boundaries_json, responsibility, owner_ref, tags_json, annotation_source, confidence
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    module.module_id,
                    module.name,
                    module.root_path,
                    module.manifest_type,
                    module.detected_at.to_rfc3339(),
                    module.state_id,
                    boundaries_json,
                    module.responsibility,
                    module.owner_ref,
                    tags_json,
                    module.annotation_source.map(AnnotationSource::as_db_str),
                    module.confidence,
                ],
            )?;
            Ok(())
        })
    }

    /// Returns `Ok(None)` for an unknown `module_id`.
    pub fn get_module(&self, module_id: &str) -> Result<Option<Module>> {
        self.engine.with_connection(|conn| {
            conn.query_row(MODULE_SELECT, params![module_id], row_to_module)
                .optional()
                .map_err(Error::from)?
                .transpose()
        })
    }

    /// Updates annotation fields on an existing module. Fails with
    /// `NotAffected` if the row doesn't exist.
    pub fn update_module_annotations(
        &self,
        module_id: &str,
        boundaries: Option<&Boundaries>,
        responsibility: Option<&str>,
        owner_ref: Option<&str>,
        tags: &[String],
        source: AnnotationSource,
        confidence: f64,
        cancel: &CancellationToken,
    ) -> Result<Module> {
        check_confidence(confidence)?;
        let boundaries_json = boundaries
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| Error::ConstraintViolation(format!("invalid boundaries: {e}")))?;
        let tags_json = serde_json::to_string(tags)
            .map_err(|e| Error::ConstraintViolation(format!("invalid tags: {e}")))?;

        self.engine.with_transaction(cancel, |tx| {
            let affected = tx.execute(
                "UPDATE modules SET boundaries_json = ?2, responsibility = ?3, owner_ref = ?4,
                    tags_json = ?5, annotation_source = ?6, confidence = ?7
                 WHERE module_id = ?1",
                params![
                    module_id,
                    boundaries_json,
                    responsibility,
                    owner_ref,
                    tags_json,
                    source.as_db_str(),
                    confidence,
                ],
            )?;
            if affected == 0 {
                return Err(Error::NotAffected { entity: "module", id: module_id.to_string() });
            }
            tx.query_row(MODULE_SELECT, params![module_id], row_to_module)?
        })
    }

    /// Permanently removes a module. Cascades to dependency edges
    /// referencing it (I4).
    pub fn delete_module(&self, module_id: &str, cancel: &CancellationToken) -> Result<bool> {
        self.engine.with_transaction(cancel, |tx| {
            let affected = tx.execute("DELETE FROM modules WHERE module_id = ?1", params![module_id])?;
            Ok(affected > 0)
        })
    }

    // ------------------------------------------------------------------
    // Dependency edges
    // ------------------------------------------------------------------

    /// Creates or replaces a dependency edge between two existing modules.
    pub fn upsert_edge(&self, edge: &DependencyEdge, cancel: &CancellationToken) -> Result<()> {
        if edge.strength < 0.0 {
            return Err(Error::ConstraintViolation(format!(
                "edge strength {} must be >= 0",
                edge.strength
            )));
        }

        self.engine.with_transaction(cancel, |tx| {
            tx.execute(
                "INSERT INTO dependency_edges (from_module, to_module, kind, strength)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (from_module, to_module) DO UPDATE SET kind = excluded.kind, strength = excluded.strength",
                params![edge.from_module, edge.to_module, edge.kind, edge.strength],
            )
            .map_err(|e| match &e {
                rusqlite::Error::SqliteFailure(sqlite_err, _)
                    if sqlite_err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Error::ConstraintViolation(format!(
                        "edge endpoint does not exist: {} -> {}",
                        edge.from_module, edge.to_module
                    ))
                }
                _ => Error::Database(e),
            })?;
            Ok(())
        })
    }

    /// Lists outgoing edges from a module.
    pub fn list_edges_from(&self, module_id: &str) -> Result<Vec<DependencyEdge>> {
        self.engine.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT from_module, to_module, kind, strength FROM dependency_edges WHERE from_module = ?1",
            )?;
            let rows = stmt.query_map(params![module_id], row_to_edge)?;
            rows.map(|r| r.map_err(Error::from)).collect()
        })
    }

    /// Lists incoming edges to a module.
    pub fn list_edges_to(&self, module_id: &str) -> Result<Vec<DependencyEdge>> {
        self.engine.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT from_module, to_module, kind, strength FROM dependency_edges WHERE to_module = ?1",
            )?;
            let rows = stmt.query_map(params![module_id], row_to_edge)?;
            rows.map(|r| r.map_err(Error::from)).collect()
        })
    }

    /// Removes a dependency edge.
    pub fn delete_edge(&self, from_module: &str, to_module: &str, cancel: &CancellationToken) -> Result<bool> {
        self.engine.with_transaction(cancel, |tx| {
            let affected = tx.execute(
                "DELETE FROM dependency_edges WHERE from_module = ?1 AND to_module = ?2",
                params![from_module, to_module],
            )?;
            Ok(affected > 0)
        })
    }

    // ------------------------------------------------------------------
    // Module renames
    // ------------------------------------------------------------------

    /// Appends a module-rename record.
    pub fn record_rename(&self, rename: &ModuleRename, cancel: &CancellationToken) -> Result<()> {
        self.engine.with_transaction(cancel, |tx| {
            tx.execute(
                "INSERT INTO module_renames (old_id, new_id, renamed_at, reason) VALUES (?1, ?2, ?3, ?4)",
                params![rename.old_id, rename.new_id, rename.renamed_at.to_rfc3339(), rename.reason],
            )?;
            Ok(())
        })
    }

    /// Lists renames recorded for a given old module id, oldest first.
    pub fn list_renames_from(&self, old_id: &str) -> Result<Vec<ModuleRename>> {
        self.engine.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT old_id, new_id, renamed_at, reason FROM module_renames WHERE old_id = ?1 ORDER BY renamed_at ASC",
            )?;
            let rows = stmt.query_map(params![old_id], row_to_rename)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row??);
            }
            Ok(out)
        })
    }

    // ------------------------------------------------------------------
    // Ownership
    // ------------------------------------------------------------------

    /// Inserts or replaces an ownership rule keyed by `(pattern, source)`.
    pub fn upsert_ownership_rule(
        &self,
        pattern: &str,
        owners: &[String],
        scope: OwnershipScope,
        source: OwnershipSource,
        confidence: f64,
        cancel: &CancellationToken,
    ) -> Result<OwnershipRule> {
        check_confidence(confidence)?;
        let owners_json = serde_json::to_string(owners)
            .map_err(|e| Error::ConstraintViolation(format!("invalid owners: {e}")))?;
        let now = Utc::now().to_rfc3339();

        self.engine.with_transaction(cancel, |tx| {
            tx.execute(
                "INSERT INTO ownership_rules (pattern, owners_json, scope, source, confidence, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (pattern, source) DO UPDATE SET
                    owners_json = excluded.owners_json,
                    scope = excluded.scope,
                    confidence = excluded.confidence,
                    updated_at = excluded.updated_at",
                params![pattern, owners_json, scope.as_db_str(), source.as_db_str(), confidence, now],
            )?;

            tx.query_row(
                "SELECT id, pattern, owners_json, scope, source, confidence, updated_at
                 FROM ownership_rules WHERE pattern = ?1 AND source = ?2",
                params![pattern, source.as_db_str()],
                row_to_ownership_rule,
            )?
        })
    }

    /// Appends an ownership lifecycle event.
    pub fn record_ownership_event(&self, entry: &OwnershipHistoryEntry, cancel: &CancellationToken) -> Result<()> {
        self.engine.with_transaction(cancel, |tx| {
            tx.execute(
                "INSERT INTO ownership_history (pattern, owner_id, event, reason, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    entry.pattern,
                    entry.owner_id,
                    entry.event.as_db_str(),
                    entry.reason,
                    entry.recorded_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// Lists ownership lifecycle events recorded for a pattern, most
    /// recent first (uses `idx_ownership_history_pattern`).
    pub fn list_ownership_history(&self, pattern: &str) -> Result<Vec<OwnershipHistoryEntry>> {
        self.engine.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT pattern, owner_id, event, reason, recorded_at
                 FROM ownership_history WHERE pattern = ?1 ORDER BY recorded_at DESC",
            )?;
            let rows = stmt.query_map(params![pattern], row_to_ownership_event)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row??);
            }
            Ok(out)
        })
    }

    /// Returns all ownership rules ordered by pattern length descending,
    /// then confidence descending, per spec §4.4. Glob matching against a
    /// path is the caller's responsibility (OQ-1).
    pub fn list_ownership_rules(&self) -> Result<Vec<OwnershipRule>> {
        self.engine.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, pattern, owners_json, scope, source, confidence, updated_at
                 FROM ownership_rules ORDER BY length(pattern) DESC, confidence DESC",
            )?;
            let rows = stmt.query_map([], row_to_ownership_rule)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row??);
            }
            Ok(out)
        })
    }

    // ------------------------------------------------------------------
    // Responsibilities
    // ------------------------------------------------------------------

    /// Inserts or replaces the responsibility summary for `target_id`.
    pub fn upsert_responsibility(&self, responsibility: &Responsibility, cancel: &CancellationToken) -> Result<()> {
        check_confidence(responsibility.confidence)?;
        let capabilities_json = serde_json::to_string(&responsibility.capabilities)
            .map_err(|e| Error::ConstraintViolation(format!("invalid capabilities: {e}")))?;

        self.engine.with_transaction(cancel, |tx| {
            tx.execute(
                "INSERT INTO responsibilities (target_id, target_type, summary, capabilities_json, source, confidence, updated_at, verified_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT (target_id, target_type) DO UPDATE SET
                    summary = excluded.summary,
                    capabilities_json = excluded.capabilities_json,
                    source = excluded.source,
                    confidence = excluded.confidence,
                    updated_at = excluded.updated_at,
                    verified_at = excluded.verified_at",
                params![
                    responsibility.target_id,
                    responsibility.target_type.as_db_str(),
                    responsibility.summary,
                    capabilities_json,
                    responsibility.source.as_db_str(),
                    responsibility.confidence,
                    responsibility.updated_at.to_rfc3339(),
                    responsibility.verified_at.map(|t| t.to_rfc3339()),
                ],
            )?;
            Ok(())
        })
    }

    /// Fetches the responsibility summary for a specific target.
    pub fn get_responsibility(&self, target_id: &str, target_type: TargetType) -> Result<Option<Responsibility>> {
        self.engine.with_connection(|conn| {
            conn.query_row(
                RESPONSIBILITY_SELECT_BY_TARGET,
                params![target_id, target_type.as_db_str()],
                row_to_responsibility,
            )
            .optional()
            .map_err(Error::from)?
            .transpose()
        })
    }

    /// Substring search over responsibility summaries. A `LIKE`-based
    /// search as specified; callers with the FTS engine available may
    /// prefer that for larger corpora (spec §4.4).
    pub fn search_responsibilities(&self, query: &str, limit: i64) -> Result<Vec<Responsibility>> {
        let pattern = format!("%{}%", escape_like(query));
        self.engine.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{RESPONSIBILITY_SELECT_BASE} WHERE summary LIKE ?1 ESCAPE '\\' ORDER BY updated_at DESC LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![pattern, limit], row_to_responsibility)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row??);
            }
            Ok(out)
        })
    }

    // ------------------------------------------------------------------
    // Decisions
    // ------------------------------------------------------------------

    /// Inserts or replaces a decision record keyed by `id`.
    pub fn upsert_decision(&self, decision: &Decision, cancel: &CancellationToken) -> Result<()> {
        let affected_modules_json = serde_json::to_string(&decision.affected_modules)
            .map_err(|e| Error::ConstraintViolation(format!("invalid affected_modules: {e}")))?;

        self.engine.with_transaction(cancel, |tx| {
            tx.execute(
                "INSERT INTO decisions (id, title, status, affected_modules_json, file_path, author, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT (id) DO UPDATE SET
                    title = excluded.title,
                    status = excluded.status,
                    affected_modules_json = excluded.affected_modules_json,
                    file_path = excluded.file_path,
                    author = excluded.author,
                    updated_at = excluded.updated_at",
                params![
                    decision.id,
                    decision.title,
                    decision.status.as_db_str(),
                    affected_modules_json,
                    decision.file_path,
                    decision.author,
                    decision.created_at.to_rfc3339(),
                    decision.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// Fetches a decision by id.
    pub fn get_decision(&self, id: &str) -> Result<Option<Decision>> {
        self.engine.with_connection(|conn| {
            conn.query_row(DECISION_SELECT, params![id], row_to_decision)
                .optional()
                .map_err(Error::from)?
                .transpose()
        })
    }

    /// Finds decisions whose `affected_modules` list contains `module_id`,
    /// via a substring match on the serialized list (spec §4.4). Callers
    /// that normalize `affected_modules` into its own table may replace
    /// this with a proper join.
    pub fn find_decisions_by_module(&self, module_id: &str) -> Result<Vec<Decision>> {
        let needle = format!("%\"{}\"%", escape_like(module_id));
        self.engine.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{DECISION_SELECT_BASE} WHERE affected_modules_json LIKE ?1 ESCAPE '\\' ORDER BY updated_at DESC"
            ))?;
            let rows = stmt.query_map(params![needle], row_to_decision)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row??);
            }
            Ok(out)
        })
    }

    // ------------------------------------------------------------------
    // Hotspots
    // ------------------------------------------------------------------

    /// Appends a hotspot snapshot.
    pub fn record_hotspot_snapshot(&self, snapshot: &HotspotSnapshot, cancel: &CancellationToken) -> Result<()> {
        self.engine.with_transaction(cancel, |tx| {
            tx.execute(
                "INSERT INTO hotspot_snapshots (target_id, target_type, snapshot_date, churn, complexity, coupling, score)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (target_id, target_type, snapshot_date) DO UPDATE SET
                    churn = excluded.churn, complexity = excluded.complexity,
                    coupling = excluded.coupling, score = excluded.score",
                params![
                    snapshot.target_id,
                    snapshot.target_type.as_db_str(),
                    snapshot.snapshot_date.to_rfc3339(),
                    snapshot.churn,
                    snapshot.complexity,
                    snapshot.coupling,
                    snapshot.score,
                ],
            )?;
            Ok(())
        })
    }

    /// Lists hotspot snapshots for a target, most recent first.
    pub fn list_hotspots(&self, target_id: &str, target_type: TargetType, limit: i64) -> Result<Vec<HotspotSnapshot>> {
        self.engine.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT target_id, target_type, snapshot_date, churn, complexity, coupling, score
                 FROM hotspot_snapshots WHERE target_id = ?1 AND target_type = ?2
                 ORDER BY snapshot_date DESC LIMIT ?3",
            )?;
            let rows = stmt.query_map(params![target_id, target_type.as_db_str(), limit], row_to_hotspot)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row??);
            }
            Ok(out)
        })
    }
}

const MODULE_SELECT: &str = "SELECT module_id, name, root_path, manifest_type, detected_at, state_id,
    boundaries_json, responsibility, owner_ref, tags_json, annotation_source, confidence
    FROM modules WHERE module_id = ?1";

const RESPONSIBILITY_SELECT_BASE: &str = "SELECT target_id, target_type, summary, capabilities_json, source, confidence, updated_at, verified_at FROM responsibilities";
const RESPONSIBILITY_SELECT_BY_TARGET: &str = "SELECT target_id, target_type, summary, capabilities_json, source, confidence, updated_at, verified_at FROM responsibilities WHERE target_id = ?1 AND target_type = ?2";

const DECISION_SELECT_BASE: &str = "SELECT id, title, status, affected_modules_json, file_path, author, created_at, updated_at FROM decisions";
const DECISION_SELECT: &str = "SELECT id, title, status, affected_modules_json, file_path, author, created_at, updated_at FROM decisions WHERE id = ?1";

fn row_to_module(row: &Row) -> rusqlite::Result<Result<Module>> {
    Ok((|| {
        let module_id: String = row.get(0)?;
        let name: String = row.get(1)?;
        let root_path: String = row.get(2)?;
        let manifest_type: Option<String> = row.get(3)?;
        let detected_at_raw: String = row.get(4)?;
        let state_id: String = row.get(5)?;
        let boundaries_json: Option<String> = row.get(6)?;
        let responsibility: Option<String> = row.get(7)?;
        let owner_ref: Option<String> = row.get(8)?;
        let tags_json: String = row.get(9)?;
        let annotation_source: Option<String> = row.get(10)?;
        let confidence: Option<f64> = row.get(11)?;

        let detected_at = parse_timestamp("detected_at", &detected_at_raw)?;
        let boundaries = boundaries_json
            .map(|json| serde_json::from_str::<Boundaries>(&json))
            .transpose()
            .map_err(|e| Error::DataCorruption(format!("boundaries_json: {e}")))?;
        let tags: Vec<String> = serde_json::from_str(&tags_json)
            .map_err(|e| Error::DataCorruption(format!("tags_json: {e}")))?;
        let annotation_source = annotation_source
            .map(|raw| {
                AnnotationSource::parse(&raw)
                    .ok_or_else(|| Error::DataCorruption(format!("unknown annotation_source {raw}")))
            })
            .transpose()?;

        Ok(Module {
            module_id,
            name,
            root_path,
            manifest_type,
            detected_at,
            state_id,
            boundaries,
            responsibility,
            owner_ref,
            tags,
            annotation_source,
            confidence,
        })
    })())
}

fn row_to_edge(row: &Row) -> rusqlite::Result<DependencyEdge> {
    Ok(DependencyEdge {
        from_module: row.get(0)?,
        to_module: row.get(1)?,
        kind: row.get(2)?,
        strength: row.get(3)?,
    })
}

fn row_to_rename(row: &Row) -> rusqlite::Result<Result<ModuleRename>> {
    Ok((|| {
        let old_id: String = row.get(0)?;
        let new_id: String = row.get(1)?;
        let renamed_at_raw: String = row.get(2)?;
        let reason: Option<String> = row.get(3)?;
        let renamed_at = parse_timestamp("renamed_at", &renamed_at_raw)?;
        Ok(ModuleRename { old_id, new_id, renamed_at, reason })
    })())
}

fn row_to_ownership_rule(row: &Row) -> rusqlite::Result<Result<OwnershipRule>> {
    Ok((|| {
        let id: i64 = row.get(0)?;
        let pattern: String = row.get(1)?;
        let owners_json: String = row.get(2)?;
        let scope_raw: String = row.get(3)?;
        let source_raw: String = row.get(4)?;
        let confidence: f64 = row.get(5)?;
        let updated_at_raw: String = row.get(6)?;

        let owners: Vec<String> = serde_json::from_str(&owners_json)
            .map_err(|e| Error::DataCorruption(format!("owners_json: {e}")))?;
        let scope = OwnershipScope::parse(&scope_raw)
            .ok_or_else(|| Error::DataCorruption(format!("unknown ownership scope {scope_raw}")))?;
        let source = OwnershipSource::parse(&source_raw)
            .ok_or_else(|| Error::DataCorruption(format!("unknown ownership source {source_raw}")))?;
        let updated_at = parse_timestamp("updated_at", &updated_at_raw)?;

        Ok(OwnershipRule { id, pattern, owners, scope, source, confidence, updated_at })
    })())
}

fn row_to_ownership_event(row: &Row) -> rusqlite::Result<Result<OwnershipHistoryEntry>> {
    Ok((|| {
        let pattern: String = row.get(0)?;
        let owner_id: String = row.get(1)?;
        let event_raw: String = row.get(2)?;
        let reason: Option<String> = row.get(3)?;
        let recorded_at_raw: String = row.get(4)?;

        let event = OwnershipEvent::parse(&event_raw)
            .ok_or_else(|| Error::DataCorruption(format!("unknown ownership event {event_raw}")))?;
        let recorded_at = parse_timestamp("recorded_at", &recorded_at_raw)?;

        Ok(OwnershipHistoryEntry { pattern, owner_id, event, reason, recorded_at })
    })())
}

fn row_to_responsibility(row: &Row) -> rusqlite::Result<Result<Responsibility>> {
    Ok((|| {
        let target_id: String = row.get(0)?;
        let target_type_raw: String = row.get(1)?;
        let summary: String = row.get(2)?;
        let capabilities_json: String = row.get(3)?;
        let source_raw: String = row.get(4)?;
        let confidence: f64 = row.get(5)?;
        let updated_at_raw: String = row.get(6)?;
        let verified_at_raw: Option<String> = row.get(7)?;

        let target_type = TargetType::parse(&target_type_raw)
            .ok_or_else(|| Error::DataCorruption(format!("unknown target_type {target_type_raw}")))?;
        let capabilities: Vec<String> = serde_json::from_str(&capabilities_json)
            .map_err(|e| Error::DataCorruption(format!("capabilities_json: {e}")))?;
        let source = ResponsibilitySource::parse(&source_raw)
            .ok_or_else(|| Error::DataCorruption(format!("unknown responsibility source {source_raw}")))?;
        let updated_at = parse_timestamp("updated_at", &updated_at_raw)?;
        let verified_at = verified_at_raw
            .map(|raw| parse_timestamp("verified_at", &raw))
            .transpose()?;

        Ok(Responsibility {
            target_id,
            target_type,
            summary,
            capabilities,
            source,
            confidence,
            updated_at,
            verified_at,
        })
    })())
}

fn row_to_decision(row: &Row) -> rusqlite::Result<Result<Decision>> {
    Ok((|| {
        let id: String = row.get(0)?;
        let title: String = row.get(1)?;
        let status_raw: String = row.get(2)?;
        let affected_modules_json: String = row.get(3)?;
        let file_path: Option<String> = row.get(4)?;
        let author: Option<String> = row.get(5)?;
        let created_at_raw: String = row.get(6)?;
        let updated_at_raw: String = row.get(7)?;

        let status = DecisionStatus::parse(&status_raw)
            .ok_or_else(|| Error::DataCorruption(format!("unknown decision status {status_raw}")))?;
        let affected_modules: Vec<String> = serde_json::from_str(&affected_modules_json)
            .map_err(|e| Error::DataCorruption(format!("affected_modules_json: {e}")))?;
        let created_at = parse_timestamp("created_at", &created_at_raw)?;
        let updated_at = parse_timestamp("updated_at", &updated_at_raw)?;

        Ok(Decision { id, title, status, affected_modules, file_path, author, created_at, updated_at })
    })())
}

fn row_to_hotspot(row: &Row) -> rusqlite::Result<Result<HotspotSnapshot>> {
    Ok((|| {
        let target_id: String = row.get(0)?;
        let target_type_raw: String = row.get(1)?;
        let snapshot_date_raw: String = row.get(2)?;
        let churn: f64 = row.get(3)?;
        let complexity: f64 = row.get(4)?;
        let coupling: f64 = row.get(5)?;
        let score: f64 = row.get(6)?;

        let target_type = TargetType::parse(&target_type_raw)
            .ok_or_else(|| Error::DataCorruption(format!("unknown target_type {target_type_raw}")))?;
        let snapshot_date = parse_timestamp("snapshot_date", &snapshot_date_raw)?;

        Ok(HotspotSnapshot { target_id, target_type, snapshot_date, churn, complexity, coupling, score })
    })())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_store() -> GraphStore {
        let engine = Arc::new(StorageEngine::open_in_memory().expect("open"));
        GraphStore::new(engine)
    }

    fn sample_module(id: &str) -> Module {
        Module {
            module_id: id.to_string(),
            name: id.to_string(),
            root_path: format!("/{id}"),
            manifest_type: None,
            detected_at: Utc::now(),
            state_id: "st-1".to_string(),
            boundaries: None,
            responsibility: None,
            owner_ref: None,
            tags: vec![],
            annotation_source: None,
            confidence: None,
        }
    }

    #[test]
    fn module_round_trip() {
        let store = new_store();
        let cancel = CancellationToken::new();
        store.create_module(&sample_module("m1"), &cancel).unwrap();
        let fetched = store.get_module("m1").unwrap().unwrap();
        assert_eq!(fetched.name, "m1");
    }

    #[test]
    fn dependency_edge_requires_existing_endpoints() {
        let store = new_store();
        let cancel = CancellationToken::new();
        store.create_module(&sample_module("a"), &cancel).unwrap();
        store.create_module(&sample_module("b"), &cancel).unwrap();

        store
            .upsert_edge(
                &DependencyEdge { from_module: "a".to_string(), to_module: "b".to_string(), kind: "import".to_string(), strength: 1.0 },
                &cancel,
            )
            .unwrap();
        assert_eq!(store.list_edges_from("a").unwrap().len(), 1);

        store.delete_module("b", &cancel).unwrap();
        assert!(store.list_edges_from("a").unwrap().is_empty(), "cascade should remove the edge");
    }

    #[test]
    fn dependency_edge_rejects_missing_endpoint() {
        let store = new_store();
        let cancel = CancellationToken::new();
        store.create_module(&sample_module("a"), &cancel).unwrap();

        let err = store
            .upsert_edge(
                &DependencyEdge { from_module: "a".to_string(), to_module: "ghost".to_string(), kind: "import".to_string(), strength: 1.0 },
                &cancel,
            )
            .unwrap_err();
        assert!(matches!(err, Error::ConstraintViolation(_)));
    }

    #[test]
    fn ownership_rules_ordered_by_pattern_length_then_confidence() {
        let store = new_store();
        let cancel = CancellationToken::new();
        store
            .upsert_ownership_rule("src/**", &["alice".to_string()], OwnershipScope::Maintainer, OwnershipSource::Codeowners, 0.5, &cancel)
            .unwrap();
        store
            .upsert_ownership_rule("src/core/**", &["bob".to_string()], OwnershipScope::Maintainer, OwnershipSource::Codeowners, 0.9, &cancel)
            .unwrap();

        let rules = store.list_ownership_rules().unwrap();
        assert_eq!(rules[0].pattern, "src/core/**");
        assert_eq!(rules[1].pattern, "src/**");
    }

    #[test]
    fn ownership_history_lists_events_most_recent_first() {
        let store = new_store();
        let cancel = CancellationToken::new();
        store
            .record_ownership_event(
                &OwnershipHistoryEntry {
                    pattern: "src/core/**".to_string(),
                    owner_id: "alice".to_string(),
                    event: OwnershipEvent::Added,
                    reason: None,
                    recorded_at: Utc::now(),
                },
                &cancel,
            )
            .unwrap();
        store
            .record_ownership_event(
                &OwnershipHistoryEntry {
                    pattern: "src/core/**".to_string(),
                    owner_id: "alice".to_string(),
                    event: OwnershipEvent::Promoted,
                    reason: Some("became maintainer".to_string()),
                    recorded_at: Utc::now(),
                },
                &cancel,
            )
            .unwrap();

        let history = store.list_ownership_history("src/core/**").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].event, OwnershipEvent::Promoted);
        assert!(store.list_ownership_history("src/other/**").unwrap().is_empty());
    }

    #[test]
    fn decision_search_finds_by_affected_module() {
        let store = new_store();
        let cancel = CancellationToken::new();
        store
            .upsert_decision(
                &Decision {
                    id: "ADR-001".to_string(),
                    title: "Use SQLite".to_string(),
                    status: DecisionStatus::Accepted,
                    affected_modules: vec!["storage".to_string()],
                    file_path: None,
                    author: None,
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                },
                &cancel,
            )
            .unwrap();

        let found = store.find_decisions_by_module("storage").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "ADR-001");
        assert!(store.find_decisions_by_module("nonexistent").unwrap().is_empty());
    }

    #[test]
    fn responsibility_search_is_substring_based() {
        let store = new_store();
        let cancel = CancellationToken::new();
        store
            .upsert_responsibility(
                &Responsibility {
                    target_id: "storage".to_string(),
                    target_type: TargetType::Module,
                    summary: "Owns the SQLite connection lifecycle".to_string(),
                    capabilities: vec![],
                    source: ResponsibilitySource::Declared,
                    confidence: 1.0,
                    updated_at: Utc::now(),
                    verified_at: None,
                },
                &cancel,
            )
            .unwrap();

        let found = store.search_responsibilities("SQLite", 10).unwrap();
        assert_eq!(found.len(), 1);
    }
}

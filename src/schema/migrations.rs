//! Migration Definitions
//!
//! Forward-only schema migrations v1 -> v5 (spec §4.2). Each migration is
//! idempotent against partial prior application: table/index creation uses
//! `IF NOT EXISTS`, and column additions are applied one at a time so a
//! single "duplicate column" failure from a half-applied prior run can be
//! tolerated without losing the rest of the batch.

/// Current schema version this build knows how to open and migrate to.
pub const CURRENT_VERSION: u32 = 5;

/// A single forward migration.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    /// Target version this migration produces.
    pub version: u32,
    /// Human-readable description, surfaced in logs.
    pub description: &'static str,
    /// Migration body.
    pub up: &'static str,
}

/// All migrations in order. Index `i` always has `version == i + 1`.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Symbol mappings, aliases, modules, dependency edges, module renames",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Module annotations; ownership, responsibility, and decision tables",
        up: MIGRATION_V2_UP,
    },
    Migration {
        version: 3,
        description: "Hotspot snapshots and the three-tier cache tables",
        up: MIGRATION_V3_UP,
    },
    Migration {
        version: 4,
        description: "Coupling and risk caches",
        up: MIGRATION_V4_UP,
    },
    Migration {
        version: 5,
        description: "Full-text symbol index and doc-symbol linking",
        up: MIGRATION_V5_UP,
    },
];

const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS symbol_mappings (
    stable_id TEXT PRIMARY KEY,
    state TEXT NOT NULL DEFAULT 'active' CHECK (state IN ('active', 'deleted', 'unknown')),
    backend_stable_id TEXT,
    fingerprint_json TEXT NOT NULL,
    location_json TEXT NOT NULL,
    definition_version_id TEXT,
    definition_version_semantics TEXT,
    last_verified_at TEXT NOT NULL,
    last_verified_state_id TEXT NOT NULL,
    deleted_at TEXT,
    deleted_in_state_id TEXT,
    CHECK ((deleted_at IS NULL) = (deleted_in_state_id IS NULL)),
    CHECK ((state = 'deleted') = (deleted_at IS NOT NULL))
);

CREATE INDEX IF NOT EXISTS idx_symbol_mappings_state ON symbol_mappings(state);
CREATE INDEX IF NOT EXISTS idx_symbol_mappings_backend ON symbol_mappings(backend_stable_id);

CREATE TABLE IF NOT EXISTS symbol_aliases (
    old_stable_id TEXT NOT NULL REFERENCES symbol_mappings(stable_id) ON DELETE CASCADE,
    new_stable_id TEXT NOT NULL REFERENCES symbol_mappings(stable_id) ON DELETE CASCADE,
    reason TEXT,
    confidence REAL NOT NULL CHECK (confidence >= 0.0 AND confidence <= 1.0),
    created_at TEXT NOT NULL,
    created_state_id TEXT NOT NULL,
    PRIMARY KEY (old_stable_id, new_stable_id)
);

CREATE INDEX IF NOT EXISTS idx_symbol_aliases_new ON symbol_aliases(new_stable_id);

CREATE TABLE IF NOT EXISTS modules (
    module_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    root_path TEXT NOT NULL,
    manifest_type TEXT,
    detected_at TEXT NOT NULL,
    state_id TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS dependency_edges (
    from_module TEXT NOT NULL REFERENCES modules(module_id) ON DELETE CASCADE,
    to_module TEXT NOT NULL REFERENCES modules(module_id) ON DELETE CASCADE,
    kind TEXT NOT NULL,
    strength REAL NOT NULL DEFAULT 0.0 CHECK (strength >= 0.0),
    PRIMARY KEY (from_module, to_module)
);

CREATE INDEX IF NOT EXISTS idx_dependency_edges_to ON dependency_edges(to_module);

CREATE TABLE IF NOT EXISTS module_renames (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    old_id TEXT NOT NULL,
    new_id TEXT NOT NULL,
    renamed_at TEXT NOT NULL,
    reason TEXT
);

CREATE INDEX IF NOT EXISTS idx_module_renames_old ON module_renames(old_id);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

INSERT OR IGNORE INTO schema_version (version) VALUES (1);
"#;

const MIGRATION_V2_UP: &str = r#"
ALTER TABLE modules ADD COLUMN boundaries_json TEXT;
ALTER TABLE modules ADD COLUMN responsibility TEXT;
ALTER TABLE modules ADD COLUMN owner_ref TEXT;
ALTER TABLE modules ADD COLUMN tags_json TEXT DEFAULT '[]';
ALTER TABLE modules ADD COLUMN annotation_source TEXT CHECK (annotation_source IN ('declared', 'inferred'));
ALTER TABLE modules ADD COLUMN confidence REAL CHECK (confidence IS NULL OR (confidence >= 0.0 AND confidence <= 1.0));

CREATE TABLE IF NOT EXISTS ownership_rules (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pattern TEXT NOT NULL,
    owners_json TEXT NOT NULL,
    scope TEXT NOT NULL CHECK (scope IN ('maintainer', 'reviewer', 'contributor')),
    source TEXT NOT NULL CHECK (source IN ('codeowners', 'git-blame', 'declared', 'inferred')),
    confidence REAL NOT NULL CHECK (confidence >= 0.0 AND confidence <= 1.0),
    updated_at TEXT NOT NULL,
    UNIQUE (pattern, source)
);

CREATE INDEX IF NOT EXISTS idx_ownership_rules_pattern_len
    ON ownership_rules(length(pattern) DESC, confidence DESC);

CREATE TABLE IF NOT EXISTS ownership_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pattern TEXT NOT NULL,
    owner_id TEXT NOT NULL,
    event TEXT NOT NULL CHECK (event IN ('added', 'removed', 'promoted', 'demoted')),
    reason TEXT,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_ownership_history_pattern ON ownership_history(pattern);

CREATE TABLE IF NOT EXISTS responsibilities (
    target_id TEXT NOT NULL,
    target_type TEXT NOT NULL CHECK (target_type IN ('module', 'file', 'symbol')),
    summary TEXT NOT NULL,
    capabilities_json TEXT NOT NULL DEFAULT '[]',
    source TEXT NOT NULL CHECK (source IN ('declared', 'inferred', 'llm-generated')),
    confidence REAL NOT NULL CHECK (confidence >= 0.0 AND confidence <= 1.0),
    updated_at TEXT NOT NULL,
    verified_at TEXT,
    PRIMARY KEY (target_id, target_type)
);

CREATE TABLE IF NOT EXISTS decisions (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('proposed', 'accepted', 'deprecated', 'superseded')),
    affected_modules_json TEXT NOT NULL DEFAULT '[]',
    file_path TEXT,
    author TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

UPDATE schema_version SET version = 2;
"#;

const MIGRATION_V3_UP: &str = r#"
CREATE TABLE IF NOT EXISTS hotspot_snapshots (
    target_id TEXT NOT NULL,
    target_type TEXT NOT NULL CHECK (target_type IN ('module', 'file', 'symbol')),
    snapshot_date TEXT NOT NULL,
    churn REAL NOT NULL DEFAULT 0.0,
    complexity REAL NOT NULL DEFAULT 0.0,
    coupling REAL NOT NULL DEFAULT 0.0,
    score REAL NOT NULL DEFAULT 0.0,
    PRIMARY KEY (target_id, target_type, snapshot_date)
);

CREATE INDEX IF NOT EXISTS idx_hotspot_snapshots_score ON hotspot_snapshots(score DESC);

CREATE TABLE IF NOT EXISTS query_cache (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    head_commit TEXT NOT NULL,
    state_id TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_query_cache_expires ON query_cache(expires_at);
CREATE INDEX IF NOT EXISTS idx_query_cache_state ON query_cache(state_id);

CREATE TABLE IF NOT EXISTS view_cache (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    state_id TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_view_cache_expires ON view_cache(expires_at);
CREATE INDEX IF NOT EXISTS idx_view_cache_state ON view_cache(state_id);

CREATE TABLE IF NOT EXISTS negative_cache (
    key TEXT PRIMARY KEY,
    error_type TEXT NOT NULL,
    error_message TEXT NOT NULL,
    state_id TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_negative_cache_expires ON negative_cache(expires_at);
CREATE INDEX IF NOT EXISTS idx_negative_cache_state ON negative_cache(state_id);
CREATE INDEX IF NOT EXISTS idx_negative_cache_error_type ON negative_cache(error_type);

UPDATE schema_version SET version = 3;
"#;

const MIGRATION_V4_UP: &str = r#"
-- Analytical caches riding the same TTL-row shape as the Cache Tier, keyed
-- on a (target_id, target_type) composite rather than a free-form string
-- key since they memoize a specific computed metric per target.
CREATE TABLE IF NOT EXISTS coupling_cache (
    target_id TEXT NOT NULL,
    target_type TEXT NOT NULL CHECK (target_type IN ('module', 'file', 'symbol')),
    value TEXT NOT NULL,
    state_id TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (target_id, target_type)
);

CREATE INDEX IF NOT EXISTS idx_coupling_cache_expires ON coupling_cache(expires_at);

CREATE TABLE IF NOT EXISTS risk_cache (
    target_id TEXT NOT NULL,
    target_type TEXT NOT NULL CHECK (target_type IN ('module', 'file', 'symbol')),
    value TEXT NOT NULL,
    state_id TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (target_id, target_type)
);

CREATE INDEX IF NOT EXISTS idx_risk_cache_expires ON risk_cache(expires_at);

UPDATE schema_version SET version = 4;
"#;

const MIGRATION_V5_UP: &str = r#"
CREATE TABLE IF NOT EXISTS fts_content (
    id TEXT UNIQUE NOT NULL,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    documentation TEXT NOT NULL DEFAULT '',
    signature TEXT NOT NULL DEFAULT '',
    file_path TEXT NOT NULL DEFAULT '',
    language TEXT NOT NULL DEFAULT '',
    indexed_at TEXT NOT NULL
);

CREATE VIRTUAL TABLE IF NOT EXISTS fts_symbols USING fts5(
    name,
    documentation,
    signature,
    content = 'fts_content',
    content_rowid = 'rowid'
);

CREATE TRIGGER IF NOT EXISTS fts_content_ai AFTER INSERT ON fts_content BEGIN
    INSERT INTO fts_symbols(rowid, name, documentation, signature)
    VALUES (NEW.rowid, NEW.name, NEW.documentation, NEW.signature);
END;

CREATE TRIGGER IF NOT EXISTS fts_content_ad AFTER DELETE ON fts_content BEGIN
    INSERT INTO fts_symbols(fts_symbols, rowid, name, documentation, signature)
    VALUES ('delete', OLD.rowid, OLD.name, OLD.documentation, OLD.signature);
END;

CREATE TRIGGER IF NOT EXISTS fts_content_au AFTER UPDATE ON fts_content BEGIN
    INSERT INTO fts_symbols(fts_symbols, rowid, name, documentation, signature)
    VALUES ('delete', OLD.rowid, OLD.name, OLD.documentation, OLD.signature);
    INSERT INTO fts_symbols(rowid, name, documentation, signature)
    VALUES (NEW.rowid, NEW.name, NEW.documentation, NEW.signature);
END;

CREATE TABLE IF NOT EXISTS doc_symbol_links (
    stable_id TEXT PRIMARY KEY,
    doc_uri TEXT NOT NULL,
    linked_at TEXT NOT NULL
);

UPDATE schema_version SET version = 5;
"#;

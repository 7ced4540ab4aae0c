//! # ckb-store
//!
//! Embedded storage core for a codebase knowledge index: symbol mappings
//! with tombstone lifecycles, a module/ownership/decision graph, a
//! TTL-scoped cache tier (including a negative-result policy), and an
//! FTS5-backed text search engine, all on top of a single SQLite file per
//! repository root.
//!
//! This crate does not itself detect languages, walk the filesystem, or
//! run an indexer — those are external collaborators. It exposes the
//! typed storage surface they and read-side clients write through.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use ckb_store::{StorageEngine, SymbolStore};
//! use std::sync::Arc;
//!
//! let engine = Arc::new(StorageEngine::open(std::path::Path::new("."))?);
//! let symbols = SymbolStore::new(engine);
//! # Ok::<(), ckb_store::Error>(())
//! ```

#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod cache;
pub mod engine;
pub mod error;
pub mod fts;
pub mod graph;
pub mod project;
pub mod schema;
pub mod symbol;

mod util;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use cache::{
    CacheStats, CacheTier, ErrorStat, NegativePolicyEntry, SharedWarmupSink, TierStats,
    WarmupSink, DEFAULT_QUERY_TTL_SECONDS, DEFAULT_VIEW_TTL_SECONDS,
};
pub use engine::{StorageEngine, BUSY_TIMEOUT_MS, CKB_DIR, DB_FILENAME};
pub use error::{Error, Result};
pub use fts::{FtsDocument, FtsEngine, FtsMatch, FtsStats};
pub use graph::{
    AnnotationSource, Boundaries, Decision, DecisionStatus, DependencyEdge, GraphStore,
    HotspotSnapshot, Module, ModuleRename, OwnershipEvent, OwnershipHistoryEntry, OwnershipRule,
    OwnershipScope, OwnershipSource, Responsibility, ResponsibilitySource, TargetType,
};
pub use project::{ProjectDescriptor, ProjectFile, PROJECT_FILENAME};
pub use schema::CURRENT_VERSION;
pub use symbol::{
    Fingerprint, Location, StateFilter, SymbolAlias, SymbolMapping, SymbolState, SymbolStore,
};

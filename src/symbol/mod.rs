//! Symbol Store
//!
//! Tombstoned symbol mappings and alias chains (spec §4.3). A mapping is
//! created active, updated on each resync, and transitioned to `deleted`
//! exactly once; it is never re-activated. Re-appearance of an identical
//! fingerprint under a new identity is modeled as an alias from a fresh
//! `stable_id`, never by mutating a tombstone.

mod store;
mod types;

pub use store::{StateFilter, SymbolStore};
pub use types::{Fingerprint, Location, SymbolAlias, SymbolMapping, SymbolState};

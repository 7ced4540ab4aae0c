use std::sync::Arc;

use chrono::{Duration, Utc};
use rusqlite::{params, OptionalExtension};
use tokio_util::sync::CancellationToken;

use crate::engine::StorageEngine;
use crate::error::Result;

use super::policy::{policy_for, SharedWarmupSink};

/// Default lifetime for a query-cache entry (spec §4.5).
pub const DEFAULT_QUERY_TTL_SECONDS: i64 = 300;
/// Default lifetime for a view-cache entry (spec §4.5).
pub const DEFAULT_VIEW_TTL_SECONDS: i64 = 3600;

/// `{entries, size_bytes}` for one tier. Negative-cache stats omit
/// `size_bytes` (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TierStats {
    pub entries: i64,
    pub size_bytes: Option<i64>,
}

/// Row counts (and, where applicable, approximate byte sizes) per tier,
/// for `GetCacheStats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub query: TierStats,
    pub view: TierStats,
    pub negative: TierStats,
}

/// A single error kind's hit count in the negative cache.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorStat {
    pub error_type: String,
    pub count: i64,
}

/// The three-tier TTL cache: query results (scoped by `head_commit`), view
/// results (scoped by `state_id`), and negative lookups (scoped by
/// `state_id`, with a per-error-kind policy) (spec §4.5, §4.6).
pub struct CacheTier {
    engine: Arc<StorageEngine>,
    warmup_sink: Option<SharedWarmupSink>,
}

impl CacheTier {
    /// Construct a tier with no warmup sink; negative-cache writes whose
    /// policy requests warmup simply go unacted on.
    pub fn new(engine: Arc<StorageEngine>) -> Self {
        Self { engine, warmup_sink: None }
    }

    /// Construct a tier that invokes `sink` after a negative-cache write
    /// whose policy requests warmup. The call is synchronous from this
    /// store's point of view; an async sink is expected to hand off
    /// internally rather than block the caller (spec §6).
    pub fn with_warmup_sink(engine: Arc<StorageEngine>, sink: SharedWarmupSink) -> Self {
        Self { engine, warmup_sink: Some(sink) }
    }

    // ------------------------------------------------------------------
    // Query cache — scoped by `head_commit` only (OQ-3).
    // ------------------------------------------------------------------

    /// Returns the cached value for `key` if present and recorded against
    /// this exact `head_commit`. An expired entry is deleted as a side
    /// effect and reported as a miss (spec I5).
    pub fn get_query(&self, key: &str, head_commit: &str, cancel: &CancellationToken) -> Result<Option<String>> {
        self.engine.with_transaction(cancel, |tx| {
            let row = tx
                .query_row(
                    "SELECT value, head_commit, expires_at FROM query_cache WHERE key = ?1",
                    params![key],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?)),
                )
                .optional()?;
            let Some((value, stored_commit, expires_at)) = row else {
                return Ok(None);
            };
            if expires_at <= Utc::now().to_rfc3339() {
                tx.execute("DELETE FROM query_cache WHERE key = ?1", params![key])?;
                return Ok(None);
            }
            if stored_commit != head_commit {
                return Ok(None);
            }
            Ok(Some(value))
        })
    }

    /// Writes (or replaces) a query-cache entry.
    pub fn set_query(
        &self,
        key: &str,
        value: &str,
        head_commit: &str,
        state_id: &str,
        ttl_seconds: i64,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let now = Utc::now();
        let expires_at = now + Duration::seconds(ttl_seconds);
        self.engine.with_transaction(cancel, |tx| {
            tx.execute(
                "INSERT INTO query_cache (key, value, head_commit, state_id, expires_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (key) DO UPDATE SET
                    value = excluded.value, head_commit = excluded.head_commit,
                    state_id = excluded.state_id, expires_at = excluded.expires_at,
                    created_at = excluded.created_at",
                params![key, value, head_commit, state_id, expires_at.to_rfc3339(), now.to_rfc3339()],
            )?;
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // View cache — scoped by `state_id`.
    // ------------------------------------------------------------------

    /// Returns the cached value for `key` if present and recorded against
    /// this exact `state_id`. An expired entry is deleted as a side effect
    /// and reported as a miss (spec I5).
    pub fn get_view(&self, key: &str, state_id: &str, cancel: &CancellationToken) -> Result<Option<String>> {
        self.engine.with_transaction(cancel, |tx| {
            let row = tx
                .query_row(
                    "SELECT value, state_id, expires_at FROM view_cache WHERE key = ?1",
                    params![key],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?)),
                )
                .optional()?;
            let Some((value, stored_state, expires_at)) = row else {
                return Ok(None);
            };
            if expires_at <= Utc::now().to_rfc3339() {
                tx.execute("DELETE FROM view_cache WHERE key = ?1", params![key])?;
                return Ok(None);
            }
            if stored_state != state_id {
                return Ok(None);
            }
            Ok(Some(value))
        })
    }

    /// Writes (or replaces) a view-cache entry.
    pub fn set_view(&self, key: &str, value: &str, state_id: &str, ttl_seconds: i64, cancel: &CancellationToken) -> Result<()> {
        let now = Utc::now();
        let expires_at = now + Duration::seconds(ttl_seconds);
        self.engine.with_transaction(cancel, |tx| {
            tx.execute(
                "INSERT INTO view_cache (key, value, state_id, expires_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (key) DO UPDATE SET
                    value = excluded.value, state_id = excluded.state_id,
                    expires_at = excluded.expires_at, created_at = excluded.created_at",
                params![key, value, state_id, expires_at.to_rfc3339(), now.to_rfc3339()],
            )?;
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Negative cache — scoped by `state_id`, TTL/warmup from the fixed
    // error-kind policy table (spec §4.6).
    // ------------------------------------------------------------------

    /// Returns the cached `(error_type, error_message)` for `key` if
    /// present and recorded against this exact `state_id`. An expired
    /// entry is deleted as a side effect and reported as a miss (B2).
    pub fn get_negative(&self, key: &str, state_id: &str, cancel: &CancellationToken) -> Result<Option<(String, String)>> {
        self.engine.with_transaction(cancel, |tx| {
            let row = tx
                .query_row(
                    "SELECT error_type, error_message, state_id, expires_at FROM negative_cache WHERE key = ?1",
                    params![key],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                        ))
                    },
                )
                .optional()?;
            let Some((error_type, error_message, stored_state, expires_at)) = row else {
                return Ok(None);
            };
            if expires_at <= Utc::now().to_rfc3339() {
                tx.execute("DELETE FROM negative_cache WHERE key = ?1", params![key])?;
                return Ok(None);
            }
            if stored_state != state_id {
                return Ok(None);
            }
            Ok(Some((error_type, error_message)))
        })
    }

    /// Records that looking up `key` failed with `error_type`, applying the
    /// fixed TTL for that kind and, if its policy requests warmup and a
    /// sink is configured, firing it off after the write commits
    /// (fire-and-forget, spec §6).
    pub fn cache_error(
        &self,
        key: &str,
        error_type: &str,
        error_message: &str,
        state_id: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let policy = policy_for(error_type);
        let now = Utc::now();
        let expires_at = now + Duration::seconds(policy.ttl_seconds);

        self.engine.with_transaction(cancel, |tx| {
            tx.execute(
                "INSERT INTO negative_cache (key, error_type, error_message, state_id, expires_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (key) DO UPDATE SET
                    error_type = excluded.error_type, error_message = excluded.error_message,
                    state_id = excluded.state_id, expires_at = excluded.expires_at,
                    created_at = excluded.created_at",
                params![key, error_type, error_message, state_id, expires_at.to_rfc3339(), now.to_rfc3339()],
            )?;
            Ok(())
        })?;

        if policy.warmup {
            if let Some(sink) = &self.warmup_sink {
                sink.warm(error_type, key, state_id);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Invalidation & maintenance
    // ------------------------------------------------------------------

    /// Deletes entries whose key matches `pattern` (raw SQL `LIKE`
    /// wildcards `%`/`_`, not a glob — OQ-4) across all three tiers in one
    /// transaction. Returns the total rows removed.
    pub fn invalidate_by_pattern(&self, pattern: &str, cancel: &CancellationToken) -> Result<u64> {
        self.engine.with_transaction(cancel, |tx| {
            let mut total = 0u64;
            total += tx.execute("DELETE FROM query_cache WHERE key LIKE ?1", params![pattern])? as u64;
            total += tx.execute("DELETE FROM view_cache WHERE key LIKE ?1", params![pattern])? as u64;
            total += tx.execute("DELETE FROM negative_cache WHERE key LIKE ?1", params![pattern])? as u64;
            Ok(total)
        })
    }

    /// Clears the entire query cache.
    pub fn invalidate_all_query_cache(&self, cancel: &CancellationToken) -> Result<u64> {
        self.engine.with_transaction(cancel, |tx| Ok(tx.execute("DELETE FROM query_cache", [])? as u64))
    }

    /// Clears the entire view cache.
    pub fn invalidate_all_view_cache(&self, cancel: &CancellationToken) -> Result<u64> {
        self.engine.with_transaction(cancel, |tx| Ok(tx.execute("DELETE FROM view_cache", [])? as u64))
    }

    /// Clears the entire negative cache.
    pub fn invalidate_all_negative_cache(&self, cancel: &CancellationToken) -> Result<u64> {
        self.engine.with_transaction(cancel, |tx| Ok(tx.execute("DELETE FROM negative_cache", [])? as u64))
    }

    /// Deletes every entry recorded against `state_id`, across all three
    /// tiers, in one transaction (spec §8 S4).
    pub fn invalidate_by_state_id(&self, state_id: &str, cancel: &CancellationToken) -> Result<u64> {
        self.engine.with_transaction(cancel, |tx| {
            let mut total = 0u64;
            total += tx.execute("DELETE FROM query_cache WHERE state_id = ?1", params![state_id])? as u64;
            total += tx.execute("DELETE FROM view_cache WHERE state_id = ?1", params![state_id])? as u64;
            total += tx.execute("DELETE FROM negative_cache WHERE state_id = ?1", params![state_id])? as u64;
            Ok(total)
        })
    }

    /// Deletes expired entries across all three tiers. Meant to be run on
    /// a periodic external schedule; safe alongside concurrent reads and
    /// writes (spec §5).
    pub fn cleanup_expired_entries(&self, cancel: &CancellationToken) -> Result<u64> {
        let now = Utc::now().to_rfc3339();
        self.engine.with_transaction(cancel, |tx| {
            let mut total = 0u64;
            total += tx.execute("DELETE FROM query_cache WHERE expires_at <= ?1", params![now])? as u64;
            total += tx.execute("DELETE FROM view_cache WHERE expires_at <= ?1", params![now])? as u64;
            total += tx.execute("DELETE FROM negative_cache WHERE expires_at <= ?1", params![now])? as u64;
            Ok(total)
        })
    }

    /// Per-tier `{entries, size_bytes}`, unfiltered by expiry. Negative
    /// omits `size_bytes` (spec §4.5).
    pub fn get_cache_stats(&self) -> Result<CacheStats> {
        self.engine.with_connection(|conn| {
            let (query_entries, query_bytes): (i64, Option<i64>) = conn.query_row(
                "SELECT COUNT(*), SUM(LENGTH(value)) FROM query_cache",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            let (view_entries, view_bytes): (i64, Option<i64>) = conn.query_row(
                "SELECT COUNT(*), SUM(LENGTH(value)) FROM view_cache",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            let negative_entries: i64 = conn.query_row("SELECT COUNT(*) FROM negative_cache", [], |row| row.get(0))?;

            Ok(CacheStats {
                query: TierStats { entries: query_entries, size_bytes: Some(query_bytes.unwrap_or(0)) },
                view: TierStats { entries: view_entries, size_bytes: Some(view_bytes.unwrap_or(0)) },
                negative: TierStats { entries: negative_entries, size_bytes: None },
            })
        })
    }

    /// Negative-cache hit counts grouped by error kind, most frequent first.
    pub fn get_error_stats(&self) -> Result<Vec<ErrorStat>> {
        self.engine.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT error_type, COUNT(*) FROM negative_cache GROUP BY error_type ORDER BY COUNT(*) DESC",
            )?;
            let rows = stmt.query_map([], |row| Ok(ErrorStat { error_type: row.get(0)?, count: row.get(1)? }))?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn new_tier() -> CacheTier {
        let engine = Arc::new(StorageEngine::open_in_memory().expect("open"));
        CacheTier::new(engine)
    }

    #[test]
    fn query_cache_is_scoped_by_head_commit_only() {
        let tier = new_tier();
        let cancel = CancellationToken::new();
        tier.set_query("k1", "v1", "commit-a", "state-1", DEFAULT_QUERY_TTL_SECONDS, &cancel).unwrap();

        assert_eq!(tier.get_query("k1", "commit-a", &cancel).unwrap().as_deref(), Some("v1"));
        assert_eq!(tier.get_query("k1", "commit-b", &cancel).unwrap(), None);
    }

    #[test]
    fn view_cache_is_scoped_by_state_id() {
        let tier = new_tier();
        let cancel = CancellationToken::new();
        tier.set_view("k1", "v1", "state-1", DEFAULT_VIEW_TTL_SECONDS, &cancel).unwrap();

        assert_eq!(tier.get_view("k1", "state-1", &cancel).unwrap().as_deref(), Some("v1"));
        assert_eq!(tier.get_view("k1", "state-2", &cancel).unwrap(), None);
    }

    #[test]
    fn expired_query_entry_is_deleted_on_read_and_reported_as_miss() {
        let tier = new_tier();
        let cancel = CancellationToken::new();
        tier.set_query("k1", "v1", "commit-a", "state-1", -1, &cancel).unwrap();
        assert_eq!(tier.get_query("k1", "commit-a", &cancel).unwrap(), None);
        assert_eq!(tier.get_cache_stats().unwrap().query.entries, 0);
    }

    #[test]
    fn expired_negative_entry_is_deleted_on_read_and_reported_as_miss() {
        let tier = new_tier();
        let cancel = CancellationToken::new();
        tier.cache_error("k1", "timeout", "slow", "state-1", &cancel).unwrap();
        tier.engine
            .with_connection(|conn| {
                conn.execute("UPDATE negative_cache SET expires_at = '1970-01-01T00:00:00Z' WHERE key = 'k1'", [])?;
                Ok(())
            })
            .unwrap();

        assert_eq!(tier.get_negative("k1", "state-1", &cancel).unwrap(), None);
        assert_eq!(tier.get_cache_stats().unwrap().negative.entries, 0);
    }

    #[test]
    fn invalidate_by_state_id_clears_all_three_tiers() {
        let tier = new_tier();
        let cancel = CancellationToken::new();
        tier.set_query("q", "v", "commit-a", "state-1", 300, &cancel).unwrap();
        tier.set_view("v", "v", "state-1", 300, &cancel).unwrap();
        tier.cache_error("e", "symbol-not-found", "missing", "state-1", &cancel).unwrap();

        let removed = tier.invalidate_by_state_id("state-1", &cancel).unwrap();
        assert_eq!(removed, 3);
        assert_eq!(tier.get_query("q", "commit-a", &cancel).unwrap(), None);
        assert_eq!(tier.get_view("v", "state-1", &cancel).unwrap(), None);
        assert_eq!(tier.get_negative("e", "state-1", &cancel).unwrap(), None);
    }

    #[test]
    fn negative_cache_warmup_sink_fires_only_for_workspace_not_ready() {
        struct CountingSink(AtomicUsize);
        impl super::super::policy::WarmupSink for CountingSink {
            fn warm(&self, _error_type: &str, _key: &str, _state_id: &str) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let engine = Arc::new(StorageEngine::open_in_memory().expect("open"));
        let sink = Arc::new(CountingSink(AtomicUsize::new(0)));
        let tier = CacheTier::with_warmup_sink(engine, sink.clone());
        let cancel = CancellationToken::new();

        tier.cache_error("k1", "workspace-not-ready", "not ready", "state-1", &cancel).unwrap();
        assert_eq!(sink.0.load(Ordering::SeqCst), 1);

        tier.cache_error("k2", "symbol-not-found", "missing", "state-1", &cancel).unwrap();
        assert_eq!(sink.0.load(Ordering::SeqCst), 1, "symbol-not-found doesn't request warmup");
    }

    #[test]
    fn cleanup_expired_entries_removes_only_expired_rows() {
        let tier = new_tier();
        let cancel = CancellationToken::new();
        tier.set_query("stale", "v", "commit-a", "state-1", -1, &cancel).unwrap();
        tier.set_query("fresh", "v", "commit-a", "state-1", 300, &cancel).unwrap();

        let removed = tier.cleanup_expired_entries(&cancel).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(tier.get_cache_stats().unwrap().query.entries, 1);
    }
}

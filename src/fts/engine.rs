use std::collections::HashSet;
use std::sync::Arc;

use rusqlite::{params, OptionalExtension, Row};
use tokio_util::sync::CancellationToken;

use crate::engine::StorageEngine;
use crate::error::{Error, Result};
use crate::util::{escape_like, parse_timestamp};

use super::types::{FtsDocument, FtsMatch, FtsStats};

const RECREATE_TRIGGERS_SQL: &str = r#"
CREATE TRIGGER fts_content_ai AFTER INSERT ON fts_content BEGIN
    INSERT INTO fts_symbols(rowid, name, documentation, signature)
    VALUES (NEW.rowid, NEW.name, NEW.documentation, NEW.signature);
END;

CREATE TRIGGER fts_content_ad AFTER DELETE ON fts_content BEGIN
    INSERT INTO fts_symbols(fts_symbols, rowid, name, documentation, signature)
    VALUES ('delete', OLD.rowid, OLD.name, OLD.documentation, OLD.signature);
END;

CREATE TRIGGER fts_content_au AFTER UPDATE ON fts_content BEGIN
    INSERT INTO fts_symbols(fts_symbols, rowid, name, documentation, signature)
    VALUES ('delete', OLD.rowid, OLD.name, OLD.documentation, OLD.signature);
    INSERT INTO fts_symbols(rowid, name, documentation, signature)
    VALUES (NEW.rowid, NEW.name, NEW.documentation, NEW.signature);
END;
"#;

const DROP_TRIGGERS_SQL: &str = r#"
DROP TRIGGER IF EXISTS fts_content_ai;
DROP TRIGGER IF EXISTS fts_content_ad;
DROP TRIGGER IF EXISTS fts_content_au;
"#;

const DOCUMENT_SELECT: &str = "SELECT id, name, kind, documentation, signature, file_path, language, indexed_at
    FROM fts_content WHERE id = ?1";

/// The content table + FTS5 virtual table pair, their sync triggers, and
/// the ranked search cascade (spec §4.7).
pub struct FtsEngine {
    engine: Arc<StorageEngine>,
}

impl FtsEngine {
    pub fn new(engine: Arc<StorageEngine>) -> Self {
        Self { engine }
    }

    /// Inserts or replaces the indexed document for `id`. The `fts_symbols`
    /// virtual table stays in sync via the `fts_content_ai`/`_au` triggers.
    pub fn index_document(&self, doc: &FtsDocument, cancel: &CancellationToken) -> Result<()> {
        self.engine.with_transaction(cancel, |tx| {
            tx.execute(
                "INSERT INTO fts_content (id, name, kind, documentation, signature, file_path, language, indexed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT (id) DO UPDATE SET
                    name = excluded.name, kind = excluded.kind,
                    documentation = excluded.documentation, signature = excluded.signature,
                    file_path = excluded.file_path, language = excluded.language,
                    indexed_at = excluded.indexed_at",
                params![
                    doc.id,
                    doc.name,
                    doc.kind,
                    doc.documentation,
                    doc.signature,
                    doc.file_path,
                    doc.language,
                    doc.indexed_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// Removes a document from the index. Returns whether a row existed.
    pub fn remove_document(&self, id: &str, cancel: &CancellationToken) -> Result<bool> {
        self.engine.with_transaction(cancel, |tx| {
            let affected = tx.execute("DELETE FROM fts_content WHERE id = ?1", params![id])?;
            Ok(affected > 0)
        })
    }

    /// Fetches a single indexed document by id.
    pub fn get_document(&self, id: &str) -> Result<Option<FtsDocument>> {
        self.engine.with_connection(|conn| {
            conn.query_row(DOCUMENT_SELECT, params![id], row_to_document)
                .optional()
                .map_err(Error::from)?
                .transpose()
        })
    }

    /// Ranked search across `name`, `documentation`, and `signature`:
    /// exact-phrase matches first (rank 1.0), then a phrase-prefix match
    /// (rank 0.8), then a plain substring `LIKE` fallback (rank 0.5) for
    /// anything FTS5 tokenization wouldn't surface. Each stage only runs
    /// while `limit` hasn't been reached, and a document already matched by
    /// an earlier stage is never returned twice.
    pub fn search(&self, query: &str, limit: i64) -> Result<Vec<FtsMatch>> {
        let query = query.trim();
        if query.is_empty() || limit <= 0 {
            return Ok(Vec::new());
        }

        let phrase = quote_phrase(query);
        let mut seen = HashSet::new();
        let mut results = Vec::new();

        self.engine.with_connection(|conn| {
            collect_fts_matches(conn, &phrase, 1.0, "exact", limit, &mut seen, &mut results)?;
            if (results.len() as i64) < limit {
                collect_fts_matches(conn, &format!("{phrase}*"), 0.8, "prefix", limit, &mut seen, &mut results)?;
            }
            if (results.len() as i64) < limit {
                collect_like_matches(conn, query, 0.5, limit, &mut seen, &mut results)?;
            }
            Ok(())
        })?;

        results.truncate(limit as usize);
        Ok(results)
    }

    /// Rebuilds the index from scratch: drop the sync triggers, clear the
    /// content table, bulk-insert `documents`, issue FTS5's `'rebuild'`
    /// command, and recreate the triggers — all inside one transaction, so
    /// a reader never observes a content table out of sync with the index
    /// (spec §4.7).
    pub fn rebuild<'a>(
        &self,
        documents: impl IntoIterator<Item = &'a FtsDocument>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.engine.with_transaction(cancel, |tx| {
            tx.execute_batch(DROP_TRIGGERS_SQL)?;
            tx.execute("DELETE FROM fts_content", [])?;

            {
                let mut stmt = tx.prepare(
                    "INSERT INTO fts_content (id, name, kind, documentation, signature, file_path, language, indexed_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                )?;
                for (i, doc) in documents.into_iter().enumerate() {
                    if i % 256 == 0 && cancel.is_cancelled() {
                        return Err(Error::Cancelled);
                    }
                    stmt.execute(params![
                        doc.id,
                        doc.name,
                        doc.kind,
                        doc.documentation,
                        doc.signature,
                        doc.file_path,
                        doc.language,
                        doc.indexed_at.to_rfc3339(),
                    ])?;
                }
            }

            tx.execute("INSERT INTO fts_symbols(fts_symbols) VALUES('rebuild')", [])?;
            tx.execute_batch(RECREATE_TRIGGERS_SQL)?;
            Ok(())
        })
    }

    /// Empties the index. Equivalent to `rebuild` with no documents.
    pub fn clear(&self, cancel: &CancellationToken) -> Result<()> {
        self.rebuild(std::iter::empty::<&FtsDocument>(), cancel)
    }

    /// Merges FTS5 segments for faster subsequent queries. Safe to run
    /// concurrently with reads; not with `rebuild`.
    pub fn vacuum(&self, cancel: &CancellationToken) -> Result<()> {
        self.engine.with_transaction(cancel, |tx| {
            tx.execute("INSERT INTO fts_symbols(fts_symbols) VALUES('optimize')", [])?;
            Ok(())
        })
    }

    /// Runs FTS5's built-in integrity check, returning `false` if the
    /// index is internally inconsistent with its content table rather than
    /// surfacing SQLite's raw error text.
    pub fn integrity_check(&self) -> Result<bool> {
        self.engine.with_connection(|conn| {
            match conn.execute("INSERT INTO fts_symbols(fts_symbols) VALUES('integrity-check')", []) {
                Ok(_) => Ok(true),
                Err(rusqlite::Error::SqliteFailure(_, Some(msg))) if msg.to_lowercase().contains("malformed") => {
                    Ok(false)
                }
                Err(e) => Err(Error::from(e)),
            }
        })
    }

    /// Indexed row count plus an approximate on-disk footprint of the
    /// content table's text columns.
    pub fn get_stats(&self) -> Result<FtsStats> {
        self.engine.with_connection(|conn| {
            let indexed_symbols = conn.query_row("SELECT COUNT(*) FROM fts_content", [], |row| row.get(0))?;
            let estimated_size_bytes = conn.query_row(
                "SELECT COALESCE(SUM(LENGTH(name) + LENGTH(documentation) + LENGTH(signature)
                    + LENGTH(file_path) + LENGTH(language)), 0) FROM fts_content",
                [],
                |row| row.get(0),
            )?;
            Ok(FtsStats { indexed_symbols, estimated_size_bytes })
        })
    }
}

/// Wraps `query` as a single FTS5 phrase literal, doubling embedded quotes,
/// so operators (`AND`, `NEAR`, `^`, `:`, etc.) in caller-supplied text are
/// treated as literal characters to match rather than FTS5 query syntax.
fn quote_phrase(query: &str) -> String {
    format!("\"{}\"", query.replace('"', "\"\""))
}

fn collect_fts_matches(
    conn: &rusqlite::Connection,
    match_expr: &str,
    rank: f64,
    match_type: &'static str,
    limit: i64,
    seen: &mut HashSet<String>,
    results: &mut Vec<FtsMatch>,
) -> Result<()> {
    let mut stmt = conn.prepare(
        "SELECT fts_content.id, fts_content.name FROM fts_symbols
         JOIN fts_content ON fts_symbols.rowid = fts_content.rowid
         WHERE fts_symbols MATCH ?1 ORDER BY bm25(fts_symbols) LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![match_expr, limit], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (id, name) = row?;
        if (results.len() as i64) >= limit {
            break;
        }
        if seen.insert(id.clone()) {
            results.push(FtsMatch { id, name, rank, match_type });
        }
    }
    Ok(())
}

fn collect_like_matches(
    conn: &rusqlite::Connection,
    query: &str,
    rank: f64,
    limit: i64,
    seen: &mut HashSet<String>,
    results: &mut Vec<FtsMatch>,
) -> Result<()> {
    let pattern = format!("%{}%", escape_like(query));
    let mut stmt = conn.prepare(
        "SELECT id, name FROM fts_content
         WHERE name LIKE ?1 ESCAPE '\\' OR documentation LIKE ?1 ESCAPE '\\' OR signature LIKE ?1 ESCAPE '\\'
         ORDER BY id LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![pattern, limit], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (id, name) = row?;
        if (results.len() as i64) >= limit {
            break;
        }
        if seen.insert(id.clone()) {
            results.push(FtsMatch { id, name, rank, match_type: "substring" });
        }
    }
    Ok(())
}

fn row_to_document(row: &Row) -> rusqlite::Result<Result<FtsDocument>> {
    Ok((|| {
        let id: String = row.get(0)?;
        let name: String = row.get(1)?;
        let kind: String = row.get(2)?;
        let documentation: String = row.get(3)?;
        let signature: String = row.get(4)?;
        let file_path: String = row.get(5)?;
        let language: String = row.get(6)?;
        let indexed_at_raw: String = row.get(7)?;
        let indexed_at = parse_timestamp("indexed_at", &indexed_at_raw)?;
        Ok(FtsDocument { id, name, kind, documentation, signature, file_path, language, indexed_at })
    })())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn new_engine() -> FtsEngine {
        let engine = Arc::new(StorageEngine::open_in_memory().expect("open"));
        FtsEngine::new(engine)
    }

    fn doc(id: &str, name: &str, documentation: &str) -> FtsDocument {
        FtsDocument {
            id: id.to_string(),
            name: name.to_string(),
            kind: "function".to_string(),
            documentation: documentation.to_string(),
            signature: String::new(),
            file_path: "src/lib.rs".to_string(),
            language: "rust".to_string(),
            indexed_at: Utc::now(),
        }
    }

    #[test]
    fn index_then_exact_search_finds_document() {
        let fts = new_engine();
        let cancel = CancellationToken::new();
        fts.index_document(&doc("s1", "parse_timestamp", "parses an RFC3339 timestamp"), &cancel).unwrap();

        let results = fts.search("parse_timestamp", 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "s1");
        assert_eq!(results[0].rank, 1.0);
        assert_eq!(results[0].match_type, "exact");
    }

    #[test]
    fn prefix_search_matches_partial_token() {
        let fts = new_engine();
        let cancel = CancellationToken::new();
        fts.index_document(&doc("s1", "configure_connection", "sets pragmas"), &cancel).unwrap();

        let results = fts.search("configure_conn", 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].rank, 0.8);
        assert_eq!(results[0].match_type, "prefix");
    }

    #[test]
    fn substring_fallback_matches_mid_word() {
        let fts = new_engine();
        let cancel = CancellationToken::new();
        fts.index_document(&doc("s1", "StorageEngine", "owns the sqlite connection"), &cancel).unwrap();

        let results = fts.search("torageEng", 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].rank, 0.5);
        assert_eq!(results[0].match_type, "substring");
    }

    #[test]
    fn rebuild_replaces_all_content_and_keeps_index_in_sync() {
        let fts = new_engine();
        let cancel = CancellationToken::new();
        fts.index_document(&doc("stale", "old_name", "old doc"), &cancel).unwrap();

        let fresh = vec![doc("fresh1", "new_name", "new doc")];
        fts.rebuild(fresh.iter(), &cancel).unwrap();

        assert!(fts.get_document("stale").unwrap().is_none());
        assert_eq!(fts.get_document("fresh1").unwrap().unwrap().name, "new_name");
        assert_eq!(fts.search("new_name", 10).unwrap().len(), 1);
        assert_eq!(fts.get_stats().unwrap().indexed_symbols, 1);
    }

    #[test]
    fn remove_document_drops_it_from_search() {
        let fts = new_engine();
        let cancel = CancellationToken::new();
        fts.index_document(&doc("s1", "gone_soon", "doomed"), &cancel).unwrap();
        assert!(fts.remove_document("s1", &cancel).unwrap());
        assert!(fts.search("gone_soon", 10).unwrap().is_empty());
        assert!(!fts.remove_document("s1", &cancel).unwrap());
    }

    #[test]
    fn integrity_check_passes_on_a_freshly_built_index() {
        let fts = new_engine();
        let cancel = CancellationToken::new();
        fts.index_document(&doc("s1", "ok", "fine"), &cancel).unwrap();
        assert!(fts.integrity_check().unwrap());
    }

    #[test]
    fn special_characters_in_query_do_not_panic_or_error() {
        let fts = new_engine();
        let cancel = CancellationToken::new();
        fts.index_document(&doc("s1", "weird", "has a colon: and a caret ^ in it"), &cancel).unwrap();
        let results = fts.search("colon: AND \"unterminated", 10).unwrap();
        assert!(results.is_empty());
    }
}

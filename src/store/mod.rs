//! Read-only client for the upstream relational store.
//!
//! The core depends on three queries: stream the latest view, read the
//! change log's high-water mark, and fetch the next batch of change rows
//! joined to their entry payloads. The schema ships here so local
//! deployments and tests are self-contained; `publish` is the append helper
//! the directory's writer service uses; the core never calls it.

use std::sync::{Arc, Mutex};

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::entry::Entry;
use crate::error::{CoreError, Result};

/// One row of the change log, left-joined to its entry. `entry` is `None`
/// when the `(id, rev)` the change references is gone from the entries
/// table; such rows advance the tail position and apply nothing.
#[derive(Debug, Clone)]
pub struct ChangeRow {
    pub seq: i64,
    pub id: String,
    pub rev: u64,
    pub change_type: String,
    pub changed_at: String,
    pub entry: Option<Entry>,
}

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (creating if needed) the store at `path` and ensure the schema
    /// exists.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| CoreError::Internal("store connection lock poisoned".to_string()))?;
        f(&conn)
    }

    fn init_schema(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute_batch(
                r"
                CREATE TABLE IF NOT EXISTS entries (
                    id          TEXT NOT NULL,
                    rev         INTEGER NOT NULL,
                    type        TEXT NOT NULL,
                    namespace   TEXT NOT NULL,
                    name        TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    version     TEXT,
                    attrs       TEXT NOT NULL DEFAULT '{}',
                    manifest    TEXT NOT NULL DEFAULT 'null',
                    meta        TEXT NOT NULL DEFAULT 'null',
                    created_at  TEXT NOT NULL,
                    updated_at  TEXT NOT NULL,
                    PRIMARY KEY (id, rev)
                );

                CREATE TABLE IF NOT EXISTS entries_latest (
                    id  TEXT PRIMARY KEY,
                    rev INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS changes (
                    seq         INTEGER PRIMARY KEY AUTOINCREMENT,
                    id          TEXT NOT NULL,
                    rev         INTEGER NOT NULL,
                    change_type TEXT NOT NULL DEFAULT 'upsert',
                    changed_at  TEXT NOT NULL
                );
                ",
            )?;
            Ok(())
        })
    }

    /// Stream every row of the latest view.
    pub fn list_latest(&self) -> Result<Vec<Entry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                r"
                SELECT e.id, e.rev, e.type, e.namespace, e.name, e.description,
                       e.version, e.attrs, e.manifest, e.meta, e.created_at, e.updated_at
                FROM entries_latest l
                JOIN entries e ON e.id = l.id AND e.rev = l.rev
                ORDER BY e.id
                ",
            )?;
            let rows = stmt.query_map([], |row| entry_from_row(row, 0))?;

            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }

    /// High-water mark of the change log; 0 when empty.
    pub fn max_seq(&self) -> Result<i64> {
        self.with_conn(|conn| {
            let seq = conn.query_row("SELECT COALESCE(MAX(seq), 0) FROM changes", [], |row| {
                row.get::<_, i64>(0)
            })?;
            Ok(seq)
        })
    }

    /// The next batch of change rows past `last_seq`, joined to the entries
    /// table by `(id, rev)`, in seq order.
    pub fn next_changes(&self, last_seq: i64, batch_size: usize) -> Result<Vec<ChangeRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                r"
                SELECT c.seq, c.id, c.rev, c.change_type, c.changed_at,
                       e.id, e.rev, e.type, e.namespace, e.name, e.description,
                       e.version, e.attrs, e.manifest, e.meta, e.created_at, e.updated_at
                FROM changes c
                LEFT JOIN entries e ON e.id = c.id AND e.rev = c.rev
                WHERE c.seq > ?1
                ORDER BY c.seq ASC
                LIMIT ?2
                ",
            )?;
            let rows = stmt.query_map(params![last_seq, batch_size as i64], |row| {
                let joined_id: Option<String> = row.get(5)?;
                let entry = match joined_id {
                    Some(_) => Some(entry_from_row(row, 5)?),
                    None => None,
                };
                Ok(ChangeRow {
                    seq: row.get(0)?,
                    id: row.get(1)?,
                    rev: row.get::<_, i64>(2)? as u64,
                    change_type: row.get(3)?,
                    changed_at: row.get(4)?,
                    entry,
                })
            })?;

            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }

    /// Append a revision: history row, latest pointer, change record.
    /// Returns the assigned change sequence.
    pub fn publish(&self, entry: &Entry) -> Result<i64> {
        let attrs = serde_json::to_string(&entry.attrs)?;
        let manifest = serde_json::to_string(&entry.manifest)?;
        let meta = serde_json::to_string(&entry.meta)?;
        self.with_conn(|conn| {
            conn.execute(
                r"
                INSERT INTO entries (id, rev, type, namespace, name, description,
                                     version, attrs, manifest, meta, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                ",
                params![
                    entry.id,
                    entry.rev as i64,
                    entry.kind,
                    entry.namespace,
                    entry.name,
                    entry.description,
                    entry.version,
                    attrs,
                    manifest,
                    meta,
                    entry.created_at,
                    entry.updated_at,
                ],
            )?;
            conn.execute(
                r"
                INSERT INTO entries_latest (id, rev) VALUES (?1, ?2)
                ON CONFLICT(id) DO UPDATE SET rev = excluded.rev
                WHERE excluded.rev > entries_latest.rev
                ",
                params![entry.id, entry.rev as i64],
            )?;
            conn.execute(
                "INSERT INTO changes (id, rev, change_type, changed_at) VALUES (?1, ?2, 'upsert', ?3)",
                params![entry.id, entry.rev as i64, entry.updated_at],
            )?;
            let seq = conn
                .query_row("SELECT MAX(seq) FROM changes", [], |row| row.get::<_, i64>(0))
                .optional()?
                .unwrap_or(0);
            Ok(seq)
        })
    }
}

/// Map the entry columns starting at `base` into an [`Entry`]. JSON columns
/// that fail to parse surface as conversion errors on their column index.
fn entry_from_row(row: &Row<'_>, base: usize) -> rusqlite::Result<Entry> {
    let attrs_raw: String = row.get(base + 7)?;
    let manifest_raw: String = row.get(base + 8)?;
    let meta_raw: String = row.get(base + 9)?;

    let attrs = serde_json::from_str(&attrs_raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(base + 7, Type::Text, Box::new(e))
    })?;
    let manifest = serde_json::from_str(&manifest_raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(base + 8, Type::Text, Box::new(e))
    })?;
    let meta = serde_json::from_str(&meta_raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(base + 9, Type::Text, Box::new(e))
    })?;

    Ok(Entry {
        id: row.get(base)?,
        rev: row.get::<_, i64>(base + 1)? as u64,
        kind: row.get(base + 2)?,
        namespace: row.get(base + 3)?,
        name: row.get(base + 4)?,
        description: row.get(base + 5)?,
        version: row.get(base + 6)?,
        attrs,
        manifest,
        meta,
        created_at: row.get(base + 10)?,
        updated_at: row.get(base + 11)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn open_temp() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.db");
        let store = SqliteStore::open(path.to_str().unwrap()).unwrap();
        (dir, store)
    }

    fn entry(id: &str, rev: u64) -> Entry {
        Entry {
            id: id.into(),
            rev,
            kind: "skill".into(),
            namespace: "acme".into(),
            name: format!("name-{id}"),
            description: "desc".into(),
            version: Some("1.0.0".into()),
            attrs: BTreeMap::from([("tag".to_string(), vec!["nlp".to_string()])]),
            manifest: serde_json::json!({"entrypoint": "run"}),
            meta: serde_json::Value::Null,
            created_at: "2026-01-01T00:00:00Z".into(),
            updated_at: format!("2026-01-01T00:00:0{rev}Z"),
        }
    }

    #[test]
    fn test_empty_store_defaults() {
        let (_dir, store) = open_temp();
        assert_eq!(store.max_seq().unwrap(), 0);
        assert!(store.list_latest().unwrap().is_empty());
        assert!(store.next_changes(0, 100).unwrap().is_empty());
    }

    #[test]
    fn test_publish_round_trips_entry() {
        let (_dir, store) = open_temp();
        let original = entry("skill:acme:sum", 1);
        store.publish(&original).unwrap();

        let latest = store.list_latest().unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0], original);
    }

    #[test]
    fn test_latest_view_tracks_highest_rev() {
        let (_dir, store) = open_temp();
        store.publish(&entry("s", 1)).unwrap();
        store.publish(&entry("s", 3)).unwrap();
        // A late-arriving older rev must not move the pointer back.
        store.publish(&entry("s", 2)).unwrap();

        let latest = store.list_latest().unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].rev, 3);
    }

    #[test]
    fn test_next_changes_pages_in_seq_order() {
        let (_dir, store) = open_temp();
        for i in 1..=5 {
            store.publish(&entry(&format!("e{i}"), 1)).unwrap();
        }
        assert_eq!(store.max_seq().unwrap(), 5);

        let first = store.next_changes(0, 3).unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(first[0].seq, 1);
        assert!(first.iter().all(|row| row.entry.is_some()));

        let rest = store.next_changes(first.last().unwrap().seq, 3).unwrap();
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[0].seq, 4);
    }

    #[test]
    fn test_change_with_missing_entry_joins_null() {
        let (_dir, store) = open_temp();
        store
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO changes (id, rev, change_type, changed_at) VALUES ('ghost', 9, 'upsert', 't')",
                    [],
                )?;
                Ok(())
            })
            .unwrap();

        let rows = store.next_changes(0, 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "ghost");
        assert!(rows[0].entry.is_none());
    }
}

//! Change tailing: snapshot load, then forward-only polling of the change
//! log.
//!
//! The tailer is the index's single writer. Startup loads the whole latest
//! view with one deferred sort; afterwards a dedicated thread polls for
//! change rows past `last_seq` and applies them in seq order. Because the
//! log's seq is monotonic and the tail position only moves forward, every
//! change is observed at most once and in issue order per id; stale revs
//! are dropped by the index's rev check.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::index::SharedIndex;
use crate::store::SqliteStore;

pub const DEFAULT_POLL_MS: u64 = 500;
pub const DEFAULT_POLL_BATCH: usize = 500;

/// Load every row of the latest view into the index, sort once, and set the
/// tail position to the log's current high-water mark.
pub fn load_snapshot(store: &SqliteStore, index: &SharedIndex) -> Result<()> {
    let started = Instant::now();
    let entries = store.list_latest()?;
    let loaded = entries.len();

    {
        let mut snapshot = index.write();
        for entry in entries {
            snapshot.apply_change(entry, false);
        }
        snapshot.finish_snapshot();
    }

    index.set_build_ms(started.elapsed().as_millis() as u64);
    index.set_last_seq(store.max_seq()?);

    info!(
        docs = loaded,
        build_ms = index.build_ms(),
        last_seq = index.last_seq(),
        "snapshot loaded"
    );
    Ok(())
}

pub struct ChangeTailer {
    store: SqliteStore,
    index: Arc<SharedIndex>,
    batch_size: usize,
    in_flight: AtomicBool,
    shutdown: AtomicBool,
}

impl ChangeTailer {
    pub fn new(store: SqliteStore, index: Arc<SharedIndex>, batch_size: usize) -> Self {
        ChangeTailer {
            store,
            index,
            batch_size: batch_size.max(1),
            in_flight: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        }
    }

    /// One poll cycle: drain change batches until a short batch. Returns the
    /// number of entries applied; a tick arriving while a cycle is already
    /// in flight is dropped. On error the cycle aborts without advancing
    /// `last_seq` past the failing batch; the next tick retries.
    pub fn poll_once(&self) -> Result<usize> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            return Ok(0);
        }
        let result = self.drain();
        self.in_flight.store(false, Ordering::Release);
        result
    }

    fn drain(&self) -> Result<usize> {
        let mut applied = 0;
        loop {
            let rows = self.store.next_changes(self.index.last_seq(), self.batch_size)?;
            let fetched = rows.len();
            for row in rows {
                if let Some(entry) = row.entry {
                    if self.index.apply_change(entry) {
                        applied += 1;
                    }
                }
                // The position advances for every observed row, payload or
                // not; only the apply above is conditional.
                self.index.set_last_seq(row.seq);
            }
            if fetched < self.batch_size {
                break;
            }
        }
        Ok(applied)
    }

    /// Run the poll loop on a dedicated thread until [`ChangeTailer::stop`].
    pub fn spawn(self: Arc<Self>, poll_ms: u64) -> JoinHandle<()> {
        let interval = Duration::from_millis(poll_ms.max(1));
        thread::spawn(move || {
            info!(poll_ms = interval.as_millis() as u64, "change tailer started");
            loop {
                thread::sleep(interval);
                if self.shutdown.load(Ordering::Relaxed) {
                    break;
                }
                match self.poll_once() {
                    Ok(0) => {}
                    Ok(applied) => {
                        debug!(applied, last_seq = self.index.last_seq(), "applied changes");
                    }
                    Err(err) => {
                        warn!(error = %err, "tail cycle failed; will retry next tick");
                    }
                }
            }
        })
    }

    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Entry, Requester};
    use std::collections::BTreeMap;

    fn entry(id: &str, rev: u64, status: &str) -> Entry {
        Entry {
            id: id.into(),
            rev,
            kind: "skill".into(),
            namespace: "acme".into(),
            name: id.into(),
            description: String::new(),
            version: None,
            attrs: BTreeMap::from([("status".to_string(), vec![status.to_string()])]),
            manifest: serde_json::Value::Null,
            meta: serde_json::Value::Null,
            created_at: "2026-01-01T00:00:00Z".into(),
            updated_at: format!("2026-01-01T00:00:{rev:02}Z"),
        }
    }

    fn temp_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.db");
        let store = SqliteStore::open(path.to_str().unwrap()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_snapshot_load_indexes_latest_only() {
        let (_dir, store) = temp_store();
        store.publish(&entry("s", 1, "active")).unwrap();
        store.publish(&entry("s", 2, "deprecated")).unwrap();
        store.publish(&entry("t", 1, "active")).unwrap();

        let index = Arc::new(SharedIndex::new());
        load_snapshot(&store, &index).unwrap();

        let snapshot = index.read();
        assert_eq!(snapshot.doc_count(), 2);
        let hit = snapshot.read("s", &Requester::anonymous()).unwrap();
        assert_eq!(hit.entry.rev, 2);
        drop(snapshot);
        assert_eq!(index.last_seq(), 3);
    }

    #[test]
    fn test_poll_applies_new_changes() {
        let (_dir, store) = temp_store();
        store.publish(&entry("a", 1, "active")).unwrap();

        let index = Arc::new(SharedIndex::new());
        load_snapshot(&store, &index).unwrap();

        store.publish(&entry("b", 1, "active")).unwrap();
        store.publish(&entry("a", 2, "deprecated")).unwrap();

        let tailer = ChangeTailer::new(store, Arc::clone(&index), 500);
        assert_eq!(tailer.poll_once().unwrap(), 2);
        assert_eq!(index.last_seq(), 3);

        let snapshot = index.read();
        assert_eq!(snapshot.doc_count(), 2);
        let hit = snapshot.read("a", &Requester::anonymous()).unwrap();
        assert_eq!(hit.entry.attrs["status"], vec!["deprecated".to_string()]);
    }

    #[test]
    fn test_poll_is_idempotent_once_caught_up() {
        let (_dir, store) = temp_store();
        store.publish(&entry("a", 1, "active")).unwrap();

        let index = Arc::new(SharedIndex::new());
        load_snapshot(&store, &index).unwrap();

        let tailer = ChangeTailer::new(store, Arc::clone(&index), 500);
        assert_eq!(tailer.poll_once().unwrap(), 0);
        assert_eq!(tailer.poll_once().unwrap(), 0);
        assert_eq!(index.last_seq(), 1);
    }

    #[test]
    fn test_small_batches_drain_fully() {
        let (_dir, store) = temp_store();
        let index = Arc::new(SharedIndex::new());
        load_snapshot(&store, &index).unwrap();

        for i in 0..7 {
            store.publish(&entry(&format!("e{i}"), 1, "active")).unwrap();
        }

        let tailer = ChangeTailer::new(store, Arc::clone(&index), 3);
        assert_eq!(tailer.poll_once().unwrap(), 7);
        assert_eq!(index.last_seq(), 7);
        assert_eq!(index.read().doc_count(), 7);
    }

    #[test]
    fn test_stale_rev_advances_seq_without_applying() {
        let (_dir, store) = temp_store();
        store.publish(&entry("s", 2, "deprecated")).unwrap();

        let index = Arc::new(SharedIndex::new());
        load_snapshot(&store, &index).unwrap();

        // An older rev arrives later in the log.
        store.publish(&entry("s", 1, "active")).unwrap();

        let tailer = ChangeTailer::new(store, Arc::clone(&index), 500);
        assert_eq!(tailer.poll_once().unwrap(), 0);
        assert_eq!(index.last_seq(), 2);

        let snapshot = index.read();
        let hit = snapshot.read("s", &Requester::anonymous()).unwrap();
        assert_eq!(hit.entry.rev, 2);
    }

    #[test]
    fn test_change_without_entry_is_a_no_op() {
        let (_dir, store) = temp_store();
        let index = Arc::new(SharedIndex::new());
        load_snapshot(&store, &index).unwrap();

        store
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO changes (id, rev, change_type, changed_at) VALUES ('ghost', 1, 'retract', 't')",
                    [],
                )?;
                Ok(())
            })
            .unwrap();

        let tailer = ChangeTailer::new(store, Arc::clone(&index), 500);
        assert_eq!(tailer.poll_once().unwrap(), 0);
        assert_eq!(index.last_seq(), 1);
        assert_eq!(index.read().doc_count(), 0);
    }
}

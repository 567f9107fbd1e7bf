//! The in-memory catalog index and its shared, concurrently-readable handle.
//!
//! [`CatalogIndex`] is one consistent snapshot: registry, postings,
//! visibility bitmaps, universe, and sort order move together under a single
//! writer. [`SharedIndex`] wraps it in a reader-writer lock; many readers
//! observe a snapshot across one request; the change tailer takes the write
//! side only for the short, purely in-memory mutation of a single doc.

pub mod eval;
pub mod posting;
pub mod registry;
pub mod visibility;

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use roaring::RoaringBitmap;
use serde::Serialize;

use crate::entry::{DocId, Entry, Hit, Requester};
use crate::index::posting::{entry_tokens, PostingStore};
use crate::index::registry::{DocRegistry, IndexedDoc, Upsert};
use crate::index::visibility::VisibilitySets;

/// Counters reported by the stats operation.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub docs: u64,
    pub eq_tokens: usize,
    pub presence_tokens: usize,
    pub postings_cardinality: u64,
    pub memory_approx: u64,
    pub build_ms: u64,
    pub last_seq: i64,
}

/// Result of a batch lookup: found items in input order, plus the count of
/// ids withheld by visibility.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub items: Vec<Hit>,
    pub omitted: usize,
}

#[derive(Debug, Default)]
pub struct CatalogIndex {
    pub(crate) docs: DocRegistry,
    pub(crate) postings: PostingStore,
    pub(crate) visibility: VisibilitySets,
    pub(crate) universe: RoaringBitmap,
}

impl CatalogIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one observed revision. Returns false when the update was
    /// discarded because the stored rev is already at or past `entry.rev`.
    ///
    /// `maintain_order` is false only during snapshot load, where the caller
    /// finishes with a single [`CatalogIndex::finish_snapshot`].
    pub fn apply_change(&mut self, entry: Entry, maintain_order: bool) -> bool {
        let tokens = entry_tokens(&entry);
        match self.docs.upsert(entry, maintain_order) {
            Upsert::Stale => false,
            Upsert::Inserted(doc_id) => {
                self.postings.add(&tokens, doc_id);
                if let Some(doc) = self.docs.get(doc_id) {
                    self.visibility.insert(doc_id, &doc.entry);
                }
                self.universe.insert(doc_id);
                true
            }
            Upsert::Replaced(doc_id, previous) => {
                self.postings.remove(&entry_tokens(&previous), doc_id);
                self.visibility.remove(doc_id, &previous);
                self.postings.add(&tokens, doc_id);
                if let Some(doc) = self.docs.get(doc_id) {
                    self.visibility.insert(doc_id, &doc.entry);
                }
                self.universe.insert(doc_id);
                true
            }
        }
    }

    /// One sort pass after a batch of order-deferred applies.
    pub fn finish_snapshot(&mut self) {
        self.docs.sort();
    }

    /// Direct lookup by entry id. Absent and visibility-denied are
    /// indistinguishable: both return `None`.
    pub fn read(&self, id: &str, requester: &Requester) -> Option<Hit> {
        let doc_id = self.docs.lookup_id(id)?;
        if !self.visibility.can_see(doc_id, requester) {
            return None;
        }
        self.docs.get(doc_id).map(IndexedDoc::hit)
    }

    /// Look up many ids, preserving input order for the items found and
    /// counting visibility-denied docs as omitted.
    pub fn batch_get(&self, ids: &[String], requester: &Requester) -> BatchResult {
        let mut items = Vec::new();
        let mut omitted = 0;
        for id in ids {
            let Some(doc_id) = self.docs.lookup_id(id) else {
                continue;
            };
            if !self.visibility.can_see(doc_id, requester) {
                omitted += 1;
                continue;
            }
            if let Some(doc) = self.docs.get(doc_id) {
                items.push(doc.hit());
            }
        }
        BatchResult { items, omitted }
    }

    pub fn doc_count(&self) -> u64 {
        self.docs.doc_count()
    }

    pub(crate) fn get_doc(&self, doc: DocId) -> Option<&IndexedDoc> {
        self.docs.get(doc)
    }

    fn stats(&self, build_ms: u64, last_seq: i64) -> IndexStats {
        IndexStats {
            docs: self.docs.doc_count(),
            eq_tokens: self.postings.eq_token_count(),
            presence_tokens: self.postings.presence_token_count(),
            postings_cardinality: self.postings.total_cardinality(),
            memory_approx: self.postings.approx_bytes(),
            build_ms,
            last_seq,
        }
    }
}

/// The process-wide index handle: a reader-writer lock around the snapshot,
/// with tailer progress kept in atomics beside it so health checks never
/// contend with a write.
#[derive(Debug, Default)]
pub struct SharedIndex {
    inner: RwLock<CatalogIndex>,
    last_seq: AtomicI64,
    build_ms: AtomicU64,
}

impl SharedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read access for the duration of one request.
    pub fn read(&self) -> RwLockReadGuard<'_, CatalogIndex> {
        self.inner.read().unwrap()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, CatalogIndex> {
        self.inner.write().unwrap()
    }

    /// Apply one change under the write lock, maintaining sort order.
    pub fn apply_change(&self, entry: Entry) -> bool {
        self.write().apply_change(entry, true)
    }

    pub fn last_seq(&self) -> i64 {
        self.last_seq.load(Ordering::Acquire)
    }

    pub fn set_last_seq(&self, seq: i64) {
        self.last_seq.store(seq, Ordering::Release);
    }

    pub fn build_ms(&self) -> u64 {
        self.build_ms.load(Ordering::Relaxed)
    }

    pub fn set_build_ms(&self, elapsed: u64) {
        self.build_ms.store(elapsed, Ordering::Relaxed);
    }

    pub fn stats(&self) -> IndexStats {
        self.read().stats(self.build_ms(), self.last_seq())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::posting::{eq_token, SCOPE_ATTR, SCOPE_TOP};

    fn entry(id: &str, rev: u64, attrs: &[(&str, &[&str])]) -> Entry {
        Entry {
            id: id.into(),
            rev,
            kind: "skill".into(),
            namespace: "acme".into(),
            name: id.into(),
            description: String::new(),
            version: None,
            attrs: attrs
                .iter()
                .map(|(k, vs)| (k.to_string(), vs.iter().map(|v| v.to_string()).collect()))
                .collect(),
            manifest: serde_json::Value::Null,
            meta: serde_json::Value::Null,
            created_at: "2026-01-01T00:00:00Z".into(),
            updated_at: format!("2026-01-01T00:00:0{rev}Z"),
        }
    }

    #[test]
    fn test_apply_change_is_idempotent() {
        let mut index = CatalogIndex::new();
        let e = entry("s", 1, &[("status", &["active"])]);
        assert!(index.apply_change(e.clone(), true));
        assert!(!index.apply_change(e, true));

        assert_eq!(index.doc_count(), 1);
        assert_eq!(index.universe.len(), 1);
        let token = eq_token(SCOPE_ATTR, "status", "active");
        assert_eq!(index.postings.eq_posting(&token).map(|b| b.len()), Some(1));
    }

    #[test]
    fn test_higher_rev_swaps_tokens() {
        let mut index = CatalogIndex::new();
        index.apply_change(entry("s", 1, &[("status", &["active"])]), true);
        index.apply_change(entry("s", 2, &[("status", &["deprecated"])]), true);

        let active = eq_token(SCOPE_ATTR, "status", "active");
        let deprecated = eq_token(SCOPE_ATTR, "status", "deprecated");
        assert!(index.postings.eq_posting(&active).is_none());
        assert!(index.postings.eq_posting(&deprecated).is_some());

        // The old rev's equality token is gone too.
        assert!(index.postings.eq_posting(&eq_token(SCOPE_TOP, "rev", "1")).is_none());
        assert!(index.postings.eq_posting(&eq_token(SCOPE_TOP, "rev", "2")).is_some());
    }

    #[test]
    fn test_out_of_order_rev_leaves_newest() {
        let mut index = CatalogIndex::new();
        index.apply_change(entry("s", 2, &[("status", &["deprecated"])]), true);
        assert!(!index.apply_change(entry("s", 1, &[("status", &["active"])]), true));

        let hit = index.read("s", &Requester::anonymous()).unwrap();
        assert_eq!(hit.entry.rev, 2);
        assert_eq!(hit.entry.attrs["status"], vec!["deprecated".to_string()]);
    }

    #[test]
    fn test_universe_matches_registry() {
        let mut index = CatalogIndex::new();
        for i in 0..5 {
            index.apply_change(entry(&format!("e{i}"), 1, &[]), true);
        }
        assert_eq!(index.universe.len(), index.doc_count());
        for doc in index.docs.sort_order() {
            assert!(index.universe.contains(*doc));
        }
    }

    #[test]
    fn test_read_denies_invisible_docs() {
        let mut index = CatalogIndex::new();
        index.apply_change(
            entry("sec", 1, &[("visibility", &["restricted"]), ("allowed_group", &["finance"])]),
            true,
        );

        assert!(index.read("sec", &Requester::anonymous()).is_none());
        assert!(index.read("sec", &Requester::authenticated(["ops"])).is_none());
        assert!(index.read("sec", &Requester::authenticated(["finance", "ops"])).is_some());
        // Unknown id is indistinguishable from denied.
        assert!(index.read("missing", &Requester::anonymous()).is_none());
    }

    #[test]
    fn test_batch_get_counts_denied_and_keeps_order() {
        let mut index = CatalogIndex::new();
        index.apply_change(entry("a", 1, &[]), true);
        index.apply_change(entry("b", 1, &[("visibility", &["internal"])]), true);
        index.apply_change(entry("c", 1, &[]), true);

        let ids = vec!["c".to_string(), "missing".to_string(), "b".to_string(), "a".to_string()];
        let result = index.batch_get(&ids, &Requester::anonymous());
        let found: Vec<&str> = result.items.iter().map(|h| h.entry.id.as_str()).collect();
        assert_eq!(found, vec!["c", "a"]);
        assert_eq!(result.omitted, 1);
    }

    #[test]
    fn test_stats_reflect_postings() {
        let mut index = CatalogIndex::new();
        index.apply_change(entry("a", 1, &[("tag", &["x"])]), true);
        let stats = index.stats(12, 7);
        assert_eq!(stats.docs, 1);
        assert!(stats.eq_tokens > 0);
        assert!(stats.presence_tokens > 0);
        assert!(stats.postings_cardinality >= stats.eq_tokens as u64);
        assert_eq!(stats.build_ms, 12);
        assert_eq!(stats.last_seq, 7);
    }

    #[test]
    fn test_shared_index_tracks_progress() {
        let shared = SharedIndex::new();
        assert!(shared.apply_change(entry("a", 1, &[])));
        shared.set_last_seq(42);
        shared.set_build_ms(3);
        let stats = shared.stats();
        assert_eq!(stats.docs, 1);
        assert_eq!(stats.last_seq, 42);
        assert_eq!(stats.build_ms, 3);
    }
}

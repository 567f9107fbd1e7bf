//! Document registry: doc-id allocation, per-doc records, and the
//! precomputed sort order.

use std::cmp::Ordering;

use ahash::AHashMap;

use crate::entry::{CardView, DocId, Entry, Hit};

/// An entry as held by the index: the projection itself plus everything
/// search needs precomputed.
#[derive(Debug, Clone)]
pub struct IndexedDoc {
    pub doc_id: DocId,
    pub entry: Entry,
    /// ASCII-case-folded copies for the free-text substring filter.
    pub name_folded: String,
    pub description_folded: String,
    pub card: CardView,
}

impl IndexedDoc {
    fn new(doc_id: DocId, entry: Entry) -> Self {
        let name_folded = entry.name.to_ascii_lowercase();
        let description_folded = entry.description.to_ascii_lowercase();
        let card = CardView::project(&entry);
        IndexedDoc {
            doc_id,
            entry,
            name_folded,
            description_folded,
            card,
        }
    }

    pub fn hit(&self) -> Hit {
        Hit {
            entry: self.entry.clone(),
            card: self.card.clone(),
        }
    }
}

/// Outcome of staging an entry into the registry.
pub enum Upsert {
    /// First sighting of this id; a fresh doc id was allocated.
    Inserted(DocId),
    /// A strictly higher rev replaced the previous record, returned here so
    /// the caller can retract its tokens.
    Replaced(DocId, Box<Entry>),
    /// The incoming rev is not greater than the stored one.
    Stale,
}

#[derive(Debug, Default)]
pub struct DocRegistry {
    next_doc_id: DocId,
    by_id: AHashMap<String, DocId>,
    docs: AHashMap<DocId, IndexedDoc>,
    /// Doc ids in descending `(updated_at, id)` order.
    sort_order: Vec<DocId>,
    /// Inverse of `sort_order` for O(1) rank lookup.
    rank: AHashMap<DocId, u32>,
}

impl DocRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, doc: DocId) -> Option<&IndexedDoc> {
        self.docs.get(&doc)
    }

    pub fn lookup_id(&self, id: &str) -> Option<DocId> {
        self.by_id.get(id).copied()
    }

    pub fn doc_count(&self) -> u64 {
        self.docs.len() as u64
    }

    pub fn sort_order(&self) -> &[DocId] {
        &self.sort_order
    }

    pub fn rank_of(&self, doc: DocId) -> Option<u32> {
        self.rank.get(&doc).copied()
    }

    /// Stage `entry` into the registry, allocating a doc id on first sight
    /// and rejecting non-increasing revs. Token and visibility bookkeeping
    /// belongs to the caller; `maintain_order` controls whether the sort
    /// position is fixed up immediately (tail updates) or deferred to one
    /// [`DocRegistry::sort`] call (snapshot load).
    pub fn upsert(&mut self, entry: Entry, maintain_order: bool) -> Upsert {
        match self.by_id.get(&entry.id).copied() {
            Some(doc_id) => {
                let previous_rev = self.docs.get(&doc_id).map(|d| d.entry.rev).unwrap_or(0);
                if entry.rev <= previous_rev {
                    return Upsert::Stale;
                }
                let doc = IndexedDoc::new(doc_id, entry);
                let previous = self.docs.insert(doc_id, doc);
                if maintain_order {
                    self.remove_from_order(doc_id);
                    self.insert_ordered(doc_id);
                }
                match previous {
                    Some(prev) => Upsert::Replaced(doc_id, Box::new(prev.entry)),
                    None => Upsert::Inserted(doc_id),
                }
            }
            None => {
                self.next_doc_id += 1;
                let doc_id = self.next_doc_id;
                self.by_id.insert(entry.id.clone(), doc_id);
                self.docs.insert(doc_id, IndexedDoc::new(doc_id, entry));
                if maintain_order {
                    self.insert_ordered(doc_id);
                } else {
                    self.sort_order.push(doc_id);
                }
                Upsert::Inserted(doc_id)
            }
        }
    }

    /// Re-sort the whole order in one pass. Called once after a snapshot
    /// load instead of per row.
    pub fn sort(&mut self) {
        let docs = &self.docs;
        self.sort_order
            .sort_by(|&a, &b| compare_docs(docs, a, b));
        self.rebuild_ranks();
    }

    fn remove_from_order(&mut self, doc: DocId) {
        if let Some(pos) = self.sort_order.iter().position(|&d| d == doc) {
            self.sort_order.remove(pos);
        }
    }

    fn insert_ordered(&mut self, doc: DocId) {
        let docs = &self.docs;
        let pos = self
            .sort_order
            .binary_search_by(|&existing| compare_docs(docs, existing, doc))
            .unwrap_or_else(|insert_at| insert_at);
        self.sort_order.insert(pos, doc);
        self.rebuild_ranks();
    }

    fn rebuild_ranks(&mut self) {
        self.rank.clear();
        for (position, &doc) in self.sort_order.iter().enumerate() {
            self.rank.insert(doc, position as u32);
        }
    }
}

/// Descending `(updated_at, id)`: the freshest entry sorts first, ties
/// broken by id so the order is total.
fn compare_docs(docs: &AHashMap<DocId, IndexedDoc>, a: DocId, b: DocId) -> Ordering {
    let key_a = docs.get(&a).map(|d| (d.entry.updated_at.as_str(), d.entry.id.as_str()));
    let key_b = docs.get(&b).map(|d| (d.entry.updated_at.as_str(), d.entry.id.as_str()));
    key_b.cmp(&key_a)
}

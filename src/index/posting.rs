//! Posting storage: token to compressed bitmap of document ids.
//!
//! Tokens use a NUL delimiter so keys and values can never collide:
//! `scope "\0k:" key "\0v:" value` for equality and `scope "\0k:" key "\0*"`
//! for presence, with scope `top` (first-class fields) or `attr`
//! (attribute-map keys). Equality and presence live in separate maps so the
//! evaluator can dispatch without inspecting token shape.

use std::collections::BTreeSet;

use ahash::AHashMap;
use roaring::RoaringBitmap;

use crate::entry::{DocId, Entry};

pub const SCOPE_TOP: &str = "top";
pub const SCOPE_ATTR: &str = "attr";

/// Equality token for `(scope, key, value)`.
pub fn eq_token(scope: &str, key: &str, value: &str) -> String {
    format!("{scope}\0k:{key}\0v:{value}")
}

/// Presence token for `(scope, key)`.
pub fn presence_token(scope: &str, key: &str) -> String {
    format!("{scope}\0k:{key}\0*")
}

/// The full token set for one entry, duplicates collapsed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TokenSet {
    pub eq: BTreeSet<String>,
    pub presence: BTreeSet<String>,
}

/// Derive every posting token an entry contributes.
///
/// Top-level tokens exist for `id`, `type`, `name`, `namespace`, `rev` and,
/// when set, `version`; `rev` is tokenized in canonical decimal so filter
/// values can be normalized to the same form. Attribute tokens exist per key
/// (presence) and per distinct value (equality).
pub fn entry_tokens(entry: &Entry) -> TokenSet {
    let mut tokens = TokenSet::default();

    let mut top = |key: &str, value: &str| {
        tokens.eq.insert(eq_token(SCOPE_TOP, key, value));
        tokens.presence.insert(presence_token(SCOPE_TOP, key));
    };
    top("id", &entry.id);
    top("type", &entry.kind);
    top("name", &entry.name);
    top("namespace", &entry.namespace);
    top("rev", &entry.rev.to_string());
    if let Some(version) = &entry.version {
        top("version", version);
    }

    for (key, values) in &entry.attrs {
        tokens.presence.insert(presence_token(SCOPE_ATTR, key));
        for value in values {
            tokens.eq.insert(eq_token(SCOPE_ATTR, key, value));
        }
    }

    tokens
}

/// Token to bitmap maps for equality and presence postings. Bitmaps are
/// dropped the moment they empty, so `get` returning `Some` implies a
/// non-empty posting.
#[derive(Debug, Default)]
pub struct PostingStore {
    eq: AHashMap<String, RoaringBitmap>,
    presence: AHashMap<String, RoaringBitmap>,
}

impl PostingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every token of `tokens` for `doc`.
    pub fn add(&mut self, tokens: &TokenSet, doc: DocId) {
        for token in &tokens.eq {
            self.eq.entry(token.clone()).or_default().insert(doc);
        }
        for token in &tokens.presence {
            self.presence.entry(token.clone()).or_default().insert(doc);
        }
    }

    /// Remove every token of `tokens` for `doc`, dropping emptied bitmaps.
    pub fn remove(&mut self, tokens: &TokenSet, doc: DocId) {
        for token in &tokens.eq {
            remove_from(&mut self.eq, token, doc);
        }
        for token in &tokens.presence {
            remove_from(&mut self.presence, token, doc);
        }
    }

    pub fn eq_posting(&self, token: &str) -> Option<&RoaringBitmap> {
        self.eq.get(token)
    }

    pub fn presence_posting(&self, token: &str) -> Option<&RoaringBitmap> {
        self.presence.get(token)
    }

    /// Number of live equality tokens.
    pub fn eq_token_count(&self) -> usize {
        self.eq.len()
    }

    /// Number of live presence tokens.
    pub fn presence_token_count(&self) -> usize {
        self.presence.len()
    }

    /// Sum of cardinalities across every posting.
    pub fn total_cardinality(&self) -> u64 {
        self.eq.values().chain(self.presence.values()).map(RoaringBitmap::len).sum()
    }

    /// Rough resident size: serialized bitmap bytes plus token text.
    pub fn approx_bytes(&self) -> u64 {
        self.eq
            .iter()
            .chain(self.presence.iter())
            .map(|(token, bitmap)| token.len() as u64 + bitmap.serialized_size() as u64)
            .sum()
    }
}

fn remove_from(map: &mut AHashMap<String, RoaringBitmap>, token: &str, doc: DocId) {
    if let Some(bitmap) = map.get_mut(token) {
        bitmap.remove(doc);
        if bitmap.is_empty() {
            map.remove(token);
        }
    }
}

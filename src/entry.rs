//! Catalog data model: entries, projections, and the requester identity.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Unique identifier for a document in the index (process-local, never reused)
pub type DocId = u32;

/// Attribute keys included in the card projection
pub const CARD_ATTR_KEYS: [&str; 8] = [
    "tag",
    "capability",
    "env",
    "status",
    "visibility",
    "endpoint",
    "auth",
    "owner",
];

/// A directory entry as stored upstream. The core holds a projection of the
/// authoritative row; `manifest` and `meta` are opaque blobs passed through
/// in the full view only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub rev: u64,
    #[serde(rename = "type")]
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Attribute key to ordered values. Order is insignificant for matching;
    /// duplicates are allowed but collapse into one posting token.
    #[serde(default)]
    pub attrs: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub manifest: serde_json::Value,
    #[serde(default)]
    pub meta: serde_json::Value,
    /// ISO-8601 UTC, comparable lexicographically
    pub created_at: String,
    pub updated_at: String,
}

/// Restricted projection of an entry: identity fields plus an allow-list of
/// attribute keys, with empty values dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardView {
    pub id: String,
    pub rev: u64,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub description: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, Vec<String>>,
}

impl CardView {
    /// Project an entry down to its card.
    pub fn project(entry: &Entry) -> Self {
        let mut attrs = BTreeMap::new();
        for key in CARD_ATTR_KEYS {
            if let Some(values) = entry.attrs.get(key) {
                if !values.is_empty() {
                    attrs.insert(key.to_string(), values.clone());
                }
            }
        }
        CardView {
            id: entry.id.clone(),
            rev: entry.rev,
            kind: entry.kind.clone(),
            name: entry.name.clone(),
            namespace: entry.namespace.clone(),
            version: entry.version.clone(),
            description: entry.description.clone(),
            attrs,
        }
    }
}

/// One search or lookup result: the full entry plus its card, so callers can
/// pick a projection without re-deriving it.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub entry: Entry,
    pub card: CardView,
}

/// Authentication context attached to every read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Requester {
    pub is_authenticated: bool,
    pub subject: Option<String>,
    pub groups: Vec<String>,
}

impl Requester {
    /// Unauthenticated requester with no group memberships.
    pub fn anonymous() -> Self {
        Requester::default()
    }

    /// Authenticated requester with the given groups.
    pub fn authenticated<I, S>(groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Requester {
            is_authenticated: true,
            subject: None,
            groups: groups.into_iter().map(Into::into).collect(),
        }
    }
}

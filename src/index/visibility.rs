//! Precomputed visibility bitmaps.
//!
//! Each live doc sits in exactly one of three classes, taken from
//! `attrs.visibility[0]` (default public). Restricted docs additionally
//! register under every group in `attrs.allowed_group`, so the allowed set
//! for a requester is a union of a handful of bitmaps.

use ahash::AHashMap;
use roaring::RoaringBitmap;

use crate::entry::{DocId, Entry, Requester};

/// Attribute keys the visibility layer reads.
const VISIBILITY_KEY: &str = "visibility";
const ALLOWED_GROUP_KEY: &str = "allowed_group";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Internal,
    Restricted,
}

impl Visibility {
    /// Visibility class of an entry. Unrecognized values fall back to
    /// public, matching the default for an absent attribute.
    pub fn of(entry: &Entry) -> Self {
        match entry
            .attrs
            .get(VISIBILITY_KEY)
            .and_then(|values| values.first())
            .map(String::as_str)
        {
            Some("internal") => Visibility::Internal,
            Some("restricted") => Visibility::Restricted,
            _ => Visibility::Public,
        }
    }
}

/// Groups that grant access to a restricted entry.
fn allowed_groups(entry: &Entry) -> &[String] {
    entry
        .attrs
        .get(ALLOWED_GROUP_KEY)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

#[derive(Debug, Default)]
pub struct VisibilitySets {
    public: RoaringBitmap,
    internal: RoaringBitmap,
    restricted: RoaringBitmap,
    groups: AHashMap<String, RoaringBitmap>,
}

impl VisibilitySets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `doc` under the entry's class and, when restricted, under
    /// its allowed groups.
    pub fn insert(&mut self, doc: DocId, entry: &Entry) {
        match Visibility::of(entry) {
            Visibility::Public => {
                self.public.insert(doc);
            }
            Visibility::Internal => {
                self.internal.insert(doc);
            }
            Visibility::Restricted => {
                self.restricted.insert(doc);
                for group in allowed_groups(entry) {
                    self.groups.entry(group.clone()).or_default().insert(doc);
                }
            }
        }
    }

    /// Remove `doc` from the class and group memberships the entry implies,
    /// dropping emptied group bitmaps.
    pub fn remove(&mut self, doc: DocId, entry: &Entry) {
        match Visibility::of(entry) {
            Visibility::Public => {
                self.public.remove(doc);
            }
            Visibility::Internal => {
                self.internal.remove(doc);
            }
            Visibility::Restricted => {
                self.restricted.remove(doc);
                for group in allowed_groups(entry) {
                    if let Some(bitmap) = self.groups.get_mut(group) {
                        bitmap.remove(doc);
                        if bitmap.is_empty() {
                            self.groups.remove(group);
                        }
                    }
                }
            }
        }
    }

    /// Every doc the requester may see: public, plus internal when
    /// authenticated, plus each granted group's docs.
    pub fn allowed(&self, requester: &Requester) -> RoaringBitmap {
        let mut out = self.public.clone();
        if requester.is_authenticated {
            out |= &self.internal;
        }
        for group in &requester.groups {
            if let Some(bitmap) = self.groups.get(group) {
                out |= bitmap;
            }
        }
        out
    }

    /// Membership test for a single doc, used by direct lookups.
    pub fn can_see(&self, doc: DocId, requester: &Requester) -> bool {
        if self.public.contains(doc) {
            return true;
        }
        if requester.is_authenticated && self.internal.contains(doc) {
            return true;
        }
        requester
            .groups
            .iter()
            .any(|group| self.groups.get(group).is_some_and(|bitmap| bitmap.contains(doc)))
    }

    /// Which of the three class bitmaps currently hold `doc`.
    #[cfg(test)]
    fn classes_of(&self, doc: DocId) -> Vec<Visibility> {
        let mut out = Vec::new();
        if self.public.contains(doc) {
            out.push(Visibility::Public);
        }
        if self.internal.contains(doc) {
            out.push(Visibility::Internal);
        }
        if self.restricted.contains(doc) {
            out.push(Visibility::Restricted);
        }
        out
    }
}

//! Query planning and pagination over one index snapshot.
//!
//! A search narrows to a candidate bitmap (filter AND visibility), then
//! picks one of two paths: **selective-materialize** walks the small
//! candidate set and ranks it, **ordered-scan** walks the precomputed sort
//! order and filters. Both produce identical pages; the split only bounds
//! work, either by candidate count or by scan depth.

pub mod cursor;

pub use cursor::Cursor;

use memchr::memmem::Finder;
use roaring::RoaringBitmap;

use crate::entry::{DocId, Hit, Requester};
use crate::error::{CoreError, Result};
use crate::filter::FilterAst;
use crate::index::eval::{evaluate, EvalContext};
use crate::index::registry::IndexedDoc;
use crate::index::CatalogIndex;

pub const LIMIT_DEFAULT: usize = 20;
pub const LIMIT_MAX: usize = 200;

/// Candidate sets at or below this size always take the selective path.
const SELECTIVE_MAX_CANDIDATES: u64 = 5_000;
/// Larger sets still qualify when they cover at most 1/N of the universe.
const SELECTIVE_UNIVERSE_DIVISOR: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Descending `(updated_at, id)`: the only order cursors paginate.
    #[default]
    UpdatedAtDesc,
    /// Bitmap order (ascending doc id), no pagination.
    None,
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub limit: usize,
    pub cursor: Option<Cursor>,
    /// Case-folded substring filter over name and description.
    pub query: Option<String>,
    pub sort: SortOrder,
}

impl Default for SearchOptions {
    fn default() -> Self {
        SearchOptions {
            limit: LIMIT_DEFAULT,
            cursor: None,
            query: None,
            sort: SortOrder::UpdatedAtDesc,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub items: Vec<Hit>,
    pub next_cursor: Option<Cursor>,
}

/// Run a search against one snapshot.
///
/// An unknown token or an empty candidate set yields an empty page, never an
/// error; the error cases are a malformed filter value and a cursor combined
/// with `sort=none`.
pub fn execute(
    index: &CatalogIndex,
    filter: Option<&FilterAst>,
    opts: &SearchOptions,
    requester: &Requester,
) -> Result<SearchPage> {
    if opts.sort == SortOrder::None && opts.cursor.is_some() {
        return Err(CoreError::InvalidRequest(
            "cursor requires sort=updated_at_desc".to_string(),
        ));
    }
    let limit = opts.limit.clamp(1, LIMIT_MAX);

    let allowed = index.visibility.allowed(requester);
    if allowed.is_empty() {
        return Ok(SearchPage::default());
    }

    let candidates = match filter {
        None => allowed,
        Some(ast) => {
            let ctx = EvalContext {
                postings: &index.postings,
                universe: &index.universe,
            };
            let mut narrowed = evaluate(ast, &ctx)?;
            narrowed &= &allowed;
            narrowed
        }
    };
    if candidates.is_empty() {
        return Ok(SearchPage::default());
    }

    let query_folded = opts
        .query
        .as_deref()
        .map(str::to_ascii_lowercase)
        .filter(|q| !q.is_empty());
    let finder = query_folded.as_deref().map(Finder::new);

    match opts.sort {
        SortOrder::None => Ok(unordered_page(index, &candidates, finder.as_ref(), limit)),
        SortOrder::UpdatedAtDesc => {
            let candidate_count = candidates.len();
            let universe = index.universe.len();
            let selective = candidate_count <= SELECTIVE_MAX_CANDIDATES
                || candidate_count <= universe / SELECTIVE_UNIVERSE_DIVISOR;
            if selective {
                Ok(selective_materialize(index, &candidates, opts.cursor.as_ref(), finder.as_ref(), limit))
            } else {
                Ok(ordered_scan(index, &candidates, opts.cursor.as_ref(), finder.as_ref(), limit))
            }
        }
    }
}

/// Walk the precomputed sort order, keeping candidates that pass the cursor
/// and substring filters, until the page fills.
fn ordered_scan(
    index: &CatalogIndex,
    candidates: &RoaringBitmap,
    cursor: Option<&Cursor>,
    finder: Option<&Finder<'_>>,
    limit: usize,
) -> SearchPage {
    let mut picked: Vec<&IndexedDoc> = Vec::with_capacity(limit);
    for &doc_id in index.docs.sort_order() {
        if !candidates.contains(doc_id) {
            continue;
        }
        let Some(doc) = index.get_doc(doc_id) else { continue };
        if !admits(doc, cursor) || !matches_query(doc, finder) {
            continue;
        }
        picked.push(doc);
        if picked.len() == limit {
            break;
        }
    }
    paged(picked, limit)
}

/// Walk the candidate bitmap in doc-id order, keeping the top `limit` docs
/// by rank in a bounded sorted buffer.
fn selective_materialize(
    index: &CatalogIndex,
    candidates: &RoaringBitmap,
    cursor: Option<&Cursor>,
    finder: Option<&Finder<'_>>,
    limit: usize,
) -> SearchPage {
    let mut top: Vec<(u32, DocId)> = Vec::with_capacity(limit + 1);
    for doc_id in candidates.iter() {
        let Some(doc) = index.get_doc(doc_id) else { continue };
        if !admits(doc, cursor) || !matches_query(doc, finder) {
            continue;
        }
        let Some(rank) = index.docs.rank_of(doc_id) else { continue };
        if top.len() == limit && top.last().is_some_and(|&(worst, _)| rank >= worst) {
            continue;
        }
        let position = top
            .binary_search_by_key(&rank, |&(r, _)| r)
            .unwrap_or_else(|insert_at| insert_at);
        top.insert(position, (rank, doc_id));
        if top.len() > limit {
            top.pop();
        }
    }

    let picked: Vec<&IndexedDoc> = top
        .iter()
        .filter_map(|&(_, doc_id)| index.get_doc(doc_id))
        .collect();
    paged(picked, limit)
}

/// `sort=none`: candidates in bitmap order, no cursor in or out.
fn unordered_page(
    index: &CatalogIndex,
    candidates: &RoaringBitmap,
    finder: Option<&Finder<'_>>,
    limit: usize,
) -> SearchPage {
    let mut items = Vec::with_capacity(limit);
    for doc_id in candidates.iter() {
        let Some(doc) = index.get_doc(doc_id) else { continue };
        if !matches_query(doc, finder) {
            continue;
        }
        items.push(doc.hit());
        if items.len() == limit {
            break;
        }
    }
    SearchPage { items, next_cursor: None }
}

fn admits(doc: &IndexedDoc, cursor: Option<&Cursor>) -> bool {
    cursor.map_or(true, |c| c.admits(&doc.entry.updated_at, &doc.entry.id))
}

fn matches_query(doc: &IndexedDoc, finder: Option<&Finder<'_>>) -> bool {
    match finder {
        None => true,
        Some(f) => {
            f.find(doc.name_folded.as_bytes()).is_some()
                || f.find(doc.description_folded.as_bytes()).is_some()
        }
    }
}

/// Build the page; a full page carries a cursor positioned at its last item
/// (a later page may exist), a short page is final.
fn paged(picked: Vec<&IndexedDoc>, limit: usize) -> SearchPage {
    let next_cursor = if picked.len() == limit {
        picked.last().map(|doc| Cursor {
            updated_at: doc.entry.updated_at.clone(),
            id: doc.entry.id.clone(),
        })
    } else {
        None
    };
    SearchPage {
        items: picked.into_iter().map(IndexedDoc::hit).collect(),
        next_cursor,
    }
}

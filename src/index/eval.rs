//! Filter evaluation over postings.
//!
//! Evaluation narrows with bitmaps only; every leaf resolves to a posting
//! lookup. AND children are reordered by estimated cardinality so the
//! cheapest clause drives the intersection, and evaluation short-circuits
//! the moment the accumulator empties.

use roaring::RoaringBitmap;

use crate::error::{CoreError, Result};
use crate::filter::{resolve_key, FilterAst, ResolvedKey, TopField};
use crate::index::posting::{eq_token, presence_token, PostingStore, SCOPE_ATTR, SCOPE_TOP};

/// Everything evaluation needs from one snapshot.
pub struct EvalContext<'a> {
    pub postings: &'a PostingStore,
    pub universe: &'a RoaringBitmap,
}

/// A bitmap that is either borrowed from posting storage or owned by the
/// evaluator. Borrowed bitmaps are never mutated; any operation that needs
/// ownership promotes via clone first.
enum Postings<'a> {
    Borrowed(&'a RoaringBitmap),
    Owned(RoaringBitmap),
}

impl<'a> Postings<'a> {
    fn as_bitmap(&self) -> &RoaringBitmap {
        match self {
            Postings::Borrowed(bitmap) => bitmap,
            Postings::Owned(bitmap) => bitmap,
        }
    }

    fn into_owned(self) -> RoaringBitmap {
        match self {
            Postings::Borrowed(bitmap) => bitmap.clone(),
            Postings::Owned(bitmap) => bitmap,
        }
    }

    fn is_empty(&self) -> bool {
        self.as_bitmap().is_empty()
    }
}

/// Evaluate a filter AST, returning the matching doc ids.
///
/// Absent postings evaluate to the empty set; the only error is a value
/// whose shape the key rejects (`rev` requires an integer).
pub fn evaluate(ast: &FilterAst, ctx: &EvalContext) -> Result<RoaringBitmap> {
    Ok(eval_node(ast, ctx)?.into_owned())
}

fn eval_node<'a>(ast: &FilterAst, ctx: &EvalContext<'a>) -> Result<Postings<'a>> {
    match ast {
        FilterAst::Eq { key, value, value_pos } => {
            let token = eq_lookup_token(key, value, *value_pos)?;
            Ok(lookup(ctx.postings.eq_posting(&token)))
        }
        FilterAst::Present { key } => {
            let token = match resolve_key(key) {
                ResolvedKey::Top(field) => presence_token(SCOPE_TOP, field.as_str()),
                ResolvedKey::Attr(attr) => presence_token(SCOPE_ATTR, attr),
            };
            Ok(lookup(ctx.postings.presence_posting(&token)))
        }
        FilterAst::And(children) => {
            let mut ordered: Vec<&FilterAst> = children.iter().collect();
            ordered.sort_by_key(|child| estimate(child, ctx));

            let mut acc: Option<RoaringBitmap> = None;
            for child in ordered {
                let narrowed = eval_node(child, ctx)?;
                match acc.as_mut() {
                    None => acc = Some(narrowed.into_owned()),
                    Some(bitmap) => *bitmap &= narrowed.as_bitmap(),
                }
                if acc.as_ref().is_some_and(RoaringBitmap::is_empty) {
                    return Ok(Postings::Owned(RoaringBitmap::new()));
                }
            }
            // The parser guarantees at least one child.
            Ok(Postings::Owned(acc.unwrap_or_default()))
        }
        FilterAst::Or(children) => {
            let mut acc = RoaringBitmap::new();
            for child in children {
                acc |= eval_node(child, ctx)?.as_bitmap();
            }
            Ok(Postings::Owned(acc))
        }
        FilterAst::Not(inner) => {
            let excluded = eval_node(inner, ctx)?;
            if excluded.is_empty() {
                return Ok(Postings::Borrowed(ctx.universe));
            }
            let mut out = ctx.universe.clone();
            out -= excluded.as_bitmap();
            Ok(Postings::Owned(out))
        }
    }
}

/// Resolve an equality leaf to its posting token, normalizing `rev` values
/// to canonical decimal.
fn eq_lookup_token(key: &str, value: &str, value_pos: usize) -> Result<String> {
    match resolve_key(key) {
        ResolvedKey::Top(TopField::Rev) => {
            let rev: u64 = value.trim().parse().map_err(|_| CoreError::InvalidFilter {
                pos: value_pos,
                msg: "rev requires an integer value".to_string(),
            })?;
            Ok(eq_token(SCOPE_TOP, "rev", &rev.to_string()))
        }
        ResolvedKey::Top(field) => Ok(eq_token(SCOPE_TOP, field.as_str(), value)),
        ResolvedKey::Attr(attr) => Ok(eq_token(SCOPE_ATTR, attr, value)),
    }
}

fn lookup(posting: Option<&RoaringBitmap>) -> Postings<'_> {
    match posting {
        Some(bitmap) => Postings::Borrowed(bitmap),
        None => Postings::Owned(RoaringBitmap::new()),
    }
}

/// Estimated result cardinality without evaluating: leaf postings report
/// their size, AND takes the minimum, OR the saturated sum, NOT the
/// complement against the universe.
fn estimate(ast: &FilterAst, ctx: &EvalContext) -> u64 {
    match ast {
        FilterAst::Eq { key, value, value_pos } => match eq_lookup_token(key, value, *value_pos) {
            Ok(token) => ctx.postings.eq_posting(&token).map_or(0, RoaringBitmap::len),
            Err(_) => 0,
        },
        FilterAst::Present { key } => {
            let token = match resolve_key(key) {
                ResolvedKey::Top(field) => presence_token(SCOPE_TOP, field.as_str()),
                ResolvedKey::Attr(attr) => presence_token(SCOPE_ATTR, attr),
            };
            ctx.postings.presence_posting(&token).map_or(0, RoaringBitmap::len)
        }
        FilterAst::And(children) => children.iter().map(|c| estimate(c, ctx)).min().unwrap_or(0),
        FilterAst::Or(children) => {
            let sum: u64 = children.iter().map(|c| estimate(c, ctx)).sum();
            sum.min(ctx.universe.len())
        }
        FilterAst::Not(inner) => ctx.universe.len().saturating_sub(estimate(inner, ctx)),
    }
}

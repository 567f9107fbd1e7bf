//! Bounded cache of parsed filter ASTs keyed by the exact filter string.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;

use crate::error::Result;
use crate::filter::ast::FilterAst;
use crate::filter::parser::parse_filter;

/// Default capacity when none is configured.
pub const DEFAULT_CACHE_SIZE: usize = 256;

/// LRU of filter string to shared AST. Hits promote the entry to
/// most-recently-used; overflow evicts the single least-recently-used entry.
/// Parse failures are never cached.
pub struct FilterCache {
    inner: Mutex<LruCache<String, Arc<FilterAst>>>,
}

impl FilterCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Parse `raw`, returning the cached AST when the exact string was seen
    /// before.
    pub fn parse(&self, raw: &str) -> Result<Arc<FilterAst>> {
        if let Some(ast) = self.inner.lock().unwrap().get(raw) {
            return Ok(Arc::clone(ast));
        }

        let ast = Arc::new(parse_filter(raw)?);
        self.inner
            .lock()
            .unwrap()
            .put(raw.to_string(), Arc::clone(&ast));
        Ok(ast)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for FilterCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_SIZE)
    }
}

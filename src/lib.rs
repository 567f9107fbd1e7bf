//! # capdex - capability directory search core
//!
//! capdex is the read path of a capability directory for software agents:
//! an in-memory, bitmap-backed search core over immutable, revisioned
//! catalog entries (skills, retrieval backends, tool servers), kept
//! consistent by tailing the directory's append-only change log.
//!
//! ## Architecture
//!
//! - [`filter`] - The LDAP-style filter language: parser, AST, parse cache
//! - [`index`] - Postings, visibility bitmaps, document registry, evaluator
//! - [`search`] - Query planning, ranking, and cursor pagination
//! - [`store`] - Read-only client for the upstream relational store
//! - [`tailer`] - Snapshot load and forward-only change polling
//! - [`server`] - The HTTP surface (`/core/...`)
//!
//! ## Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use capdex::entry::Requester;
//! use capdex::index::SharedIndex;
//! use capdex::store::SqliteStore;
//!
//! let store = SqliteStore::open("capdex.db")?;
//! let index = Arc::new(SharedIndex::new());
//! capdex::tailer::load_snapshot(&store, &index)?;
//!
//! let snapshot = index.read();
//! let hit = snapshot.read("skill:acme:summarize", &Requester::anonymous());
//! ```
//!
//! ## Consistency model
//!
//! The registry, posting maps, visibility bitmaps, universe, and sort order
//! form one logical snapshot behind a reader-writer lock. Searches hold the
//! read side for the whole request; the change tailer is the single writer
//! and mutates one document at a time, never across I/O. Within a snapshot
//! every index invariant holds; across snapshots updates become visible in
//! change-log order.

pub mod config;
pub mod entry;
pub mod error;
pub mod filter;
pub mod index;
pub mod search;
pub mod server;
pub mod store;
pub mod tailer;

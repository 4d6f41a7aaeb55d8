//! A full-text search index for a collection of web pages: HTML ingestion,
//! Unicode-aware tokenization, a persistent inverted index with per-document
//! TF-IDF statistics, and a small query language supporting phrases, prefix
//! wildcards, required/excluded terms and fuzzy matching.
//!
//! [`Indexer`] is the single entry point a caller needs: it owns a
//! [`store::Store`] handle and exposes `index_page`, `search_for` and
//! `remove_entry`. Everything else in this crate is a module it composes.

pub mod error;
pub mod hooks;
pub mod html;
mod indexer;
pub mod model;
pub mod query;
pub mod store;
pub mod tokenizer;
pub mod url_cmp;

pub use error::{Error, Result};
pub use indexer::Indexer;
pub use model::{ExtractedPage, IndexInput, ResultSet, ResultRow, SearchOptions};

//! Transactional persistence of the three core relations: documents, terms
//! and postings.
//!
//! [`Store`] exposes the read-only operations the query engine needs.
//! Mutations go through [`WriteTxn`], obtained from [`Store::begin_write`],
//! which is the exclusive write critical section covering the bulk of
//! `indexPage` and all of `removeEntry`.

mod memory;
mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::Result;
use crate::model::{Document, NewDocument, Posting, Term};

#[async_trait]
pub trait Store: Send + Sync {
    /// Number of live documents (`N` in the invariants and glossary).
    async fn corpus_size(&self) -> Result<i64>;

    async fn find_by_url(&self, url: &str) -> Result<Option<Document>>;

    /// All live documents sharing `(checksum, pid)`, regardless of URL.
    async fn find_by_checksum_pid(&self, checksum: &str, pid: i64) -> Result<Vec<Document>>;

    async fn document(&self, id: i64) -> Result<Option<Document>>;

    async fn documents_by_ids(&self, ids: &[i64]) -> Result<Vec<Document>>;

    /// `(min id, max id)` over live documents, used to scale the sampling
    /// window of the vector-length refresh.
    async fn document_id_range(&self) -> Result<Option<(i64, i64)>>;

    /// Draw ids uniformly from `[min, max]` until `count` distinct live ids
    /// have been collected, or every live id has been tried.
    async fn sample_document_ids(&self, min: i64, max: i64, count: usize) -> Result<Vec<i64>>;

    async fn all_document_ids(&self) -> Result<Vec<i64>>;

    async fn postings_for_document(&self, doc_id: i64) -> Result<Vec<Posting>>;

    async fn exact_term(&self, term: &str) -> Result<Option<Term>>;

    /// Terms whose text matches a SQL `LIKE`-style `pattern` (`%` wildcard).
    async fn terms_like(&self, pattern: &str) -> Result<Vec<Term>>;

    /// Postings for any of the given term ids, across all documents.
    async fn postings_for_terms(&self, term_ids: &[i64]) -> Result<Vec<Posting>>;

    /// Begin the exclusive write critical section.
    async fn begin_write(&self) -> Result<Box<dyn WriteTxn + '_>>;
}

/// The write critical section: the bulk of `indexPage`, and all of
/// `removeEntry`.
///
/// Implementations must serialize all instances against each other (one
/// writer at a time). Dropping a `WriteTxn` without calling
/// [`WriteTxn::commit`] must discard every mutation made through it,
/// exactly like an uncommitted database transaction.
#[async_trait]
pub trait WriteTxn: Send {
    /// Insert a new document row, or update the existing row with this url.
    /// Returns the document's id either way.
    async fn upsert_document(&mut self, doc: &NewDocument) -> Result<i64>;

    /// Overwrite an existing document row's columns in place, keeping its
    /// id (used by the canonical-URL merge, which keeps the sibling's
    /// document identity but adopts the new page's url and other columns).
    async fn update_document(&mut self, doc_id: i64, doc: &NewDocument) -> Result<()>;

    async fn delete_document(&mut self, doc_id: i64) -> Result<()>;

    async fn postings_for_document(&mut self, doc_id: i64) -> Result<Vec<Posting>>;

    async fn delete_postings_for_document(&mut self, doc_id: i64) -> Result<()>;

    /// `documentFrequency := max(1, documentFrequency) - 1` for the given
    /// term id. Does not delete the term even if it reaches zero; call
    /// [`WriteTxn::purge_zero_frequency_terms`] once all decrements for this
    /// write are applied.
    async fn decrement_document_frequency(&mut self, term_id: i64) -> Result<()>;

    /// Insert every surface form in `terms` with `documentFrequency = 1`, or
    /// increment the existing row's frequency by 1. Returns each term's id.
    async fn upsert_terms(&mut self, terms: &[String]) -> Result<HashMap<String, i64>>;

    async fn purge_zero_frequency_terms(&mut self) -> Result<()>;

    async fn insert_postings(&mut self, doc_id: i64, postings: &[(i64, i32)]) -> Result<()>;

    /// Current `documentFrequency` for each term id that still exists,
    /// queried from inside the write transaction. Used by the vector-length
    /// refresh to compute each posting's IDF factor.
    async fn document_frequencies(&mut self, term_ids: &[i64]) -> Result<HashMap<i64, i32>>;

    async fn set_vector_length(&mut self, doc_id: i64, length: f64) -> Result<()>;

    /// `N` as seen from inside the write transaction (used for the IDF input
    /// to the vector-length refresh, captured once per `indexPage` call).
    async fn corpus_size(&mut self) -> Result<i64>;

    async fn document_id_range(&mut self) -> Result<Option<(i64, i64)>>;

    async fn sample_document_ids(&mut self, min: i64, max: i64, count: usize) -> Result<Vec<i64>>;

    async fn all_document_ids(&mut self) -> Result<Vec<i64>>;

    async fn commit(self: Box<Self>) -> Result<()>;
}

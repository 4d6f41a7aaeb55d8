use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{Store, WriteTxn};
use crate::error::Result;
use crate::model::{Document, NewDocument, Posting, Term};

#[derive(Default, Clone)]
struct Inner {
    documents: HashMap<i64, Document>,
    next_doc_id: i64,
    terms: HashMap<i64, Term>,
    term_ids_by_name: HashMap<String, i64>,
    next_term_id: i64,
    /// Keyed by `(doc_id, term_id)`, mirroring the `(pid, term_id)` primary
    /// key of `tl_search_index`.
    postings: HashMap<(i64, i64), i32>,
}

/// An in-process store used by the test suite and anywhere a real Postgres
/// instance isn't available. Trades true snapshot isolation for readers
/// during a write (the whole store is locked for the write's duration) in
/// exchange for a harness simple enough to reason about deterministically.
#[derive(Clone)]
pub struct InMemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        InMemoryStore {
            inner: Arc::new(Mutex::new(Inner {
                next_doc_id: 1,
                next_term_id: 1,
                ..Default::default()
            })),
        }
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sample_from(ids: &[i64], min: i64, max: i64, count: usize) -> Vec<i64> {
    if count == 0 || min > max || ids.is_empty() {
        return Vec::new();
    }
    let live: HashSet<i64> = ids.iter().copied().collect();
    let target = count.min(live.len());
    let mut found = HashSet::new();
    let mut rng = rand::rngs::OsRng;
    let mut attempts = 0;
    let max_attempts = target.saturating_mul(5).max(target).max(1);

    while found.len() < target && attempts < max_attempts {
        let candidate = rng.gen_range(min..=max);
        attempts += 1;
        if live.contains(&candidate) {
            found.insert(candidate);
        }
    }

    found.into_iter().collect()
}

#[async_trait]
impl Store for InMemoryStore {
    async fn corpus_size(&self) -> Result<i64> {
        Ok(self.inner.lock().await.documents.len() as i64)
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<Document>> {
        Ok(self
            .inner
            .lock()
            .await
            .documents
            .values()
            .find(|d| d.url == url)
            .cloned())
    }

    async fn find_by_checksum_pid(&self, checksum: &str, pid: i64) -> Result<Vec<Document>> {
        Ok(self
            .inner
            .lock()
            .await
            .documents
            .values()
            .filter(|d| d.checksum == checksum && d.pid == pid)
            .cloned()
            .collect())
    }

    async fn document(&self, id: i64) -> Result<Option<Document>> {
        Ok(self.inner.lock().await.documents.get(&id).cloned())
    }

    async fn documents_by_ids(&self, ids: &[i64]) -> Result<Vec<Document>> {
        let inner = self.inner.lock().await;
        Ok(ids.iter().filter_map(|id| inner.documents.get(id).cloned()).collect())
    }

    async fn document_id_range(&self) -> Result<Option<(i64, i64)>> {
        let inner = self.inner.lock().await;
        let min = inner.documents.keys().min().copied();
        let max = inner.documents.keys().max().copied();
        Ok(min.zip(max))
    }

    async fn sample_document_ids(&self, min: i64, max: i64, count: usize) -> Result<Vec<i64>> {
        let inner = self.inner.lock().await;
        let ids: Vec<i64> = inner.documents.keys().copied().collect();
        Ok(sample_from(&ids, min, max, count))
    }

    async fn all_document_ids(&self) -> Result<Vec<i64>> {
        Ok(self.inner.lock().await.documents.keys().copied().collect())
    }

    async fn postings_for_document(&self, doc_id: i64) -> Result<Vec<Posting>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .postings
            .iter()
            .filter(|((d, _), _)| *d == doc_id)
            .map(|((d, t), tf)| Posting {
                doc_id: *d,
                term_id: *t,
                relevance: *tf,
            })
            .collect())
    }

    async fn exact_term(&self, term: &str) -> Result<Option<Term>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .term_ids_by_name
            .get(term)
            .and_then(|id| inner.terms.get(id))
            .cloned())
    }

    async fn terms_like(&self, pattern: &str) -> Result<Vec<Term>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .terms
            .values()
            .filter(|t| like_match(pattern, &t.term))
            .cloned()
            .collect())
    }

    async fn postings_for_terms(&self, term_ids: &[i64]) -> Result<Vec<Posting>> {
        let wanted: HashSet<i64> = term_ids.iter().copied().collect();
        let inner = self.inner.lock().await;
        Ok(inner
            .postings
            .iter()
            .filter(|((_, t), _)| wanted.contains(t))
            .map(|((d, t), tf)| Posting {
                doc_id: *d,
                term_id: *t,
                relevance: *tf,
            })
            .collect())
    }

    async fn begin_write(&self) -> Result<Box<dyn WriteTxn + '_>> {
        let guard = Arc::clone(&self.inner).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryWriteTxn { guard, working }))
    }
}

/// Translate a SQL `LIKE` pattern (only `%` is used by this core) into a
/// simple substring/prefix/suffix match, since there is no SQL engine
/// backing this store.
fn like_match(pattern: &str, candidate: &str) -> bool {
    let leading = pattern.starts_with('%');
    let trailing = pattern.ends_with('%');
    let core = pattern.trim_matches('%');

    match (leading, trailing) {
        (true, true) => candidate.contains(core),
        (false, true) => candidate.starts_with(core),
        (true, false) => candidate.ends_with(core),
        (false, false) => candidate == core,
    }
}

/// Holds the store's mutex for the whole transaction (so writers serialize
/// against each other) but mutates a private `working` copy of `Inner`
/// rather than the shared state directly. `commit` is the only place that
/// copies `working` back into the guarded state; dropping the transaction
/// without committing just drops the working copy, leaving the store
/// untouched, the same as letting a Postgres transaction roll back.
struct MemoryWriteTxn {
    guard: OwnedMutexGuard<Inner>,
    working: Inner,
}

#[async_trait]
impl WriteTxn for MemoryWriteTxn {
    async fn upsert_document(&mut self, doc: &NewDocument) -> Result<i64> {
        let existing_id = self
            .working
            .documents
            .values()
            .find(|d| d.url == doc.url)
            .map(|d| d.id);

        let id = existing_id.unwrap_or_else(|| {
            let id = self.working.next_doc_id;
            self.working.next_doc_id += 1;
            id
        });

        let vector_length = existing_id
            .and_then(|id| self.working.documents.get(&id))
            .map(|d| d.vector_length)
            .unwrap_or(0.0);

        self.working.documents.insert(
            id,
            Document {
                id,
                pid: doc.pid,
                tstamp: Utc::now(),
                url: doc.url.clone(),
                title: doc.title.clone(),
                language: doc.language.clone(),
                protected: doc.protected,
                filesize: doc.filesize.clone(),
                groups: doc.groups.clone(),
                text: doc.text.clone(),
                checksum: doc.checksum.clone(),
                vector_length,
            },
        );

        Ok(id)
    }

    async fn update_document(&mut self, doc_id: i64, doc: &NewDocument) -> Result<()> {
        if let Some(existing) = self.working.documents.get_mut(&doc_id) {
            existing.pid = doc.pid;
            existing.url = doc.url.clone();
            existing.title = doc.title.clone();
            existing.language = doc.language.clone();
            existing.protected = doc.protected;
            existing.filesize = doc.filesize.clone();
            existing.groups = doc.groups.clone();
            existing.text = doc.text.clone();
            existing.checksum = doc.checksum.clone();
            existing.tstamp = Utc::now();
        }
        Ok(())
    }

    async fn delete_document(&mut self, doc_id: i64) -> Result<()> {
        self.working.documents.remove(&doc_id);
        Ok(())
    }

    async fn postings_for_document(&mut self, doc_id: i64) -> Result<Vec<Posting>> {
        Ok(self
            .working
            .postings
            .iter()
            .filter(|((d, _), _)| *d == doc_id)
            .map(|((d, t), tf)| Posting {
                doc_id: *d,
                term_id: *t,
                relevance: *tf,
            })
            .collect())
    }

    async fn delete_postings_for_document(&mut self, doc_id: i64) -> Result<()> {
        self.working.postings.retain(|(d, _), _| *d != doc_id);
        Ok(())
    }

    async fn decrement_document_frequency(&mut self, term_id: i64) -> Result<()> {
        if let Some(term) = self.working.terms.get_mut(&term_id) {
            term.document_frequency = (term.document_frequency.max(1)) - 1;
        }
        Ok(())
    }

    async fn upsert_terms(&mut self, terms: &[String]) -> Result<HashMap<String, i64>> {
        let mut ids = HashMap::with_capacity(terms.len());
        let unique: HashSet<&String> = terms.iter().collect();

        for term in unique {
            let id = if let Some(&id) = self.working.term_ids_by_name.get(term) {
                if let Some(row) = self.working.terms.get_mut(&id) {
                    row.document_frequency += 1;
                }
                id
            } else {
                let id = self.working.next_term_id;
                self.working.next_term_id += 1;
                self.working.term_ids_by_name.insert(term.clone(), id);
                self.working.terms.insert(
                    id,
                    Term {
                        id,
                        term: term.clone(),
                        document_frequency: 1,
                    },
                );
                id
            };
            ids.insert(term.clone(), id);
        }

        Ok(ids)
    }

    async fn purge_zero_frequency_terms(&mut self) -> Result<()> {
        let dead: Vec<i64> = self
            .working
            .terms
            .values()
            .filter(|t| t.document_frequency <= 0)
            .map(|t| t.id)
            .collect();

        for id in dead {
            if let Some(term) = self.working.terms.remove(&id) {
                self.working.term_ids_by_name.remove(&term.term);
            }
        }
        Ok(())
    }

    async fn insert_postings(&mut self, doc_id: i64, postings: &[(i64, i32)]) -> Result<()> {
        for (term_id, relevance) in postings {
            self.working.postings.insert((doc_id, *term_id), *relevance);
        }
        Ok(())
    }

    async fn document_frequencies(&mut self, term_ids: &[i64]) -> Result<HashMap<i64, i32>> {
        Ok(term_ids
            .iter()
            .filter_map(|id| self.working.terms.get(id).map(|t| (*id, t.document_frequency)))
            .collect())
    }

    async fn set_vector_length(&mut self, doc_id: i64, length: f64) -> Result<()> {
        if let Some(doc) = self.working.documents.get_mut(&doc_id) {
            doc.vector_length = length;
        }
        Ok(())
    }

    async fn corpus_size(&mut self) -> Result<i64> {
        Ok(self.working.documents.len() as i64)
    }

    async fn document_id_range(&mut self) -> Result<Option<(i64, i64)>> {
        let min = self.working.documents.keys().min().copied();
        let max = self.working.documents.keys().max().copied();
        Ok(min.zip(max))
    }

    async fn sample_document_ids(&mut self, min: i64, max: i64, count: usize) -> Result<Vec<i64>> {
        let ids: Vec<i64> = self.working.documents.keys().copied().collect();
        Ok(sample_from(&ids, min, max, count))
    }

    async fn all_document_ids(&mut self) -> Result<Vec<i64>> {
        Ok(self.working.documents.keys().copied().collect())
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        *self.guard = std::mem::take(&mut self.working);
        Ok(())
    }
}

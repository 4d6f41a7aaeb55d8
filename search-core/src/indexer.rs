//! Orchestrates indexing and removing a single page, keeping the
//! document/term/posting bookkeeping of the store consistent.
//!
//! This is the one piece of the core that touches every other module: it
//! runs [`crate::html::HtmlExtractor`] and [`crate::tokenizer::Tokenizer`]
//! over the raw page, runs [`crate::url_cmp`] to settle canonical-URL
//! collisions, and drives a [`crate::store::WriteTxn`] through the write
//! critical section.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::error::Result;
use crate::hooks::{HookRegistry, IndexHook, PageMetadata};
use crate::html::HtmlExtractor;
use crate::model::{IndexInput, NewDocument, ResultSet, SearchOptions};
use crate::query;
use crate::store::{Store, WriteTxn};
use crate::tokenizer::Tokenizer;
use crate::url_cmp;

/// Corpora at or below this size get every document's vector length
/// refreshed on every write; above it, only a sample is touched, since a
/// full scan on every write does not scale with corpus size.
const FULL_REFRESH_THRESHOLD: i64 = 200;

/// Target sample size for the vector-length refresh above
/// `FULL_REFRESH_THRESHOLD`, before scaling down by id sparsity.
const SAMPLE_TARGET: f64 = 100.0;

/// Owns a handle to the store and orchestrates indexing and search against
/// it. A plain value type: no process-wide singleton, no shared mutable
/// state beyond what `S` itself provides.
pub struct Indexer<S: Store> {
    store: S,
    hooks: HookRegistry,
    html: HtmlExtractor,
    tokenizer: Tokenizer,
}

impl<S: Store> Indexer<S> {
    pub fn new(store: S) -> Self {
        Indexer {
            store,
            hooks: HookRegistry::new(),
            html: HtmlExtractor::new(),
            tokenizer: Tokenizer::new(),
        }
    }

    /// Register an `indexPage` hook. Hooks run in registration order,
    /// synchronously, before the write lock is acquired.
    pub fn register_hook(&mut self, hook: Box<dyn IndexHook>) {
        self.hooks.register(hook);
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Index (or re-index) one page. Returns `true` iff a new document row
    /// was inserted; `false` if the page was already present or was merely
    /// re-linked to a more canonical URL.
    pub async fn index_page(&self, input: IndexInput) -> Result<bool> {
        let metadata = PageMetadata {
            url: &input.url,
            pid: input.pid,
            title: &input.title,
            language: &input.language,
            protected: input.protected,
            groups: &input.groups,
        };

        let extracted = self
            .html
            .extract(&input.content, &metadata, input.filesize.as_deref(), &self.hooks);
        let checksum = checksum_of(&extracted.text);

        // Early-out dedupe: this exact page, at this exact url, is already
        // indexed with identical content. Nothing to do.
        if let Some(existing) = self.store.find_by_url(&input.url).await? {
            if existing.checksum == checksum && existing.pid == input.pid {
                log::debug!("indexPage: {} unchanged, skipping", input.url);
                return Ok(false);
            }
        }

        let new_document = NewDocument {
            pid: input.pid,
            url: input.url.clone(),
            title: input.title.clone(),
            language: input.language.clone(),
            protected: input.protected,
            filesize: extracted.filesize.clone(),
            groups: input.groups.clone(),
            text: extracted.text.clone(),
            checksum: checksum.clone(),
        };

        // Everything from here on runs under the exclusive write lock.
        let mut txn = self.store.begin_write().await?;

        // Canonical-URL dedupe: at most one live sibling can share
        // (checksum, pid) at a different URL. If this page's url is the
        // more canonical one, adopt it on the sibling's existing row
        // rather than creating a second document for the same content.
        let siblings = self.store.find_by_checksum_pid(&checksum, input.pid).await?;
        if let Some(sibling) = siblings.iter().find(|d| d.url != input.url) {
            if url_cmp::compare_urls(&input.url, &sibling.url) == Ordering::Less {
                log::info!(
                    "indexPage: {} is more canonical than {}, relinking",
                    input.url,
                    sibling.url
                );
                txn.update_document(sibling.id, &new_document).await?;
            }
            txn.commit().await?;
            return Ok(false);
        }

        // Insert a new document row, or update the existing row at this url.
        let is_new = self.store.find_by_url(&input.url).await?.is_none();
        let doc_id = txn.upsert_document(&new_document).await?;

        // Tokenize the cleaned text, building term -> raw frequency.
        let words = self.tokenizer.tokenize(&extracted.text, &input.language)?;
        let mut tf: HashMap<String, i32> = HashMap::new();
        for word in words {
            *tf.entry(word).or_insert(0) += 1;
        }

        // Drop the document's old postings, floor-decrementing the
        // document frequency of every term they referenced.
        let old_postings = txn.postings_for_document(doc_id).await?;
        for posting in &old_postings {
            txn.decrement_document_frequency(posting.term_id).await?;
        }
        txn.delete_postings_for_document(doc_id).await?;

        // Upsert the new surface forms, then purge any term whose document
        // frequency reached zero along the way.
        let surface_forms: Vec<String> = tf.keys().cloned().collect();
        let term_ids = txn.upsert_terms(&surface_forms).await?;
        txn.purge_zero_frequency_terms().await?;

        // Bulk-insert the new postings.
        let postings: Vec<(i64, i32)> = tf
            .iter()
            .filter_map(|(term, count)| term_ids.get(term).map(|id| (*id, *count)))
            .collect();
        txn.insert_postings(doc_id, &postings).await?;

        // Refresh vector lengths for this document and a sample of the rest
        // of the corpus.
        self.refresh_vector_lengths(&mut *txn, doc_id).await?;

        txn.commit().await?;
        Ok(is_new)
    }

    /// Recomputes `vectorLength` for `doc_id` plus a sampled subset of the
    /// rest of the corpus, so ranking's cosine normalization stays close to
    /// current without a full-corpus recompute on every write.
    async fn refresh_vector_lengths(&self, txn: &mut dyn WriteTxn, doc_id: i64) -> Result<()> {
        let n = txn.corpus_size().await?;

        let mut targets = vec![doc_id];
        if let Some((lo, hi)) = txn.document_id_range().await? {
            if n <= FULL_REFRESH_THRESHOLD {
                targets.extend(txn.all_document_ids().await?.into_iter().filter(|id| *id != doc_id));
            } else {
                let span = (hi - lo) as f64;
                let sample_count = ((span * SAMPLE_TARGET) / n as f64).round().max(0.0) as usize;
                let sampled = txn.sample_document_ids(lo, hi, sample_count).await?;
                targets.extend(sampled.into_iter().filter(|id| *id != doc_id));
            }
        }

        // `doc_id` must succeed: the document just written needs an
        // up-to-date vector length. Every other target is a best-effort
        // sample; a failure there is logged and skipped rather than
        // propagated, so it can never roll back the write this call is
        // inside.
        for (i, target) in targets.into_iter().enumerate() {
            let outcome = Self::recompute_vector_length(txn, target, n).await;
            if i == 0 {
                outcome?;
            } else if let Err(err) = outcome {
                log::warn!("vector-length refresh: skipping sampled document {target}: {err}");
            }
        }

        Ok(())
    }

    async fn recompute_vector_length(txn: &mut dyn WriteTxn, target: i64, n: i64) -> Result<()> {
        let postings = txn.postings_for_document(target).await?;
        if postings.is_empty() {
            txn.set_vector_length(target, 0.0).await?;
            return Ok(());
        }

        let term_ids: Vec<i64> = postings.iter().map(|p| p.term_id).collect();
        let dfs = txn.document_frequencies(&term_ids).await?;

        let mut length_sq = 0.0;
        for posting in &postings {
            let df = dfs.get(&posting.term_id).copied().unwrap_or(1).max(1);
            let idf = ((n + 1) as f64 / df as f64).ln();
            let weight = (1.0 + (posting.relevance as f64).ln()) * idf;
            length_sq += weight * weight;
        }

        txn.set_vector_length(target, length_sq.sqrt()).await?;
        Ok(())
    }

    /// Parse, plan and rank a query against the store. `locale` drives word
    /// segmentation the same way it does during indexing.
    pub async fn search_for(&self, query: &str, locale: &str, options: SearchOptions) -> Result<ResultSet> {
        query::search_for(query, &options, locale, &self.store).await
    }

    /// Remove the live document at `url`, if any, floor-decrementing the
    /// document frequency of every term it referenced and purging any term
    /// that reaches zero. A no-op if no live document has this URL.
    pub async fn remove_entry(&self, url: &str) -> Result<()> {
        let Some(doc) = self.store.find_by_url(url).await? else {
            return Ok(());
        };

        let mut txn = self.store.begin_write().await?;

        let postings = txn.postings_for_document(doc.id).await?;
        for posting in &postings {
            txn.decrement_document_frequency(posting.term_id).await?;
        }
        txn.delete_postings_for_document(doc.id).await?;
        txn.delete_document(doc.id).await?;
        txn.purge_zero_frequency_terms().await?;

        txn.commit().await?;
        log::info!("removeEntry: removed {url}");
        Ok(())
    }
}

/// md5 of `text` after folding the two backtick-like characters the source
/// format normalizes to a plain apostrophe.
fn checksum_of(text: &str) -> String {
    let normalized: String = text
        .chars()
        .map(|c| if c == '`' || c == '\u{00B4}' { '\'' } else { c })
        .collect();
    format!("{:x}", md5::compute(normalized))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn page(url: &str, content: &str) -> IndexInput {
        IndexInput {
            url: url.to_string(),
            pid: 1,
            title: String::new(),
            language: "en".to_string(),
            protected: false,
            groups: String::new(),
            content: content.to_string(),
            filesize: None,
        }
    }

    #[tokio::test]
    async fn indexing_a_new_page_inserts_a_document() {
        let indexer = Indexer::new(InMemoryStore::new());
        let inserted = indexer
            .index_page(page("https://example.com/a", "<p>hello world</p>"))
            .await
            .unwrap();
        assert!(inserted);
        assert_eq!(indexer.store().corpus_size().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn reindexing_identical_content_is_a_no_op() {
        let indexer = Indexer::new(InMemoryStore::new());
        let p = page("https://example.com/a", "<p>hello world</p>");

        assert!(indexer.index_page(p.clone()).await.unwrap());
        assert!(!indexer.index_page(p).await.unwrap());
        assert_eq!(indexer.store().corpus_size().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn indexed_page_is_found_by_search() {
        let indexer = Indexer::new(InMemoryStore::new());
        indexer
            .index_page(page("https://example.com/a", "<p>the quick brown fox</p>"))
            .await
            .unwrap();

        let results = indexer
            .search_for("quick", "en", SearchOptions::default())
            .await
            .unwrap();

        assert_eq!(results.rows.len(), 1);
        assert!(results.rows[0].relevance > 0.0);
        assert_eq!(results.rows[0].document.url, "https://example.com/a");
    }

    #[tokio::test]
    async fn removed_entry_disappears_from_search() {
        let indexer = Indexer::new(InMemoryStore::new());
        indexer
            .index_page(page("https://example.com/a", "<p>the quick brown fox</p>"))
            .await
            .unwrap();

        indexer.remove_entry("https://example.com/a").await.unwrap();

        let results = indexer
            .search_for("quick", "en", SearchOptions::default())
            .await
            .unwrap();
        assert!(results.rows.is_empty());
        assert_eq!(indexer.store().corpus_size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn removing_a_shared_term_does_not_delete_it_for_survivors() {
        let indexer = Indexer::new(InMemoryStore::new());
        indexer
            .index_page(page("https://example.com/a", "<p>shared unique-to-a</p>"))
            .await
            .unwrap();
        indexer
            .index_page(page("https://example.com/b", "<p>shared unique-to-b</p>"))
            .await
            .unwrap();

        indexer.remove_entry("https://example.com/a").await.unwrap();

        let results = indexer
            .search_for("shared", "en", SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(results.rows.len(), 1);
        assert_eq!(results.rows[0].document.url, "https://example.com/b");
    }

    #[tokio::test]
    async fn more_canonical_url_wins_and_keeps_a_single_live_document() {
        let indexer = Indexer::new(InMemoryStore::new());
        indexer
            .index_page(page("https://example.com/a/page?ref=1", "<p>same content</p>"))
            .await
            .unwrap();

        let inserted = indexer
            .index_page(page("https://example.com/a/page", "<p>same content</p>"))
            .await
            .unwrap();

        assert!(!inserted);
        assert_eq!(indexer.store().corpus_size().await.unwrap(), 1);

        let doc = indexer
            .store()
            .find_by_url("https://example.com/a/page")
            .await
            .unwrap();
        assert!(doc.is_some());

        let stale = indexer
            .store()
            .find_by_url("https://example.com/a/page?ref=1")
            .await
            .unwrap();
        assert!(stale.is_none());
    }

    #[tokio::test]
    async fn less_canonical_url_does_not_relink() {
        let indexer = Indexer::new(InMemoryStore::new());
        indexer
            .index_page(page("https://example.com/a/page", "<p>same content</p>"))
            .await
            .unwrap();

        let inserted = indexer
            .index_page(page("https://example.com/a/page?ref=1", "<p>same content</p>"))
            .await
            .unwrap();

        assert!(!inserted);
        assert_eq!(indexer.store().corpus_size().await.unwrap(), 1);
        assert!(indexer
            .store()
            .find_by_url("https://example.com/a/page")
            .await
            .unwrap()
            .is_some());
    }
}

//! The query engine: QueryParser → QueryPlanner → Ranker.

mod parser;
mod planner;
mod ranker;

pub use parser::{ParseOptions, ParsedQuery, Phrase, QueryParser};
pub use planner::{Clause, ClauseKind, Plan, QueryPlanner};
pub use ranker::{Ranker, RankerOptions};

use crate::error::Result;
use crate::model::{ResultSet, SearchOptions};
use crate::store::Store;

/// Runs a query string end to end against `store`. This is the shape
/// `Indexer::search_for` delegates to.
pub async fn search_for(query: &str, options: &SearchOptions, locale: &str, store: &dyn Store) -> Result<ResultSet> {
    let parser = QueryParser::new();
    let parsed = parser.parse(
        query,
        ParseOptions {
            locale,
            min_length: options.min_length,
            fuzzy: options.fuzzy,
        },
    )?;

    let planner = QueryPlanner::new();
    let plan = planner.build(&parsed, options.or_search, store).await?;

    let ranker = Ranker::new();
    ranker
        .execute(
            &plan,
            store,
            &RankerOptions {
                pids: options.pids.clone(),
                limit: options.limit,
                offset: options.offset,
            },
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewDocument;
    use crate::store::InMemoryStore;

    async fn seed_corpus() -> InMemoryStore {
        let store = InMemoryStore::new();

        let docs = [
            ("https://example.com/d1", "the quick brown fox"),
            ("https://example.com/d2", "quick brown dogs"),
            ("https://example.com/d3", "lazy cat"),
        ];

        for (url, text) in docs {
            let words: Vec<String> = text.split_whitespace().map(|w| w.to_lowercase()).collect();
            let mut tf: std::collections::HashMap<String, i32> = std::collections::HashMap::new();
            for w in &words {
                *tf.entry(w.clone()).or_insert(0) += 1;
            }

            let mut txn = store.begin_write().await.unwrap();
            let doc_id = txn
                .upsert_document(&NewDocument {
                    pid: 1,
                    url: url.to_string(),
                    title: String::new(),
                    language: "en".to_string(),
                    protected: false,
                    filesize: "0.00".to_string(),
                    groups: String::new(),
                    text: text.to_string(),
                    checksum: format!("{:x}", md5::compute(text)),
                })
                .await
                .unwrap();

            let terms: Vec<String> = tf.keys().cloned().collect();
            let ids = txn.upsert_terms(&terms).await.unwrap();
            let postings: Vec<(i64, i32)> = tf.iter().map(|(t, c)| (ids[t], *c)).collect();
            txn.insert_postings(doc_id, &postings).await.unwrap();

            let n = txn.corpus_size().await.unwrap();
            let mut length_sq = 0.0;
            for (term, count) in &tf {
                let df = terms.len() as i32;
                let _ = term;
                let idf = ((n + 1) as f64 / df.max(1) as f64).ln();
                let w = (1.0 + (*count as f64).ln()) * idf;
                length_sq += w * w;
            }
            txn.set_vector_length(doc_id, length_sq.sqrt().max(f64::MIN_POSITIVE))
                .await
                .unwrap();

            txn.commit().await.unwrap();
        }

        store
    }

    #[tokio::test]
    async fn plain_query_excludes_unrelated_document() {
        let store = seed_corpus().await;
        let result = search_for("quick", &SearchOptions::default(), "en", &store)
            .await
            .unwrap();

        let urls: Vec<&str> = result.rows.iter().map(|r| r.document.url.as_str()).collect();
        assert!(urls.contains(&"https://example.com/d1"));
        assert!(urls.contains(&"https://example.com/d2"));
        assert!(!urls.contains(&"https://example.com/d3"));
    }

    #[tokio::test]
    async fn required_and_excluded_narrow_the_result() {
        let store = seed_corpus().await;
        let result = search_for("+quick -fox", &SearchOptions::default(), "en", &store)
            .await
            .unwrap();

        let urls: Vec<&str> = result.rows.iter().map(|r| r.document.url.as_str()).collect();
        assert_eq!(urls, vec!["https://example.com/d2"]);
    }

    #[tokio::test]
    async fn phrase_query_matches_only_the_adjacent_words() {
        let store = seed_corpus().await;
        let result = search_for("\"brown fox\"", &SearchOptions::default(), "en", &store)
            .await
            .unwrap();

        let urls: Vec<&str> = result.rows.iter().map(|r| r.document.url.as_str()).collect();
        assert_eq!(urls, vec!["https://example.com/d1"]);
    }

    #[tokio::test]
    async fn wildcard_query_matches_the_highlighted_term() {
        let store = seed_corpus().await;
        let result = search_for("qui*", &SearchOptions::default(), "en", &store)
            .await
            .unwrap();

        let urls: Vec<&str> = result.rows.iter().map(|r| r.document.url.as_str()).collect();
        assert_eq!(urls.len(), 2);
        assert!(urls.contains(&"https://example.com/d1"));
        assert!(urls.contains(&"https://example.com/d2"));
        for row in &result.rows {
            assert!(row.matches.contains(&"quick".to_string()));
        }
    }

    #[tokio::test]
    async fn fuzzy_query_matches_substring_of_dictionary_term() {
        let store = seed_corpus().await;

        let miss = search_for(
            "cats",
            &SearchOptions {
                fuzzy: true,
                ..Default::default()
            },
            "en",
            &store,
        )
        .await
        .unwrap();
        assert!(miss.rows.is_empty());

        let hit = search_for(
            "cat",
            &SearchOptions {
                fuzzy: true,
                ..Default::default()
            },
            "en",
            &store,
        )
        .await
        .unwrap();
        let urls: Vec<&str> = hit.rows.iter().map(|r| r.document.url.as_str()).collect();
        assert_eq!(urls, vec!["https://example.com/d3"]);
    }

    #[tokio::test]
    async fn blank_query_is_rejected() {
        let store = seed_corpus().await;
        let err = search_for("   ", &SearchOptions::default(), "en", &store)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::Error::EmptyQuery));
    }
}

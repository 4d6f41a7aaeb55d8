//! Integration tests for [`search_core::store::PostgresStore`], run against
//! a real Postgres container. Mirrors the in-memory-store coverage in
//! `query::tests` and `indexer::tests` to confirm the two backends agree.

mod common;

use search_core::model::{IndexInput, SearchOptions};
use search_core::store::PostgresStore;
use search_core::Indexer;

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
async fn indexes_and_finds_a_page() {
    let (_container, pool) = common::setup().await;
    let indexer = Indexer::new(PostgresStore::new(pool));

    let inserted = indexer
        .index_page(page("https://example.com/a", "<p>the quick brown fox</p>"))
        .await
        .unwrap();
    assert!(inserted);

    let results = indexer
        .search_for("quick", "en", SearchOptions::default())
        .await
        .unwrap();
    assert_eq!(results.rows.len(), 1);
    assert_eq!(results.rows[0].document.url, "https://example.com/a");
    assert!(results.rows[0].relevance > 0.0);
}

#[tokio::test]
async fn reindexing_identical_content_is_a_no_op() {
    let (_container, pool) = common::setup().await;
    let indexer = Indexer::new(PostgresStore::new(pool));

    let p = page("https://example.com/a", "<p>hello world</p>");
    assert!(indexer.index_page(p.clone()).await.unwrap());
    assert!(!indexer.index_page(p).await.unwrap());
}

#[tokio::test]
async fn removed_entry_disappears_from_search_and_store() {
    let (_container, pool) = common::setup().await;
    let indexer = Indexer::new(PostgresStore::new(pool));

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
    assert!(indexer
        .store()
        .find_by_url("https://example.com/a")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn reindexing_a_url_with_new_content_drops_stale_postings() {
    let (_container, pool) = common::setup().await;
    let indexer = Indexer::new(PostgresStore::new(pool));

    indexer
        .index_page(page("https://example.com/a", "<p>alpha beta</p>"))
        .await
        .unwrap();
    indexer
        .index_page(page("https://example.com/a", "<p>gamma delta</p>"))
        .await
        .unwrap();

    let stale = indexer
        .search_for("alpha", "en", SearchOptions::default())
        .await
        .unwrap();
    assert!(stale.rows.is_empty());

    let fresh = indexer
        .search_for("gamma", "en", SearchOptions::default())
        .await
        .unwrap();
    assert_eq!(fresh.rows.len(), 1);
}

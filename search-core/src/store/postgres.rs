use async_trait::async_trait;
use rand::Rng;
use sqlx::{PgPool, Row, postgres::PgRow};
use std::collections::{HashMap, HashSet};

use super::{Store, WriteTxn};
use crate::error::Result;
use crate::model::{Document, NewDocument, Posting, Term};

/// Fixed key for the Postgres session-level advisory lock backing the
/// write critical section. A single key is enough since the lock always
/// covers all three relations together.
const WRITE_LOCK_KEY: i64 = 0x5345_4152_4348; // "SEARCH" read as hex digits

/// Upper bound on attempts when drawing sample document ids, to avoid
/// spinning forever over a sparse id range (many deleted documents).
const SAMPLE_ATTEMPT_FACTOR: usize = 5;

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        PostgresStore { pool }
    }
}

fn row_to_document(row: &PgRow) -> Document {
    Document {
        id: row.get("id"),
        pid: row.get("pid"),
        tstamp: row.get("tstamp"),
        url: row.get("url"),
        title: row.get("title"),
        language: row.get("language"),
        protected: row.get("protected"),
        filesize: row.get("filesize"),
        groups: row.get("groups"),
        text: row.get("text"),
        checksum: row.get("checksum"),
        vector_length: row.get("vector_length"),
    }
}

fn row_to_term(row: &PgRow) -> Term {
    Term {
        id: row.get("id"),
        term: row.get("term"),
        document_frequency: row.get("document_frequency"),
    }
}

/// Draw `count` distinct ids uniformly from `[min, max]`, keeping only those
/// that `exists` reports as live. Correctness never depends on which ids
/// come back, only that the pool they're drawn from is unpredictable, so
/// this uses the OS RNG rather than a seeded one.
async fn sample_ids<F, Fut>(min: i64, max: i64, count: usize, exists: F) -> Result<Vec<i64>>
where
    F: Fn(Vec<i64>) -> Fut,
    Fut: std::future::Future<Output = Result<Vec<i64>>>,
{
    if count == 0 || min > max {
        return Ok(Vec::new());
    }

    let span = (max - min + 1) as usize;
    let target = count.min(span);
    let max_attempts = target.saturating_mul(SAMPLE_ATTEMPT_FACTOR).max(target);

    let mut found = HashSet::new();
    let mut attempts = 0;
    let mut rng = rand::rngs::OsRng;

    while found.len() < target && attempts < max_attempts {
        let batch: Vec<i64> = (0..(target - found.len()).max(1))
            .map(|_| rng.gen_range(min..=max))
            .filter(|id| !found.contains(id))
            .collect();
        attempts += batch.len().max(1);

        if batch.is_empty() {
            continue;
        }

        for id in exists(batch).await? {
            found.insert(id);
        }
    }

    Ok(found.into_iter().collect())
}

#[async_trait]
impl Store for PostgresStore {
    async fn corpus_size(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tl_search")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM tl_search WHERE url = $1")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_document))
    }

    async fn find_by_checksum_pid(&self, checksum: &str, pid: i64) -> Result<Vec<Document>> {
        let rows = sqlx::query("SELECT * FROM tl_search WHERE checksum = $1 AND pid = $2")
            .bind(checksum)
            .bind(pid)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_document).collect())
    }

    async fn document(&self, id: i64) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM tl_search WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_document))
    }

    async fn documents_by_ids(&self, ids: &[i64]) -> Result<Vec<Document>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query("SELECT * FROM tl_search WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_document).collect())
    }

    async fn document_id_range(&self) -> Result<Option<(i64, i64)>> {
        let row = sqlx::query("SELECT MIN(id) AS lo, MAX(id) AS hi FROM tl_search")
            .fetch_one(&self.pool)
            .await?;
        let lo: Option<i64> = row.get("lo");
        let hi: Option<i64> = row.get("hi");
        Ok(lo.zip(hi))
    }

    async fn sample_document_ids(&self, min: i64, max: i64, count: usize) -> Result<Vec<i64>> {
        sample_ids(min, max, count, |batch| async move {
            let rows = sqlx::query("SELECT id FROM tl_search WHERE id = ANY($1)")
                .bind(&batch)
                .fetch_all(&self.pool)
                .await?;
            Ok(rows.iter().map(|r| r.get::<i64, _>("id")).collect())
        })
        .await
    }

    async fn all_document_ids(&self) -> Result<Vec<i64>> {
        let rows = sqlx::query("SELECT id FROM tl_search")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|r| r.get("id")).collect())
    }

    async fn postings_for_document(&self, doc_id: i64) -> Result<Vec<Posting>> {
        let rows = sqlx::query("SELECT pid, term_id, relevance FROM tl_search_index WHERE pid = $1")
            .bind(doc_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|r| Posting {
                doc_id: r.get("pid"),
                term_id: r.get("term_id"),
                relevance: r.get("relevance"),
            })
            .collect())
    }

    async fn exact_term(&self, term: &str) -> Result<Option<Term>> {
        let row = sqlx::query("SELECT * FROM tl_search_term WHERE term = $1")
            .bind(term)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_term))
    }

    async fn terms_like(&self, pattern: &str) -> Result<Vec<Term>> {
        let rows = sqlx::query("SELECT * FROM tl_search_term WHERE term LIKE $1")
            .bind(pattern)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_term).collect())
    }

    async fn postings_for_terms(&self, term_ids: &[i64]) -> Result<Vec<Posting>> {
        if term_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            "SELECT pid, term_id, relevance FROM tl_search_index WHERE term_id = ANY($1)",
        )
        .bind(term_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| Posting {
                doc_id: r.get("pid"),
                term_id: r.get("term_id"),
                relevance: r.get("relevance"),
            })
            .collect())
    }

    async fn begin_write(&self) -> Result<Box<dyn WriteTxn + '_>> {
        let mut tx = self.pool.begin().await?;
        // Held until commit/rollback: serializes writers across every
        // process sharing this database.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(WRITE_LOCK_KEY)
            .execute(&mut *tx)
            .await?;
        Ok(Box::new(PgWriteTxn { tx }))
    }
}

struct PgWriteTxn {
    tx: sqlx::Transaction<'static, sqlx::Postgres>,
}

#[async_trait]
impl WriteTxn for PgWriteTxn {
    async fn upsert_document(&mut self, doc: &NewDocument) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO tl_search (pid, url, title, language, protected, filesize, groups, text, checksum, tstamp)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now())
            ON CONFLICT (url) DO UPDATE SET
                pid = EXCLUDED.pid,
                title = EXCLUDED.title,
                language = EXCLUDED.language,
                protected = EXCLUDED.protected,
                filesize = EXCLUDED.filesize,
                groups = EXCLUDED.groups,
                text = EXCLUDED.text,
                checksum = EXCLUDED.checksum,
                tstamp = now()
            RETURNING id
            "#,
        )
        .bind(doc.pid)
        .bind(&doc.url)
        .bind(&doc.title)
        .bind(&doc.language)
        .bind(doc.protected)
        .bind(&doc.filesize)
        .bind(&doc.groups)
        .bind(&doc.text)
        .bind(&doc.checksum)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(row.get("id"))
    }

    async fn update_document(&mut self, doc_id: i64, doc: &NewDocument) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE tl_search SET
                pid = $1,
                url = $2,
                title = $3,
                language = $4,
                protected = $5,
                filesize = $6,
                groups = $7,
                text = $8,
                checksum = $9,
                tstamp = now()
            WHERE id = $10
            "#,
        )
        .bind(doc.pid)
        .bind(&doc.url)
        .bind(&doc.title)
        .bind(&doc.language)
        .bind(doc.protected)
        .bind(&doc.filesize)
        .bind(&doc.groups)
        .bind(&doc.text)
        .bind(&doc.checksum)
        .bind(doc_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_document(&mut self, doc_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM tl_search WHERE id = $1")
            .bind(doc_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn postings_for_document(&mut self, doc_id: i64) -> Result<Vec<Posting>> {
        let rows = sqlx::query("SELECT pid, term_id, relevance FROM tl_search_index WHERE pid = $1")
            .bind(doc_id)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows
            .iter()
            .map(|r| Posting {
                doc_id: r.get("pid"),
                term_id: r.get("term_id"),
                relevance: r.get("relevance"),
            })
            .collect())
    }

    async fn delete_postings_for_document(&mut self, doc_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM tl_search_index WHERE pid = $1")
            .bind(doc_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn decrement_document_frequency(&mut self, term_id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE tl_search_term SET document_frequency = GREATEST(1, document_frequency) - 1 WHERE id = $1",
        )
        .bind(term_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn upsert_terms(&mut self, terms: &[String]) -> Result<HashMap<String, i64>> {
        let mut ids = HashMap::with_capacity(terms.len());
        let unique: HashSet<&String> = terms.iter().collect();

        for term in unique {
            let row = sqlx::query(
                r#"
                INSERT INTO tl_search_term (term, document_frequency)
                VALUES ($1, 1)
                ON CONFLICT (term) DO UPDATE SET
                    document_frequency = tl_search_term.document_frequency + 1
                RETURNING id
                "#,
            )
            .bind(term)
            .fetch_one(&mut *self.tx)
            .await?;

            ids.insert(term.clone(), row.get("id"));
        }

        Ok(ids)
    }

    async fn purge_zero_frequency_terms(&mut self) -> Result<()> {
        sqlx::query("DELETE FROM tl_search_term WHERE document_frequency <= 0")
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_postings(&mut self, doc_id: i64, postings: &[(i64, i32)]) -> Result<()> {
        for (term_id, relevance) in postings {
            sqlx::query(
                r#"
                INSERT INTO tl_search_index (pid, term_id, relevance)
                VALUES ($1, $2, $3)
                ON CONFLICT (pid, term_id) DO UPDATE SET relevance = EXCLUDED.relevance
                "#,
            )
            .bind(doc_id)
            .bind(term_id)
            .bind(relevance)
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }

    async fn document_frequencies(&mut self, term_ids: &[i64]) -> Result<HashMap<i64, i32>> {
        if term_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query("SELECT id, document_frequency FROM tl_search_term WHERE id = ANY($1)")
            .bind(term_ids)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows
            .iter()
            .map(|r| (r.get::<i64, _>("id"), r.get::<i32, _>("document_frequency")))
            .collect())
    }

    async fn set_vector_length(&mut self, doc_id: i64, length: f64) -> Result<()> {
        sqlx::query("UPDATE tl_search SET vector_length = $1 WHERE id = $2")
            .bind(length)
            .bind(doc_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn corpus_size(&mut self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tl_search")
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(count)
    }

    async fn document_id_range(&mut self) -> Result<Option<(i64, i64)>> {
        let row = sqlx::query("SELECT MIN(id) AS lo, MAX(id) AS hi FROM tl_search")
            .fetch_one(&mut *self.tx)
            .await?;
        let lo: Option<i64> = row.get("lo");
        let hi: Option<i64> = row.get("hi");
        Ok(lo.zip(hi))
    }

    async fn sample_document_ids(&mut self, min: i64, max: i64, count: usize) -> Result<Vec<i64>> {
        if count == 0 || min > max {
            return Ok(Vec::new());
        }

        let span = (max - min + 1) as usize;
        let target = count.min(span);
        let max_attempts = target.saturating_mul(SAMPLE_ATTEMPT_FACTOR).max(target);

        let mut found = HashSet::new();
        let mut attempts = 0;
        let mut rng = rand::rngs::OsRng;

        while found.len() < target && attempts < max_attempts {
            let batch: Vec<i64> = (0..(target - found.len()).max(1))
                .map(|_| rng.gen_range(min..=max))
                .collect();
            attempts += batch.len();

            let rows = sqlx::query("SELECT id FROM tl_search WHERE id = ANY($1)")
                .bind(&batch)
                .fetch_all(&mut *self.tx)
                .await?;
            for row in rows {
                found.insert(row.get::<i64, _>("id"));
            }
        }

        Ok(found.into_iter().collect())
    }

    async fn all_document_ids(&mut self) -> Result<Vec<i64>> {
        let rows = sqlx::query("SELECT id FROM tl_search")
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows.iter().map(|r| r.get("id")).collect())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

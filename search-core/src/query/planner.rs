//! Turns a [`ParsedQuery`] into per-clause match predicates, their
//! IDF/weight inputs, and the clause bookkeeping the
//! [`super::ranker::Ranker`] needs to score and filter candidate documents.

use std::collections::HashSet;

use crate::error::Result;
use crate::store::Store;

use super::parser::{ParsedQuery, Phrase};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClauseKind {
    Wildcard,
    Plain,
    Required,
    Excluded,
    /// A word extracted from a phrase, kept for recall against the
    /// dictionary (the phrase's own AND/OR combination is a separate regex
    /// filter applied later against the document text).
    PhraseWord,
}

impl ClauseKind {
    /// Whether, in a non-`orSearch` query, a candidate document must carry
    /// at least one matching posting for a clause of this kind.
    /// `Required` clauses are always mandatory, regardless of `or_search`.
    pub fn mandatory(self, or_search: bool) -> bool {
        match self {
            ClauseKind::Required => true,
            ClauseKind::Plain | ClauseKind::PhraseWord => !or_search,
            ClauseKind::Wildcard | ClauseKind::Excluded => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MatchedTerm {
    pub term_id: i64,
    pub term: String,
}

#[derive(Debug, Clone)]
pub struct Clause {
    pub kind: ClauseKind,
    /// The literal term, or the `%`-rewritten wildcard pattern.
    pub label: String,
    pub matches: Vec<MatchedTerm>,
    /// `s_i`: the IDF of the matched term for exact clauses, or
    /// `log((N+1)/wildcardCount_i)` for wildcard clauses.
    pub weight: f64,
}

#[derive(Debug, Clone)]
pub struct Plan {
    pub clauses: Vec<Clause>,
    pub active: usize,
    pub phrases: Vec<Phrase>,
    pub or_search: bool,
    /// `N`, the corpus size observed while building the plan.
    pub corpus_size: i64,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct QueryPlanner;

impl QueryPlanner {
    pub fn new() -> Self {
        QueryPlanner
    }

    pub async fn build(&self, parsed: &ParsedQuery, or_search: bool, store: &dyn Store) -> Result<Plan> {
        let n = store.corpus_size().await?;
        let mut clauses = Vec::new();

        for pattern in &parsed.wildcards {
            clauses.push(self.wildcard_clause(pattern, store, n).await?);
        }
        for term in &parsed.plains {
            clauses.push(self.exact_clause(ClauseKind::Plain, term, store, n).await?);
        }
        for term in &parsed.required {
            clauses.push(self.exact_clause(ClauseKind::Required, term, store, n).await?);
        }
        for term in &parsed.excluded {
            clauses.push(self.exact_clause(ClauseKind::Excluded, term, store, n).await?);
        }
        for phrase in &parsed.phrases {
            for word in &phrase.words {
                clauses.push(self.exact_clause(ClauseKind::PhraseWord, word, store, n).await?);
            }
        }

        let excluded_count = parsed.excluded.len();
        let active = clauses.len().saturating_sub(excluded_count).max(1);

        Ok(Plan {
            clauses,
            active,
            phrases: parsed.phrases.clone(),
            or_search,
            corpus_size: n,
        })
    }

    async fn wildcard_clause(&self, pattern: &str, store: &dyn Store, n: i64) -> Result<Clause> {
        let terms = store.terms_like(pattern).await?;
        let matches: Vec<MatchedTerm> = terms
            .iter()
            .map(|t| MatchedTerm {
                term_id: t.id,
                term: t.term.clone(),
            })
            .collect();

        let wildcard_count = if matches.is_empty() {
            0
        } else {
            let term_ids: Vec<i64> = matches.iter().map(|m| m.term_id).collect();
            let postings = store.postings_for_terms(&term_ids).await?;
            postings
                .iter()
                .map(|p| p.doc_id)
                .collect::<HashSet<_>>()
                .len()
        };

        Ok(Clause {
            kind: ClauseKind::Wildcard,
            label: pattern.to_string(),
            matches,
            weight: idf(n, wildcard_count as i32),
        })
    }

    async fn exact_clause(&self, kind: ClauseKind, term: &str, store: &dyn Store, n: i64) -> Result<Clause> {
        let found = store.exact_term(term).await?;
        let (matches, weight) = match found {
            Some(t) => (
                vec![MatchedTerm {
                    term_id: t.id,
                    term: t.term.clone(),
                }],
                idf(n, t.document_frequency),
            ),
            None => (Vec::new(), 0.0),
        };

        Ok(Clause {
            kind,
            label: term.to_string(),
            matches,
            weight,
        })
    }
}

/// `log((N+1)/max(1, df))`.
fn idf(n: i64, df: i32) -> f64 {
    ((n + 1) as f64 / df.max(1) as f64).ln()
}

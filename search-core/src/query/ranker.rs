//! Executes a [`Plan`] against the [`Store`], computes cosine-similarity
//! relevance, applies the mandatory/phrase/pid filters, and attaches the
//! highlight set to each surviving row.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::error::Result;
use crate::model::{ResultRow, ResultSet};
use crate::store::Store;

use super::planner::{Clause, ClauseKind, Plan};

#[derive(Debug, Clone, Default)]
pub struct RankerOptions {
    pub pids: Vec<i64>,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Ranker;

impl Ranker {
    pub fn new() -> Self {
        Ranker
    }

    pub async fn execute(&self, plan: &Plan, store: &dyn Store, options: &RankerOptions) -> Result<ResultSet> {
        let term_ids: Vec<i64> = plan
            .clauses
            .iter()
            .flat_map(|c| c.matches.iter().map(|m| m.term_id))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        if term_ids.is_empty() {
            return Ok(ResultSet::default());
        }

        let postings = store.postings_for_terms(&term_ids).await?;

        let mut per_doc_term: HashMap<i64, HashMap<i64, i64>> = HashMap::new();
        for posting in &postings {
            *per_doc_term
                .entry(posting.doc_id)
                .or_default()
                .entry(posting.term_id)
                .or_insert(0) += posting.relevance as i64;
        }

        let candidate_ids: Vec<i64> = per_doc_term
            .iter()
            .filter(|(_, terms)| self.survives_having(plan, terms))
            .map(|(&doc_id, _)| doc_id)
            .collect();

        if candidate_ids.is_empty() {
            return Ok(ResultSet::default());
        }

        let docs = store.documents_by_ids(&candidate_ids).await?;

        let mut rows = Vec::with_capacity(docs.len());
        for doc in docs {
            let doc_terms = match per_doc_term.get(&doc.id) {
                Some(terms) => terms,
                None => continue,
            };

            if !self.passes_phrase_filter(plan, &doc.text) {
                continue;
            }
            if !options.pids.is_empty() && !options.pids.contains(&doc.pid) {
                continue;
            }

            let relevance = self.relevance(plan, doc_terms, doc.vector_length);
            let matches = self.highlight(plan, doc_terms);

            rows.push(ResultRow {
                document: doc,
                relevance,
                matches,
            });
        }

        rows.sort_by(|a, b| b.relevance.partial_cmp(&a.relevance).unwrap_or(Ordering::Equal));

        let offset = options.offset.min(rows.len());
        let rows = if options.limit > 0 {
            let end = (offset + options.limit).min(rows.len());
            rows[offset..end].to_vec()
        } else {
            rows[offset..].to_vec()
        };

        Ok(ResultSet { rows })
    }

    fn clause_tf(&self, clause: &Clause, doc_terms: &HashMap<i64, i64>) -> i64 {
        clause
            .matches
            .iter()
            .map(|m| doc_terms.get(&m.term_id).copied().unwrap_or(0))
            .sum()
    }

    /// Required and plain clauses need at least one matching posting;
    /// excluded clauses must have none.
    fn survives_having(&self, plan: &Plan, doc_terms: &HashMap<i64, i64>) -> bool {
        let mut any_positive = false;

        for clause in &plan.clauses {
            let tf = self.clause_tf(clause, doc_terms);

            if clause.kind == ClauseKind::Excluded {
                if tf > 0 {
                    return false;
                }
                continue;
            }

            if tf > 0 {
                any_positive = true;
            } else if clause.kind.mandatory(plan.or_search) {
                return false;
            }
        }

        any_positive
    }

    /// Phrase patterns against `document.text`, AND-combined unless
    /// `orSearch`, in which case OR-combined. No phrases is vacuously true.
    fn passes_phrase_filter(&self, plan: &Plan, text: &str) -> bool {
        if plan.phrases.is_empty() {
            return true;
        }

        if plan.or_search {
            plan.phrases.iter().any(|p| p.pattern.is_match(text))
        } else {
            plan.phrases.iter().all(|p| p.pattern.is_match(text))
        }
    }

    /// Cosine-similarity relevance for one candidate document.
    fn relevance(&self, plan: &Plan, doc_terms: &HashMap<i64, i64>, vector_length: f64) -> f64 {
        let mut similarity = 0.0;
        for clause in &plan.clauses {
            if clause.kind == ClauseKind::Excluded {
                continue;
            }
            let tf = self.clause_tf(clause, doc_terms);
            if tf <= 0 {
                continue;
            }
            similarity += (1.0 + (tf as f64).ln()) * clause.weight.powi(2);
        }
        similarity /= plan.active as f64;

        let relevance = if vector_length > 0.0 {
            similarity / vector_length
        } else {
            0.0
        };

        if relevance == 0.0 {
            f64::MIN_POSITIVE
        } else {
            relevance
        }
    }

    /// Union of matched surface forms: plain/required/wildcard terms
    /// actually present in this document, plus any phrase whose every word
    /// is in that matched-terms set.
    fn highlight(&self, plan: &Plan, doc_terms: &HashMap<i64, i64>) -> Vec<String> {
        let mut matched_terms = HashSet::new();
        let mut seen = HashSet::new();
        let mut highlights = Vec::new();

        for clause in &plan.clauses {
            if clause.kind == ClauseKind::Excluded {
                continue;
            }
            for m in &clause.matches {
                if doc_terms.get(&m.term_id).copied().unwrap_or(0) > 0 {
                    matched_terms.insert(m.term.clone());
                    if clause.kind != ClauseKind::PhraseWord && seen.insert(m.term.clone()) {
                        highlights.push(m.term.clone());
                    }
                }
            }
        }

        for phrase in &plan.phrases {
            if phrase.words.iter().all(|w| matched_terms.contains(w)) {
                let joined = phrase.words.join(" ");
                if seen.insert(joined.clone()) {
                    highlights.push(joined);
                }
            }
        }

        highlights
    }
}

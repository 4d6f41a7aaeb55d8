use chrono::{DateTime, Utc};

/// Raw input to [`crate::indexer::Indexer::index_page`].
///
/// Mirrors the external `data` shape: everything the caller already knows
/// about the page being indexed, plus the raw HTML `content` to extract text
/// from.
#[derive(Debug, Clone)]
pub struct IndexInput {
    pub url: String,
    pub pid: i64,
    pub title: String,
    pub language: String,
    pub protected: bool,
    pub groups: String,
    pub content: String,
    pub filesize: Option<String>,
}

/// The result of running [`crate::html::HtmlExtractor`] over a page's raw HTML.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedPage {
    pub text: String,
    pub description: String,
    pub keywords: String,
    pub filesize: String,
}

/// A row of the `tl_search` relation: one live document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: i64,
    pub pid: i64,
    pub tstamp: DateTime<Utc>,
    pub url: String,
    pub title: String,
    pub language: String,
    pub protected: bool,
    pub filesize: String,
    pub groups: String,
    pub text: String,
    pub checksum: String,
    pub vector_length: f64,
}

/// Values needed to insert or update a `tl_search` row. The id is assigned by
/// the store.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub pid: i64,
    pub url: String,
    pub title: String,
    pub language: String,
    pub protected: bool,
    pub filesize: String,
    pub groups: String,
    pub text: String,
    pub checksum: String,
}

/// A row of the `tl_search_term` relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    pub id: i64,
    pub term: String,
    pub document_frequency: i32,
}

/// A row of the `tl_search_index` relation. `doc_id` corresponds to the
/// column named `pid` in the persistent schema: it references
/// `tl_search.id`, not `tl_search.pid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Posting {
    pub doc_id: i64,
    pub term_id: i64,
    pub relevance: i32,
}

/// One ranked search result: the document plus its computed relevance and
/// the surface forms that matched, for highlighting.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub document: Document,
    pub relevance: f64,
    pub matches: Vec<String>,
}

/// Options accepted by [`crate::indexer::Indexer::search_for`].
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub or_search: bool,
    pub pids: Vec<i64>,
    pub limit: usize,
    pub offset: usize,
    pub fuzzy: bool,
    pub min_length: usize,
}

/// A full result set: the ranked rows plus whatever paging was applied.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    pub rows: Vec<ResultRow>,
}

use thiserror::Error;

/// Errors surfaced by the search core to its caller.
///
/// `MalformedHtml` conditions (unbalanced `<script>`/`<style>`/`indexer::stop`
/// regions) are recovered locally by [`crate::html`] and never reach this
/// enum; they are logged at `warn` level instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("query is empty after decoding")]
    EmptyQuery,

    #[error("store operation failed: {0}")]
    StoreFailure(#[from] sqlx::Error),

    #[error("no word segmenter is available for locale `{0}`")]
    UnknownLocale(String),
}

pub type Result<T> = std::result::Result<T, Error>;

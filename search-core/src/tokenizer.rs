//! Locale-aware word segmentation into lowercase surface forms,
//! order-preserving, duplicates retained so the caller can count term
//! frequencies.

use unicode_segmentation::UnicodeSegmentation;

use crate::error::{Error, Result};

/// Segments `text` into words according to `locale`.
///
/// The word-break algorithm itself (Unicode UAX #29) is not parameterized by
/// locale upstream; `locale` is validated and threaded through so a future
/// locale-specific breaker can be swapped in without changing callers.
#[derive(Debug, Default, Clone, Copy)]
pub struct Tokenizer;

impl Tokenizer {
    pub fn new() -> Self {
        Tokenizer
    }

    pub fn tokenize(&self, text: &str, locale: &str) -> Result<Vec<String>> {
        validate_locale(locale)?;

        Ok(text
            .unicode_words()
            .map(|w| w.to_lowercase())
            .collect())
    }
}

/// A locale tag must be non-empty and look like a BCP-47 primary subtag; the
/// Unicode word breaker has nothing further to configure per-locale, so this
/// is the full extent of what "no segmenter for this locale" can mean here.
fn validate_locale(locale: &str) -> Result<()> {
    let ok = !locale.is_empty()
        && locale
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if ok {
        Ok(())
    } else {
        Err(Error::UnknownLocale(locale.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_preserves_order() {
        let tokenizer = Tokenizer::new();
        let words = tokenizer.tokenize("The Quick Brown Fox", "en").unwrap();
        assert_eq!(words, vec!["the", "quick", "brown", "fox"]);
    }

    #[test]
    fn retains_duplicates() {
        let tokenizer = Tokenizer::new();
        let words = tokenizer.tokenize("cat cat dog", "en").unwrap();
        assert_eq!(words, vec!["cat", "cat", "dog"]);
    }

    #[test]
    fn drops_punctuation_and_whitespace() {
        let tokenizer = Tokenizer::new();
        let words = tokenizer.tokenize("Hi, there! Isn't it nice?", "en").unwrap();
        assert_eq!(words, vec!["hi", "there", "isn't", "it", "nice"]);
    }

    #[test]
    fn rejects_blank_locale() {
        let tokenizer = Tokenizer::new();
        let err = tokenizer.tokenize("hello", "").unwrap_err();
        assert!(matches!(err, Error::UnknownLocale(_)));
    }
}

//! Turns a raw query string into phrase/plain/wildcard/required/excluded
//! clause lists.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};
use crate::tokenizer::Tokenizer;

static CHUNK: Lazy<Regex> = Lazy::new(|| Regex::new(r#""([^"]*)"|(\S+)"#).unwrap());

/// A quoted clause: its constituent words (re-tokenized, for recall against
/// the dictionary) and the regex used to verify the phrase against
/// `document.text` literally.
#[derive(Debug, Clone)]
pub struct Phrase {
    pub words: Vec<String>,
    pub pattern: Regex,
}

impl PartialEq for Phrase {
    fn eq(&self, other: &Self) -> bool {
        self.words == other.words && self.pattern.as_str() == other.pattern.as_str()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedQuery {
    pub phrases: Vec<Phrase>,
    pub plains: Vec<String>,
    /// SQL `LIKE`-style patterns (`*` already rewritten to `%`).
    pub wildcards: Vec<String>,
    pub required: Vec<String>,
    pub excluded: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions<'a> {
    pub locale: &'a str,
    pub min_length: usize,
    pub fuzzy: bool,
}

pub struct QueryParser {
    tokenizer: Tokenizer,
}

impl Default for QueryParser {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryParser {
    pub fn new() -> Self {
        QueryParser {
            tokenizer: Tokenizer::new(),
        }
    }

    pub fn parse(&self, query: &str, options: ParseOptions<'_>) -> Result<ParsedQuery> {
        let cleaned = query.trim();
        if cleaned.is_empty() {
            return Err(Error::EmptyQuery);
        }

        let mut parsed = ParsedQuery::default();

        for caps in CHUNK.captures_iter(cleaned) {
            if let Some(phrase) = caps.get(1) {
                self.push_phrase(&mut parsed, phrase.as_str(), options.locale)?;
                continue;
            }

            let atom = caps.get(2).expect("chunk regex always matches one arm").as_str();
            self.classify_atom(&mut parsed, atom, options)?;
        }

        dedup_in_place(&mut parsed.plains);
        dedup_in_place(&mut parsed.wildcards);
        dedup_in_place(&mut parsed.required);
        dedup_in_place(&mut parsed.excluded);

        if options.fuzzy {
            for term in parsed.plains.drain(..).collect::<Vec<_>>() {
                parsed.wildcards.push(format!("%{term}%"));
            }
            dedup_in_place(&mut parsed.wildcards);
        }

        Ok(parsed)
    }

    fn classify_atom(&self, parsed: &mut ParsedQuery, atom: &str, options: ParseOptions<'_>) -> Result<()> {
        if atom.chars().count() > 1 && atom.ends_with('*') {
            parsed.wildcards.push(atom.replace('*', "%"));
            return Ok(());
        }

        if let Some(rest) = atom.strip_prefix('+') {
            parsed.required.extend(self.tokenizer.tokenize(rest, options.locale)?);
            return Ok(());
        }

        if let Some(rest) = atom.strip_prefix('-') {
            parsed.excluded.extend(self.tokenizer.tokenize(rest, options.locale)?);
            return Ok(());
        }

        if atom.starts_with('*') {
            parsed.wildcards.push(atom.replace('*', "%"));
            return Ok(());
        }

        let min_length = options.min_length;
        parsed.plains.extend(
            self.tokenizer
                .tokenize(atom, options.locale)?
                .into_iter()
                .filter(|w| w.chars().count() >= min_length),
        );
        Ok(())
    }

    fn push_phrase(&self, parsed: &mut ParsedQuery, phrase: &str, locale: &str) -> Result<()> {
        let words = self.tokenizer.tokenize(phrase, locale)?;
        if words.is_empty() {
            return Ok(());
        }

        let escaped: Vec<String> = words.iter().map(|w| regex::escape(w)).collect();
        let pattern_src = format!("(?i){}", escaped.join("[^[:alnum:]]+"));
        let pattern = Regex::new(&pattern_src).expect("generated phrase pattern is always valid");

        parsed.phrases.push(Phrase { words, pattern });
        Ok(())
    }
}

fn dedup_in_place(items: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    items.retain(|item| seen.insert(item.clone()));
}

//! Text tokenization and normalization shared by the indexer and the
//! query pipeline. Both sides must run the identical steps with the
//! identical options, otherwise queries silently return no results.

mod fold;

pub use fold::{
    compress_runs_of_spaces, fix_special_cases, fold_to_ascii, has_greek,
    has_hyphen_or_apostrophe, spell_greek, strip_markup,
};

use std::collections::HashSet;

use rust_stemmers::{Algorithm, Stemmer};
use stop_words::{get, LANGUAGE};

use crate::config::TokenizerConfig;
use crate::trie::is_all_digits_or_period;

/// Word positions at a paragraph boundary are padded up to the next
/// multiple of this constant, so phrase and proximity tests cannot match
/// across paragraphs
pub const PARAGRAPH_PAD: usize = 100;

/// Minimum gap enforced by the paragraph padding
pub const PARAGRAPH_SLACK: usize = 20;

/// Sentinel standing in for a dropped or breaking word; it consumes a
/// word position but can never match
pub const BREAK: &str = "+";

/// Tokenizer with stemming and stopword handling
pub struct Tokenizer {
    remove_stopwords: bool,
    stem: bool,
    stemmer: Stemmer,
    stopwords: HashSet<String>,
}

impl Tokenizer {
    pub fn new(config: &TokenizerConfig) -> Self {
        let stopwords = get(LANGUAGE::English)
            .into_iter()
            .map(|s| s.to_lowercase())
            .collect();

        Self {
            remove_stopwords: config.remove_stopwords,
            stem: config.stem,
            stemmer: Stemmer::create(Algorithm::English),
            stopwords,
        }
    }

    pub fn removes_stopwords(&self) -> bool {
        self.remove_stopwords
    }

    /// Whether STEM terms are produced during indexing
    pub fn stems(&self) -> bool {
        self.stem
    }

    pub fn is_stop_word(&self, word: &str) -> bool {
        self.stopwords.contains(word)
    }

    pub fn stem_word(&self, word: &str) -> String {
        self.stemmer.stem(word).trim().to_string()
    }

    /// Tokenize one paragraph into `(term, position)` pairs, advancing
    /// the cumulative word cursor. Dropped words still consume positions.
    pub fn index_paragraph(&self, text: &str, cursor: &mut usize) -> Vec<(String, usize)> {
        let mut out = Vec::new();

        for word in normalize_words(text) {
            *cursor += 1;

            if word == BREAK {
                continue;
            }
            if is_all_digits_or_period(&word) {
                continue;
            }
            if self.remove_stopwords && self.is_stop_word(&word) {
                continue;
            }

            out.push((word, *cursor));
        }

        out
    }

    /// Round the cursor up past a paragraph boundary
    pub fn pad_paragraph(cursor: &mut usize) {
        let mut rounded = (*cursor + PARAGRAPH_PAD - 1) / PARAGRAPH_PAD * PARAGRAPH_PAD;
        if rounded - *cursor < PARAGRAPH_SLACK {
            rounded += PARAGRAPH_PAD;
        }
        *cursor = rounded;
    }
}

/// Normalize free text into lower-case ASCII words, with `+` sentinels
/// marking punctuation breaks that a phrase must not bridge.
///
/// Steps, in order: fold non-ASCII (Greek spelled out, residue
/// anglicized), strip markup and entities, lower-case, map underscore
/// and hyphen runs to spaces, trim trailing `.,:;` from each word, then
/// split at remaining punctuation with a sentinel at each boundary.
pub fn normalize_words(text: &str) -> Vec<String> {
    let str = strip_markup(text);
    let str = fold_to_ascii(&str);

    let mut str = str.to_lowercase();

    str = str.replace(['(', ')'], " ");
    str = str.replace('_', " ");

    if has_hyphen_or_apostrophe(&str) {
        str = fix_special_cases(&str);
    }

    str = str.replace('-', " ");

    // trim trailing period, comma, colon, and semicolon from each word
    let mut words = Vec::new();
    for item in str.split_whitespace() {
        let item = item.trim_end_matches(['.', ',', ':', ';']);
        if item.is_empty() {
            continue;
        }
        words.push(item);
    }
    let cleaned = words.join(" ");

    // break at punctuation other than space or underscore; the sentinel
    // keeps later phrase construction from bridging the gap
    let clauses: Vec<&str> = cleaned
        .split(|c: char| !c.is_ascii_alphanumeric() && c != ' ' && c != '_')
        .filter(|s| !s.trim().is_empty())
        .collect();

    let phrases = clauses.join(" + ");

    phrases.split_whitespace().map(str::to_string).collect()
}

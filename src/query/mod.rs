//! Query front end: Boolean phrase and proximity search over a promoted
//! postings tree.

mod eval;
mod ops;
mod prepare;

pub use ops::{
    combine_ids, exclude_ids, extend_positional_ids, intersect_ids, phrase_positions,
    proximity_positions,
};
pub use prepare::{
    partition_query, prepare_exact, prepare_query, process_stop_words, set_field_qualifiers,
};

use std::path::Path;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::postings::PostingsStore;
use crate::tokenizer::Tokenizer;

use eval::{clause_field, split_into_words, Evaluator};

/// Phrase searcher over one postings root. The stopword and stemming
/// options must match the ones the indices were built with.
pub struct Searcher {
    store: PostingsStore,
    tokenizer: Tokenizer,
    destop: bool,
    pipe: Option<Vec<u32>>,
}

impl Searcher {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            store: PostingsStore::new(config.postings_root.clone()),
            tokenizer: Tokenizer::new(&config.tokenizer),
            destop: config.tokenizer.remove_stopwords,
            pipe: None,
        }
    }

    /// A searcher over an explicit postings root with default options
    pub fn open(postings_root: impl AsRef<Path>) -> Self {
        let config = EngineConfig::new(
            std::path::PathBuf::new(),
            postings_root.as_ref().to_path_buf(),
        );
        Self::new(&config)
    }

    /// Supply the uid list a `[PIPE]` pseudo-field resolves to, instead
    /// of reading standard input
    pub fn with_pipe(mut self, uids: Vec<u32>) -> Self {
        self.pipe = Some(uids);
        self
    }

    fn clauses(&self, phrase: &str) -> Result<Vec<String>> {
        let prepared = prepare_query(phrase);
        let destopped = process_stop_words(&prepared, &self.tokenizer, self.destop);
        let clauses = partition_query(&destopped);
        set_field_qualifiers(clauses)
    }

    fn run(&self, clauses: Vec<String>) -> Result<Vec<u32>> {
        Evaluator::new(&self.store, self.pipe.as_deref(), clauses).evaluate()
    }

    /// Evaluate a Boolean phrase query and return matching uids in
    /// ascending order
    pub fn search(&self, phrase: &str) -> Result<Vec<u32>> {
        if phrase.is_empty() {
            return Ok(Vec::new());
        }
        self.run(self.clauses(phrase)?)
    }

    /// Match a literal title or abstract phrase against TIAB
    pub fn search_exact(&self, phrase: &str) -> Result<Vec<u32>> {
        self.search_literal(phrase, "[tiab]")
    }

    /// Match a literal phrase against the TITL field
    pub fn search_title(&self, phrase: &str) -> Result<Vec<u32>> {
        self.search_literal(phrase, "[titl]")
    }

    fn search_literal(&self, phrase: &str, sfx: &str) -> Result<Vec<u32>> {
        if phrase.is_empty() {
            return Ok(Vec::new());
        }
        let prepared = prepare_exact(phrase, sfx, &self.tokenizer, self.destop);
        let destopped = process_stop_words(&prepared, &self.tokenizer, self.destop);
        let clauses = partition_query(&destopped);
        self.run(set_field_qualifiers(clauses)?)
    }

    /// Show each preparation stage for a query, for debugging index or
    /// stopword mismatches
    pub fn explain(&self, phrase: &str) -> Vec<(&'static str, String)> {
        let prepared = prepare_query(phrase);
        let destopped = process_stop_words(&prepared, &self.tokenizer, self.destop);
        let clauses = partition_query(&destopped);
        let qualified = set_field_qualifiers(clauses.clone())
            .map(|c| c.join(" · "))
            .unwrap_or_else(|err| err.to_string());

        vec![
            ("prepare_query", prepared),
            ("process_stop_words", destopped),
            ("partition_query", clauses.join(" · ")),
            ("set_field_qualifiers", qualified),
        ]
    }

    fn report_terms<T>(
        &self,
        phrase: &str,
        mut probe: impl FnMut(&PostingsStore, &str, &str) -> T,
    ) -> Result<Vec<T>> {
        let clauses = self.clauses(phrase)?;
        let mut out = Vec::new();

        for item in clauses {
            if item == "(" || item == ")" || item == "&" || item == "|" || item == "!" {
                continue;
            }
            let (field, text) = clause_field(&item);
            for term in split_into_words(&text) {
                let term = term.replace('_', " ");
                out.push(probe(&self.store, &term, &field));
            }
        }

        Ok(out)
    }

    /// Document count for every term in the query
    pub fn term_count(&self, phrase: &str) -> Result<Vec<(String, usize)>> {
        self.report_terms(phrase, |store, term, field| {
            (term.to_string(), store.term_count(term, field))
        })
    }

    /// Expand wildcard patterns and count each matching term
    pub fn term_counts(&self, phrase: &str) -> Result<Vec<(String, usize)>> {
        let nested = self.report_terms(phrase, |store, term, field| {
            store.term_counts(term, field)
        })?;
        Ok(nested.into_iter().flatten().collect())
    }

    /// Dump per-uid word positions for every term in the query
    pub fn term_positions(&self, phrase: &str) -> Result<Vec<(String, Vec<(u32, Vec<i16>)>)>> {
        self.report_terms(phrase, |store, term, field| {
            (term.to_string(), store.term_positions(term, field))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_query() {
        let searcher = Searcher::open("/nonexistent");
        assert!(searcher.search("").unwrap().is_empty());
        assert!(searcher.search("   ").unwrap().is_empty());
    }

    #[test]
    fn test_unbalanced_query_is_fatal() {
        let searcher = Searcher::open("/nonexistent");
        assert!(searcher.search("(aspirin & tylenol").is_err());
        assert!(searcher.search("aspirin & tylenol)").is_err());
    }

    #[test]
    fn test_explain_stages() {
        let searcher = Searcher::open("/nonexistent");
        let stages = searcher.explain("Aspirin AND Tylenol");
        assert_eq!(stages[0], ("prepare_query", "aspirin & tylenol".to_string()));
        assert_eq!(stages.len(), 4);
    }
}

//! Recursive-descent query evaluation over the promoted postings store.
//!
//! Operator precedence is encoded in the descent order: `expr` handles
//! `|`, `term` handles `&`, `excl` handles `!`, `prox` handles `~`
//! chains, and `fact` handles grouping and phrases. Phrases extend word
//! by word through positional intersection; Boolean nodes work on uid
//! lists alone.

use std::io::BufRead;
use std::thread;

use crate::error::{PubdexError, Result};
use crate::postings::{PostingArrays, PostingsStore};

use super::ops::{
    combine_ids, exclude_ids, extend_positional_ids, intersect_ids, phrase_positions,
    proximity_positions,
};

/// Default field for unqualified phrases
const DEFAULT_FIELD: &str = "TIAB";

/// Split a clause into its phrase text and bracketed field qualifier.
/// Fields that index phrases keep their spaces; other fields protect
/// multi-word terms with underscores.
pub(super) fn parse_field(clause: &str) -> (String, String) {
    let mut field = DEFAULT_FIELD.to_string();
    let mut text = clause.to_string();

    if text.ends_with(']') {
        if let Some(pos) = text.find('[') {
            field = text[pos..]
                .trim_start_matches('[')
                .trim_end_matches(']')
                .trim()
                .to_uppercase();
            text = text[..pos].trim().to_string();
        }

        match field.as_str() {
            "NORM" => field = DEFAULT_FIELD.to_string(),
            "STEM" | "TIAB" | "TITL" | "PIPE" => {}
            _ => text = text.replace(' ', "_"),
        }
    }

    (field, text)
}

pub(super) struct Evaluator<'a> {
    store: &'a PostingsStore,
    pipe: Option<&'a [u32]>,
    clauses: Vec<String>,
    pos: usize,
    prev: String,
    no_prox: bool,
}

impl<'a> Evaluator<'a> {
    pub(super) fn new(
        store: &'a PostingsStore,
        pipe: Option<&'a [u32]>,
        clauses: Vec<String>,
    ) -> Self {
        let no_prox = !clauses.iter().any(|tkn| tkn.starts_with('~'));
        Self {
            store,
            pipe,
            clauses,
            pos: 0,
            prev: String::new(),
            no_prox,
        }
    }

    fn next_token(&mut self) -> Result<Option<String>> {
        if self.pos >= self.clauses.len() {
            return Ok(None);
        }

        let tkn = self.clauses[self.pos].clone();
        self.pos += 1;

        if tkn == "("
            && !self.prev.is_empty()
            && self.prev != "&"
            && self.prev != "|"
            && self.prev != "!"
            && self.prev != "("
        {
            return Err(PubdexError::Query(format!(
                "tokens '{}' and '{}' should be separated by AND, OR, or NOT",
                self.prev, tkn
            )));
        }

        if self.prev == ")" && tkn != "&" && tkn != "|" && tkn != "!" && tkn != ")" {
            return Err(PubdexError::Query(format!(
                "tokens '{}' and '{}' should be separated by AND, OR, or NOT",
                self.prev, tkn
            )));
        }

        self.prev = tkn.clone();
        Ok(Some(tkn))
    }

    /// Resolve the uids a `[PIPE]` pseudo-field stands for
    fn pipe_uids(&self) -> Result<Vec<u32>> {
        if let Some(uids) = self.pipe {
            let mut data = uids.to_vec();
            data.sort_unstable();
            return Ok(data);
        }

        // no supplied list: drain uids from standard input
        let stdin = std::io::stdin();
        let mut data = Vec::new();
        for line in stdin.lock().lines() {
            let line = line?;
            let id = line.trim();
            if id.is_empty() {
                continue;
            }
            let id = match id.find('.') {
                Some(pos) => &id[..pos],
                None => id,
            };
            let uid: u32 = id
                .parse()
                .map_err(|_| PubdexError::Query(format!("unrecognized UID {}", id)))?;
            data.push(uid);
        }
        data.sort_unstable();
        Ok(data)
    }

    /// Evaluate one phrase clause: fetch postings for every word and
    /// grow the phrase through positional intersection. Returns the
    /// surviving uids, the phrase-start positions, and the phrase's word
    /// span for later proximity chaining.
    fn eval(&mut self, clause: &str) -> Result<(Vec<u32>, Vec<Vec<i16>>, i32)> {
        let (field, text) = parse_field(clause);

        if field == "PIPE" {
            return Ok((self.pipe_uids()?, Vec::new(), 0));
        }

        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return Ok((Vec::new(), Vec::new(), 0));
        }

        // a lone word with no proximity tests anywhere needs no
        // positional data at all
        if self.no_prox && words.len() == 1 {
            let term = words[0];
            if term.starts_with('+') {
                return Ok((Vec::new(), Vec::new(), 0));
            }
            let term = term.replace('_', " ");
            let (data, _) = self.store.posting_ids(&term, &field, true);
            return Ok((data, Vec::new(), 1));
        }

        let mut dist = 0i32;
        let mut fetches: Vec<(String, i32)> = Vec::new();

        for word in words {
            let term = word.replace('_', " ");

            if term.starts_with('+') {
                // a run of sentinels skips past one or more words
                dist += term.matches('+').count() as i32;
                continue;
            }

            fetches.push((term, dist));
            dist += 1;
        }

        if fetches.is_empty() {
            return Ok((Vec::new(), Vec::new(), 0));
        }

        // fetch every word's postings concurrently
        let store = self.store;
        let field = field.as_str();
        let intersect: Vec<PostingArrays> = thread::scope(|scope| {
            let handles: Vec<_> = fetches
                .iter()
                .map(|(term, dist)| {
                    scope.spawn(move || {
                        let (data, ofst) = store.posting_ids(term, field, false);
                        PostingArrays {
                            data,
                            ofst,
                            dist: *dist,
                        }
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("postings fetch panicked"))
                .collect()
        });

        // bail to empty if any word is absent
        if intersect.iter().any(|fut| fut.data.is_empty()) {
            return Ok((Vec::new(), Vec::new(), 0));
        }

        let mut data = intersect[0].data.clone();
        let mut ofst = intersect[0].ofst.clone();
        let mut delta = intersect[0].dist + 1;

        for fut in &intersect[1..] {
            // keep starting positions of phrases containing every word
            // so far in its proper place
            let (next_data, next_ofst) = extend_positional_ids(
                &data,
                &ofst,
                &fut.data,
                &fut.ofst,
                fut.dist,
                phrase_positions,
            );
            data = next_data;
            ofst = next_ofst;
            if data.is_empty() {
                return Ok((Vec::new(), Vec::new(), 0));
            }
            delta = fut.dist + 1;
        }

        Ok((data, ofst, delta))
    }

    fn fact(&mut self) -> Result<(Vec<u32>, Vec<Vec<i16>>, i32, Option<String>)> {
        let Some(tkn) = self.next_token()? else {
            return Err(PubdexError::Query("unexpected end of expression".to_string()));
        };

        if tkn == "(" {
            // recursively process the parenthesized expression; grouping
            // yields a uid-only scalar
            let (data, tkn) = self.expr()?;
            if tkn.as_deref() != Some(")") {
                return Err(PubdexError::Query(format!(
                    "expected ')' but received '{}'",
                    tkn.unwrap_or_default()
                )));
            }
            let tkn = self.next_token()?;
            return Ok((data, Vec::new(), 0, tkn));
        }

        if tkn == ")" {
            return Err(PubdexError::Query("unexpected ')' token".to_string()));
        }

        if tkn == "&" || tkn == "|" || tkn == "!" {
            return Err(PubdexError::Query(format!(
                "unexpected operator '{}' in expression",
                tkn
            )));
        }

        let (data, ofst, delta) = self.eval(&tkn)?;
        let next = self.next_token()?;
        Ok((data, ofst, delta, next))
    }

    fn prox(&mut self) -> Result<(Vec<u32>, Option<String>)> {
        let (mut data, mut ofst, mut delta, mut tkn) = self.fact()?;

        while tkn.as_deref().is_some_and(|t| t.starts_with('~')) {
            let dist = tkn.as_deref().map_or(0, |t| t.matches('~').count()) as i32;

            let (next, noff, ndlt, t) = self.fact()?;

            // the next phrase must start within the allowed distance
            // after the previous phrase
            let (next_data, next_ofst) = extend_positional_ids(
                &data,
                &ofst,
                &next,
                &noff,
                delta + dist,
                proximity_positions,
            );
            data = next_data;
            ofst = next_ofst;
            delta = ndlt;
            tkn = t;
        }

        Ok((data, tkn))
    }

    fn excl(&mut self) -> Result<(Vec<u32>, Option<String>)> {
        let (mut data, mut tkn) = self.prox()?;
        while tkn.as_deref() == Some("!") {
            let (next, t) = self.prox()?;
            data = exclude_ids(&data, &next);
            tkn = t;
        }
        Ok((data, tkn))
    }

    fn term(&mut self) -> Result<(Vec<u32>, Option<String>)> {
        let (mut data, mut tkn) = self.excl()?;
        while tkn.as_deref() == Some("&") {
            let (next, t) = self.excl()?;
            data = intersect_ids(&data, &next);
            tkn = t;
        }
        Ok((data, tkn))
    }

    fn expr(&mut self) -> Result<(Vec<u32>, Option<String>)> {
        let (mut data, mut tkn) = self.term()?;
        while tkn.as_deref() == Some("|") {
            let (next, t) = self.term()?;
            data = combine_ids(&data, &next);
            tkn = t;
        }
        Ok((data, tkn))
    }

    /// Enter the recursive descent and require full consumption
    pub(super) fn evaluate(&mut self) -> Result<Vec<u32>> {
        if self.clauses.is_empty() {
            return Ok(Vec::new());
        }

        let (mut result, tkn) = self.expr()?;

        if let Some(tkn) = tkn {
            return Err(PubdexError::Query(format!(
                "unexpected token '{}' at end of expression",
                tkn
            )));
        }

        result.sort_unstable();
        Ok(result)
    }
}

/// Split a phrase clause into its lookup words for term reporting,
/// dropping sentinels and proximity markers
pub(super) fn split_into_words(text: &str) -> Vec<String> {
    let mut arry = Vec::new();

    for segment in text.split('+') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        for item in segment.split_whitespace() {
            if item.starts_with('~') {
                continue;
            }
            arry.push(item.to_string());
        }
    }

    arry
}

pub(super) use parse_field as clause_field;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_field() {
        assert_eq!(
            parse_field("acute infarction"),
            ("TIAB".to_string(), "acute infarction".to_string())
        );
        assert_eq!(
            parse_field("acute [titl]"),
            ("TITL".to_string(), "acute".to_string())
        );
        assert_eq!(
            parse_field("acute [NORM]"),
            ("TIAB".to_string(), "acute".to_string())
        );
        // non-phrase fields protect spaces with underscores
        assert_eq!(
            parse_field("c14 280 [TREE]"),
            ("TREE".to_string(), "c14_280".to_string())
        );
    }

    #[test]
    fn test_split_into_words() {
        assert_eq!(
            split_into_words("acute + infarction"),
            vec!["acute", "infarction"]
        );
        assert_eq!(split_into_words("acute ~~ renal"), vec!["acute", "renal"]);
    }

    #[test]
    fn test_syntax_errors() {
        let store = PostingsStore::new("/nonexistent");

        let run = |clauses: &[&str]| {
            let clauses: Vec<String> = clauses.iter().map(|s| s.to_string()).collect();
            Evaluator::new(&store, None, clauses).evaluate()
        };

        // unbalanced parens
        assert!(run(&["(", "aspirin"]).is_err());
        // unexpected close
        assert!(run(&[")"]).is_err());
        // operator at start of factor
        assert!(run(&["&", "aspirin"]).is_err());
        // trailing operator
        assert!(run(&["aspirin", "&"]).is_err());
        // missing operator between phrase and group
        assert!(run(&["aspirin", "(", "tylenol", ")"]).is_err());
        // valid but unknown terms evaluate to empty
        assert_eq!(run(&["aspirin", "&", "tylenol"]).unwrap(), Vec::<u32>::new());
    }

    #[test]
    fn test_pipe_pseudo_field() {
        let store = PostingsStore::new("/nonexistent");
        let pipe = vec![30u32, 10, 20];
        let clauses = vec!["stdin [PIPE]".to_string()];
        let result = Evaluator::new(&store, Some(&pipe), clauses)
            .evaluate()
            .unwrap();
        assert_eq!(result, vec![10, 20, 30]);
    }
}

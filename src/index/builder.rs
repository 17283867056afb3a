//! Builds the per-record `IdxDocument` fragment consumed by the
//! inverter: title words feed TITL and TIAB, abstract paragraphs feed
//! TIAB, stemmed variants feed STEM, and presence-only fields such as
//! YEAR and TREE carry no positions.

use std::collections::BTreeMap;

use crate::tokenizer::Tokenizer;

use super::wire;

/// Accumulates the indexable fields of one record
pub struct RecordBuilder<'a> {
    tokenizer: &'a Tokenizer,
    uid: String,
    cursor: usize,
    titl: BTreeMap<String, Vec<usize>>,
    tiab: BTreeMap<String, Vec<usize>>,
    stem: BTreeMap<String, Vec<usize>>,
    extra: BTreeMap<String, BTreeMap<String, Vec<usize>>>,
}

impl<'a> RecordBuilder<'a> {
    pub fn new(tokenizer: &'a Tokenizer, uid: &str) -> Self {
        Self {
            tokenizer,
            uid: uid.to_string(),
            cursor: 0,
            titl: BTreeMap::new(),
            tiab: BTreeMap::new(),
            stem: BTreeMap::new(),
            extra: BTreeMap::new(),
        }
    }

    /// Index the article title into TITL and TIAB
    pub fn title(&mut self, text: &str) -> &mut Self {
        let terms = self.tokenizer.index_paragraph(text, &mut self.cursor);
        for (term, pos) in &terms {
            self.titl.entry(term.clone()).or_default().push(*pos);
        }
        self.collect_tiab(terms);
        Tokenizer::pad_paragraph(&mut self.cursor);
        self
    }

    /// Index one abstract paragraph into TIAB
    pub fn paragraph(&mut self, text: &str) -> &mut Self {
        let terms = self.tokenizer.index_paragraph(text, &mut self.cursor);
        self.collect_tiab(terms);
        Tokenizer::pad_paragraph(&mut self.cursor);
        self
    }

    fn collect_tiab(&mut self, terms: Vec<(String, usize)>) {
        for (term, pos) in terms {
            if self.tokenizer.stems() {
                let stemmed = self.tokenizer.stem_word(&term);
                if !stemmed.is_empty() {
                    self.stem.entry(stemmed).or_default().push(pos);
                }
            }
            self.tiab.entry(term).or_default().push(pos);
        }
    }

    /// Record a publication year as a presence-only YEAR term
    pub fn year(&mut self, year: i32) -> &mut Self {
        self.field_term("YEAR", &year.to_string())
    }

    /// Record a presence-only term in an arbitrary field (TREE, PROP, …)
    pub fn field_term(&mut self, field: &str, term: &str) -> &mut Self {
        let term = term.trim().to_lowercase();
        if !term.is_empty() {
            self.extra
                .entry(field.to_string())
                .or_default()
                .entry(term)
                .or_default();
        }
        self
    }

    /// Serialize the accumulated fields as one `IdxDocument` fragment
    pub fn build(&self) -> String {
        let mut fields: Vec<(String, Vec<(String, Vec<usize>)>)> = Vec::new();

        let mut push = |name: &str, map: &BTreeMap<String, Vec<usize>>| {
            if map.is_empty() {
                return;
            }
            let terms = map
                .iter()
                .map(|(term, positions)| (term.clone(), positions.clone()))
                .collect();
            fields.push((name.to_string(), terms));
        };

        push("STEM", &self.stem);
        push("TIAB", &self.tiab);
        push("TITL", &self.titl);
        for (name, map) in &self.extra {
            push(name.as_str(), map);
        }

        fields.sort_by(|a, b| a.0.cmp(&b.0));

        let mut buffer = String::new();
        wire::write_idx_document(&mut buffer, &self.uid, &fields);
        buffer
    }
}

/// Wrap a batch of `IdxDocument` fragments into an `IdxDocumentSet`
pub fn wrap_idx_set(fragments: &[String]) -> String {
    let mut out = String::from("<IdxDocumentSet>\n");
    for frag in fragments {
        out.push_str(frag);
    }
    out.push_str("</IdxDocumentSet>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TokenizerConfig;
    use crate::index::wire::{find_identifier, stream_values};

    fn tokenizer() -> Tokenizer {
        Tokenizer::new(&TokenizerConfig {
            remove_stopwords: false,
            stem: true,
        })
    }

    #[test]
    fn test_title_feeds_titl_and_tiab() {
        let tok = tokenizer();
        let mut builder = RecordBuilder::new(&tok, "10");
        builder.title("acute myocardial infarction");
        let doc = builder.build();

        assert_eq!(find_identifier(&doc, "IdxUid"), Some("10"));

        let mut fields = Vec::new();
        stream_values(&doc, |tag, attr, content| {
            fields.push((tag.to_string(), attr.to_string(), content.to_string()));
        });

        assert!(fields
            .iter()
            .any(|(t, a, c)| t == "TITL" && c == "acute" && a == "pos=\"1\""));
        assert!(fields
            .iter()
            .any(|(t, a, c)| t == "TIAB" && c == "infarction" && a == "pos=\"3\""));
        assert!(fields
            .iter()
            .any(|(t, _, c)| t == "STEM" && c == "infarct"));
    }

    #[test]
    fn test_paragraph_positions_do_not_collide() {
        let tok = tokenizer();
        let mut builder = RecordBuilder::new(&tok, "11");
        builder.title("renal function");
        builder.paragraph("renal failure");
        let doc = builder.build();

        let mut renal_positions = String::new();
        stream_values(&doc, |tag, attr, content| {
            if tag == "TIAB" && content == "renal" {
                renal_positions = attr.to_string();
            }
        });

        // title occupies the first block, the paragraph starts past 100
        assert_eq!(renal_positions, "pos=\"1,101\"");
    }

    #[test]
    fn test_presence_fields_have_no_positions() {
        let tok = tokenizer();
        let mut builder = RecordBuilder::new(&tok, "12");
        builder.title("aspirin").year(2020);
        let doc = builder.build();

        let mut year = None;
        stream_values(&doc, |tag, attr, content| {
            if tag == "YEAR" {
                year = Some((attr.to_string(), content.to_string()));
            }
        });
        assert_eq!(year, Some((String::new(), "2020".to_string())));
    }

    #[test]
    fn test_repeated_term_merges_positions() {
        let tok = tokenizer();
        let mut builder = RecordBuilder::new(&tok, "13");
        builder.title("pain free pain");
        let doc = builder.build();

        let mut attr = String::new();
        stream_values(&doc, |tag, a, content| {
            if tag == "TITL" && content == "pain" {
                attr = a.to_string();
            }
        });
        assert_eq!(attr, "pos=\"1,3\"");
    }
}

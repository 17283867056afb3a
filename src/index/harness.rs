//! External-index harness: converts pre-tokenized tab-separated tables
//! (bioconcept lists, theme tables, citation counts) into the
//! `IdxDocument` shape the inverter consumes, keeping format-specific
//! parsing out of the core pipeline.

use std::io::BufRead;

use tracing::warn;

use crate::error::Result;

use super::wire;

/// Column layout of one external table source
#[derive(Clone, Debug)]
pub struct TableSource {
    /// Field tag the terms land in (e.g. CHEM, DISZ, GENE)
    pub field: String,
    /// Exact column count every row must have
    pub columns: usize,
    /// Zero-based column holding the record uid
    pub uid_column: usize,
    /// Zero-based column holding the term
    pub term_column: usize,
    /// Lower-case terms before indexing
    pub lowercase: bool,
}

impl TableSource {
    pub fn new(field: &str, columns: usize, uid_column: usize, term_column: usize) -> Self {
        Self {
            field: field.to_string(),
            columns,
            uid_column: uid_column.min(columns.saturating_sub(1)),
            term_column: term_column.min(columns.saturating_sub(1)),
            lowercase: true,
        }
    }

    pub fn keep_case(mut self) -> Self {
        self.lowercase = false;
        self
    }
}

/// Convert one table into `IdxDocument` fragments, one per row.
/// Rows with the wrong column count are warned and skipped; the
/// returned count is the number of skipped rows.
pub fn convert_table(
    source: &TableSource,
    reader: impl BufRead,
    mut emit: impl FnMut(String),
) -> Result<usize> {
    let mut skipped = 0;

    for (row, line) in reader.lines().enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }

        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() != source.columns {
            warn!(
                row = row + 1,
                expected = source.columns,
                found = cols.len(),
                "mismatched column count"
            );
            skipped += 1;
            continue;
        }

        let uid = cols[source.uid_column].trim();
        let mut term = cols[source.term_column].trim().to_string();
        if source.lowercase {
            term = term.to_lowercase();
        }

        if uid.is_empty() || term.is_empty() {
            skipped += 1;
            continue;
        }

        let mut buffer = String::new();
        wire::write_idx_document(
            &mut buffer,
            uid,
            &[(source.field.clone(), vec![(term, Vec::new())])],
        );
        emit(buffer);
    }

    Ok(skipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::inverter::invert_records;
    use crate::index::wire::{find_identifier, stream_values};
    use std::io::Cursor;

    #[test]
    fn test_convert_rows() {
        let source = TableSource::new("CHEM", 3, 0, 1);
        let table = "10\tAspirin\tscore\n20\tTylenol\tscore\n";

        let mut docs = Vec::new();
        let skipped = convert_table(&source, Cursor::new(table), |doc| docs.push(doc)).unwrap();

        assert_eq!(skipped, 0);
        assert_eq!(docs.len(), 2);
        assert_eq!(find_identifier(&docs[0], "IdxUid"), Some("10"));

        let mut term = String::new();
        stream_values(&docs[0], |tag, _, content| {
            if tag == "CHEM" {
                term = content.to_string();
            }
        });
        assert_eq!(term, "aspirin");
    }

    #[test]
    fn test_mismatched_rows_skipped() {
        let source = TableSource::new("CHEM", 3, 0, 1);
        let table = "10\tAspirin\tscore\nbad row\n20\tTylenol\tscore\textra\n";

        let mut docs = Vec::new();
        let skipped = convert_table(&source, Cursor::new(table), |doc| docs.push(doc)).unwrap();

        assert_eq!(skipped, 2);
        assert_eq!(docs.len(), 1);
    }

    #[test]
    fn test_feeds_inverter() {
        let source = TableSource::new("DISZ", 2, 0, 1);
        let table = "10\tinfarction\n20\tinfarction\n";

        let mut docs = Vec::new();
        convert_table(&source, Cursor::new(table), |doc| docs.push(doc)).unwrap();

        let inverted = invert_records(docs, 2, 4);
        assert_eq!(inverted.len(), 1);
        assert_eq!(find_identifier(&inverted[0], "InvKey"), Some("infarction"));

        let mut uids = Vec::new();
        stream_values(&inverted[0], |tag, _, content| {
            if tag == "DISZ" {
                uids.push(content.to_string());
            }
        });
        assert_eq!(uids, vec!["10", "20"]);
    }
}

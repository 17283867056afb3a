//! Inversion: `IdxDocument` fragments become per-term `InvDocument`
//! postings. Dispenser workers accumulate `(field, uid, positions)`
//! triples into per-worker maps that are merged at the barrier, the
//! inverter sorts uids within each field, and the resolver alphabetizes
//! terms before emission.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::Path;
use std::thread;

use crossbeam::channel::bounded;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::warn;

use crate::error::Result;
use crate::tokenizer::{compress_runs_of_spaces, fold_to_ascii};

use super::wire;

/// One accumulated posting triple: field, uid, raw position attribute
type Triple = (String, String, String);

/// Normalize a dispensed term: fold to ASCII, lower-case, strip
/// punctuation, collapse separators to single spaces
fn normalize_term(content: &str) -> String {
    let folded = fold_to_ascii(content);
    let lowered = folded.to_lowercase();

    let cleaned: String = lowered
        .chars()
        .filter(|&c| c.is_alphanumeric() || c == ' ' || c == '-' || c == '_')
        .map(|c| if c == '_' || c == '-' { ' ' } else { c })
        .collect();

    compress_runs_of_spaces(&cleaned).trim().to_string()
}

/// Numeric sort on identifier strings: shorter is smaller, assuming no
/// leading zeros; equal lengths compare lexicographically
pub(crate) fn uid_cmp(a: &str, b: &str) -> std::cmp::Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Assemble one `InvDocument` from a term's triples: fields sorted
/// alphabetically, uids sorted numerically and deduplicated, first
/// position attribute retained
pub(crate) fn assemble_inv_document(key: &str, triples: &[Triple]) -> String {
    let mut fields: BTreeMap<&str, HashMap<&str, &str>> = BTreeMap::new();

    for (fld, uid, attr) in triples {
        fields
            .entry(fld)
            .or_default()
            .entry(uid)
            .or_insert(attr.as_str());
    }

    let mut out: Vec<(String, Vec<(String, String)>)> = Vec::new();

    for (fld, positions) in fields {
        let mut uids: Vec<&str> = positions.keys().copied().collect();
        uids.sort_by(|a, b| uid_cmp(a, b));

        let mut rows = Vec::with_capacity(uids.len());
        let mut prev = "";
        for uid in uids {
            if uid == prev {
                continue;
            }
            rows.push((uid.to_string(), positions[uid].to_string()));
            prev = uid;
        }
        out.push((fld.to_string(), rows));
    }

    let mut buffer = String::new();
    wire::write_inv_document(&mut buffer, key, &out);
    buffer
}

/// Invert a stream of `IdxDocument` fragments into `InvDocument`
/// fragments sorted by term
pub fn invert_records<I>(records: I, workers: usize, depth: usize) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let (tx, rx) = bounded::<String>(depth.max(1));

    // dispenser workers collect postings into local maps, merged below
    let handles: Vec<_> = (0..workers.max(1))
        .map(|_| {
            let rx = rx.clone();
            thread::spawn(move || {
                let mut local: HashMap<String, Vec<Triple>> = HashMap::new();

                for text in rx.iter() {
                    let mut uid = String::new();

                    wire::stream_values(&text, |tag, attr, content| {
                        if tag == "IdxUid" {
                            uid = content.to_string();
                            return;
                        }
                        let term = normalize_term(content);
                        if term.is_empty() || uid.is_empty() {
                            return;
                        }
                        local.entry(term).or_default().push((
                            tag.to_string(),
                            uid.clone(),
                            attr.to_string(),
                        ));
                    });

                    if uid.is_empty() {
                        warn!("record without IdxUid skipped");
                    }
                }

                local
            })
        })
        .collect();

    for record in records {
        if tx.send(record).is_err() {
            break;
        }
    }
    drop(tx);

    // barrier: merge the per-worker maps
    let mut inverted: BTreeMap<String, Vec<Triple>> = BTreeMap::new();
    for handle in handles {
        let local = handle.join().expect("dispenser worker panicked");
        for (term, mut triples) in local {
            inverted.entry(term).or_default().append(&mut triples);
        }
    }

    // resolver: BTreeMap iteration is already alphabetical
    inverted
        .iter()
        .map(|(term, triples)| assemble_inv_document(term, triples))
        .collect()
}

/// Write inverted fragments to one shard file wrapped in
/// `<InvDocumentSet>`, optionally gzip-compressed
pub fn write_shard(fragments: &[String], path: &Path, gzip: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;

    let mut out: Box<dyn Write> = if gzip {
        Box::new(GzEncoder::new(file, Compression::fast()))
    } else {
        Box::new(std::io::BufWriter::new(file))
    };

    out.write_all(b"<InvDocumentSet>\n")?;
    for frag in fragments {
        out.write_all(frag.as_bytes())?;
    }
    out.write_all(b"</InvDocumentSet>\n")?;
    out.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::wire::find_identifier;

    fn idx_doc(uid: &str, field: &str, term: &str, pos: &str) -> String {
        let attr = if pos.is_empty() {
            String::new()
        } else {
            format!(" pos=\"{}\"", pos)
        };
        format!(
            "  <IdxDocument>\n    <IdxUid>{}</IdxUid>\n    <IdxSearchFields>\n      <{}{}>{}</{}>\n    </IdxSearchFields>\n  </IdxDocument>\n",
            uid, field, attr, term, field
        )
    }

    #[test]
    fn test_terms_alphabetized() {
        let records = vec![
            idx_doc("10", "TIAB", "zebra", "1"),
            idx_doc("20", "TIAB", "aspirin", "2"),
        ];
        let inverted = invert_records(records, 2, 4);
        assert_eq!(inverted.len(), 2);
        assert_eq!(find_identifier(&inverted[0], "InvKey"), Some("aspirin"));
        assert_eq!(find_identifier(&inverted[1], "InvKey"), Some("zebra"));
    }

    #[test]
    fn test_uids_sorted_numerically() {
        let records = vec![
            idx_doc("100", "TIAB", "aspirin", "1"),
            idx_doc("9", "TIAB", "aspirin", "1"),
            idx_doc("30", "TIAB", "aspirin", "1"),
        ];
        let inverted = invert_records(records, 3, 4);
        assert_eq!(inverted.len(), 1);

        let mut uids = Vec::new();
        wire::stream_values(&inverted[0], |tag, _, content| {
            if tag == "TIAB" {
                uids.push(content.to_string());
            }
        });
        assert_eq!(uids, vec!["9", "30", "100"]);
    }

    #[test]
    fn test_duplicate_uid_collapses() {
        let records = vec![
            idx_doc("10", "TIAB", "aspirin", "4"),
            idx_doc("10", "TIAB", "aspirin", "4"),
        ];
        let inverted = invert_records(records, 2, 4);

        let mut count = 0;
        wire::stream_values(&inverted[0], |tag, _, _| {
            if tag == "TIAB" {
                count += 1;
            }
        });
        assert_eq!(count, 1);
    }

    #[test]
    fn test_missing_uid_skipped() {
        let orphan =
            "  <IdxDocument>\n    <IdxSearchFields>\n      <TIAB>stray</TIAB>\n    </IdxSearchFields>\n  </IdxDocument>\n"
                .to_string();
        let inverted = invert_records(vec![orphan], 1, 4);
        assert!(inverted.is_empty());
    }

    #[test]
    fn test_normalize_term() {
        assert_eq!(normalize_term("Heart-Attack"), "heart attack");
        assert_eq!(normalize_term("p53!"), "p53");
        assert_eq!(normalize_term("TNF-α"), "tnf alpha");
    }

    #[test]
    fn test_uid_cmp() {
        use std::cmp::Ordering;
        assert_eq!(uid_cmp("9", "10"), Ordering::Less);
        assert_eq!(uid_cmp("10", "9"), Ordering::Greater);
        assert_eq!(uid_cmp("10", "10"), Ordering::Equal);
        assert_eq!(uid_cmp("10", "11"), Ordering::Less);
    }
}

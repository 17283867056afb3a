//! Reader for the promoted five-file postings format. Lookup is a
//! binary search over the in-memory term array; wildcards scan the run
//! of matching terms and fuse their uid slabs. IO failures and missing
//! files are non-fatal: the affected term simply reads as empty.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::thread;

use rust_stemmers::{Algorithm, Stemmer};
use tracing::{debug, warn};

use crate::trie::{posting_dir, posting_path};

/// One master index row: offsets into the term list and postings slab
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Master {
    pub term_offset: i32,
    pub post_offset: i32,
}

/// Postings for one term or fused wildcard range: uids, their per-uid
/// position arrays (empty in document-only mode), and the query word
/// distance the caller attached
#[derive(Clone, Debug, Default)]
pub struct PostingArrays {
    pub data: Vec<u32>,
    pub ofst: Vec<Vec<i16>>,
    pub dist: i32,
}

fn open_sized(dpath: &Path, fname: &str) -> Option<(File, u64)> {
    let fpath = dpath.join(fname);

    let file = match File::open(&fpath) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
        Err(err) => {
            warn!(path = %fpath.display(), %err, "unable to open postings file");
            return None;
        }
    };

    let size = match file.metadata() {
        Ok(meta) => meta.len(),
        Err(err) => {
            warn!(path = %fpath.display(), %err, "unable to stat postings file");
            return None;
        }
    };

    Some((file, size))
}

fn read_all(dpath: &Path, fname: &str) -> Option<Vec<u8>> {
    let (mut file, size) = open_sized(dpath, fname)?;
    let mut data = Vec::with_capacity(size as usize);
    if let Err(err) = file.read_to_end(&mut data) {
        warn!(file = %fname, %err, "unable to read postings file");
        return None;
    }
    Some(data)
}

fn read_slice(dpath: &Path, fname: &str, offset: i32, size: i32) -> Option<Vec<u8>> {
    if size <= 0 {
        return None;
    }
    let (mut file, _) = open_sized(dpath, fname)?;
    if let Err(err) = file.seek(SeekFrom::Start(offset as u64)) {
        warn!(file = %fname, %err, "unable to seek postings file");
        return None;
    }
    let mut data = vec![0u8; size as usize];
    if let Err(err) = file.read_exact(&mut data) {
        warn!(file = %fname, %err, "truncated postings file");
        return None;
    }
    Some(data)
}

fn read_master_index(dpath: &Path, key: &str, field: &str) -> Option<Vec<Master>> {
    let data = read_all(dpath, &format!("{}.{}.mst", key, field))?;
    if data.len() % 8 != 0 {
        warn!(key = %key, field = %field, "master index size not a multiple of 8");
        return None;
    }

    Some(
        data.chunks_exact(8)
            .map(|row| Master {
                term_offset: i32::from_le_bytes(row[0..4].try_into().unwrap()),
                post_offset: i32::from_le_bytes(row[4..8].try_into().unwrap()),
            })
            .collect(),
    )
}

fn read_term_list(dpath: &Path, key: &str, field: &str) -> Option<Vec<u8>> {
    read_all(dpath, &format!("{}.{}.trm", key, field))
}

fn read_posting_data(dpath: &Path, key: &str, field: &str, offset: i32, size: i32) -> Option<Vec<u32>> {
    let data = read_slice(dpath, &format!("{}.{}.pst", key, field), offset, size)?;
    Some(
        data.chunks_exact(4)
            .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
            .collect(),
    )
}

fn read_position_index(dpath: &Path, key: &str, field: &str, offset: i32, size: i32) -> Option<Vec<i32>> {
    let data = read_slice(dpath, &format!("{}.{}.uqi", key, field), offset, size)?;
    Some(
        data.chunks_exact(4)
            .map(|c| i32::from_le_bytes(c.try_into().unwrap()))
            .collect(),
    )
}

fn read_offset_data(dpath: &Path, key: &str, field: &str, offset: i32, size: i32) -> Option<Vec<i16>> {
    let data = read_slice(dpath, &format!("{}.{}.ofs", key, field), offset, size)?;
    Some(
        data.chunks_exact(2)
            .map(|c| i16::from_le_bytes(c.try_into().unwrap()))
            .collect(),
    )
}

/// Extract the sorted term strings from a master index and term list
fn term_strings(indx: &[Master], trms: &[u8]) -> Vec<String> {
    // the master index carries a phantom final row
    let num_terms = indx.len() - 1;
    let mut strs = Vec::with_capacity(num_terms);

    for i in 0..num_terms {
        let from = indx[i].term_offset as usize;
        // subtract the newline terminator
        let to = (indx[i + 1].term_offset - 1) as usize;
        if from > to || to > trms.len() {
            warn!("term offsets out of range");
            return Vec::new();
        }
        match std::str::from_utf8(&trms[from..to]) {
            Ok(s) => strs.push(s.to_string()),
            Err(_) => strs.push(String::new()),
        }
    }

    strs
}

fn lower_bound(strs: &[String], term: &str) -> usize {
    let mut l = 0;
    let mut r = strs.len().saturating_sub(1);
    while l < r {
        let mid = (l + r) / 2;
        if strs[mid].as_str() < term {
            l = mid + 1;
        } else {
            r = mid;
        }
    }
    r
}

/// Materialize per-uid position arrays for a postings range
fn load_positions(
    dpath: &Path,
    key: &str,
    field: &str,
    offset: i32,
    size: i32,
) -> Option<(Vec<i32>, Vec<i16>)> {
    // the position index is parallel to the postings slab, one i32 per
    // uid, read with the phantom entry at the end
    let uqis = read_position_index(dpath, key, field, offset, size + 4)?;
    if uqis.is_empty() {
        return None;
    }

    let from = uqis[0];
    let to = uqis[uqis.len() - 1];
    let ofst = read_offset_data(dpath, key, field, from, to - from)?;

    Some((uqis, ofst))
}

/// Read-only handle over a promoted postings tree
#[derive(Clone, Debug)]
pub struct PostingsStore {
    root: PathBuf,
}

impl PostingsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fetch the uid list for a term, and its per-uid positions unless
    /// `simple` document-only retrieval was requested.
    ///
    /// A trailing `*` makes the term a wildcard over the bucket's term
    /// range; a trailing `$` stems the term first, then wildcards the
    /// stem. An unknown term yields empty postings.
    pub fn posting_ids(&self, term: &str, field: &str, simple: bool) -> (Vec<u32>, Vec<Vec<i16>>) {
        let Some((dpath, key)) = posting_path(&self.root, field, term) else {
            return (Vec::new(), Vec::new());
        };

        // schedule asynchronous fetching of the two index files
        let (indx, trms) = thread::scope(|scope| {
            let mi = scope.spawn(|| read_master_index(&dpath, &key, field));
            let tl = scope.spawn(|| read_term_list(&dpath, &key, field));
            (mi.join().unwrap_or(None), tl.join().unwrap_or(None))
        });

        let Some(indx) = indx else {
            debug!(term = %term, field = %field, "no postings for bucket");
            return (Vec::new(), Vec::new());
        };
        let Some(trms) = trms else {
            return (Vec::new(), Vec::new());
        };
        if indx.len() < 2 {
            return (Vec::new(), Vec::new());
        }

        let strs = term_strings(&indx, &trms);
        if strs.is_empty() {
            return (Vec::new(), Vec::new());
        }

        // protecting underscores become spaces again
        let mut term = term.replace('_', " ");

        // a dollar sign requests stemming before the wildcard scan
        if term.ends_with('$') && term != "$" {
            let stemmer = Stemmer::create(Algorithm::English);
            term = stemmer.stem(term.trim_end_matches('$')).trim().to_string();
            term.push('*');
        }

        let mut is_wild_card = false;
        if term.ends_with('*') && term != "*" {
            let tlen = term.len();
            is_wild_card = true;
            term = term.trim_end_matches('*').to_string();
            let pdlen = posting_dir(&term).len();
            if tlen < pdlen {
                warn!(
                    "wildcard term '{}' must be at least {} characters long - ignoring this word",
                    term, pdlen
                );
                return (Vec::new(), Vec::new());
            }
        }

        let num_terms = strs.len();
        let mut r = lower_bound(&strs, &term);

        if is_wild_card {
            if r < num_terms && strs[r].starts_with(&term) {
                let offset = indx[r].post_offset;
                while r < num_terms && strs[r].starts_with(&term) {
                    r += 1;
                }
                let size = indx[r].post_offset - offset;

                let Some(data) = read_posting_data(&dpath, &key, field, offset, size) else {
                    return (Vec::new(), Vec::new());
                };

                if simple {
                    let mut fused = data;
                    fused.sort_unstable();
                    fused.dedup();
                    return (fused, Vec::new());
                }

                let Some((uqis, ofst)) = load_positions(&dpath, &key, field, offset, size) else {
                    return (Vec::new(), Vec::new());
                };

                // combine the position runs of every term in the range
                let mut combo: HashMap<u32, Vec<i16>> = HashMap::new();
                let mut k = 0usize;
                for i in 0..uqis.len().saturating_sub(1) {
                    let num = ((uqis[i + 1] - uqis[i]) / 2) as usize;
                    if i >= data.len() || k + num > ofst.len() {
                        warn!(term = %term, field = %field, "position index out of range");
                        return (Vec::new(), Vec::new());
                    }
                    let run = &ofst[k..k + num];
                    combo.entry(data[i]).or_default().extend_from_slice(run);
                    k += num;
                }

                let mut fused: Vec<u32> = combo.keys().copied().collect();
                fused.sort_unstable();

                let arrs = fused
                    .iter()
                    .map(|uid| {
                        let mut posn = combo.remove(uid).unwrap_or_default();
                        posn.sort_unstable();
                        posn
                    })
                    .collect();

                return (fused, arrs);
            }

            return (Vec::new(), Vec::new());
        }

        // regular search requires an exact match from the binary search
        if r < num_terms && strs[r] == term {
            let offset = indx[r].post_offset;
            let size = indx[r + 1].post_offset - offset;

            let Some(data) = read_posting_data(&dpath, &key, field, offset, size) else {
                return (Vec::new(), Vec::new());
            };

            if simple {
                return (data, Vec::new());
            }

            let Some((uqis, ofst)) = load_positions(&dpath, &key, field, offset, size) else {
                return (Vec::new(), Vec::new());
            };

            let mut arrs = Vec::with_capacity(data.len());
            let mut k = 0usize;
            for i in 0..uqis.len().saturating_sub(1) {
                let num = ((uqis[i + 1] - uqis[i]) / 2) as usize;
                if k + num > ofst.len() {
                    warn!(term = %term, field = %field, "position index out of range");
                    return (Vec::new(), Vec::new());
                }
                arrs.push(ofst[k..k + num].to_vec());
                k += num;
            }

            return (data, arrs);
        }

        (Vec::new(), Vec::new())
    }

    /// Document count for one term (wildcards allowed)
    pub fn term_count(&self, term: &str, field: &str) -> usize {
        self.posting_ids(term, field, true).0.len()
    }

    /// Expand a wildcard pattern against the bucket's term list,
    /// returning each matching term with its document count
    pub fn term_counts(&self, pattern: &str, field: &str) -> Vec<(String, usize)> {
        let pdlen = posting_dir(pattern).len();
        if pattern.len() < pdlen || pattern[..pdlen.min(pattern.len())].contains('*') {
            warn!(
                "pattern '{}' must lead with at least {} literal characters",
                pattern, pdlen
            );
            return Vec::new();
        }

        let Some((dpath, key)) = posting_path(&self.root, field, pattern) else {
            return Vec::new();
        };
        let Some(indx) = read_master_index(&dpath, &key, field) else {
            return Vec::new();
        };
        let Some(trms) = read_term_list(&dpath, &key, field) else {
            return Vec::new();
        };
        if indx.len() < 2 {
            return Vec::new();
        }

        let strs = term_strings(&indx, &trms);

        let pattern = pattern.replace('_', " ");
        let anchored = format!("^{}$", regex::escape(&pattern).replace("\\*", ".*"));
        let Ok(re) = regex::Regex::new(&anchored) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        for (r, str) in strs.iter().enumerate() {
            if re.is_match(str) {
                let size = indx[r + 1].post_offset - indx[r].post_offset;
                out.push((str.clone(), (size / 4) as usize));
            }
        }
        out
    }

    /// Per-uid position dump for one term
    pub fn term_positions(&self, term: &str, field: &str) -> Vec<(u32, Vec<i16>)> {
        let (data, ofst) = self.posting_ids(term, field, false);
        data.into_iter().zip(ofst).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::promoter::promote_file;
    use tempfile::TempDir;

    fn build_store(tmp: &TempDir) -> PostingsStore {
        let bucket = tmp.path().join("inf.mrg");
        let mut text = String::from("<InvDocumentSet>\n");
        for (term, rows) in [
            ("infarct", vec![("7", "3")]),
            ("infarcted", vec![("7", "9")]),
            ("infarction", vec![("5", "3"), ("6", "3"), ("7", "12")]),
            ("influenza", vec![("11", "1")]),
        ] {
            text.push_str(&format!(
                "  <InvDocument>\n    <InvKey>{}</InvKey>\n    <InvIDs>\n",
                term
            ));
            for (uid, pos) in rows {
                text.push_str(&format!("      <TIAB pos=\"{}\">{}</TIAB>\n", pos, uid));
            }
            text.push_str("    </InvIDs>\n  </InvDocument>\n");
        }
        text.push_str("</InvDocumentSet>\n");
        std::fs::write(&bucket, text).unwrap();

        let prom = tmp.path().join("prom");
        promote_file(&prom, &["TIAB".to_string()], &bucket).unwrap();
        PostingsStore::new(prom)
    }

    #[test]
    fn test_exact_lookup() {
        let tmp = TempDir::new().unwrap();
        let store = build_store(&tmp);

        let (uids, _) = store.posting_ids("infarction", "TIAB", true);
        assert_eq!(uids, vec![5, 6, 7]);

        let (uids, positions) = store.posting_ids("infarct", "TIAB", false);
        assert_eq!(uids, vec![7]);
        assert_eq!(positions, vec![vec![3]]);
    }

    #[test]
    fn test_unknown_term_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = build_store(&tmp);
        let (uids, _) = store.posting_ids("infallible", "TIAB", true);
        assert!(uids.is_empty());
    }

    #[test]
    fn test_missing_bucket_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = build_store(&tmp);
        let (uids, _) = store.posting_ids("aspirin", "TIAB", true);
        assert!(uids.is_empty());
    }

    #[test]
    fn test_wildcard_fuses_range() {
        let tmp = TempDir::new().unwrap();
        let store = build_store(&tmp);

        let (uids, _) = store.posting_ids("infarct*", "TIAB", true);
        assert_eq!(uids, vec![5, 6, 7]);

        // positional wildcard merges each uid's positions
        let (uids, positions) = store.posting_ids("infarct*", "TIAB", false);
        assert_eq!(uids, vec![5, 6, 7]);
        assert_eq!(positions[2], vec![3, 9, 12]);
    }

    #[test]
    fn test_short_wildcard_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = build_store(&tmp);
        // bucket needs four characters, "in*" provides two
        let (uids, _) = store.posting_ids("in*", "TIAB", true);
        assert!(uids.is_empty());
    }

    #[test]
    fn test_stem_wildcard() {
        let tmp = TempDir::new().unwrap();
        let store = build_store(&tmp);
        // porter2 of "infarct" is "infarct", then wildcarded
        let (uids, _) = store.posting_ids("infarct$", "TIAB", true);
        assert_eq!(uids, vec![5, 6, 7]);
    }

    #[test]
    fn test_term_counts_pattern() {
        let tmp = TempDir::new().unwrap();
        let store = build_store(&tmp);

        let counts = store.term_counts("infarct*", "TIAB");
        assert_eq!(
            counts,
            vec![
                ("infarct".to_string(), 1),
                ("infarcted".to_string(), 1),
                ("infarction".to_string(), 3)
            ]
        );

        assert_eq!(store.term_count("infarction", "TIAB"), 3);
    }

    #[test]
    fn test_term_positions() {
        let tmp = TempDir::new().unwrap();
        let store = build_store(&tmp);
        let positions = store.term_positions("infarction", "TIAB");
        assert_eq!(
            positions,
            vec![(5, vec![3]), (6, vec![3]), (7, vec![12])]
        );
    }
}

//! Promotion: each merged bucket file becomes a set of binary postings
//! files, five per `(field, prefix)` pair.
//!
//! `.mst` holds little-endian `(term_offset, post_offset)` i32 pairs,
//! one per term plus a sentinel row carrying the past-the-end offsets.
//! `.trm` holds the newline-terminated terms, `.pst` the concatenated
//! uid runs. For positional fields, `.uqi` holds one i32 offset into
//! `.ofs` per uid plus a sentinel, and `.ofs` the i16 word positions.
//! The difference between adjacent offsets recovers every length.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;

use crossbeam::channel::{bounded, Receiver};
use tracing::warn;

use crate::archive::read_maybe_compressed;
use crate::error::Result;
use crate::trie::{identifier_key, posting_path};

use super::wire;

/// Postings collected for one term within one field
struct TermPosting {
    term: String,
    uids: Vec<u32>,
    attrs: Vec<String>,
}

fn collect_posting(field: &str, text: &str) -> Option<TermPosting> {
    let mut term = String::new();
    let mut uids = Vec::new();
    let mut attrs = Vec::new();

    wire::stream_values(text, |tag, attr, content| {
        if tag == "InvKey" {
            term = content.to_lowercase();
        } else if tag == field {
            if content.is_empty() {
                warn!(term = %term, "empty UID in posting");
                return;
            }
            let Ok(uid) = content.parse::<u32>() else {
                warn!(uid = %content, "unparseable UID in posting");
                return;
            };
            uids.push(uid);
            if let Some(pos) = wire::parse_pos_attr(attr) {
                attrs.push(pos.to_string());
            }
        }
    });

    if term.is_empty() || uids.is_empty() {
        return None;
    }

    Some(TermPosting { term, uids, attrs })
}

/// Accumulates the five parallel file images for one `(field, prefix)`
#[derive(Default)]
struct FieldBuffers {
    term_pos: i32,
    post_pos: i32,
    ofst_pos: i32,
    indx: Vec<u8>,
    term: Vec<u8>,
    post: Vec<u8>,
    uqid: Vec<u8>,
    ofst: Vec<u8>,
}

impl FieldBuffers {
    fn add(&mut self, posting: &TermPosting) {
        self.term.extend_from_slice(posting.term.as_bytes());
        self.term.push(b'\n');

        for uid in &posting.uids {
            self.post.extend_from_slice(&uid.to_le_bytes());
        }

        self.indx.extend_from_slice(&self.term_pos.to_le_bytes());
        self.indx.extend_from_slice(&self.post_pos.to_le_bytes());

        self.post_pos += (posting.uids.len() * 4) as i32;
        self.term_pos += (posting.term.len() + 1) as i32;

        if posting.attrs.is_empty() {
            return;
        }
        if posting.attrs.len() != posting.uids.len() {
            warn!(
                term = %posting.term,
                uids = posting.uids.len(),
                attrs = posting.attrs.len(),
                "position attribute count mismatch"
            );
            return;
        }

        for attr in &posting.attrs {
            self.uqid.extend_from_slice(&self.ofst_pos.to_le_bytes());

            let mut count = 0i32;
            for att in attr.split(',') {
                if att.is_empty() {
                    continue;
                }
                let Ok(value) = att.parse::<i16>() else {
                    warn!(term = %posting.term, pos = %att, "unparseable position");
                    continue;
                };
                self.ofst.extend_from_slice(&value.to_le_bytes());
                count += 1;
            }

            self.ofst_pos += count * 2;
        }
    }

    /// Sentinel row eliminates the special case at the end: lengths are
    /// always the difference between adjacent offsets
    fn top_off(&mut self) {
        self.indx.extend_from_slice(&self.term_pos.to_le_bytes());
        self.indx.extend_from_slice(&self.post_pos.to_le_bytes());
        self.uqid.extend_from_slice(&self.ofst_pos.to_le_bytes());
    }

    fn write_files(&self, prom: &Path, field: &str, tag: &str) -> Result<()> {
        let Some((dpath, key)) = posting_path(prom, field, tag) else {
            return Ok(());
        };

        fs::create_dir_all(&dpath)?;

        let write = |fname: String, data: &[u8]| -> Result<()> {
            let mut file = fs::File::create(dpath.join(fname))?;
            file.write_all(data)?;
            Ok(())
        };

        write(format!("{}.{}.trm", key, field), &self.term)?;
        write(format!("{}.{}.pst", key, field), &self.post)?;
        write(format!("{}.{}.mst", key, field), &self.indx)?;

        // fields without position attributes get no .uqi or .ofs files
        if !self.ofst.is_empty() {
            write(format!("{}.{}.uqi", key, field), &self.uqid)?;
            write(format!("{}.{}.ofs", key, field), &self.ofst)?;
        }

        Ok(())
    }
}

fn process_one_field(prom: &Path, field: &str, recs: &[&str]) -> Result<()> {
    let mut buffers = FieldBuffers::default();
    let mut tag = String::new();

    for text in recs {
        let Some(posting) = collect_posting(field, text) else {
            continue;
        };

        if tag.is_empty() {
            tag = identifier_key(&posting.term);
        }

        buffers.add(&posting);
    }

    if !tag.is_empty() {
        buffers.top_off();
        buffers.write_files(prom, field, &tag)?;
    }

    Ok(())
}

/// Promote one merged bucket file: walk its `InvDocument` entries in
/// order, grouping runs that share an identifier key, and write the
/// postings files for every requested field. Returns the keys written.
pub fn promote_file(prom: &Path, fields: &[String], bucket_file: &Path) -> Result<Vec<String>> {
    let text = read_maybe_compressed(bucket_file)?;

    let mut written = Vec::new();
    let mut arry: Vec<&str> = Vec::new();
    let mut prev_tag = String::new();

    let mut flush = |arry: &mut Vec<&str>, tag: &str, written: &mut Vec<String>| -> Result<()> {
        if arry.is_empty() {
            return Ok(());
        }
        for field in fields {
            process_one_field(prom, field, arry)?;
        }
        written.push(tag.to_string());
        arry.clear();
        Ok(())
    };

    for frag in wire::partition_pattern(&text, "InvDocument") {
        let Some(id) = wire::find_identifier(frag, "InvKey") else {
            continue;
        };

        let curr_tag = identifier_key(id);

        if prev_tag != curr_tag {
            let prev = std::mem::replace(&mut prev_tag, curr_tag);
            flush(&mut arry, &prev, &mut written)?;
        }

        arry.push(frag);
    }

    flush(&mut arry, &prev_tag, &mut written)?;

    Ok(written)
}

/// Promote a set of bucket files in parallel, one worker per file;
/// yields each identifier key as its postings land on disk
pub fn spawn_promoters(
    prom: PathBuf,
    fields: Vec<String>,
    files: Vec<PathBuf>,
    depth: usize,
) -> Receiver<String> {
    let (tx, rx) = bounded(depth.max(1));

    for file in files {
        let tx = tx.clone();
        let prom = prom.clone();
        let fields = fields.clone();

        thread::spawn(move || match promote_file(&prom, &fields, &file) {
            Ok(keys) => {
                for key in keys {
                    if tx.send(key).is_err() {
                        return;
                    }
                }
            }
            Err(err) => {
                warn!(path = %file.display(), %err, "promotion failed");
            }
        });
    }

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn bucket_text() -> String {
        let mut text = String::from("<InvDocumentSet>\n");
        for (term, rows) in [
            ("aspirin", vec![("10", "4,17"), ("20", "2"), ("30", "8")]),
            ("aspirinlike", vec![("20", "25")]),
        ] {
            text.push_str("  <InvDocument>\n    <InvKey>");
            text.push_str(term);
            text.push_str("</InvKey>\n    <InvIDs>\n");
            for (uid, pos) in rows {
                text.push_str(&format!(
                    "      <TIAB pos=\"{}\">{}</TIAB>\n",
                    pos, uid
                ));
            }
            text.push_str("    </InvIDs>\n  </InvDocument>\n");
        }
        text.push_str("</InvDocumentSet>\n");
        text
    }

    fn le_i32s(data: &[u8]) -> Vec<i32> {
        data.chunks_exact(4)
            .map(|c| i32::from_le_bytes(c.try_into().unwrap()))
            .collect()
    }

    #[test]
    fn test_five_file_layout() {
        let tmp = TempDir::new().unwrap();
        let bucket = tmp.path().join("asp.mrg");
        fs::write(&bucket, bucket_text()).unwrap();

        let prom = tmp.path().join("prom");
        let written = promote_file(&prom, &["TIAB".to_string()], &bucket).unwrap();
        assert_eq!(written, vec!["aspi".to_string()]);

        let dir = prom.join("TIAB/a/s/p/i");
        let trm = fs::read(dir.join("aspi.TIAB.trm")).unwrap();
        assert_eq!(trm, b"aspirin\naspirinlike\n");

        let mst = le_i32s(&fs::read(dir.join("aspi.TIAB.mst")).unwrap());
        // two terms plus the sentinel row
        assert_eq!(mst, vec![0, 0, 8, 12, 20, 16]);

        let pst = fs::read(dir.join("aspi.TIAB.pst")).unwrap();
        let uids: Vec<u32> = pst
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(uids, vec![10, 20, 30, 20]);

        let uqi = le_i32s(&fs::read(dir.join("aspi.TIAB.uqi")).unwrap());
        // one entry per uid plus the sentinel
        assert_eq!(uqi, vec![0, 4, 6, 8, 10]);

        let ofs = fs::read(dir.join("aspi.TIAB.ofs")).unwrap();
        let positions: Vec<i16> = ofs
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(positions, vec![4, 17, 2, 8, 25]);
    }

    #[test]
    fn test_master_offsets_strictly_ascending() {
        let tmp = TempDir::new().unwrap();
        let bucket = tmp.path().join("asp.mrg");
        fs::write(&bucket, bucket_text()).unwrap();
        let prom = tmp.path().join("prom");
        promote_file(&prom, &["TIAB".to_string()], &bucket).unwrap();

        let dir = prom.join("TIAB/a/s/p/i");
        let mst = le_i32s(&fs::read(dir.join("aspi.TIAB.mst")).unwrap());
        let terms: Vec<i32> = mst.iter().step_by(2).copied().collect();
        for pair in terms.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_presence_field_skips_position_files() {
        let tmp = TempDir::new().unwrap();
        let bucket = tmp.path().join("202.mrg");
        fs::write(
            &bucket,
            "<InvDocumentSet>\n  <InvDocument>\n    <InvKey>2020</InvKey>\n    <InvIDs>\n      <YEAR>10</YEAR>\n    </InvIDs>\n  </InvDocument>\n</InvDocumentSet>\n",
        )
        .unwrap();

        let prom = tmp.path().join("prom");
        promote_file(&prom, &["YEAR".to_string()], &bucket).unwrap();

        let dir = prom.join("YEAR/2/0/2/0");
        assert!(dir.join("2020.YEAR.mst").exists());
        assert!(dir.join("2020.YEAR.pst").exists());
        assert!(!dir.join("2020.YEAR.uqi").exists());
        assert!(!dir.join("2020.YEAR.ofs").exists());
    }

    #[test]
    fn test_field_missing_from_bucket_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let bucket = tmp.path().join("asp.mrg");
        fs::write(&bucket, bucket_text()).unwrap();
        let prom = tmp.path().join("prom");
        promote_file(&prom, &["TITL".to_string()], &bucket).unwrap();
        assert!(!prom.join("TITL").exists());
    }
}

//! Distributes the merged, term-ordered stream into one `.mrg` file per
//! term-prefix bucket. A new file opens on every bucket transition, and
//! each closed bucket is signaled downstream so promotion can proceed in
//! parallel.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;

use crossbeam::channel::{bounded, Receiver};
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::warn;

use crate::error::Result;
use crate::pipeline::Envelope;
use crate::trie::merge_bucket;

enum Saver {
    Plain(BufWriter<File>),
    Zipped(GzEncoder<File>),
}

impl Saver {
    fn open(merge_path: &Path, key: &str, gzip: bool) -> Result<(Self, PathBuf)> {
        let sfx = if gzip { ".mrg.gz" } else { ".mrg" };
        let fpath = merge_path.join(format!("{}{}", key, sfx));

        // overwrites and truncates an existing file
        let file = File::create(&fpath)?;
        let saver = if gzip {
            Saver::Zipped(GzEncoder::new(file, Compression::fast()))
        } else {
            Saver::Plain(BufWriter::new(file))
        };

        Ok((saver, fpath))
    }

    fn write_str(&mut self, text: &str) -> Result<()> {
        match self {
            Saver::Plain(w) => w.write_all(text.as_bytes())?,
            Saver::Zipped(w) => w.write_all(text.as_bytes())?,
        }
        Ok(())
    }

    fn close(self) -> Result<()> {
        match self {
            Saver::Plain(mut w) => w.flush()?,
            Saver::Zipped(w) => {
                w.finish()?;
            }
        }
        Ok(())
    }
}

/// Consume fused `InvDocument` envelopes in term order and write bucket
/// files under `merge_path`; yields each bucket file path as it closes
pub fn spawn_splitter(
    merge_path: PathBuf,
    gzip: bool,
    inp: Receiver<Envelope<String>>,
    depth: usize,
) -> Receiver<PathBuf> {
    let (tx, rx) = bounded(depth.max(1));

    thread::spawn(move || {
        if let Err(err) = std::fs::create_dir_all(&merge_path) {
            warn!(path = %merge_path.display(), %err, "unable to create merge directory");
            return;
        }

        let mut saver: Option<(Saver, PathBuf)> = None;
        let mut prev_tag = String::new();

        let close_and_signal =
            |saver: Option<(Saver, PathBuf)>,
             tx: &crossbeam::channel::Sender<PathBuf>| {
                if let Some((mut s, fpath)) = saver {
                    let _ = s.write_str("</InvDocumentSet>\n");
                    if let Err(err) = s.close() {
                        warn!(%err, "unable to close bucket file");
                    }
                    let _ = tx.send(fpath);
                }
            };

        for env in inp.iter() {
            let curr_tag = merge_bucket(&env.ident);
            if curr_tag.is_empty() {
                continue;
            }

            if prev_tag != curr_tag {
                close_and_signal(saver.take(), &tx);

                match Saver::open(&merge_path, &curr_tag, gzip) {
                    Ok((mut s, fpath)) => {
                        if s.write_str("<InvDocumentSet>\n").is_err() {
                            continue;
                        }
                        saver = Some((s, fpath));
                    }
                    Err(err) => {
                        warn!(bucket = %curr_tag, %err, "unable to open bucket file");
                        continue;
                    }
                }
                prev_tag = curr_tag;
            }

            if let Some((s, _)) = saver.as_mut() {
                let text = env.payload.trim_end();
                let _ = s.write_str(text);
                let _ = s.write_str("\n");
            }
        }

        close_and_signal(saver.take(), &tx);
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::read_maybe_compressed;
    use crate::index::wire;
    use crossbeam::channel::unbounded;
    use tempfile::TempDir;

    fn inv_doc(term: &str, uid: &str) -> String {
        format!(
            "  <InvDocument>\n    <InvKey>{}</InvKey>\n    <InvIDs>\n      <TIAB pos=\"1\">{}</TIAB>\n    </InvIDs>\n  </InvDocument>\n",
            term, uid
        )
    }

    #[test]
    fn test_buckets_split_on_prefix() {
        let tmp = TempDir::new().unwrap();
        let (tx, rx) = unbounded();

        for (i, term) in ["aspirin", "aspirinlike", "codeine"].iter().enumerate() {
            tx.send(Envelope::new(i + 1, term.to_string(), inv_doc(term, "10")))
                .unwrap();
        }
        drop(tx);

        let out = spawn_splitter(tmp.path().to_path_buf(), false, rx, 4);
        let buckets: Vec<PathBuf> = out.iter().collect();

        // "asp" and "cod" stay three wide, absent from the merge table
        assert_eq!(buckets.len(), 2);
        assert!(buckets[0].ends_with("asp.mrg"));
        assert!(buckets[1].ends_with("cod.mrg"));

        let text = std::fs::read_to_string(&buckets[0]).unwrap();
        assert!(text.starts_with("<InvDocumentSet>\n"));
        assert!(text.ends_with("</InvDocumentSet>\n"));
        let docs = wire::partition_pattern(&text, "InvDocument");
        assert_eq!(docs.len(), 2);
    }

    #[test]
    fn test_zipped_bucket_round_trip() {
        let tmp = TempDir::new().unwrap();
        let (tx, rx) = unbounded();
        tx.send(Envelope::new(1, "aspirin".to_string(), inv_doc("aspirin", "7")))
            .unwrap();
        drop(tx);

        let out = spawn_splitter(tmp.path().to_path_buf(), true, rx, 4);
        let buckets: Vec<PathBuf> = out.iter().collect();
        assert!(buckets[0].ends_with("asp.mrg.gz"));

        let text = read_maybe_compressed(&buckets[0]).unwrap();
        assert!(text.contains("<InvKey>aspirin</InvKey>"));
    }
}

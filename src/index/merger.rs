//! K-way merge of term-sorted shard files. One presenter thread per
//! shard feeds a manifold that restores global term order through a
//! min-heap keyed on `(term, shard)`; fuser workers combine the
//! `InvDocument` fragments collected for each term.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::PathBuf;
use std::thread;

use crossbeam::channel::{bounded, Receiver};
use tracing::warn;

use crate::archive::read_maybe_compressed;
use crate::error::{PubdexError, Result};
use crate::pipeline::{self, Envelope};

use super::inverter::assemble_inv_document;
use super::wire;

/// Heap element carrying one `InvDocument` (or, after grouping, the set
/// of sibling fragments sharing a term)
#[derive(Clone, Debug)]
pub struct Plex {
    /// Source shard number
    pub which: usize,
    /// Term key
    pub ident: String,
    /// Fragment text
    pub text: String,
    /// Output sequence number, assigned by the manifold
    pub index: usize,
    /// Sibling fragments with the same term
    pub sibs: Vec<String>,
}

impl PartialEq for Plex {
    fn eq(&self, other: &Self) -> bool {
        self.ident == other.ident && self.which == other.which
    }
}

impl Eq for Plex {}

impl PartialOrd for Plex {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Plex {
    fn cmp(&self, other: &Self) -> Ordering {
        // reversed comparison turns BinaryHeap into a min-heap keyed on
        // (term, shard)
        other
            .ident
            .cmp(&self.ident)
            .then_with(|| other.which.cmp(&self.which))
    }
}

/// Spawn one presenter thread per shard file, each streaming its
/// `InvDocument` fragments in file order
pub fn spawn_presenters(files: &[PathBuf], depth: usize) -> Result<Vec<Receiver<Plex>>> {
    if files.is_empty() {
        return Err(PubdexError::Internal(
            "not enough inverted files to merge".to_string(),
        ));
    }

    let mut chans = Vec::with_capacity(files.len());

    for (which, file) in files.iter().enumerate() {
        let (tx, rx) = bounded(depth.max(1));
        let path = file.clone();

        thread::spawn(move || {
            let text = match read_maybe_compressed(&path) {
                Ok(text) => text,
                Err(err) => {
                    warn!(path = %path.display(), %err, "unable to open shard");
                    return;
                }
            };

            for frag in wire::partition_pattern(&text, "InvDocument") {
                let Some(ident) = wire::find_identifier(frag, "InvKey") else {
                    continue;
                };
                let plex = Plex {
                    which,
                    ident: ident.to_string(),
                    text: frag.to_string(),
                    index: 0,
                    sibs: Vec::new(),
                };
                if tx.send(plex).is_err() {
                    return;
                }
            }
        });

        chans.push(rx);
    }

    Ok(chans)
}

/// Spawn the manifold: heap-merge the presenter streams, grouping
/// adjacent fragments with the same term into one `Plex` with siblings
pub fn spawn_manifold(inputs: Vec<Receiver<Plex>>, depth: usize) -> Receiver<Plex> {
    let (tx, rx) = bounded(depth.max(1));

    thread::spawn(move || {
        let mut heap: BinaryHeap<Plex> = BinaryHeap::new();

        // read the first fragment from every shard
        for chn in &inputs {
            if let Ok(plex) = chn.recv() {
                heap.push(plex);
            }
        }

        let mut arry: Vec<String> = Vec::new();
        let mut prev_ident = String::new();
        let mut rec = 0;

        while let Some(curr) = heap.pop() {
            if prev_ident == curr.ident {
                arry.push(curr.text.clone());
            } else {
                if !arry.is_empty() {
                    rec += 1;
                    let group = Plex {
                        which: 0,
                        ident: std::mem::take(&mut prev_ident),
                        text: String::new(),
                        index: rec,
                        sibs: std::mem::take(&mut arry),
                    };
                    if tx.send(group).is_err() {
                        return;
                    }
                }
                prev_ident = curr.ident.clone();
                arry.push(curr.text.clone());
            }

            // refill from the shard that supplied the smallest item
            if let Ok(plex) = inputs[curr.which].recv() {
                heap.push(plex);
            }
        }

        if !arry.is_empty() {
            rec += 1;
            let group = Plex {
                which: 0,
                ident: prev_ident,
                text: String::new(),
                index: rec,
                sibs: arry,
            };
            let _ = tx.send(group);
        }
    });

    rx
}

/// Fuse the `InvDocument` fragments collected for one term: fields are
/// merged field-by-field, uids within a field deduplicated, and the
/// first position attribute seen is retained
pub fn fuse_postings(key: &str, fragments: &[String]) -> String {
    let mut triples: Vec<(String, String, String)> = Vec::new();

    for text in fragments {
        wire::stream_values(text, |tag, attr, content| {
            if tag != "InvKey" {
                triples.push((tag.to_string(), content.to_string(), attr.to_string()));
            }
        });
    }

    assemble_inv_document(key, &triples)
}

/// Spawn fuser workers over the manifold stream, restoring term order
/// behind the worker pool with the unshuffler
pub fn spawn_mergers(
    inp: Receiver<Plex>,
    workers: usize,
    depth: usize,
) -> Receiver<Envelope<String>> {
    let (tx, rx) = bounded::<Envelope<String>>(depth.max(1));

    for _ in 0..workers.max(1) {
        let inp = inp.clone();
        let tx = tx.clone();

        thread::spawn(move || {
            for plex in inp.iter() {
                if plex.sibs.is_empty() {
                    continue;
                }
                let fused = fuse_postings(&plex.ident, &plex.sibs);
                if tx.send(Envelope::new(plex.index, plex.ident, fused)).is_err() {
                    return;
                }
            }
        });
    }
    drop(tx);

    pipeline::spawn_unshuffler(rx, depth)
}

/// Merge a set of term-sorted shard files into one ordered stream of
/// fused `InvDocument` fragments
pub fn merge_shards(
    files: &[PathBuf],
    workers: usize,
    depth: usize,
) -> Result<Receiver<Envelope<String>>> {
    let presenters = spawn_presenters(files, depth)?;
    let manifold = spawn_manifold(presenters, depth);
    Ok(spawn_mergers(manifold, workers, depth))
}

/// In-memory fuse for re-merging files that are not term-sorted:
/// collect every fragment by term, then emit fused documents in term
/// order
pub fn fuse_fragments(fragments: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut by_term: std::collections::BTreeMap<String, Vec<String>> =
        std::collections::BTreeMap::new();

    for frag in fragments {
        let Some(ident) = wire::find_identifier(&frag, "InvKey") else {
            continue;
        };
        by_term.entry(ident.to_string()).or_default().push(frag);
    }

    by_term
        .iter()
        .map(|(term, sibs)| fuse_postings(term, sibs))
        .collect()
}

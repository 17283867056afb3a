//! Archive reader: resolves an identifier through the trie and returns
//! the stored payload, decompressing transparently.

use std::path::PathBuf;

use tracing::warn;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::pipeline::{self, Envelope};
use crate::trie;

use crossbeam::channel::Receiver;
use std::sync::Arc;

/// Archive reader for one suffix family (`.xml` or `.e2x`)
pub struct Fetcher {
    root: PathBuf,
    suffix: String,
    gzip: bool,
}

impl Fetcher {
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_suffix(config, super::RECORD_SUFFIX)
    }

    /// A fetcher reading link-archive records (`.e2x`)
    pub fn for_links(config: &EngineConfig) -> Self {
        Self::with_suffix(config, super::LINK_SUFFIX)
    }

    fn with_suffix(config: &EngineConfig, suffix: &str) -> Self {
        Self {
            root: config.archive_root.clone(),
            suffix: suffix.to_string(),
            gzip: config.gzip,
        }
    }

    /// Fetch the stored compressed bytes of a record without inflating
    /// them, for passing records over a network to be decompressed by
    /// the client. Only gzip members qualify.
    pub fn fetch_compressed(&self, id: &str) -> Result<Option<Vec<u8>>> {
        let Some((dpath, basename)) = trie::archive_path(&self.root, id) else {
            return Ok(None);
        };

        let fpath = dpath.join(format!("{}{}.gz", basename, self.suffix));
        if !fpath.exists() {
            return Ok(None);
        }

        match std::fs::read(&fpath) {
            Ok(data) => Ok(Some(data)),
            Err(err) => {
                warn!(id = %basename, %err, "unable to read compressed record");
                Err(err.into())
            }
        }
    }

    /// Fetch one record payload; `Ok(None)` when the identifier has no
    /// stored record
    pub fn fetch(&self, id: &str) -> Result<Option<String>> {
        let Some((dpath, basename)) = trie::archive_path(&self.root, id) else {
            return Ok(None);
        };

        let mut fpath = dpath.join(format!("{}{}", basename, self.suffix));
        if self.gzip {
            fpath.set_file_name(format!("{}{}.gz", basename, self.suffix));
        }

        // fall back to the compressed member without requiring -gzip
        if !fpath.exists() && !self.gzip {
            let zipped = dpath.join(format!("{}{}.gz", basename, self.suffix));
            if zipped.exists() {
                fpath = zipped;
            } else {
                return Ok(None);
            }
        }
        if !fpath.exists() {
            return Ok(None);
        }

        match super::read_maybe_compressed(&fpath) {
            Ok(text) => Ok(Some(text)),
            Err(err) => {
                warn!(id = %basename, %err, "unable to read archive record");
                Err(err)
            }
        }
    }
}

/// Drain an identifier stream through a fetcher worker pool, emitting
/// `(index, payload)` envelopes in the original input order. Missing
/// records come through as empty payloads so counters stay aligned.
pub fn spawn_fetch_pool<I>(
    fetcher: Fetcher,
    ids: I,
    workers: usize,
    depth: usize,
) -> Receiver<Envelope<String>>
where
    I: IntoIterator<Item = String> + Send + 'static,
    I::IntoIter: Send,
{
    let fetcher = Arc::new(fetcher);

    let inp = pipeline::spawn_producer(ids, depth);

    let fetched = pipeline::spawn_workers(workers, depth, inp, move |env: Envelope<String>| {
        let id = env.payload;
        let payload = match fetcher.fetch(&id) {
            Ok(Some(text)) => text,
            Ok(None) => String::new(),
            Err(_) => String::new(),
        };
        Envelope::new(env.index, id, payload)
    });

    pipeline::spawn_unshuffler(fetched, depth)
}

//! Record archive: one payload per identifier under a trie-shaped
//! directory layout, written by the stasher and read by the fetcher.

mod fetcher;
mod stasher;

pub use fetcher::{spawn_fetch_pool, Fetcher};
pub use stasher::{StashOutcome, Stasher};


use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use flate2::read::GzDecoder;

use crate::error::Result;

/// One archive record: a stable identifier (up to 64 characters, any
/// dotted version suffix stripped before pathing), an opaque payload,
/// and the version number that orders competing writes
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub id: String,
    pub payload: String,
    pub version: u64,
}

impl Record {
    pub fn new(id: &str, payload: &str, version: u64) -> Self {
        Self {
            id: id.to_string(),
            payload: payload.to_string(),
            version,
        }
    }
}

/// Record file suffix for article payloads
pub const RECORD_SUFFIX: &str = ".xml";

/// Record file suffix for link archives
pub const LINK_SUFFIX: &str = ".e2x";

/// Open a file as a byte stream, decompressing transparently when the
/// path carries a `.gz` suffix
pub fn open_maybe_compressed(path: &Path) -> Result<Box<dyn Read + Send>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    if path.extension().is_some_and(|ext| ext == "gz") {
        Ok(Box::new(GzDecoder::new(reader)))
    } else {
        Ok(Box::new(reader))
    }
}

/// Read a whole file into a string, decompressing transparently
pub fn read_maybe_compressed(path: &Path) -> Result<String> {
    let mut reader = open_maybe_compressed(path)?;
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    Ok(text)
}

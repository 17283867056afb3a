//! pubdex: a local, file-backed archive and phrase-search engine for
//! biomedical literature records.
//!
//! Records are stashed one per identifier under a trie-shaped archive.
//! An inversion pipeline turns tokenized records into per-term postings,
//! merges term-sorted shards, splits the stream into prefix buckets, and
//! promotes each bucket into a binary postings store. Queries combine
//! Boolean, phrase, and proximity operators against that store and
//! return matching identifiers in ascending order.

pub mod archive;
pub mod config;
pub mod error;
pub mod index;
pub mod pipeline;
pub mod postings;
pub mod query;
pub mod tokenizer;
pub mod trie;

pub use archive::{Fetcher, Record, StashOutcome, Stasher};
pub use config::{EngineConfig, TokenizerConfig};
pub use error::{PubdexError, Result};
pub use postings::PostingsStore;
pub use query::Searcher;
pub use tokenizer::Tokenizer;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Index build pipeline: record text is tokenized into `IdxDocument`
//! fragments, inverted into per-term `InvDocument` postings, merged
//! across shards, split into prefix buckets, and promoted into the
//! binary on-disk postings format.

pub mod builder;
pub mod harness;
pub mod inverter;
pub mod merger;
pub mod promoter;
pub mod splitter;
pub mod wire;

pub use builder::RecordBuilder;
pub use inverter::{invert_records, write_shard};
pub use merger::{fuse_postings, merge_shards, Plex};
pub use promoter::{promote_file, spawn_promoters};
pub use splitter::spawn_splitter;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Tokenizer configuration
///
/// The same configuration must be used when building indices and when
/// preparing queries; a mismatch silently returns no results.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenizerConfig {
    /// Replace stopwords with phrase-breaking sentinels
    pub remove_stopwords: bool,
    /// Emit Porter2-stemmed terms for the STEM field
    pub stem: bool,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            remove_stopwords: true,
            stem: true,
        }
    }
}

/// Engine configuration, constructed once at startup and passed into
/// every pipeline stage
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Root directory of the record archive trie
    pub archive_root: PathBuf,
    /// Root directory of the promoted postings files
    pub postings_root: PathBuf,
    /// Number of parallel worker threads per stage
    pub worker_threads: usize,
    /// Compress archive records and merged bucket files
    pub gzip: bool,
    /// Return a CRC32 audit string from each archive write
    pub hash: bool,
    /// Records between progress reports from the stasher
    pub report_interval: usize,
    /// Milliseconds to sleep between write-lock retries
    pub retry_sleep_ms: u64,
    /// Write-lock attempts before giving up on an identifier
    pub retry_attempts: usize,
    pub tokenizer: TokenizerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            archive_root: PathBuf::from("./archive"),
            postings_root: PathBuf::from("./postings"),
            worker_threads: num_cpus::get(),
            gzip: false,
            hash: false,
            report_interval: 1000,
            retry_sleep_ms: 1000,
            retry_attempts: 5,
            tokenizer: TokenizerConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn new(archive_root: PathBuf, postings_root: PathBuf) -> Self {
        Self {
            archive_root,
            postings_root,
            ..Default::default()
        }
    }

    /// Bounded channel depth, calibrated to the worker count
    pub fn channel_depth(&self) -> usize {
        self.worker_threads.max(1) * 4
    }

    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads.max(1);
        self
    }

    pub fn with_gzip(mut self, gzip: bool) -> Self {
        self.gzip = gzip;
        self
    }

    pub fn with_hash(mut self, hash: bool) -> Self {
        self.hash = hash;
        self
    }

    pub fn with_tokenizer(mut self, tokenizer: TokenizerConfig) -> Self {
        self.tokenizer = tokenizer;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configs() {
        let tok = TokenizerConfig::default();
        assert!(tok.remove_stopwords);
        assert!(tok.stem);

        let cfg = EngineConfig::default();
        assert_eq!(cfg.retry_attempts, 5);
        assert_eq!(cfg.channel_depth(), cfg.worker_threads * 4);
    }

    #[test]
    fn test_config_builder() {
        let cfg = EngineConfig::new(PathBuf::from("/a"), PathBuf::from("/p"))
            .with_worker_threads(2)
            .with_gzip(true);

        assert_eq!(cfg.worker_threads, 2);
        assert!(cfg.gzip);
        assert_eq!(cfg.channel_depth(), 8);
    }
}

//! Version-aware archive writer.
//!
//! Concurrent writers for the same identifier coordinate through a
//! process-local lock map: a newer in-flight version supersedes this
//! write, an older one is waited out with a bounded retry loop. The map
//! also remembers the highest version written, so the stored payload is
//! always the highest version observed.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::thread;
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::{PubdexError, Result};
use crate::trie;

/// Result of a single stash call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StashOutcome {
    /// Payload written; carries the CRC32 audit string when hashing was
    /// requested
    Written(Option<String>),
    /// A newer version exists or is in flight; nothing written
    Skipped,
}

#[derive(Clone, Copy, Debug, Default)]
struct KeyState {
    writing: Option<u64>,
    written: Option<u64>,
}

enum Claim {
    Proceed,
    Wait,
    Superseded,
}

/// Archive writer with per-key version ordering
pub struct Stasher {
    config: EngineConfig,
    suffix: String,
    in_use: Mutex<HashMap<String, KeyState>>,
    progress: Mutex<usize>,
}

impl Stasher {
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_suffix(config, super::RECORD_SUFFIX)
    }

    /// A stasher writing link-archive records (`.e2x`)
    pub fn for_links(config: &EngineConfig) -> Self {
        Self::with_suffix(config, super::LINK_SUFFIX)
    }

    fn with_suffix(config: &EngineConfig, suffix: &str) -> Self {
        let mut suffix = suffix.to_string();
        if config.gzip {
            suffix.push_str(".gz");
        }

        Self {
            config: config.clone(),
            suffix,
            in_use: Mutex::new(HashMap::new()),
            progress: Mutex::new(0),
        }
    }

    fn claim(&self, id: &str, version: u64) -> Claim {
        let mut map = self.in_use.lock();
        let state = map.entry(id.to_string()).or_default();

        if let Some(current) = state.writing {
            if version < current {
                return Claim::Superseded;
            }
            // an older version is mid-write; wait it out
            return Claim::Wait;
        }

        if state.written.is_some_and(|w| version <= w) {
            return Claim::Superseded;
        }

        state.writing = Some(version);
        Claim::Proceed
    }

    fn release(&self, id: &str, version: u64, success: bool) {
        let mut map = self.in_use.lock();
        if let Some(state) = map.get_mut(id) {
            state.writing = None;
            if success && state.written.is_none_or(|w| version > w) {
                state.written = Some(version);
            }
        }
    }

    fn count_success(&self) {
        let mut rolling = self.progress.lock();
        *rolling += 1;
        if *rolling >= self.config.report_interval {
            *rolling = 0;
            debug!("stashed {} records", self.config.report_interval);
        }
    }

    pub fn stash_record(&self, record: &super::Record) -> Result<StashOutcome> {
        self.stash(&record.id, &record.payload, record.version)
    }

    /// Save one record payload under its identifier. The version orders
    /// competing writes; the highest version wins regardless of arrival
    /// order.
    pub fn stash(&self, id: &str, payload: &str, version: u64) -> Result<StashOutcome> {
        // remove a dotted version suffix before pathing
        let id = match id.find('.') {
            Some(pos) => &id[..pos],
            None => id,
        };

        let Some((dpath, basename)) = trie::archive_path(&self.config.archive_root, id) else {
            return Err(PubdexError::BadIdentifier(id.to_string()));
        };

        let mut attempts = self.config.retry_attempts;
        loop {
            match self.claim(&basename, version) {
                Claim::Proceed => break,
                Claim::Superseded => return Ok(StashOutcome::Skipped),
                Claim::Wait => {
                    thread::sleep(Duration::from_millis(self.config.retry_sleep_ms));
                    attempts -= 1;
                    if attempts == 0 {
                        warn!(id = %basename, "unable to acquire write lock");
                        return Err(PubdexError::ArchiveContention(basename));
                    }
                }
            }
        }

        let result = self.write_record(&dpath, &basename, payload);
        self.release(&basename, version, result.is_ok());

        let hash = result?;
        self.count_success();

        Ok(StashOutcome::Written(hash))
    }

    fn write_record(
        &self,
        dpath: &std::path::Path,
        basename: &str,
        payload: &str,
    ) -> Result<Option<String>> {
        fs::create_dir_all(dpath)?;

        let fpath = dpath.join(format!("{}{}", basename, self.suffix));

        // overwrites and truncates an existing file
        let file = File::create(&fpath)?;

        let hash = if self.config.hash {
            let mut hasher = crc32fast::Hasher::new();
            hasher.update(payload.as_bytes());
            Some(hasher.finalize().to_string())
        } else {
            None
        };

        if self.config.gzip {
            let mut writer = GzEncoder::new(file, Compression::default());
            writer.write_all(payload.as_bytes())?;
            if !payload.ends_with('\n') {
                writer.write_all(b"\n")?;
            }
            writer.finish()?;
        } else {
            let mut file = file;
            file.write_all(payload.as_bytes())?;
            if !payload.ends_with('\n') {
                file.write_all(b"\n")?;
            }
        }

        Ok(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn test_config(root: &TempDir) -> EngineConfig {
        let mut cfg = EngineConfig::new(
            root.path().to_path_buf(),
            root.path().join("postings"),
        );
        cfg.retry_sleep_ms = 5;
        cfg
    }

    #[test]
    fn test_stash_writes_through_trie() {
        let tmp = TempDir::new().unwrap();
        let stasher = Stasher::new(&test_config(&tmp));

        let outcome = stasher.stash("12345", "<Rec>one</Rec>", 1).unwrap();
        assert_eq!(outcome, StashOutcome::Written(None));

        let fpath = tmp.path().join("00/01/23/45/00012345.xml");
        let body = fs::read_to_string(fpath).unwrap();
        assert_eq!(body, "<Rec>one</Rec>\n");
    }

    #[test]
    fn test_newer_version_wins_any_order() {
        let tmp = TempDir::new().unwrap();
        let stasher = Stasher::new(&test_config(&tmp));

        stasher.stash("777", "old", 1).unwrap();
        stasher.stash("777", "new", 3).unwrap();
        let outcome = stasher.stash("777", "older", 2).unwrap();
        assert_eq!(outcome, StashOutcome::Skipped);

        let body = fs::read_to_string(tmp.path().join("00/00/07/77/00000777.xml")).unwrap();
        assert_eq!(body, "new\n");
    }

    #[test]
    fn test_parallel_version_race() {
        let tmp = TempDir::new().unwrap();
        let stasher = Arc::new(Stasher::new(&test_config(&tmp)));

        let mut handles = Vec::new();
        for (payload, version) in [("old", 1u64), ("new", 3), ("older", 2)] {
            let stasher = Arc::clone(&stasher);
            handles.push(std::thread::spawn(move || {
                let _ = stasher.stash("1", payload, version);
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let body = fs::read_to_string(tmp.path().join("00/00/00/01/00000001.xml")).unwrap();
        assert_eq!(body, "new\n");
    }

    #[test]
    fn test_hash_audit_string() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = test_config(&tmp);
        cfg.hash = true;
        let stasher = Stasher::new(&cfg);

        let outcome = stasher.stash("42", "payload", 1).unwrap();
        let StashOutcome::Written(Some(hash)) = outcome else {
            panic!("expected a hash");
        };

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(b"payload");
        assert_eq!(hash, hasher.finalize().to_string());
    }

    #[test]
    fn test_gzip_round_trip() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = test_config(&tmp);
        cfg.gzip = true;
        let stasher = Stasher::new(&cfg);

        stasher.stash("555", "compressed body", 1).unwrap();

        let fpath = tmp.path().join("00/00/05/55/00000555.xml.gz");
        let body = crate::archive::read_maybe_compressed(&fpath).unwrap();
        assert_eq!(body, "compressed body\n");
    }

    #[test]
    fn test_version_suffix_stripped_from_id() {
        let tmp = TempDir::new().unwrap();
        let stasher = Stasher::new(&test_config(&tmp));

        stasher.stash("888.2", "versioned", 2).unwrap();
        assert!(tmp.path().join("00/00/08/88/00000888.xml").exists());
    }

    #[test]
    fn test_bad_identifier_rejected() {
        let tmp = TempDir::new().unwrap();
        let stasher = Stasher::new(&test_config(&tmp));

        let err = stasher.stash(&"z".repeat(70), "body", 1).unwrap_err();
        assert!(matches!(err, PubdexError::BadIdentifier(_)));
    }
}

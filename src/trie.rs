//! Trie path construction for archive records and promoted postings.
//!
//! An identifier or term prefix maps deterministically to a directory
//! path and basename. Archive components are upper-cased, postings
//! components lower-cased, with non-alphanumerics mapped to `_`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Directory depth overrides for two-character term prefixes, calibrated
/// against the observed size distribution of PubMed indices. Held as data
/// so re-calibration does not require code changes.
pub static TRIE_LEN: LazyLock<HashMap<&'static str, usize>> = LazyLock::new(|| {
    HashMap::from([
        ("19", 4),
        ("20", 4),
        ("a1", 3),
        ("ab", 3),
        ("ac", 4),
        ("ad", 3),
        ("af", 4),
        ("ag", 3),
        ("al", 3),
        ("an", 4),
        ("ap", 4),
        ("ar", 3),
        ("as", 4),
        ("b0", 3),
        ("ba", 4),
        ("be", 4),
        ("bi", 3),
        ("br", 3),
        ("c0", 3),
        ("c1", 3),
        ("ca", 4),
        ("ce", 4),
        ("ch", 4),
        ("cl", 4),
        ("co", 4),
        ("cr", 3),
        ("cy", 3),
        ("d0", 4),
        ("d1", 4),
        ("d2", 3),
        ("da", 4),
        ("de", 4),
        ("di", 4),
        ("do", 3),
        ("dr", 3),
        ("e0", 3),
        ("ef", 4),
        ("en", 3),
        ("ev", 3),
        ("ex", 4),
        ("fa", 3),
        ("fi", 3),
        ("fo", 4),
        ("fr", 4),
        ("fu", 4),
        ("g0", 3),
        ("ge", 4),
        ("gr", 4),
        ("he", 4),
        ("hi", 4),
        ("im", 3),
        ("in", 4),
        ("la", 3),
        ("le", 3),
        ("li", 3),
        ("lo", 3),
        ("ma", 3),
        ("me", 4),
        ("mi", 3),
        ("mo", 4),
        ("mu", 3),
        ("mz", 3),
        ("n0", 3),
        ("ne", 3),
        ("no", 4),
        ("ob", 3),
        ("on", 3),
        ("oz", 3),
        ("pa", 4),
        ("pe", 4),
        ("ph", 3),
        ("pl", 4),
        ("po", 4),
        ("pr", 4),
        ("ra", 3),
        ("re", 4),
        ("ri", 3),
        ("rz", 3),
        ("se", 3),
        ("si", 4),
        ("sp", 4),
        ("st", 4),
        ("su", 4),
        ("sy", 4),
        ("te", 3),
        ("th", 3),
        ("ti", 3),
        ("tr", 4),
        ("tw", 4),
        ("un", 3),
        ("va", 3),
        ("ve", 3),
        ("vi", 3),
        ("we", 3),
        ("wh", 3),
    ])
});

/// Three-character prefixes whose merge buckets widen to four characters
pub static MERG_LEN: LazyLock<HashMap<&'static str, usize>> = LazyLock::new(|| {
    HashMap::from([
        ("ana", 4),
        ("app", 4),
        ("ass", 4),
        ("can", 4),
        ("cas", 4),
        ("cha", 4),
        ("cli", 4),
        ("com", 4),
        ("con", 4),
        ("d00", 4),
        ("d01", 4),
        ("d02", 4),
        ("d12", 4),
        ("dam", 4),
        ("dat", 4),
        ("dec", 4),
        ("ded", 4),
        ("del", 4),
        ("dem", 4),
        ("dep", 4),
        ("des", 4),
        ("det", 4),
        ("dif", 4),
        ("dis", 4),
        ("eff", 4),
        ("exp", 4),
        ("for", 4),
        ("gen", 4),
        ("gro", 4),
        ("hea", 4),
        ("hig", 4),
        ("inc", 4),
        ("ind", 4),
        ("int", 4),
        ("inv", 4),
        ("met", 4),
        ("mod", 4),
        ("pat", 4),
        ("per", 4),
        ("pre", 4),
        ("pro", 4),
        ("rel", 4),
        ("rep", 4),
        ("res", 4),
        ("sig", 4),
        ("sta", 4),
        ("str", 4),
        ("stu", 4),
        ("tre", 4),
    ])
});

/// Maximum identifier length accepted by the archive trie
pub const MAX_IDENTIFIER_LEN: usize = 64;

fn is_all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

pub(crate) fn is_all_digits_or_period(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit() || b == b'.')
}

/// Normalize an identifier for archive pathing: strip a dotted version
/// suffix and zero-pad all-digit identifiers to 8 characters
pub fn archive_basename(id: &str) -> Option<String> {
    if id.is_empty() || id.len() > MAX_IDENTIFIER_LEN {
        return None;
    }

    let id = match id.find('.') {
        Some(pos) => &id[..pos],
        None => id,
    };
    if id.is_empty() {
        return None;
    }

    if is_all_digits(id) && id.len() < 8 {
        let zeros = "00000000";
        return Some(format!("{}{}", &zeros[id.len()..], id));
    }

    Some(id.to_string())
}

/// Build the archive directory trie for an identifier, e.g.
/// `NP_060051.2` maps to `NP_/06/00/51/` and `12345` to `00/01/23/45/`
pub fn archive_trie(id: &str) -> Option<String> {
    let basename = archive_basename(id)?;
    let mut str = basename.as_str();

    // prefix is up to three letters if followed by digits, or up to four
    // letters if followed by an underscore
    let mut max = 4;
    let mut k = 0;
    for ch in str.chars() {
        if ch.is_ascii_alphabetic() {
            k += ch.len_utf8();
            continue;
        }
        if ch == '_' {
            k += 1;
            max = 6;
        }
        break;
    }

    let mut pfx = &str[..k];
    if pfx.len() < max {
        str = &str[k..];
    } else {
        pfx = "";
    }

    let mut out = String::with_capacity(str.len() * 2 + pfx.len() + 2);

    if !pfx.is_empty() {
        out.push_str(pfx);
        out.push('/');
    }

    let mut between = 0;
    let mut do_slash = false;

    // remainder is divided into character pairs
    for mut ch in str.chars() {
        if ch == '.' {
            break;
        }
        if do_slash {
            out.push('/');
            do_slash = false;
        }
        if ch == ' ' {
            ch = '_';
        }
        if !ch.is_alphanumeric() {
            ch = '_';
        }
        out.push(ch);
        between += 1;
        if between > 1 {
            do_slash = true;
            between = 0;
        }
    }

    if !out.ends_with('/') {
        out.push('/');
    }

    Some(out.to_uppercase())
}

/// Resolve the archive directory and basename for an identifier
pub fn archive_path(root: &Path, id: &str) -> Option<(PathBuf, String)> {
    let trie = archive_trie(id)?;
    let basename = archive_basename(id)?;
    Some((root.join(trie), basename))
}

/// First `n` characters of a term, whole-character safe
fn prefix(term: &str, n: usize) -> &str {
    match term.char_indices().nth(n) {
        Some((idx, _)) => &term[..idx],
        None => term,
    }
}

/// Directory key (without slashes) locating the indices for a term:
/// the first 2, 3, or 4 characters, widths taken from the prefix table
pub fn posting_dir(term: &str) -> &str {
    if term.chars().count() < 3 {
        return term;
    }

    let key = prefix(term, 2);

    if let Some(&num) = TRIE_LEN.get(key) {
        if term.len() >= num {
            return prefix(term, num);
        }
    }

    match term.as_bytes()[0] {
        b'u' | b'v' | b'w' | b'x' | b'y' | b'z' => prefix(term, 2),
        _ => prefix(term, 3),
    }
}

/// Clean up a term, then return its posting directory key
pub fn identifier_key(term: &str) -> String {
    let key: String = term
        .chars()
        .filter(|&c| c.is_alphanumeric() || c == ' ' || c == '-' || c == '_')
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect();

    posting_dir(&key).to_string()
}

/// Truncate an identifier key to its merge bucket, 2 to 4 characters
/// wide according to the prefix tables
pub fn merge_bucket(ident: &str) -> String {
    let tag = identifier_key(ident);
    if tag.chars().count() <= 2 {
        return tag;
    }

    let key = prefix(&tag, 2);
    match TRIE_LEN.get(key) {
        Some(&num) if num > 3 && tag.len() > 3 => {
            let key3 = prefix(&tag, 3);
            match MERG_LEN.get(key3) {
                Some(&m) if m > 3 => prefix(&tag, 4).to_string(),
                _ => prefix(&tag, 3).to_string(),
            }
        }
        Some(&num) if num > 2 => prefix(&tag, 3).to_string(),
        Some(_) => prefix(&tag, 2).to_string(),
        None => prefix(&tag, 2).to_string(),
    }
}

/// Split a postings key into single characters separated by slashes
pub fn postings_trie(key: &str) -> String {
    let key = crate::tokenizer::fold_to_ascii(key);

    let mut out = String::with_capacity(key.len() * 2);
    let mut do_slash = false;

    for mut ch in key.chars() {
        if do_slash {
            out.push('/');
        }
        if ch == ' ' {
            ch = '_';
        }
        if !ch.is_alphanumeric() {
            ch = '_';
        }
        out.push(ch);
        do_slash = true;
    }

    out.to_lowercase()
}

/// Resolve the postings directory and bucket key for a term within a field
pub fn posting_path(root: &Path, field: &str, term: &str) -> Option<(PathBuf, String)> {
    let dir = identifier_key(term);

    let trie = postings_trie(&dir);
    if trie.is_empty() {
        return None;
    }

    Some((root.join(field).join(trie), dir))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_archive_trie() {
        assert_eq!(archive_trie("12345").as_deref(), Some("00/01/23/45/"));
        assert_eq!(archive_basename("12345").as_deref(), Some("00012345"));
        assert_eq!(archive_trie("12345678").as_deref(), Some("12/34/56/78/"));
    }

    #[test]
    fn test_accession_archive_trie() {
        let trie = archive_trie("NP_060051.2").unwrap();
        assert!(trie.ends_with("NP_/06/00/51/"));
        assert_eq!(archive_basename("NP_060051.2").as_deref(), Some("NP_060051"));
    }

    #[test]
    fn test_version_suffix_stripped() {
        assert_eq!(archive_basename("123.4").as_deref(), Some("00000123"));
    }

    #[test]
    fn test_overlength_identifier_rejected() {
        let id = "a".repeat(65);
        assert!(archive_trie(&id).is_none());
        assert!(archive_basename(&id).is_none());
        assert!(archive_trie("").is_none());
    }

    #[test]
    fn test_trie_is_deterministic() {
        let a = archive_trie("NM_000546").unwrap();
        let b = archive_trie("NM_000546").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_posting_dir_widths() {
        // "in" widens to four characters in the prefix table
        assert_eq!(posting_dir("infarct"), "infa");
        // unlisted prefix defaults to three
        assert_eq!(posting_dir("kidney"), "kid");
        // u through z default to two
        assert_eq!(posting_dir("viral"), "vi");
        // short terms pass through
        assert_eq!(posting_dir("at"), "at");
    }

    #[test]
    fn test_identifier_key_folds_punctuation() {
        assert_eq!(identifier_key("heart attack"), "hear");
        // u through z identifiers keep two-character directories
        assert_eq!(identifier_key("x-linked"), "x_");
    }

    #[test]
    fn test_merge_bucket_widths() {
        // TrieLen["in"] = 4, "inf" absent from MergLen
        assert_eq!(merge_bucket("infarct"), "inf");
        // TrieLen["in"] = 4, MergLen["int"] = 4
        assert_eq!(merge_bucket("interleukin"), "inte");
        // TrieLen["ab"] = 3
        assert_eq!(merge_bucket("abdominal"), "abd");
        // no TrieLen entry
        assert_eq!(merge_bucket("kidney"), "ki");
    }

    #[test]
    fn test_posting_path_layout() {
        let (dpath, key) = posting_path(Path::new("/prom"), "TIAB", "infarct").unwrap();
        assert_eq!(key, "infa");
        assert_eq!(dpath, PathBuf::from("/prom/TIAB/i/n/f/a"));
    }

    #[test]
    fn test_posting_path_depends_only_on_prefix() {
        let a = posting_path(Path::new("/p"), "TIAB", "infarction").unwrap();
        let b = posting_path(Path::new("/p"), "TIAB", "infarcted").unwrap();
        assert_eq!(a, b);
    }
}

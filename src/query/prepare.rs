//! Query normalization pipeline. The stages mirror the indexing
//! tokenizer so that a query term always lands on the spelling the
//! inverter stored: cleanup, stopword substitution, partition into
//! phrase and operator clauses, then field-qualifier resolution.

use tracing::warn;

use crate::error::{PubdexError, Result};
use crate::tokenizer::{
    compress_runs_of_spaces, fix_special_cases, fold_to_ascii, has_hyphen_or_apostrophe,
    strip_markup, Tokenizer,
};
use crate::trie::{is_all_digits_or_period, TRIE_LEN};

/// First stage: fold and lower-case the raw query, space out operators
/// and brackets, trim trailing punctuation, and break the residue at
/// punctuation with `+` sentinels, exactly as the indexer does
pub fn prepare_query(str: &str) -> String {
    if str.is_empty() {
        return String::new();
    }

    let mut str = str.to_string();

    if str.starts_with("[PIPE]") {
        str = format!("stdin {}", str);
    }

    str = strip_markup(&str).into_owned();
    str = fold_to_ascii(&str).into_owned();

    str = str.replace("~ ~", "~~");
    str = str.replace("~ ~", "~~");
    str = str.trim().to_string();

    // temporarily flank with spaces to catch operators at the ends
    str = format!(" {} ", str);

    str = str.replace(" AND ", " & ");
    str = str.replace(" OR ", " | ");
    str = str.replace(" NOT ", " ! ");

    str = str.replace('(', " ( ");
    str = str.replace(')', " ) ");
    str = str.replace('&', " & ");
    str = str.replace('|', " | ");
    str = str.replace('!', " ! ");

    // bracketed fields get flanking spaces
    str = str.replace('[', " [");
    str = str.replace(']', "] ");

    str = str.trim().to_string();

    str = str.to_lowercase();

    str = str.replace('_', " ");

    // a numbered tilde is shorthand for a run of tildes
    static TILDE_COUNT: std::sync::LazyLock<regex::Regex> =
        std::sync::LazyLock::new(|| regex::Regex::new(r"~(\d+)").unwrap());
    str = TILDE_COUNT
        .replace_all(&str, |caps: &regex::Captures| {
            let n: usize = caps[1].parse().unwrap_or(1);
            "~".repeat(n.clamp(1, 64))
        })
        .into_owned();

    if has_hyphen_or_apostrophe(&str) {
        str = fix_special_cases(&str);
    }

    str = str.replace('-', " ");

    // trim trailing sentence punctuation from each word, then break at
    // the remaining punctuation; the sentinel keeps phrases from
    // bridging the same gaps the indexer refused to bridge
    let words: Vec<&str> = str
        .split_whitespace()
        .map(|w| w.trim_end_matches(['.', ',', ':', ';']))
        .filter(|w| !w.is_empty())
        .collect();
    let cleaned = words.join(" ");

    let clauses: Vec<&str> = cleaned
        .split(|c: char| {
            !c.is_ascii()
                || !(c.is_ascii_alphanumeric()
                    || c == ' '
                    || c == '_'
                    || c == '*'
                    || c == '~'
                    || c == '+'
                    || c == '$'
                    || c == '&'
                    || c == '|'
                    || c == '!'
                    || c == '('
                    || c == ')'
                    || c == '['
                    || c == ']')
        })
        .filter(|s| !s.trim().is_empty())
        .collect();

    let tmp = clauses.join(" + ");

    compress_runs_of_spaces(&tmp).trim().to_string()
}

/// Literal-phrase preparation for whole-title or whole-abstract lookup:
/// the text is normalized like any indexed paragraph, stopwords and
/// digit runs become sentinels, and the given field suffix is appended
/// unless the caller already supplied one
pub fn prepare_exact(str: &str, sfx: &str, tokenizer: &Tokenizer, destop: bool) -> String {
    if str.is_empty() {
        return String::new();
    }

    // boilerplate placeholders index nothing
    if str == "[Not Available]." || str == "Health." {
        return String::new();
    }

    let mut str = strip_markup(str).into_owned();
    str = fold_to_ascii(&str).into_owned();
    str = str.to_lowercase();

    str = str.replace(['(', ')'], " ");
    str = str.replace('_', " ");

    if has_hyphen_or_apostrophe(&str) {
        str = fix_special_cases(&str);
    }

    str = str.replace('-', " ");

    // trim trailing punctuation from each word
    let words: Vec<&str> = str
        .split_whitespace()
        .map(|w| w.trim_end_matches(['.', ',', ':', ';']))
        .filter(|w| !w.is_empty())
        .collect();
    let cleaned = words.join(" ");

    // break clauses at remaining punctuation, sentinels at the breaks
    let clauses: Vec<&str> = cleaned
        .split(|c: char| !c.is_ascii_alphanumeric() && c != ' ' && c != '_')
        .filter(|s| !s.trim().is_empty())
        .collect();
    let phrases = clauses.join(" + ");

    let mut chain: Vec<String> = Vec::new();
    for item in phrases.split_whitespace() {
        if item == "+" {
            chain.push("+".to_string());
            continue;
        }
        if is_all_digits_or_period(item) {
            chain.push("+".to_string());
            continue;
        }
        if destop && tokenizer.is_stop_word(item) {
            chain.push("+".to_string());
            continue;
        }
        chain.push(item.to_string());
    }

    let mut tmp = chain.join(" ");

    tmp = tmp.replace("+ +", "++");
    tmp = tmp.replace("+ +", "++");

    tmp = compress_runs_of_spaces(&tmp).trim().to_string();

    if !tmp.is_empty() && !tmp.ends_with(']') {
        tmp.push(' ');
        tmp.push_str(sfx);
    }

    tmp
}

fn next_field(terms: &[String]) -> (String, usize) {
    for (j, item) in terms.iter().enumerate() {
        if item.starts_with('[') && item.ends_with(']') {
            return (item.to_uppercase(), j + 1);
        }
    }
    (String::new(), 0)
}

/// Second stage: replace digit runs and stopwords with `+` sentinels in
/// the fields that index free text, and stem terms headed for STEM.
/// Sentinels adjacent to tildes widen the proximity window instead.
pub fn process_stop_words(str: &str, tokenizer: &Tokenizer, destop: bool) -> String {
    if str.is_empty() {
        return String::new();
    }

    let mut chain: Vec<String> = Vec::new();
    let mut terms: Vec<String> = str.split_whitespace().map(str::to_string).collect();

    let add_one_term = |chain: &mut Vec<String>, itm: &str, stps: bool, rlxd: bool| {
        if !stps {
            chain.push(itm.to_string());
            return;
        }
        if is_all_digits_or_period(itm) {
            chain.push("+".to_string());
        } else if destop && tokenizer.is_stop_word(itm) {
            chain.push("+".to_string());
        } else if rlxd {
            let is_wild_card = itm.ends_with('*');
            let bare = itm.trim_end_matches('*');
            let mut stemmed = tokenizer.stem_word(bare);
            if is_wild_card {
                stemmed.push('*');
            }
            chain.push(stemmed);
        } else {
            chain.push(itm.to_string());
        }
    };

    while !terms.is_empty() {
        let mut item = terms.remove(0);

        let (mut fld, mut j) = next_field(&terms);

        // with the addition of TITL, NORM is an alias of TIAB
        if fld == "[NORM]" {
            fld = "[TIAB]".to_string();
        }

        let mut stps = false;
        let mut rlxd = false;
        match fld.as_str() {
            "[TITL]" | "[TIAB]" => stps = true,
            "[STEM]" => {
                stps = true;
                rlxd = true;
            }
            "" => stps = true,
            _ => {}
        }

        if j == 0 {
            add_one_term(&mut chain, &item, stps, rlxd);
            continue;
        }

        while j > 0 {
            add_one_term(&mut chain, &item, stps, rlxd);
            j -= 1;
            item = if terms.is_empty() {
                String::new()
            } else {
                terms.remove(0)
            };
        }

        if !fld.is_empty() {
            chain.push(fld);
        }
    }

    let mut tmp = chain.join(" ");

    tmp = tmp.replace("+ +", "++");
    tmp = tmp.replace("+ +", "++");

    tmp = tmp.replace("~ +", "~+");
    tmp = tmp.replace("+ ~", "+~");

    while tmp.contains("~+") {
        tmp = tmp.replace("~+", "~~");
    }
    while tmp.contains("+~") {
        tmp = tmp.replace("+~", "~~");
    }

    compress_runs_of_spaces(&tmp).trim().to_string()
}

/// Third stage: cut the prepared string into phrase segments and
/// operator symbols
pub fn partition_query(str: &str) -> Vec<String> {
    if str.is_empty() {
        return Vec::new();
    }

    let mut str = compress_runs_of_spaces(str).trim().to_string();

    // sentinels adjacent to a tilde extend the proximity run
    str = str.replace("~ +", "~+");
    str = str.replace("+ ~", "+~");
    while str.contains("~+") {
        str = str.replace("~+", "~~");
    }
    while str.contains("+~") {
        str = str.replace("+~", "~~");
    }

    let mut clauses: Vec<String> = Vec::new();
    let mut phrase: Vec<&str> = Vec::new();

    for token in str.split_whitespace() {
        let is_operator = matches!(token, "(" | ")" | "&" | "|" | "!")
            || token.chars().all(|c| c == '~') && !token.is_empty();

        if is_operator {
            if !phrase.is_empty() {
                clauses.push(phrase.join(" "));
                phrase.clear();
            }
            clauses.push(token.to_string());
        } else {
            phrase.push(token);
        }
    }

    if !phrase.is_empty() {
        clauses.push(phrase.join(" "));
    }

    clauses
}

/// Fourth stage: resolve `[YEAR]` ranges and `[TREE]` codes, and trim
/// stray sentinels from the ends of each phrase clause
pub fn set_field_qualifiers(clauses: Vec<String>) -> Result<Vec<String>> {
    let mut res: Vec<String> = Vec::new();

    for str in clauses {
        // control symbols pass unchanged
        if str == "(" || str == ")" || str == "&" || str == "|" || str == "!"
            || str.starts_with('~')
        {
            res.push(str);
            continue;
        }

        if let Some(body) = str.strip_suffix(" [YEAR]") {
            let body = body.replace(" + ", " ");
            let body = body.trim();

            if body.len() == 4 && is_all_digits_or_period(body) {
                res.push(format!("{} [YEAR]", body));
                continue;
            }

            if body.len() == 4
                && body.ends_with('*')
                && is_all_digits_or_period(&body[..3])
            {
                return Err(PubdexError::Query(
                    "wildcards not supported for years - use ####:#### range instead"
                        .to_string(),
                ));
            }

            if body.len() == 9
                && body.as_bytes()[4] == b' '
                && is_all_digits_or_period(&body[..4])
                && is_all_digits_or_period(&body[5..])
            {
                let start: i32 = body[..4].parse().map_err(|_| {
                    PubdexError::Query(format!("unable to recognize starting year '{}'", &body[..4]))
                })?;
                let stop: i32 = body[5..].parse().map_err(|_| {
                    PubdexError::Query(format!("unable to recognize stopping year '{}'", &body[5..]))
                })?;
                if start > stop {
                    continue;
                }
                // expand the range into year-by-year alternatives
                let mut pfx = "(";
                for year in start..=stop {
                    res.push(pfx.to_string());
                    pfx = "|";
                    res.push(format!("{} [YEAR]", year));
                }
                res.push(")".to_string());
                continue;
            }

            return Err(PubdexError::Query(format!(
                "unable to recognize year expression '{}'",
                body
            )));
        }

        if let Some(body) = str.strip_suffix(" [TREE]") {
            let mut body = body.replace(" + ", " ").trim().to_string();

            // pad a top-level mesh tree wildcard when its trie is four deep
            if body.len() == 4 && body.ends_with('*') {
                let key = &body[..2];
                if TRIE_LEN.get(key).is_some_and(|&num| num > 3) {
                    body = format!("{} *", &body[..3]);
                }
            }

            body = body.replace(' ', ".");
            let tmp = body.trim_end_matches('*');
            if tmp.len() > 2
                && tmp.chars().next().is_some_and(|c| c.is_ascii_lowercase())
                && is_all_digits_or_period(&tmp[1..])
            {
                body = body.replace('.', " ");
                res.push(format!("{} [TREE]", body));
                continue;
            }

            return Err(PubdexError::Query(format!(
                "unable to recognize mesh code expression '{}'",
                body
            )));
        }

        // strip leading and trailing sentinels and spaces; an emptied
        // clause stands for an unmatchable term, not a syntax error
        let trimmed = str
            .trim_matches(|c: char| c == '+' || c == ' ')
            .to_string();
        if trimmed.len() != str.len() && trimmed.is_empty() {
            warn!(clause = %str, "clause reduced to sentinels");
        }
        res.push(trimmed);
    }

    Ok(res)
}

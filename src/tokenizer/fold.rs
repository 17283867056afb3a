//! ASCII folding for biomedical text: Greek letters are spelled out
//! phonetically before the residue is anglicized, so that a query for
//! "tnf alpha" finds records indexed from "TNF-α".

use std::borrow::Cow;

const GREEK_RUNES: &[(char, &str)] = &[
    ('α', "alpha"),
    ('β', "beta"),
    ('γ', "gamma"),
    ('δ', "delta"),
    ('ε', "epsilon"),
    ('ζ', "zeta"),
    ('η', "eta"),
    ('θ', "theta"),
    ('ι', "iota"),
    ('κ', "kappa"),
    ('λ', "lambda"),
    ('μ', "mu"),
    ('ν', "nu"),
    ('ξ', "xi"),
    ('ο', "omicron"),
    ('π', "pi"),
    ('ρ', "rho"),
    ('σ', "sigma"),
    ('ς', "sigma"),
    ('τ', "tau"),
    ('υ', "upsilon"),
    ('φ', "phi"),
    ('χ', "chi"),
    ('ψ', "psi"),
    ('ω', "omega"),
    ('Α', "alpha"),
    ('Β', "beta"),
    ('Γ', "gamma"),
    ('Δ', "delta"),
    ('Ε', "epsilon"),
    ('Ζ', "zeta"),
    ('Η', "eta"),
    ('Θ', "theta"),
    ('Ι', "iota"),
    ('Κ', "kappa"),
    ('Λ', "lambda"),
    ('Μ', "mu"),
    ('Ν', "nu"),
    ('Ξ', "xi"),
    ('Ο', "omicron"),
    ('Π', "pi"),
    ('Ρ', "rho"),
    ('Σ', "sigma"),
    ('Τ', "tau"),
    ('Υ', "upsilon"),
    ('Φ', "phi"),
    ('Χ', "chi"),
    ('Ψ', "psi"),
    ('Ω', "omega"),
    ('µ', "mu"),
    ('ϑ', "theta"),
    ('ϕ', "phi"),
];

fn greek_name(ch: char) -> Option<&'static str> {
    GREEK_RUNES
        .iter()
        .find(|(g, _)| *g == ch)
        .map(|(_, name)| *name)
}

pub fn has_greek(s: &str) -> bool {
    s.chars().any(|c| greek_name(c).is_some())
}

/// Spell out Greek letters phonetically, flanked by spaces so they
/// survive later word splitting
pub fn spell_greek(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 16);
    for ch in s.chars() {
        match greek_name(ch) {
            Some(name) => {
                out.push(' ');
                out.push_str(name);
                out.push(' ');
            }
            None => out.push(ch),
        }
    }
    out
}

pub fn compress_runs_of_spaces(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !in_space {
                out.push(' ');
                in_space = true;
            }
        } else {
            out.push(ch);
            in_space = false;
        }
    }
    out
}

/// Fold a string to plain ASCII: Greek letters spelled out, the residue
/// anglicized, diacritics stripped
pub fn fold_to_ascii(s: &str) -> Cow<'_, str> {
    if s.is_ascii() {
        return Cow::Borrowed(s);
    }

    let mut str = if has_greek(s) {
        compress_runs_of_spaces(&spell_greek(s))
    } else {
        s.to_string()
    };

    str = deunicode::deunicode(&str);

    // deunicode marks unmappable characters; treat them as breaks
    str = str.replace("[?]", " ");

    Cow::Owned(str.trim().to_string())
}

/// Strip angle-bracket markup and decode HTML entities
pub fn strip_markup(s: &str) -> Cow<'_, str> {
    if !s.contains('<') && !s.contains('&') {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '<' => {
                // discard through the closing bracket
                for c in chars.by_ref() {
                    if c == '>' {
                        break;
                    }
                }
            }
            '&' => {
                let mut entity = String::new();
                let mut closed = false;
                while let Some(&c) = chars.peek() {
                    if c == ';' {
                        chars.next();
                        closed = true;
                        break;
                    }
                    if c.is_whitespace() || c == '&' || entity.len() > 8 {
                        break;
                    }
                    entity.push(c);
                    chars.next();
                }
                if closed {
                    match entity.as_str() {
                        "lt" => out.push('<'),
                        "gt" => out.push('>'),
                        "amp" => out.push('&'),
                        "quot" => out.push('"'),
                        "apos" => out.push('\''),
                        "nbsp" => out.push(' '),
                        _ => {
                            if let Some(num) = entity.strip_prefix('#') {
                                let parsed = if let Some(hex) = num
                                    .strip_prefix('x')
                                    .or_else(|| num.strip_prefix('X'))
                                {
                                    u32::from_str_radix(hex, 16).ok()
                                } else {
                                    num.parse::<u32>().ok()
                                };
                                if let Some(c) = parsed.and_then(char::from_u32) {
                                    out.push(c);
                                }
                            }
                            // unknown named entities are dropped
                        }
                    }
                } else {
                    out.push('&');
                    out.push_str(&entity);
                }
            }
            _ => out.push(ch),
        }
    }

    Cow::Owned(out)
}

pub fn has_hyphen_or_apostrophe(s: &str) -> bool {
    s.contains('-') || s.contains('\'')
}

/// Resolve hyphen and apostrophe compounds before hyphens become spaces:
/// possessives lose their trailing 's, remaining apostrophes are removed,
/// and single-letter prefixes fuse with the following word so that
/// "l-dopa" indexes as "ldopa" rather than as a one-letter phrase
pub fn fix_special_cases(s: &str) -> String {
    let mut words = Vec::new();

    for word in s.split_whitespace() {
        let mut item = word.to_string();

        if item.contains('\'') {
            if let Some(stripped) = item.strip_suffix("'s") {
                item = stripped.to_string();
            }
            item = item.replace('\'', "");
        }

        if item.contains('-') {
            let parts: Vec<&str> = item.split('-').collect();
            if parts.len() > 1 && parts[0].len() == 1 && !parts[0].is_empty() {
                item = parts.concat();
            }
        }

        if !item.is_empty() {
            words.push(item);
        }
    }

    words.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greek_spelling() {
        assert_eq!(fold_to_ascii("TNF-α"), "TNF- alpha");
        assert!(has_greek("β-blocker"));
        assert!(!has_greek("beta-blocker"));
    }

    #[test]
    fn test_accent_folding() {
        assert_eq!(fold_to_ascii("Saccharomycès"), "Saccharomyces");
        assert_eq!(fold_to_ascii("naïve"), "naive");
    }

    #[test]
    fn test_ascii_passthrough_borrows() {
        assert!(matches!(fold_to_ascii("plain"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_strip_markup() {
        assert_eq!(strip_markup("<b>acute</b> infarction"), "acute infarction");
        assert_eq!(strip_markup("p &lt; 0.05"), "p < 0.05");
        assert_eq!(strip_markup("A&amp;E"), "A&E");
    }

    #[test]
    fn test_compress_runs_of_spaces() {
        assert_eq!(compress_runs_of_spaces("a  b\t c"), "a b c");
    }

    #[test]
    fn test_special_cases() {
        assert_eq!(fix_special_cases("l-dopa"), "ldopa");
        assert_eq!(fix_special_cases("parkinson's disease"), "parkinson disease");
        assert_eq!(fix_special_cases("x-linked trait"), "xlinked trait");
        assert_eq!(fix_special_cases("long-term care"), "long-term care");
    }
}

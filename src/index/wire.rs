//! Reader and writer for the intermediate XML wire formats.
//!
//! Indexing input:
//! `<IdxDocumentSet><IdxDocument><IdxUid>…</IdxUid><IdxSearchFields>
//! <FIELD pos="…">term</FIELD>…</IdxSearchFields></IdxDocument>…`
//!
//! Merged posting:
//! `<InvDocumentSet><InvDocument><InvKey>term</InvKey><InvIDs>
//! <FIELD pos="…">uid</FIELD>…</InvIDs></InvDocument>…`
//!
//! The scanner streams leaf values without building a tree; container
//! elements are recognized by their element children.

/// Visit every leaf element in a fragment, passing `(tag, attr, content)`.
/// The attribute string is passed through raw (e.g. `pos="1,5"`).
pub fn stream_values(text: &str, mut visit: impl FnMut(&str, &str, &str)) {
    let bytes = text.as_bytes();
    let mut pos = 0;

    while let Some(open) = find_byte(bytes, pos, b'<') {
        // skip closing tags
        if bytes.get(open + 1) == Some(&b'/') {
            pos = open + 1;
            continue;
        }

        let Some(close) = find_byte(bytes, open, b'>') else {
            return;
        };

        let inside = &text[open + 1..close];
        if inside.is_empty() || !inside.as_bytes()[0].is_ascii_alphabetic() {
            pos = close + 1;
            continue;
        }

        let (tag, attr) = match inside.find(char::is_whitespace) {
            Some(sp) => (&inside[..sp], inside[sp..].trim()),
            None => (inside, ""),
        };

        // self-closing element carries no content
        if attr.ends_with('/') || tag.ends_with('/') {
            pos = close + 1;
            continue;
        }

        let rest = &text[close + 1..];
        let after_ws = rest.trim_start();
        if after_ws.starts_with('<') && !after_ws.starts_with("</") {
            // container: descend by continuing the scan inside
            pos = close + 1;
            continue;
        }

        let end_tag = format!("</{}>", tag);
        let Some(end) = rest.find(&end_tag) else {
            pos = close + 1;
            continue;
        };

        let content = rest[..end].trim();
        visit(tag, attr, content);

        pos = close + 1 + end + end_tag.len();
    }
}

fn find_byte(bytes: &[u8], from: usize, needle: u8) -> Option<usize> {
    bytes[from..].iter().position(|&b| b == needle).map(|i| from + i)
}

/// Pull the content of the first `<tag>…</tag>` element out of a fragment
pub fn find_identifier<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);

    let start = text.find(&open)? + open.len();
    let end = text[start..].find(&close)? + start;

    Some(text[start..end].trim())
}

/// Extract the comma-separated position list from a raw `pos="…"` attribute
pub fn parse_pos_attr(attr: &str) -> Option<&str> {
    let rest = attr.strip_prefix("pos=\"")?;
    rest.strip_suffix('"')
}

/// Split a fragment set into individual elements of the given pattern,
/// e.g. every `<InvDocument>…</InvDocument>` in a bucket file
pub fn partition_pattern<'a>(text: &'a str, pattern: &str) -> Vec<&'a str> {
    let open = format!("<{}>", pattern);
    let close = format!("</{}>", pattern);

    let mut out = Vec::new();
    let mut pos = 0;

    while let Some(start) = text[pos..].find(&open) {
        let start = pos + start;
        let Some(end) = text[start..].find(&close) else {
            break;
        };
        let end = start + end + close.len();
        out.push(&text[start..end]);
        pos = end;
    }

    out
}

/// Serialize one `InvDocument`. Fields arrive sorted; uids within each
/// field arrive sorted and deduplicated, paired with their raw position
/// attribute (empty when the field records presence only).
pub fn write_inv_document(buffer: &mut String, key: &str, fields: &[(String, Vec<(String, String)>)]) {
    buffer.push_str("  <InvDocument>\n");
    buffer.push_str("    <InvKey>");
    buffer.push_str(key);
    buffer.push_str("</InvKey>\n");
    buffer.push_str("    <InvIDs>\n");

    for (fld, uids) in fields {
        for (uid, attr) in uids {
            buffer.push_str("      <");
            buffer.push_str(fld);
            if !attr.is_empty() {
                buffer.push(' ');
                buffer.push_str(attr);
            }
            buffer.push('>');
            buffer.push_str(uid);
            buffer.push_str("</");
            buffer.push_str(fld);
            buffer.push_str(">\n");
        }
    }

    buffer.push_str("    </InvIDs>\n");
    buffer.push_str("  </InvDocument>\n");
}

/// Serialize one `IdxDocument` from a uid and `(field, term, positions)`
/// entries; positions are joined into the `pos` attribute
pub fn write_idx_document(
    buffer: &mut String,
    uid: &str,
    fields: &[(String, Vec<(String, Vec<usize>)>)],
) {
    buffer.push_str("  <IdxDocument>\n");
    buffer.push_str("    <IdxUid>");
    buffer.push_str(uid);
    buffer.push_str("</IdxUid>\n");
    buffer.push_str("    <IdxSearchFields>\n");

    for (fld, terms) in fields {
        for (term, positions) in terms {
            buffer.push_str("      <");
            buffer.push_str(fld);
            if !positions.is_empty() {
                buffer.push_str(" pos=\"");
                let mut sep = "";
                for p in positions {
                    buffer.push_str(sep);
                    buffer.push_str(&p.to_string());
                    sep = ",";
                }
                buffer.push('"');
            }
            buffer.push('>');
            buffer.push_str(term);
            buffer.push_str("</");
            buffer.push_str(fld);
            buffer.push_str(">\n");
        }
    }

    buffer.push_str("    </IdxSearchFields>\n");
    buffer.push_str("  </IdxDocument>\n");
}

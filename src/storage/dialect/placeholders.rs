//! Positional placeholder scanning.
//!
//! A `?` counts as a placeholder only in code: outside single-quoted string
//! literals, double-quoted identifiers, `--` line comments and `/* */` block
//! comments. Doubled quotes inside a literal (`'it''s'`) close and reopen the
//! literal, which leaves the spans correct.

use std::ops::Range;

/// Byte ranges of quoted text and comments, in order and non-overlapping.
///
/// Delimiters are ASCII, so every boundary falls on a char boundary. An
/// unterminated literal or comment runs to the end of the text.
pub(crate) fn opaque_spans(sql: &str) -> Vec<Range<usize>> {
    let bytes = sql.as_bytes();
    let mut spans = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let end = match (bytes[i], bytes.get(i + 1)) {
            (quote @ (b'\'' | b'"'), _) => find_from(bytes, i + 1, &[quote]).map_or(bytes.len(), |p| p + 1),
            (b'-', Some(b'-')) => find_from(bytes, i + 2, b"\n").unwrap_or(bytes.len()),
            (b'/', Some(b'*')) => find_from(bytes, i + 2, b"*/").map_or(bytes.len(), |p| p + 2),
            _ => {
                i += 1;
                continue;
            },
        };
        spans.push(i..end);
        i = end;
    }
    spans
}

fn find_from(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    bytes
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| from + p)
}

/// Returns true if byte offset `pos` lies outside every span.
pub(crate) fn is_code(spans: &[Range<usize>], pos: usize) -> bool {
    let idx = spans.partition_point(|s| s.end <= pos);
    spans.get(idx).is_none_or(|s| s.start > pos)
}

/// Counts `?` placeholders in code.
#[must_use]
pub fn count_placeholders(sql: &str) -> usize {
    let spans = opaque_spans(sql);
    sql.match_indices('?')
        .filter(|(pos, _)| is_code(&spans, *pos))
        .count()
}

/// Replaces each `?` in code with `$1`, `$2`, ... left to right.
///
/// Returns the rewritten text and the number of placeholders numbered.
#[must_use]
pub fn number_placeholders(sql: &str) -> (String, usize) {
    let spans = opaque_spans(sql);
    let mut out = String::with_capacity(sql.len() + 8);
    let mut n = 0;
    for (pos, ch) in sql.char_indices() {
        if ch == '?' && is_code(&spans, pos) {
            n += 1;
            out.push('$');
            out.push_str(&n.to_string());
        } else {
            out.push(ch);
        }
    }
    (out, n)
}

//! Normalization of domain identifiers into metric path segments.
//!
//! Role names, resource names and framework identifiers come from external
//! input and may contain `/` (hierarchical roles), whitespace or arbitrary
//! UTF-8. Metric names are slash-delimited ASCII paths, so each identifier is
//! percent-encoded before it is spliced into a name.
//!
//! The encoding is injective: `%` itself is always escaped, so two distinct
//! raw keys can never produce the same segment. It is never decoded.

/// Path delimiter used by metric names.
pub const PATH_DELIMITER: char = '/';

/// Segment produced for an empty key.
pub const EMPTY_KEY_SEGMENT: &str = "%";

/// Returns true for bytes that are passed through unencoded.
fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~' | b'*')
}

/// Normalize a raw domain key into a single metric path segment.
///
/// Every byte outside `[A-Za-z0-9-_.~*]` is written as `%XX`. A key made
/// only of dots (`.`, `..`) is fully encoded so it cannot be read as a
/// relative path component. The empty key becomes a bare `%`, which no
/// other key can produce since every literal `%` is written as `%25`.
#[must_use]
pub fn normalize(raw: &str) -> String {
    if raw.is_empty() {
        return EMPTY_KEY_SEGMENT.to_string();
    }

    let all_dots = raw.bytes().all(|b| b == b'.');

    let mut segment = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if is_unreserved(byte) && !all_dots {
            segment.push(char::from(byte));
        } else {
            segment.push_str(&format!("%{byte:02X}"));
        }
    }
    segment
}

/// Returns true if `segment` can be used verbatim as one path segment.
#[must_use]
pub fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment
            .bytes()
            .all(|b| b.is_ascii_graphic() && char::from(b) != PATH_DELIMITER)
}

#![forbid(unsafe_code)]

//! Whitespace-seam deduplication for joining separately produced fragments.
//!
//! Fragments arrive from different sources (stored nodes, streamed deltas,
//! split chunks) and both sides of a join may carry boundary whitespace. The
//! rules here only ever remove duplicated whitespace; they never invent a
//! separator.

/// Trim the lead of `next` according to the tail of `prev`.
///
/// If `prev` ends with a newline, leading newline runs in `next` are dropped.
/// If `prev` ends with a space or tab, only leading spaces/tabs are dropped; a
/// leading newline survives because newline is the stronger separator.
/// Otherwise `next` is returned unchanged.
pub fn normalize_seam<'a>(prev: &str, next: &'a str) -> &'a str {
    match prev.chars().next_back() {
        Some('\n') => next.trim_start_matches(['\r', '\n']),
        Some(' ') | Some('\t') => next.trim_start_matches([' ', '\t']),
        _ => next,
    }
}

pub fn join(prev: &str, next: &str) -> String {
    let mut out = String::with_capacity(prev.len() + next.len());
    out.push_str(prev);
    out.push_str(normalize_seam(prev, next));
    out
}

/// Fold a sequence of fragments pairwise, seeding with the first fragment.
pub fn join_all<I, S>(segments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for segment in segments {
        let segment = segment.as_ref();
        if out.is_empty() {
            out.push_str(segment);
        } else {
            let trimmed = normalize_seam(&out, segment);
            out.push_str(trimmed);
        }
    }
    out
}

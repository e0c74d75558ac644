#![forbid(unsafe_code)]

//! Static chunking of one complete text block.
//!
//! Used when a finalized unit (or imported text) should become several nodes
//! instead of one. The block is carved into ordered, trimmed chunks capped at
//! [`MAX_CHUNK_CHARS`]; the store threads the chunk list into a
//! single-child-per-node chain.

use regex::Regex;
use std::sync::LazyLock;

pub const MAX_CHUNK_CHARS: usize = 1024;

/// A cut closer than this to the window start is trivially early and skipped.
const MIN_CUT_CHARS: usize = 10;

/// Where a pattern match places the cut relative to its span.
#[derive(Clone, Copy)]
enum Cut {
    /// Cut before the match; the match opens the next chunk (headings).
    Before,
    /// Cut after the match; the delimiter stays with the closing chunk.
    After,
}

struct SplitPattern {
    regex: &'static LazyLock<Regex>,
    cut: Cut,
}

static ATX_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,6}[ \t].*$").expect("heading pattern"));

static SETEXT_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[^\n]+\r?\n(?:={3,}|-{3,})[ \t]*$").expect("underline pattern")
});

static BLANK_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\r?\n){2,}").expect("blank run pattern"));

static LINE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\r?\n").expect("line break pattern"));

static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[.!?]["'’”)\]}»]*"#).expect("sentence pattern"));

/// Ranked globally: a heading beats a blank line beats a plain line break
/// beats a sentence end, regardless of position inside the window.
static SPLIT_TABLE: &[SplitPattern] = &[
    SplitPattern {
        regex: &ATX_HEADING,
        cut: Cut::Before,
    },
    SplitPattern {
        regex: &SETEXT_HEADING,
        cut: Cut::Before,
    },
    SplitPattern {
        regex: &BLANK_RUN,
        cut: Cut::After,
    },
    SplitPattern {
        regex: &LINE_BREAK,
        cut: Cut::After,
    },
    SplitPattern {
        regex: &SENTENCE_END,
        cut: Cut::After,
    },
];

/// Partition `text` into ordered, non-empty, trimmed chunks of at most
/// [`MAX_CHUNK_CHARS`] characters. Returns `None` for empty or
/// whitespace-only input.
pub fn split_chunks(text: &str) -> Option<Vec<String>> {
    if text.trim().is_empty() {
        return None;
    }

    let mut chunks = Vec::new();
    let mut rest = text.trim_start();
    while !rest.is_empty() {
        let window_end = char_floor(rest, MAX_CHUNK_CHARS);
        if window_end == rest.len() {
            push_chunk(&mut chunks, rest);
            break;
        }
        let window = &rest[..window_end];
        let cut = best_cut(window).unwrap_or(window_end);
        push_chunk(&mut chunks, &rest[..cut]);
        rest = rest[cut..].trim_start();
    }

    if chunks.is_empty() { None } else { Some(chunks) }
}

fn push_chunk(chunks: &mut Vec<String>, raw: &str) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// Best cut inside one window: first pattern in the ranked table with any
/// non-trivial occurrence wins; among occurrences of that pattern, the last
/// one wins so chunks fill toward the cap.
fn best_cut(window: &str) -> Option<usize> {
    let min_cut = char_floor(window, MIN_CUT_CHARS + 1);
    for pattern in SPLIT_TABLE {
        let cut = pattern
            .regex
            .find_iter(window)
            .map(|m| match pattern.cut {
                Cut::Before => m.start(),
                Cut::After => m.end(),
            })
            .filter(|&cut| cut >= min_cut && cut < window.len())
            .last();
        if cut.is_some() {
            return cut;
        }
    }
    None
}

/// Byte index of the `chars`-th character, or `text.len()` when shorter.
fn char_floor(text: &str, chars: usize) -> usize {
    text.char_indices()
        .nth(chars)
        .map(|(index, _)| index)
        .unwrap_or(text.len())
}

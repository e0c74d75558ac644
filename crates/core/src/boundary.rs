#![forbid(unsafe_code)]

//! Ranked boundary tables per length mode.
//!
//! Each mode maps to an ordered list of `(priority, pattern)` pairs folded to
//! the best match. A boundary always includes its own delimiter so that the
//! emitted unit stays byte-exact to what was generated. Word mode has no
//! static pattern: a "word" is defined by provider token granularity, so the
//! segmenter handles it without scanning.

use crate::model::LengthMode;
use regex::Regex;
use std::sync::LazyLock;

/// Byte span of a boundary match, delimiter included.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Boundary {
    pub start: usize,
    pub end: usize,
}

pub struct RankedPattern {
    pub priority: u8,
    regex: &'static LazyLock<Regex>,
}

static SENTENCE_END: LazyLock<Regex> = LazyLock::new(|| {
    // A terminal character, then any run of closing quotes/brackets.
    Regex::new(r#"[.!?]["'’”)\]}»]*"#).expect("sentence pattern")
});

static BLANK_RUN_2: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\r?\n){2,}").expect("paragraph pattern"));

static BLANK_RUN_3: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\r?\n){3,}").expect("page pattern"));

static HORIZONTAL_RULE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:-{3,}|\*{3,}|_{3,})[ \t]*\r?\n").expect("rule pattern")
});

static SENTENCE_TABLE: &[RankedPattern] = &[RankedPattern {
    priority: 0,
    regex: &SENTENCE_END,
}];

static PARAGRAPH_TABLE: &[RankedPattern] = &[
    RankedPattern {
        priority: 0,
        regex: &BLANK_RUN_2,
    },
    RankedPattern {
        priority: 1,
        regex: &HORIZONTAL_RULE,
    },
];

static PAGE_TABLE: &[RankedPattern] = &[
    RankedPattern {
        priority: 0,
        regex: &BLANK_RUN_3,
    },
    RankedPattern {
        priority: 1,
        regex: &HORIZONTAL_RULE,
    },
];

/// The ranked pattern table for a mode, or `None` for the token-aware word
/// sentinel.
pub fn pattern_table(mode: LengthMode) -> Option<&'static [RankedPattern]> {
    match mode {
        LengthMode::Word => None,
        LengthMode::Sentence => Some(SENTENCE_TABLE),
        LengthMode::Paragraph => Some(PARAGRAPH_TABLE),
        LengthMode::Page => Some(PAGE_TABLE),
    }
}

/// Earliest boundary in `text` whose end falls strictly after `after` (byte
/// offset). Ties between patterns at the same end position go to the higher
/// ranked (lower priority number) pattern.
pub fn find_boundary(mode: LengthMode, text: &str, after: usize) -> Option<Boundary> {
    let table = pattern_table(mode)?;
    let mut best: Option<(usize, u8, Boundary)> = None;
    for pattern in table {
        let Some(found) = pattern
            .regex
            .find_iter(text)
            .find(|m| m.end() > after)
        else {
            continue;
        };
        let candidate = Boundary {
            start: found.start(),
            end: found.end(),
        };
        let key = (candidate.end, pattern.priority);
        if best.is_none_or(|(end, priority, _)| key < (end, priority)) {
            best = Some((key.0, key.1, candidate));
        }
    }
    best.map(|(_, _, boundary)| boundary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_mode_has_no_pattern() {
        assert!(pattern_table(LengthMode::Word).is_none());
        assert!(find_boundary(LengthMode::Word, "hello world", 0).is_none());
    }

    #[test]
    fn sentence_boundary_includes_closing_quotes() {
        let found = find_boundary(LengthMode::Sentence, "He said 'Hi.' Next", 0).unwrap();
        assert_eq!(&"He said 'Hi.' Next"[..found.end], "He said 'Hi.'");
    }

    #[test]
    fn sentence_boundary_is_the_earliest() {
        let text = "One. Two! Three?";
        let found = find_boundary(LengthMode::Sentence, text, 0).unwrap();
        assert_eq!(found.end, 4);
    }

    #[test]
    fn paragraph_cuts_at_first_blank_pair() {
        let found = find_boundary(LengthMode::Paragraph, "A\n\nB\n\nC", 0).unwrap();
        assert_eq!(found.end, 3);
    }

    #[test]
    fn paragraph_matches_horizontal_rule() {
        let text = "line one\n---\nline two";
        let found = find_boundary(LengthMode::Paragraph, text, 0).unwrap();
        assert_eq!(&text[found.start..found.end], "---\n");
    }

    #[test]
    fn page_needs_three_breaks() {
        assert!(find_boundary(LengthMode::Page, "A\n\nB", 0).is_none());
        let found = find_boundary(LengthMode::Page, "A\n\n\nB", 0).unwrap();
        assert_eq!(found.end, 4);
    }

    #[test]
    fn after_filter_is_strict() {
        // A run ending exactly at `after` must not be returned again.
        let text = "A\n\nB\n\nC";
        let found = find_boundary(LengthMode::Paragraph, text, 3).unwrap();
        assert_eq!(found.end, 6);
        assert!(find_boundary(LengthMode::Sentence, "Done.", 5).is_none());
    }

    #[test]
    fn run_straddling_after_is_found() {
        // The overlap rescan depends on runs that start before `after` still
        // matching when they end past it.
        let found = find_boundary(LengthMode::Paragraph, "A\n\n\nB", 2).unwrap();
        assert_eq!(found.start, 1);
        assert_eq!(found.end, 4);
    }

    #[test]
    fn crlf_counts_as_one_break() {
        let found = find_boundary(LengthMode::Paragraph, "A\r\n\r\nB", 0).unwrap();
        assert_eq!(found.end, 5);
    }
}

#![forbid(unsafe_code)]

//! Incremental, seam-aware segmentation of a streamed completion.
//!
//! One segmenter instance serves one request and finalizes exactly one text
//! unit: the earliest boundary for the requested length mode, or the whole
//! buffer at stream end. Instances own their accumulation buffer exclusively;
//! nothing is shared across concurrent requests.

use crate::error::GenerationError;
use crate::provider::Generation;
use futures::StreamExt;
use sl_core::model::LengthMode;
use sl_core::{boundary, seam};

/// Rescan window behind `sent_index`, so a boundary straddling a delta seam
/// is still found.
pub const OVERLAP: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Accumulating,
    Finalized,
}

pub struct Segmenter {
    mode: LengthMode,
    /// Tail of the text already emitted before this request (typically the
    /// prompt), used to seam-normalize the finalized unit.
    prior_tail: String,
    accumulated: String,
    sent_index: usize,
    state: State,
}

impl Segmenter {
    pub fn new(mode: LengthMode, prior_tail: impl Into<String>) -> Self {
        Self {
            mode,
            prior_tail: prior_tail.into(),
            accumulated: String::new(),
            sent_index: 0,
            state: State::Accumulating,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.state == State::Finalized
    }

    /// Feed one delta; returns the finalized unit on the first boundary hit.
    ///
    /// Word mode bypasses pattern scanning: the first delta containing a
    /// non-whitespace character finalizes immediately, the delta itself being
    /// the atomic unit.
    pub fn push(&mut self, delta: &str) -> Option<String> {
        if self.state == State::Finalized {
            return None;
        }
        self.accumulated.push_str(delta);

        if self.mode == LengthMode::Word {
            if delta.chars().any(|c| !c.is_whitespace()) {
                return self.finalize_at(self.accumulated.len());
            }
            return None;
        }

        // A suppressed whitespace-only lead advances `sent_index` without
        // finalizing; keep scanning the same buffer for the next boundary.
        loop {
            let scan_start =
                char_floor_at(&self.accumulated, self.sent_index.saturating_sub(OVERLAP));
            let found = boundary::find_boundary(
                self.mode,
                &self.accumulated[scan_start..],
                self.sent_index - scan_start,
            )?;
            if let Some(unit) = self.finalize_at(scan_start + found.end) {
                return Some(unit);
            }
        }
    }

    /// Stream-end flush: the remaining buffer becomes the final unit.
    pub fn finish(mut self) -> Option<String> {
        if self.state == State::Finalized {
            return None;
        }
        self.state = State::Finalized;
        let cutoff = self.accumulated.len();
        emit_unit(&self.prior_tail, &self.accumulated[self.sent_index..cutoff])
    }

    /// Emission is monotonic: `cutoff` is always strictly past `sent_index`,
    /// and a candidate that is pure whitespace only advances the index.
    fn finalize_at(&mut self, cutoff: usize) -> Option<String> {
        debug_assert!(cutoff > self.sent_index);
        let unit = emit_unit(&self.prior_tail, &self.accumulated[self.sent_index..cutoff]);
        self.sent_index = cutoff;
        if unit.is_some() {
            self.state = State::Finalized;
            tracing::debug!(mode = self.mode.as_str(), cutoff, "segment finalized");
        }
        unit
    }
}

fn emit_unit(prior_tail: &str, raw: &str) -> Option<String> {
    let unit = if prior_tail.is_empty() {
        raw.trim_start()
    } else {
        seam::normalize_seam(prior_tail, raw)
    };
    // Nothing has been emitted for this request yet, so a whitespace-only
    // candidate is a lead, never a unit.
    if unit.chars().all(char::is_whitespace) {
        None
    } else {
        Some(unit.to_string())
    }
}

/// Largest char boundary at or below `index`.
fn char_floor_at(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Drive one generation to its single finalized unit.
///
/// On the first boundary the upstream request is cancelled and the unit
/// returned without suspending again. A provider error discards the partial
/// buffer and surfaces immediately. A clean stream end flushes whatever
/// accumulated; an empty stream is an error rather than an empty node.
pub async fn drive(
    mut generation: Generation,
    mode: LengthMode,
    prior_tail: &str,
) -> Result<String, GenerationError> {
    let mut segmenter = Segmenter::new(mode, prior_tail);

    while let Some(item) = generation.stream.next().await {
        let delta = match item {
            Ok(delta) => delta,
            Err(err) => {
                tracing::debug!(error = %err, "provider failed mid-stream, discarding buffer");
                generation.cancel.cancel();
                return Err(err);
            }
        };
        if let Some(unit) = segmenter.push(&delta) {
            generation.cancel.cancel();
            return Ok(unit);
        }
    }

    segmenter.finish().ok_or(GenerationError::EmptyStream)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_all(segmenter: &mut Segmenter, deltas: &[&str]) -> Option<String> {
        for delta in deltas {
            if let Some(unit) = segmenter.push(delta) {
                return Some(unit);
            }
        }
        None
    }

    #[test]
    fn sentence_finalizes_after_closing_quote() {
        let mut segmenter = Segmenter::new(LengthMode::Sentence, "");
        let unit = push_all(&mut segmenter, &["He said ", "'Hi.'", " Next"]);
        assert_eq!(unit.as_deref(), Some("He said 'Hi.'"));
        assert!(segmenter.is_finalized());
    }

    #[test]
    fn boundary_split_across_deltas_is_found() {
        let mut segmenter = Segmenter::new(LengthMode::Paragraph, "");
        let unit = push_all(&mut segmenter, &["First paragraph.\n", "\nSecond"]);
        assert_eq!(unit.as_deref(), Some("First paragraph.\n\n"));
    }

    #[test]
    fn paragraph_cuts_at_first_blank_pair() {
        let mut segmenter = Segmenter::new(LengthMode::Paragraph, "");
        let unit = segmenter.push("A\n\nB\n\nC");
        assert_eq!(unit.as_deref(), Some("A\n\n"));
    }

    #[test]
    fn word_mode_waits_for_non_whitespace() {
        let mut segmenter = Segmenter::new(LengthMode::Word, "The quick");
        assert_eq!(segmenter.push("  "), None);
        assert_eq!(segmenter.push("\n"), None);
        let unit = segmenter.push(" brown");
        assert_eq!(unit.as_deref(), Some("  \n brown"));
    }

    #[test]
    fn word_mode_trims_lead_when_nothing_emitted() {
        let mut segmenter = Segmenter::new(LengthMode::Word, "");
        assert_eq!(segmenter.push(" fox").as_deref(), Some("fox"));
    }

    #[test]
    fn whitespace_lead_boundary_does_not_finalize() {
        // A paragraph break before any content is a lead, not a unit.
        let mut segmenter = Segmenter::new(LengthMode::Paragraph, "");
        assert_eq!(segmenter.push("\n\n"), None);
        assert!(!segmenter.is_finalized());
        let unit = segmenter.push("Real text.\n\nMore");
        assert_eq!(unit.as_deref(), Some("Real text.\n\n"));
    }

    #[test]
    fn whitespace_lead_after_prompt_does_not_finalize() {
        // Same suppression with a prompt ending in non-whitespace: the lead
        // break must not become the unit even when the boundary table matches
        // it first, and the rest of the delta is scanned in the same push.
        let mut segmenter = Segmenter::new(LengthMode::Paragraph, "He left.");
        let unit = segmenter.push("\n\nThe next day it rained.\n\nMore");
        assert_eq!(unit.as_deref(), Some("The next day it rained.\n\n"));
    }

    #[test]
    fn whitespace_lead_after_prompt_is_suppressed_across_pushes() {
        let mut segmenter = Segmenter::new(LengthMode::Page, "Chapter end.");
        assert_eq!(segmenter.push("\n\n\n"), None);
        assert!(!segmenter.is_finalized());
        let unit = segmenter.push("It rained.\n\n\nNext");
        assert_eq!(unit.as_deref(), Some("It rained.\n\n\n"));
    }

    #[test]
    fn seam_normalized_against_prior_tail() {
        let mut segmenter = Segmenter::new(LengthMode::Sentence, "Chapter one.\n");
        let unit = segmenter.push("\n\nIt began. And then");
        assert_eq!(unit.as_deref(), Some("It began."));
    }

    #[test]
    fn finish_flushes_remaining_buffer() {
        let mut segmenter = Segmenter::new(LengthMode::Sentence, "");
        assert_eq!(segmenter.push("no terminal here"), None);
        assert_eq!(segmenter.finish().as_deref(), Some("no terminal here"));
    }

    #[test]
    fn finish_after_finalize_yields_nothing() {
        let mut segmenter = Segmenter::new(LengthMode::Sentence, "");
        assert!(segmenter.push("Done. Extra tail").is_some());
        assert_eq!(segmenter.finish(), None);
    }

    #[test]
    fn pushes_after_finalize_are_ignored() {
        let mut segmenter = Segmenter::new(LengthMode::Sentence, "");
        assert_eq!(segmenter.push("One.").as_deref(), Some("One."));
        assert_eq!(segmenter.push(" Two."), None);
    }

    #[test]
    fn overlap_rescan_stays_on_char_boundaries() {
        let mut segmenter = Segmenter::new(LengthMode::Sentence, "");
        let lead = "é".repeat(40);
        assert_eq!(segmenter.push(&lead), None);
        let unit = segmenter.push("fin.");
        assert_eq!(unit, Some(format!("{lead}fin.")));
    }
}

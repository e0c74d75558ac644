#![forbid(unsafe_code)]

use sl_core::seam;

/// Build a prompt from a root-to-cursor path of node texts, deduplicating
/// boundary whitespace at every seam.
pub fn assemble_prompt<I, S>(texts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    seam::join_all(texts)
}

#![forbid(unsafe_code)]

//! Generation side of storyloom: a provider-agnostic streaming completion
//! interface, the seam-aware stream segmenter that decides where a
//! continuation stops, and prompt assembly over the seam normalizer.

mod error;
mod prompt;
mod provider;
mod segmenter;
mod sse;

pub use error::GenerationError;
pub use prompt::assemble_prompt;
pub use provider::{
    CancelHandle, DeltaStream, Generation, GenerationOptions, GenerationProvider,
};
pub use segmenter::{OVERLAP, Segmenter, drive};
pub use sse::SseProvider;

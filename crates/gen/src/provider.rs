#![forbid(unsafe_code)]

use crate::error::GenerationError;
use async_trait::async_trait;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_stream::Stream;

/// Tuning knobs for one completion request. `max_chars` is advisory: the
/// provider translates it into its own length limit, and the segmenter still
/// finalizes on stream end if the budget runs out without a boundary.
#[derive(Clone, Debug)]
pub struct GenerationOptions {
    pub model: String,
    pub temperature: Option<f32>,
    pub max_chars: Option<usize>,
}

impl GenerationOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: None,
            max_chars: None,
        }
    }
}

/// Ordered text deltas from a streaming provider. Deltas may split a
/// boundary across a seam; the segmenter compensates with its overlap rescan.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String, GenerationError>> + Send>>;

/// One in-flight completion: the delta stream plus its cancellation handle.
pub struct Generation {
    pub stream: DeltaStream,
    pub cancel: CancelHandle,
}

impl Generation {
    pub fn new(stream: DeltaStream, cancel: CancelHandle) -> Self {
        Self { stream, cancel }
    }
}

/// Cooperative, idempotent cancellation. The first `cancel()` wins; the
/// stream observes the flag between deltas and terminates, which releases
/// the upstream connection exactly once.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Returns true only for the call that actually
    /// flipped the flag, so release-once bookkeeping stays trivial.
    pub fn cancel(&self) -> bool {
        let first = !self.cancelled.swap(true, Ordering::SeqCst);
        if first {
            tracing::debug!("generation cancelled");
        }
        first
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// A generic token-streaming text-completion capability. The segmenter
/// depends only on this shape, never on transport, authentication, or a
/// model catalogue.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn stream_completion(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<Generation, GenerationError>;

    fn name(&self) -> &str;
}

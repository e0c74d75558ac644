#![forbid(unsafe_code)]

use thiserror::Error;

/// Failures on the generation path. A provider error always discards any
/// partially buffered text; partial output is never surfaced as complete.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("provider error: {0}")]
    Provider(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("provider returned no content")]
    EmptyStream,

    #[error("invalid configuration: {0}")]
    Config(String),
}

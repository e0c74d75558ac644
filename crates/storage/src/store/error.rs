#![forbid(unsafe_code)]

/// Wire-facing error grouping: hosts choose between surfacing and redirecting
/// based on the category, not the concrete variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    NotFound,
    Validation,
    Internal,
}

impl ErrorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Validation => "validation",
            Self::Internal => "internal",
        }
    }
}

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Sql(rusqlite::Error),
    InvalidInput(&'static str),
    StoryNotFound,
    NodeNotFound,
}

impl StoreError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::StoryNotFound | Self::NodeNotFound => ErrorCategory::NotFound,
            Self::InvalidInput(_) => ErrorCategory::Validation,
            Self::Io(_) | Self::Sql(_) => ErrorCategory::Internal,
        }
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io: {err}"),
            Self::Sql(err) => write!(f, "sqlite: {err}"),
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::StoryNotFound => write!(f, "story not found"),
            Self::NodeNotFound => write!(f, "node not found"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql(value)
    }
}

#![forbid(unsafe_code)]

//! Opaque identifiers for stories and nodes.
//!
//! Ids are random tokens, not meaningful keys: 16 random bytes rendered as
//! lowercase hex behind a short type prefix. Lookups elsewhere accept either
//! an id or a slug, so the prefix also disambiguates the two forms.

const TOKEN_BYTES: usize = 16;
const STORY_PREFIX: &str = "st_";
const NODE_PREFIX: &str = "nd_";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdError {
    Empty,
    TooLong,
    BadPrefix,
    InvalidChar { ch: char, index: usize },
}

impl IdError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Empty => "id must not be empty",
            Self::TooLong => "id is too long",
            Self::BadPrefix => "id has the wrong prefix",
            Self::InvalidChar { .. } => "id contains an invalid character",
        }
    }
}

fn validate_token(prefix: &str, value: &str) -> Result<(), IdError> {
    if value.is_empty() {
        return Err(IdError::Empty);
    }
    if value.len() > 64 {
        return Err(IdError::TooLong);
    }
    let Some(body) = value.strip_prefix(prefix) else {
        return Err(IdError::BadPrefix);
    };
    for (index, ch) in body.chars().enumerate() {
        if ch.is_ascii_alphanumeric() {
            continue;
        }
        return Err(IdError::InvalidChar {
            ch,
            index: index + prefix.len(),
        });
    }
    Ok(())
}

fn random_token(prefix: &str) -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    // Ids must not repeat; a zeroed fallback would collide on the next insert.
    getrandom::getrandom(&mut bytes).expect("operating system RNG unavailable");
    let mut out = String::with_capacity(prefix.len() + TOKEN_BYTES * 2);
    out.push_str(prefix);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoryId(String);

impl StoryId {
    pub fn generate() -> Self {
        Self(random_token(STORY_PREFIX))
    }

    pub fn try_new(value: impl Into<String>) -> Result<Self, IdError> {
        let value = value.into();
        validate_token(STORY_PREFIX, &value)?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(String);

impl NodeId {
    pub fn generate() -> Self {
        Self(random_token(NODE_PREFIX))
    }

    pub fn try_new(value: impl Into<String>) -> Result<Self, IdError> {
        let value = value.into();
        validate_token(NODE_PREFIX, &value)?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

const SLUG_MAX_LEN: usize = 64;
const SLUG_FALLBACK: &str = "story";

/// Derive a URL-safe slug from a title: lowercase, non-alphanumeric runs
/// collapsed to a single hyphen, trimmed, length-capped. Empty input falls
/// back to `"story"`. Collision disambiguation lives in the store.
pub fn slugify(title: &str) -> String {
    let mut out = String::with_capacity(title.len().min(SLUG_MAX_LEN));
    let mut pending_hyphen = false;
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_hyphen && !out.is_empty() {
                out.push('-');
            }
            pending_hyphen = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
        if out.len() >= SLUG_MAX_LEN {
            break;
        }
    }
    out.truncate(SLUG_MAX_LEN);
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() {
        SLUG_FALLBACK.to_string()
    } else {
        out
    }
}

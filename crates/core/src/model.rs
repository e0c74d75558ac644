#![forbid(unsafe_code)]

use crate::ids::{NodeId, StoryId};

/// A titled collection of nodes forming one branching narrative, rooted at
/// exactly one node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Story {
    pub id: StoryId,
    pub slug: String,
    pub title: String,
    pub root_id: NodeId,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

/// A span of text at a fixed tree position.
///
/// `active_child_id` is a weak back-reference used for favored-path walks; the
/// owning edges run parent -> child through `parent_id`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub story_id: StoryId,
    pub parent_id: Option<NodeId>,
    pub depth: u32,
    pub choice_index: u32,
    pub text: String,
    pub active_child_id: Option<NodeId>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl Node {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// The granularity at which generation is instructed to stop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LengthMode {
    Word,
    Sentence,
    Paragraph,
    Page,
}

impl LengthMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Word => "word",
            Self::Sentence => "sentence",
            Self::Paragraph => "paragraph",
            Self::Page => "page",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "word" => Some(Self::Word),
            "sentence" => Some(Self::Sentence),
            "paragraph" => Some(Self::Paragraph),
            "page" => Some(Self::Page),
            _ => None,
        }
    }
}

#![forbid(unsafe_code)]

use sl_core::{Node, NodeId, Story};

/// Missing optional fields fall back to defaults instead of failing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CreateStoryRequest {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub root_text: Option<String>,
}

/// `story` accepts an id or a slug, as everywhere in the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateChildRequest {
    pub story: String,
    pub parent_id: String,
    pub text: String,
    /// Insertion position among existing siblings; `None` appends. Clamped to
    /// the valid range.
    pub choice_index: Option<u32>,
    pub make_active: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateNodeRequest {
    pub story: String,
    pub node_id: String,
    pub text: Option<String>,
    pub active_child_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowRequest {
    pub story: String,
    /// Defaults to the story root.
    pub cursor: Option<String>,
    pub ancestors: usize,
    pub descendants: usize,
    pub siblings: usize,
}

/// One windowed view around a cursor: the ancestor chain (oldest first), the
/// favored descendant path, and a sibling slice for every node of interest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowView {
    pub story: Story,
    pub cursor: Node,
    pub ancestors: Vec<Node>,
    pub favored_path: Vec<Node>,
    pub sibling_groups: Vec<(NodeId, Vec<Node>)>,
}

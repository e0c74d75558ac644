#![forbid(unsafe_code)]

//! Windowed read views around a cursor: ancestor chain, favored descendant
//! path, and sibling slices. Read-only; the mutation paths live in the store
//! module.

use super::{NODE_COLUMNS, SqliteStore, StoreError, WindowRequest, WindowView, node_from_row};
use rusqlite::{Connection, params};
use sl_core::{Node, NodeId, StoryId};
use std::collections::BTreeSet;

impl SqliteStore {
    /// Assemble the display window around `cursor` (default: the story root).
    ///
    /// Every node of interest — the cursor, each ancestor, each favored-path
    /// node — gets its own sibling slice, because every displayed node must
    /// expose its local alternatives.
    pub fn get_window(&self, request: WindowRequest) -> Result<WindowView, StoreError> {
        let conn = self.connection();
        let story = super::story_by_ref(conn, &request.story)?;
        let cursor_ref = request
            .cursor
            .as_deref()
            .unwrap_or_else(|| story.root_id.as_str());
        let cursor = super::node_in_story(conn, &story.id, cursor_ref)?;

        let ancestors = ancestors_of(conn, &story.id, &cursor, request.ancestors)?;
        let favored_path = favored_path_of(conn, &story.id, &cursor, request.descendants)?;

        let mut sibling_groups = Vec::new();
        let mut seen = BTreeSet::new();
        for node in std::iter::once(&cursor)
            .chain(ancestors.iter())
            .chain(favored_path.iter())
        {
            if !seen.insert(node.id.clone()) {
                continue;
            }
            let group = sibling_slice_of(conn, &story.id, node, request.siblings)?;
            sibling_groups.push((node.id.clone(), group));
        }

        Ok(WindowView {
            story,
            cursor,
            ancestors,
            favored_path,
            sibling_groups,
        })
    }
}

/// Walk parent links to the root, oldest first, truncated to `depth` nearest
/// ancestors.
fn ancestors_of(
    conn: &Connection,
    story_id: &StoryId,
    cursor: &Node,
    depth: usize,
) -> Result<Vec<Node>, StoreError> {
    let mut chain = Vec::new();
    let mut current = cursor.parent_id.clone();
    while let Some(parent_id) = current {
        if chain.len() >= depth {
            break;
        }
        let parent = super::node_in_story(conn, story_id, parent_id.as_str())?;
        current = parent.parent_id.clone();
        chain.push(parent);
    }
    chain.reverse();
    Ok(chain)
}

/// Walk forward choosing `active_child_id` when set, else the lowest
/// `choice_index` child; stop at `depth` or a childless node.
fn favored_path_of(
    conn: &Connection,
    story_id: &StoryId,
    cursor: &Node,
    depth: usize,
) -> Result<Vec<Node>, StoreError> {
    let mut path = Vec::new();
    let mut current = cursor.clone();
    while path.len() < depth {
        let next = match current.active_child_id {
            Some(ref child_id) => Some(super::node_in_story(conn, story_id, child_id.as_str())?),
            None => first_child_of(conn, story_id, &current.id)?,
        };
        let Some(next) = next else {
            break;
        };
        current = next.clone();
        path.push(next);
    }
    Ok(path)
}

/// Up to `span` siblings on each side of `node`, bounds-clamped. The root is
/// its own singleton group.
fn sibling_slice_of(
    conn: &Connection,
    story_id: &StoryId,
    node: &Node,
    span: usize,
) -> Result<Vec<Node>, StoreError> {
    let Some(ref parent_id) = node.parent_id else {
        return Ok(vec![node.clone()]);
    };
    let siblings = children_of(conn, story_id, parent_id)?;
    let position = siblings
        .iter()
        .position(|sibling| sibling.id == node.id)
        .ok_or(StoreError::InvalidInput("node missing from sibling order"))?;
    let start = position.saturating_sub(span);
    let end = (position + span + 1).min(siblings.len());
    Ok(siblings[start..end].to_vec())
}

fn children_of(
    conn: &Connection,
    story_id: &StoryId,
    parent_id: &NodeId,
) -> Result<Vec<Node>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {NODE_COLUMNS} FROM nodes \
         WHERE story_id=?1 AND parent_id=?2 \
         ORDER BY choice_index ASC"
    ))?;
    let mut rows = stmt.query(params![story_id.as_str(), parent_id.as_str()])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(node_from_row(row)?);
    }
    Ok(out)
}

fn first_child_of(
    conn: &Connection,
    story_id: &StoryId,
    parent_id: &NodeId,
) -> Result<Option<Node>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {NODE_COLUMNS} FROM nodes \
         WHERE story_id=?1 AND parent_id=?2 \
         ORDER BY choice_index ASC LIMIT 1"
    ))?;
    let mut rows = stmt.query(params![story_id.as_str(), parent_id.as_str()])?;
    match rows.next()? {
        Some(row) => Ok(Some(node_from_row(row)?)),
        None => Ok(None),
    }
}

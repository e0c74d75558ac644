#![forbid(unsafe_code)]

//! JSON rendering of store records. Timestamps go out both as raw
//! milliseconds and as RFC3339 on story summaries, since clients sort on the
//! former and display the latter.

use serde_json::{Map, Value, json};
use sl_core::{Node, Story};
use sl_storage::WindowView;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

pub(crate) fn story_json(story: &Story) -> Value {
    json!({
        "id": story.id.as_str(),
        "slug": story.slug,
        "title": story.title,
        "root_id": story.root_id.as_str(),
        "created_at_ms": story.created_at_ms,
        "created_at": ts_ms_to_rfc3339(story.created_at_ms),
        "updated_at_ms": story.updated_at_ms,
        "updated_at": ts_ms_to_rfc3339(story.updated_at_ms),
    })
}

pub(crate) fn node_json(node: &Node) -> Value {
    json!({
        "id": node.id.as_str(),
        "story_id": node.story_id.as_str(),
        "parent_id": node.parent_id.as_ref().map(|id| id.as_str()),
        "depth": node.depth,
        "choice_index": node.choice_index,
        "text": node.text,
        "active_child_id": node.active_child_id.as_ref().map(|id| id.as_str()),
        "created_at_ms": node.created_at_ms,
        "updated_at_ms": node.updated_at_ms,
    })
}

/// Sibling groups render as an object keyed by node id; group order inside
/// each value follows choice_index, as stored.
pub(crate) fn window_json(view: &WindowView) -> Value {
    let mut groups = Map::new();
    for (node_id, siblings) in &view.sibling_groups {
        groups.insert(
            node_id.as_str().to_string(),
            Value::Array(siblings.iter().map(node_json).collect()),
        );
    }
    json!({
        "story": story_json(&view.story),
        "cursor": node_json(&view.cursor),
        "ancestors": view.ancestors.iter().map(node_json).collect::<Vec<_>>(),
        "favored_path": view.favored_path.iter().map(node_json).collect::<Vec<_>>(),
        "sibling_groups": Value::Object(groups),
    })
}

fn ts_ms_to_rfc3339(ms: i64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .ok()
        .and_then(|ts| ts.format(&Rfc3339).ok())
        .unwrap_or_else(|| ms.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_format_as_rfc3339() {
        assert_eq!(ts_ms_to_rfc3339(0), "1970-01-01T00:00:00Z");
        assert_eq!(ts_ms_to_rfc3339(1_500_000_000_123), "2017-07-14T02:40:00.123Z");
    }
}

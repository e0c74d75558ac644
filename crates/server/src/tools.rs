#![forbid(unsafe_code)]

use crate::render::{node_json, story_json, window_json};
use crate::server::Server;
use serde_json::{Value, json};
use sl_core::LengthMode;
use sl_core::splitter::split_chunks;
use sl_gen::{GenerationError, GenerationOptions, assemble_prompt, drive};
use sl_storage::{
    CreateChildRequest, CreateStoryRequest, StoreError, UpdateNodeRequest, WindowRequest,
};

const DEFAULT_ANCESTORS: usize = 3;
const DEFAULT_DESCENDANTS: usize = 3;
const DEFAULT_SIBLINGS: usize = 2;

pub(crate) fn tool_definitions() -> Vec<Value> {
    vec![
        json!({
            "name": "story_list",
            "description": "List all stories in creation order.",
            "inputSchema": { "type": "object", "properties": {} }
        }),
        json!({
            "name": "story_create",
            "description": "Create a story with its root node. Missing fields fall back to defaults.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "title": { "type": "string" },
                    "slug": { "type": "string" },
                    "root_text": { "type": "string" }
                }
            }
        }),
        json!({
            "name": "story_get",
            "description": "Fetch one story by id or slug.",
            "inputSchema": {
                "type": "object",
                "properties": { "story": { "type": "string" } },
                "required": ["story"]
            }
        }),
        json!({
            "name": "window_get",
            "description": "Fetch a windowed view (ancestors, favored path, sibling groups) around a cursor. An unknown story falls back to the most recently updated one.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "story": { "type": "string" },
                    "cursor": { "type": "string", "description": "Node id; defaults to the story root." },
                    "ancestors": { "type": "integer" },
                    "descendants": { "type": "integer" },
                    "siblings": { "type": "integer" }
                },
                "required": ["story"]
            }
        }),
        json!({
            "name": "node_create_child",
            "description": "Insert a child under a parent node, shifting later siblings to keep choice indexes contiguous.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "story": { "type": "string" },
                    "parent_id": { "type": "string" },
                    "text": { "type": "string" },
                    "choice_index": { "type": "integer" },
                    "make_active": { "type": "boolean" }
                },
                "required": ["story", "parent_id", "text"]
            }
        }),
        json!({
            "name": "node_update",
            "description": "Edit a node's text and/or reassign its active child.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "story": { "type": "string" },
                    "node_id": { "type": "string" },
                    "text": { "type": "string" },
                    "active_child_id": { "type": "string" }
                },
                "required": ["story", "node_id"]
            }
        }),
        json!({
            "name": "node_generate",
            "description": "Stream a continuation from the configured provider, cut it at the requested granularity and store it beneath the parent node.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "story": { "type": "string" },
                    "parent_id": { "type": "string" },
                    "length_mode": { "type": "string", "enum": ["word", "sentence", "paragraph", "page"] },
                    "model": { "type": "string" },
                    "temperature": { "type": "number" },
                    "max_chars": { "type": "integer" },
                    "split": { "type": "boolean", "description": "Explode the generated unit into a parent->child chain of chunks." }
                },
                "required": ["story", "parent_id"]
            }
        }),
    ]
}

pub(crate) fn dispatch_tool(server: &mut Server, name: &str, args: &Value) -> Option<Value> {
    let result = match name {
        "story_list" => story_list(server),
        "story_create" => story_create(server, args),
        "story_get" => story_get(server, args),
        "window_get" => window_get(server, args),
        "node_create_child" => node_create_child(server, args),
        "node_update" => node_update(server, args),
        "node_generate" => node_generate(server, args),
        _ => return None,
    };
    Some(result.unwrap_or_else(|response| response))
}

pub(crate) fn ok_body(result: Value) -> Value {
    json!({ "success": true, "result": result, "error": null })
}

pub(crate) fn error_body(category: &str, message: &str) -> Value {
    json!({
        "success": false,
        "result": null,
        "error": { "category": category, "message": message }
    })
}

fn store_error(err: StoreError) -> Value {
    error_body(err.category().as_str(), &err.to_string())
}

fn generation_error(err: GenerationError) -> Value {
    error_body("generation_failed", &err.to_string())
}

fn require_str(args: &Value, key: &str) -> Result<String, Value> {
    optional_str(args, key)?
        .ok_or_else(|| error_body("validation", &format!("{key} is required")))
}

fn optional_str(args: &Value, key: &str) -> Result<Option<String>, Value> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(v)) => Ok(Some(v.clone())),
        Some(_) => Err(error_body("validation", &format!("{key} must be a string"))),
    }
}

fn optional_u64(args: &Value, key: &str) -> Result<Option<u64>, Value> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value.as_u64().map(Some).ok_or_else(|| {
            error_body(
                "validation",
                &format!("{key} must be a non-negative integer"),
            )
        }),
    }
}

fn optional_bool(args: &Value, key: &str) -> Result<Option<bool>, Value> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(v)) => Ok(Some(*v)),
        Some(_) => Err(error_body("validation", &format!("{key} must be a boolean"))),
    }
}

fn optional_f64(args: &Value, key: &str) -> Result<Option<f64>, Value> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or_else(|| error_body("validation", &format!("{key} must be a number"))),
    }
}

fn window_request(args: &Value, story: String, cursor: Option<String>) -> Result<WindowRequest, Value> {
    Ok(WindowRequest {
        story,
        cursor,
        ancestors: optional_u64(args, "ancestors")?
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_ANCESTORS),
        descendants: optional_u64(args, "descendants")?
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_DESCENDANTS),
        siblings: optional_u64(args, "siblings")?
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_SIBLINGS),
    })
}

fn default_window(server: &Server, story: &str, cursor: &str) -> Result<Value, Value> {
    let view = server
        .store
        .get_window(WindowRequest {
            story: story.to_string(),
            cursor: Some(cursor.to_string()),
            ancestors: DEFAULT_ANCESTORS,
            descendants: DEFAULT_DESCENDANTS,
            siblings: DEFAULT_SIBLINGS,
        })
        .map_err(store_error)?;
    Ok(window_json(&view))
}

fn story_list(server: &mut Server) -> Result<Value, Value> {
    let stories = server.store.list_stories().map_err(store_error)?;
    Ok(ok_body(json!({
        "stories": stories.iter().map(story_json).collect::<Vec<_>>()
    })))
}

fn story_create(server: &mut Server, args: &Value) -> Result<Value, Value> {
    let request = CreateStoryRequest {
        title: optional_str(args, "title")?,
        slug: optional_str(args, "slug")?,
        root_text: optional_str(args, "root_text")?,
    };
    let (story, root) = server.store.create_story(request).map_err(store_error)?;
    Ok(ok_body(json!({
        "story": story_json(&story),
        "root": node_json(&root)
    })))
}

fn story_get(server: &mut Server, args: &Value) -> Result<Value, Value> {
    let story_ref = require_str(args, "story")?;
    let story = server.store.get_story(&story_ref).map_err(store_error)?;
    Ok(ok_body(json!({ "story": story_json(&story) })))
}

/// Home-view redirect: an unknown story ref falls back to the most recently
/// updated story when one exists, so a stale client link still lands somewhere.
fn window_get(server: &mut Server, args: &Value) -> Result<Value, Value> {
    let story_ref = require_str(args, "story")?;
    let (story, cursor) = match server.store.get_story(&story_ref) {
        Ok(story) => (story, optional_str(args, "cursor")?),
        Err(StoreError::StoryNotFound) => match server.store.primary_story().map_err(store_error)? {
            Some(primary) => {
                tracing::debug!(requested = %story_ref, fallback = %primary.slug, "story fallback");
                (primary, None)
            }
            None => return Err(store_error(StoreError::StoryNotFound)),
        },
        Err(err) => return Err(store_error(err)),
    };

    let request = window_request(args, story.id.as_str().to_string(), cursor)?;
    let view = server.store.get_window(request).map_err(store_error)?;
    Ok(ok_body(window_json(&view)))
}

fn node_create_child(server: &mut Server, args: &Value) -> Result<Value, Value> {
    let request = CreateChildRequest {
        story: require_str(args, "story")?,
        parent_id: require_str(args, "parent_id")?,
        text: require_str(args, "text")?,
        choice_index: optional_u64(args, "choice_index")?.map(|v| v as u32),
        make_active: optional_bool(args, "make_active")?.unwrap_or(false),
    };
    let child = server.store.create_child(request).map_err(store_error)?;
    let window = default_window(server, child.story_id.as_str(), child.id.as_str())?;
    Ok(ok_body(json!({
        "child": node_json(&child),
        "window": window
    })))
}

fn node_update(server: &mut Server, args: &Value) -> Result<Value, Value> {
    let request = UpdateNodeRequest {
        story: require_str(args, "story")?,
        node_id: require_str(args, "node_id")?,
        text: optional_str(args, "text")?,
        active_child_id: optional_str(args, "active_child_id")?,
    };
    let node = server.store.update_node(request).map_err(store_error)?;
    Ok(ok_body(json!({ "node": node_json(&node) })))
}

/// Prompt assembly and provider streaming happen entirely before any write;
/// a storage transaction is never open while awaiting the provider.
fn node_generate(server: &mut Server, args: &Value) -> Result<Value, Value> {
    let story_ref = require_str(args, "story")?;
    let parent_ref = require_str(args, "parent_id")?;
    let mode = match optional_str(args, "length_mode")? {
        Some(label) => LengthMode::from_str(&label).ok_or_else(|| {
            error_body(
                "validation",
                "length_mode must be one of: word|sentence|paragraph|page",
            )
        })?,
        None => LengthMode::Sentence,
    };
    let split = optional_bool(args, "split")?.unwrap_or(false);

    let mut options = GenerationOptions::new(
        optional_str(args, "model")?.unwrap_or_else(|| server.default_model.clone()),
    );
    options.temperature = optional_f64(args, "temperature")?.map(|v| v as f32);
    options.max_chars = optional_u64(args, "max_chars")?.map(|v| v as usize);

    let provider = server.provider.clone().ok_or_else(|| {
        error_body(
            "generation_failed",
            "no generation provider configured (set STORYLOOM_API_BASE)",
        )
    })?;

    let story = server.store.get_story(&story_ref).map_err(store_error)?;
    let parent = server
        .store
        .get_node(story.id.as_str(), &parent_ref)
        .map_err(store_error)?;

    // Root-to-parent path, assembled with seam-deduplicated joins.
    let path = server
        .store
        .get_window(WindowRequest {
            story: story.id.as_str().to_string(),
            cursor: Some(parent.id.as_str().to_string()),
            ancestors: parent.depth as usize,
            descendants: 0,
            siblings: 0,
        })
        .map_err(store_error)?;
    let prompt = assemble_prompt(
        path.ancestors
            .iter()
            .map(|node| node.text.as_str())
            .chain(std::iter::once(path.cursor.text.as_str())),
    );

    tracing::debug!(
        story = %story.id.as_str(),
        parent = %parent.id.as_str(),
        mode = mode.as_str(),
        prompt_chars = prompt.chars().count(),
        "generation start"
    );
    let unit = server
        .runtime
        .block_on(async {
            let generation = provider.stream_completion(&prompt, &options).await?;
            drive(generation, mode, &prompt).await
        })
        .map_err(generation_error)?;

    let nodes = if split {
        let Some(chunks) = split_chunks(&unit) else {
            return Err(error_body(
                "generation_failed",
                "provider returned no usable text",
            ));
        };
        server
            .store
            .create_chain(story.id.as_str(), parent.id.as_str(), &chunks)
            .map_err(store_error)?
    } else {
        let child = server
            .store
            .create_child(CreateChildRequest {
                story: story.id.as_str().to_string(),
                parent_id: parent.id.as_str().to_string(),
                text: unit,
                choice_index: None,
                make_active: true,
            })
            .map_err(store_error)?;
        vec![child]
    };

    let Some(last) = nodes.last() else {
        return Err(error_body("internal", "chain write produced no nodes"));
    };
    let window = default_window(server, story.id.as_str(), last.id.as_str())?;
    Ok(ok_body(json!({
        "nodes": nodes.iter().map(node_json).collect::<Vec<_>>(),
        "window": window
    })))
}

#![forbid(unsafe_code)]

use async_trait::async_trait;
use futures::stream;
use serde_json::{Value, json};
use sl_gen::{
    CancelHandle, Generation, GenerationError, GenerationOptions, GenerationProvider,
};
use sl_server::{JsonRpcRequest, Server};
use sl_storage::SqliteStore;
use std::path::PathBuf;
use std::sync::Arc;

fn temp_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = base.join(format!("sl_server_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn server(test_name: &str) -> Server {
    server_with_provider(test_name, None)
}

fn server_with_provider(
    test_name: &str,
    provider: Option<Arc<dyn GenerationProvider>>,
) -> Server {
    let store = SqliteStore::open(temp_dir(test_name)).expect("open store");
    Server::new(store, provider, "test-model".to_string()).expect("build server")
}

/// Replays a fixed delta script for every request.
struct ScriptedProvider {
    deltas: Vec<String>,
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    async fn stream_completion(
        &self,
        _prompt: &str,
        _options: &GenerationOptions,
    ) -> Result<Generation, GenerationError> {
        let deltas: Vec<Result<String, GenerationError>> =
            self.deltas.iter().cloned().map(Ok).collect();
        Ok(Generation::new(
            Box::pin(stream::iter(deltas)),
            CancelHandle::new(),
        ))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn scripted(deltas: &[&str]) -> Option<Arc<dyn GenerationProvider>> {
    Some(Arc::new(ScriptedProvider {
        deltas: deltas.iter().map(|d| d.to_string()).collect(),
    }))
}

fn success(response: &Value) -> bool {
    response["success"].as_bool().expect("success flag")
}

fn error_category(response: &Value) -> &str {
    response["error"]["category"].as_str().expect("category")
}

#[test]
fn story_create_and_list_round_trip() {
    let mut server = server("story_create_list");
    let created = server.call_tool("story_create", json!({ "title": "My Story" }));
    assert!(success(&created));
    assert_eq!(created["result"]["story"]["slug"], "my-story");
    assert_eq!(created["result"]["root"]["depth"], 0);

    let listed = server.call_tool("story_list", json!({}));
    assert!(success(&listed));
    let stories = listed["result"]["stories"].as_array().expect("stories");
    assert_eq!(stories.len(), 1);
    assert_eq!(stories[0]["title"], "My Story");
}

#[test]
fn story_get_unknown_is_not_found() {
    let mut server = server("story_get_unknown");
    let response = server.call_tool("story_get", json!({ "story": "nope" }));
    assert!(!success(&response));
    assert_eq!(error_category(&response), "not_found");
}

#[test]
fn malformed_payload_is_validation() {
    let mut server = server("malformed_payload");
    let response = server.call_tool("story_get", json!({ "story": 42 }));
    assert!(!success(&response));
    assert_eq!(error_category(&response), "validation");

    let response = server.call_tool("node_create_child", json!({ "story": "s" }));
    assert_eq!(error_category(&response), "validation");
}

#[test]
fn unknown_tool_is_reported() {
    let mut server = server("unknown_tool");
    let response = server.call_tool("story_delete", json!({}));
    assert!(!success(&response));
    assert!(
        response["error"]["message"]
            .as_str()
            .expect("message")
            .contains("story_delete")
    );
}

#[test]
fn window_get_falls_back_to_primary_story() {
    let mut server = server("window_fallback");
    server.call_tool("story_create", json!({ "title": "First" }));
    server.call_tool("story_create", json!({ "title": "Second" }));

    let response = server.call_tool("window_get", json!({ "story": "gone" }));
    assert!(success(&response));
    // Most recently updated story wins the redirect.
    assert_eq!(response["result"]["story"]["slug"], "second");
    assert_eq!(response["result"]["ancestors"].as_array().map(Vec::len), Some(0));
}

#[test]
fn window_get_without_any_story_is_not_found() {
    let mut server = server("window_empty");
    let response = server.call_tool("window_get", json!({ "story": "gone" }));
    assert!(!success(&response));
    assert_eq!(error_category(&response), "not_found");
}

#[test]
fn node_create_child_returns_child_and_window() {
    let mut server = server("create_child");
    let created = server.call_tool(
        "story_create",
        json!({ "title": "Tale", "root_text": "Once." }),
    );
    let root_id = created["result"]["root"]["id"].as_str().expect("root id");

    let response = server.call_tool(
        "node_create_child",
        json!({
            "story": "tale",
            "parent_id": root_id,
            "text": " It began.",
            "make_active": true
        }),
    );
    assert!(success(&response));
    assert_eq!(response["result"]["child"]["depth"], 1);
    assert_eq!(response["result"]["child"]["choice_index"], 0);
    let window = &response["result"]["window"];
    assert_eq!(window["cursor"]["id"], response["result"]["child"]["id"]);
    assert_eq!(window["ancestors"].as_array().map(Vec::len), Some(1));

    let groups = window["sibling_groups"].as_object().expect("groups");
    assert!(groups.contains_key(root_id));
}

#[test]
fn node_update_rejects_non_child_active_pointer() {
    let mut server = server("update_validation");
    let created = server.call_tool("story_create", json!({ "title": "Tale" }));
    let root_id = created["result"]["root"]["id"].as_str().expect("root id");

    let response = server.call_tool(
        "node_update",
        json!({ "story": "tale", "node_id": root_id, "active_child_id": root_id }),
    );
    assert!(!success(&response));
    assert_eq!(error_category(&response), "validation");
}

#[test]
fn node_generate_without_provider_fails() {
    let mut server = server("generate_unconfigured");
    let created = server.call_tool("story_create", json!({ "title": "Tale" }));
    let root_id = created["result"]["root"]["id"].as_str().expect("root id");

    let response = server.call_tool(
        "node_generate",
        json!({ "story": "tale", "parent_id": root_id }),
    );
    assert!(!success(&response));
    assert_eq!(error_category(&response), "generation_failed");
}

#[test]
fn node_generate_stores_one_sentence() {
    let mut server = server_with_provider(
        "generate_sentence",
        scripted(&["It began", " quietly. And then the", " rest."]),
    );
    let created = server.call_tool(
        "story_create",
        json!({ "title": "Tale", "root_text": "Once upon a time. " }),
    );
    let root_id = created["result"]["root"]["id"].as_str().expect("root id");

    let response = server.call_tool(
        "node_generate",
        json!({ "story": "tale", "parent_id": root_id, "length_mode": "sentence" }),
    );
    assert!(success(&response));
    let nodes = response["result"]["nodes"].as_array().expect("nodes");
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0]["text"], "It began quietly.");
    assert_eq!(nodes[0]["depth"], 1);

    // The new node became the root's favored child.
    let window = &response["result"]["window"];
    assert_eq!(window["cursor"]["id"], nodes[0]["id"]);
    assert_eq!(window["ancestors"][0]["active_child_id"], nodes[0]["id"]);
}

#[test]
fn node_generate_bad_length_mode_is_validation() {
    let mut server = server_with_provider("generate_bad_mode", scripted(&["x."]));
    let created = server.call_tool("story_create", json!({ "title": "Tale" }));
    let root_id = created["result"]["root"]["id"].as_str().expect("root id");

    let response = server.call_tool(
        "node_generate",
        json!({ "story": "tale", "parent_id": root_id, "length_mode": "chapter" }),
    );
    assert!(!success(&response));
    assert_eq!(error_category(&response), "validation");
}

#[test]
fn node_generate_split_writes_a_chain() {
    // Two paragraphs either side of a blank line, long enough that the
    // splitter has to cut inside its first window.
    let first = format!("{}.", "alpha ".repeat(180).trim_end());
    let second = format!("{}.", "beta ".repeat(40).trim_end());
    let body = format!("{first}\n\n{second}\n\n\ntrailing");

    let mut server = server_with_provider("generate_split", scripted(&[&body]));
    let created = server.call_tool(
        "story_create",
        json!({ "title": "Tale", "root_text": "Once." }),
    );
    let root_id = created["result"]["root"]["id"].as_str().expect("root id");

    let response = server.call_tool(
        "node_generate",
        json!({
            "story": "tale",
            "parent_id": root_id,
            "length_mode": "page",
            "split": true
        }),
    );
    assert!(success(&response));
    let nodes = response["result"]["nodes"].as_array().expect("nodes");
    assert!(nodes.len() >= 2, "expected a chain, got {}", nodes.len());
    // Chain links: each node's parent is the previous one.
    assert_eq!(nodes[0]["parent_id"], root_id);
    for pair in nodes.windows(2) {
        assert_eq!(pair[1]["parent_id"], pair[0]["id"]);
        assert_eq!(pair[0]["active_child_id"], pair[1]["id"]);
    }
}

#[test]
fn protocol_initialize_then_tools_list() {
    let mut server = server("protocol");

    let parse = |raw: Value| -> JsonRpcRequest {
        serde_json::from_value(raw).expect("request")
    };

    // Tool calls are rejected until the client confirms initialization.
    let early = server
        .handle(parse(json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" })))
        .expect("response");
    assert_eq!(early["error"]["code"], -32002);

    let init = server
        .handle(parse(json!({ "jsonrpc": "2.0", "id": 2, "method": "initialize" })))
        .expect("response");
    assert_eq!(init["result"]["serverInfo"]["name"], "storyloom");

    assert!(
        server
            .handle(parse(json!({ "jsonrpc": "2.0", "method": "notifications/initialized" })))
            .is_none()
    );

    let listed = server
        .handle(parse(json!({ "jsonrpc": "2.0", "id": 3, "method": "tools/list" })))
        .expect("response");
    let tools = listed["result"]["tools"].as_array().expect("tools");
    let names: Vec<&str> = tools
        .iter()
        .filter_map(|tool| tool["name"].as_str())
        .collect();
    assert!(names.contains(&"story_create"));
    assert!(names.contains(&"node_generate"));

    let called = server
        .handle(parse(json!({
            "jsonrpc": "2.0",
            "id": 4,
            "method": "tools/call",
            "params": { "name": "story_list", "arguments": {} }
        })))
        .expect("response");
    assert_eq!(called["result"]["isError"], false);
}

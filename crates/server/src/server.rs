#![forbid(unsafe_code)]

use crate::jsonrpc::{JsonRpcRequest, json_rpc_error, json_rpc_response, tool_text_content};
use crate::tools;
use serde_json::{Value, json};
use sl_gen::GenerationProvider;
use sl_storage::SqliteStore;
use std::io::{BufRead, BufReader, Write};
use std::sync::Arc;

// Protocol negotiation: some clients are strict about the server echoing a
// compatible protocol version, so this stays at the widely deployed baseline.
const MCP_VERSION: &str = "2024-11-05";
const SERVER_NAME: &str = "storyloom";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct Server {
    initialized: bool,
    pub(crate) store: SqliteStore,
    pub(crate) provider: Option<Arc<dyn GenerationProvider>>,
    pub(crate) default_model: String,
    // Tool dispatch is synchronous; the generation path blocks on this
    // runtime while streaming, with no storage transaction open.
    pub(crate) runtime: tokio::runtime::Runtime,
}

impl Server {
    pub fn new(
        store: SqliteStore,
        provider: Option<Arc<dyn GenerationProvider>>,
        default_model: String,
    ) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            initialized: false,
            store,
            provider,
            default_model,
            runtime,
        })
    }

    pub fn handle(&mut self, request: JsonRpcRequest) -> Option<Value> {
        let method = request.method.as_str();

        if method == "initialize" {
            return Some(json_rpc_response(
                request.id,
                json!({
                    "protocolVersion": MCP_VERSION,
                    "serverInfo": { "name": SERVER_NAME, "version": SERVER_VERSION },
                    "capabilities": { "tools": {} }
                }),
            ));
        }

        if !self.initialized && method != "notifications/initialized" {
            return Some(json_rpc_error(request.id, -32002, "Server not initialized"));
        }

        if method == "notifications/initialized" {
            self.initialized = true;
            return None;
        }

        if method == "ping" {
            return Some(json_rpc_response(request.id, json!({})));
        }

        // Some clients probe optional resources methods by default; advertise
        // an empty resource set rather than erroring.
        if method == "resources/list" {
            return Some(json_rpc_response(request.id, json!({ "resources": [] })));
        }
        if method == "resources/read" {
            return Some(json_rpc_response(request.id, json!({ "contents": [] })));
        }

        if method == "tools/list" {
            return Some(json_rpc_response(
                request.id,
                json!({ "tools": tools::tool_definitions() }),
            ));
        }

        if method == "tools/call" {
            let Some(params) = request.params.as_ref().and_then(|v| v.as_object()) else {
                return Some(json_rpc_error(request.id, -32602, "params must be an object"));
            };
            let tool_name = params.get("name").and_then(|v| v.as_str()).unwrap_or("");
            let args = params
                .get("arguments")
                .cloned()
                .unwrap_or_else(|| json!({}));
            let response_body = self.call_tool(tool_name, args);

            return Some(json_rpc_response(
                request.id,
                json!({
                    "content": [tool_text_content(&response_body)],
                    "isError": !response_body
                        .get("success")
                        .and_then(|v| v.as_bool())
                        .unwrap_or(false)
                }),
            ));
        }

        Some(json_rpc_error(
            request.id,
            -32601,
            &format!("Method not found: {method}"),
        ))
    }

    pub fn call_tool(&mut self, name: &str, args: Value) -> Value {
        tracing::debug!(tool = name, "tool call");
        match tools::dispatch_tool(self, name, &args) {
            Some(response) => response,
            None => tools::error_body("validation", &format!("Unknown tool: {name}")),
        }
    }
}

/// Line-delimited JSON-RPC over stdio. stdout carries protocol frames only;
/// logging goes to stderr.
pub fn run_stdio(server: &mut Server) -> std::io::Result<()> {
    let stdin = std::io::stdin();
    let mut reader = BufReader::new(stdin.lock());
    let mut stdout = std::io::stdout().lock();
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Ok(());
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<JsonRpcRequest>(trimmed) {
            Ok(request) => server.handle(request),
            Err(err) => Some(json_rpc_error(None, -32700, &format!("Parse error: {err}"))),
        };
        if let Some(response) = response {
            serde_json::to_writer(&mut stdout, &response)?;
            stdout.write_all(b"\n")?;
            stdout.flush()?;
        }
    }
}

//! MCP JSON-RPC server over stdio (newline-delimited messages).

use std::io::{self, BufRead, Write as IoWrite};

use litehub_core::Error;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::ops::Gateway;
use crate::tools::Registry;

/// Protocol revisions we can speak, newest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] =
    &["2025-11-25", "2025-06-18", "2025-03-26", "2024-11-05"];

const INSTRUCTIONS: &str = "litehub: git and GitHub operations with bounded responses. \
List operations return {count, has_next, next_cursor}; pass next_cursor back as cursor to \
continue. A missing PR/issue yields not_found: true, not an error. Failures return \
{ok: false, code, error}.";

/// Echo the client's version when supported, otherwise offer our newest.
pub fn negotiate_version(requested: Option<&str>) -> &'static str {
    requested
        .and_then(|r| SUPPORTED_PROTOCOL_VERSIONS.iter().find(|v| **v == r))
        .copied()
        .unwrap_or(SUPPORTED_PROTOCOL_VERSIONS[0])
}

/// Everything a request needs: the services and the tool table.
pub struct McpServer {
    pub gateway: Gateway,
    pub registry: Registry,
}

impl McpServer {
    pub fn new(gateway: Gateway) -> Self {
        McpServer { gateway, registry: Registry::new() }
    }
}

/// `{ok: false, code, error}` for a failed operation.
pub fn error_envelope(err: &Error) -> Value {
    json!({ "ok": false, "code": err.code(), "error": err.to_string() })
}

fn rpc_error(id: Option<Value>, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id.unwrap_or(Value::Null),
        "error": { "code": code, "message": message }
    })
}

fn tool_result(value: &Value, is_error: bool) -> Value {
    json!({
        "content": [{ "type": "text", "text": value.to_string() }],
        "structuredContent": value,
        "isError": is_error
    })
}

fn call_tool(server: &McpServer, id: Option<Value>, params: &Value) -> Value {
    let Some(name) = params["name"].as_str() else {
        return rpc_error(id, -32602, "Invalid params: missing tool name");
    };
    let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

    let result = match server.registry.call(&server.gateway, name, arguments) {
        None => return rpc_error(id, -32602, &format!("Unknown tool: {name}")),
        Some(Ok(value)) => tool_result(&value, false),
        Some(Err(err)) => {
            if err.is_validation() {
                debug!(tool = name, error = %err, "Rejected");
            } else {
                warn!(tool = name, code = err.code(), error = %err, "Tool failed");
            }
            tool_result(&error_envelope(&err), true)
        }
    };
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

/// Handle one JSON-RPC message. Returns `None` for notifications.
pub fn dispatch_jsonrpc(server: &McpServer, msg: &Value) -> Option<Value> {
    let method = msg["method"].as_str().unwrap_or("");
    let id = msg.get("id").cloned();

    if id.is_none() || method.starts_with("notifications/") {
        debug!(method, "Notification");
        return None;
    }

    let response = match method {
        "initialize" => {
            let requested = msg["params"]["protocolVersion"].as_str();
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {
                    "protocolVersion": negotiate_version(requested),
                    "capabilities": { "tools": {} },
                    "serverInfo": {
                        "name": "litehub",
                        "version": env!("CARGO_PKG_VERSION")
                    },
                    "instructions": INSTRUCTIONS
                }
            })
        }
        "tools/list" => json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": { "tools": server.registry.list_json() }
        }),
        "tools/call" => {
            let params = msg.get("params").cloned().unwrap_or(Value::Null);
            debug!(tool = params["name"].as_str().unwrap_or(""), "tools/call");
            call_tool(server, id, &params)
        }
        "ping" => json!({ "jsonrpc": "2.0", "id": id, "result": {} }),
        _ => rpc_error(id, -32601, "Method not found"),
    };
    Some(response)
}

/// Serve requests from stdin until EOF, one response line per request.
pub fn run_mcp(server: &McpServer) {
    let stdin = io::stdin();
    let stdout = io::stdout();
    info!(tools = server.registry.tools().len(), "MCP server ready");

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                warn!(error = %e, "stdin closed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Value>(&line) {
            Ok(msg) => dispatch_jsonrpc(server, &msg),
            Err(_) => Some(rpc_error(None, -32700, "Parse error")),
        };
        let Some(response) = response else { continue };

        let mut out = stdout.lock();
        let _ = writeln!(out, "{response}");
        let _ = out.flush();
    }
    info!("stdin EOF, shutting down");
}

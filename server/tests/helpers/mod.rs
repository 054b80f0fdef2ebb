//! Test harness for MCP tool integration tests.
//!
//! Copies a fixture project into a temp dir, commits it with the real `git`,
//! and dispatches JSON-RPC requests via `dispatch_jsonrpc()` directly (no
//! subprocess for the server). `gh` is never run for real: the harness points
//! the gateway at a nonexistent `gh` binary and scripts its responses.

use litehub_core::testing::{RecordingSleeper, ScriptedRunner};
use litehub_core::exec::SystemRunner;
use litehub_server::mcp::{dispatch_jsonrpc, McpServer};
use litehub_server::ops::Gateway;
use litehub_server::Config;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use tempfile::TempDir;

/// Program name scripted `gh` responses must be registered under.
pub const GH: &str = "litehub-test-gh";

pub struct TestHarness {
    pub server: McpServer,
    pub runner: Arc<ScriptedRunner>,
    pub sleeper: Arc<RecordingSleeper>,
    pub root: PathBuf,
    _temp_dir: TempDir,
}

fn copy_dir(src: &Path, dst: &Path) {
    std::fs::create_dir_all(dst).expect("create dir");
    for entry in std::fs::read_dir(src).expect("read fixture dir") {
        let entry = entry.expect("fixture entry");
        let target = dst.join(entry.file_name());
        if entry.path().is_dir() {
            copy_dir(&entry.path(), &target);
        } else {
            std::fs::copy(entry.path(), &target).expect("copy fixture file");
        }
    }
}

/// Run git in `dir`, asserting success; returns trimmed stdout.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .args(["-c", "user.email=test@test.com", "-c", "user.name=Test"])
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .output()
        .expect("git failed to start");
    assert!(
        out.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

impl TestHarness {
    /// Fixture repo with no scripted `gh` responses.
    pub fn from_fixture(name: &str) -> Self {
        Self::with_gh(name, ScriptedRunner::new())
    }

    /// Fixture repo plus scripted `gh` responses; everything else runs for real.
    pub fn with_gh(name: &str, scripted: ScriptedRunner) -> Self {
        let fixture_src =
            Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name);
        assert!(fixture_src.exists(), "Fixture '{name}' not found at {}", fixture_src.display());

        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().join("repo");
        copy_dir(&fixture_src, &root);

        git(&root, &["init", "--quiet"]);
        git(&root, &["add", "-A"]);
        git(&root, &["commit", "--quiet", "-m", "Initial commit"]);

        let runner = Arc::new(scripted.with_fallback(Arc::new(SystemRunner)));
        let sleeper = Arc::new(RecordingSleeper::default());
        let config = Config { gh_bin: GH.to_string(), ..Config::default() };
        let gateway = Gateway::new(&config, runner.clone(), sleeper.clone());

        TestHarness {
            server: McpServer::new(gateway),
            runner,
            sleeper,
            root,
            _temp_dir: temp_dir,
        }
    }

    pub fn root_str(&self) -> String {
        self.root.display().to_string()
    }

    /// A path inside the temp dir that does not exist yet.
    pub fn scratch_path(&self, name: &str) -> String {
        self._temp_dir.path().join(name).display().to_string()
    }

    pub fn git(&self, args: &[&str]) -> String {
        git(&self.root, args)
    }

    /// Send a JSON-RPC request and return the response.
    pub fn dispatch(&self, msg: Value) -> Option<Value> {
        dispatch_jsonrpc(&self.server, &msg)
    }

    /// Call a tool by name. Returns (structured result, is_error).
    pub fn call_tool(&self, tool: &str, args: Value) -> (Value, bool) {
        let msg = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": { "name": tool, "arguments": args }
        });
        let resp = self.dispatch(msg).expect("Expected response for tools/call");
        let result = &resp["result"];
        assert!(result.is_object(), "tools/call returned no result: {resp}");
        // Text content mirrors the structured payload.
        let text = result["content"][0]["text"].as_str().unwrap_or("");
        let parsed: Value = serde_json::from_str(text).expect("text content is JSON");
        assert_eq!(parsed, result["structuredContent"]);
        (result["structuredContent"].clone(), result["isError"].as_bool().unwrap_or(false))
    }

    /// Call a tool that must succeed.
    pub fn ok(&self, tool: &str, args: Value) -> Value {
        let (out, is_error) = self.call_tool(tool, args);
        assert!(!is_error, "{tool} failed: {out}");
        out
    }

    /// Call a tool that must fail; returns the error `code`.
    pub fn err_code(&self, tool: &str, args: Value) -> String {
        let (out, is_error) = self.call_tool(tool, args);
        assert!(is_error, "{tool} unexpectedly succeeded: {out}");
        assert_eq!(out["ok"], false);
        out["code"].as_str().unwrap_or_default().to_string()
    }

    /// Send an initialize request and return the response.
    pub fn initialize(&self) -> Value {
        let msg = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-11-25",
                "capabilities": {},
                "clientInfo": { "name": "test", "version": "0.1.0" }
            }
        });
        self.dispatch(msg).expect("Expected initialize response")
    }
}

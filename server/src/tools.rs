//! Tool registry: the callable operation surface and its dispatch table.
//!
//! Built once at startup and shared read-only. Also measures the serialized
//! size of its own description against the context budget.

use std::collections::BTreeMap;

use litehub_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::ops::Gateway;
use crate::tokenizer::Tokenizer;

/// Ceilings for the full registry listing, input schemas included.
pub const BUDGET_BYTES: usize = 8192;
pub const BUDGET_TOKENS: usize = 2000;

pub type Handler = fn(&Gateway, Value) -> Result<Value>;

pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
    handler: Handler,
}

/// Deserialize arguments, run the operation, serialize its record.
fn invoke<P, R>(args: Value, op: impl FnOnce(P) -> Result<R>) -> Result<Value>
where
    P: DeserializeOwned,
    R: Serialize,
{
    let args = if args.is_null() { json!({}) } else { args };
    let params: P = serde_json::from_value(args)
        .map_err(|e| Error::validation(format!("invalid arguments: {e}")))?;
    record(op(params)?)
}

fn record<R: Serialize>(out: R) -> Result<Value> {
    serde_json::to_value(out).map_err(|e| Error::parse("operation result", e))
}

fn schema(properties: Value, required: &[&str]) -> Value {
    json!({ "type": "object", "properties": properties, "required": required })
}

fn page_props(mut props: Value) -> Value {
    if let Some(map) = props.as_object_mut() {
        map.insert("limit".into(), json!({ "type": "integer", "minimum": 1 }));
        map.insert("cursor".into(), json!({ "type": "string" }));
    }
    props
}

fn string() -> Value {
    json!({ "type": "string" })
}

fn list_schema() -> Value {
    schema(
        page_props(json!({
            "repo": string(),
            "state": { "type": "string", "description": "open|closed|merged|all" },
            "author": string(),
            "label": string(),
        })),
        &["repo"],
    )
}

fn number_schema(extra: Value, required: &[&str]) -> Value {
    let mut props = json!({ "repo": string(), "number": { "type": "integer", "minimum": 1 } });
    if let (Some(map), Some(extra)) = (props.as_object_mut(), extra.as_object()) {
        map.extend(extra.clone());
    }
    schema(props, required)
}

pub struct Registry {
    tools: Vec<ToolSpec>,
    index: BTreeMap<&'static str, usize>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        let tools = vec![
            ToolSpec {
                name: "repo.branches.list",
                description: "List local branches (sorted, optional literal prefix). Paged.",
                input_schema: schema(
                    page_props(json!({ "repo_path": string(), "prefix": string() })),
                    &["repo_path"],
                ),
                handler: |gw, a| invoke(a, |p| gw.branches_list(p)),
            },
            ToolSpec {
                name: "repo.resolve",
                description: "Origin URL, owner/name, default branch and HEAD of a local repo.",
                input_schema: schema(json!({ "repo_path": string() }), &["repo_path"]),
                handler: |gw, a| invoke(a, |p| gw.resolve(p)),
            },
            ToolSpec {
                name: "repo.refs.get",
                description: "Resolve a ref to a commit sha. Give exactly one of repo_path or repo (owner/name).",
                input_schema: schema(
                    json!({ "repo_path": string(), "repo": string(), "ref": string() }),
                    &["ref"],
                ),
                handler: |gw, a| invoke(a, |p| gw.refs_get(p)),
            },
            ToolSpec {
                name: "file.tree",
                description: "Recursive file list {path, blob_sha} at a ref, under an optional relative base_path. Paged.",
                input_schema: schema(
                    page_props(json!({ "repo_path": string(), "ref": string(), "base_path": string() })),
                    &["repo_path", "ref"],
                ),
                handler: |gw, a| invoke(a, |p| gw.tree(p)),
            },
            ToolSpec {
                name: "file.blob",
                description: "Blob bytes (base64) from offset, at most max_bytes; resume at next_offset.",
                input_schema: schema(
                    json!({
                        "repo_path": string(),
                        "blob_sha": string(),
                        "max_bytes": { "type": "integer", "minimum": 1 },
                        "offset": { "type": "integer", "minimum": 0 },
                    }),
                    &["repo_path", "blob_sha"],
                ),
                handler: |gw, a| invoke(a, |p| gw.blob(p)),
            },
            ToolSpec {
                name: "search.files",
                description: "Line search {path, line, excerpt} over repo files, optionally scoped to paths. Paged.",
                input_schema: schema(
                    page_props(json!({
                        "repo_path": string(),
                        "pattern": string(),
                        "paths": { "type": "array", "items": string() },
                    })),
                    &["repo_path", "pattern"],
                ),
                handler: |gw, a| invoke(a, |p| gw.search(p)),
            },
            ToolSpec {
                name: "pr.list",
                description: "Pull request numbers, newest first, filtered by state/author/label. Paged.",
                input_schema: list_schema(),
                handler: |gw, a| invoke(a, |p| gw.pr_list(p)),
            },
            ToolSpec {
                name: "pr.get",
                description: "Pull request metadata.",
                input_schema: number_schema(json!({}), &["repo", "number"]),
                handler: |gw, a| invoke(a, |p| gw.pr_get(p)),
            },
            ToolSpec {
                name: "pr.files",
                description: "Files changed by a pull request. Paged.",
                input_schema: number_schema(page_props(json!({})), &["repo", "number"]),
                handler: |gw, a| invoke(a, |p| gw.pr_files(p)),
            },
            ToolSpec {
                name: "pr.timeline",
                description: "Pull request activity {type, actor, created_at}. Paged.",
                input_schema: number_schema(page_props(json!({})), &["repo", "number"]),
                handler: |gw, a| invoke(a, |p| gw.timeline(p)),
            },
            ToolSpec {
                name: "pr.comment",
                description: "Comment on a pull request.",
                input_schema: number_schema(json!({ "body": string() }), &["repo", "number", "body"]),
                handler: |gw, a| invoke(a, |p| gw.pr_comment(p)),
            },
            ToolSpec {
                name: "pr.review",
                description: "Review a pull request: approve, request_changes or comment.",
                input_schema: number_schema(
                    json!({ "event": string(), "body": string() }),
                    &["repo", "number", "event"],
                ),
                handler: |gw, a| invoke(a, |p| gw.pr_review(p)),
            },
            ToolSpec {
                name: "pr.merge",
                description: "Merge a pull request: merge, squash or rebase.",
                input_schema: number_schema(json!({ "method": string() }), &["repo", "number"]),
                handler: |gw, a| invoke(a, |p| gw.pr_merge(p)),
            },
            ToolSpec {
                name: "issue.list",
                description: "Issue numbers, newest first, filtered by state/author/label. Paged.",
                input_schema: list_schema(),
                handler: |gw, a| invoke(a, |p| gw.issue_list(p)),
            },
            ToolSpec {
                name: "issue.get",
                description: "Issue metadata.",
                input_schema: number_schema(json!({}), &["repo", "number"]),
                handler: |gw, a| invoke(a, |p| gw.issue_get(p)),
            },
            ToolSpec {
                name: "issue.timeline",
                description: "Issue activity {type, actor, created_at}. Paged.",
                input_schema: number_schema(page_props(json!({})), &["repo", "number"]),
                handler: |gw, a| invoke(a, |p| gw.timeline(p)),
            },
            ToolSpec {
                name: "issue.comment",
                description: "Comment on an issue.",
                input_schema: number_schema(json!({ "body": string() }), &["repo", "number", "body"]),
                handler: |gw, a| invoke(a, |p| gw.issue_comment(p)),
            },
            ToolSpec {
                name: "gh.whoami",
                description: "Report whether gh is installed and authenticated.",
                input_schema: schema(json!({}), &[]),
                handler: |gw, _| record(gw.whoami()),
            },
            ToolSpec {
                name: "gh.ping",
                description: "Health check.",
                input_schema: schema(json!({}), &[]),
                handler: |gw, _| record(gw.ping()),
            },
        ];
        let index = tools.iter().enumerate().map(|(i, t)| (t.name, i)).collect();
        Registry { tools, index }
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    pub fn tools(&self) -> &[ToolSpec] {
        &self.tools
    }

    /// Dispatch by name. `None` when no such tool is registered.
    pub fn call(&self, gateway: &Gateway, name: &str, args: Value) -> Option<Result<Value>> {
        self.get(name).map(|tool| (tool.handler)(gateway, args))
    }

    /// MCP `tools/list` payload.
    pub fn list_json(&self) -> Value {
        Value::Array(
            self.tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "inputSchema": t.input_schema,
                    })
                })
                .collect(),
        )
    }

    fn serialized(&self, with_schemas: bool) -> String {
        let items: Vec<Value> = self
            .tools
            .iter()
            .map(|t| {
                let mut item = json!({ "name": t.name, "description": t.description });
                if with_schemas {
                    item["input_schema"] = t.input_schema.clone();
                }
                item
            })
            .collect();
        Value::Array(items).to_string()
    }

    /// Measure the registry description against the context budget.
    pub fn budget(&self, tokenizer: &dyn Tokenizer) -> BudgetReport {
        let minimal = self.serialized(false);
        let full = self.serialized(true);
        let tokens = tokenizer.count_tokens(&full);
        BudgetReport::new(minimal.len(), full.len(), tokens, tokenizer.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BudgetReport {
    pub ok: bool,
    pub tool_registry_bytes_min: usize,
    pub tool_registry_bytes: usize,
    pub tool_registry_tokens: usize,
    pub tokenizer: String,
}

impl BudgetReport {
    /// Only the full listing is judged; the minimal size is informational.
    pub fn new(bytes_min: usize, bytes: usize, tokens: usize, tokenizer: &str) -> Self {
        BudgetReport {
            ok: bytes <= BUDGET_BYTES && tokens <= BUDGET_TOKENS,
            tool_registry_bytes_min: bytes_min,
            tool_registry_bytes: bytes,
            tool_registry_tokens: tokens,
            tokenizer: tokenizer.to_string(),
        }
    }

    /// Failure envelope with each metric beside its ceiling.
    pub fn exceeded_json(&self) -> Value {
        json!({
            "ok": false,
            "code": "CONTEXT_BUDGET_EXCEEDED",
            "metrics": {
                "tool_registry_bytes_min": { "value": self.tool_registry_bytes_min },
                "tool_registry_bytes": { "value": self.tool_registry_bytes, "budget": BUDGET_BYTES },
                "tool_registry_tokens": { "value": self.tool_registry_tokens, "budget": BUDGET_TOKENS },
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::BytesEstimateTokenizer;

    #[test]
    fn registry_fits_context_budget() {
        let report = Registry::new().budget(&BytesEstimateTokenizer);
        assert!(report.ok, "{report:?}");
        assert!(report.tool_registry_bytes <= BUDGET_BYTES);
        assert!(report.tool_registry_tokens <= BUDGET_TOKENS);
        assert!(report.tool_registry_bytes_min < report.tool_registry_bytes);
    }

    #[test]
    fn budget_judges_the_full_listing() {
        assert!(BudgetReport::new(1000, 8192, 2000, "bytes-estimate").ok);
        // A small minimal listing does not excuse an oversized schema listing.
        assert!(!BudgetReport::new(1000, 8193, 1500, "bytes-estimate").ok);
        assert!(!BudgetReport::new(1000, 6000, 2001, "bytes-estimate").ok);
        assert!(!BudgetReport::new(1000, 32_768, 4000, "bytes-estimate").ok);
    }

    #[test]
    fn names_are_unique_and_indexed() {
        let registry = Registry::new();
        assert_eq!(registry.index.len(), registry.tools().len());
        for name in [
            "repo.branches.list",
            "repo.resolve",
            "repo.refs.get",
            "file.tree",
            "file.blob",
            "search.files",
            "pr.list",
            "pr.get",
            "pr.files",
            "pr.timeline",
            "pr.comment",
            "pr.review",
            "pr.merge",
            "issue.list",
            "issue.get",
            "issue.timeline",
            "issue.comment",
            "gh.whoami",
            "gh.ping",
        ] {
            assert!(registry.get(name).is_some(), "missing {name}");
        }
    }

    #[test]
    fn schemas_are_objects_with_required_lists() {
        for tool in Registry::new().tools() {
            assert_eq!(tool.input_schema["type"], "object", "{}", tool.name);
            assert!(tool.input_schema["required"].is_array(), "{}", tool.name);
        }
    }

    #[test]
    fn exceeded_envelope_names_code() {
        let report = BudgetReport::new(1, 99_999, 1, "bytes-estimate");
        assert!(!report.ok);
        let v = report.exceeded_json();
        assert_eq!(v["code"], "CONTEXT_BUDGET_EXCEEDED");
        assert_eq!(v["metrics"]["tool_registry_bytes"]["budget"], BUDGET_BYTES);
        assert_eq!(v["metrics"]["tool_registry_tokens"]["budget"], BUDGET_TOKENS);
    }
}

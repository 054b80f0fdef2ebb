//! Pull-request and issue primitives over the `gh` CLI.
//!
//! Every list/detail read goes through `gh api -i` so the response headers are
//! visible: reads are revalidated against the [`RevalidationCache`] with
//! `If-None-Match`, retried under the [`BackoffPolicy`] on rate limiting, and a
//! 404 becomes a successful, empty result flagged `not_found`.

use crate::backoff::{with_backoff, Attempt, BackoffPolicy, Sleeper};
use crate::cache::{CacheKey, RevalidationCache};
use crate::envelope::{status_from_stderr, Envelope};
use crate::error::{Error, Result};
use crate::exec::{CommandOutput, CommandRunner, Invocation, SPAWN_FAILURE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// Filter vocabulary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PrState {
    Open,
    Closed,
    Merged,
    All,
}

impl PrState {
    /// Absent means `open`; `any` and anything unrecognized mean `all`.
    pub fn normalize(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("open") => PrState::Open,
            Some("closed") => PrState::Closed,
            Some("merged") => PrState::Merged,
            _ => PrState::All,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PrState::Open => "open",
            PrState::Closed => "closed",
            PrState::Merged => "merged",
            PrState::All => "all",
        }
    }

    fn api_state(self) -> &'static str {
        match self {
            PrState::Open => "open",
            PrState::Closed | PrState::Merged => "closed",
            PrState::All => "all",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
    All,
}

impl IssueState {
    /// Absent means `open`; `merged` means `closed`; `any` and anything
    /// unrecognized mean `all`.
    pub fn normalize(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("open") => IssueState::Open,
            Some("closed") | Some("merged") => IssueState::Closed,
            _ => IssueState::All,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IssueState::Open => "open",
            IssueState::Closed => "closed",
            IssueState::All => "all",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewEvent {
    Approve,
    RequestChanges,
    Comment,
}

impl ReviewEvent {
    /// Unknown events fall back to a plain review comment.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "approve" => ReviewEvent::Approve,
            "request_changes" | "request-changes" => ReviewEvent::RequestChanges,
            _ => ReviewEvent::Comment,
        }
    }

    fn flag(self) -> &'static str {
        match self {
            ReviewEvent::Approve => "--approve",
            ReviewEvent::RequestChanges => "--request-changes",
            ReviewEvent::Comment => "--comment",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMethod {
    Merge,
    Squash,
    Rebase,
}

impl MergeMethod {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "merge" => Ok(MergeMethod::Merge),
            "squash" => Ok(MergeMethod::Squash),
            "rebase" => Ok(MergeMethod::Rebase),
            other => Err(Error::validation(format!(
                "method must be one of merge, squash, rebase (got '{other}')"
            ))),
        }
    }

    fn flag(self) -> &'static str {
        match self {
            MergeMethod::Merge => "--merge",
            MergeMethod::Squash => "--squash",
            MergeMethod::Rebase => "--rebase",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListFilters {
    pub state: Option<String>,
    pub author: Option<String>,
    pub label: Option<String>,
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Filters as actually applied, echoed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterEcho {
    pub state: &'static str,
    pub author: Option<String>,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdList {
    pub filters: FilterEcho,
    pub ids: Vec<u64>,
    pub not_found: bool,
}

/// A full collection from the remote, or an empty one when the target is missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub not_found: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullRequest {
    pub repo: String,
    pub number: u64,
    pub state: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub draft: Option<bool>,
    pub additions: Option<u64>,
    pub deletions: Option<u64>,
    pub head_ref: Option<String>,
    pub base_ref: Option<String>,
    pub created_at: Option<String>,
    pub merged_at: Option<String>,
    pub not_found: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub repo: String,
    pub number: u64,
    pub state: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub labels: Vec<String>,
    pub comments: Option<u64>,
    pub created_at: Option<String>,
    pub closed_at: Option<String>,
    pub not_found: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChange {
    pub path: String,
    pub status: Option<String>,
    pub additions: Option<u64>,
    pub deletions: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineEvent {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub actor: Option<String>,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionResult {
    pub ok: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserInfo {
    pub login: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthStatus {
    pub ok: bool,
    pub authed: bool,
    pub user: Option<UserInfo>,
    /// Token scopes as reported by `gh auth status`; empty when not shown.
    pub scopes: Vec<String>,
    pub host: Option<String>,
    pub code: Option<&'static str>,
    pub error: Option<String>,
}

/// Host and token scopes from `gh auth status` text, e.g.
/// `Logged in to github.com account me (keyring)` and
/// `Token scopes: 'gist', 'repo'`.
fn parse_auth_details(text: &str) -> (Option<String>, Vec<String>) {
    let mut host = None;
    let mut scopes = Vec::new();
    for line in text.lines() {
        if host.is_none() {
            if let Some((_, rest)) = line.split_once("Logged in to ") {
                host = rest.split_whitespace().next().map(str::to_string);
            }
        }
        if let Some((_, rest)) = line.split_once("Token scopes:") {
            scopes = rest
                .split(',')
                .map(|s| s.trim().trim_matches(|c| c == '\'' || c == '"').to_string())
                .filter(|s| !s.is_empty() && s != "none")
                .collect();
        }
    }
    (host, scopes)
}

// ---------------------------------------------------------------------------
// Wire shapes (only the fields we read)
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ApiUser {
    login: Option<String>,
    name: Option<String>,
}

#[derive(Deserialize)]
struct ApiLabel {
    name: Option<String>,
}

#[derive(Deserialize)]
struct ApiBranchRef {
    #[serde(rename = "ref")]
    name: Option<String>,
}

#[derive(Deserialize)]
struct ApiPull {
    number: u64,
    state: Option<String>,
    title: Option<String>,
    user: Option<ApiUser>,
    #[serde(default)]
    labels: Vec<ApiLabel>,
    draft: Option<bool>,
    additions: Option<u64>,
    deletions: Option<u64>,
    head: Option<ApiBranchRef>,
    base: Option<ApiBranchRef>,
    created_at: Option<String>,
    merged_at: Option<String>,
}

#[derive(Deserialize)]
struct ApiIssue {
    number: u64,
    state: Option<String>,
    title: Option<String>,
    user: Option<ApiUser>,
    #[serde(default)]
    labels: Vec<ApiLabel>,
    comments: Option<u64>,
    created_at: Option<String>,
    closed_at: Option<String>,
    pull_request: Option<Value>,
}

#[derive(Deserialize)]
struct ApiFile {
    filename: String,
    status: Option<String>,
    additions: Option<u64>,
    deletions: Option<u64>,
}

#[derive(Deserialize)]
struct ApiCommitAuthor {
    name: Option<String>,
    date: Option<String>,
}

#[derive(Deserialize)]
struct ApiEvent {
    event: Option<String>,
    actor: Option<ApiUser>,
    user: Option<ApiUser>,
    author: Option<ApiCommitAuthor>,
    created_at: Option<String>,
    submitted_at: Option<String>,
}

impl ApiEvent {
    fn normalize(self) -> TimelineEvent {
        let actor = self
            .actor
            .and_then(|u| u.login)
            .or_else(|| self.user.and_then(|u| u.login))
            .or_else(|| self.author.as_ref().and_then(|a| a.name.clone()));
        let created_at = self
            .created_at
            .or(self.submitted_at)
            .or_else(|| self.author.and_then(|a| a.date));
        TimelineEvent { kind: self.event, actor, created_at }
    }
}

fn login(user: Option<ApiUser>) -> Option<String> {
    user.and_then(|u| u.login)
}

fn label_names(labels: Vec<ApiLabel>) -> Vec<String> {
    labels.into_iter().filter_map(|l| l.name).collect()
}

fn decode_list<T: DeserializeOwned>(what: &str, body: Value) -> Result<Vec<T>> {
    if body.is_null() {
        return Ok(Vec::new());
    }
    serde_json::from_value(body).map_err(|e| Error::parse(what, e))
}

fn decode_one<T: DeserializeOwned>(what: &str, body: Value) -> Result<T> {
    serde_json::from_value(body).map_err(|e| Error::parse(what, e))
}

fn parse_body(what: &str, text: &str) -> Result<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(trimmed).map_err(|e| Error::parse(what, e))
}

fn query_value(raw: &str) -> String {
    url::form_urlencoded::byte_serialize(raw.as_bytes()).collect()
}

fn mentions_rate_limit(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    lower.contains("rate limit") || lower.contains("secondary rate")
}

fn mentions_auth(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    lower.contains("gh auth login") || lower.contains("authentication required")
}

/// Server wait hint: `Retry-After`, else time until the quota window resets.
fn wait_hint(env: &Envelope) -> Option<Duration> {
    env.retry_after().or_else(|| env.rate_limit_reset_in(chrono::Utc::now().timestamp()))
}

fn is_rate_limited(env: &Envelope, stderr: &str) -> bool {
    match env.status {
        429 => true,
        403 => {
            env.header("retry-after").is_some()
                || env.header("x-ratelimit-remaining") == Some("0")
                || mentions_rate_limit(&env.body)
                || mentions_rate_limit(stderr)
        }
        _ => false,
    }
}

enum Fetched {
    Body(Value),
    NotFound,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct RemoteHostService {
    runner: Arc<dyn CommandRunner>,
    sleeper: Arc<dyn Sleeper>,
    cache: Arc<RevalidationCache>,
    gh_bin: String,
    policy: BackoffPolicy,
    per_page: u32,
}

impl RemoteHostService {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        sleeper: Arc<dyn Sleeper>,
        cache: Arc<RevalidationCache>,
        gh_bin: impl Into<String>,
        policy: BackoffPolicy,
        per_page: u32,
    ) -> Self {
        RemoteHostService {
            runner,
            sleeper,
            cache,
            gh_bin: gh_bin.into(),
            policy,
            per_page: per_page.clamp(1, 100),
        }
    }

    pub fn cache(&self) -> &RevalidationCache {
        &self.cache
    }

    fn gh<I, S>(&self, args: I) -> (Invocation, CommandOutput)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let inv = Invocation::new(&self.gh_bin, args);
        let out = self.runner.run(&inv);
        (inv, out)
    }

    fn failure(&self, inv: &Invocation, status: i32, out: &CommandOutput, env: Option<&Envelope>) -> Error {
        if out.status == SPAWN_FAILURE && out.stdout.is_empty() {
            return Error::NotInstalled(self.gh_bin.clone());
        }
        let api_message = env
            .and_then(|e| serde_json::from_str::<Value>(&e.body).ok())
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string));
        let message = out.stderr_trimmed().or(api_message).unwrap_or_else(|| "gh error".to_string());
        if status == 401 || mentions_auth(&message) {
            return Error::NotAuthenticated(message);
        }
        Error::CommandFailed { command: inv.display(), status, stderr: message }
    }

    /// Interpret one `gh api -i` run.
    fn classify(&self, key: &CacheKey, inv: &Invocation, out: CommandOutput) -> Result<Attempt<Fetched>> {
        let what = format!("response from {}", inv.display());
        let text = out.stdout_lossy();
        if let Some(env) = Envelope::parse(&text) {
            return match env.status {
                304 => match self.cache.get(key) {
                    Some(entry) => {
                        debug!(operation = key.operation.as_str(), "Not modified, serving cache");
                        Ok(Attempt::Done(Fetched::Body(entry.body)))
                    }
                    None => Err(Error::CommandFailed {
                        command: inv.display(),
                        status: 304,
                        stderr: "not modified but no cached response".to_string(),
                    }),
                },
                s if env.is_success() => {
                    let body = parse_body(&what, &env.body)?;
                    debug!(operation = key.operation.as_str(), status = s, "Fetched");
                    self.cache.store(key.clone(), env.etag().map(str::to_string), body.clone());
                    Ok(Attempt::Done(Fetched::Body(body)))
                }
                404 | 410 => Ok(Attempt::Done(Fetched::NotFound)),
                _ if is_rate_limited(&env, &out.stderr) => Ok(Attempt::RateLimited(wait_hint(&env))),
                status => Err(self.failure(inv, i32::from(status), &out, Some(&env))),
            };
        }

        // No response envelope: fall back to gh's own error text.
        match status_from_stderr(&out.stderr) {
            Some(404) | Some(410) => return Ok(Attempt::Done(Fetched::NotFound)),
            Some(429) => return Ok(Attempt::RateLimited(None)),
            _ => {}
        }
        if !out.success() && mentions_rate_limit(&out.stderr) {
            return Ok(Attempt::RateLimited(None));
        }
        if out.success() {
            return Ok(Attempt::Done(Fetched::Body(parse_body(&what, &text)?)));
        }
        let status = status_from_stderr(&out.stderr).map(i32::from).unwrap_or(out.status);
        Err(self.failure(inv, status, &out, None))
    }

    /// Conditional, rate-limit-aware GET through the API passthrough.
    fn api_get(&self, key: &CacheKey, endpoint: &str) -> Result<Fetched> {
        with_backoff(&self.policy, self.sleeper.as_ref(), |state| {
            let mut args = vec![
                "api".to_string(),
                "-i".to_string(),
                "-H".to_string(),
                "Accept: application/vnd.github+json".to_string(),
            ];
            if let Some(token) = self.cache.revalidation_token(key) {
                args.push("-H".to_string());
                args.push(format!("If-None-Match: {token}"));
            }
            args.push(endpoint.to_string());
            let (inv, out) = self.gh(args);
            debug!(endpoint, attempt = state.attempt, exit = out.status, "gh api");
            self.classify(key, &inv, out)
        })
    }

    fn action<I, S>(&self, args: I) -> ActionResult
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (inv, out) = self.gh(args);
        if out.success() {
            info!(command = inv.display().as_str(), "Action succeeded");
            return ActionResult { ok: true, error: None };
        }
        let error = out
            .stderr_trimmed()
            .unwrap_or_else(|| format!("{} exited with status {}", self.gh_bin, out.status));
        ActionResult { ok: false, error: Some(error) }
    }

    // -- auth ---------------------------------------------------------------

    /// Probe installation and authentication without failing.
    pub fn auth_status(&self) -> AuthStatus {
        let (_, version) = self.gh(["--version"]);
        if !version.success() {
            return AuthStatus {
                ok: false,
                authed: false,
                user: None,
                scopes: Vec::new(),
                host: None,
                code: Some("GH_NOT_INSTALLED"),
                error: Some(format!("{} CLI not installed", self.gh_bin)),
            };
        }
        let (_, status) = self.gh(["auth", "status"]);
        if !status.success() {
            return AuthStatus {
                ok: false,
                authed: false,
                user: None,
                scopes: Vec::new(),
                host: None,
                code: Some("GH_NOT_AUTHED"),
                error: Some(status.stderr_trimmed().unwrap_or_else(|| "gh not authenticated".into())),
            };
        }
        // Older gh releases print the status report on stderr.
        let report = format!("{}\n{}", status.stdout_lossy(), status.stderr);
        let (host, scopes) = parse_auth_details(&report);
        let (_, me) = self.gh(["api", "user"]);
        let user = me
            .success()
            .then(|| serde_json::from_slice::<ApiUser>(&me.stdout).ok())
            .flatten()
            .map(|u| UserInfo { login: u.login, name: u.name });
        AuthStatus { ok: true, authed: true, user, scopes, host, code: None, error: None }
    }

    // -- pull requests --------------------------------------------------------

    /// PR numbers, most recently created first.
    pub fn pr_list(&self, owner: &str, name: &str, filters: &ListFilters) -> Result<IdList> {
        let repo = format!("{owner}/{name}");
        let state = PrState::normalize(filters.state.as_deref());
        let echo = FilterEcho {
            state: state.as_str(),
            author: filters.author.clone(),
            label: filters.label.clone(),
        };
        let key = CacheKey::new(
            "pr.list",
            [
                ("repo", repo.clone()),
                ("state", state.api_state().to_string()),
                ("per_page", self.per_page.to_string()),
            ],
        );
        let endpoint = format!(
            "repos/{repo}/pulls?state={}&sort=created&direction=desc&per_page={}",
            state.api_state(),
            self.per_page
        );
        let body = match self.api_get(&key, &endpoint)? {
            Fetched::NotFound => return Ok(IdList { filters: echo, ids: Vec::new(), not_found: true }),
            Fetched::Body(body) => body,
        };
        let pulls: Vec<ApiPull> = decode_list("pull request list", body)?;
        let ids = pulls
            .into_iter()
            .filter(|p| state != PrState::Merged || p.merged_at.is_some())
            .filter(|p| match &filters.author {
                Some(author) => p
                    .user
                    .as_ref()
                    .and_then(|u| u.login.as_deref())
                    .is_some_and(|l| l.eq_ignore_ascii_case(author)),
                None => true,
            })
            .filter(|p| match &filters.label {
                Some(label) => p
                    .labels
                    .iter()
                    .any(|l| l.name.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(label))),
                None => true,
            })
            .map(|p| p.number)
            .collect();
        Ok(IdList { filters: echo, ids, not_found: false })
    }

    pub fn pr_get(&self, owner: &str, name: &str, number: u64) -> Result<PullRequest> {
        let repo = format!("{owner}/{name}");
        let key = CacheKey::new("pr.get", [("repo", repo.clone()), ("number", number.to_string())]);
        let body = match self.api_get(&key, &format!("repos/{repo}/pulls/{number}"))? {
            Fetched::NotFound => {
                return Ok(PullRequest {
                    repo,
                    number,
                    state: None,
                    title: None,
                    author: None,
                    draft: None,
                    additions: None,
                    deletions: None,
                    head_ref: None,
                    base_ref: None,
                    created_at: None,
                    merged_at: None,
                    not_found: true,
                })
            }
            Fetched::Body(body) => body,
        };
        let pr: ApiPull = decode_one("pull request", body)?;
        // REST reports merged pull requests as "closed".
        let state = if pr.merged_at.is_some() { Some("merged".to_string()) } else { pr.state };
        Ok(PullRequest {
            repo,
            number: pr.number,
            state,
            title: pr.title,
            author: login(pr.user),
            draft: pr.draft,
            additions: pr.additions,
            deletions: pr.deletions,
            head_ref: pr.head.and_then(|h| h.name),
            base_ref: pr.base.and_then(|b| b.name),
            created_at: pr.created_at,
            merged_at: pr.merged_at,
            not_found: false,
        })
    }

    pub fn pr_files(&self, owner: &str, name: &str, number: u64) -> Result<Listing<FileChange>> {
        let repo = format!("{owner}/{name}");
        let key = CacheKey::new(
            "pr.files",
            [("repo", repo.clone()), ("number", number.to_string()), ("per_page", self.per_page.to_string())],
        );
        let endpoint = format!("repos/{repo}/pulls/{number}/files?per_page={}", self.per_page);
        let body = match self.api_get(&key, &endpoint)? {
            Fetched::NotFound => return Ok(Listing { items: Vec::new(), not_found: true }),
            Fetched::Body(body) => body,
        };
        let files: Vec<ApiFile> = decode_list("pull request files", body)?;
        let items = files
            .into_iter()
            .map(|f| FileChange {
                path: f.filename,
                status: f.status,
                additions: f.additions,
                deletions: f.deletions,
            })
            .collect();
        Ok(Listing { items, not_found: false })
    }

    pub fn pr_comment(&self, owner: &str, name: &str, number: u64, body: &str) -> ActionResult {
        let (repo, number) = (format!("{owner}/{name}"), number.to_string());
        self.action(["pr", "comment", number.as_str(), "--repo", repo.as_str(), "--body", body])
    }

    pub fn pr_review(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        event: ReviewEvent,
        body: Option<&str>,
    ) -> ActionResult {
        let repo = format!("{owner}/{name}");
        let mut args = vec![
            "pr".to_string(),
            "review".to_string(),
            number.to_string(),
            "--repo".to_string(),
            repo,
            event.flag().to_string(),
        ];
        if let Some(body) = body.filter(|b| !b.is_empty()) {
            args.push("--body".to_string());
            args.push(body.to_string());
        }
        self.action(args)
    }

    pub fn pr_merge(&self, owner: &str, name: &str, number: u64, method: MergeMethod) -> ActionResult {
        let (repo, number) = (format!("{owner}/{name}"), number.to_string());
        self.action(["pr", "merge", number.as_str(), "--repo", repo.as_str(), method.flag()])
    }

    // -- issues ---------------------------------------------------------------

    /// Issue numbers (pull requests excluded), most recently created first.
    pub fn issue_list(&self, owner: &str, name: &str, filters: &ListFilters) -> Result<IdList> {
        let repo = format!("{owner}/{name}");
        let state = IssueState::normalize(filters.state.as_deref());
        let echo = FilterEcho {
            state: state.as_str(),
            author: filters.author.clone(),
            label: filters.label.clone(),
        };
        let mut params = vec![
            ("repo", repo.clone()),
            ("state", state.as_str().to_string()),
            ("per_page", self.per_page.to_string()),
        ];
        let mut endpoint = format!(
            "repos/{repo}/issues?state={}&sort=created&direction=desc&per_page={}",
            state.as_str(),
            self.per_page
        );
        if let Some(author) = &filters.author {
            endpoint.push_str(&format!("&creator={}", query_value(author)));
            params.push(("creator", author.clone()));
        }
        if let Some(label) = &filters.label {
            endpoint.push_str(&format!("&labels={}", query_value(label)));
            params.push(("labels", label.clone()));
        }
        let key = CacheKey::new("issue.list", params);
        let body = match self.api_get(&key, &endpoint)? {
            Fetched::NotFound => return Ok(IdList { filters: echo, ids: Vec::new(), not_found: true }),
            Fetched::Body(body) => body,
        };
        let issues: Vec<ApiIssue> = decode_list("issue list", body)?;
        let ids = issues.into_iter().filter(|i| i.pull_request.is_none()).map(|i| i.number).collect();
        Ok(IdList { filters: echo, ids, not_found: false })
    }

    pub fn issue_get(&self, owner: &str, name: &str, number: u64) -> Result<Issue> {
        let repo = format!("{owner}/{name}");
        let key = CacheKey::new("issue.get", [("repo", repo.clone()), ("number", number.to_string())]);
        let body = match self.api_get(&key, &format!("repos/{repo}/issues/{number}"))? {
            Fetched::NotFound => {
                return Ok(Issue {
                    repo,
                    number,
                    state: None,
                    title: None,
                    author: None,
                    labels: Vec::new(),
                    comments: None,
                    created_at: None,
                    closed_at: None,
                    not_found: true,
                })
            }
            Fetched::Body(body) => body,
        };
        let issue: ApiIssue = decode_one("issue", body)?;
        Ok(Issue {
            repo,
            number: issue.number,
            state: issue.state,
            title: issue.title,
            author: login(issue.user),
            labels: label_names(issue.labels),
            comments: issue.comments,
            created_at: issue.created_at,
            closed_at: issue.closed_at,
            not_found: false,
        })
    }

    pub fn issue_comment(&self, owner: &str, name: &str, number: u64, body: &str) -> ActionResult {
        let (repo, number) = (format!("{owner}/{name}"), number.to_string());
        self.action(["issue", "comment", number.as_str(), "--repo", repo.as_str(), "--body", body])
    }

    // -- timeline -------------------------------------------------------------

    /// Activity for a PR or issue as `(type, actor, created_at)` events.
    ///
    /// Reads the timeline feed, falling back to the coarser events feed when the
    /// timeline is refused. A missing target yields an empty, flagged listing.
    pub fn timeline(&self, owner: &str, name: &str, number: u64) -> Result<Listing<TimelineEvent>> {
        let repo = format!("{owner}/{name}");
        let params = || {
            [("repo", repo.clone()), ("number", number.to_string()), ("per_page", self.per_page.to_string())]
        };
        let timeline_key = CacheKey::new("timeline", params());
        let endpoint = format!("repos/{repo}/issues/{number}/timeline?per_page={}", self.per_page);
        let fetched = match self.api_get(&timeline_key, &endpoint) {
            Err(Error::CommandFailed { status, stderr, .. }) => {
                debug!(status, error = stderr.as_str(), "Timeline unavailable, using events feed");
                let events_key = CacheKey::new("events", params());
                let endpoint = format!("repos/{repo}/issues/{number}/events?per_page={}", self.per_page);
                self.api_get(&events_key, &endpoint)?
            }
            other => other?,
        };
        let body = match fetched {
            Fetched::NotFound => return Ok(Listing { items: Vec::new(), not_found: true }),
            Fetched::Body(body) => body,
        };
        let events: Vec<ApiEvent> = decode_list("timeline", body)?;
        Ok(Listing { items: events.into_iter().map(ApiEvent::normalize).collect(), not_found: false })
    }

    // -- refs -----------------------------------------------------------------

    /// Commit id for `reference` on the remote, or `None` when it does not exist.
    pub fn ref_sha(&self, owner: &str, name: &str, reference: &str) -> Result<Option<String>> {
        if reference.is_empty()
            || reference.starts_with('-')
            || reference.contains(['?', '#', ' ', '\t', '\n'])
        {
            return Err(Error::validation(format!("invalid ref '{reference}'")));
        }
        let repo = format!("{owner}/{name}");
        let key = CacheKey::new("ref.get", [("repo", repo.clone()), ("ref", reference.to_string())]);
        match self.api_get(&key, &format!("repos/{repo}/commits/{reference}")) {
            Ok(Fetched::Body(body)) => Ok(body.get("sha").and_then(Value::as_str).map(str::to_string)),
            Ok(Fetched::NotFound) => Ok(None),
            // "No commit found for SHA"
            Err(Error::CommandFailed { status: 422, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

//! Operation layer: validates caller input before any I/O, asks the local or
//! remote service for the full ordered collection, then slices it into a page.
//!
//! Every response is a concrete record; optional fields serialize as `null`
//! rather than being omitted, so each operation's output shape is fixed.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use litehub_core::backoff::{Sleeper, ThreadSleeper};
use litehub_core::cache::RevalidationCache;
use litehub_core::exec::{CommandRunner, SystemRunner};
use litehub_core::git::{parse_owner_repo, GitRepo, LocalRepoService, SearchMatch, TreeEntry};
use litehub_core::github::{
    ActionResult, AuthStatus, FileChange, FilterEcho, IdList, Issue, ListFilters, MergeMethod,
    PullRequest, RemoteHostService, ReviewEvent, TimelineEvent,
};
use litehub_core::page::{paginate, paginate_filtered, Page};
use litehub_core::validate::{self, RepoSelector};
use litehub_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Config;

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct BranchesListParams {
    pub repo_path: String,
    pub prefix: Option<String>,
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TreeParams {
    pub repo_path: String,
    #[serde(rename = "ref")]
    pub reference: String,
    pub base_path: Option<String>,
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BlobParams {
    pub repo_path: String,
    pub blob_sha: String,
    pub max_bytes: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub repo_path: String,
    pub pattern: String,
    pub paths: Option<Vec<String>>,
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveParams {
    pub repo_path: String,
}

#[derive(Debug, Deserialize)]
pub struct RefGetParams {
    pub repo_path: Option<String>,
    pub repo: Option<String>,
    #[serde(rename = "ref")]
    pub reference: String,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub repo: String,
    pub state: Option<String>,
    pub author: Option<String>,
    pub label: Option<String>,
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NumberParams {
    pub repo: String,
    pub number: u64,
}

#[derive(Debug, Deserialize)]
pub struct NumberPageParams {
    pub repo: String,
    pub number: u64,
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CommentParams {
    pub repo: String,
    pub number: u64,
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct ReviewParams {
    pub repo: String,
    pub number: u64,
    pub event: String,
    pub body: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MergeParams {
    pub repo: String,
    pub number: u64,
    pub method: Option<String>,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct BranchesResponse {
    pub repo: String,
    pub prefix: Option<String>,
    pub names: Vec<String>,
    pub count: usize,
    pub has_next: bool,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TreeResponse {
    pub repo: String,
    #[serde(rename = "ref")]
    pub reference: String,
    pub base_path: Option<String>,
    pub entries: Vec<TreeEntry>,
    pub count: usize,
    pub has_next: bool,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BlobResponse {
    pub blob_sha: String,
    /// Bytes in this window.
    pub size: u64,
    pub content_b64: String,
    pub offset: u64,
    pub fetched: u64,
    pub total_size: u64,
    pub has_next: bool,
    pub next_offset: Option<u64>,
    pub not_found: bool,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub repo: String,
    pub pattern: String,
    pub matches: Vec<SearchMatch>,
    pub count: usize,
    pub has_next: bool,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResolveResponse {
    pub repo_path: String,
    pub origin_url: Option<String>,
    pub owner: Option<String>,
    pub name: Option<String>,
    pub default_branch: Option<String>,
    pub head: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RefResponse {
    pub repo_path: Option<String>,
    pub repo: Option<String>,
    #[serde(rename = "ref")]
    pub reference: String,
    pub sha: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IdListResponse {
    pub repo: String,
    pub filters: FilterEcho,
    pub ids: Vec<u64>,
    pub count: usize,
    pub has_next: bool,
    pub next_cursor: Option<String>,
    pub not_found: bool,
}

#[derive(Debug, Serialize)]
pub struct FilesResponse {
    pub repo: String,
    pub number: u64,
    pub files: Vec<FileChange>,
    pub count: usize,
    pub has_next: bool,
    pub next_cursor: Option<String>,
    pub not_found: bool,
}

#[derive(Debug, Serialize)]
pub struct TimelineResponse {
    pub repo: String,
    pub number: u64,
    pub events: Vec<TimelineEvent>,
    pub count: usize,
    pub has_next: bool,
    pub next_cursor: Option<String>,
    pub not_found: bool,
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub repo: String,
    pub number: u64,
    pub ok: bool,
    pub error: Option<String>,
}

impl ActionResponse {
    fn from_result(repo: String, number: u64, result: ActionResult) -> Self {
        ActionResponse { repo, number, ok: result.ok, error: result.error }
    }
}

#[derive(Debug, Serialize)]
pub struct PingResponse {
    pub ok: bool,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

/// Both services plus settings; shared by reference across calls.
#[derive(Clone)]
pub struct Gateway {
    local: LocalRepoService,
    remote: RemoteHostService,
    blob_max_bytes: u64,
}

fn non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(format!("{field} must not be empty")));
    }
    Ok(())
}

fn non_negative(field: &str, value: Option<i64>, default: u64) -> Result<u64> {
    match value {
        None => Ok(default),
        Some(n) => u64::try_from(n)
            .map_err(|_| Error::validation(format!("{field} must be >= 0 (got {n})"))),
    }
}

fn list_filters(p: &ListParams) -> ListFilters {
    let clean = |v: &Option<String>| {
        v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
    };
    ListFilters { state: clean(&p.state), author: clean(&p.author), label: clean(&p.label) }
}

/// Cursor fingerprint for a filtered id list.
fn fingerprint(echo: &FilterEcho) -> BTreeMap<String, String> {
    let mut f = BTreeMap::new();
    f.insert("state".to_string(), echo.state.to_string());
    if let Some(author) = &echo.author {
        f.insert("author".to_string(), author.clone());
    }
    if let Some(label) = &echo.label {
        f.insert("label".to_string(), label.clone());
    }
    f
}

fn id_page(repo: String, list: IdList, limit: Option<usize>, cursor: Option<&str>) -> IdListResponse {
    let page = paginate_filtered(list.ids, limit, cursor, &fingerprint(&list.filters));
    IdListResponse {
        repo,
        filters: list.filters,
        ids: page.items,
        count: page.count,
        has_next: page.has_next,
        next_cursor: page.next_cursor,
        not_found: list.not_found,
    }
}

impl Gateway {
    pub fn new(config: &Config, runner: Arc<dyn CommandRunner>, sleeper: Arc<dyn Sleeper>) -> Self {
        let remote = RemoteHostService::new(
            Arc::clone(&runner),
            sleeper,
            Arc::new(RevalidationCache::new()),
            config.gh_bin.clone(),
            config.backoff_policy(),
            config.remote_page_size,
        );
        Gateway {
            local: LocalRepoService::new(runner, config.git_bin.clone()),
            remote,
            blob_max_bytes: config.blob_max_bytes,
        }
    }

    /// Real processes and real sleeps.
    pub fn system(config: &Config) -> Self {
        Self::new(config, Arc::new(SystemRunner), Arc::new(ThreadSleeper))
    }

    fn open(&self, repo_path: &str) -> Result<GitRepo> {
        self.local.ensure_repo(Path::new(repo_path))
    }

    // -- local ----------------------------------------------------------------

    pub fn branches_list(&self, p: BranchesListParams) -> Result<BranchesResponse> {
        non_empty("repo_path", &p.repo_path)?;
        let limit = validate::limit(p.limit)?;
        let prefix = p.prefix.filter(|s| !s.is_empty());

        let repo = self.open(&p.repo_path)?;
        let names = self.local.list_branches(&repo, prefix.as_deref())?;
        let page = paginate(names, limit, p.cursor.as_deref());
        Ok(BranchesResponse {
            repo: p.repo_path,
            prefix,
            names: page.items,
            count: page.count,
            has_next: page.has_next,
            next_cursor: page.next_cursor,
        })
    }

    pub fn tree(&self, p: TreeParams) -> Result<TreeResponse> {
        non_empty("repo_path", &p.repo_path)?;
        non_empty("ref", &p.reference)?;
        let limit = validate::limit(p.limit)?;
        let base_path = validate::base_path(p.base_path.as_deref())?;

        let repo = self.open(&p.repo_path)?;
        let entries = self.local.ls_tree(&repo, &p.reference, base_path.as_deref());
        let page = paginate(entries, limit, p.cursor.as_deref());
        Ok(TreeResponse {
            repo: p.repo_path,
            reference: p.reference,
            base_path,
            entries: page.items,
            count: page.count,
            has_next: page.has_next,
            next_cursor: page.next_cursor,
        })
    }

    pub fn blob(&self, p: BlobParams) -> Result<BlobResponse> {
        non_empty("repo_path", &p.repo_path)?;
        let max_bytes = match p.max_bytes {
            None => self.blob_max_bytes,
            Some(n) if n <= 0 => {
                return Err(Error::validation(format!("max_bytes must be >= 1 (got {n})")))
            }
            Some(n) => n as u64,
        };
        let offset = non_negative("offset", p.offset, 0)?;

        let repo = self.open(&p.repo_path)?;
        let window = self.local.blob(&repo, p.blob_sha.trim(), offset, max_bytes);
        let fetched = window.fetched();
        Ok(BlobResponse {
            blob_sha: p.blob_sha,
            size: fetched,
            content_b64: STANDARD.encode(&window.content),
            offset: window.offset,
            fetched,
            total_size: window.total_size,
            has_next: window.has_next,
            next_offset: window.next_offset,
            not_found: window.not_found,
        })
    }

    pub fn search(&self, p: SearchParams) -> Result<SearchResponse> {
        non_empty("repo_path", &p.repo_path)?;
        validate::pattern(&p.pattern)?;
        let limit = validate::limit(p.limit)?;
        let mut paths = Vec::new();
        for path in p.paths.unwrap_or_default() {
            if let Some(path) = validate::base_path(Some(&path))? {
                paths.push(path);
            }
        }

        let repo = self.open(&p.repo_path)?;
        let matches = self.local.grep(&repo, &p.pattern, &paths);
        let page = paginate(matches, limit, p.cursor.as_deref());
        Ok(SearchResponse {
            repo: p.repo_path,
            pattern: p.pattern,
            matches: page.items,
            count: page.count,
            has_next: page.has_next,
            next_cursor: page.next_cursor,
        })
    }

    pub fn resolve(&self, p: ResolveParams) -> Result<ResolveResponse> {
        non_empty("repo_path", &p.repo_path)?;
        let repo = self.open(&p.repo_path)?;
        let origin_url = self.local.remote_origin_url(&repo);
        let (owner, name) = match origin_url.as_deref().and_then(parse_owner_repo) {
            Some((owner, name)) => (Some(owner), Some(name)),
            None => (None, None),
        };
        let default_branch =
            self.local.default_branch(&repo).or_else(|| self.local.current_branch(&repo));
        Ok(ResolveResponse {
            repo_path: p.repo_path,
            origin_url,
            owner,
            name,
            default_branch,
            head: self.local.rev_parse(&repo, "HEAD"),
        })
    }

    pub fn refs_get(&self, p: RefGetParams) -> Result<RefResponse> {
        let selector = validate::exactly_one_selector(p.repo_path.as_deref(), p.repo.as_deref())?;
        non_empty("ref", &p.reference)?;
        match selector {
            RepoSelector::Local(path) => {
                let repo = self.open(&path)?;
                let sha = self.local.rev_parse(&repo, &p.reference);
                Ok(RefResponse { repo_path: Some(path), repo: None, reference: p.reference, sha })
            }
            RepoSelector::Remote { owner, name } => {
                let sha = self.remote.ref_sha(&owner, &name, &p.reference)?;
                Ok(RefResponse {
                    repo_path: None,
                    repo: Some(format!("{owner}/{name}")),
                    reference: p.reference,
                    sha,
                })
            }
        }
    }

    // -- pull requests ----------------------------------------------------------

    pub fn pr_list(&self, p: ListParams) -> Result<IdListResponse> {
        let (owner, name) = validate::repo_slug(&p.repo)?;
        let limit = validate::limit(p.limit)?;
        let list = self.remote.pr_list(&owner, &name, &list_filters(&p))?;
        debug!(repo = p.repo.as_str(), total = list.ids.len(), "Pull requests listed");
        Ok(id_page(format!("{owner}/{name}"), list, limit, p.cursor.as_deref()))
    }

    pub fn pr_get(&self, p: NumberParams) -> Result<PullRequest> {
        let (owner, name) = validate::repo_slug(&p.repo)?;
        self.remote.pr_get(&owner, &name, p.number)
    }

    pub fn pr_files(&self, p: NumberPageParams) -> Result<FilesResponse> {
        let (owner, name) = validate::repo_slug(&p.repo)?;
        let limit = validate::limit(p.limit)?;
        let listing = self.remote.pr_files(&owner, &name, p.number)?;
        let page = paginate(listing.items, limit, p.cursor.as_deref());
        Ok(FilesResponse {
            repo: format!("{owner}/{name}"),
            number: p.number,
            files: page.items,
            count: page.count,
            has_next: page.has_next,
            next_cursor: page.next_cursor,
            not_found: listing.not_found,
        })
    }

    /// Shared by `pr.timeline` and `issue.timeline`; pull requests are issues
    /// for the activity feed.
    pub fn timeline(&self, p: NumberPageParams) -> Result<TimelineResponse> {
        let (owner, name) = validate::repo_slug(&p.repo)?;
        let limit = validate::limit(p.limit)?;
        let listing = self.remote.timeline(&owner, &name, p.number)?;
        let page: Page<TimelineEvent> = paginate(listing.items, limit, p.cursor.as_deref());
        Ok(TimelineResponse {
            repo: format!("{owner}/{name}"),
            number: p.number,
            events: page.items,
            count: page.count,
            has_next: page.has_next,
            next_cursor: page.next_cursor,
            not_found: listing.not_found,
        })
    }

    pub fn pr_comment(&self, p: CommentParams) -> Result<ActionResponse> {
        let (owner, name) = validate::repo_slug(&p.repo)?;
        non_empty("body", &p.body)?;
        let result = self.remote.pr_comment(&owner, &name, p.number, &p.body);
        Ok(ActionResponse::from_result(format!("{owner}/{name}"), p.number, result))
    }

    pub fn pr_review(&self, p: ReviewParams) -> Result<ActionResponse> {
        let (owner, name) = validate::repo_slug(&p.repo)?;
        let event = ReviewEvent::parse(&p.event);
        let body = p.body.as_deref().map(str::trim).filter(|b| !b.is_empty());
        if event != ReviewEvent::Approve && body.is_none() {
            return Err(Error::validation("body is required unless event is 'approve'"));
        }
        let result = self.remote.pr_review(&owner, &name, p.number, event, body);
        Ok(ActionResponse::from_result(format!("{owner}/{name}"), p.number, result))
    }

    pub fn pr_merge(&self, p: MergeParams) -> Result<ActionResponse> {
        let (owner, name) = validate::repo_slug(&p.repo)?;
        let method = MergeMethod::parse(p.method.as_deref().unwrap_or("merge"))?;
        let result = self.remote.pr_merge(&owner, &name, p.number, method);
        Ok(ActionResponse::from_result(format!("{owner}/{name}"), p.number, result))
    }

    // -- issues -----------------------------------------------------------------

    pub fn issue_list(&self, p: ListParams) -> Result<IdListResponse> {
        let (owner, name) = validate::repo_slug(&p.repo)?;
        let limit = validate::limit(p.limit)?;
        let list = self.remote.issue_list(&owner, &name, &list_filters(&p))?;
        Ok(id_page(format!("{owner}/{name}"), list, limit, p.cursor.as_deref()))
    }

    pub fn issue_get(&self, p: NumberParams) -> Result<Issue> {
        let (owner, name) = validate::repo_slug(&p.repo)?;
        self.remote.issue_get(&owner, &name, p.number)
    }

    pub fn issue_comment(&self, p: CommentParams) -> Result<ActionResponse> {
        let (owner, name) = validate::repo_slug(&p.repo)?;
        non_empty("body", &p.body)?;
        let result = self.remote.issue_comment(&owner, &name, p.number, &p.body);
        Ok(ActionResponse::from_result(format!("{owner}/{name}"), p.number, result))
    }

    // -- host -------------------------------------------------------------------

    pub fn whoami(&self) -> AuthStatus {
        self.remote.auth_status()
    }

    pub fn ping(&self) -> PingResponse {
        PingResponse { ok: true, version: env!("CARGO_PKG_VERSION") }
    }
}

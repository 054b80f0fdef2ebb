//! Local repository primitives backed by the `git` executable: branches, trees,
//! blobs, grep, ref resolution, and origin inference.
//!
//! Absence (unborn HEAD, unknown ref, missing remote, missing object) is reported
//! as an empty collection or `None`, never as an error.

use crate::error::{Error, Result};
use crate::exec::{CommandOutput, CommandRunner, Invocation};
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::debug;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A local working copy, identified only by its location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitRepo {
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeEntry {
    pub path: String,
    pub blob_sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchMatch {
    pub path: String,
    pub line: u64,
    pub excerpt: String,
}

/// A byte window into a blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobWindow {
    pub content: Vec<u8>,
    pub offset: u64,
    pub total_size: u64,
    pub has_next: bool,
    pub next_offset: Option<u64>,
    pub not_found: bool,
}

impl BlobWindow {
    pub fn fetched(&self) -> u64 {
        self.content.len() as u64
    }

    fn not_found(offset: u64) -> Self {
        BlobWindow {
            content: Vec::new(),
            offset,
            total_size: 0,
            has_next: false,
            next_offset: None,
            not_found: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn first_line(out: &CommandOutput) -> Option<String> {
    let text = out.stdout_lossy();
    let line = text.lines().next()?.trim();
    (!line.is_empty()).then(|| line.to_string())
}

fn ssh_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._-]+@[^:/]+:(?:/)?([^/]+)/([^/]+?)(?:\.git)?/?$").unwrap()
    })
}

fn scheme_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*://(?:[^@/]+@)?[^/]+/([^/]+)/([^/]+?)(?:\.git)?/?$")
            .unwrap()
    })
}

/// Parse `(owner, name)` from an SSH-style (`git@host:owner/name.git`) or
/// scheme-style (`https://host/owner/name.git`, `ssh://git@host/owner/name`) URL.
pub fn parse_owner_repo(url: &str) -> Option<(String, String)> {
    let url = url.trim();
    let caps = scheme_url_re().captures(url).or_else(|| ssh_url_re().captures(url))?;
    Some((caps[1].to_string(), caps[2].to_string()))
}

/// Split NUL-terminated `ls-tree -z` records into blob entries.
fn parse_ls_tree(stdout: &[u8]) -> Vec<TreeEntry> {
    let mut entries = Vec::new();
    for record in stdout.split(|b| *b == 0) {
        if record.is_empty() {
            continue;
        }
        let record = String::from_utf8_lossy(record);
        // "<mode> SP <type> SP <object> TAB <path>"
        let Some((meta, path)) = record.split_once('\t') else { continue };
        let mut parts = meta.split_whitespace();
        let (Some(_mode), Some(kind), Some(object)) = (parts.next(), parts.next(), parts.next())
        else {
            continue;
        };
        if kind != "blob" {
            continue;
        }
        entries.push(TreeEntry { path: path.to_string(), blob_sha: object.to_string() });
    }
    entries
}

/// Parse `git grep -n -z` output: `path NUL line NUL text LF`.
fn parse_grep(stdout: &[u8]) -> Vec<SearchMatch> {
    let text = String::from_utf8_lossy(stdout);
    let mut matches = Vec::new();
    for line in text.lines() {
        let mut parts = line.splitn(3, '\0');
        let (Some(path), Some(lineno), Some(excerpt)) = (parts.next(), parts.next(), parts.next())
        else {
            continue;
        };
        let Ok(lineno) = lineno.parse::<u64>() else { continue };
        matches.push(SearchMatch {
            path: path.to_string(),
            line: lineno,
            excerpt: excerpt.to_string(),
        });
    }
    matches
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct LocalRepoService {
    runner: Arc<dyn CommandRunner>,
    git_bin: String,
}

impl LocalRepoService {
    pub fn new(runner: Arc<dyn CommandRunner>, git_bin: impl Into<String>) -> Self {
        LocalRepoService { runner, git_bin: git_bin.into() }
    }

    fn git<I, S>(&self, repo: &GitRepo, args: I) -> CommandOutput
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.runner.run(&Invocation::new(&self.git_bin, args).in_dir(&repo.path))
    }

    fn require(&self, what: &str, out: CommandOutput) -> Result<CommandOutput> {
        if out.success() {
            Ok(out)
        } else {
            Err(Error::CommandFailed {
                command: format!("{} {what}", self.git_bin),
                status: out.status,
                stderr: out.stderr.trim().to_string(),
            })
        }
    }

    /// Resolve a handle for `path`, creating the directory and running
    /// `git init` when it is not yet a repository.
    pub fn ensure_repo(&self, path: &Path) -> Result<GitRepo> {
        std::fs::create_dir_all(path).map_err(|e| Error::CommandFailed {
            command: format!("mkdir {}", path.display()),
            status: -1,
            stderr: e.to_string(),
        })?;
        let repo = GitRepo { path: path.to_path_buf() };
        if !path.join(".git").exists() {
            debug!(path = %path.display(), "Initializing repository");
            self.require("init", self.git(&repo, ["init", "--quiet"]))?;
        }
        Ok(repo)
    }

    /// Full object id for `reference`, or `None` when it does not resolve
    /// (including an unborn HEAD).
    pub fn rev_parse(&self, repo: &GitRepo, reference: &str) -> Option<String> {
        if reference.starts_with('-') {
            return None;
        }
        let out = self.git(repo, ["rev-parse", "--verify", "--quiet", reference]);
        if !out.success() {
            return None;
        }
        first_line(&out)
    }

    /// Local branch short names, optionally filtered by a literal prefix,
    /// sorted ascending by byte order.
    pub fn list_branches(&self, repo: &GitRepo, prefix: Option<&str>) -> Result<Vec<String>> {
        let out = self.require(
            "for-each-ref",
            self.git(repo, ["for-each-ref", "--format=%(refname:short)", "refs/heads"]),
        )?;
        let mut names: Vec<String> = out
            .stdout_lossy()
            .lines()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .filter(|n| prefix.map_or(true, |p| n.starts_with(p)))
            .map(str::to_string)
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Recursive blob listing at `reference`, under `base_path` when given,
    /// sorted by path. An unresolvable ref yields an empty list.
    pub fn ls_tree(
        &self,
        repo: &GitRepo,
        reference: &str,
        base_path: Option<&str>,
    ) -> Vec<TreeEntry> {
        let Some(tree) = self.rev_parse(repo, &format!("{reference}^{{tree}}")) else {
            debug!(reference, "Ref does not resolve, empty tree");
            return Vec::new();
        };
        let mut args = vec!["ls-tree".to_string(), "-r".into(), "-z".into(), "--full-tree".into(), tree];
        if let Some(base) = base_path {
            args.push("--".into());
            args.push(base.to_string());
        }
        let out = self.git(repo, args);
        if !out.success() {
            return Vec::new();
        }
        let mut entries = parse_ls_tree(&out.stdout);
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries
    }

    /// Read up to `max_bytes` of a blob starting at `offset`.
    pub fn blob(&self, repo: &GitRepo, blob_sha: &str, offset: u64, max_bytes: u64) -> BlobWindow {
        if blob_sha.is_empty() || blob_sha.starts_with('-') {
            return BlobWindow::not_found(offset);
        }
        let out = self.git(repo, ["cat-file", "blob", blob_sha]);
        if !out.success() {
            debug!(blob_sha, status = out.status, "Blob not found");
            return BlobWindow::not_found(offset);
        }
        let data = out.stdout;
        let total = data.len() as u64;
        let start = offset.min(total);
        let end = start.saturating_add(max_bytes).min(total);
        let has_next = end < total;
        BlobWindow {
            content: data[start as usize..end as usize].to_vec(),
            offset,
            total_size: total,
            has_next,
            next_offset: has_next.then_some(end),
            not_found: false,
        }
    }

    /// Line matches for `pattern` across tracked and untracked (non-ignored)
    /// files, optionally restricted to `paths`. Invalid patterns yield no matches.
    pub fn grep(&self, repo: &GitRepo, pattern: &str, paths: &[String]) -> Vec<SearchMatch> {
        let mut args: Vec<String> = ["grep", "-n", "-z", "-I", "--untracked", "--no-color", "-e"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        args.push(pattern.to_string());
        if !paths.is_empty() {
            args.push("--".into());
            args.extend(paths.iter().cloned());
        }
        let out = self.git(repo, args);
        // 1 = no matches, 128 = bad pattern or pathspec; both are "nothing found".
        if !out.success() {
            debug!(pattern, status = out.status, "Grep found nothing");
            return Vec::new();
        }
        let mut matches = parse_grep(&out.stdout);
        matches.sort_by(|a, b| a.path.cmp(&b.path).then(a.line.cmp(&b.line)));
        matches
    }

    pub fn remote_origin_url(&self, repo: &GitRepo) -> Option<String> {
        let out = self.git(repo, ["config", "--get", "remote.origin.url"]);
        if !out.success() {
            return None;
        }
        first_line(&out)
    }

    /// Default branch recorded by `refs/remotes/origin/HEAD`, without the remote prefix.
    pub fn default_branch(&self, repo: &GitRepo) -> Option<String> {
        let out =
            self.git(repo, ["symbolic-ref", "--quiet", "--short", "refs/remotes/origin/HEAD"]);
        if !out.success() {
            return None;
        }
        let short = first_line(&out)?;
        Some(short.strip_prefix("origin/").unwrap_or(&short).to_string())
    }

    /// Checked-out branch, or `None` for a detached or unborn HEAD.
    pub fn current_branch(&self, repo: &GitRepo) -> Option<String> {
        self.rev_parse(repo, "HEAD")?;
        let out = self.git(repo, ["symbolic-ref", "--quiet", "--short", "HEAD"]);
        if !out.success() {
            return None;
        }
        first_line(&out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::SystemRunner;
    use std::process::Command;

    fn service() -> LocalRepoService {
        LocalRepoService::new(Arc::new(SystemRunner), "git")
    }

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(dir)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .expect("git failed to start");
        assert!(status.success(), "git {args:?} failed");
    }

    fn commit_all(dir: &Path) {
        git(dir, &["add", "-A"]);
        git(
            dir,
            &["-c", "user.email=test@test.com", "-c", "user.name=Test", "commit", "-q", "-m", "init"],
        );
    }

    #[test]
    fn parse_owner_repo_variants() {
        let cases = [
            ("git@github.com:owner/name.git", Some(("owner", "name"))),
            ("https://github.com/owner/name.git", Some(("owner", "name"))),
            ("https://github.com/owner/name", Some(("owner", "name"))),
            ("https://token@github.com/owner/name.git/", Some(("owner", "name"))),
            ("ssh://git@github.com/owner/name.git", Some(("owner", "name"))),
            ("git@github.com:owner/my.repo.git", Some(("owner", "my.repo"))),
            ("not a url", None),
            ("https://github.com/only-owner", None),
        ];
        for (url, expected) in cases {
            let got = parse_owner_repo(url);
            let expected = expected.map(|(o, n)| (o.to_string(), n.to_string()));
            assert_eq!(got, expected, "{url}");
        }
    }

    #[test]
    fn parse_ls_tree_keeps_blobs_only() {
        let raw = b"100644 blob aaa\tb.txt\0160000 commit ccc\tsub\0100644 blob bbb\tdir/a b.txt\0";
        let entries = parse_ls_tree(raw);
        assert_eq!(
            entries,
            vec![
                TreeEntry { path: "b.txt".into(), blob_sha: "aaa".into() },
                TreeEntry { path: "dir/a b.txt".into(), blob_sha: "bbb".into() },
            ]
        );
    }

    #[test]
    fn parse_grep_keeps_colons_in_excerpt() {
        let raw = b"src/a.rs\x0012\x00let x: u8 = 1;\nbad line\n";
        let matches = parse_grep(raw);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].line, 12);
        assert_eq!(matches[0].excerpt, "let x: u8 = 1;");
    }

    #[test]
    fn ensure_repo_initializes_missing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = service().ensure_repo(&tmp.path().join("repo")).unwrap();
        assert!(repo.path.join(".git").exists());
        assert!(service().list_branches(&repo, None).unwrap().is_empty());
    }

    #[test]
    fn empty_repo_reports_absence_as_none() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service();
        let repo = svc.ensure_repo(tmp.path()).unwrap();
        assert_eq!(svc.remote_origin_url(&repo), None);
        assert_eq!(svc.current_branch(&repo), None);
        assert_eq!(svc.default_branch(&repo), None);
        assert_eq!(svc.rev_parse(&repo, "HEAD"), None);
        assert!(svc.ls_tree(&repo, "HEAD", None).is_empty());
    }

    #[test]
    fn default_branch_uses_origin_head() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service();
        let repo = svc.ensure_repo(tmp.path()).unwrap();
        git(tmp.path(), &["symbolic-ref", "refs/remotes/origin/HEAD", "refs/remotes/origin/main"]);
        assert_eq!(svc.default_branch(&repo).as_deref(), Some("main"));
    }

    #[test]
    fn branches_sorted_and_prefix_filtered() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service();
        let repo = svc.ensure_repo(tmp.path()).unwrap();
        git(
            tmp.path(),
            &["-c", "user.email=t@t", "-c", "user.name=T", "commit", "-q", "--allow-empty", "-m", "i"],
        );
        git(tmp.path(), &["branch", "-M", "trunk"]);
        for name in ["b3", "b1", "feat/x", "b2"] {
            git(tmp.path(), &["branch", name]);
        }
        let all = svc.list_branches(&repo, None).unwrap();
        assert_eq!(all, vec!["b1", "b2", "b3", "feat/x", "trunk"]);
        // Literal prefix, not a glob.
        assert_eq!(svc.list_branches(&repo, Some("b")).unwrap(), vec!["b1", "b2", "b3"]);
        assert!(svc.list_branches(&repo, Some("b*")).unwrap().is_empty());
    }

    #[test]
    fn tree_blob_and_grep_on_committed_files() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service();
        let repo = svc.ensure_repo(tmp.path()).unwrap();
        std::fs::create_dir_all(tmp.path().join("src")).unwrap();
        std::fs::write(tmp.path().join("src/lib.rs"), "pub fn hello() {}\n").unwrap();
        std::fs::write(tmp.path().join("README.md"), "hello world\nfoo bar\n").unwrap();
        commit_all(tmp.path());

        let tree = svc.ls_tree(&repo, "HEAD", None);
        let paths: Vec<&str> = tree.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["README.md", "src/lib.rs"]);
        assert_eq!(svc.ls_tree(&repo, "HEAD", Some("src")).len(), 1);
        assert!(svc.ls_tree(&repo, "no-such-ref", None).is_empty());

        let readme = &tree[0].blob_sha;
        let window = svc.blob(&repo, readme, 0, 5);
        assert_eq!(window.content, b"hello");
        assert_eq!(window.total_size, 20);
        assert!(window.has_next);
        assert_eq!(window.next_offset, Some(5));

        let tail = svc.blob(&repo, readme, 18, 100);
        assert_eq!(tail.content, b"r\n");
        assert!(!tail.has_next);
        assert_eq!(tail.next_offset, None);

        let beyond = svc.blob(&repo, readme, 10_000_000, 32);
        assert_eq!(beyond.fetched(), 0);
        assert!(!beyond.has_next);
        assert!(!beyond.not_found);

        let missing = svc.blob(&repo, "deadbeef", 0, 16);
        assert!(missing.not_found);
        assert_eq!(missing.total_size, 0);

        let matches = svc.grep(&repo, "hello", &[]);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].path, "README.md");
        assert_eq!(matches[0].line, 1);
        assert_eq!(svc.grep(&repo, "hello", &["src".to_string()]).len(), 1);
        assert!(svc.grep(&repo, "[unclosed", &[]).is_empty());
    }

    #[test]
    fn grep_sees_untracked_files() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service();
        let repo = svc.ensure_repo(tmp.path()).unwrap();
        std::fs::write(tmp.path().join("x.txt"), "hello\nworld\n").unwrap();
        let matches = svc.grep(&repo, "hello", &[]);
        assert_eq!(matches.len(), 1);
        assert!(matches[0].path.ends_with("x.txt"));
    }
}

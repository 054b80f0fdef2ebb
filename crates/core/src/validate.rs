//! Caller-input checks performed before any filesystem or network access.

use crate::error::{Error, Result};
use std::path::{Component, Path};

/// `None` means "no cap". Zero and negative limits are rejected.
pub fn limit(limit: Option<i64>) -> Result<Option<usize>> {
    match limit {
        None => Ok(None),
        Some(n) if n <= 0 => Err(Error::validation(format!("limit must be >= 1 (got {n})"))),
        Some(n) => usize::try_from(n)
            .map(Some)
            .map_err(|_| Error::validation(format!("limit out of range: {n}"))),
    }
}

/// A repository-relative base path: never absolute, never containing `..`.
/// Empty input is treated as "repository root".
pub fn base_path(path: Option<&str>) -> Result<Option<String>> {
    let Some(raw) = path else { return Ok(None) };
    if raw.is_empty() {
        return Ok(None);
    }
    if raw.starts_with('/') || raw.starts_with('\\') || Path::new(raw).is_absolute() {
        return Err(Error::validation(format!("base_path must be relative: {raw}")));
    }
    if has_drive_prefix(raw) {
        return Err(Error::validation(format!("base_path must be relative: {raw}")));
    }
    let traverses = raw
        .split(['/', '\\'])
        .any(|segment| segment == "..")
        || Path::new(raw).components().any(|c| matches!(c, Component::ParentDir));
    if traverses {
        return Err(Error::validation(format!("base_path must not contain '..': {raw}")));
    }
    Ok(Some(raw.trim_end_matches('/').to_string()))
}

fn has_drive_prefix(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

pub fn pattern(pattern: &str) -> Result<()> {
    if pattern.is_empty() {
        return Err(Error::validation("pattern must not be empty"));
    }
    Ok(())
}

/// Split an `owner/name` slug.
pub fn repo_slug(repo: &str) -> Result<(String, String)> {
    let trimmed = repo.trim().trim_end_matches(".git");
    match trimmed.split_once('/') {
        Some((owner, name))
            if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
        {
            Ok((owner.to_string(), name.to_string()))
        }
        _ => Err(Error::validation(format!("repo must be 'owner/name' (got '{repo}')"))),
    }
}

/// Selector for operations addressable either by local path or by remote slug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoSelector {
    Local(String),
    Remote { owner: String, name: String },
}

pub fn exactly_one_selector(repo_path: Option<&str>, repo: Option<&str>) -> Result<RepoSelector> {
    let repo_path = repo_path.filter(|p| !p.is_empty());
    let repo = repo.filter(|r| !r.is_empty());
    match (repo_path, repo) {
        (Some(path), None) => Ok(RepoSelector::Local(path.to_string())),
        (None, Some(slug)) => {
            let (owner, name) = repo_slug(slug)?;
            Ok(RepoSelector::Remote { owner, name })
        }
        (None, None) => Err(Error::validation("exactly one of repo_path or repo is required")),
        (Some(_), Some(_)) => {
            Err(Error::validation("repo_path and repo are mutually exclusive; supply one"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_rules() {
        assert_eq!(limit(None).unwrap(), None);
        assert_eq!(limit(Some(1)).unwrap(), Some(1));
        assert!(limit(Some(0)).unwrap_err().is_validation());
        assert!(limit(Some(-3)).unwrap_err().is_validation());
    }

    #[test]
    fn base_path_rejects_absolute_and_traversal() {
        for bad in ["/etc", "/abs", "\\windows", "C:\\temp", "../up", "a/../../b", "a/.."] {
            assert!(base_path(Some(bad)).unwrap_err().is_validation(), "{bad}");
        }
    }

    #[test]
    fn base_path_accepts_relative() {
        assert_eq!(base_path(Some("src/")).unwrap(), Some("src".to_string()));
        assert_eq!(base_path(Some("a/b.c")).unwrap(), Some("a/b.c".to_string()));
        assert_eq!(base_path(Some("..hidden")).unwrap(), Some("..hidden".to_string()));
        assert_eq!(base_path(Some("")).unwrap(), None);
        assert_eq!(base_path(None).unwrap(), None);
    }

    #[test]
    fn empty_pattern_rejected() {
        assert!(pattern("").unwrap_err().is_validation());
        assert!(pattern("x").is_ok());
    }

    #[test]
    fn selector_cardinality() {
        assert!(exactly_one_selector(None, None).unwrap_err().is_validation());
        assert!(exactly_one_selector(Some("/tmp/r"), Some("o/n")).unwrap_err().is_validation());
        assert_eq!(
            exactly_one_selector(Some("/tmp/r"), None).unwrap(),
            RepoSelector::Local("/tmp/r".to_string())
        );
        assert_eq!(
            exactly_one_selector(None, Some("o/n")).unwrap(),
            RepoSelector::Remote { owner: "o".into(), name: "n".into() }
        );
    }

    #[test]
    fn slug_must_have_owner_and_name() {
        assert!(repo_slug("justname").is_err());
        assert!(repo_slug("/n").is_err());
        assert!(repo_slug("o/n/x").is_err());
        assert_eq!(repo_slug("o/n.git").unwrap(), ("o".to_string(), "n".to_string()));
    }
}

//! [`PathContext`] – immutable inputs to path resolution.
//!
//! A context is built once per invocation, either explicitly through
//! [`PathContext::builder`] or from the ambient environment with
//! [`PathContext::detect`], which reads the `origin` remote of the enclosing
//! git repository straight from `.git/config`.
//!
//! # Example
//!
//! ```rust
//! use mnemo_paths::{PathContext, Scheme};
//!
//! let ctx = PathContext::builder("/home/dev/.mnemo")
//!     .organization("acme")
//!     .project("billing")
//!     .scheme(Scheme::V2)
//!     .build()
//!     .unwrap();
//! assert_eq!(ctx.organization(), "acme");
//! assert!(ctx.has_organization());
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::resolver::{PathInputError, validate_name};

/// Organization used when none can be detected.
pub const DEFAULT_ORGANIZATION: &str = "default";

/// Directory under a repository that holds LEGACY project-scope records.
pub const LEGACY_PROJECT_DIR: &str = ".mnemo";

/// Versioned directory-layout convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// Organization records under the home root, project records inside the
    /// repository.
    Legacy,
    /// Everything nested under the home root, keyed by organization then
    /// project.
    #[default]
    V2,
}

impl Scheme {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "legacy" => Some(Scheme::Legacy),
            "v2" => Some(Scheme::V2),
            _ => None,
        }
    }
}

/// Resolution inputs.  Never persisted; immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathContext {
    organization: String,
    project: String,
    home_root: PathBuf,
    project_root: PathBuf,
    scheme: Scheme,
}

impl PathContext {
    pub fn builder(home_root: impl Into<PathBuf>) -> PathContextBuilder {
        PathContextBuilder {
            home_root: home_root.into(),
            organization: None,
            project: None,
            project_root: None,
            scheme: Scheme::default(),
        }
    }

    /// Derive a context from the working directory.
    ///
    /// The organization and project come from the `origin` remote of the
    /// nearest enclosing git repository.  Without a remote the organization
    /// falls back to [`DEFAULT_ORGANIZATION`] and the project to the
    /// repository (or `cwd`) directory name.
    pub fn detect(cwd: &Path, home_root: &Path, scheme: Scheme) -> Self {
        let repo_root = find_repo_root(cwd);
        let base = repo_root.clone().unwrap_or_else(|| cwd.to_path_buf());
        let remote = repo_root
            .as_deref()
            .and_then(read_origin_url)
            .and_then(|url| parse_remote_url(&url));

        let (organization, project) = match remote {
            Some((org, project)) => (org, project),
            None => (
                DEFAULT_ORGANIZATION.to_string(),
                base.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .filter(|n| validate_name(n).is_ok())
                    .unwrap_or_else(|| DEFAULT_ORGANIZATION.to_string()),
            ),
        };
        debug!(%organization, %project, base = %base.display(), "detected path context");

        Self {
            organization,
            project,
            home_root: home_root.to_path_buf(),
            project_root: base.join(LEGACY_PROJECT_DIR),
            scheme,
        }
    }

    pub fn organization(&self) -> &str {
        &self.organization
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn home_root(&self) -> &Path {
        &self.home_root
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// `false` when organization detection fell back to the default root.
    pub fn has_organization(&self) -> bool {
        self.organization != DEFAULT_ORGANIZATION
    }

    /// The same context under another layout scheme.
    pub fn with_scheme(&self, scheme: Scheme) -> Self {
        Self {
            scheme,
            ..self.clone()
        }
    }
}

/// Explicit [`PathContext`] construction.
pub struct PathContextBuilder {
    home_root: PathBuf,
    organization: Option<String>,
    project: Option<String>,
    project_root: Option<PathBuf>,
    scheme: Scheme,
}

impl PathContextBuilder {
    pub fn organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// LEGACY project-scope root.  Defaults to
    /// `{home_root}/{organization}/{project}`.
    pub fn project_root(mut self, project_root: impl Into<PathBuf>) -> Self {
        self.project_root = Some(project_root.into());
        self
    }

    pub fn scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Organization and project must be single safe path segments.
    pub fn build(self) -> Result<PathContext, PathInputError> {
        let organization = self
            .organization
            .unwrap_or_else(|| DEFAULT_ORGANIZATION.to_string());
        let project = self
            .project
            .unwrap_or_else(|| DEFAULT_ORGANIZATION.to_string());
        validate_name(&organization)?;
        validate_name(&project)?;
        let project_root = self
            .project_root
            .unwrap_or_else(|| self.home_root.join(&organization).join(&project));
        Ok(PathContext {
            organization,
            project,
            home_root: self.home_root,
            project_root,
            scheme: self.scheme,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Git remote detection
// ─────────────────────────────────────────────────────────────────────────────

/// Nearest ancestor of `start` (inclusive) that contains `.git`.
pub fn find_repo_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
}

/// URL of the `origin` remote, read from the repository's git config.
///
/// Follows a `.git` *file* (`gitdir: ...`) as used by worktrees and
/// submodules.
pub fn read_origin_url(repo_root: &Path) -> Option<String> {
    let dot_git = repo_root.join(".git");
    let git_dir = if dot_git.is_file() {
        let pointer = fs::read_to_string(&dot_git).ok()?;
        let target = pointer.trim().strip_prefix("gitdir:")?.trim();
        let target = PathBuf::from(target);
        if target.is_absolute() {
            target
        } else {
            repo_root.join(target)
        }
    } else {
        dot_git
    };
    let config = fs::read_to_string(git_dir.join("config")).ok()?;
    parse_origin_from_config(&config)
}

fn parse_origin_from_config(config: &str) -> Option<String> {
    let mut in_origin = false;
    for line in config.lines() {
        let line = line.trim();
        if line.starts_with('[') {
            in_origin = line == r#"[remote "origin"]"#;
            continue;
        }
        if in_origin
            && let Some((key, value)) = line.split_once('=')
            && key.trim() == "url"
        {
            return Some(value.trim().to_string());
        }
    }
    None
}

/// Split a remote URL into `(organization, project)`.
///
/// Handles scp-like (`git@host:org/repo.git`), `https://` and `ssh://`
/// forms.  Nested groups keep the first path segment as the organization.
pub fn parse_remote_url(url: &str) -> Option<(String, String)> {
    let url = url.trim().trim_end_matches('/');
    let path = if let Some((_, rest)) = url.split_once("://") {
        rest.split_once('/').map(|(_, p)| p)?
    } else {
        url.split_once(':').map(|(_, p)| p)?
    };
    let path = path.strip_suffix(".git").unwrap_or(path);
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() < 2 {
        return None;
    }
    let organization = segments[0].to_string();
    let project = segments[segments.len() - 1].to_string();
    if validate_name(&organization).is_err() || validate_name(&project).is_err() {
        return None;
    }
    Some((organization, project))
}

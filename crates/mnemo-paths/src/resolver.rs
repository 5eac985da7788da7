//! [`PathResolver`] – storage and search locations for records.
//!
//! | Scope | LEGACY | V2 |
//! |---|---|---|
//! | project | `{project_root}/{ns}` | `{home}/{org}/{project}/{ns}` |
//! | organization | `{home}/{org}/{ns}` | `{home}/{org}/{ns}` |
//! | global | `{home}/default/{ns}` | `{home}/default/{ns}` |
//!
//! All methods except [`PathResolver::get_search_paths`] return computed
//! paths whether or not they exist; creating directories is the caller's
//! job.  Malformed namespaces and filenames fail fast with
//! [`PathInputError`].
//!
//! # Example
//!
//! ```rust
//! use std::path::Path;
//! use mnemo_paths::{PathContext, PathResolver, Scheme, Scope};
//!
//! let ctx = PathContext::builder("/home/dev/.mnemo")
//!     .organization("acme")
//!     .project("billing")
//!     .scheme(Scheme::V2)
//!     .build()
//!     .unwrap();
//! let resolver = PathResolver::new(ctx);
//!
//! let dir = resolver.get_record_dir("semantic/decisions", Scope::Project).unwrap();
//! assert_eq!(dir, Path::new("/home/dev/.mnemo/acme/billing/semantic/decisions"));
//! assert!(resolver.get_record_path("semantic/decisions", "../x.memory.md", Scope::Project).is_err());
//! ```

use std::path::{Path, PathBuf};

use mnemo_types::CognitiveType;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::{DEFAULT_ORGANIZATION, PathContext, Scheme};

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Malformed or malicious path input.  Always a caller bug or an attack,
/// never a data-quality issue.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathInputError {
    #[error("namespace must not be empty")]
    EmptyNamespace,
    #[error("namespace {0:?} must be relative")]
    AbsoluteNamespace(String),
    #[error("invalid segment {segment:?} in namespace {namespace:?}")]
    InvalidSegment { namespace: String, segment: String },
    #[error("filename {0:?} must not contain path separators")]
    SeparatorInFilename(String),
    #[error("filename {0:?} is not a plain file name")]
    InvalidFilename(String),
    #[error("invalid organization or project name {0:?}")]
    InvalidName(String),
}

pub(crate) fn validate_name(name: &str) -> Result<(), PathInputError> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
    {
        return Err(PathInputError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Namespace segments are lowercase `[a-z0-9._-]`, never `.` or `..`.
pub fn validate_namespace(namespace: &str) -> Result<(), PathInputError> {
    if namespace.is_empty() {
        return Err(PathInputError::EmptyNamespace);
    }
    if namespace.starts_with('/') || namespace.contains('\\') {
        return Err(PathInputError::AbsoluteNamespace(namespace.to_string()));
    }
    for segment in namespace.split('/') {
        let ok = !segment.is_empty()
            && segment != "."
            && segment != ".."
            && segment
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.'));
        if !ok {
            return Err(PathInputError::InvalidSegment {
                namespace: namespace.to_string(),
                segment: segment.to_string(),
            });
        }
    }
    Ok(())
}

fn validate_filename(filename: &str) -> Result<(), PathInputError> {
    if filename.contains(['/', '\\']) {
        return Err(PathInputError::SeparatorInFilename(filename.to_string()));
    }
    if filename.is_empty() || filename == "." || filename == ".." || filename.contains('\0') {
        return Err(PathInputError::InvalidFilename(filename.to_string()));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Scope
// ─────────────────────────────────────────────────────────────────────────────

/// Breadth of visibility for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Project,
    Organization,
    /// The `default` fallback root.
    Global,
}

impl Scope {
    /// Search precedence, highest first.
    pub const PRECEDENCE: [Scope; 3] = [Scope::Project, Scope::Organization, Scope::Global];
}

/// Which scopes a search should cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncludeScopes {
    pub project: bool,
    pub organization: bool,
    pub global: bool,
}

impl Default for IncludeScopes {
    fn default() -> Self {
        Self {
            project: true,
            organization: true,
            global: true,
        }
    }
}

impl IncludeScopes {
    pub fn only(scope: Scope) -> Self {
        Self {
            project: scope == Scope::Project,
            organization: scope == Scope::Organization,
            global: scope == Scope::Global,
        }
    }

    pub fn includes(&self, scope: Scope) -> bool {
        match scope {
            Scope::Project => self.project,
            Scope::Organization => self.organization,
            Scope::Global => self.global,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PathResolver
// ─────────────────────────────────────────────────────────────────────────────

/// Computes record locations from an immutable [`PathContext`].
#[derive(Debug, Clone)]
pub struct PathResolver {
    ctx: PathContext,
}

impl PathResolver {
    pub fn new(ctx: PathContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &PathContext {
        &self.ctx
    }

    /// Root directory of `scope` under the context's scheme.
    pub fn scope_root(&self, scope: Scope) -> PathBuf {
        let home = self.ctx.home_root();
        match (self.ctx.scheme(), scope) {
            (Scheme::V2, Scope::Project) => home
                .join(self.ctx.organization())
                .join(self.ctx.project()),
            (Scheme::Legacy, Scope::Project) => self.ctx.project_root().to_path_buf(),
            (_, Scope::Organization) => home.join(self.ctx.organization()),
            (_, Scope::Global) => home.join(DEFAULT_ORGANIZATION),
        }
    }

    /// Directory holding records of `namespace` in `scope`.
    pub fn get_record_dir(&self, namespace: &str, scope: Scope) -> Result<PathBuf, PathInputError> {
        validate_namespace(namespace)?;
        Ok(join_namespace(&self.scope_root(scope), namespace))
    }

    /// Full path of `filename` inside [`get_record_dir`][Self::get_record_dir].
    ///
    /// `filename` must be a bare file name; anything containing `/` or `\`
    /// is rejected.
    pub fn get_record_path(
        &self,
        namespace: &str,
        filename: &str,
        scope: Scope,
    ) -> Result<PathBuf, PathInputError> {
        validate_filename(filename)?;
        Ok(self.get_record_dir(namespace, scope)?.join(filename))
    }

    /// Scope roots in precedence order, deduplicated.
    ///
    /// Without a detected organization the organization root *is* the
    /// default root, so it is listed once.
    pub fn scope_roots(&self, include: IncludeScopes) -> Vec<(Scope, PathBuf)> {
        let mut roots: Vec<(Scope, PathBuf)> = Vec::with_capacity(3);
        for scope in Scope::PRECEDENCE {
            if !include.includes(scope) {
                continue;
            }
            let root = self.scope_root(scope);
            if roots.iter().all(|(_, r)| *r != root) {
                roots.push((scope, root));
            }
        }
        roots
    }

    /// Existing search directories in precedence order (project, then
    /// organization, then global default).
    ///
    /// With a namespace each root contributes `{root}/{namespace}`.  Without
    /// one each root contributes its three cognitive-type directories, which
    /// keeps a V2 organization search out of sibling project trees.
    pub fn get_search_paths(
        &self,
        namespace: Option<&str>,
        include: IncludeScopes,
    ) -> Result<Vec<PathBuf>, PathInputError> {
        if let Some(ns) = namespace {
            validate_namespace(ns)?;
        }
        let mut paths = Vec::new();
        for (_, root) in self.scope_roots(include) {
            match namespace {
                Some(ns) => paths.push(join_namespace(&root, ns)),
                None => paths.extend(cognitive_dirs(root)),
            }
        }
        paths.retain(|p| p.is_dir());
        Ok(paths)
    }

    /// Every directory a relationship target may live under, existing or
    /// not: the cognitive-type directories of each scope root.
    ///
    /// Like [`get_search_paths`][Self::get_search_paths] without a
    /// namespace, a V2 organization contributes only its own
    /// `semantic`/`episodic`/`procedural` trees, never sibling projects.
    pub fn get_relationship_target_roots(&self) -> Vec<PathBuf> {
        self.scope_roots(IncludeScopes::default())
            .into_iter()
            .flat_map(|(_, root)| cognitive_dirs(root))
            .collect()
    }
}

fn cognitive_dirs(root: PathBuf) -> impl Iterator<Item = PathBuf> {
    CognitiveType::ALL.iter().map(move |ct| root.join(ct.as_str()))
}

fn join_namespace(root: &Path, namespace: &str) -> PathBuf {
    namespace
        .split('/')
        .fold(root.to_path_buf(), |acc, segment| acc.join(segment))
}

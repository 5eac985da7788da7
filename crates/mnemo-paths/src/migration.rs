//! LEGACY → V2 layout migration.
//!
//! [`legacy_to_v2`] is a pure mapping from one record location to another.
//! [`plan_migration`] walks the LEGACY roots and produces a
//! [`MigrationPlan`] that can be rendered as a dry-run diff before
//! [`apply_migration`] moves anything.  Moves are independent per file and
//! never overwrite an existing destination.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use mnemo_types::RECORD_EXTENSION;
use thiserror::Error;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::context::{PathContext, Scheme};
use crate::resolver::{IncludeScopes, PathResolver, Scope};

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("destination already exists: {0}")]
    DestinationExists(PathBuf),
    #[error("I/O error moving {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// One file move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStep {
    pub from: PathBuf,
    pub to: PathBuf,
}

/// Dry-run result of [`plan_migration`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationPlan {
    pub steps: Vec<MigrationStep>,
}

impl MigrationPlan {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// One `from -> to` line per step.
    pub fn render(&self) -> String {
        self.steps
            .iter()
            .map(|s| format!("{} -> {}\n", s.from.display(), s.to.display()))
            .collect()
    }
}

/// Map a LEGACY record location to its V2 location.
///
/// Returns `None` when `path` is outside every LEGACY root.  Organization
/// and global locations are identical in both schemes and map to
/// themselves.
pub fn legacy_to_v2(ctx: &PathContext, path: &Path) -> Option<PathBuf> {
    let legacy = PathResolver::new(ctx.with_scheme(Scheme::Legacy));
    let v2 = PathResolver::new(ctx.with_scheme(Scheme::V2));
    // Project first: a LEGACY project root may sit inside the organization
    // root.
    Scope::PRECEDENCE.into_iter().find_map(|scope| {
        path.strip_prefix(legacy.scope_root(scope))
            .ok()
            .map(|rel| v2.scope_root(scope).join(rel))
    })
}

/// Walk every LEGACY root and list the records whose location changes.
pub fn plan_migration(ctx: &PathContext) -> MigrationPlan {
    let legacy = PathResolver::new(ctx.with_scheme(Scheme::Legacy));
    let mut steps: Vec<MigrationStep> = Vec::new();

    for (_, root) in legacy.scope_roots(IncludeScopes::default()) {
        if !root.is_dir() {
            continue;
        }
        for entry in WalkDir::new(&root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            let is_record = entry.file_type().is_file()
                && path.to_string_lossy().ends_with(RECORD_EXTENSION);
            if !is_record {
                continue;
            }
            let Some(to) = legacy_to_v2(ctx, path) else {
                continue;
            };
            if to != path && steps.iter().all(|s| s.from != path) {
                steps.push(MigrationStep {
                    from: path.to_path_buf(),
                    to,
                });
            }
        }
    }
    MigrationPlan { steps }
}

/// Execute `plan` one file at a time, reporting each outcome.
pub fn apply_migration(plan: &MigrationPlan) -> Vec<(MigrationStep, Result<(), MigrationError>)> {
    plan.steps
        .iter()
        .map(|step| {
            let result = move_file(&step.from, &step.to);
            match &result {
                Ok(()) => info!(from = %step.from.display(), to = %step.to.display(), "migrated record"),
                Err(e) => warn!(from = %step.from.display(), error = %e, "record migration failed"),
            }
            (step.clone(), result)
        })
        .collect()
}

fn move_file(from: &Path, to: &Path) -> Result<(), MigrationError> {
    if to.exists() {
        return Err(MigrationError::DestinationExists(to.to_path_buf()));
    }
    let io_err = |source| MigrationError::Io {
        path: from.to_path_buf(),
        source,
    };
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    if fs::rename(from, to).is_err() {
        // Cross-device: copy then remove.
        fs::copy(from, to).map_err(io_err)?;
        fs::remove_file(from).map_err(io_err)?;
    }
    Ok(())
}

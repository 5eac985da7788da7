//! `mnemo-paths` – where records live.
//!
//! Pure path arithmetic over a [`PathContext`]: no directory is ever created
//! here, and the only existence checks are the ones that filter search roots.
//!
//! # Modules
//!
//! - [`context`] – [`PathContext`][context::PathContext]: the immutable
//!   resolution inputs (organization, project, roots, layout scheme), either
//!   built explicitly or detected from a working directory and its git
//!   remote.
//! - [`resolver`] – [`PathResolver`][resolver::PathResolver]: storage
//!   locations for a namespace and scope, and search roots in precedence
//!   order (project, organization, global default).
//! - [`migration`] – [`plan_migration`][migration::plan_migration]: a pure
//!   LEGACY → V2 location mapping with a dry-run plan and a per-file apply
//!   step.

pub mod context;
pub mod migration;
pub mod resolver;

pub use context::{DEFAULT_ORGANIZATION, PathContext, PathContextBuilder, Scheme};
pub use migration::{MigrationError, MigrationPlan, MigrationStep, apply_migration, legacy_to_v2, plan_migration};
pub use resolver::{IncludeScopes, PathInputError, PathResolver, Scope};

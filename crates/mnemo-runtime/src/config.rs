//! Configuration – reads/writes `~/.mnemo/config.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use mnemo_memory::CodecMode;
use mnemo_memory::decay::DEFAULT_HALF_LIFE_DAYS;
use mnemo_memory::scorer::{DEFAULT_MAX_RESULTS, DEFAULT_MIN_THRESHOLD};
use mnemo_paths::{PathContext, PathInputError, Scheme};
use mnemo_schema::OntologySource;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Directory under the user's home that holds the config file and, unless
/// overridden, the record tree.
pub const MNEMO_DIR: &str = ".mnemo";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write config at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// `[scorer]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorerConfig {
    #[serde(default = "default_min_threshold")]
    pub min_threshold: i64,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            min_threshold: default_min_threshold(),
            max_results: default_max_results(),
        }
    }
}

/// `[decay]` table.  Half-lives are ISO-8601 durations keyed by namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecayConfig {
    #[serde(default = "default_half_life")]
    pub default_half_life: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub half_lives: BTreeMap<String, String>,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            default_half_life: default_half_life(),
            half_lives: BTreeMap::new(),
        }
    }
}

/// Persisted user configuration stored in `~/.mnemo/config.toml`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    /// Root of the record tree.  Defaults to `~/.mnemo`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_root: Option<PathBuf>,

    #[serde(default)]
    pub scheme: Scheme,

    /// Overrides the organization detected from the git remote.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,

    /// Overrides the detected project name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    #[serde(default)]
    pub codec: CodecMode,

    #[serde(default)]
    pub scorer: ScorerConfig,

    #[serde(default)]
    pub decay: DecayConfig,

    /// Extra ontology files layered over the bundled base, lowest
    /// precedence first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ontologies: Vec<PathBuf>,
}

fn default_min_threshold() -> i64 {
    DEFAULT_MIN_THRESHOLD
}
fn default_max_results() -> usize {
    DEFAULT_MAX_RESULTS
}
fn default_half_life() -> String {
    format!("P{DEFAULT_HALF_LIFE_DAYS}D")
}

impl Config {
    /// Root of the record tree after defaulting.
    pub fn home_root(&self) -> PathBuf {
        self.home_root
            .clone()
            .unwrap_or_else(|| user_home().join(MNEMO_DIR))
    }

    /// Detect the context from `cwd`, then apply the organization and
    /// project overrides.
    pub fn path_context(&self, cwd: &Path) -> Result<PathContext, PathInputError> {
        let detected = PathContext::detect(cwd, &self.home_root(), self.scheme);
        if self.organization.is_none() && self.project.is_none() {
            return Ok(detected);
        }
        PathContext::builder(detected.home_root())
            .organization(
                self.organization
                    .clone()
                    .unwrap_or_else(|| detected.organization().to_string()),
            )
            .project(
                self.project
                    .clone()
                    .unwrap_or_else(|| detected.project().to_string()),
            )
            .project_root(detected.project_root())
            .scheme(self.scheme)
            .build()
    }

    /// Bundled base ontology followed by every configured file.
    pub fn ontology_sources(&self) -> Vec<OntologySource> {
        std::iter::once(OntologySource::Bundled)
            .chain(self.ontologies.iter().cloned().map(OntologySource::File))
            .collect()
    }
}

fn user_home() -> PathBuf {
    PathBuf::from(
        std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Return the path to `~/.mnemo/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&user_home())
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &Path) -> PathBuf {
    home.join(MNEMO_DIR).join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, ConfigError> {
    load_from(&config_path())
}

/// Load the config from a specific path and apply environment overrides.
pub fn load_from(path: &Path) -> Result<Option<Config>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut cfg: Config = toml::from_str(&raw)?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `MNEMO_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `MNEMO_HOME` | `home_root` |
/// | `MNEMO_SCHEME` | `scheme` (`legacy` or `v2`) |
/// | `MNEMO_ORG` | `organization` |
/// | `MNEMO_PROJECT` | `project` |
/// | `MNEMO_CODEC` | `codec` (`structured`, `line` or `auto`) |
///
/// Unparseable scheme and codec values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("MNEMO_HOME") {
        cfg.home_root = Some(PathBuf::from(v));
    }
    if let Ok(v) = std::env::var("MNEMO_SCHEME")
        && let Some(scheme) = Scheme::parse(&v)
    {
        cfg.scheme = scheme;
    }
    if let Ok(v) = std::env::var("MNEMO_ORG") {
        cfg.organization = Some(v);
    }
    if let Ok(v) = std::env::var("MNEMO_PROJECT") {
        cfg.project = Some(v);
    }
    if let Ok(v) = std::env::var("MNEMO_CODEC")
        && let Some(codec) = CodecMode::parse(&v)
    {
        cfg.codec = codec;
    }
}

/// Save the config to disk, creating `~/.mnemo/` if necessary.
pub fn save(cfg: &Config) -> Result<(), ConfigError> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
        // Owner-only directory (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(write_err)?;
        }
    }
    let raw = toml::to_string_pretty(cfg)?;
    // Owner-only file (rw-------) on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(write_err)?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(write_err)?;
    Ok(())
}

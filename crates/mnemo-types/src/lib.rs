//! `mnemo-types` – the shared record model of the mnemo memory engine.
//!
//! A [`Record`] is one knowledge entry: a structured [`RecordHeader`]
//! followed by a free-text Markdown body.  Header fields that are subject to
//! validation (ids, timestamps, vocabulary values) are kept as the raw
//! strings found on disk, so a malformed record can still be loaded,
//! reported on and repaired.  Typed views are available through accessors
//! such as [`RecordHeader::uuid`] and [`RecordHeader::cognitive_type`].
//!
//! # Modules
//!
//! - [`duration`] – [`IsoDuration`]: ISO-8601 duration parsing used for
//!   decay half-lives.
//! - [`relationship`] – [`RelationshipType`]: the canonical, closed registry
//!   of typed edges with their inverse and symmetry flags.
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use mnemo_types::{CognitiveType, Record};
//!
//! let record = Record::new(CognitiveType::Semantic, "decisions", "Use PostgreSQL", Utc::now());
//! assert_eq!(record.header.namespace, "semantic/decisions");
//! assert_eq!(record.header.sub_namespace(), "decisions");
//! assert!(record.file_name().ends_with(".memory.md"));
//! ```

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod duration;
pub mod relationship;

pub use duration::{DurationParseError, IsoDuration};
pub use relationship::{RelationshipType, UnknownRelationshipType};

/// File-name suffix shared by every record on disk.
pub const RECORD_EXTENSION: &str = ".memory.md";

// ─────────────────────────────────────────────────────────────────────────────
// Closed vocabularies
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level classification of a record, and the leading namespace segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CognitiveType {
    /// Facts, decisions, knowledge.
    Semantic,
    /// Events, sessions, incidents.
    Episodic,
    /// Processes, runbooks, patterns.
    Procedural,
}

impl CognitiveType {
    pub const ALL: [CognitiveType; 3] = [
        CognitiveType::Semantic,
        CognitiveType::Episodic,
        CognitiveType::Procedural,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CognitiveType::Semantic => "semantic",
            CognitiveType::Episodic => "episodic",
            CognitiveType::Procedural => "procedural",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "semantic" => Some(CognitiveType::Semantic),
            "episodic" => Some(CognitiveType::Episodic),
            "procedural" => Some(CognitiveType::Procedural),
            _ => None,
        }
    }
}

impl fmt::Display for CognitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the knowledge in a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Conversation,
    UserExplicit,
    Inferred,
    Manual,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Conversation => "conversation",
            SourceType::UserExplicit => "user_explicit",
            SourceType::Inferred => "inferred",
            SourceType::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "conversation" => Some(SourceType::Conversation),
            "user_explicit" => Some(SourceType::UserExplicit),
            "inferred" => Some(SourceType::Inferred),
            "manual" => Some(SourceType::Manual),
            _ => None,
        }
    }
}

/// Kind of external source a [`Citation`] points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CitationType {
    Paper,
    Documentation,
    Blog,
    Github,
    Stackoverflow,
    Article,
}

impl CitationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CitationType::Paper => "paper",
            CitationType::Documentation => "documentation",
            CitationType::Blog => "blog",
            CitationType::Github => "github",
            CitationType::Stackoverflow => "stackoverflow",
            CitationType::Article => "article",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "paper" => Some(CitationType::Paper),
            "documentation" => Some(CitationType::Documentation),
            "blog" => Some(CitationType::Blog),
            "github" => Some(CitationType::Github),
            "stackoverflow" => Some(CitationType::Stackoverflow),
            "article" => Some(CitationType::Article),
            _ => None,
        }
    }
}

/// Kind of source-code symbol a [`CodeRef`] points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CodeRefType {
    Function,
    Class,
    Method,
    Variable,
    Type,
    Module,
}

impl CodeRefType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeRefType::Function => "function",
            CodeRefType::Class => "class",
            CodeRefType::Method => "method",
            CodeRefType::Variable => "variable",
            CodeRefType::Type => "type",
            CodeRefType::Module => "module",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "function" => Some(CodeRefType::Function),
            "class" => Some(CodeRefType::Class),
            "method" => Some(CodeRefType::Method),
            "variable" => Some(CodeRefType::Variable),
            "type" => Some(CodeRefType::Type),
            "module" => Some(CodeRefType::Module),
            _ => None,
        }
    }
}

/// Strength decay model attached to a record's [`Decay`] block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DecayModel {
    /// `strength × 0.5^(days / half_life)`.
    Exponential,
    /// `strength − days / half_life`, floored at zero.
    Linear,
    /// Drops to zero once `days > half_life`.
    Step,
    /// Strength never changes.
    None,
}

impl DecayModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecayModel::Exponential => "exponential",
            DecayModel::Linear => "linear",
            DecayModel::Step => "step",
            DecayModel::None => "none",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "exponential" => Some(DecayModel::Exponential),
            "linear" => Some(DecayModel::Linear),
            "step" => Some(DecayModel::Step),
            "none" => Some(DecayModel::None),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Header blocks
// ─────────────────────────────────────────────────────────────────────────────

fn default_decay_model() -> String {
    DecayModel::Exponential.as_str().to_string()
}

fn default_unit() -> f64 {
    1.0
}

/// Optional relevance-decay block nested under [`Temporal`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Decay {
    /// One of `exponential | linear | step | none`.
    #[serde(default = "default_decay_model")]
    pub model: String,
    /// ISO-8601 duration such as `P90D`.  When absent the namespace default
    /// half-life applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub half_life: Option<String>,
    /// Current strength in `[0.0, 1.0]`.
    #[serde(default = "default_unit")]
    pub strength: f64,
    /// Last time the record was read or reinforced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<String>,
    /// Instant up to which `strength` has already been decayed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decayed_at: Option<String>,
}

impl Default for Decay {
    fn default() -> Self {
        Self {
            model: default_decay_model(),
            half_life: None,
            strength: 1.0,
            last_accessed: None,
            decayed_at: None,
        }
    }
}

/// Bi-temporal fields: when the fact became true and when it was recorded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Temporal {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub valid_from: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub recorded_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decay: Option<Decay>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Provenance {
    /// One of `conversation | user_explicit | inferred | manual`.
    #[serde(default)]
    pub source_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub agent: String,
    #[serde(default = "default_unit")]
    pub confidence: f64,
}

/// Typed payload for records that instantiate an ontology entity type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EntityBlock {
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Citation {
    #[serde(rename = "type")]
    pub citation_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// A typed edge from the owning record to `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Relationship {
    /// Relationship type name, PascalCase once normalised.
    #[serde(rename = "type")]
    pub relation: String,
    /// Target record UUID.
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CodeRef {
    #[serde(rename = "type")]
    pub ref_type: String,
    pub file: String,
    pub line: i64,
}

// ─────────────────────────────────────────────────────────────────────────────
// RecordHeader
// ─────────────────────────────────────────────────────────────────────────────

/// Structured metadata block at the top of every record file.
///
/// Field order matters for serialization: scalars first, then nested
/// tables, then arrays of tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RecordHeader {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Cognitive type; must equal the leading segment of `namespace`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    /// `{cognitive-type}/{sub-namespace}`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub modified: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal: Option<Temporal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<EntityBlock>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<Relationship>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub code_refs: Vec<CodeRef>,
}

impl RecordHeader {
    /// Parsed id, or `None` when it is missing or not a UUID.
    pub fn uuid(&self) -> Option<Uuid> {
        Uuid::try_parse(&self.id).ok()
    }

    pub fn cognitive_type(&self) -> Option<CognitiveType> {
        CognitiveType::parse(&self.kind)
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.created)
    }

    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.modified)
    }

    /// Leading namespace segment (the cognitive type it claims).
    pub fn namespace_kind(&self) -> &str {
        self.namespace.split('/').next().unwrap_or("")
    }

    /// Namespace with the cognitive-type prefix stripped.
    pub fn sub_namespace(&self) -> &str {
        sub_namespace_of(&self.namespace)
    }

    pub fn decay(&self) -> Option<&Decay> {
        self.temporal.as_ref().and_then(|t| t.decay.as_ref())
    }

    pub fn decay_mut(&mut self) -> Option<&mut Decay> {
        self.temporal.as_mut().and_then(|t| t.decay.as_mut())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Record
// ─────────────────────────────────────────────────────────────────────────────

/// A single stored knowledge entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Record {
    pub header: RecordHeader,
    pub body: String,
}

impl Record {
    /// Mint a new record with a fresh v4 UUID.  Every timestamp is set to
    /// `now`; the namespace is `{kind}/{sub_namespace}`.
    pub fn new(kind: CognitiveType, sub_namespace: &str, title: &str, now: DateTime<Utc>) -> Self {
        let stamp = format_timestamp(now);
        Self {
            header: RecordHeader {
                id: Uuid::new_v4().to_string(),
                kind: kind.as_str().to_string(),
                namespace: format!("{}/{}", kind.as_str(), sub_namespace.trim_matches('/')),
                created: stamp.clone(),
                modified: stamp.clone(),
                title: title.to_string(),
                temporal: Some(Temporal {
                    valid_from: stamp.clone(),
                    recorded_at: stamp,
                    decay: None,
                }),
                ..RecordHeader::default()
            },
            body: String::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.header.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Bump `modified` after a content or header change.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.header.modified = format_timestamp(now);
    }

    /// Conventional on-disk file name, `{id}.memory.md`.
    pub fn file_name(&self) -> String {
        format!("{}{}", self.header.id, RECORD_EXTENSION)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Validation findings
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("error"),
            Severity::Warning => f.write_str("warning"),
        }
    }
}

/// One schema or consistency problem found in a record.
///
/// Findings are accumulated and returned, never raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Dotted path of the offending field, e.g. `provenance.confidence`.
    pub field: String,
    pub message: String,
    pub severity: Severity,
}

impl Finding {
    pub fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: Severity::Error,
        }
    }

    pub fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: Severity::Warning,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.field, self.message)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Free helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Parse an ISO-8601 timestamp into UTC.
///
/// Accepts RFC-3339 (any offset), a naive `YYYY-MM-DDTHH:MM:SS[.f]` read as
/// UTC, and a bare `YYYY-MM-DD` read as midnight UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|n| n.and_utc())
}

/// RFC-3339 with second precision and a `Z` suffix.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// `true` for a canonical hyphenated, lowercase UUID of any version.
pub fn is_lowercase_uuid(s: &str) -> bool {
    s.len() == 36 && !s.chars().any(|c| c.is_ascii_uppercase()) && Uuid::try_parse(s).is_ok()
}

/// Tags are lowercase hyphenated tokens: `[a-z0-9]+(-[a-z0-9]+)*`.
pub fn is_valid_tag(tag: &str) -> bool {
    !tag.is_empty()
        && !tag.starts_with('-')
        && !tag.ends_with('-')
        && !tag.contains("--")
        && tag
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Strip a leading cognitive-type segment from `namespace`, if present.
pub fn sub_namespace_of(namespace: &str) -> &str {
    match namespace.split_once('/') {
        Some((head, rest)) if CognitiveType::parse(head).is_some() => rest,
        None if CognitiveType::parse(namespace).is_some() => "",
        _ => namespace,
    }
}

/// Lowercase, hyphen-separated slug of `title`, at most 60 characters.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    let mut slug: String = slug.chars().take(60).collect();
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

//! Relevance ranking of candidate records.
//!
//! Text search produces candidates; [`RelevanceScorer`] orders them against
//! a [`ScoringReference`] with additive weights:
//!
//! | Signal                                      | Weight |
//! |---------------------------------------------|--------|
//! | same cognitive type                         | +30    |
//! | exact sub-namespace match                   | +20    |
//! | each shared tag                             | +20    |
//! | each reference title keyword in the title   | +15    |
//! | each reference keyword in the body          | +5     |
//!
//! Candidates under the threshold are dropped.  Ties fall back to newest
//! modification time, then path, so the order is total.
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use mnemo_memory::scorer::{RelevanceScorer, ScoringReference};
//! use mnemo_types::{CognitiveType, Record};
//!
//! let reference = ScoringReference::new("semantic", "decisions").with_tags(["database"]);
//! let candidate = Record::new(CognitiveType::Semantic, "decisions", "Pick a DB", Utc::now())
//!     .with_tags(["database", "architecture"]);
//! assert_eq!(RelevanceScorer::default().score(&reference, &candidate), 70);
//! ```

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use mnemo_types::{Record, sub_namespace_of};
use tracing::{debug, warn};

use crate::store::RecordStore;

pub const KIND_WEIGHT: i64 = 30;
pub const NAMESPACE_WEIGHT: i64 = 20;
pub const TAG_WEIGHT: i64 = 20;
pub const TITLE_KEYWORD_WEIGHT: i64 = 15;
pub const BODY_KEYWORD_WEIGHT: i64 = 5;

pub const DEFAULT_MIN_THRESHOLD: i64 = 15;
pub const DEFAULT_MAX_RESULTS: usize = 10;

const MIN_KEYWORD_LEN: usize = 3;

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "her", "was",
    "one", "our", "out", "has", "his", "how", "its", "may", "new", "now", "see", "way", "who",
    "did", "get", "let", "use", "with", "this", "that", "from", "have", "into", "what", "when",
    "where", "which", "will", "about", "there", "their", "them", "then", "than", "they", "were",
    "been", "should", "would", "could",
];

// ─────────────────────────────────────────────────────────────────────────────
// ScoringReference
// ─────────────────────────────────────────────────────────────────────────────

/// What the caller is looking for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoringReference {
    pub kind: String,
    /// Full (`semantic/decisions`) or bare (`decisions`) namespace.
    pub namespace: String,
    pub title: String,
    pub tags: Vec<String>,
    /// Extra keywords beyond those derived from `title`.
    pub keywords: Vec<String>,
}

impl ScoringReference {
    pub fn new(kind: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    /// Reference describing an existing record, for "find related" lookups.
    pub fn from_record(record: &Record) -> Self {
        Self {
            kind: record.header.kind.clone(),
            namespace: record.header.namespace.clone(),
            title: record.header.title.clone(),
            tags: record.header.tags.clone(),
            keywords: Vec::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Lowercased significant words of `title`, first occurrence order.
    pub fn title_keywords(&self) -> Vec<String> {
        let mut out = Vec::new();
        for word in words(&self.title) {
            if word.chars().count() >= MIN_KEYWORD_LEN
                && !STOP_WORDS.contains(&word.as_str())
                && !out.contains(&word)
            {
                out.push(word);
            }
        }
        out
    }

    /// Explicit keywords followed by title keywords, lowercased and
    /// deduplicated.
    pub fn all_keywords(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let explicit = self.keywords.iter().map(|k| k.trim().to_lowercase());
        for kw in explicit.chain(self.title_keywords()) {
            if !kw.is_empty() && !out.contains(&kw) {
                out.push(kw);
            }
        }
        out
    }
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Candidate
// ─────────────────────────────────────────────────────────────────────────────

/// A record found by text search, with its location.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub path: PathBuf,
    pub record: Record,
    /// File modification time, used when the header carries no timestamps.
    pub file_mtime: Option<DateTime<Utc>>,
}

impl Candidate {
    pub fn new(path: impl Into<PathBuf>, record: Record) -> Self {
        Self {
            path: path.into(),
            record,
            file_mtime: None,
        }
    }

    /// `modified`, else `created`, else the file mtime, else the epoch.
    pub fn modification_time(&self) -> DateTime<Utc> {
        let h = &self.record.header;
        h.modified_at()
            .or_else(|| h.created_at())
            .or(self.file_mtime)
            .unwrap_or(DateTime::UNIX_EPOCH)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RelevanceScorer
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelevanceScorer {
    min_threshold: i64,
    max_results: usize,
}

impl Default for RelevanceScorer {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_THRESHOLD, DEFAULT_MAX_RESULTS)
    }
}

impl RelevanceScorer {
    pub fn new(min_threshold: i64, max_results: usize) -> Self {
        Self {
            min_threshold,
            max_results,
        }
    }

    pub fn min_threshold(&self) -> i64 {
        self.min_threshold
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    /// Additive relevance of `candidate` to `reference`.
    pub fn score(&self, reference: &ScoringReference, candidate: &Record) -> i64 {
        let h = &candidate.header;
        let mut score = 0;

        if !reference.kind.is_empty() && reference.kind.eq_ignore_ascii_case(&h.kind) {
            score += KIND_WEIGHT;
        }
        let wanted = sub_namespace_of(&reference.namespace);
        if !wanted.is_empty() && wanted == h.sub_namespace() {
            score += NAMESPACE_WEIGHT;
        }

        let candidate_tags: Vec<String> = h.tags.iter().map(|t| t.to_lowercase()).collect();
        let mut seen: Vec<String> = Vec::new();
        for tag in reference.tags.iter().map(|t| t.to_lowercase()) {
            if candidate_tags.contains(&tag) && !seen.contains(&tag) {
                score += TAG_WEIGHT;
                seen.push(tag);
            }
        }

        let title_words = words(&h.title);
        for kw in reference.title_keywords() {
            if title_words.contains(&kw) {
                score += TITLE_KEYWORD_WEIGHT;
            }
        }

        let body = candidate.body.to_lowercase();
        for kw in reference.all_keywords() {
            if body.contains(&kw) {
                score += BODY_KEYWORD_WEIGHT;
            }
        }
        score
    }

    /// Score, filter and order `candidates`.
    ///
    /// Output is deterministic for identical input: score descending, then
    /// modification time descending, then path ascending.
    pub fn rank(
        &self,
        reference: &ScoringReference,
        candidates: Vec<Candidate>,
    ) -> Vec<(Candidate, i64)> {
        let mut scored: Vec<(Candidate, i64)> = candidates
            .into_iter()
            .map(|c| {
                let s = self.score(reference, &c.record);
                (c, s)
            })
            .filter(|(_, s)| *s >= self.min_threshold)
            .collect();
        scored.sort_by(|(a, sa), (b, sb)| compare(a, *sa, b, *sb));
        scored.truncate(self.max_results);
        debug!(kept = scored.len(), "ranked candidates");
        scored
    }

    /// Load `paths` through `store` and [`rank`][Self::rank] them.
    ///
    /// Unreadable or undecodable files are skipped with a warning.
    pub fn rank_paths(
        &self,
        store: &RecordStore,
        reference: &ScoringReference,
        paths: &[PathBuf],
    ) -> Vec<(PathBuf, i64)> {
        let candidates = paths
            .iter()
            .filter_map(|path| match store.read(path) {
                Ok(record) => Some(Candidate {
                    path: path.clone(),
                    record,
                    file_mtime: file_mtime(path),
                }),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable candidate");
                    None
                }
            })
            .collect();
        self.rank(reference, candidates)
            .into_iter()
            .map(|(c, s)| (c.path, s))
            .collect()
    }
}

fn compare(a: &Candidate, sa: i64, b: &Candidate, sb: i64) -> Ordering {
    sb.cmp(&sa)
        .then_with(|| b.modification_time().cmp(&a.modification_time()))
        .then_with(|| a.path.cmp(&b.path))
}

fn file_mtime(path: &Path) -> Option<DateTime<Utc>> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Utc>::from)
}

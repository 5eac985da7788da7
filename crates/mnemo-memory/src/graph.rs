//! Typed relationship edges between records.
//!
//! An edge lives in the header of its source record.  A bidirectional link
//! is two independent single-file writes: the forward edge on the source,
//! then the inverse edge on the target.  Each write is atomic; the pair is
//! not.  When the second write fails the caller gets a
//! [`BidirectionalOutcome`] with `flags() == (true, false)` and decides
//! whether to retry.  Retrying is safe because an edge that already exists
//! counts as done.
//!
//! Targets do not have to exist when an edge is added; dangling targets are
//! reported by the store audit instead.
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use mnemo_memory::graph::RelationshipGraph;
//! use mnemo_types::{CognitiveType, Record};
//!
//! let mut new = Record::new(CognitiveType::Semantic, "decisions", "Use PostgreSQL", Utc::now());
//! let mut old = Record::new(CognitiveType::Semantic, "decisions", "Use MySQL", Utc::now());
//! RelationshipGraph::link_records(&mut new, &mut old, "supersedes", None).unwrap();
//!
//! assert_eq!(new.header.relationships[0].relation, "Supersedes");
//! assert_eq!(old.header.relationships[0].relation, "SupersededBy");
//! assert_eq!(old.header.relationships[0].target, new.header.id);
//! ```

use std::path::{Path, PathBuf};

use mnemo_types::{Record, Relationship, RelationshipType};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::store::{RecordStore, StoreError};

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Rejected edge.  Raised before anything is written.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelationshipError {
    #[error("unknown relationship type: {0}")]
    UnknownType(String),
    #[error("relationship target {0:?} is not a UUID")]
    InvalidTarget(String),
    #[error("record already has a {relation} edge to {target}")]
    Duplicate { relation: RelationshipType, target: String },
    #[error("{relation} edge to {target} contradicts existing {existing} edge")]
    Contradictory {
        relation: RelationshipType,
        existing: RelationshipType,
        target: String,
    },
}

/// Failure of one side of a file-backed link.
#[derive(Error, Debug)]
pub enum LinkError {
    #[error(transparent)]
    Relationship(#[from] RelationshipError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("source record {0} not found")]
    SourceNotFound(String),
    #[error("target record {0} not found")]
    TargetNotFound(String),
    #[error("record at {0} has no valid id")]
    MissingId(PathBuf),
    #[error("not attempted")]
    NotAttempted,
}

/// Independent results of the two writes behind a bidirectional link.
#[derive(Debug)]
pub struct BidirectionalOutcome {
    pub forward: Result<(), LinkError>,
    pub inverse: Result<(), LinkError>,
}

impl BidirectionalOutcome {
    /// `(forward_ok, inverse_ok)`.
    pub fn flags(&self) -> (bool, bool) {
        (self.forward.is_ok(), self.inverse.is_ok())
    }

    pub fn is_complete(&self) -> bool {
        self.flags() == (true, true)
    }

    /// Forward edge written, inverse missing.
    pub fn is_partial(&self) -> bool {
        self.flags() == (true, false)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RelationshipGraph
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct RelationshipGraph {
    store: RecordStore,
}

impl RelationshipGraph {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    pub fn get_inverse(relation: &str) -> Result<RelationshipType, RelationshipError> {
        Ok(parse_type(relation)?.inverse())
    }

    pub fn is_symmetric(relation: &str) -> bool {
        RelationshipType::parse(relation).is_ok_and(|t| t.is_symmetric())
    }

    pub fn is_valid(relation: &str) -> bool {
        RelationshipType::is_valid(relation)
    }

    /// Rewrite every recognised edge type on `record` in PascalCase.
    pub fn normalize(record: &mut Record) {
        for edge in &mut record.header.relationships {
            if let Ok(t) = RelationshipType::parse(&edge.relation) {
                edge.relation = t.as_str().to_string();
            }
        }
    }

    /// Add one edge to `record` in memory.
    ///
    /// Rejects unknown types, malformed targets, an existing `(type, target)`
    /// pair, and an asymmetric edge whose inverse already points at the same
    /// target from this record.
    pub fn add(
        record: &mut Record,
        relation: &str,
        target_id: &str,
        label: Option<&str>,
    ) -> Result<RelationshipType, RelationshipError> {
        let relation = parse_type(relation)?;
        let target = canonical_id(target_id)?;
        Self::normalize(record);

        for edge in &record.header.relationships {
            if edge.target != target {
                continue;
            }
            let Ok(existing) = RelationshipType::parse(&edge.relation) else {
                continue;
            };
            if existing == relation {
                return Err(RelationshipError::Duplicate { relation, target });
            }
            if !relation.is_symmetric() && existing == relation.inverse() {
                return Err(RelationshipError::Contradictory {
                    relation,
                    existing,
                    target,
                });
            }
        }

        record.header.relationships.push(Relationship {
            relation: relation.as_str().to_string(),
            target,
            label: label.map(str::to_string),
        });
        Ok(relation)
    }

    /// Drop the `(relation, target)` edge.  Returns whether one was removed.
    ///
    /// Targets compare in canonical UUID form, so any casing of the id
    /// matches.
    pub fn remove(record: &mut Record, relation: &str, target_id: &str) -> Result<bool, RelationshipError> {
        let relation = parse_type(relation)?;
        let target = comparable_id(target_id);
        let before = record.header.relationships.len();
        record.header.relationships.retain(|edge| {
            comparable_id(&edge.target) != target
                || RelationshipType::parse(&edge.relation) != Ok(relation)
        });
        Ok(record.header.relationships.len() != before)
    }

    /// In-memory bidirectional link.  Existing edges count as satisfied.
    pub fn link_records(
        source: &mut Record,
        target: &mut Record,
        relation: &str,
        label: Option<&str>,
    ) -> Result<(), RelationshipError> {
        let relation = parse_type(relation)?;
        let target_id = target.header.id.clone();
        let source_id = source.header.id.clone();
        ensure_edge(source, relation, &target_id, label)?;
        ensure_edge(target, relation.inverse(), &source_id, label)?;
        Ok(())
    }

    /// Link the records at `source_path` and `target_path`.
    ///
    /// The type is checked before anything is written.  The inverse write is
    /// attempted only after the forward write succeeded.
    pub fn add_bidirectional(
        &self,
        source_path: &Path,
        target_path: &Path,
        relation: &str,
        label: Option<&str>,
    ) -> Result<BidirectionalOutcome, RelationshipError> {
        let relation = parse_type(relation)?;

        let forward = self
            .record_id(source_path)
            .and_then(|source_id| Ok((source_id, self.record_id(target_path)?)))
            .and_then(|(source_id, target_id)| {
                self.write_edge(source_path, relation, &target_id, label)?;
                Ok(source_id)
            });
        let (forward, source_id) = match forward {
            Ok(id) => (Ok(()), id),
            Err(e) => {
                warn!(source = %source_path.display(), error = %e, "forward edge not written");
                return Ok(BidirectionalOutcome {
                    forward: Err(e),
                    inverse: Err(LinkError::NotAttempted),
                });
            }
        };

        let inverse = self.write_edge(target_path, relation.inverse(), &source_id, label);
        if let Err(e) = &inverse {
            warn!(
                source = %source_path.display(),
                target = %target_path.display(),
                relation = %relation,
                error = %e,
                "inverse edge not written, link is one-sided"
            );
        }
        Ok(BidirectionalOutcome { forward, inverse })
    }

    /// Link two records by id, resolving them under `roots`.
    ///
    /// A missing target is a forward reference: the forward edge is still
    /// written and, when `bidirectional`, the inverse reports
    /// [`LinkError::TargetNotFound`].  Without `bidirectional` the inverse
    /// is [`LinkError::NotAttempted`].
    pub fn link(
        &self,
        roots: &[PathBuf],
        source_id: &str,
        target_id: &str,
        relation: &str,
        bidirectional: bool,
    ) -> Result<BidirectionalOutcome, LinkError> {
        let relation = parse_type(relation)?;
        let target_id = canonical_id(target_id)?;
        let index = self.store.id_index(roots);
        let source_path = index
            .get(&comparable_id(source_id))
            .cloned()
            .ok_or_else(|| LinkError::SourceNotFound(source_id.to_string()))?;
        let target_path = index.get(&target_id).cloned();

        if let (true, Some(target_path)) = (bidirectional, &target_path) {
            return Ok(self.add_bidirectional(&source_path, target_path, relation.as_str(), None)?);
        }

        let forward = self.write_edge(&source_path, relation, &target_id, None);
        let inverse = match (bidirectional, target_path) {
            (true, None) => {
                warn!(target = %target_id, "link target not found, inverse edge skipped");
                Err(LinkError::TargetNotFound(target_id))
            }
            _ => Err(LinkError::NotAttempted),
        };
        Ok(BidirectionalOutcome { forward, inverse })
    }

    fn record_id(&self, path: &Path) -> Result<String, LinkError> {
        let record = self.store.read(path)?;
        if record.header.uuid().is_none() {
            return Err(LinkError::MissingId(path.to_path_buf()));
        }
        Ok(record.header.id)
    }

    /// Add `relation → target_id` to the record at `path` and rewrite it.
    /// An existing identical edge is left as is.
    fn write_edge(
        &self,
        path: &Path,
        relation: RelationshipType,
        target_id: &str,
        label: Option<&str>,
    ) -> Result<(), LinkError> {
        let mut record = self.store.read(path)?;
        let before = record.header.relationships.clone();
        ensure_edge(&mut record, relation, target_id, label)?;
        if record.header.relationships == before {
            debug!(path = %path.display(), relation = %relation, "edge already present");
            return Ok(());
        }
        self.store.write(path, &record)?;
        info!(path = %path.display(), relation = %relation, target = target_id, "added relationship");
        Ok(())
    }
}

fn parse_type(relation: &str) -> Result<RelationshipType, RelationshipError> {
    RelationshipType::parse(relation).map_err(|e| RelationshipError::UnknownType(e.0))
}

fn canonical_id(raw: &str) -> Result<String, RelationshipError> {
    Uuid::try_parse(raw.trim())
        .map(|u| u.to_string())
        .map_err(|_| RelationshipError::InvalidTarget(raw.to_string()))
}

/// Canonical form of `raw` when it is a UUID, else `raw` trimmed.
fn comparable_id(raw: &str) -> String {
    canonical_id(raw).unwrap_or_else(|_| raw.trim().to_string())
}

fn ensure_edge(
    record: &mut Record,
    relation: RelationshipType,
    target_id: &str,
    label: Option<&str>,
) -> Result<(), RelationshipError> {
    match RelationshipGraph::add(record, relation.as_str(), target_id, label) {
        Ok(_) | Err(RelationshipError::Duplicate { .. }) => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mnemo_types::CognitiveType;

    const TARGET: &str = "550e8400-e29b-41d4-a716-446655440000";

    fn rec(title: &str) -> Record {
        Record::new(CognitiveType::Semantic, "decisions", title, Utc::now())
    }

    fn edges(r: &Record) -> Vec<(String, String)> {
        r.header
            .relationships
            .iter()
            .map(|e| (e.relation.clone(), e.target.clone()))
            .collect()
    }

    // ── registry helpers ─────────────────────────────────────────────────────

    #[test]
    fn inverse_helpers_accept_any_spelling() {
        assert_eq!(RelationshipGraph::get_inverse("part_of").unwrap(), RelationshipType::Contains);
        assert_eq!(RelationshipGraph::get_inverse("Contains").unwrap(), RelationshipType::PartOf);
        assert!(RelationshipGraph::is_symmetric("relates_to"));
        assert!(!RelationshipGraph::is_symmetric("uses"));
        assert!(!RelationshipGraph::is_valid("friend_of"));
        assert!(matches!(
            RelationshipGraph::get_inverse("friend_of"),
            Err(RelationshipError::UnknownType(_))
        ));
    }

    // ── add ──────────────────────────────────────────────────────────────────

    #[test]
    fn add_normalizes_type_and_target() {
        let mut r = rec("a");
        let t = RelationshipGraph::add(&mut r, "derived_from", &TARGET.to_uppercase(), Some("source")).unwrap();
        assert_eq!(t, RelationshipType::DerivedFrom);
        assert_eq!(edges(&r), vec![("DerivedFrom".to_string(), TARGET.to_string())]);
        assert_eq!(r.header.relationships[0].label.as_deref(), Some("source"));
    }

    #[test]
    fn add_rejects_unknown_type_and_bad_target() {
        let mut r = rec("a");
        assert_eq!(
            RelationshipGraph::add(&mut r, "likes", TARGET, None),
            Err(RelationshipError::UnknownType("likes".into()))
        );
        assert!(matches!(
            RelationshipGraph::add(&mut r, "uses", "nope", None),
            Err(RelationshipError::InvalidTarget(_))
        ));
        assert!(r.header.relationships.is_empty());
    }

    #[test]
    fn add_rejects_duplicates_across_spellings() {
        let mut r = rec("a");
        r.header.relationships.push(Relationship {
            relation: "uses".into(),
            target: TARGET.into(),
            label: None,
        });
        assert!(matches!(
            RelationshipGraph::add(&mut r, "Uses", TARGET, None),
            Err(RelationshipError::Duplicate { .. })
        ));
        // The existing spelling was normalised on the way.
        assert_eq!(r.header.relationships[0].relation, "Uses");
    }

    #[test]
    fn add_rejects_contradictory_inverse() {
        let mut r = rec("a");
        RelationshipGraph::add(&mut r, "Supersedes", TARGET, None).unwrap();
        assert!(matches!(
            RelationshipGraph::add(&mut r, "superseded_by", TARGET, None),
            Err(RelationshipError::Contradictory { existing: RelationshipType::Supersedes, .. })
        ));
        // Different types to the same target are fine.
        RelationshipGraph::add(&mut r, "MentionedIn", TARGET, None).unwrap();
        assert_eq!(r.header.relationships.len(), 2);
    }

    #[test]
    fn remove_drops_matching_edge_only() {
        let mut r = rec("a");
        RelationshipGraph::add(&mut r, "Uses", TARGET, None).unwrap();
        RelationshipGraph::add(&mut r, "RelatesTo", TARGET, None).unwrap();
        assert!(RelationshipGraph::remove(&mut r, "uses", TARGET).unwrap());
        assert!(!RelationshipGraph::remove(&mut r, "uses", TARGET).unwrap());
        assert_eq!(edges(&r), vec![("RelatesTo".to_string(), TARGET.to_string())]);
    }

    #[test]
    fn remove_matches_any_target_casing() {
        let mut r = rec("a");
        RelationshipGraph::add(&mut r, "Uses", TARGET, None).unwrap();
        assert!(RelationshipGraph::remove(&mut r, "Uses", &TARGET.to_uppercase()).unwrap());
        assert!(r.header.relationships.is_empty());

        // Hand-edited uppercase edges are removable with the canonical id.
        r.header.relationships.push(Relationship {
            relation: "Uses".into(),
            target: TARGET.to_uppercase(),
            label: None,
        });
        assert!(RelationshipGraph::remove(&mut r, "uses", TARGET).unwrap());
        assert!(r.header.relationships.is_empty());
    }

    // ── in-memory bidirectional ──────────────────────────────────────────────

    #[test]
    fn link_records_writes_symmetric_edge_on_both_sides() {
        let mut a = rec("a");
        let mut b = rec("b");
        RelationshipGraph::link_records(&mut a, &mut b, "conflicts_with", None).unwrap();
        assert_eq!(edges(&a), vec![("ConflictsWith".to_string(), b.header.id.clone())]);
        assert_eq!(edges(&b), vec![("ConflictsWith".to_string(), a.header.id.clone())]);
        // Idempotent.
        RelationshipGraph::link_records(&mut a, &mut b, "ConflictsWith", None).unwrap();
        assert_eq!(a.header.relationships.len(), 1);
    }

    // ── file-backed ──────────────────────────────────────────────────────────

    fn write(dir: &Path, r: &Record) -> PathBuf {
        let path = dir.join("semantic/decisions").join(r.file_name());
        RecordStore::default().write(&path, r).unwrap();
        path
    }

    #[test]
    fn supersedes_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let a = rec("Use PostgreSQL");
        let b = rec("Use MySQL");
        let pa = write(dir.path(), &a);
        let pb = write(dir.path(), &b);

        let graph = RelationshipGraph::default();
        let outcome = graph.add_bidirectional(&pa, &pb, "supersedes", None).unwrap();
        assert_eq!(outcome.flags(), (true, true));

        let store = RecordStore::default();
        assert_eq!(
            edges(&store.read(&pa).unwrap()),
            vec![("Supersedes".to_string(), b.header.id.clone())]
        );
        assert_eq!(
            edges(&store.read(&pb).unwrap()),
            vec![("SupersededBy".to_string(), a.header.id.clone())]
        );

        // Retrying converges instead of failing on duplicates.
        let again = graph.add_bidirectional(&pa, &pb, "Supersedes", None).unwrap();
        assert!(again.is_complete());
        assert_eq!(store.read(&pb).unwrap().header.relationships.len(), 1);
    }

    #[test]
    fn unknown_type_fails_before_any_write() {
        let dir = tempfile::tempdir().unwrap();
        let a = rec("a");
        let b = rec("b");
        let pa = write(dir.path(), &a);
        let pb = write(dir.path(), &b);
        let err = RelationshipGraph::default()
            .add_bidirectional(&pa, &pb, "befriends", None)
            .unwrap_err();
        assert_eq!(err, RelationshipError::UnknownType("befriends".into()));
        assert!(RecordStore::default().read(&pa).unwrap().header.relationships.is_empty());
    }

    #[test]
    fn forward_failure_skips_inverse() {
        let dir = tempfile::tempdir().unwrap();
        let b = rec("b");
        let pb = write(dir.path(), &b);
        let missing = dir.path().join("missing.memory.md");
        let outcome = RelationshipGraph::default()
            .add_bidirectional(&missing, &pb, "uses", None)
            .unwrap();
        assert_eq!(outcome.flags(), (false, false));
        assert!(matches!(outcome.inverse, Err(LinkError::NotAttempted)));
        assert!(RecordStore::default().read(&pb).unwrap().header.relationships.is_empty());
    }

    #[test]
    fn link_by_id_with_missing_target_is_one_sided() {
        let dir = tempfile::tempdir().unwrap();
        let a = rec("a");
        let pa = write(dir.path(), &a);
        let roots = vec![dir.path().to_path_buf()];
        let graph = RelationshipGraph::default();

        let outcome = graph.link(&roots, &a.header.id, TARGET, "uses", true).unwrap();
        assert!(outcome.is_partial());
        assert!(matches!(outcome.inverse, Err(LinkError::TargetNotFound(_))));
        assert_eq!(
            edges(&RecordStore::default().read(&pa).unwrap()),
            vec![("Uses".to_string(), TARGET.to_string())]
        );
    }

    #[test]
    fn link_by_id_resolves_both_records() {
        let dir = tempfile::tempdir().unwrap();
        let a = rec("a");
        let b = rec("b");
        write(dir.path(), &a);
        let pb = write(dir.path(), &b);
        let roots = vec![dir.path().to_path_buf()];
        let graph = RelationshipGraph::default();

        let outcome = graph.link(&roots, &a.header.id, &b.header.id, "part_of", true).unwrap();
        assert!(outcome.is_complete());
        assert_eq!(
            edges(&RecordStore::default().read(&pb).unwrap()),
            vec![("Contains".to_string(), a.header.id.clone())]
        );

        let one_way = graph.link(&roots, &b.header.id, &a.header.id, "mentions", false).unwrap();
        assert_eq!(one_way.flags(), (true, false));
        assert!(matches!(
            graph.link(&roots, TARGET, &a.header.id, "uses", false),
            Err(LinkError::SourceNotFound(_))
        ));
    }
}

//! Store-wide consistency audit.
//!
//! Checks that only make sense across records: duplicate ids, edges whose
//! target cannot be found, edges whose target lacks the inverse edge, and
//! `[[uuid]]` body links that point nowhere.  Per-record schema findings
//! are folded in when a [`SchemaValidator`] is supplied.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use mnemo_schema::{SchemaValidator, body_links};
use mnemo_types::{Finding, Record, RelationshipType, is_lowercase_uuid};
use tracing::info;

/// Findings grouped by record path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditReport {
    pub records: usize,
    pub findings: BTreeMap<PathBuf, Vec<Finding>>,
}

impl AuditReport {
    fn push(&mut self, path: &Path, finding: Finding) {
        self.findings
            .entry(path.to_path_buf())
            .or_default()
            .push(finding);
    }

    pub fn error_count(&self) -> usize {
        self.iter().filter(|(_, f)| f.is_error()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.iter().filter(|(_, f)| !f.is_error()).count()
    }

    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn findings_for(&self, path: &Path) -> &[Finding] {
        self.findings.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every finding with its path, in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&Path, &Finding)> {
        self.findings
            .iter()
            .flat_map(|(p, fs)| fs.iter().map(move |f| (p.as_path(), f)))
    }
}

/// Audit `records` as one store.
pub fn audit(records: &[(PathBuf, Record)], validator: Option<&SchemaValidator>) -> AuditReport {
    let mut report = AuditReport {
        records: records.len(),
        ..AuditReport::default()
    };

    let mut by_id: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, (_, r)) in records.iter().enumerate() {
        if !r.header.id.is_empty() {
            by_id.entry(r.header.id.as_str()).or_default().push(i);
        }
    }

    for (path, record) in records {
        let h = &record.header;

        if let Some(v) = validator {
            for f in v.validate(record) {
                report.push(path, f);
            }
        }

        if by_id.get(h.id.as_str()).is_some_and(|ix| ix.len() > 1) {
            report.push(path, Finding::error("id", format!("id {} is used by more than one record", h.id)));
        }

        for (i, edge) in h.relationships.iter().enumerate() {
            let Ok(relation) = RelationshipType::parse(&edge.relation) else {
                continue;
            };
            if !is_lowercase_uuid(&edge.target) {
                continue;
            }
            let Some(targets) = by_id.get(edge.target.as_str()) else {
                report.push(
                    path,
                    Finding::warning(
                        format!("relationships[{i}].target"),
                        format!("target {} not found", edge.target),
                    ),
                );
                continue;
            };
            let inverse = relation.inverse();
            let reciprocated = targets.iter().any(|&t| {
                records[t].1.header.relationships.iter().any(|back| {
                    back.target == h.id && RelationshipType::parse(&back.relation) == Ok(inverse)
                })
            });
            if !reciprocated {
                report.push(
                    path,
                    Finding::warning(
                        format!("relationships[{i}]"),
                        format!("{} has no {} edge back to this record", edge.target, inverse),
                    ),
                );
            }
        }

        for link in body_links(&record.body) {
            if is_lowercase_uuid(link) && !by_id.contains_key(link) {
                report.push(path, Finding::warning("body", format!("link [[{link}]] not found")));
            }
        }
    }

    info!(
        records = report.records,
        errors = report.error_count(),
        warnings = report.warning_count(),
        "audit complete"
    );
    report
}

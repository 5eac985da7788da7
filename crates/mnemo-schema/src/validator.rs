//! [`SchemaValidator`] – record header rule engine.
//!
//! Every registered [`Rule`] runs against the record, in order, and appends
//! its [`Finding`]s.  Nothing short-circuits: one pass reports every problem
//! in a record, and the caller decides whether any
//! [`Severity::Error`][mnemo_types::Severity::Error] finding blocks a write.
//!
//! Seven built-in rules run in this order:
//!
//! 1. [`RequiredFields`] – `id`, `kind`, `namespace`, `created`, `title`.
//! 2. [`Formats`] – lowercase UUID id, ISO-8601 timestamps and durations.
//! 3. [`Enumerations`] – closed vocabularies.
//! 4. [`NumericRanges`] – confidence, relevance and strength in `[0, 1]`.
//! 5. [`CrossField`] – `kind` vs namespace prefix, `valid_from ≤ recorded_at`.
//! 6. [`Structural`] – code refs, relationship types, tags, body links.
//! 7. [`OntologyOverlay`] – entity-type and namespace checks against an
//!    injected [`OntologyRegistry`].
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use mnemo_schema::SchemaValidator;
//! use mnemo_types::{CognitiveType, Record};
//!
//! let validator = SchemaValidator::new();
//! let mut record = Record::new(CognitiveType::Semantic, "decisions", "Use PostgreSQL", Utc::now());
//! assert!(validator.validate(&record).is_empty());
//!
//! record.header.id.clear();
//! record.header.kind = "bogus".into();
//! let findings = validator.validate(&record);
//! assert!(findings.iter().filter(|f| f.is_error()).count() >= 2);
//! ```

use std::sync::Arc;

use mnemo_types::{
    CitationType, CodeRefType, CognitiveType, DecayModel, Finding, IsoDuration, Record,
    RelationshipType, SourceType, is_lowercase_uuid, is_valid_tag, parse_timestamp,
};

use crate::links::body_links;
use crate::ontology::OntologyRegistry;

// ─────────────────────────────────────────────────────────────────────────────
// Rule trait
// ─────────────────────────────────────────────────────────────────────────────

/// Shared inputs available to every rule.
#[derive(Clone, Copy, Default)]
pub struct RuleContext<'a> {
    pub ontology: Option<&'a OntologyRegistry>,
}

/// One independent group of checks.
///
/// Implement this trait to add project-specific checks and register them
/// with [`SchemaValidator::add_rule`].
pub trait Rule: Send + Sync {
    /// Human-readable name, used in logs.
    fn name(&self) -> &str;

    /// Append every violation found in `record` to `findings`.
    fn check(&self, record: &Record, ctx: &RuleContext<'_>, findings: &mut Vec<Finding>);
}

// ─────────────────────────────────────────────────────────────────────────────
// SchemaValidator
// ─────────────────────────────────────────────────────────────────────────────

pub struct SchemaValidator {
    rules: Vec<Box<dyn Rule>>,
    ontology: Option<Arc<OntologyRegistry>>,
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaValidator {
    /// Validator with the seven built-in rules and no ontology.
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(RequiredFields),
                Box::new(Formats),
                Box::new(Enumerations),
                Box::new(NumericRanges),
                Box::new(CrossField),
                Box::new(Structural),
                Box::new(OntologyOverlay),
            ],
            ontology: None,
        }
    }

    /// Validator with no rules at all.
    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            ontology: None,
        }
    }

    pub fn with_ontology(mut self, ontology: Arc<OntologyRegistry>) -> Self {
        self.ontology = Some(ontology);
        self
    }

    /// Register an additional rule.  Rules run in insertion order.
    pub fn add_rule(&mut self, rule: Box<dyn Rule>) {
        self.rules.push(rule);
    }

    pub fn ontology(&self) -> Option<&OntologyRegistry> {
        self.ontology.as_deref()
    }

    /// Run every rule and return all findings.  Safe to call repeatedly.
    pub fn validate(&self, record: &Record) -> Vec<Finding> {
        let ctx = RuleContext {
            ontology: self.ontology.as_deref(),
        };
        let mut findings = Vec::new();
        for rule in &self.rules {
            let before = findings.len();
            rule.check(record, &ctx, &mut findings);
            if findings.len() > before {
                tracing::debug!(rule = rule.name(), id = %record.header.id, added = findings.len() - before, "rule reported findings");
            }
        }
        findings
    }
}

/// `true` when any finding has error severity.
pub fn has_errors(findings: &[Finding]) -> bool {
    findings.iter().any(Finding::is_error)
}

fn check_timestamp(field: &str, raw: &str, findings: &mut Vec<Finding>) {
    if !raw.is_empty() && parse_timestamp(raw).is_none() {
        findings.push(Finding::error(
            field,
            format!("{raw:?} is not a valid ISO-8601 timestamp"),
        ));
    }
}

fn check_unit_range(field: &str, value: f64, findings: &mut Vec<Finding>) {
    if !(0.0..=1.0).contains(&value) {
        findings.push(Finding::error(field, format!("{value} is outside [0, 1]")));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// 1. Required fields
// ─────────────────────────────────────────────────────────────────────────────

pub struct RequiredFields;

impl Rule for RequiredFields {
    fn name(&self) -> &str {
        "required-fields"
    }

    fn check(&self, record: &Record, _ctx: &RuleContext<'_>, findings: &mut Vec<Finding>) {
        let h = &record.header;
        let required = [
            ("id", &h.id),
            ("kind", &h.kind),
            ("namespace", &h.namespace),
            ("created", &h.created),
            ("title", &h.title),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                findings.push(Finding::error(field, "required field is missing"));
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// 2. Formats
// ─────────────────────────────────────────────────────────────────────────────

pub struct Formats;

impl Rule for Formats {
    fn name(&self) -> &str {
        "formats"
    }

    fn check(&self, record: &Record, _ctx: &RuleContext<'_>, findings: &mut Vec<Finding>) {
        let h = &record.header;
        if !h.id.is_empty() && !is_lowercase_uuid(&h.id) {
            findings.push(Finding::error(
                "id",
                format!("{:?} is not a lowercase hyphenated UUID", h.id),
            ));
        }
        check_timestamp("created", &h.created, findings);
        check_timestamp("modified", &h.modified, findings);

        let Some(temporal) = &h.temporal else {
            return;
        };
        check_timestamp("temporal.valid_from", &temporal.valid_from, findings);
        check_timestamp("temporal.recorded_at", &temporal.recorded_at, findings);
        if let Some(decay) = &temporal.decay {
            if let Some(half_life) = &decay.half_life
                && let Err(e) = IsoDuration::parse(half_life)
            {
                findings.push(Finding::error(
                    "temporal.decay.half_life",
                    format!("{half_life:?} is not a valid ISO-8601 duration: {e}"),
                ));
            }
            if let Some(ts) = &decay.last_accessed {
                check_timestamp("temporal.decay.last_accessed", ts, findings);
            }
            if let Some(ts) = &decay.decayed_at {
                check_timestamp("temporal.decay.decayed_at", ts, findings);
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// 3. Enumerations
// ─────────────────────────────────────────────────────────────────────────────

pub struct Enumerations;

impl Rule for Enumerations {
    fn name(&self) -> &str {
        "enumerations"
    }

    fn check(&self, record: &Record, _ctx: &RuleContext<'_>, findings: &mut Vec<Finding>) {
        let h = &record.header;
        if !h.kind.is_empty() && CognitiveType::parse(&h.kind).is_none() {
            findings.push(Finding::error(
                "kind",
                format!("{:?} is not one of semantic, episodic, procedural", h.kind),
            ));
        }
        if let Some(p) = &h.provenance
            && SourceType::parse(&p.source_type).is_none()
        {
            findings.push(Finding::error(
                "provenance.source_type",
                format!(
                    "{:?} is not one of conversation, user_explicit, inferred, manual",
                    p.source_type
                ),
            ));
        }
        for (i, c) in h.citations.iter().enumerate() {
            if CitationType::parse(&c.citation_type).is_none() {
                findings.push(Finding::error(
                    format!("citations[{i}].type"),
                    format!("{:?} is not a known citation type", c.citation_type),
                ));
            }
        }
        if let Some(decay) = h.decay()
            && DecayModel::parse(&decay.model).is_none()
        {
            findings.push(Finding::error(
                "temporal.decay.model",
                format!("{:?} is not one of exponential, linear, step, none", decay.model),
            ));
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// 4. Numeric ranges
// ─────────────────────────────────────────────────────────────────────────────

pub struct NumericRanges;

impl Rule for NumericRanges {
    fn name(&self) -> &str {
        "numeric-ranges"
    }

    fn check(&self, record: &Record, _ctx: &RuleContext<'_>, findings: &mut Vec<Finding>) {
        let h = &record.header;
        if let Some(p) = &h.provenance {
            check_unit_range("provenance.confidence", p.confidence, findings);
        }
        for (i, c) in h.citations.iter().enumerate() {
            if let Some(relevance) = c.relevance {
                check_unit_range(&format!("citations[{i}].relevance"), relevance, findings);
            }
        }
        if let Some(decay) = h.decay() {
            check_unit_range("temporal.decay.strength", decay.strength, findings);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// 5. Cross-field consistency
// ─────────────────────────────────────────────────────────────────────────────

pub struct CrossField;

impl Rule for CrossField {
    fn name(&self) -> &str {
        "cross-field"
    }

    fn check(&self, record: &Record, _ctx: &RuleContext<'_>, findings: &mut Vec<Finding>) {
        let h = &record.header;
        if !h.kind.is_empty() && !h.namespace.is_empty() && h.namespace_kind() != h.kind {
            findings.push(Finding::error(
                "namespace",
                format!(
                    "namespace {:?} does not start with kind {:?}",
                    h.namespace, h.kind
                ),
            ));
        }
        if let Some(t) = &h.temporal
            && let (Some(from), Some(recorded)) =
                (parse_timestamp(&t.valid_from), parse_timestamp(&t.recorded_at))
            && from > recorded
        {
            findings.push(Finding::error(
                "temporal.valid_from",
                "valid_from is later than recorded_at",
            ));
        }
        if let (Some(created), Some(modified)) = (h.created_at(), h.modified_at())
            && modified < created
        {
            findings.push(Finding::warning("modified", "modified is earlier than created"));
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// 6. Structural
// ─────────────────────────────────────────────────────────────────────────────

pub struct Structural;

impl Rule for Structural {
    fn name(&self) -> &str {
        "structural"
    }

    fn check(&self, record: &Record, ctx: &RuleContext<'_>, findings: &mut Vec<Finding>) {
        let h = &record.header;

        for (i, r) in h.code_refs.iter().enumerate() {
            if r.line <= 0 {
                findings.push(Finding::error(
                    format!("code_refs[{i}].line"),
                    format!("line {} is not a positive integer", r.line),
                ));
            }
            if CodeRefType::parse(&r.ref_type).is_none() {
                findings.push(Finding::error(
                    format!("code_refs[{i}].type"),
                    format!("{:?} is not a known code reference type", r.ref_type),
                ));
            }
            if r.file.trim().is_empty() {
                findings.push(Finding::warning(format!("code_refs[{i}].file"), "file is empty"));
            }
        }

        for (i, rel) in h.relationships.iter().enumerate() {
            let field = format!("relationships[{i}]");
            match RelationshipType::parse(&rel.relation) {
                Ok(t) if t.as_str() != rel.relation => findings.push(Finding::warning(
                    format!("{field}.type"),
                    format!("{:?} should be written as {:?}", rel.relation, t.as_str()),
                )),
                Ok(_) => {}
                Err(_) if ctx.ontology.and_then(|o| o.relationship(&rel.relation)).is_some() => {}
                Err(e) => findings.push(Finding::error(format!("{field}.type"), e.to_string())),
            }
            if !is_lowercase_uuid(&rel.target) {
                findings.push(Finding::error(
                    format!("{field}.target"),
                    format!("{:?} is not a lowercase hyphenated UUID", rel.target),
                ));
            }
        }

        for (i, tag) in h.tags.iter().enumerate() {
            if !is_valid_tag(tag) {
                findings.push(Finding::warning(
                    format!("tags[{i}]"),
                    format!("{tag:?} is not a lowercase hyphenated token"),
                ));
            }
            if h.tags[..i].contains(tag) {
                findings.push(Finding::warning(format!("tags[{i}]"), format!("duplicate tag {tag:?}")));
            }
        }

        for link in body_links(&record.body) {
            if !is_lowercase_uuid(link) {
                findings.push(Finding::warning(
                    "body",
                    format!("link [[{link}]] is not a valid UUID reference"),
                ));
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// 7. Ontology overlay
// ─────────────────────────────────────────────────────────────────────────────

pub struct OntologyOverlay;

impl Rule for OntologyOverlay {
    fn name(&self) -> &str {
        "ontology-overlay"
    }

    fn check(&self, record: &Record, ctx: &RuleContext<'_>, findings: &mut Vec<Finding>) {
        let Some(ontology) = ctx.ontology else {
            return;
        };
        let h = &record.header;

        if !h.sub_namespace().is_empty() && ontology.has_namespaces() {
            match ontology.namespace(&h.namespace) {
                None => findings.push(Finding::warning(
                    "namespace",
                    format!("namespace {:?} is not defined by any ontology", h.namespace),
                )),
                Some(def) => {
                    if let Some(hint) = &def.cognitive_type
                        && !h.kind.is_empty()
                        && *hint != h.kind
                    {
                        findings.push(Finding::warning(
                            "namespace",
                            format!("ontology expects {hint} records in {:?}", h.namespace),
                        ));
                    }
                }
            }
        }

        let Some(entity) = &h.entity else {
            return;
        };
        let Some(schema) = ontology.entity_schema(&entity.entity_type) else {
            findings.push(Finding::warning(
                "entity.type",
                format!("entity type {:?} is not defined by any ontology", entity.entity_type),
            ));
            return;
        };
        if !schema.base.is_empty() && !h.kind.is_empty() && schema.base != h.kind {
            findings.push(Finding::warning(
                "entity.type",
                format!(
                    "entity type {:?} is based on {}, record kind is {}",
                    entity.entity_type, schema.base, h.kind
                ),
            ));
        }
        let present = |name: &str| {
            entity
                .fields
                .get(name)
                .is_some_and(|v| !v.trim().is_empty())
        };
        for field in &schema.required {
            if !present(field) {
                findings.push(Finding::error(
                    format!("entity.fields.{field}"),
                    format!("required by entity type {:?}", entity.entity_type),
                ));
            }
        }
        for field in &schema.trait_fields {
            if !present(field) && !schema.required.contains(field) {
                findings.push(Finding::warning(
                    format!("entity.fields.{field}"),
                    format!("expected by a trait of entity type {:?}", entity.entity_type),
                ));
            }
        }
        for (i, rel) in h.relationships.iter().enumerate() {
            if let Some(def) = ontology.relationship(&rel.relation)
                && !def.from.is_empty()
                && !def.from.contains(&entity.entity_type)
            {
                findings.push(Finding::warning(
                    format!("relationships[{i}].type"),
                    format!(
                        "{:?} edges may not leave entity type {:?}",
                        rel.relation, entity.entity_type
                    ),
                ));
            }
        }
    }
}

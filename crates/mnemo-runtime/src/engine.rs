//! [`MemoryEngine`] – one context, one ontology, every engine component.
//!
//! This is the surface external command layers (capture, search, recall,
//! gc, validate) build on.  The engine owns no global state: the ontology
//! is injected, and the context is fixed at construction.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chrono::Utc;
//! use mnemo_paths::{PathContext, Scope};
//! use mnemo_runtime::{Config, MemoryEngine};
//! use mnemo_schema::OntologyRegistry;
//! use mnemo_types::{CognitiveType, Record};
//!
//! let ctx = PathContext::builder("/home/dev/.mnemo")
//!     .organization("acme")
//!     .project("billing")
//!     .build()
//!     .unwrap();
//! let ontology = Arc::new(OntologyRegistry::bundled().unwrap());
//! let engine = MemoryEngine::new(&Config::default(), ctx, ontology).unwrap();
//!
//! let record = Record::new(CognitiveType::Semantic, "decisions", "Use PostgreSQL", Utc::now());
//! let path = engine.write_record(&record, Scope::Project).unwrap();
//! println!("wrote {}", path.display());
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use mnemo_memory::{
    AuditReport, BidirectionalOutcome, DecayEngine, HalfLifePolicy, LinkError, RecordCodec,
    RecordStore, RelationshipGraph, RelevanceScorer, ScoringReference, StoreError,
    candidate_paths_from_output,
};
use mnemo_paths::{
    IncludeScopes, MigrationPlan, PathContext, PathInputError, PathResolver, Scope, plan_migration,
};
use mnemo_schema::{OntologyError, OntologyRegistry, SchemaValidator, has_errors};
use mnemo_types::{DurationParseError, Finding, Record};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Path(#[from] PathInputError),
    #[error(transparent)]
    Ontology(#[from] OntologyError),
    #[error("invalid half-life in config: {0}")]
    HalfLife(#[from] DurationParseError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error("record rejected with {errors} error finding(s)")]
    Rejected { errors: usize, findings: Vec<Finding> },
}

pub struct MemoryEngine {
    resolver: PathResolver,
    store: RecordStore,
    validator: SchemaValidator,
    scorer: RelevanceScorer,
    decay: DecayEngine,
    graph: RelationshipGraph,
}

impl MemoryEngine {
    /// Wire every component from `config` around `ctx` and `ontology`.
    pub fn new(
        config: &Config,
        ctx: PathContext,
        ontology: Arc<OntologyRegistry>,
    ) -> Result<Self, EngineError> {
        let store = RecordStore::new(RecordCodec::new(config.codec));
        let policy = HalfLifePolicy::from_table(&config.decay.default_half_life, &config.decay.half_lives)?;
        debug!(
            organization = ctx.organization(),
            project = ctx.project(),
            scheme = ?ctx.scheme(),
            codec = config.codec.as_str(),
            "memory engine ready"
        );
        Ok(Self {
            resolver: PathResolver::new(ctx),
            store,
            validator: SchemaValidator::new().with_ontology(ontology),
            scorer: RelevanceScorer::new(config.scorer.min_threshold, config.scorer.max_results),
            decay: DecayEngine::new(policy),
            graph: RelationshipGraph::new(store),
        })
    }

    /// Detect the context from `cwd` and load the configured ontology
    /// layers.
    pub fn from_config(config: &Config, cwd: &Path) -> Result<Self, EngineError> {
        let ctx = config.path_context(cwd)?;
        let ontology = OntologyRegistry::load(&config.ontology_sources())?;
        Self::new(config, ctx, Arc::new(ontology))
    }

    pub fn context(&self) -> &PathContext {
        self.resolver.context()
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn validator(&self) -> &SchemaValidator {
        &self.validator
    }

    // ── paths ──

    /// Directory new records of `namespace` go to in `scope`.
    pub fn resolve_write_location(&self, namespace: &str, scope: Scope) -> Result<PathBuf, PathInputError> {
        self.resolver.get_record_dir(namespace, scope)
    }

    /// Existing search directories, project first.
    pub fn resolve_search_roots(&self, namespace: Option<&str>) -> Result<Vec<PathBuf>, PathInputError> {
        self.resolver.get_search_paths(namespace, IncludeScopes::default())
    }

    // ── records ──

    pub fn validate(&self, record: &Record) -> Vec<Finding> {
        self.validator.validate(record)
    }

    /// Validate `record` and write it to `{write location}/{id}.memory.md`.
    ///
    /// Any error-severity finding rejects the write; warnings do not.
    pub fn write_record(&self, record: &Record, scope: Scope) -> Result<PathBuf, EngineError> {
        let findings = self.validate(record);
        if has_errors(&findings) {
            let errors = findings.iter().filter(|f| f.is_error()).count();
            warn!(id = %record.header.id, errors, "record rejected");
            return Err(EngineError::Rejected { errors, findings });
        }
        let path = self
            .resolver
            .get_record_path(&record.header.namespace, &record.file_name(), scope)?;
        self.store.write(&path, record)?;
        info!(id = %record.header.id, path = %path.display(), "record written");
        Ok(path)
    }

    // ── ranking ──

    pub fn rank(&self, reference: &ScoringReference, candidate_paths: &[PathBuf]) -> Vec<(PathBuf, i64)> {
        self.scorer.rank_paths(&self.store, reference, candidate_paths)
    }

    /// [`rank`][Self::rank] the record files named in the output of an
    /// external search tool.
    pub fn rank_search_output(&self, reference: &ScoringReference, output: &str) -> Vec<(PathBuf, i64)> {
        self.rank(reference, &candidate_paths_from_output(output))
    }

    // ── decay ──

    pub fn recompute_strength(&self, record: &mut Record, now: DateTime<Utc>) -> f64 {
        self.decay.recompute(record, now)
    }

    /// Register a recall of the record at `path` and persist it.
    pub fn record_access(&self, path: &Path, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut record = self.store.read(path)?;
        self.decay.touch(&mut record, now);
        self.store.write(path, &record)
    }

    /// Recompute every record under the search roots, one atomic write per
    /// changed file.
    pub fn run_decay(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<(PathBuf, Result<f64, StoreError>)>, EngineError> {
        let paths = self.store.list(&self.resolve_search_roots(None)?);
        Ok(self.decay.recompute_all(&self.store, &paths, now))
    }

    // ── relationships ──

    /// Link two records by id, searching every relationship target root.
    pub fn link(
        &self,
        source_id: &str,
        target_id: &str,
        relation: &str,
        bidirectional: bool,
    ) -> Result<BidirectionalOutcome, LinkError> {
        self.graph.link(
            &self.resolver.get_relationship_target_roots(),
            source_id,
            target_id,
            relation,
            bidirectional,
        )
    }

    // ── maintenance ──

    /// Validate and cross-check every record `link` can reach, so an edge
    /// the engine refuses to write is also one the audit reports.
    pub fn audit(&self) -> Result<AuditReport, EngineError> {
        let records = self
            .store
            .load_all(&self.resolver.get_relationship_target_roots());
        Ok(mnemo_memory::audit(&records, Some(&self.validator)))
    }

    /// Dry-run LEGACY → V2 moves for this context.
    pub fn plan_migration(&self) -> MigrationPlan {
        plan_migration(self.context())
    }

    pub fn record_json_schema(&self) -> serde_json::Value {
        mnemo_schema::record_json_schema()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use mnemo_paths::Scheme;
    use mnemo_types::CognitiveType;
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn engine(home: &Path) -> MemoryEngine {
        let ctx = PathContext::builder(home)
            .organization("acme")
            .project("billing")
            .scheme(Scheme::V2)
            .build()
            .unwrap();
        let ontology = Arc::new(OntologyRegistry::bundled().unwrap());
        MemoryEngine::new(&Config::default(), ctx, ontology).unwrap()
    }

    fn decision(title: &str) -> Record {
        Record::new(CognitiveType::Semantic, "decisions", title, now()).with_tags(["database"])
    }

    fn setup() -> (TempDir, MemoryEngine) {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        (dir, engine)
    }

    // ── construction ──

    #[test]
    fn bad_half_life_in_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.decay.half_lives.insert("episodic".into(), "thirty days".into());
        let ctx = PathContext::builder(dir.path()).build().unwrap();
        let result = MemoryEngine::new(&cfg, ctx, Arc::new(OntologyRegistry::empty()));
        assert!(matches!(result, Err(EngineError::HalfLife(_))));
    }

    #[test]
    fn from_config_detects_context() {
        let home = tempfile::tempdir().unwrap();
        let cwd = tempfile::tempdir().unwrap();
        let cfg = Config {
            home_root: Some(home.path().to_path_buf()),
            organization: Some("acme".into()),
            project: Some("billing".into()),
            ..Config::default()
        };
        let engine = MemoryEngine::from_config(&cfg, cwd.path()).unwrap();
        assert_eq!(engine.context().organization(), "acme");
        assert_eq!(
            engine
                .resolve_write_location("semantic/decisions", Scope::Project)
                .unwrap(),
            home.path().join("acme/billing/semantic/decisions")
        );
    }

    // ── writing ──

    #[test]
    fn write_record_lands_in_project_scope() {
        let (dir, engine) = setup();
        let record = decision("Use PostgreSQL");
        let path = engine.write_record(&record, Scope::Project).unwrap();
        assert_eq!(
            path,
            dir.path()
                .join("acme/billing/semantic/decisions")
                .join(record.file_name())
        );
        assert_eq!(engine.store().read(&path).unwrap(), record);
    }

    #[test]
    fn write_record_rejects_errors_and_writes_nothing() {
        let (dir, engine) = setup();
        let mut record = decision("Broken");
        record.header.kind = "bogus".into();
        match engine.write_record(&record, Scope::Project) {
            Err(EngineError::Rejected { errors, findings }) => {
                assert!(errors >= 1);
                assert!(findings.iter().any(|f| f.field == "kind"));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert!(!dir.path().join("acme").exists());
    }

    #[test]
    fn write_record_rejects_unsafe_namespace() {
        let (_dir, engine) = setup();
        let mut record = decision("Escape");
        record.header.namespace = "semantic/../../etc".into();
        assert!(engine.write_record(&record, Scope::Organization).is_err());
    }

    // ── search ──

    #[test]
    fn ranks_search_tool_output() {
        let (_dir, engine) = setup();
        let hit = engine
            .write_record(&decision("Use PostgreSQL for billing"), Scope::Project)
            .unwrap();
        let runbook = Record::new(CognitiveType::Procedural, "runbooks", "Restart workers", now());
        let miss = engine.write_record(&runbook, Scope::Project).unwrap();

        let output = format!("{}:4:postgres\n{}:9:postgres\n", hit.display(), miss.display());
        let reference = ScoringReference::new("semantic", "decisions").with_tags(["database"]);
        let ranked = engine.rank_search_output(&reference, &output);
        assert_eq!(ranked, vec![(hit, 70)]);
    }

    #[test]
    fn search_roots_put_project_first() {
        let (dir, engine) = setup();
        engine
            .write_record(&decision("project"), Scope::Project)
            .unwrap();
        engine
            .write_record(&decision("org"), Scope::Organization)
            .unwrap();
        let roots = engine.resolve_search_roots(Some("semantic/decisions")).unwrap();
        assert_eq!(
            roots,
            vec![
                dir.path().join("acme/billing/semantic/decisions"),
                dir.path().join("acme/semantic/decisions"),
            ]
        );
    }

    // ── decay ──

    #[test]
    fn run_decay_rewrites_strength() {
        let (_dir, engine) = setup();
        let path = engine
            .write_record(&decision("Use PostgreSQL"), Scope::Project)
            .unwrap();

        let later = now() + Duration::days(180);
        let results = engine.run_decay(later).unwrap();
        assert_eq!(results.len(), 1);
        let strength = *results[0].1.as_ref().unwrap();
        assert!((strength - 0.5).abs() < 1e-9, "{strength}");

        let stored = engine.store().read(&path).unwrap();
        assert!((stored.header.decay().unwrap().strength - 0.5).abs() < 1e-9);

        // Same instant again: nothing further decays.
        let again = engine.run_decay(later).unwrap();
        assert!((*again[0].1.as_ref().unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn record_access_restores_strength() {
        let (_dir, engine) = setup();
        let path = engine
            .write_record(&decision("Use PostgreSQL"), Scope::Project)
            .unwrap();
        engine.run_decay(now() + Duration::days(90)).unwrap();
        engine
            .record_access(&path, now() + Duration::days(91))
            .unwrap();
        let decay = engine.store().read(&path).unwrap().header.decay().cloned().unwrap();
        assert_eq!(decay.strength, 1.0);
        assert!(decay.decayed_at.is_none());
    }

    #[test]
    fn recompute_strength_is_in_memory() {
        let (_dir, engine) = setup();
        let mut record = Record::new(CognitiveType::Episodic, "sessions", "Pairing", now());
        let s = engine.recompute_strength(&mut record, now() + Duration::days(7));
        assert!((s - 0.5).abs() < 1e-9);
    }

    // ── relationships & audit ──

    #[test]
    fn link_writes_both_sides() {
        let (_dir, engine) = setup();
        let a = decision("Use PostgreSQL 16");
        let b = decision("Use PostgreSQL 12");
        engine.write_record(&a, Scope::Project).unwrap();
        let b_path = engine.write_record(&b, Scope::Organization).unwrap();

        let outcome = engine
            .link(&a.header.id, &b.header.id, "supersedes", true)
            .unwrap();
        assert_eq!(outcome.flags(), (true, true));

        let b_after = engine.store().read(&b_path).unwrap();
        assert_eq!(b_after.header.relationships[0].relation, "SupersededBy");
        assert_eq!(b_after.header.relationships[0].target, a.header.id);

        assert!(engine.audit().unwrap().is_clean());
    }

    #[test]
    fn sibling_projects_stay_out_of_reach() {
        let home = tempfile::tempdir().unwrap();
        let billing = engine(home.path());
        let payroll_ctx = PathContext::builder(home.path())
            .organization("acme")
            .project("payroll")
            .scheme(Scheme::V2)
            .build()
            .unwrap();
        let payroll = MemoryEngine::new(
            &Config::default(),
            payroll_ctx,
            Arc::new(OntologyRegistry::bundled().unwrap()),
        )
        .unwrap();

        let a = decision("Use PostgreSQL 16");
        let b = decision("Use PostgreSQL 12");
        let a_path = billing.write_record(&a, Scope::Project).unwrap();
        let b_path = payroll.write_record(&b, Scope::Project).unwrap();
        let b_before = std::fs::read_to_string(&b_path).unwrap();

        let outcome = billing
            .link(&a.header.id, &b.header.id, "supersedes", true)
            .unwrap();
        assert_eq!(outcome.flags(), (true, false));
        assert!(matches!(outcome.inverse, Err(LinkError::TargetNotFound(_))));
        assert_eq!(std::fs::read_to_string(&b_path).unwrap(), b_before);

        let report = billing.audit().unwrap();
        assert_eq!(report.records, 1);
        assert_eq!(report.error_count(), 0);
        let findings = report.findings_for(&a_path);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("not found"));
    }

    #[test]
    fn audit_flags_one_sided_edge() {
        let (_dir, engine) = setup();
        let mut a = decision("A");
        let b = decision("B");
        RelationshipGraph::add(&mut a, "Uses", &b.header.id, None).unwrap();
        let a_path = engine.write_record(&a, Scope::Project).unwrap();
        engine.write_record(&b, Scope::Project).unwrap();

        let report = engine.audit().unwrap();
        assert_eq!(report.records, 2);
        assert_eq!(report.error_count(), 0);
        assert_eq!(report.findings_for(&a_path).len(), 1);
    }

    // ── migration & schema ──

    #[test]
    fn plan_migration_moves_legacy_project_records() {
        let home = tempfile::tempdir().unwrap();
        let repo = tempfile::tempdir().unwrap();
        let ctx = PathContext::builder(home.path())
            .organization("acme")
            .project("billing")
            .project_root(repo.path().join(".mnemo"))
            .build()
            .unwrap();
        let engine = MemoryEngine::new(&Config::default(), ctx, Arc::new(OntologyRegistry::empty())).unwrap();

        let legacy = repo.path().join(".mnemo/semantic/decisions/x.memory.md");
        std::fs::create_dir_all(legacy.parent().unwrap()).unwrap();
        std::fs::write(&legacy, "+++\n+++\n").unwrap();

        let plan = engine.plan_migration();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.steps[0].from, legacy);
        assert_eq!(
            plan.steps[0].to,
            home.path().join("acme/billing/semantic/decisions/x.memory.md")
        );
    }

    #[test]
    fn exposes_header_json_schema() {
        let (_dir, engine) = setup();
        let schema = engine.record_json_schema();
        assert!(schema["properties"]["namespace"].is_object());
    }
}

//! Time-based strength decay.
//!
//! Each record may carry a `[temporal.decay]` block with a model, a
//! half-life and a strength in `[0, 1]`.  [`DecayEngine::recompute`] decays
//! the strength by the time elapsed since the last recompute (or the last
//! access, or the record's creation) and stamps `decayed_at`, so calling it
//! twice with the same `now` decays once.
//!
//! ```text
//! exponential:  s' = s × 0.5^(days / half_life)
//! linear:       s' = max(0, s − days / half_life)
//! step:         s' = 0 once days > half_life, else s
//! none:         s' = s
//! ```
//!
//! Records without an explicit half-life use the [`HalfLifePolicy`] entry
//! for their namespace.
//!
//! # Example
//!
//! ```rust
//! use chrono::{Duration, TimeZone, Utc};
//! use mnemo_memory::decay::DecayEngine;
//! use mnemo_types::{CognitiveType, Record};
//!
//! let created = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
//! // semantic/knowledge defaults to a 90 day half-life.
//! let mut record = Record::new(CognitiveType::Semantic, "knowledge", "Rust editions", created);
//!
//! let engine = DecayEngine::default();
//! let strength = engine.recompute(&mut record, created + Duration::days(90));
//! assert!((strength - 0.5).abs() < 1e-9);
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SubsecRound, Utc};
use mnemo_types::{
    Decay, DecayModel, DurationParseError, IsoDuration, Record, Temporal, format_timestamp,
    parse_timestamp, sub_namespace_of,
};
use tracing::{debug, info, warn};

use crate::store::{RecordStore, StoreError};

pub const DEFAULT_HALF_LIFE_DAYS: u64 = 30;

/// Strength below which a record is a garbage-collection candidate.
pub const DEFAULT_FORGET_THRESHOLD: f64 = 0.1;

const MS_PER_DAY: f64 = 86_400_000.0;

// ─────────────────────────────────────────────────────────────────────────────
// HalfLifePolicy
// ─────────────────────────────────────────────────────────────────────────────

/// Namespace → half-life table with a default.
///
/// Keys are namespaces (`semantic/decisions`), cognitive types (`episodic`)
/// or bare sub-namespaces (`decisions`).  The longest key matching a whole
/// leading run of segments wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HalfLifePolicy {
    entries: BTreeMap<String, u64>,
    default_days: u64,
}

impl Default for HalfLifePolicy {
    fn default() -> Self {
        Self::bundled()
    }
}

impl HalfLifePolicy {
    /// An empty table where everything uses `default_days`.
    pub fn new(default_days: u64) -> Self {
        Self {
            entries: BTreeMap::new(),
            default_days,
        }
    }

    /// Long-lived decisions and procedures, short-lived sessions.
    pub fn bundled() -> Self {
        Self::new(DEFAULT_HALF_LIFE_DAYS)
            .with_half_life("semantic/decisions", 180)
            .with_half_life("semantic/knowledge", 90)
            .with_half_life("semantic/entities", 90)
            .with_half_life("procedural", 180)
            .with_half_life("episodic", 30)
            .with_half_life("episodic/sessions", 7)
    }

    /// Bundled table overlaid with ISO-8601 durations from configuration.
    pub fn from_table(
        default: &str,
        table: &BTreeMap<String, String>,
    ) -> Result<Self, DurationParseError> {
        let mut policy = Self::bundled();
        policy.default_days = IsoDuration::parse(default)?.whole_days();
        for (namespace, raw) in table {
            let days = IsoDuration::parse(raw)?.whole_days();
            policy = policy.with_half_life(namespace, days);
        }
        Ok(policy)
    }

    pub fn with_half_life(mut self, namespace: &str, days: u64) -> Self {
        self.entries
            .insert(namespace.trim_matches('/').to_string(), days);
        self
    }

    pub fn default_days(&self) -> u64 {
        self.default_days
    }

    /// Half-life in days for records stored in `namespace`.
    pub fn half_life_days(&self, namespace: &str) -> u64 {
        let sub = sub_namespace_of(namespace);
        self.entries
            .iter()
            .filter(|(key, _)| segment_prefix(key, namespace) || segment_prefix(key, sub))
            .max_by_key(|(key, _)| key.len())
            .map(|(_, days)| *days)
            .unwrap_or(self.default_days)
    }
}

fn segment_prefix(prefix: &str, namespace: &str) -> bool {
    !prefix.is_empty()
        && namespace
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

// ─────────────────────────────────────────────────────────────────────────────
// Pure model
// ─────────────────────────────────────────────────────────────────────────────

/// Apply `model` to `strength` over `days`.  A zero half-life never decays.
pub fn decayed_strength(model: DecayModel, strength: f64, days: f64, half_life_days: u64) -> f64 {
    if half_life_days == 0 || days <= 0.0 {
        return strength.clamp(0.0, 1.0);
    }
    let half_life = half_life_days as f64;
    let next = match model {
        DecayModel::Exponential => strength * 0.5_f64.powf(days / half_life),
        DecayModel::Linear => strength - days / half_life,
        DecayModel::Step if days > half_life => 0.0,
        DecayModel::Step | DecayModel::None => strength,
    };
    next.clamp(0.0, 1.0)
}

/// `true` once `strength` has fallen below `threshold`.
pub fn is_forgotten(strength: f64, threshold: f64) -> bool {
    strength < threshold
}

fn elapsed_days(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    ((to - from).num_milliseconds() as f64 / MS_PER_DAY).max(0.0)
}

// ─────────────────────────────────────────────────────────────────────────────
// DecayEngine
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct DecayEngine {
    policy: HalfLifePolicy,
}

impl DecayEngine {
    pub fn new(policy: HalfLifePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &HalfLifePolicy {
        &self.policy
    }

    /// Explicit `half_life`, else the namespace policy.
    pub fn half_life_days(&self, record: &Record) -> u64 {
        let explicit = record
            .header
            .decay()
            .and_then(|d| d.half_life.as_deref());
        if let Some(raw) = explicit {
            match IsoDuration::parse(raw) {
                Ok(d) => return d.whole_days(),
                Err(e) => {
                    warn!(id = %record.header.id, half_life = raw, error = %e, "invalid half-life, using namespace default");
                }
            }
        }
        self.policy.half_life_days(&record.header.namespace)
    }

    /// Strength `record` would have at `now`, without modifying it.
    pub fn strength_at(&self, record: &Record, now: DateTime<Utc>) -> f64 {
        let now = now.trunc_subsecs(0);
        let default = Decay::default();
        let decay = record.header.decay().unwrap_or(&default);
        let Some(model) = DecayModel::parse(&decay.model) else {
            return decay.strength;
        };
        let days = anchor(record, model).map_or(0.0, |a| elapsed_days(a, now));
        decayed_strength(model, decay.strength, days, self.half_life_days(record))
    }

    /// Decay `record` up to `now` and return the new strength.
    ///
    /// Records without a decay block get a default (exponential, strength
    /// 1.0) one.  `decayed_at` only moves forward, so a `now` earlier than
    /// the last recompute changes nothing.
    pub fn recompute(&self, record: &mut Record, now: DateTime<Utc>) -> f64 {
        let now = now.trunc_subsecs(0);
        let strength = self.strength_at(record, now);
        let model = record
            .header
            .decay()
            .map_or(Some(DecayModel::Exponential), |d| DecayModel::parse(&d.model));
        let Some(model) = model else {
            warn!(id = %record.header.id, "unknown decay model, strength left unchanged");
            return strength;
        };
        let advance = anchor(record, model).is_none_or(|a| now > a);

        let decay = decay_block(record);
        decay.strength = strength;
        if advance {
            decay.decayed_at = Some(format_timestamp(now));
        }
        strength
    }

    /// Register an access: strength back to 1.0, decay restarts from `now`.
    pub fn touch(&self, record: &mut Record, now: DateTime<Utc>) {
        let decay = decay_block(record);
        decay.strength = 1.0;
        decay.last_accessed = Some(format_timestamp(now));
        decay.decayed_at = None;
    }

    /// Read, recompute and atomically rewrite the record at `path`.
    ///
    /// The file is only rewritten when the decay block changed.
    pub fn recompute_file(
        &self,
        store: &RecordStore,
        path: &Path,
        now: DateTime<Utc>,
    ) -> Result<f64, StoreError> {
        let mut record = store.read(path)?;
        let before = record.header.decay().cloned();
        let strength = self.recompute(&mut record, now);
        if record.header.decay() != before.as_ref() {
            store.write(path, &record)?;
            debug!(path = %path.display(), strength, "decayed record");
        }
        Ok(strength)
    }

    /// [`recompute_file`][Self::recompute_file] for each path, one atomic
    /// write per file.  A failure on one file does not stop the batch.
    pub fn recompute_all(
        &self,
        store: &RecordStore,
        paths: &[PathBuf],
        now: DateTime<Utc>,
    ) -> Vec<(PathBuf, Result<f64, StoreError>)> {
        let results: Vec<_> = paths
            .iter()
            .map(|path| {
                let result = self.recompute_file(store, path, now);
                if let Err(e) = &result {
                    warn!(path = %path.display(), error = %e, "decay recompute failed");
                }
                (path.clone(), result)
            })
            .collect();
        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        info!(records = results.len(), failed, "decay pass complete");
        results
    }
}

/// Instant elapsed time is measured from.
///
/// `decayed_at`, then `last_accessed`, then `recorded_at`, then `created`.
/// The step model ignores `decayed_at`: it compares against the original
/// strength's age, not the last recompute.
fn anchor(record: &Record, model: DecayModel) -> Option<DateTime<Utc>> {
    let h = &record.header;
    let decay = h.decay();
    let decayed_at = match model {
        DecayModel::Step => None,
        _ => decay.and_then(|d| d.decayed_at.as_deref()),
    };
    decayed_at
        .into_iter()
        .chain(decay.and_then(|d| d.last_accessed.as_deref()))
        .chain(h.temporal.as_ref().map(|t| t.recorded_at.as_str()))
        .chain(Some(h.created.as_str()))
        .find_map(parse_timestamp)
}

fn decay_block(record: &mut Record) -> &mut Decay {
    record
        .header
        .temporal
        .get_or_insert_with(Temporal::default)
        .decay
        .get_or_insert_with(Decay::default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use mnemo_types::CognitiveType;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    fn record_with(model: &str, half_life: Option<&str>, strength: f64) -> Record {
        let mut r = Record::new(CognitiveType::Semantic, "knowledge", "r", t0());
        r.header.temporal.as_mut().unwrap().decay = Some(Decay {
            model: model.into(),
            half_life: half_life.map(str::to_string),
            strength,
            ..Decay::default()
        });
        r
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    // ── model ────────────────────────────────────────────────────────────────

    #[test]
    fn one_half_life_halves_strength() {
        let mut r = record_with("exponential", Some("P90D"), 1.0);
        let s = DecayEngine::default().recompute(&mut r, t0() + Duration::days(90));
        assert!(close(s, 0.5), "{s}");
        assert!(close(r.header.decay().unwrap().strength, 0.5));
    }

    #[test]
    fn zero_elapsed_leaves_strength_unchanged() {
        let mut r = record_with("exponential", Some("P90D"), 0.8);
        assert!(close(DecayEngine::default().recompute(&mut r, t0()), 0.8));
    }

    #[test]
    fn linear_step_and_none_models() {
        let e = DecayEngine::default();
        let at = t0() + Duration::days(45);
        assert!(close(e.strength_at(&record_with("linear", Some("P90D"), 1.0), at), 0.5));
        assert!(close(e.strength_at(&record_with("linear", Some("P30D"), 1.0), at), 0.0));
        assert!(close(e.strength_at(&record_with("step", Some("P90D"), 0.7), at), 0.7));
        assert!(close(e.strength_at(&record_with("step", Some("P30D"), 0.7), at), 0.0));
        assert!(close(e.strength_at(&record_with("none", Some("P1D"), 0.7), at), 0.7));
    }

    #[test]
    fn zero_half_life_never_decays() {
        assert!(close(decayed_strength(DecayModel::Exponential, 0.9, 500.0, 0), 0.9));
    }

    #[test]
    fn unknown_model_is_left_alone() {
        let mut r = record_with("sigmoid", Some("P1D"), 0.6);
        let before = r.clone();
        assert!(close(DecayEngine::default().recompute(&mut r, t0() + Duration::days(10)), 0.6));
        assert_eq!(r, before);
    }

    // ── idempotency and monotonicity ─────────────────────────────────────────

    #[test]
    fn recompute_twice_with_same_now_decays_once() {
        let e = DecayEngine::default();
        let mut r = record_with("exponential", Some("P90D"), 1.0);
        let now = t0() + Duration::days(90) + Duration::milliseconds(750);
        let first = e.recompute(&mut r, now);
        let second = e.recompute(&mut r, now);
        assert_eq!(first, second);
    }

    #[test]
    fn successive_recomputes_compose_and_never_increase() {
        let e = DecayEngine::default();
        let mut stepped = record_with("exponential", Some("P90D"), 1.0);
        let mut last = 1.0;
        for day in [10, 10, 30, 45, 90] {
            let s = e.recompute(&mut stepped, t0() + Duration::days(day));
            assert!(s <= last);
            last = s;
        }
        assert!(close(last, 0.5));
    }

    #[test]
    fn now_before_anchor_is_zero_elapsed() {
        let e = DecayEngine::default();
        let mut r = record_with("exponential", Some("P90D"), 1.0);
        e.recompute(&mut r, t0() + Duration::days(90));
        let decayed_at = r.header.decay().unwrap().decayed_at.clone();
        assert!(close(e.recompute(&mut r, t0() + Duration::days(10)), 0.5));
        assert_eq!(r.header.decay().unwrap().decayed_at, decayed_at);
    }

    #[test]
    fn touch_resets_strength_and_restarts_clock() {
        let e = DecayEngine::default();
        let mut r = record_with("exponential", Some("P10D"), 1.0);
        e.recompute(&mut r, t0() + Duration::days(20));
        e.touch(&mut r, t0() + Duration::days(20));
        let d = r.header.decay().unwrap();
        assert_eq!(d.strength, 1.0);
        assert!(d.decayed_at.is_none());
        assert!(close(e.strength_at(&r, t0() + Duration::days(30)), 0.5));
    }

    #[test]
    fn records_without_decay_block_get_one() {
        let mut r = Record::new(CognitiveType::Episodic, "sessions", "s", t0());
        let s = DecayEngine::default().recompute(&mut r, t0() + Duration::days(7));
        assert!(close(s, 0.5));
        assert_eq!(r.header.decay().unwrap().model, "exponential");
    }

    // ── policy ───────────────────────────────────────────────────────────────

    #[test]
    fn policy_uses_longest_matching_prefix() {
        let p = HalfLifePolicy::bundled();
        assert_eq!(p.half_life_days("semantic/decisions"), 180);
        assert_eq!(p.half_life_days("semantic/decisions/db"), 180);
        assert_eq!(p.half_life_days("episodic/sessions"), 7);
        assert_eq!(p.half_life_days("episodic/incidents"), 30);
        assert_eq!(p.half_life_days("procedural/runbooks"), 180);
        assert_eq!(p.half_life_days("semantic/decisionsx"), 30);
        assert_eq!(p.half_life_days("semantic/misc"), 30);
    }

    #[test]
    fn policy_from_config_table() {
        let table = BTreeMap::from([
            ("semantic/decisions".to_string(), "P1Y".to_string()),
            ("incidents".to_string(), "P3D".to_string()),
            ("episodic/sessions".to_string(), "P2W".to_string()),
        ]);
        let p = HalfLifePolicy::from_table("P60D", &table).unwrap();
        assert_eq!(p.default_days(), 60);
        assert_eq!(p.half_life_days("semantic/decisions"), 365);
        assert_eq!(p.half_life_days("episodic/sessions"), 14);
        assert_eq!(p.half_life_days("episodic/incidents/db"), 3);
        assert_eq!(p.half_life_days("semantic/misc"), 60);
        assert!(HalfLifePolicy::from_table("thirty days", &BTreeMap::new()).is_err());
    }

    #[test]
    fn invalid_explicit_half_life_falls_back_to_policy() {
        let r = record_with("exponential", Some("ninety"), 1.0);
        assert_eq!(DecayEngine::default().half_life_days(&r), 90);
    }

    #[test]
    fn forgotten_threshold() {
        assert!(is_forgotten(0.05, DEFAULT_FORGET_THRESHOLD));
        assert!(!is_forgotten(0.1, DEFAULT_FORGET_THRESHOLD));
    }

    // ── files ────────────────────────────────────────────────────────────────

    #[test]
    fn recompute_all_reports_per_file_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::default();
        let good = dir.path().join("good.memory.md");
        store.write(&good, &record_with("exponential", Some("P90D"), 1.0)).unwrap();
        let bad = dir.path().join("bad.memory.md");
        std::fs::write(&bad, "not a record").unwrap();

        let e = DecayEngine::default();
        let now = t0() + Duration::days(90);
        let results = e.recompute_all(&store, &[good.clone(), bad], now);
        assert!(close(*results[0].1.as_ref().unwrap(), 0.5));
        assert!(results[1].1.is_err());

        let stored = store.read(&good).unwrap();
        assert!(close(stored.header.decay().unwrap().strength, 0.5));
        // Second pass with the same `now` does not decay again.
        assert!(close(e.recompute_file(&store, &good, now).unwrap(), 0.5));
    }
}

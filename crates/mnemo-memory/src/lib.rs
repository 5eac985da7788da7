//! `mnemo-memory` – the record engine.
//!
//! Everything that reads, writes, ranks or maintains record files.
//!
//! # Modules
//!
//! - [`codec`] – [`RecordCodec`][codec::RecordCodec]: `+++`-fenced TOML
//!   header plus Markdown body, with a structured and a lenient line-based
//!   header strategy.
//! - [`store`] – [`RecordStore`][store::RecordStore]: atomic
//!   write-temp-then-rename persistence and record discovery under search
//!   roots.
//! - [`scorer`] – [`RelevanceScorer`][scorer::RelevanceScorer]: weighted
//!   re-ranking of text-search candidates with a deterministic tie-break.
//! - [`decay`] – [`DecayEngine`][decay::DecayEngine]: idempotent strength
//!   decay with per-namespace half-lives.
//! - [`graph`] – [`RelationshipGraph`][graph::RelationshipGraph]: typed
//!   edges with inverse bookkeeping and explicit partial-write outcomes.
//! - [`audit`] – cross-record consistency checks.
//! - [`search`] – parsing external search-tool output into candidate paths.

pub mod audit;
pub mod codec;
pub mod decay;
pub mod graph;
pub mod scorer;
pub mod search;
pub mod store;

pub use audit::{AuditReport, audit};
pub use codec::{CodecError, CodecMode, HeaderStrategy, LineHeader, RecordCodec, StructuredHeader};
pub use decay::{DecayEngine, HalfLifePolicy, decayed_strength, is_forgotten};
pub use graph::{BidirectionalOutcome, LinkError, RelationshipError, RelationshipGraph};
pub use scorer::{Candidate, RelevanceScorer, ScoringReference};
pub use search::candidate_paths_from_output;
pub use store::{RecordStore, StoreError, write_atomic};

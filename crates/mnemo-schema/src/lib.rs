//! `mnemo-schema` – record validation for the mnemo memory engine.
//!
//! # Modules
//!
//! - [`validator`] – [`SchemaValidator`]: an ordered set of [`Rule`]s that
//!   accumulate [`Finding`][mnemo_types::Finding]s instead of failing fast.
//! - [`ontology`] – [`OntologyRegistry`]: layered namespace, entity-type and
//!   relationship extensions merged from TOML documents.
//! - [`links`] – `[[uuid]]` body-link extraction shared with the audit pass.
//!
//! [`record_json_schema`] exports the record header shape as JSON Schema for
//! editors and external tooling.

pub mod links;
pub mod ontology;
pub mod validator;

pub use links::body_links;
pub use ontology::{
    BASE_ONTOLOGY, EntitySchema, Ontology, OntologyError, OntologyRegistry, OntologySource,
};
pub use validator::{Rule, RuleContext, SchemaValidator, has_errors};

use mnemo_types::RecordHeader;

/// JSON Schema of [`RecordHeader`].
pub fn record_json_schema() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(RecordHeader)).unwrap_or(serde_json::Value::Null)
}

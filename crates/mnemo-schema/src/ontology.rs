//! Layered ontology overlay.
//!
//! An ontology extends the base record schema with namespaces, entity types,
//! traits (field sets mixed into entity types) and custom relationship
//! constraints.  Layers are merged in load order (bundled base, then
//! user/organization, then project); within each table the last layer to
//! define a key wins.
//!
//! The registry is an ordinary value: build one per invocation and hand it to
//! whoever needs it.
//!
//! # Example
//!
//! ```rust
//! use mnemo_schema::ontology::{OntologyRegistry, OntologySource};
//!
//! let project = r#"
//! [namespaces.experiments]
//! description = "A/B test results"
//! cognitive_type = "episodic"
//! "#;
//! let registry = OntologyRegistry::load(&[
//!     OntologySource::Bundled,
//!     OntologySource::Inline { origin: "project".into(), text: project.into() },
//! ])
//! .unwrap();
//! assert!(registry.namespace("experiments").is_some());
//! assert!(registry.namespace("decisions").is_some());
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// The base ontology compiled into the crate.
pub const BASE_ONTOLOGY: &str = include_str!("../ontologies/base.toml");

#[derive(Error, Debug)]
pub enum OntologyError {
    #[error("failed to read ontology {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse ontology {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: toml::de::Error,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Ontology document
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NamespaceDef {
    #[serde(default)]
    pub description: String,
    /// Cognitive type records in this namespace are expected to carry.
    #[serde(default)]
    pub cognitive_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityTypeDef {
    /// Base cognitive type.
    #[serde(default)]
    pub base: String,
    #[serde(default)]
    pub traits: Vec<String>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub optional: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraitDef {
    #[serde(default)]
    pub fields: Vec<String>,
}

/// Custom edge constraint: which entity types an edge may leave from and
/// point to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationshipDef {
    #[serde(default)]
    pub from: Vec<String>,
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default)]
    pub inverse: Option<String>,
    #[serde(default)]
    pub symmetric: bool,
}

/// Content patterns that hint at an entity type.  Informational only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryPattern {
    pub pattern: String,
    #[serde(default)]
    pub suggest: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryDef {
    #[serde(default)]
    pub patterns: Vec<DiscoveryPattern>,
}

/// One ontology layer as written on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ontology {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub namespaces: BTreeMap<String, NamespaceDef>,
    #[serde(default)]
    pub entity_types: BTreeMap<String, EntityTypeDef>,
    #[serde(default)]
    pub traits: BTreeMap<String, TraitDef>,
    #[serde(default)]
    pub relationships: BTreeMap<String, RelationshipDef>,
    #[serde(default)]
    pub discovery: DiscoveryDef,
}

impl Ontology {
    pub fn parse(origin: &str, text: &str) -> Result<Self, OntologyError> {
        toml::from_str(text).map_err(|source| OntologyError::Parse {
            origin: origin.to_string(),
            source,
        })
    }
}

/// Where one ontology layer comes from.
#[derive(Debug, Clone)]
pub enum OntologySource {
    /// [`BASE_ONTOLOGY`].
    Bundled,
    /// A TOML file; silently skipped when it does not exist.
    File(PathBuf),
    Inline { origin: String, text: String },
}

/// Entity-type schema after trait composition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntitySchema {
    pub base: String,
    pub required: BTreeSet<String>,
    pub optional: BTreeSet<String>,
    /// Union of every declared trait's fields.
    pub trait_fields: BTreeSet<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// OntologyRegistry
// ─────────────────────────────────────────────────────────────────────────────

/// Merged view over every loaded ontology layer.
#[derive(Debug, Clone, Default)]
pub struct OntologyRegistry {
    merged: Ontology,
    layers: Vec<String>,
}

impl OntologyRegistry {
    /// A registry with no layers at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Only the bundled base ontology.
    pub fn bundled() -> Result<Self, OntologyError> {
        Self::load(&[OntologySource::Bundled])
    }

    /// Merge `sources` in order, lowest precedence first.
    pub fn load(sources: &[OntologySource]) -> Result<Self, OntologyError> {
        let mut registry = Self::empty();
        for source in sources {
            let (origin, layer) = match source {
                OntologySource::Bundled => ("bundled".to_string(), Ontology::parse("bundled", BASE_ONTOLOGY)?),
                OntologySource::File(path) => {
                    let text = match fs::read_to_string(path) {
                        Ok(text) => text,
                        Err(e) if e.kind() == io::ErrorKind::NotFound => {
                            debug!(path = %path.display(), "ontology layer not present, skipping");
                            continue;
                        }
                        Err(source) => {
                            return Err(OntologyError::Io {
                                path: path.clone(),
                                source,
                            });
                        }
                    };
                    let origin = path.display().to_string();
                    let layer = Ontology::parse(&origin, &text)?;
                    (origin, layer)
                }
                OntologySource::Inline { origin, text } => (origin.clone(), Ontology::parse(origin, text)?),
            };
            registry.merge(origin, layer);
        }
        Ok(registry)
    }

    /// Layer `layer` on top of everything merged so far.
    pub fn merge(&mut self, origin: String, layer: Ontology) {
        debug!(%origin, namespaces = layer.namespaces.len(), entity_types = layer.entity_types.len(), "merging ontology layer");
        let merged = &mut self.merged;
        if !layer.name.is_empty() {
            merged.name = layer.name;
        }
        if !layer.version.is_empty() {
            merged.version = layer.version;
        }
        merged.namespaces.extend(layer.namespaces);
        merged.entity_types.extend(layer.entity_types);
        merged.traits.extend(layer.traits);
        merged.relationships.extend(
            layer
                .relationships
                .into_iter()
                .map(|(name, def)| (fold_name(&name), def)),
        );
        merged.discovery.patterns.extend(layer.discovery.patterns);
        self.layers.push(origin);
    }

    /// Origins of the merged layers, in load order.
    pub fn layers(&self) -> &[String] {
        &self.layers
    }

    pub fn has_namespaces(&self) -> bool {
        !self.merged.namespaces.is_empty()
    }

    /// Look a namespace up by its sub-namespace, then by its full name.
    /// Nested namespaces fall back to their first segment.
    pub fn namespace(&self, namespace: &str) -> Option<&NamespaceDef> {
        let namespaces = &self.merged.namespaces;
        let sub = mnemo_types::sub_namespace_of(namespace);
        namespaces
            .get(sub)
            .or_else(|| namespaces.get(namespace))
            .or_else(|| sub.split('/').next().and_then(|head| namespaces.get(head)))
    }

    pub fn entity_type(&self, name: &str) -> Option<&EntityTypeDef> {
        self.merged.entity_types.get(name)
    }

    /// Compose the schema of entity type `name` with its traits.
    ///
    /// Unknown traits contribute nothing.
    pub fn entity_schema(&self, name: &str) -> Option<EntitySchema> {
        let def = self.entity_type(name)?;
        let trait_fields = def
            .traits
            .iter()
            .filter_map(|t| self.merged.traits.get(t))
            .flat_map(|t| t.fields.iter().cloned())
            .collect();
        Some(EntitySchema {
            base: def.base.clone(),
            required: def.required.iter().cloned().collect(),
            optional: def.optional.iter().cloned().collect(),
            trait_fields,
        })
    }

    /// Custom relationship, matched with the same spelling rules as the
    /// built-in registry.
    pub fn relationship(&self, name: &str) -> Option<&RelationshipDef> {
        self.merged.relationships.get(&fold_name(name))
    }

    pub fn discovery_patterns(&self) -> &[DiscoveryPattern] {
        &self.merged.discovery.patterns
    }

    pub fn ontology(&self) -> &Ontology {
        &self.merged
    }
}

fn fold_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '_' | '-') && !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

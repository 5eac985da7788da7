//! Canonical relationship-type registry.
//!
//! Every edge type has an inverse (itself when symmetric).  Asymmetric pairs
//! list their *canonical* direction first: `Supersedes` is canonical,
//! `SupersededBy` is its inverse.
//!
//! Names are accepted in PascalCase or snake_case, case-insensitively, and
//! always written back in PascalCase.
//!
//! ```rust
//! use mnemo_types::RelationshipType;
//!
//! let t = RelationshipType::parse("superseded_by").unwrap();
//! assert_eq!(t, RelationshipType::SupersededBy);
//! assert_eq!(t.inverse(), RelationshipType::Supersedes);
//! assert!(RelationshipType::ConflictsWith.is_symmetric());
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown relationship type: {0}")]
pub struct UnknownRelationshipType(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RelationshipType {
    RelatesTo,
    Supersedes,
    SupersededBy,
    DerivedFrom,
    Derives,
    PartOf,
    Contains,
    Implements,
    ImplementedBy,
    Uses,
    UsedBy,
    Created,
    CreatedBy,
    MentionedIn,
    Mentions,
    ConflictsWith,
}

/// `(canonical, inverse)` pairs; symmetric types pair with themselves.
const PAIRS: [(RelationshipType, RelationshipType); 9] = [
    (RelationshipType::RelatesTo, RelationshipType::RelatesTo),
    (RelationshipType::Supersedes, RelationshipType::SupersededBy),
    (RelationshipType::DerivedFrom, RelationshipType::Derives),
    (RelationshipType::PartOf, RelationshipType::Contains),
    (RelationshipType::Implements, RelationshipType::ImplementedBy),
    (RelationshipType::Uses, RelationshipType::UsedBy),
    (RelationshipType::Created, RelationshipType::CreatedBy),
    (RelationshipType::MentionedIn, RelationshipType::Mentions),
    (RelationshipType::ConflictsWith, RelationshipType::ConflictsWith),
];

impl RelationshipType {
    pub const ALL: [RelationshipType; 16] = [
        RelationshipType::RelatesTo,
        RelationshipType::Supersedes,
        RelationshipType::SupersededBy,
        RelationshipType::DerivedFrom,
        RelationshipType::Derives,
        RelationshipType::PartOf,
        RelationshipType::Contains,
        RelationshipType::Implements,
        RelationshipType::ImplementedBy,
        RelationshipType::Uses,
        RelationshipType::UsedBy,
        RelationshipType::Created,
        RelationshipType::CreatedBy,
        RelationshipType::MentionedIn,
        RelationshipType::Mentions,
        RelationshipType::ConflictsWith,
    ];

    /// PascalCase name as written to record headers.
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::RelatesTo => "RelatesTo",
            RelationshipType::Supersedes => "Supersedes",
            RelationshipType::SupersededBy => "SupersededBy",
            RelationshipType::DerivedFrom => "DerivedFrom",
            RelationshipType::Derives => "Derives",
            RelationshipType::PartOf => "PartOf",
            RelationshipType::Contains => "Contains",
            RelationshipType::Implements => "Implements",
            RelationshipType::ImplementedBy => "ImplementedBy",
            RelationshipType::Uses => "Uses",
            RelationshipType::UsedBy => "UsedBy",
            RelationshipType::Created => "Created",
            RelationshipType::CreatedBy => "CreatedBy",
            RelationshipType::MentionedIn => "MentionedIn",
            RelationshipType::Mentions => "Mentions",
            RelationshipType::ConflictsWith => "ConflictsWith",
        }
    }

    /// snake_case spelling, e.g. `superseded_by`.
    pub fn snake_name(&self) -> String {
        let mut out = String::new();
        for (i, c) in self.as_str().chars().enumerate() {
            if c.is_ascii_uppercase() {
                if i > 0 {
                    out.push('_');
                }
                out.push(c.to_ascii_lowercase());
            } else {
                out.push(c);
            }
        }
        out
    }

    /// Case-insensitive lookup accepting PascalCase, snake_case and
    /// kebab-case spellings.
    pub fn parse(raw: &str) -> Result<Self, UnknownRelationshipType> {
        let folded: String = raw
            .chars()
            .filter(|c| !matches!(c, '_' | '-') && !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(&folded))
            .ok_or_else(|| UnknownRelationshipType(raw.to_string()))
    }

    pub fn is_valid(raw: &str) -> bool {
        Self::parse(raw).is_ok()
    }

    pub fn inverse(&self) -> Self {
        for (canonical, inverse) in PAIRS {
            if canonical == *self {
                return inverse;
            }
            if inverse == *self {
                return canonical;
            }
        }
        *self
    }

    pub fn is_symmetric(&self) -> bool {
        self.inverse() == *self
    }

    /// `true` for the direction listed first in the registry.
    pub fn is_canonical(&self) -> bool {
        PAIRS.iter().any(|(canonical, _)| canonical == self)
    }
}

impl FromStr for RelationshipType {
    type Err = UnknownRelationshipType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

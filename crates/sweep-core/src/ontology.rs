//! Ontology mapping
//!
//! Maps the fixed logical predicate and class names used by the statement
//! builder onto the IRIs of the deployed ontology. Values are canonicalized
//! on load; a missing key is reported when a statement first needs it.

use crate::{NodeRef, Result, SweepError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Logical ontology terms the statement builder dereferences
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OntologyKey {
    SubClassOf,
    SubPropertyOf,
    IsIdentifiedBy,
    Appellation,
    DatatypeProperty,
    CopyOf,
    Graph,
    Class,
    Crm,
    Wisski,
    HasNote,
    HasUrl,
    HasUriPrefix,
}

impl OntologyKey {
    pub const ALL: [OntologyKey; 13] = [
        Self::SubClassOf,
        Self::SubPropertyOf,
        Self::IsIdentifiedBy,
        Self::Appellation,
        Self::DatatypeProperty,
        Self::CopyOf,
        Self::Graph,
        Self::Class,
        Self::Crm,
        Self::Wisski,
        Self::HasNote,
        Self::HasUrl,
        Self::HasUriPrefix,
    ];

    /// Configuration key name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SubClassOf => "subClassOf",
            Self::SubPropertyOf => "subPropertyOf",
            Self::IsIdentifiedBy => "is_identified_by",
            Self::Appellation => "appellation",
            Self::DatatypeProperty => "datatypeProperty",
            Self::CopyOf => "copy_of",
            Self::Graph => "graph",
            Self::Class => "class",
            Self::Crm => "crm",
            Self::Wisski => "wisski",
            Self::HasNote => "has_note",
            Self::HasUrl => "has_url",
            Self::HasUriPrefix => "has_uri_prefix",
        }
    }
}

impl std::fmt::Display for OntologyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable mapping from logical names to canonical references
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct Ontology {
    terms: BTreeMap<String, NodeRef>,
}

impl Ontology {
    /// Build from raw configuration values.
    ///
    /// Unknown keys are kept so deployments may carry extra terms.
    pub fn from_map(raw: BTreeMap<String, String>) -> Result<Self> {
        let terms = raw
            .into_iter()
            .map(|(key, value)| {
                NodeRef::new(&value)
                    .map(|node| (key.clone(), node))
                    .map_err(|_| {
                        SweepError::Configuration(format!(
                            "ontology key '{key}' has an empty reference"
                        ))
                    })
            })
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok(Self { terms })
    }

    /// Add or replace a term
    pub fn with(mut self, key: OntologyKey, value: &str) -> Result<Self> {
        self.terms
            .insert(key.as_str().to_string(), NodeRef::new(value)?);
        Ok(self)
    }

    /// Dereference a term, failing fast when it is not configured
    pub fn get(&self, key: OntologyKey) -> Result<&NodeRef> {
        self.terms.get(key.as_str()).ok_or_else(|| {
            SweepError::Configuration(format!("missing ontology key '{key}'"))
        })
    }

    /// Keys the statement builder may need but which are not configured
    pub fn missing_keys(&self) -> Vec<OntologyKey> {
        OntologyKey::ALL
            .into_iter()
            .filter(|key| !self.terms.contains_key(key.as_str()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl TryFrom<BTreeMap<String, String>> for Ontology {
    type Error = SweepError;

    fn try_from(raw: BTreeMap<String, String>) -> Result<Self> {
        Self::from_map(raw)
    }
}

impl From<Ontology> for BTreeMap<String, String> {
    fn from(ontology: Ontology) -> Self {
        ontology
            .terms
            .into_iter()
            .map(|(key, node)| (key, node.into()))
            .collect()
    }
}

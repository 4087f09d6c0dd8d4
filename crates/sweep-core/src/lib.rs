//! Sweep Core - Shared types, errors and capability traits
//!
//! This crate defines the abstractions used throughout the sweep system:
//! - Canonical node references and typed result bindings
//! - Query descriptors and result shapes
//! - The common error taxonomy
//! - Capability traits for store endpoints, entity resolution and credentials
//! - Ontology mapping and configuration management

pub mod config;
pub mod ontology;

pub use config::{
    AppConfig, CascadeConfig, ConfigError, CredentialEntry, EndpointConfig, GraphMode,
    LoggingConfig, StaticCredentials, StoreConfig,
};
pub use ontology::{Ontology, OntologyKey};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for sweep operations
#[derive(Error, Debug)]
pub enum SweepError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Empty input: {0}")]
    EmptyInput(&'static str),

    #[error("Endpoint {endpoint} failed: {message}")]
    Endpoint { endpoint: String, message: String },

    #[error("Cascade exceeded maximum depth {max_depth} with {pending} nodes still pending; no statements were deleted")]
    CascadeTooDeep { max_depth: usize, pending: usize },

    #[error("Invalid node reference: {0:?}")]
    InvalidReference(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SweepError {
    /// Build an endpoint error
    pub fn endpoint(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Endpoint {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SweepError>;

// ============================================================================
// Node References
// ============================================================================

/// Canonicalize an IRI into its bracketed form.
///
/// Strips every angle bracket and surrounding whitespace, then wraps the
/// remainder in a single pair of brackets. Applying it twice yields the
/// same string as applying it once.
pub fn canonicalize(uri: &str) -> String {
    let inner: String = uri.chars().filter(|c| *c != '<' && *c != '>').collect();
    format!("<{}>", inner.trim())
}

/// Characters an IRI reference may not contain besides the brackets
const FORBIDDEN_IRI_CHARS: &[char] = &['"', '{', '}', '|', '^', '`', '\\'];

fn is_iri_char(c: char) -> bool {
    !c.is_control() && !c.is_whitespace() && !FORBIDDEN_IRI_CHARS.contains(&c)
}

/// A node identity, always held in canonical bracketed form
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeRef(String);

impl NodeRef {
    /// Create a node reference from a raw or bracketed IRI.
    ///
    /// Empty references and references with characters an IRI may not
    /// hold (whitespace, control characters, quotes, braces, `|`, `^`,
    /// backquotes, backslashes) are rejected.
    pub fn new(uri: impl AsRef<str>) -> Result<Self> {
        let canonical = canonicalize(uri.as_ref());
        let inner = &canonical[1..canonical.len() - 1];
        if inner.is_empty() || !inner.chars().all(is_iri_char) {
            return Err(SweepError::InvalidReference(uri.as_ref().to_string()));
        }
        Ok(Self(canonical))
    }

    /// Bracketed form, ready for inclusion in a statement
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The bare IRI without brackets
    pub fn iri(&self) -> &str {
        &self.0[1..self.0.len() - 1]
    }
}

impl std::fmt::Display for NodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for NodeRef {
    type Err = SweepError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for NodeRef {
    type Error = SweepError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<NodeRef> for String {
    fn from(node: NodeRef) -> Self {
        node.0
    }
}

// ============================================================================
// Raw and Normalized Bindings
// ============================================================================

/// One term as delivered by an endpoint, before normalization.
///
/// Field names follow the SPARQL 1.1 JSON results format so endpoint
/// responses deserialize into it directly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTerm {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,

    #[serde(default)]
    pub value: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,

    #[serde(rename = "xml:lang", default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
}

impl RawTerm {
    /// An IRI term
    pub fn iri(value: impl Into<String>) -> Self {
        Self {
            kind: Some("uri".to_string()),
            value: Some(value.into()),
            ..Default::default()
        }
    }

    /// A plain literal term
    pub fn literal(value: impl Into<String>) -> Self {
        Self {
            kind: Some("literal".to_string()),
            value: Some(value.into()),
            ..Default::default()
        }
    }

    /// A blank node term
    pub fn blank(label: impl Into<String>) -> Self {
        Self {
            kind: Some("bnode".to_string()),
            value: Some(label.into()),
            ..Default::default()
        }
    }

    /// The identity of this term, if it has one
    pub fn identity(&self) -> Option<&str> {
        match (self.kind.as_deref(), self.value.as_deref()) {
            (Some("uri"), Some(value)) => Some(value),
            _ => None,
        }
    }

    /// The scalar value of this term, if it has one
    pub fn scalar(&self) -> Option<String> {
        match (self.kind.as_deref(), self.value.as_deref()) {
            (Some("literal") | Some("typed-literal"), Some(value)) => Some(value.to_string()),
            (Some("bnode"), Some(label)) if label.starts_with("_:") => Some(label.to_string()),
            (Some("bnode"), Some(label)) => Some(format!("_:{label}")),
            _ => None,
        }
    }
}

/// One result row as delivered by an endpoint
pub type RawRow = HashMap<String, RawTerm>;

/// A resolved value for one variable in one result row
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Binding {
    /// A term with an identity, canonicalized
    Reference(NodeRef),
    /// A scalar value, passed through as-is
    Literal(String),
    /// Neither accessor produced a value
    Missing,
}

impl Binding {
    /// Classify a raw term once. Malformed terms become `Missing`.
    pub fn from_raw(term: Option<&RawTerm>) -> Self {
        let Some(term) = term else {
            return Self::Missing;
        };
        if let Some(iri) = term.identity() {
            return match NodeRef::new(iri) {
                Ok(node) => Self::Reference(node),
                Err(_) => Self::Missing,
            };
        }
        match term.scalar() {
            Some(value) => Self::Literal(value),
            None => Self::Missing,
        }
    }

    pub fn as_reference(&self) -> Option<&NodeRef> {
        match self {
            Self::Reference(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Self::Literal(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }
}

impl std::fmt::Display for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reference(node) => write!(f, "{node}"),
            Self::Literal(value) => f.write_str(value),
            Self::Missing => f.write_str("No Value"),
        }
    }
}

// ============================================================================
// Queries and Result Sets
// ============================================================================

/// A built statement plus the variables the caller expects back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    /// Statement text
    pub statement: String,

    /// Expected variables in order; `None` means bindings are discarded
    pub variables: Option<Vec<String>>,
}

impl QueryDescriptor {
    /// A read query returning the given variables
    pub fn select(statement: impl Into<String>, variables: &[&str]) -> Self {
        Self {
            statement: statement.into(),
            variables: Some(variables.iter().map(|v| v.to_string()).collect()),
        }
    }

    /// An update statement with no bindings
    pub fn update(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            variables: None,
        }
    }

    pub fn is_update(&self) -> bool {
        self.variables.is_none()
    }
}

/// The grouping a caller wants results in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultShape {
    /// One map per result row; keeps variables of a row correlated
    #[default]
    Row,
    /// One list per variable; row correspondence is lost
    Column,
}

/// One normalized result row
pub type Row = BTreeMap<String, Binding>;

/// Normalized query results in the shape chosen at execution time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultSet {
    Rows(Vec<Row>),
    Columns(BTreeMap<String, Vec<Binding>>),
}

impl ResultSet {
    /// An empty result set of the given shape
    pub fn empty(shape: ResultShape) -> Self {
        match shape {
            ResultShape::Row => Self::Rows(Vec::new()),
            ResultShape::Column => Self::Columns(BTreeMap::new()),
        }
    }

    pub fn shape(&self) -> ResultShape {
        match self {
            Self::Rows(_) => ResultShape::Row,
            Self::Columns(_) => ResultShape::Column,
        }
    }

    /// Rows, if this set was executed row-major
    pub fn rows(&self) -> Option<&[Row]> {
        match self {
            Self::Rows(rows) => Some(rows),
            Self::Columns(_) => None,
        }
    }

    /// All values of one variable, if this set was executed column-major
    pub fn column(&self, variable: &str) -> Option<&[Binding]> {
        match self {
            Self::Columns(columns) => columns.get(variable).map(Vec::as_slice),
            Self::Rows(_) => None,
        }
    }

    /// Every `(variable, value)` pair, regardless of grouping
    pub fn pairs(&self) -> Vec<(&str, &Binding)> {
        match self {
            Self::Rows(rows) => rows
                .iter()
                .flat_map(|row| row.iter().map(|(k, v)| (k.as_str(), v)))
                .collect(),
            Self::Columns(columns) => columns
                .iter()
                .flat_map(|(k, values)| values.iter().map(move |v| (k.as_str(), v)))
                .collect(),
        }
    }

    /// Number of result rows
    pub fn len(&self) -> usize {
        match self {
            Self::Rows(rows) => rows.len(),
            Self::Columns(columns) => columns.values().map(Vec::len).max().unwrap_or(0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Capability Traits
// ============================================================================

/// Direct statement execution against a triple store
#[async_trait]
pub trait DirectEndpoint: Send + Sync {
    /// Evaluate a read statement and return its raw rows
    async fn direct_query(&self, statement: &str) -> Result<Vec<RawRow>>;

    /// Apply an update statement and return the store's response payload
    async fn direct_update(&self, statement: &str) -> Result<String>;
}

/// A registered triple store
pub trait StoreEndpoint: Send + Sync {
    /// Endpoint name for logging and outcome reports
    fn name(&self) -> &str;

    /// The direct query/update capability, if this endpoint has it
    fn direct(&self) -> Option<&dyn DirectEndpoint>;
}

/// Resolution of node references into locally renderable records
#[async_trait]
pub trait EntityResolver: Send + Sync {
    /// Load the record behind a node, `None` if there is none
    async fn resolve(&self, node: &NodeRef) -> Result<Option<serde_json::Value>>;

    /// Render a record into its display form
    async fn render(&self, record: &serde_json::Value) -> Result<Option<String>>;
}

/// Username and password for one host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

/// Lookup of credentials by host name
pub trait CredentialStore: Send + Sync {
    fn credentials(&self, host: &str) -> Option<Credentials>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_canonicalize_wraps_raw_iri() {
        assert_eq!(canonicalize("http://ex.org/a"), "<http://ex.org/a>");
        assert_eq!(canonicalize("<http://ex.org/a>"), "<http://ex.org/a>");
        assert_eq!(canonicalize("<<http://ex.org/a>>"), "<http://ex.org/a>");
    }

    #[test]
    fn test_raw_and_bracketed_compare_equal() {
        let raw = NodeRef::new("http://ex.org/n1").unwrap();
        let bracketed = NodeRef::new("<http://ex.org/n1>").unwrap();
        assert_eq!(raw, bracketed);
        assert_eq!(raw.iri(), "http://ex.org/n1");
        assert_eq!(raw.to_string(), "<http://ex.org/n1>");
    }

    #[test]
    fn test_empty_reference_rejected() {
        assert!(matches!(
            NodeRef::new("<>"),
            Err(SweepError::InvalidReference(_))
        ));
        assert!(NodeRef::new("   ").is_err());
    }

    #[test]
    fn test_reference_with_illegal_characters_rejected() {
        for bad in [
            "http://ex.org/a b",
            "http://ex.org/\"quoted\"",
            "http://ex.org/{x}",
            "http://ex.org/a|b",
            "http://ex.org/a^b",
            "http://ex.org/`a`",
            "http://ex.org/a\\b",
            "http://ex.org/a\nb",
        ] {
            assert!(
                matches!(NodeRef::new(bad), Err(SweepError::InvalidReference(_))),
                "accepted {bad:?}"
            );
        }
        assert!(NodeRef::new("  <http://ex.org/a#frag?q=1&r=%20>  ").is_ok());
    }

    #[test]
    fn test_node_ref_serde_canonicalizes() {
        let node: NodeRef = serde_json::from_str("\"http://ex.org/x\"").unwrap();
        assert_eq!(node.as_str(), "<http://ex.org/x>");
        assert_eq!(serde_json::to_string(&node).unwrap(), "\"<http://ex.org/x>\"");
    }

    #[test]
    fn test_binding_classification() {
        let iri = RawTerm::iri("http://ex.org/a");
        let lit = RawTerm::literal("Book 1");
        let blank = RawTerm::blank("b0");
        let broken = RawTerm {
            kind: Some("uri".to_string()),
            value: None,
            ..Default::default()
        };

        assert_eq!(
            Binding::from_raw(Some(&iri)),
            Binding::Reference(NodeRef::new("http://ex.org/a").unwrap())
        );
        assert_eq!(
            Binding::from_raw(Some(&lit)),
            Binding::Literal("Book 1".to_string())
        );
        assert_eq!(
            Binding::from_raw(Some(&blank)),
            Binding::Literal("_:b0".to_string())
        );
        assert_eq!(Binding::from_raw(Some(&broken)), Binding::Missing);
        assert_eq!(Binding::from_raw(None), Binding::Missing);
    }

    #[test]
    fn test_raw_term_from_sparql_json() {
        let term: RawTerm = serde_json::from_str(
            r#"{"type": "literal", "value": "Haus", "xml:lang": "de"}"#,
        )
        .unwrap();
        assert_eq!(term.lang.as_deref(), Some("de"));
        assert_eq!(term.scalar().as_deref(), Some("Haus"));
        assert!(term.identity().is_none());
    }

    #[test]
    fn test_result_set_pairs_ignore_grouping() {
        let a = Binding::Literal("a".to_string());
        let b = Binding::Literal("b".to_string());

        let mut row = Row::new();
        row.insert("x".to_string(), a.clone());
        row.insert("y".to_string(), b.clone());
        let rows = ResultSet::Rows(vec![row]);

        let mut columns = BTreeMap::new();
        columns.insert("x".to_string(), vec![a]);
        columns.insert("y".to_string(), vec![b]);
        let columns = ResultSet::Columns(columns);

        let mut left = rows.pairs();
        let mut right = columns.pairs();
        left.sort();
        right.sort();
        assert_eq!(left, right);
        assert_eq!(rows.len(), 1);
        assert_eq!(columns.len(), 1);
        assert!(rows.column("x").is_none());
        assert!(columns.rows().is_none());
    }

    #[test]
    fn test_descriptor_kinds() {
        let select = QueryDescriptor::select("SELECT ?o WHERE { ?s ?p ?o }", &["o"]);
        let update = QueryDescriptor::update("CLEAR ALL");
        assert!(!select.is_update());
        assert!(update.is_update());
        assert_eq!(select.variables.unwrap(), vec!["o".to_string()]);
    }

    /// Store without the direct capability, plus one with it
    struct Archive;
    struct Live;

    impl StoreEndpoint for Archive {
        fn name(&self) -> &str {
            "archive"
        }

        fn direct(&self) -> Option<&dyn DirectEndpoint> {
            None
        }
    }

    #[async_trait]
    impl DirectEndpoint for Live {
        async fn direct_query(&self, _statement: &str) -> Result<Vec<RawRow>> {
            let mut row = RawRow::new();
            row.insert("o".to_string(), RawTerm::iri("http://ex.org/a"));
            Ok(vec![row])
        }

        async fn direct_update(&self, _statement: &str) -> Result<String> {
            Ok("ok".to_string())
        }
    }

    impl StoreEndpoint for Live {
        fn name(&self) -> &str {
            "live"
        }

        fn direct(&self) -> Option<&dyn DirectEndpoint> {
            Some(self)
        }
    }

    #[test]
    fn test_direct_capability_through_trait_objects() {
        let endpoints: Vec<Box<dyn StoreEndpoint>> = vec![Box::new(Archive), Box::new(Live)];
        let capable: Vec<&dyn DirectEndpoint> =
            endpoints.iter().filter_map(|e| e.direct()).collect();
        assert_eq!(capable.len(), 1);

        let rows = tokio_test::block_on(capable[0].direct_query("SELECT ?o {}")).unwrap();
        assert_eq!(
            Binding::from_raw(rows[0].get("o")),
            Binding::Reference(NodeRef::new("http://ex.org/a").unwrap())
        );
        assert_eq!(tokio_test::block_on(capable[0].direct_update("CLEAR ALL")).unwrap(), "ok");
    }

    proptest! {
        #[test]
        fn prop_canonicalize_is_idempotent(uri in ".*") {
            let once = canonicalize(&uri);
            prop_assert_eq!(canonicalize(&once), once);
        }

        #[test]
        fn prop_bracketing_does_not_change_identity(iri in "[a-z]{1,8}://[a-z0-9./#]{1,24}") {
            let raw = NodeRef::new(&iri).unwrap();
            let bracketed = NodeRef::new(format!("<{iri}>")).unwrap();
            prop_assert_eq!(raw, bracketed);
        }
    }
}

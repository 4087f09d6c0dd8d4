//! Sweep Query - SPARQL statement construction
//!
//! Assembles selection and update statements from the ontology mapping and
//! caller arguments. Everything here is pure: no statement is executed.
//!
//! Author: hephaex@gmail.com

pub mod filter;

pub use filter::FilterOptions;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use sweep_core::{GraphMode, NodeRef, Ontology, OntologyKey, QueryDescriptor, Result, SweepError};

const OWL_ONTOLOGY: &str = "<http://www.w3.org/2002/07/owl#Ontology>";

/// A local entity and the external entity it duplicates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkPair {
    pub local: NodeRef,
    pub external: NodeRef,
}

impl LinkPair {
    pub fn new(local: NodeRef, external: NodeRef) -> Self {
        Self { local, external }
    }
}

/// Builds statements against one ontology mapping
#[derive(Debug, Clone)]
pub struct StatementBuilder {
    ontology: Arc<Ontology>,
    graph_mode: GraphMode,
}

impl StatementBuilder {
    /// Create a builder over an ontology mapping
    pub fn new(ontology: Arc<Ontology>) -> Self {
        Self {
            ontology,
            graph_mode: GraphMode::default(),
        }
    }

    /// Set how delete statements address graphs
    pub fn with_graph_mode(mut self, graph_mode: GraphMode) -> Self {
        self.graph_mode = graph_mode;
        self
    }

    pub fn ontology(&self) -> &Ontology {
        &self.ontology
    }

    fn term(&self, key: OntologyKey) -> Result<&str> {
        self.ontology.get(key).map(NodeRef::as_str)
    }

    // ------------------------------------------------------------------------
    // Entity lookup
    // ------------------------------------------------------------------------

    /// Entities under `superclass` identified by an appellation leaf value.
    ///
    /// Each filter field becomes its own `FILTER` clause; the values of one
    /// field are OR-ed. Fields with no values are skipped.
    pub fn appellation_query(
        &self,
        superclass: &NodeRef,
        filters: &BTreeMap<String, Vec<String>>,
    ) -> Result<QueryDescriptor> {
        self.appellation_query_with(superclass, filters, &FilterOptions::default())
    }

    /// Same as [`Self::appellation_query`] with a custom operator and quoting
    pub fn appellation_query_with(
        &self,
        superclass: &NodeRef,
        filters: &BTreeMap<String, Vec<String>>,
        options: &FilterOptions,
    ) -> Result<QueryDescriptor> {
        let sub_class_of = self.term(OntologyKey::SubClassOf)?;
        let sub_property_of = self.term(OntologyKey::SubPropertyOf)?;

        let mut query = String::from("SELECT ?o ?leaf WHERE {\n");
        query.push_str(&format!(
            "?is_identified_by {sub_property_of}* {} .\n",
            self.term(OntologyKey::IsIdentifiedBy)?
        ));
        query.push_str(&format!(
            "?appellation {sub_class_of}* {} .\n",
            self.term(OntologyKey::Appellation)?
        ));
        query.push_str(&format!("?oclass {sub_class_of}* {superclass} .\n"));
        query.push_str(&format!(
            "?datatypeProperty a {} .\n",
            self.term(OntologyKey::DatatypeProperty)?
        ));
        query.push_str("?o ?is_identified_by ?a .\n");
        query.push_str("?o a ?oclass .\n");
        query.push_str("?a a ?appellation .\n");
        query.push_str("?a ?datatypeProperty ?leaf .\n");

        for (field, values) in filters {
            if let Some(clause) = filter::build_filter(field, values, options)? {
                query.push_str(&clause);
                query.push('\n');
            }
        }
        query.push('}');

        tracing::debug!(statement = %query, "built appellation query");
        Ok(QueryDescriptor::select(query, &["o", "leaf"]))
    }

    // ------------------------------------------------------------------------
    // Isolation and cascade
    // ------------------------------------------------------------------------

    /// Nodes typed in `graph` that nothing references, with everything they
    /// point to concatenated into `?notes`.
    ///
    /// The incoming-edge check is not scoped to `graph`: references from
    /// other graphs keep a node alive.
    pub fn isolated_nodes_query(&self, graph: &NodeRef) -> QueryDescriptor {
        let query = format!(
            "SELECT DISTINCT ?uri ?class (GROUP_CONCAT(?nuri; separator='|') AS ?notes) WHERE {{\n\
             GRAPH {graph} {{ ?uri a ?class . }} .\n\
             ?uri !a ?n .\n\
             FILTER(NOT EXISTS {{ ?s ?p ?uri . }}) .\n\
             BIND(IF(isIRI(?n), STR(?n), '') AS ?nuri)\n\
             }} GROUP BY ?uri ?class ORDER BY ?class ?uri"
        );
        QueryDescriptor::select(query, &["uri", "class", "notes"])
    }

    /// Every IRI object the given nodes point to, `rdf:type` excluded
    pub fn linked_nodes_query<'a>(
        &self,
        uris: impl IntoIterator<Item = &'a NodeRef>,
    ) -> Result<QueryDescriptor> {
        let uris = distinct(uris);
        if uris.is_empty() {
            return Err(SweepError::EmptyInput("linked nodes query needs at least one node"));
        }

        let branches = uris
            .iter()
            .map(|uri| format!("{{ {uri} !a ?o . }}"))
            .collect::<Vec<_>>()
            .join("\nUNION\n");
        let query = format!("SELECT ?o WHERE {{\n{branches}\nFILTER(isIRI(?o)) .\n}}");

        Ok(QueryDescriptor::select(query, &["o"]))
    }

    /// Every predicate and object of one node, used to describe it
    pub fn outgoing_statements_query(&self, uri: &NodeRef) -> QueryDescriptor {
        let query = format!("SELECT ?p ?o WHERE {{ {uri} ?p ?o . }} ORDER BY ?p ?o");
        QueryDescriptor::select(query, &["p", "o"])
    }

    /// One unconditional delete of all outgoing statements per node
    pub fn delete_nodes_query<'a>(
        &self,
        uris: impl IntoIterator<Item = &'a NodeRef>,
    ) -> Result<QueryDescriptor> {
        let uris = distinct(uris);
        if uris.is_empty() {
            return Err(SweepError::EmptyInput("delete query needs at least one node"));
        }

        let operations = uris
            .iter()
            .map(|uri| match self.graph_mode {
                GraphMode::UnionDefault => format!("DELETE WHERE {{ {uri} ?p ?o . }}"),
                GraphMode::Quads => format!("DELETE WHERE {{ GRAPH ?g {{ {uri} ?p ?o . }} }}"),
            })
            .collect::<Vec<_>>()
            .join(";\n");

        Ok(QueryDescriptor::update(operations))
    }

    // ------------------------------------------------------------------------
    // Copy-of links
    // ------------------------------------------------------------------------

    /// Insert one `copy_of` statement per pair into the merge graph
    pub fn insert_links_query(&self, pairs: &[LinkPair]) -> Result<QueryDescriptor> {
        if pairs.is_empty() {
            return Err(SweepError::EmptyInput("link insert needs at least one pair"));
        }
        let copy_of = self.term(OntologyKey::CopyOf)?;
        let graph = self.term(OntologyKey::Graph)?;

        let mut query = format!("INSERT DATA {{ GRAPH {graph} {{\n");
        for pair in pairs {
            query.push_str(&format!("{} {copy_of} {} .\n", pair.local, pair.external));
        }
        query.push_str("} }");

        Ok(QueryDescriptor::update(query))
    }

    /// Delete `copy_of` links, optionally only those whose target starts
    /// with `prefix`
    pub fn delete_copy_of_query(&self, prefix: Option<&str>) -> Result<QueryDescriptor> {
        let copy_of = self.term(OntologyKey::CopyOf)?;
        let graph = self.term(OntologyKey::Graph)?;

        let query = format!(
            "DELETE {{ GRAPH {graph} {{ ?s {copy_of} ?o }} }} WHERE {{\n\
             GRAPH {graph} {{ ?s {copy_of} ?o . }} .\n\
             {}}}",
            prefix_filter(prefix)
        );
        Ok(QueryDescriptor::update(query))
    }

    /// Count `copy_of` links, optionally restricted by target prefix
    pub fn count_links_query(&self, prefix: Option<&str>) -> Result<QueryDescriptor> {
        let copy_of = self.term(OntologyKey::CopyOf)?;
        let graph = self.term(OntologyKey::Graph)?;

        let query = format!(
            "SELECT (COUNT(*) AS ?cnt) WHERE {{\n\
             GRAPH {graph} {{ ?s {copy_of} ?o . }} .\n\
             {}}}",
            prefix_filter(prefix)
        );
        Ok(QueryDescriptor::select(query, &["cnt"]))
    }

    /// List `copy_of` links, optionally restricted by target prefix
    pub fn linked_entities_query(&self, prefix: Option<&str>) -> Result<QueryDescriptor> {
        let copy_of = self.term(OntologyKey::CopyOf)?;
        let graph = self.term(OntologyKey::Graph)?;

        let query = format!(
            "SELECT ?s ?o WHERE {{\n\
             GRAPH {graph} {{ ?s {copy_of} ?o . }} .\n\
             {}}}",
            prefix_filter(prefix)
        );
        Ok(QueryDescriptor::select(query, &["o", "s"]))
    }

    // ------------------------------------------------------------------------
    // Catalog queries
    // ------------------------------------------------------------------------

    /// Named graphs holding data, excluding ontology and bookkeeping graphs
    pub fn graphs_query(&self) -> QueryDescriptor {
        let query = format!(
            "SELECT DISTINCT ?g WHERE {{\n\
             GRAPH ?g {{ ?s ?p ?o . }} .\n\
             FILTER(NOT EXISTS {{ ?g a {OWL_ONTOLOGY} }}) .\n\
             FILTER(!REGEX(STR(?g), \"baseFields\") && !REGEX(STR(?g), \"originatesFrom\")) .\n\
             }} ORDER BY ?g"
        );
        QueryDescriptor::select(query, &["g"])
    }

    /// Known peer installations with their name, URL and IRI prefix
    pub fn peer_info_query(&self) -> Result<QueryDescriptor> {
        let query = format!(
            "SELECT ?name ?uri ?url ?prefix WHERE {{\n\
             ?uri a {} .\n\
             ?uri {} ?name .\n\
             ?uri {} ?url .\n\
             ?uri {} ?prefix .\n\
             }}",
            self.term(OntologyKey::Wisski)?,
            self.term(OntologyKey::HasNote)?,
            self.term(OntologyKey::HasUrl)?,
            self.term(OntologyKey::HasUriPrefix)?,
        );
        Ok(QueryDescriptor::select(query, &["name", "uri", "url", "prefix"]))
    }

    /// Every class declared in the CRM graph
    pub fn crm_classes_query(&self) -> Result<QueryDescriptor> {
        let query = format!(
            "SELECT ?class WHERE {{ GRAPH {} {{ ?class a {} . }} }}",
            self.term(OntologyKey::Crm)?,
            self.term(OntologyKey::Class)?,
        );
        Ok(QueryDescriptor::select(query, &["class"]))
    }
}

fn distinct<'a>(uris: impl IntoIterator<Item = &'a NodeRef>) -> BTreeSet<&'a NodeRef> {
    uris.into_iter().collect()
}

fn prefix_filter(prefix: Option<&str>) -> String {
    match prefix {
        Some(prefix) if !prefix.is_empty() => format!(
            "FILTER(STRSTARTS(STR(?o), {})) .\n",
            filter::quote_string(prefix, '"')
        ),
        _ => String::new(),
    }
}

// ============================================================================
// Tests
// ============================================================================
